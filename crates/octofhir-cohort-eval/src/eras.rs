//! Date arithmetic and era merging

use chrono::{NaiveDate, TimeDelta};

/// `date` moved by `days`, saturating at the calendar limits
pub fn shift(date: NaiveDate, days: i64) -> NaiveDate {
    let saturated = if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX };
    TimeDelta::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .unwrap_or(saturated)
}

/// Merge spans into non-overlapping eras
///
/// Spans are visited in `(start, end)` order. A span joins the current era
/// when some earlier span of it, extended by `gap_days`, reaches its start;
/// the era then ends at the latest end seen.
pub fn merge_eras(
    spans: impl IntoIterator<Item = (NaiveDate, NaiveDate)>,
    gap_days: i64,
) -> Vec<(NaiveDate, NaiveDate)> {
    let mut spans: Vec<_> = spans.into_iter().collect();
    spans.sort_unstable();

    let mut eras: Vec<(NaiveDate, NaiveDate)> = Vec::new();
    let mut reach: Option<NaiveDate> = None;
    for (start, end) in spans {
        match eras.last_mut() {
            Some(era) if reach.is_some_and(|r| r >= start) => era.1 = era.1.max(end),
            _ => eras.push((start, end)),
        }
        let extended = shift(end, gap_days);
        reach = Some(reach.map_or(extended, |r| r.max(extended)));
    }
    eras
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn day(n: i64) -> NaiveDate {
        shift(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), n)
    }

    #[rstest]
    #[case(30, 30, 1)]
    #[case(31, 30, 2)]
    #[case(20, 30, 1)]
    #[case(40, 30, 2)]
    #[case(1, 0, 2)]
    #[case(0, 0, 1)]
    fn test_gap_boundary(#[case] gap: i64, #[case] tolerance: i64, #[case] eras: usize) {
        let first = (day(0), day(10));
        let second = (day(10 + gap), day(20 + gap));
        assert_eq!(merge_eras([second, first], tolerance).len(), eras);
    }

    #[test]
    fn test_overlapping_spans_always_merge() {
        let eras = merge_eras([(day(0), day(50)), (day(10), day(20)), (day(45), day(60))], 0);
        assert_eq!(eras, vec![(day(0), day(60))]);
    }

    #[test]
    fn test_contained_span_keeps_reach() {
        // the short middle span must not shrink the reach of the long one
        let eras = merge_eras([(day(0), day(100)), (day(5), day(6)), (day(90), day(95))], 0);
        assert_eq!(eras, vec![(day(0), day(100))]);
    }

    #[test]
    fn test_shift_saturates() {
        assert_eq!(shift(NaiveDate::MAX, 1), NaiveDate::MAX);
        assert_eq!(shift(NaiveDate::MIN, -1), NaiveDate::MIN);
    }

    proptest! {
        #[test]
        fn test_eras_are_sorted_disjoint_and_cover_input(
            raw in prop::collection::vec((0i64..400, 0i64..40), 0..25),
            gap in 0i64..40,
        ) {
            let spans: Vec<_> = raw.iter().map(|(s, len)| (day(*s), day(s + len))).collect();
            let eras = merge_eras(spans.clone(), gap);
            for pair in eras.windows(2) {
                prop_assert!(shift(pair[0].1, gap) < pair[1].0);
            }
            for (start, end) in spans {
                prop_assert!(eras.iter().any(|(s, e)| *s <= start && end <= *e));
            }
        }
    }
}
