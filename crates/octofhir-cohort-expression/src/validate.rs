//! Structural validation
//!
//! Runs before any query fragment is built. The validator walks the whole
//! expression and reports every schema defect it finds, each with its
//! [`ExpressionPath`]:
//!
//! - concept sets: duplicate ids, conflicting duplicate items
//! - references: every `CodesetId` (and `*CS`, `*SourceConcept`, payer
//!   concepts, custom era drug codeset) names a defined concept set
//! - windows: start bound after end bound, negative observation window
//! - counts: negative occurrence or group counts
//! - ranges: unknown operators, `bt`/`!bt` without extent, unparseable dates
//! - text filters: unknown operators
//! - nesting: group depth beyond the configured maximum
//!
//! [`validate`] stops at the first defect; [`Validator::collect`] returns all.

use std::collections::{BTreeMap, BTreeSet};

use octofhir_cohort_diagnostics::{
    COH0003, COH0004, COH0005, COH0006, COH0007, COH0008, COH0009, COH0010, COH0011, COH0012,
    COH0013, COH0014, COH0015, COH0016, COH0017, COH0018, CohortError, ErrorCode,
    ExpressionPath, Result,
};

use crate::criteria::{Criteria, CriteriaCommon, UserDefinedPeriod};
use crate::filters::{ConceptSetId, ConceptSetSelection, DateRange, NumericRange, RangeOp, TextFilter, parse_date};
use crate::model::{CohortExpression, CorrelatedCriteria, CriteriaGroup, DemographicCriteria, Window};

/// Default maximum nesting of criteria groups
pub const DEFAULT_MAX_GROUP_DEPTH: usize = 32;

/// Validate an expression, returning the first defect
pub fn validate(expression: &CohortExpression) -> Result<()> {
    Validator::new().validate(expression)
}

/// Configurable structural validator
#[derive(Debug, Clone)]
pub struct Validator {
    max_group_depth: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self {
            max_group_depth: DEFAULT_MAX_GROUP_DEPTH,
        }
    }

    pub fn with_max_group_depth(mut self, depth: usize) -> Self {
        self.max_group_depth = depth;
        self
    }

    /// First defect, if any
    pub fn validate(&self, expression: &CohortExpression) -> Result<()> {
        match self.collect(expression).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Every defect, in document order
    pub fn collect(&self, expression: &CohortExpression) -> Vec<CohortError> {
        let mut walk = Walk {
            defined: expression.concept_sets.iter().map(|cs| cs.id).collect(),
            max_depth: self.max_group_depth,
            errors: Vec::new(),
        };
        walk.expression(expression);
        if !walk.errors.is_empty() {
            log::debug!("validation found {} defect(s)", walk.errors.len());
        }
        walk.errors
    }
}

struct Walk {
    defined: BTreeSet<ConceptSetId>,
    max_depth: usize,
    errors: Vec<CohortError>,
}

impl Walk {
    fn fail(&mut self, code: ErrorCode, message: String, path: &ExpressionPath) {
        self.errors.push(CohortError::schema_at(code, message, path.clone()));
    }

    fn expression(&mut self, expression: &CohortExpression) {
        let root = ExpressionPath::root();
        self.concept_sets(expression, &root.field("ConceptSets"));

        let primary = root.field("PrimaryCriteria");
        if expression.primary_criteria.criteria_list.is_empty() {
            self.fail(COH0014, "primary criteria list is empty".into(), &primary.field("CriteriaList"));
        }
        for (i, criteria) in expression.primary_criteria.criteria_list.iter().enumerate() {
            self.criteria(criteria, &primary.field("CriteriaList").index(i), 0);
        }
        let window = expression.primary_criteria.observation_window;
        if window.prior_days < 0 || window.post_days < 0 {
            self.fail(
                COH0011,
                format!("observation window {}/{} days is negative", window.prior_days, window.post_days),
                &primary.field("ObservationWindow"),
            );
        }

        if let Some(group) = &expression.additional_criteria {
            self.group(group, &root.field("AdditionalCriteria"), 1);
        }
        for (i, rule) in expression.inclusion_rules.iter().enumerate() {
            let path = root.field("InclusionRules").index(i).field("expression");
            self.group(&rule.expression, &path, 1);
        }
        for (i, criteria) in expression.censoring_criteria.iter().enumerate() {
            self.criteria(criteria, &root.field("CensoringCriteria").index(i), 0);
        }

        if let Some(strategy) = &expression.end_strategy {
            let path = root.field("EndStrategy");
            if let Some(era) = &strategy.custom_era {
                let era_path = path.field("CustomEra");
                match era.drug_codeset_id {
                    Some(id) => self.reference(id, &era_path.field("DrugCodesetId")),
                    None => self.fail(COH0018, "custom era has no DrugCodesetId".into(), &era_path),
                }
                if era.gap_days < 0 {
                    self.fail(COH0016, format!("custom era gap {} is negative", era.gap_days), &era_path.field("GapDays"));
                }
            }
        }

        let collapse = expression.collapse_settings;
        if collapse.era_gap_days < 0 || collapse.era_pad_days < 0 {
            self.fail(
                COH0016,
                format!("era gap {} / pad {} is negative", collapse.era_gap_days, collapse.era_pad_days),
                &root.field("CollapseSettings"),
            );
        }

        if let Some(period) = &expression.censor_window {
            let path = root.field("CensorWindow");
            let start = self.date_opt(period.start_date.as_deref(), &path.field("StartDate"));
            let end = self.date_opt(period.end_date.as_deref(), &path.field("EndDate"));
            if let (Some(start), Some(end)) = (start, end)
                && start > end
            {
                self.fail(COH0017, format!("censor window starts {start} after it ends {end}"), &path);
            }
        }
    }

    fn concept_sets(&mut self, expression: &CohortExpression, path: &ExpressionPath) {
        let mut seen = BTreeSet::new();
        for (i, set) in expression.concept_sets.iter().enumerate() {
            let set_path = path.index(i);
            if !seen.insert(set.id) {
                self.fail(COH0004, format!("concept set id {} is defined more than once", set.id), &set_path.field("id"));
            }
            let mut flags = BTreeMap::new();
            for (j, item) in set.items().iter().enumerate() {
                let key = (item.is_excluded, item.include_descendants, item.include_mapped);
                match flags.insert(item.concept_id(), key) {
                    Some(previous) if previous != key => self.fail(
                        COH0005,
                        format!(
                            "concept {} appears in concept set {} with conflicting flags",
                            item.concept_id(),
                            set.id
                        ),
                        &set_path.field("expression").field("items").index(j),
                    ),
                    _ => {}
                }
            }
        }
    }

    fn reference(&mut self, id: ConceptSetId, path: &ExpressionPath) {
        if !self.defined.contains(&id) {
            self.fail(COH0003, format!("concept set {id} is not defined"), path);
        }
    }

    fn selection(&mut self, selection: Option<&ConceptSetSelection>, path: &ExpressionPath) {
        if let Some(selection) = selection {
            self.reference(selection.codeset_id, &path.field("CodesetId"));
        }
    }

    fn codeset(&mut self, id: Option<ConceptSetId>, path: &ExpressionPath) {
        if let Some(id) = id {
            self.reference(id, path);
        }
    }

    fn group(&mut self, group: &CriteriaGroup, path: &ExpressionPath, depth: usize) {
        if depth > self.max_depth {
            self.fail(
                COH0012,
                format!("criteria groups nest deeper than {} levels", self.max_depth),
                path,
            );
            return;
        }
        if let Some(count) = group.count
            && count < 0
        {
            self.fail(COH0013, format!("group count {count} is negative"), &path.field("Count"));
        }
        for (i, correlated) in group.criteria_list.iter().enumerate() {
            self.correlated(correlated, &path.field("CriteriaList").index(i), depth);
        }
        for (i, demographic) in group.demographic_criteria_list.iter().enumerate() {
            self.demographic(demographic, &path.field("DemographicCriteriaList").index(i));
        }
        for (i, nested) in group.groups.iter().enumerate() {
            self.group(nested, &path.field("Groups").index(i), depth + 1);
        }
    }

    fn correlated(&mut self, correlated: &CorrelatedCriteria, path: &ExpressionPath, depth: usize) {
        self.criteria(&correlated.criteria, &path.field("Criteria"), depth);
        if let Some(window) = &correlated.start_window {
            self.window(window, &path.field("StartWindow"));
        }
        if let Some(window) = &correlated.end_window {
            self.window(window, &path.field("EndWindow"));
        }
        if let Some(occurrence) = &correlated.occurrence
            && occurrence.count < 0
        {
            self.fail(
                COH0007,
                format!("occurrence count {} is negative", occurrence.count),
                &path.field("Occurrence").field("Count"),
            );
        }
    }

    fn window(&mut self, window: &Window, path: &ExpressionPath) {
        let start = window.start.and_then(|e| e.offset());
        let end = window.end.and_then(|e| e.offset());
        if let (Some(start), Some(end)) = (start, end)
            && start > end
        {
            self.fail(COH0006, format!("window starts at {start} days but ends at {end} days"), path);
        }
    }

    fn demographic(&mut self, demographic: &DemographicCriteria, path: &ExpressionPath) {
        self.numeric(demographic.age.as_ref(), &path.field("Age"));
        self.selection(demographic.gender_cs.as_ref(), &path.field("GenderCS"));
        self.selection(demographic.race_cs.as_ref(), &path.field("RaceCS"));
        self.selection(demographic.ethnicity_cs.as_ref(), &path.field("EthnicityCS"));
        self.date_range(demographic.occurrence_start_date.as_ref(), &path.field("OccurrenceStartDate"));
        self.date_range(demographic.occurrence_end_date.as_ref(), &path.field("OccurrenceEndDate"));
    }

    fn common(&mut self, common: &CriteriaCommon, path: &ExpressionPath, depth: usize) {
        self.codeset(common.codeset_id, &path.field("CodesetId"));
        if let Some(group) = &common.correlated_criteria {
            self.group(group, &path.field("CorrelatedCriteria"), depth + 1);
        }
    }

    fn criteria(&mut self, criteria: &Criteria, outer: &ExpressionPath, depth: usize) {
        let path = outer.field(criteria.variant_name());
        self.common(criteria.common(), &path, depth);
        let p = |name: &'static str| path.field(name);
        match criteria {
            Criteria::ConditionOccurrence(c) => {
                self.date_range(c.occurrence_start_date.as_ref(), &p("OccurrenceStartDate"));
                self.date_range(c.occurrence_end_date.as_ref(), &p("OccurrenceEndDate"));
                self.selection(c.condition_type_cs.as_ref(), &p("ConditionTypeCS"));
                self.text(c.stop_reason.as_ref(), &p("StopReason"));
                self.codeset(c.condition_source_concept, &p("ConditionSourceConcept"));
                self.numeric(c.age.as_ref(), &p("Age"));
                self.selection(c.gender_cs.as_ref(), &p("GenderCS"));
                self.selection(c.provider_specialty_cs.as_ref(), &p("ProviderSpecialtyCS"));
                self.selection(c.visit_type_cs.as_ref(), &p("VisitTypeCS"));
                self.selection(c.condition_status_cs.as_ref(), &p("ConditionStatusCS"));
            }
            Criteria::DrugExposure(c) => {
                self.date_range(c.occurrence_start_date.as_ref(), &p("OccurrenceStartDate"));
                self.date_range(c.occurrence_end_date.as_ref(), &p("OccurrenceEndDate"));
                self.selection(c.drug_type_cs.as_ref(), &p("DrugTypeCS"));
                self.selection(c.route_concept_cs.as_ref(), &p("RouteConceptCS"));
                self.numeric(c.effective_drug_dose.as_ref(), &p("EffectiveDrugDose"));
                self.selection(c.dose_unit_cs.as_ref(), &p("DoseUnitCS"));
                self.numeric(c.quantity.as_ref(), &p("Quantity"));
                self.numeric(c.days_supply.as_ref(), &p("DaysSupply"));
                self.numeric(c.refills.as_ref(), &p("Refills"));
                self.text(c.stop_reason.as_ref(), &p("StopReason"));
                self.text(c.lot_number.as_ref(), &p("LotNumber"));
                self.numeric(c.age.as_ref(), &p("Age"));
                self.selection(c.gender_cs.as_ref(), &p("GenderCS"));
                self.selection(c.provider_specialty_cs.as_ref(), &p("ProviderSpecialtyCS"));
                self.selection(c.visit_type_cs.as_ref(), &p("VisitTypeCS"));
                self.codeset(c.drug_source_concept, &p("DrugSourceConcept"));
            }
            Criteria::ProcedureOccurrence(c) => {
                self.date_range(c.occurrence_start_date.as_ref(), &p("OccurrenceStartDate"));
                self.date_range(c.occurrence_end_date.as_ref(), &p("OccurrenceEndDate"));
                self.selection(c.procedure_type_cs.as_ref(), &p("ProcedureTypeCS"));
                self.selection(c.modifier_cs.as_ref(), &p("ModifierCS"));
                self.numeric(c.quantity.as_ref(), &p("Quantity"));
                self.numeric(c.age.as_ref(), &p("Age"));
                self.selection(c.gender_cs.as_ref(), &p("GenderCS"));
                self.selection(c.provider_specialty_cs.as_ref(), &p("ProviderSpecialtyCS"));
                self.selection(c.visit_type_cs.as_ref(), &p("VisitTypeCS"));
                self.codeset(c.procedure_source_concept, &p("ProcedureSourceConcept"));
            }
            Criteria::Measurement(c) => {
                self.date_range(c.occurrence_start_date.as_ref(), &p("OccurrenceStartDate"));
                self.date_range(c.occurrence_end_date.as_ref(), &p("OccurrenceEndDate"));
                self.selection(c.measurement_type_cs.as_ref(), &p("MeasurementTypeCS"));
                self.selection(c.operator_cs.as_ref(), &p("OperatorCS"));
                self.numeric(c.value_as_number.as_ref(), &p("ValueAsNumber"));
                self.selection(c.value_as_concept_cs.as_ref(), &p("ValueAsConceptCS"));
                self.selection(c.unit_cs.as_ref(), &p("UnitCS"));
                self.numeric(c.range_low.as_ref(), &p("RangeLow"));
                self.numeric(c.range_high.as_ref(), &p("RangeHigh"));
                self.numeric(c.range_low_ratio.as_ref(), &p("RangeLowRatio"));
                self.numeric(c.range_high_ratio.as_ref(), &p("RangeHighRatio"));
                self.numeric(c.age.as_ref(), &p("Age"));
                self.selection(c.gender_cs.as_ref(), &p("GenderCS"));
                self.selection(c.provider_specialty_cs.as_ref(), &p("ProviderSpecialtyCS"));
                self.selection(c.visit_type_cs.as_ref(), &p("VisitTypeCS"));
                self.codeset(c.measurement_source_concept, &p("MeasurementSourceConcept"));
            }
            Criteria::Observation(c) => {
                self.date_range(c.occurrence_start_date.as_ref(), &p("OccurrenceStartDate"));
                self.date_range(c.occurrence_end_date.as_ref(), &p("OccurrenceEndDate"));
                self.selection(c.observation_type_cs.as_ref(), &p("ObservationTypeCS"));
                self.selection(c.qualifier_cs.as_ref(), &p("QualifierCS"));
                self.selection(c.unit_cs.as_ref(), &p("UnitCS"));
                self.numeric(c.value_as_number.as_ref(), &p("ValueAsNumber"));
                self.selection(c.value_as_concept_cs.as_ref(), &p("ValueAsConceptCS"));
                self.text(c.value_as_string.as_ref(), &p("ValueAsString"));
                self.numeric(c.age.as_ref(), &p("Age"));
                self.selection(c.gender_cs.as_ref(), &p("GenderCS"));
                self.selection(c.provider_specialty_cs.as_ref(), &p("ProviderSpecialtyCS"));
                self.selection(c.visit_type_cs.as_ref(), &p("VisitTypeCS"));
                self.codeset(c.observation_source_concept, &p("ObservationSourceConcept"));
            }
            Criteria::DeviceExposure(c) => {
                self.date_range(c.occurrence_start_date.as_ref(), &p("OccurrenceStartDate"));
                self.date_range(c.occurrence_end_date.as_ref(), &p("OccurrenceEndDate"));
                self.selection(c.device_type_cs.as_ref(), &p("DeviceTypeCS"));
                self.numeric(c.quantity.as_ref(), &p("Quantity"));
                self.text(c.unique_device_id.as_ref(), &p("UniqueDeviceId"));
                self.numeric(c.age.as_ref(), &p("Age"));
                self.selection(c.gender_cs.as_ref(), &p("GenderCS"));
                self.selection(c.provider_specialty_cs.as_ref(), &p("ProviderSpecialtyCS"));
                self.selection(c.visit_type_cs.as_ref(), &p("VisitTypeCS"));
                self.codeset(c.device_source_concept, &p("DeviceSourceConcept"));
            }
            Criteria::Specimen(c) => {
                self.date_range(c.occurrence_start_date.as_ref(), &p("OccurrenceStartDate"));
                self.selection(c.specimen_type_cs.as_ref(), &p("SpecimenTypeCS"));
                self.numeric(c.quantity.as_ref(), &p("Quantity"));
                self.selection(c.unit_cs.as_ref(), &p("UnitCS"));
                self.selection(c.anatomic_site_cs.as_ref(), &p("AnatomicSiteCS"));
                self.selection(c.disease_status_cs.as_ref(), &p("DiseaseStatusCS"));
                self.text(c.source_id.as_ref(), &p("SourceId"));
                self.codeset(c.specimen_source_concept, &p("SpecimenSourceConcept"));
                self.numeric(c.age.as_ref(), &p("Age"));
                self.selection(c.gender_cs.as_ref(), &p("GenderCS"));
            }
            Criteria::Death(c) => {
                self.date_range(c.occurrence_start_date.as_ref(), &p("OccurrenceStartDate"));
                self.selection(c.death_type_cs.as_ref(), &p("DeathTypeCS"));
                self.codeset(c.death_source_concept, &p("DeathSourceConcept"));
                self.numeric(c.age.as_ref(), &p("Age"));
                self.selection(c.gender_cs.as_ref(), &p("GenderCS"));
            }
            Criteria::VisitOccurrence(c) => {
                self.date_range(c.occurrence_start_date.as_ref(), &p("OccurrenceStartDate"));
                self.date_range(c.occurrence_end_date.as_ref(), &p("OccurrenceEndDate"));
                self.selection(c.visit_type_cs.as_ref(), &p("VisitTypeCS"));
                self.codeset(c.visit_source_concept, &p("VisitSourceConcept"));
                self.numeric(c.visit_length.as_ref(), &p("VisitLength"));
                self.numeric(c.age.as_ref(), &p("Age"));
                self.selection(c.gender_cs.as_ref(), &p("GenderCS"));
                self.selection(c.provider_specialty_cs.as_ref(), &p("ProviderSpecialtyCS"));
                self.selection(c.place_of_service_cs.as_ref(), &p("PlaceOfServiceCS"));
            }
            Criteria::VisitDetail(c) => {
                self.date_range(c.visit_detail_start_date.as_ref(), &p("VisitDetailStartDate"));
                self.date_range(c.visit_detail_end_date.as_ref(), &p("VisitDetailEndDate"));
                self.selection(c.visit_detail_type_cs.as_ref(), &p("VisitDetailTypeCS"));
                self.codeset(c.visit_detail_source_concept, &p("VisitDetailSourceConcept"));
                self.numeric(c.visit_detail_length.as_ref(), &p("VisitDetailLength"));
                self.numeric(c.age.as_ref(), &p("Age"));
                self.selection(c.gender_cs.as_ref(), &p("GenderCS"));
                self.selection(c.provider_specialty_cs.as_ref(), &p("ProviderSpecialtyCS"));
                self.selection(c.place_of_service_cs.as_ref(), &p("PlaceOfServiceCS"));
            }
            Criteria::ConditionEra(c) => {
                self.date_range(c.era_start_date.as_ref(), &p("EraStartDate"));
                self.date_range(c.era_end_date.as_ref(), &p("EraEndDate"));
                self.numeric(c.occurrence_count.as_ref(), &p("OccurrenceCount"));
                self.numeric(c.era_length.as_ref(), &p("EraLength"));
                self.numeric(c.age_at_start.as_ref(), &p("AgeAtStart"));
                self.numeric(c.age_at_end.as_ref(), &p("AgeAtEnd"));
                self.selection(c.gender_cs.as_ref(), &p("GenderCS"));
            }
            Criteria::DrugEra(c) => {
                self.date_range(c.era_start_date.as_ref(), &p("EraStartDate"));
                self.date_range(c.era_end_date.as_ref(), &p("EraEndDate"));
                self.numeric(c.occurrence_count.as_ref(), &p("OccurrenceCount"));
                self.numeric(c.era_length.as_ref(), &p("EraLength"));
                self.numeric(c.gap_days.as_ref(), &p("GapDays"));
                self.numeric(c.age_at_start.as_ref(), &p("AgeAtStart"));
                self.numeric(c.age_at_end.as_ref(), &p("AgeAtEnd"));
                self.selection(c.gender_cs.as_ref(), &p("GenderCS"));
            }
            Criteria::DoseEra(c) => {
                self.date_range(c.era_start_date.as_ref(), &p("EraStartDate"));
                self.date_range(c.era_end_date.as_ref(), &p("EraEndDate"));
                self.selection(c.unit_cs.as_ref(), &p("UnitCS"));
                self.numeric(c.dose_value.as_ref(), &p("DoseValue"));
                self.numeric(c.era_length.as_ref(), &p("EraLength"));
                self.numeric(c.age_at_start.as_ref(), &p("AgeAtStart"));
                self.numeric(c.age_at_end.as_ref(), &p("AgeAtEnd"));
                self.selection(c.gender_cs.as_ref(), &p("GenderCS"));
            }
            Criteria::ObservationPeriod(c) => {
                self.date_range(c.period_start_date.as_ref(), &p("PeriodStartDate"));
                self.date_range(c.period_end_date.as_ref(), &p("PeriodEndDate"));
                self.user_period(c.user_defined_period.as_ref(), &p("UserDefinedPeriod"));
                self.selection(c.period_type_cs.as_ref(), &p("PeriodTypeCS"));
                self.numeric(c.period_length.as_ref(), &p("PeriodLength"));
                self.numeric(c.age_at_start.as_ref(), &p("AgeAtStart"));
                self.numeric(c.age_at_end.as_ref(), &p("AgeAtEnd"));
            }
            Criteria::PayerPlanPeriod(c) => {
                self.date_range(c.period_start_date.as_ref(), &p("PeriodStartDate"));
                self.date_range(c.period_end_date.as_ref(), &p("PeriodEndDate"));
                self.user_period(c.user_defined_period.as_ref(), &p("UserDefinedPeriod"));
                self.numeric(c.period_length.as_ref(), &p("PeriodLength"));
                self.numeric(c.age_at_start.as_ref(), &p("AgeAtStart"));
                self.numeric(c.age_at_end.as_ref(), &p("AgeAtEnd"));
                self.selection(c.gender_cs.as_ref(), &p("GenderCS"));
                for (name, id) in [
                    ("PayerConcept", c.payer_concept),
                    ("PlanConcept", c.plan_concept),
                    ("SponsorConcept", c.sponsor_concept),
                    ("StopReasonConcept", c.stop_reason_concept),
                    ("PayerSourceConcept", c.payer_source_concept),
                    ("PlanSourceConcept", c.plan_source_concept),
                    ("SponsorSourceConcept", c.sponsor_source_concept),
                    ("StopReasonSourceConcept", c.stop_reason_source_concept),
                ] {
                    self.codeset(id, &p(name));
                }
            }
            Criteria::LocationRegion(c) => {
                self.date_range(c.start_date.as_ref(), &p("StartDate"));
                self.date_range(c.end_date.as_ref(), &p("EndDate"));
            }
        }
    }

    fn numeric(&mut self, range: Option<&NumericRange>, path: &ExpressionPath) {
        let Some(range) = range else { return };
        let op = range.op.as_deref().unwrap_or("");
        match RangeOp::parse(op) {
            None => self.fail(COH0008, format!("'{op}' is not a range operator"), &path.field("Op")),
            Some(op) if op.needs_extent() && range.extent.is_none() => {
                self.fail(COH0009, format!("'{op}' requires an Extent"), path)
            }
            Some(_) => {}
        }
    }

    fn date_range(&mut self, range: Option<&DateRange>, path: &ExpressionPath) {
        let Some(range) = range else { return };
        match RangeOp::parse(&range.op) {
            None => self.fail(COH0008, format!("'{}' is not a range operator", range.op), &path.field("Op")),
            Some(op) if op.needs_extent() && range.extent.is_none() => {
                self.fail(COH0009, format!("'{op}' requires an Extent"), path)
            }
            Some(_) => {}
        }
        self.date_opt(Some(&range.value), &path.field("Value"));
        self.date_opt(range.extent.as_deref(), &path.field("Extent"));
    }

    fn user_period(&mut self, period: Option<&UserDefinedPeriod>, path: &ExpressionPath) {
        let Some(period) = period else { return };
        self.date_opt(period.start_date.as_deref(), &path.field("StartDate"));
        self.date_opt(period.end_date.as_deref(), &path.field("EndDate"));
    }

    fn date_opt(&mut self, value: Option<&str>, path: &ExpressionPath) -> Option<chrono::NaiveDate> {
        let value = value?;
        let parsed = parse_date(value);
        if parsed.is_none() {
            self.fail(COH0010, format!("'{value}' is not a YYYY-MM-DD date"), path);
        }
        parsed
    }

    fn text(&mut self, filter: Option<&TextFilter>, path: &ExpressionPath) {
        let Some(filter) = filter else { return };
        if filter.operator().is_none() {
            let op = filter.op.as_deref().unwrap_or_default();
            self.fail(COH0015, format!("'{op}' is not a text operator"), &path.field("Op"));
        }
    }
}
