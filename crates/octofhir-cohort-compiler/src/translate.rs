//! Criteria translation
//!
//! Converts typed criteria, correlated criteria and groups into plan nodes.
//! Each criteria variant has exactly one translation rule naming its domain
//! and the filters its attributes compile to.

use chrono::NaiveDate;
use log::debug;
use octofhir_cohort_diagnostics::{
    COH0007, COH0008, COH0009, COH0010, COH0012, COH0015, COH0018, COH0200, COH0201, CohortError, ExpressionPath, Result,
};
use octofhir_cohort_expression::{
    Concept, ConceptSetId, ConceptSetSelection, ConditionEra, ConditionOccurrence, CorrelatedCriteria,
    CountColumn, Criteria, CriteriaGroup, DateRange, Death, DemographicCriteria, DeviceExposure, DoseEra,
    DrugEra, DrugExposure, EndStrategy, Measurement, NumericRange, Observation, ObservationPeriod,
    Occurrence, PayerPlanPeriod, ProcedureOccurrence, RangeOp, Specimen, TextFilter, UserDefinedPeriod,
    VisitDetail, VisitOccurrence, Window, parse_date,
};

use crate::domain::Domain;
use crate::plan::{
    Anchor, Column, CorrelatedPlan, DateAdjustmentPlan, DateBound, DateOffsetPlan, DemographicPlan, DistinctColumn,
    EndPlan, EventDate, EventQuery, Filter, GroupKind, GroupPlan, NumericBound, OccurrencePlan, Operand,
    UserPeriod, WindowPlan,
};

/// Translates criteria and groups into plan nodes
#[derive(Debug, Clone, Copy)]
pub struct CriteriaTranslator {
    max_depth: usize,
}

impl CriteriaTranslator {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Translate one criterion located at `path`
    ///
    /// `depth` is the nesting depth of the group containing the criterion;
    /// its own correlated group sits one level deeper.
    pub fn criteria(&self, criteria: &Criteria, path: &ExpressionPath, depth: usize) -> Result<EventQuery> {
        let variant = path.field(criteria.variant_name());
        let mut rule = FilterBuilder::new(&variant);
        let domain = match criteria {
            Criteria::ConditionOccurrence(c) => rule.condition_occurrence(c)?,
            Criteria::ConditionEra(c) => rule.condition_era(c)?,
            Criteria::DrugExposure(c) => rule.drug_exposure(c)?,
            Criteria::DrugEra(c) => rule.drug_era(c)?,
            Criteria::DoseEra(c) => rule.dose_era(c)?,
            Criteria::ProcedureOccurrence(c) => rule.procedure_occurrence(c)?,
            Criteria::Measurement(c) => rule.measurement(c)?,
            Criteria::Observation(c) => rule.observation(c)?,
            Criteria::VisitOccurrence(c) => rule.visit_occurrence(c)?,
            Criteria::VisitDetail(c) => rule.visit_detail(c)?,
            Criteria::DeviceExposure(c) => rule.device_exposure(c)?,
            Criteria::Specimen(c) => rule.specimen(c)?,
            Criteria::Death(c) => rule.death(c)?,
            Criteria::ObservationPeriod(c) => rule.observation_period(c)?,
            Criteria::PayerPlanPeriod(c) => rule.payer_plan_period(c)?,
            Criteria::LocationRegion(_) => {
                return Err(CohortError::unsupported(COH0200, "LocationRegion", path.clone()));
            }
        };

        let common = criteria.common();
        let mut query = EventQuery::new(domain);
        query.codeset_id = match (common.codeset_id, domain.table().concept) {
            (Some(id), Some(_)) => Some(id),
            (Some(id), None) => {
                debug!("{variant}: {domain} has no concept column, CodesetId {id} ignored");
                None
            }
            (None, _) => None,
        };
        query.first = common.is_first();
        query.filters = rule.filters;
        query.user_period = rule.user_period;

        if let Some(group) = &common.correlated_criteria {
            let plan = self.group(group, &variant.field("CorrelatedCriteria"), depth + 1)?;
            if !plan.is_empty() {
                query.correlated = Some(Box::new(plan));
            }
        }
        query.date_adjustment = common.date_adjustment.as_ref().map(|adj| DateAdjustmentPlan {
            start_with: adj.start_with,
            start_offset: adj.start_offset.into(),
            end_with: adj.end_with,
            end_offset: adj.end_offset.into(),
        });
        Ok(query)
    }

    /// Translate a criteria group at nesting `depth` (top-level groups are 1)
    pub fn group(&self, group: &CriteriaGroup, path: &ExpressionPath, depth: usize) -> Result<GroupPlan> {
        if depth > self.max_depth {
            return Err(CohortError::schema_at(
                COH0012,
                format!("criteria groups nest deeper than {} levels", self.max_depth),
                path.clone(),
            ));
        }

        let mut plan = GroupPlan::new(GroupKind::from_group(group));
        plan.invert = group.invert;

        let list = path.field("CriteriaList");
        for (i, correlated) in group.criteria_list.iter().enumerate() {
            plan.criteria.push(self.correlated(correlated, &list.index(i), depth)?);
        }
        let demographics = path.field("DemographicCriteriaList");
        for (i, demographic) in group.demographic_criteria_list.iter().enumerate() {
            let compiled = self.demographic(demographic, &demographics.index(i))?;
            if !compiled.filters.is_empty() {
                plan.demographics.push(compiled);
            }
        }
        let groups = path.field("Groups");
        for (i, nested) in group.groups.iter().enumerate() {
            let compiled = self.group(nested, &groups.index(i), depth + 1)?;
            if !compiled.is_empty() {
                plan.groups.push(compiled);
            }
        }
        Ok(plan)
    }

    fn correlated(&self, correlated: &CorrelatedCriteria, path: &ExpressionPath, depth: usize) -> Result<CorrelatedPlan> {
        let events = self.criteria(&correlated.criteria, &path.field("Criteria"), depth)?;
        let occurrence = match &correlated.occurrence {
            Some(occurrence) => occurrence_plan(occurrence, &path.field("Occurrence"))?,
            None => OccurrencePlan::at_least_one(),
        };
        Ok(CorrelatedPlan {
            events,
            start_window: correlated.start_window.as_ref().map(|w| window_plan(w, WindowSide::Start)),
            end_window: correlated.end_window.as_ref().map(|w| window_plan(w, WindowSide::End)),
            restrict_visit: correlated.restrict_visit.unwrap_or(false),
            ignore_observation_period: correlated.ignore_observation_period.unwrap_or(false),
            occurrence,
        })
    }

    fn demographic(&self, demographic: &DemographicCriteria, path: &ExpressionPath) -> Result<DemographicPlan> {
        let mut b = FilterBuilder::new(path);
        b.numeric(Operand::Age { at: EventDate::Start }, demographic.age.as_ref(), "Age")?;
        b.concepts(Column::person("gender_concept_id"), &demographic.gender, demographic.gender_cs, false);
        b.concepts(Column::person("race_concept_id"), &demographic.race, demographic.race_cs, false);
        b.concepts(Column::person("ethnicity_concept_id"), &demographic.ethnicity, demographic.ethnicity_cs, false);
        b.date(EventDate::Start, demographic.occurrence_start_date.as_ref(), "OccurrenceStartDate")?;
        b.date(EventDate::End, demographic.occurrence_end_date.as_ref(), "OccurrenceEndDate")?;
        Ok(DemographicPlan { filters: b.filters })
    }

    /// Translate the end strategy; absent or empty means the default
    pub fn end_strategy(&self, strategy: Option<&EndStrategy>) -> Result<EndPlan> {
        let path = ExpressionPath::root().field("EndStrategy");
        let Some(strategy) = strategy else {
            return Ok(EndPlan::Default);
        };
        let date_offset = strategy.date_offset.as_ref().map(|offset| DateOffsetPlan {
            field: offset.date_field,
            offset: offset.offset.into(),
        });
        let Some(era) = &strategy.custom_era else {
            return Ok(match date_offset {
                Some(DateOffsetPlan { field, offset }) => EndPlan::DateOffset { field, offset },
                None => EndPlan::Default,
            });
        };
        let era_path = path.field("CustomEra");
        let codeset_id = era.drug_codeset_id.ok_or_else(|| {
            CohortError::schema_at(COH0018, "custom era has no DrugCodesetId", era_path.field("DrugCodesetId"))
        })?;
        Ok(EndPlan::CustomEra {
            codeset_id,
            gap_days: era.gap_days.into(),
            offset: era.offset.into(),
            days_supply_override: era.days_supply_override.map(i64::from),
            date_offset,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum WindowSide {
    Start,
    End,
}

fn window_plan(window: &Window, side: WindowSide) -> WindowPlan {
    let index_anchor = if window.use_index_end == Some(true) { Anchor::End } else { Anchor::Start };
    let event_anchor = match side {
        WindowSide::Start if window.use_event_end == Some(true) => Anchor::End,
        WindowSide::Start => Anchor::Start,
        WindowSide::End if window.use_event_end == Some(false) => Anchor::Start,
        WindowSide::End => Anchor::End,
    };
    WindowPlan {
        lower: window.start.and_then(|e| e.offset()),
        upper: window.end.and_then(|e| e.offset()),
        index_anchor,
        event_anchor,
    }
}

fn occurrence_plan(occurrence: &Occurrence, path: &ExpressionPath) -> Result<OccurrencePlan> {
    let count = u32::try_from(occurrence.count).map_err(|_| {
        CohortError::schema_at(
            COH0007,
            format!("occurrence count {} is negative", occurrence.count),
            path.field("Count"),
        )
    })?;
    let distinct = if occurrence.is_distinct {
        let column = match occurrence.count_column.unwrap_or(CountColumn::DomainConcept) {
            CountColumn::DomainConcept => DistinctColumn::DomainConcept,
            CountColumn::StartDate => DistinctColumn::StartDate,
            CountColumn::EndDate => DistinctColumn::EndDate,
            CountColumn::VisitId => DistinctColumn::VisitId,
            other => {
                return Err(CohortError::unsupported(
                    COH0201,
                    format!("CountColumn {other:?}"),
                    path.field("CountColumn"),
                ));
            }
        };
        Some(column)
    } else {
        None
    };
    Ok(OccurrencePlan {
        kind: occurrence.occurrence_type,
        count,
        distinct,
    })
}

// ============================================================================
// Ranges and dates
// ============================================================================

fn range_op(op: &str, path: &ExpressionPath) -> Result<RangeOp> {
    RangeOp::parse(op)
        .ok_or_else(|| CohortError::schema_at(COH0008, format!("'{op}' is not a range operator"), path.field("Op")))
}

fn missing_extent(op: RangeOp, path: &ExpressionPath) -> CohortError {
    CohortError::schema_at(COH0009, format!("'{op}' requires an Extent"), path.clone())
}

/// Compile a numeric range; a range without a value constrains nothing
pub fn numeric_bound(range: &NumericRange, path: &ExpressionPath) -> Result<Option<NumericBound>> {
    let Some(value) = range.value else {
        return Ok(None);
    };
    let op = range_op(range.op.as_deref().unwrap_or_default(), path)?;
    if op.needs_extent() && range.extent.is_none() {
        return Err(missing_extent(op, path));
    }
    Ok(Some(NumericBound {
        op,
        value,
        extent: range.extent,
    }))
}

pub fn date_bound(range: &DateRange, path: &ExpressionPath) -> Result<DateBound> {
    let op = range_op(&range.op, path)?;
    let value = date_at(&range.value, &path.field("Value"))?;
    let extent = range
        .extent
        .as_deref()
        .map(|extent| date_at(extent, &path.field("Extent")))
        .transpose()?;
    if op.needs_extent() && extent.is_none() {
        return Err(missing_extent(op, path));
    }
    Ok(DateBound { op, value, extent })
}

/// Parse an expression date, reporting a defect at `path`
pub fn date_at(value: &str, path: &ExpressionPath) -> Result<NaiveDate> {
    parse_date(value)
        .ok_or_else(|| CohortError::schema_at(COH0010, format!("'{value}' is not a YYYY-MM-DD date"), path.clone()))
}

fn optional_date(value: Option<&str>, path: &ExpressionPath) -> Result<Option<NaiveDate>> {
    value.map(|v| date_at(v, path)).transpose()
}

// ============================================================================
// Per-variant rules
// ============================================================================

fn event(column: &str) -> Column {
    Column::event(column)
}

/// Collects the filters of one criterion
struct FilterBuilder<'p> {
    path: &'p ExpressionPath,
    filters: Vec<Filter>,
    user_period: Option<UserPeriod>,
}

impl<'p> FilterBuilder<'p> {
    fn new(path: &'p ExpressionPath) -> Self {
        Self {
            path,
            filters: Vec::new(),
            user_period: None,
        }
    }

    /// Literal concept list (negated by `exclude`) plus a codeset selection
    fn concepts(&mut self, column: Column, concepts: &[Concept], selection: Option<ConceptSetSelection>, exclude: bool) {
        if !concepts.is_empty() {
            self.filters.push(Filter::Concept {
                column: column.clone(),
                concepts: concepts.iter().map(|c| c.concept_id).collect(),
                exclude,
            });
        }
        if let Some(selection) = selection {
            self.filters.push(Filter::Codeset {
                column,
                codeset_id: selection.codeset_id,
                exclude: selection.is_exclusion,
            });
        }
    }

    /// Membership of an event column in a codeset
    fn codeset(&mut self, column: &str, codeset_id: Option<ConceptSetId>) {
        if let Some(codeset_id) = codeset_id {
            self.filters.push(Filter::Codeset {
                column: event(column),
                codeset_id,
                exclude: false,
            });
        }
    }

    fn numeric(&mut self, operand: Operand, range: Option<&NumericRange>, field: &'static str) -> Result<()> {
        if let Some(range) = range {
            if let Some(bound) = numeric_bound(range, &self.path.field(field))? {
                self.filters.push(Filter::Numeric { operand, bound });
            }
        }
        Ok(())
    }

    fn column_range(&mut self, column: &str, range: Option<&NumericRange>, field: &'static str) -> Result<()> {
        self.numeric(Operand::Column { column: event(column) }, range, field)
    }

    fn date(&mut self, at: EventDate, range: Option<&DateRange>, field: &'static str) -> Result<()> {
        if let Some(range) = range {
            let bound = date_bound(range, &self.path.field(field))?;
            self.filters.push(Filter::Date { at, bound });
        }
        Ok(())
    }

    fn text(&mut self, column: &str, filter: Option<&TextFilter>, field: &'static str) -> Result<()> {
        let Some(filter) = filter else {
            return Ok(());
        };
        let Some(text) = &filter.text else {
            return Ok(());
        };
        let (op, negated) = filter.operator().ok_or_else(|| {
            let op = filter.op.as_deref().unwrap_or_default();
            CohortError::schema_at(COH0015, format!("'{op}' is not a text operator"), self.path.field(field).field("Op"))
        })?;
        self.filters.push(Filter::Text {
            column: event(column),
            op,
            negated,
            text: text.clone(),
        });
        Ok(())
    }

    fn user_period(&mut self, period: Option<&UserDefinedPeriod>) -> Result<()> {
        if let Some(period) = period {
            let path = self.path.field("UserDefinedPeriod");
            let start = optional_date(period.start_date.as_deref(), &path.field("StartDate"))?;
            let end = optional_date(period.end_date.as_deref(), &path.field("EndDate"))?;
            if start.is_some() || end.is_some() {
                self.user_period = Some(UserPeriod { start, end });
            }
        }
        Ok(())
    }

    fn age(&mut self, range: Option<&NumericRange>) -> Result<()> {
        self.numeric(Operand::Age { at: EventDate::Start }, range, "Age")
    }

    fn ages_at(&mut self, at_start: Option<&NumericRange>, at_end: Option<&NumericRange>) -> Result<()> {
        self.numeric(Operand::Age { at: EventDate::Start }, at_start, "AgeAtStart")?;
        self.numeric(Operand::Age { at: EventDate::End }, at_end, "AgeAtEnd")
    }

    fn duration(&mut self, range: Option<&NumericRange>, field: &'static str) -> Result<()> {
        self.numeric(Operand::Duration, range, field)
    }

    fn gender(&mut self, concepts: &[Concept], selection: Option<ConceptSetSelection>) {
        self.concepts(Column::person("gender_concept_id"), concepts, selection, false);
    }

    fn provider_specialty(&mut self, concepts: &[Concept], selection: Option<ConceptSetSelection>) {
        self.concepts(Column::Provider("specialty_concept_id".into()), concepts, selection, false);
    }

    /// Concept of the visit the event belongs to
    fn visit_type(&mut self, concepts: &[Concept], selection: Option<ConceptSetSelection>) {
        self.concepts(Column::Visit("visit_concept_id".into()), concepts, selection, false);
    }

    fn place_of_service(&mut self, concepts: &[Concept], selection: Option<ConceptSetSelection>) {
        self.concepts(Column::CareSite("place_of_service_concept_id".into()), concepts, selection, false);
    }

    fn location(&self, codeset_id: Option<ConceptSetId>) -> Result<()> {
        match codeset_id {
            Some(_) => Err(CohortError::unsupported(
                COH0200,
                "PlaceOfServiceLocation",
                self.path.field("PlaceOfServiceLocation"),
            )),
            None => Ok(()),
        }
    }

    fn condition_occurrence(&mut self, c: &ConditionOccurrence) -> Result<Domain> {
        self.date(EventDate::Start, c.occurrence_start_date.as_ref(), "OccurrenceStartDate")?;
        self.date(EventDate::End, c.occurrence_end_date.as_ref(), "OccurrenceEndDate")?;
        self.concepts(
            event("condition_type_concept_id"),
            &c.condition_type,
            c.condition_type_cs,
            c.condition_type_exclude.unwrap_or(false),
        );
        self.text("stop_reason", c.stop_reason.as_ref(), "StopReason")?;
        self.codeset("condition_source_concept_id", c.condition_source_concept);
        self.age(c.age.as_ref())?;
        self.gender(&c.gender, c.gender_cs);
        self.provider_specialty(&c.provider_specialty, c.provider_specialty_cs);
        self.visit_type(&c.visit_type, c.visit_type_cs);
        self.concepts(event("condition_status_concept_id"), &c.condition_status, c.condition_status_cs, false);
        Ok(Domain::ConditionOccurrence)
    }

    fn drug_exposure(&mut self, c: &DrugExposure) -> Result<Domain> {
        self.date(EventDate::Start, c.occurrence_start_date.as_ref(), "OccurrenceStartDate")?;
        self.date(EventDate::End, c.occurrence_end_date.as_ref(), "OccurrenceEndDate")?;
        self.concepts(
            event("drug_type_concept_id"),
            &c.drug_type,
            c.drug_type_cs,
            c.drug_type_exclude.unwrap_or(false),
        );
        self.concepts(event("route_concept_id"), &c.route_concept, c.route_concept_cs, false);
        self.column_range("effective_drug_dose", c.effective_drug_dose.as_ref(), "EffectiveDrugDose")?;
        self.concepts(event("dose_unit_concept_id"), &c.dose_unit, c.dose_unit_cs, false);
        self.column_range("quantity", c.quantity.as_ref(), "Quantity")?;
        self.column_range("days_supply", c.days_supply.as_ref(), "DaysSupply")?;
        self.column_range("refills", c.refills.as_ref(), "Refills")?;
        self.text("stop_reason", c.stop_reason.as_ref(), "StopReason")?;
        self.text("lot_number", c.lot_number.as_ref(), "LotNumber")?;
        self.codeset("drug_source_concept_id", c.drug_source_concept);
        self.age(c.age.as_ref())?;
        self.gender(&c.gender, c.gender_cs);
        self.provider_specialty(&c.provider_specialty, c.provider_specialty_cs);
        self.visit_type(&c.visit_type, c.visit_type_cs);
        Ok(Domain::DrugExposure)
    }

    fn procedure_occurrence(&mut self, c: &ProcedureOccurrence) -> Result<Domain> {
        self.date(EventDate::Start, c.occurrence_start_date.as_ref(), "OccurrenceStartDate")?;
        self.date(EventDate::End, c.occurrence_end_date.as_ref(), "OccurrenceEndDate")?;
        self.concepts(
            event("procedure_type_concept_id"),
            &c.procedure_type,
            c.procedure_type_cs,
            c.procedure_type_exclude.unwrap_or(false),
        );
        self.concepts(event("modifier_concept_id"), &c.modifier, c.modifier_cs, false);
        self.column_range("quantity", c.quantity.as_ref(), "Quantity")?;
        self.codeset("procedure_source_concept_id", c.procedure_source_concept);
        self.age(c.age.as_ref())?;
        self.gender(&c.gender, c.gender_cs);
        self.provider_specialty(&c.provider_specialty, c.provider_specialty_cs);
        self.visit_type(&c.visit_type, c.visit_type_cs);
        Ok(Domain::ProcedureOccurrence)
    }

    fn measurement(&mut self, c: &Measurement) -> Result<Domain> {
        self.date(EventDate::Start, c.occurrence_start_date.as_ref(), "OccurrenceStartDate")?;
        self.date(EventDate::End, c.occurrence_end_date.as_ref(), "OccurrenceEndDate")?;
        self.concepts(
            event("measurement_type_concept_id"),
            &c.measurement_type,
            c.measurement_type_cs,
            c.measurement_type_exclude.unwrap_or(false),
        );
        self.concepts(event("operator_concept_id"), &c.operator, c.operator_cs, false);
        self.column_range("value_as_number", c.value_as_number.as_ref(), "ValueAsNumber")?;
        self.concepts(event("value_as_concept_id"), &c.value_as_concept, c.value_as_concept_cs, false);
        self.concepts(event("unit_concept_id"), &c.unit, c.unit_cs, false);
        self.column_range("range_low", c.range_low.as_ref(), "RangeLow")?;
        self.column_range("range_high", c.range_high.as_ref(), "RangeHigh")?;
        let ratio = |denominator: &str| Operand::Ratio {
            numerator: "value_as_number".to_string(),
            denominator: denominator.to_string(),
        };
        self.numeric(ratio("range_low"), c.range_low_ratio.as_ref(), "RangeLowRatio")?;
        self.numeric(ratio("range_high"), c.range_high_ratio.as_ref(), "RangeHighRatio")?;
        if c.abnormal == Some(true) {
            self.filters.push(Filter::Abnormal);
        }
        self.codeset("measurement_source_concept_id", c.measurement_source_concept);
        self.age(c.age.as_ref())?;
        self.gender(&c.gender, c.gender_cs);
        self.provider_specialty(&c.provider_specialty, c.provider_specialty_cs);
        self.visit_type(&c.visit_type, c.visit_type_cs);
        Ok(Domain::Measurement)
    }

    fn observation(&mut self, c: &Observation) -> Result<Domain> {
        self.date(EventDate::Start, c.occurrence_start_date.as_ref(), "OccurrenceStartDate")?;
        self.date(EventDate::End, c.occurrence_end_date.as_ref(), "OccurrenceEndDate")?;
        self.concepts(
            event("observation_type_concept_id"),
            &c.observation_type,
            c.observation_type_cs,
            c.observation_type_exclude.unwrap_or(false),
        );
        self.concepts(event("qualifier_concept_id"), &c.qualifier, c.qualifier_cs, false);
        self.concepts(event("unit_concept_id"), &c.unit, c.unit_cs, false);
        self.column_range("value_as_number", c.value_as_number.as_ref(), "ValueAsNumber")?;
        self.concepts(event("value_as_concept_id"), &c.value_as_concept, c.value_as_concept_cs, false);
        self.text("value_as_string", c.value_as_string.as_ref(), "ValueAsString")?;
        self.codeset("observation_source_concept_id", c.observation_source_concept);
        self.age(c.age.as_ref())?;
        self.gender(&c.gender, c.gender_cs);
        self.provider_specialty(&c.provider_specialty, c.provider_specialty_cs);
        self.visit_type(&c.visit_type, c.visit_type_cs);
        Ok(Domain::Observation)
    }

    fn device_exposure(&mut self, c: &DeviceExposure) -> Result<Domain> {
        self.date(EventDate::Start, c.occurrence_start_date.as_ref(), "OccurrenceStartDate")?;
        self.date(EventDate::End, c.occurrence_end_date.as_ref(), "OccurrenceEndDate")?;
        self.concepts(
            event("device_type_concept_id"),
            &c.device_type,
            c.device_type_cs,
            c.device_type_exclude.unwrap_or(false),
        );
        self.column_range("quantity", c.quantity.as_ref(), "Quantity")?;
        self.text("unique_device_id", c.unique_device_id.as_ref(), "UniqueDeviceId")?;
        self.codeset("device_source_concept_id", c.device_source_concept);
        self.age(c.age.as_ref())?;
        self.gender(&c.gender, c.gender_cs);
        self.provider_specialty(&c.provider_specialty, c.provider_specialty_cs);
        self.visit_type(&c.visit_type, c.visit_type_cs);
        Ok(Domain::DeviceExposure)
    }

    fn specimen(&mut self, c: &Specimen) -> Result<Domain> {
        self.date(EventDate::Start, c.occurrence_start_date.as_ref(), "OccurrenceStartDate")?;
        self.concepts(
            event("specimen_type_concept_id"),
            &c.specimen_type,
            c.specimen_type_cs,
            c.specimen_type_exclude.unwrap_or(false),
        );
        self.column_range("quantity", c.quantity.as_ref(), "Quantity")?;
        self.concepts(event("unit_concept_id"), &c.unit, c.unit_cs, false);
        self.concepts(event("anatomic_site_concept_id"), &c.anatomic_site, c.anatomic_site_cs, false);
        self.concepts(event("disease_status_concept_id"), &c.disease_status, c.disease_status_cs, false);
        self.text("specimen_source_id", c.source_id.as_ref(), "SourceId")?;
        self.codeset("specimen_source_concept_id", c.specimen_source_concept);
        self.age(c.age.as_ref())?;
        self.gender(&c.gender, c.gender_cs);
        Ok(Domain::Specimen)
    }

    fn death(&mut self, c: &Death) -> Result<Domain> {
        self.date(EventDate::Start, c.occurrence_start_date.as_ref(), "OccurrenceStartDate")?;
        self.concepts(
            event("death_type_concept_id"),
            &c.death_type,
            c.death_type_cs,
            c.death_type_exclude.unwrap_or(false),
        );
        self.codeset("cause_source_concept_id", c.death_source_concept);
        self.age(c.age.as_ref())?;
        self.gender(&c.gender, c.gender_cs);
        Ok(Domain::Death)
    }

    fn visit_occurrence(&mut self, c: &VisitOccurrence) -> Result<Domain> {
        self.location(c.place_of_service_location)?;
        self.date(EventDate::Start, c.occurrence_start_date.as_ref(), "OccurrenceStartDate")?;
        self.date(EventDate::End, c.occurrence_end_date.as_ref(), "OccurrenceEndDate")?;
        self.concepts(
            event("visit_type_concept_id"),
            &c.visit_type,
            c.visit_type_cs,
            c.visit_type_exclude.unwrap_or(false),
        );
        self.codeset("visit_source_concept_id", c.visit_source_concept);
        self.duration(c.visit_length.as_ref(), "VisitLength")?;
        self.age(c.age.as_ref())?;
        self.gender(&c.gender, c.gender_cs);
        self.provider_specialty(&c.provider_specialty, c.provider_specialty_cs);
        self.place_of_service(&c.place_of_service, c.place_of_service_cs);
        Ok(Domain::VisitOccurrence)
    }

    fn visit_detail(&mut self, c: &VisitDetail) -> Result<Domain> {
        self.location(c.place_of_service_location)?;
        self.date(EventDate::Start, c.visit_detail_start_date.as_ref(), "VisitDetailStartDate")?;
        self.date(EventDate::End, c.visit_detail_end_date.as_ref(), "VisitDetailEndDate")?;
        self.concepts(event("visit_detail_type_concept_id"), &[], c.visit_detail_type_cs, false);
        self.codeset("visit_detail_source_concept_id", c.visit_detail_source_concept);
        self.duration(c.visit_detail_length.as_ref(), "VisitDetailLength")?;
        self.age(c.age.as_ref())?;
        self.gender(&[], c.gender_cs);
        self.provider_specialty(&[], c.provider_specialty_cs);
        self.place_of_service(&[], c.place_of_service_cs);
        Ok(Domain::VisitDetail)
    }

    fn condition_era(&mut self, c: &ConditionEra) -> Result<Domain> {
        self.date(EventDate::Start, c.era_start_date.as_ref(), "EraStartDate")?;
        self.date(EventDate::End, c.era_end_date.as_ref(), "EraEndDate")?;
        self.column_range("condition_occurrence_count", c.occurrence_count.as_ref(), "OccurrenceCount")?;
        self.duration(c.era_length.as_ref(), "EraLength")?;
        self.ages_at(c.age_at_start.as_ref(), c.age_at_end.as_ref())?;
        self.gender(&c.gender, c.gender_cs);
        Ok(Domain::ConditionEra)
    }

    fn drug_era(&mut self, c: &DrugEra) -> Result<Domain> {
        self.date(EventDate::Start, c.era_start_date.as_ref(), "EraStartDate")?;
        self.date(EventDate::End, c.era_end_date.as_ref(), "EraEndDate")?;
        self.column_range("drug_exposure_count", c.occurrence_count.as_ref(), "OccurrenceCount")?;
        self.duration(c.era_length.as_ref(), "EraLength")?;
        self.column_range("gap_days", c.gap_days.as_ref(), "GapDays")?;
        self.ages_at(c.age_at_start.as_ref(), c.age_at_end.as_ref())?;
        self.gender(&c.gender, c.gender_cs);
        Ok(Domain::DrugEra)
    }

    fn dose_era(&mut self, c: &DoseEra) -> Result<Domain> {
        self.date(EventDate::Start, c.era_start_date.as_ref(), "EraStartDate")?;
        self.date(EventDate::End, c.era_end_date.as_ref(), "EraEndDate")?;
        self.concepts(event("unit_concept_id"), &c.unit, c.unit_cs, false);
        self.column_range("dose_value", c.dose_value.as_ref(), "DoseValue")?;
        self.duration(c.era_length.as_ref(), "EraLength")?;
        self.ages_at(c.age_at_start.as_ref(), c.age_at_end.as_ref())?;
        self.gender(&c.gender, c.gender_cs);
        Ok(Domain::DoseEra)
    }

    fn observation_period(&mut self, c: &ObservationPeriod) -> Result<Domain> {
        self.date(EventDate::Start, c.period_start_date.as_ref(), "PeriodStartDate")?;
        self.date(EventDate::End, c.period_end_date.as_ref(), "PeriodEndDate")?;
        self.user_period(c.user_defined_period.as_ref())?;
        self.concepts(event("period_type_concept_id"), &c.period_type, c.period_type_cs, false);
        self.duration(c.period_length.as_ref(), "PeriodLength")?;
        self.ages_at(c.age_at_start.as_ref(), c.age_at_end.as_ref())?;
        Ok(Domain::ObservationPeriod)
    }

    fn payer_plan_period(&mut self, c: &PayerPlanPeriod) -> Result<Domain> {
        self.date(EventDate::Start, c.period_start_date.as_ref(), "PeriodStartDate")?;
        self.date(EventDate::End, c.period_end_date.as_ref(), "PeriodEndDate")?;
        self.user_period(c.user_defined_period.as_ref())?;
        self.duration(c.period_length.as_ref(), "PeriodLength")?;
        self.ages_at(c.age_at_start.as_ref(), c.age_at_end.as_ref())?;
        self.gender(&c.gender, c.gender_cs);
        self.codeset("payer_concept_id", c.payer_concept);
        self.codeset("plan_concept_id", c.plan_concept);
        self.codeset("sponsor_concept_id", c.sponsor_concept);
        self.codeset("stop_reason_concept_id", c.stop_reason_concept);
        self.codeset("payer_source_concept_id", c.payer_source_concept);
        self.codeset("plan_source_concept_id", c.plan_source_concept);
        self.codeset("sponsor_source_concept_id", c.sponsor_source_concept);
        self.codeset("stop_reason_source_concept_id", c.stop_reason_source_concept);
        Ok(Domain::PayerPlanPeriod)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_cohort_expression::{
        CriteriaCommon, DateAdjustment, DateField, Endpoint, GroupType, LocationRegion, OccurrenceType,
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn translator() -> CriteriaTranslator {
        CriteriaTranslator::new(32)
    }

    fn root() -> ExpressionPath {
        ExpressionPath::root().field("PrimaryCriteria").field("CriteriaList").index(0)
    }

    fn criteria(json: &str) -> Criteria {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_condition_occurrence_filters() {
        let c = criteria(
            r#"{"ConditionOccurrence": {
                "CodesetId": 1, "First": true,
                "ConditionType": [{"CONCEPT_ID": 32020}], "ConditionTypeExclude": true,
                "Age": {"Value": 18, "Op": "gte"},
                "Gender": [{"CONCEPT_ID": 8532}],
                "VisitTypeCS": {"CodesetId": 4, "IsExclusion": true}
            }}"#,
        );
        let query = translator().criteria(&c, &root(), 0).unwrap();
        assert_eq!(query.domain, Domain::ConditionOccurrence);
        assert_eq!(query.codeset_id, Some(1));
        assert!(query.first);
        assert_eq!(
            query.filters,
            vec![
                Filter::Concept {
                    column: Column::event("condition_type_concept_id"),
                    concepts: smallvec::smallvec![32020],
                    exclude: true,
                },
                Filter::Numeric {
                    operand: Operand::Age { at: EventDate::Start },
                    bound: NumericBound {
                        op: RangeOp::Gte,
                        value: 18.0,
                        extent: None,
                    },
                },
                Filter::Concept {
                    column: Column::person("gender_concept_id"),
                    concepts: smallvec::smallvec![8532],
                    exclude: false,
                },
                Filter::Codeset {
                    column: Column::Visit("visit_concept_id".into()),
                    codeset_id: 4,
                    exclude: true,
                },
            ]
        );
    }

    #[test]
    fn test_measurement_ratio_and_abnormal() {
        let c = criteria(
            r#"{"Measurement": {"RangeHighRatio": {"Value": 1.5, "Op": "gt"}, "Abnormal": true}}"#,
        );
        let query = translator().criteria(&c, &root(), 0).unwrap();
        assert_eq!(query.filters.len(), 2);
        assert!(matches!(
            &query.filters[0],
            Filter::Numeric { operand: Operand::Ratio { denominator, .. }, .. } if denominator == "range_high"
        ));
        assert_eq!(query.filters[1], Filter::Abnormal);
    }

    #[test]
    fn test_period_codeset_is_ignored() {
        let c = criteria(
            r#"{"ObservationPeriod": {"CodesetId": 3, "UserDefinedPeriod": {"StartDate": "2020-01-01"}}}"#,
        );
        let query = translator().criteria(&c, &root(), 0).unwrap();
        assert_eq!(query.codeset_id, None);
        assert_eq!(
            query.user_period,
            Some(UserPeriod {
                start: NaiveDate::from_ymd_opt(2020, 1, 1),
                end: None,
            })
        );
    }

    #[test]
    fn test_numeric_range_without_value_is_skipped() {
        let c = criteria(r#"{"DrugExposure": {"Quantity": {"Op": "gt"}}}"#);
        let query = translator().criteria(&c, &root(), 0).unwrap();
        assert!(query.filters.is_empty());
    }

    #[test]
    fn test_location_region_is_unsupported() {
        let c = Criteria::LocationRegion(LocationRegion::default());
        let err = translator().criteria(&c, &root(), 0).unwrap_err();
        assert_eq!(err.code(), COH0200);
        assert!(err.to_string().contains("LocationRegion"));
        assert_eq!(err.location().map(ToString::to_string).as_deref(), Some("PrimaryCriteria.CriteriaList[0]"));
    }

    #[test]
    fn test_place_of_service_location_is_unsupported() {
        let c = criteria(r#"{"VisitOccurrence": {"PlaceOfServiceLocation": 2}}"#);
        let err = translator().criteria(&c, &root(), 0).unwrap_err();
        assert_eq!(err.code(), COH0200);
        assert_eq!(
            err.location().map(ToString::to_string).as_deref(),
            Some("PrimaryCriteria.CriteriaList[0].VisitOccurrence.PlaceOfServiceLocation")
        );
    }

    #[test]
    fn test_bad_range_reports_field_path() {
        let c = criteria(r#"{"Observation": {"ValueAsNumber": {"Value": 1, "Op": "between"}}}"#);
        let err = translator().criteria(&c, &root(), 0).unwrap_err();
        assert_eq!(err.code(), COH0008);
        assert_eq!(
            err.location().map(ToString::to_string).as_deref(),
            Some("PrimaryCriteria.CriteriaList[0].Observation.ValueAsNumber.Op")
        );
    }

    #[test]
    fn test_date_adjustment() {
        let c = Criteria::DrugExposure(DrugExposure {
            common: CriteriaCommon {
                date_adjustment: Some(DateAdjustment {
                    start_with: DateField::StartDate,
                    start_offset: -7,
                    end_with: DateField::StartDate,
                    end_offset: 30,
                }),
                ..CriteriaCommon::default()
            },
            ..DrugExposure::default()
        });
        let query = translator().criteria(&c, &root(), 0).unwrap();
        assert_eq!(
            query.date_adjustment,
            Some(DateAdjustmentPlan {
                start_with: DateField::StartDate,
                start_offset: -7,
                end_with: DateField::StartDate,
                end_offset: 30,
            })
        );
    }

    #[rstest]
    #[case(None, None, WindowSide::Start, Anchor::Start, Anchor::Start)]
    #[case(Some(true), Some(true), WindowSide::Start, Anchor::End, Anchor::End)]
    #[case(None, None, WindowSide::End, Anchor::Start, Anchor::End)]
    #[case(None, Some(false), WindowSide::End, Anchor::Start, Anchor::Start)]
    #[case(Some(true), Some(true), WindowSide::End, Anchor::End, Anchor::End)]
    fn test_window_anchors(
        #[case] use_index_end: Option<bool>,
        #[case] use_event_end: Option<bool>,
        #[case] side: WindowSide,
        #[case] index_anchor: Anchor,
        #[case] event_anchor: Anchor,
    ) {
        let window = Window {
            start: Some(Endpoint::before(30)),
            end: Some(Endpoint::unbounded(1)),
            use_index_end,
            use_event_end,
        };
        let plan = window_plan(&window, side);
        assert_eq!(plan.lower, Some(-30));
        assert_eq!(plan.upper, None);
        assert_eq!(plan.index_anchor, index_anchor);
        assert_eq!(plan.event_anchor, event_anchor);
    }

    #[test]
    fn test_group_drops_empty_children() {
        let group: CriteriaGroup = serde_json::from_str(
            r#"{"Type": "ALL",
                "CriteriaList": [{"Criteria": {"Death": {}}, "Occurrence": {"Type": 0, "Count": 0}}],
                "DemographicCriteriaList": [{}, {"Gender": [{"CONCEPT_ID": 8507}]}],
                "Groups": [{"Type": "ANY"}]}"#,
        )
        .unwrap();
        let plan = translator().group(&group, &ExpressionPath::root(), 1).unwrap();
        assert_eq!(plan.child_count(), 2);
        assert_eq!(plan.criteria[0].occurrence.kind, OccurrenceType::Exactly);
        assert_eq!(plan.criteria[0].occurrence.count, 0);
    }

    #[test]
    fn test_group_depth_guard() {
        let mut group = CriteriaGroup::new(GroupType::Any).with_demographic(DemographicCriteria {
            age: Some(NumericRange::new("gt", 1.0)),
            ..DemographicCriteria::default()
        });
        for _ in 0..4 {
            group = CriteriaGroup::new(GroupType::All).with_group(group);
        }
        assert!(CriteriaTranslator::new(5).group(&group, &ExpressionPath::root(), 1).is_ok());
        let err = CriteriaTranslator::new(4).group(&group, &ExpressionPath::root(), 1).unwrap_err();
        assert_eq!(err.code(), COH0012);
    }

    #[test]
    fn test_unsupported_count_column() {
        let occurrence = Occurrence {
            is_distinct: true,
            count_column: Some(CountColumn::Quantity),
            ..Occurrence::at_least(2)
        };
        let err = occurrence_plan(&occurrence, &ExpressionPath::root()).unwrap_err();
        assert_eq!(err.code(), COH0201);

        let distinct = Occurrence {
            is_distinct: true,
            count_column: None,
            ..Occurrence::at_least(2)
        };
        let plan = occurrence_plan(&distinct, &ExpressionPath::root()).unwrap();
        assert_eq!(plan.distinct, Some(DistinctColumn::DomainConcept));
    }

    #[test]
    fn test_end_strategies() {
        let t = translator();
        assert_eq!(t.end_strategy(None).unwrap(), EndPlan::Default);
        assert_eq!(t.end_strategy(Some(&EndStrategy::default())).unwrap(), EndPlan::Default);

        let strategy: EndStrategy =
            serde_json::from_str(r#"{"CustomEra": {"DrugCodesetId": 2, "GapDays": 30, "Offset": 7}}"#).unwrap();
        assert_eq!(
            t.end_strategy(Some(&strategy)).unwrap(),
            EndPlan::CustomEra {
                codeset_id: 2,
                gap_days: 30,
                offset: 7,
                days_supply_override: None,
                date_offset: None,
            }
        );
    }

    #[test]
    fn test_custom_era_carries_date_offset() {
        let both: EndStrategy = serde_json::from_str(
            r#"{"DateOffset": {"DateField": "EndDate", "Offset": 1}, "CustomEra": {"DrugCodesetId": 2}}"#,
        )
        .unwrap();
        assert_eq!(
            translator().end_strategy(Some(&both)).unwrap(),
            EndPlan::CustomEra {
                codeset_id: 2,
                gap_days: 0,
                offset: 0,
                days_supply_override: None,
                date_offset: Some(DateOffsetPlan {
                    field: DateField::EndDate,
                    offset: 1,
                }),
            }
        );
    }
}
