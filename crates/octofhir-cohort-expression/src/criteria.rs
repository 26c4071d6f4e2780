//! Domain criteria
//!
//! Criteria form a closed set of variants, one per clinical domain. On the
//! wire each criterion is a single-key object naming its variant:
//!
//! ```json
//! { "DrugExposure": { "CodesetId": 2, "First": true } }
//! ```
//!
//! Every variant shares [`CriteriaCommon`]: a concept-set reference, the
//! first-occurrence flag, a correlated criteria group anchored at the
//! criterion's own events, and a date adjustment.

use serde::{Deserialize, Serialize};

use crate::filters::{Concept, ConceptSetId, ConceptSetSelection, DateRange, NumericRange, TextFilter};
use crate::model::CriteriaGroup;

/// Wire names of every recognized criteria variant
pub const CRITERIA_VARIANTS: &[&str] = &[
    "ConditionOccurrence",
    "ConditionEra",
    "DrugExposure",
    "DrugEra",
    "DoseEra",
    "ProcedureOccurrence",
    "Measurement",
    "Observation",
    "VisitOccurrence",
    "VisitDetail",
    "DeviceExposure",
    "Specimen",
    "Death",
    "ObservationPeriod",
    "PayerPlanPeriod",
    "LocationRegion",
];

/// A domain criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Criteria {
    ConditionOccurrence(ConditionOccurrence),
    ConditionEra(ConditionEra),
    DrugExposure(DrugExposure),
    DrugEra(DrugEra),
    DoseEra(DoseEra),
    ProcedureOccurrence(ProcedureOccurrence),
    Measurement(Measurement),
    Observation(Observation),
    VisitOccurrence(VisitOccurrence),
    VisitDetail(VisitDetail),
    DeviceExposure(DeviceExposure),
    Specimen(Specimen),
    Death(Death),
    ObservationPeriod(ObservationPeriod),
    PayerPlanPeriod(PayerPlanPeriod),
    /// Recognized on the wire, not compiled
    LocationRegion(LocationRegion),
}

impl Criteria {
    /// The variant's wire name
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::ConditionOccurrence(_) => "ConditionOccurrence",
            Self::ConditionEra(_) => "ConditionEra",
            Self::DrugExposure(_) => "DrugExposure",
            Self::DrugEra(_) => "DrugEra",
            Self::DoseEra(_) => "DoseEra",
            Self::ProcedureOccurrence(_) => "ProcedureOccurrence",
            Self::Measurement(_) => "Measurement",
            Self::Observation(_) => "Observation",
            Self::VisitOccurrence(_) => "VisitOccurrence",
            Self::VisitDetail(_) => "VisitDetail",
            Self::DeviceExposure(_) => "DeviceExposure",
            Self::Specimen(_) => "Specimen",
            Self::Death(_) => "Death",
            Self::ObservationPeriod(_) => "ObservationPeriod",
            Self::PayerPlanPeriod(_) => "PayerPlanPeriod",
            Self::LocationRegion(_) => "LocationRegion",
        }
    }

    /// Attributes shared by every variant
    pub fn common(&self) -> &CriteriaCommon {
        match self {
            Self::ConditionOccurrence(c) => &c.common,
            Self::ConditionEra(c) => &c.common,
            Self::DrugExposure(c) => &c.common,
            Self::DrugEra(c) => &c.common,
            Self::DoseEra(c) => &c.common,
            Self::ProcedureOccurrence(c) => &c.common,
            Self::Measurement(c) => &c.common,
            Self::Observation(c) => &c.common,
            Self::VisitOccurrence(c) => &c.common,
            Self::VisitDetail(c) => &c.common,
            Self::DeviceExposure(c) => &c.common,
            Self::Specimen(c) => &c.common,
            Self::Death(c) => &c.common,
            Self::ObservationPeriod(c) => &c.common,
            Self::PayerPlanPeriod(c) => &c.common,
            Self::LocationRegion(c) => &c.common,
        }
    }
}

// ============================================================================
// Shared attributes
// ============================================================================

/// Which bound of an event a date adjustment starts from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateField {
    #[default]
    StartDate,
    EndDate,
}

/// Shift of an event's start and end dates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DateAdjustment {
    #[serde(default)]
    pub start_with: DateField,
    #[serde(default)]
    pub start_offset: i32,
    #[serde(default = "end_date_field")]
    pub end_with: DateField,
    #[serde(default)]
    pub end_offset: i32,
}

fn end_date_field() -> DateField {
    DateField::EndDate
}

/// Attributes accepted by every criteria variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CriteriaCommon {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codeset_id: Option<ConceptSetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlated_criteria: Option<Box<CriteriaGroup>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_adjustment: Option<DateAdjustment>,
}

impl CriteriaCommon {
    pub fn with_codeset(codeset_id: ConceptSetId) -> Self {
        Self {
            codeset_id: Some(codeset_id),
            ..Self::default()
        }
    }

    pub fn is_first(&self) -> bool {
        self.first.unwrap_or(false)
    }
}

/// Start/end override for period criteria
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UserDefinedPeriod {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

// ============================================================================
// Occurrence domains
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ConditionOccurrence {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_end_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub condition_type: Vec<Concept>,
    #[serde(rename = "ConditionTypeCS", skip_serializing_if = "Option::is_none")]
    pub condition_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_type_exclude: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<TextFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_source_concept: Option<ConceptSetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub provider_specialty: Vec<Concept>,
    #[serde(rename = "ProviderSpecialtyCS", skip_serializing_if = "Option::is_none")]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub visit_type: Vec<Concept>,
    #[serde(rename = "VisitTypeCS", skip_serializing_if = "Option::is_none")]
    pub visit_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub condition_status: Vec<Concept>,
    #[serde(rename = "ConditionStatusCS", skip_serializing_if = "Option::is_none")]
    pub condition_status_cs: Option<ConceptSetSelection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DrugExposure {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_end_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub drug_type: Vec<Concept>,
    #[serde(rename = "DrugTypeCS", skip_serializing_if = "Option::is_none")]
    pub drug_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drug_type_exclude: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub route_concept: Vec<Concept>,
    #[serde(rename = "RouteConceptCS", skip_serializing_if = "Option::is_none")]
    pub route_concept_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_drug_dose: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dose_unit: Vec<Concept>,
    #[serde(rename = "DoseUnitCS", skip_serializing_if = "Option::is_none")]
    pub dose_unit_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_supply: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refills: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<TextFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_number: Option<TextFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub provider_specialty: Vec<Concept>,
    #[serde(rename = "ProviderSpecialtyCS", skip_serializing_if = "Option::is_none")]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub visit_type: Vec<Concept>,
    #[serde(rename = "VisitTypeCS", skip_serializing_if = "Option::is_none")]
    pub visit_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drug_source_concept: Option<ConceptSetId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProcedureOccurrence {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_end_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub procedure_type: Vec<Concept>,
    #[serde(rename = "ProcedureTypeCS", skip_serializing_if = "Option::is_none")]
    pub procedure_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procedure_type_exclude: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modifier: Vec<Concept>,
    #[serde(rename = "ModifierCS", skip_serializing_if = "Option::is_none")]
    pub modifier_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub provider_specialty: Vec<Concept>,
    #[serde(rename = "ProviderSpecialtyCS", skip_serializing_if = "Option::is_none")]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub visit_type: Vec<Concept>,
    #[serde(rename = "VisitTypeCS", skip_serializing_if = "Option::is_none")]
    pub visit_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procedure_source_concept: Option<ConceptSetId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Measurement {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_end_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub measurement_type: Vec<Concept>,
    #[serde(rename = "MeasurementTypeCS", skip_serializing_if = "Option::is_none")]
    pub measurement_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_type_exclude: Option<bool>,
    #[serde(alias = "OperatorConcept", skip_serializing_if = "Vec::is_empty")]
    pub operator: Vec<Concept>,
    #[serde(rename = "OperatorCS", alias = "OperatorConceptCS", skip_serializing_if = "Option::is_none")]
    pub operator_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_as_number: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub value_as_concept: Vec<Concept>,
    #[serde(rename = "ValueAsConceptCS", skip_serializing_if = "Option::is_none")]
    pub value_as_concept_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unit: Vec<Concept>,
    #[serde(rename = "UnitCS", skip_serializing_if = "Option::is_none")]
    pub unit_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_low: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_high: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_low_ratio: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_high_ratio: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abnormal: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub provider_specialty: Vec<Concept>,
    #[serde(rename = "ProviderSpecialtyCS", skip_serializing_if = "Option::is_none")]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub visit_type: Vec<Concept>,
    #[serde(rename = "VisitTypeCS", skip_serializing_if = "Option::is_none")]
    pub visit_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_source_concept: Option<ConceptSetId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Observation {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_end_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub observation_type: Vec<Concept>,
    #[serde(rename = "ObservationTypeCS", skip_serializing_if = "Option::is_none")]
    pub observation_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation_type_exclude: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub qualifier: Vec<Concept>,
    #[serde(rename = "QualifierCS", skip_serializing_if = "Option::is_none")]
    pub qualifier_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unit: Vec<Concept>,
    #[serde(rename = "UnitCS", skip_serializing_if = "Option::is_none")]
    pub unit_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_as_number: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub value_as_concept: Vec<Concept>,
    #[serde(rename = "ValueAsConceptCS", skip_serializing_if = "Option::is_none")]
    pub value_as_concept_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_as_string: Option<TextFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub provider_specialty: Vec<Concept>,
    #[serde(rename = "ProviderSpecialtyCS", skip_serializing_if = "Option::is_none")]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub visit_type: Vec<Concept>,
    #[serde(rename = "VisitTypeCS", skip_serializing_if = "Option::is_none")]
    pub visit_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation_source_concept: Option<ConceptSetId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeviceExposure {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_end_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub device_type: Vec<Concept>,
    #[serde(rename = "DeviceTypeCS", skip_serializing_if = "Option::is_none")]
    pub device_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type_exclude: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_device_id: Option<TextFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub provider_specialty: Vec<Concept>,
    #[serde(rename = "ProviderSpecialtyCS", skip_serializing_if = "Option::is_none")]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub visit_type: Vec<Concept>,
    #[serde(rename = "VisitTypeCS", skip_serializing_if = "Option::is_none")]
    pub visit_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_source_concept: Option<ConceptSetId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Specimen {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub specimen_type: Vec<Concept>,
    #[serde(rename = "SpecimenTypeCS", skip_serializing_if = "Option::is_none")]
    pub specimen_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specimen_type_exclude: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unit: Vec<Concept>,
    #[serde(rename = "UnitCS", skip_serializing_if = "Option::is_none")]
    pub unit_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub anatomic_site: Vec<Concept>,
    #[serde(rename = "AnatomicSiteCS", skip_serializing_if = "Option::is_none")]
    pub anatomic_site_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disease_status: Vec<Concept>,
    #[serde(rename = "DiseaseStatusCS", skip_serializing_if = "Option::is_none")]
    pub disease_status_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<TextFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specimen_source_concept: Option<ConceptSetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Death {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub death_type: Vec<Concept>,
    #[serde(rename = "DeathTypeCS", skip_serializing_if = "Option::is_none")]
    pub death_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub death_type_exclude: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub death_source_concept: Option<ConceptSetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
}

// ============================================================================
// Visit domains
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VisitOccurrence {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_end_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub visit_type: Vec<Concept>,
    #[serde(rename = "VisitTypeCS", skip_serializing_if = "Option::is_none")]
    pub visit_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_type_exclude: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_source_concept: Option<ConceptSetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_length: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub provider_specialty: Vec<Concept>,
    #[serde(rename = "ProviderSpecialtyCS", skip_serializing_if = "Option::is_none")]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub place_of_service: Vec<Concept>,
    #[serde(rename = "PlaceOfServiceCS", skip_serializing_if = "Option::is_none")]
    pub place_of_service_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_of_service_location: Option<ConceptSetId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VisitDetail {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_detail_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_detail_end_date: Option<DateRange>,
    #[serde(rename = "VisitDetailTypeCS", skip_serializing_if = "Option::is_none")]
    pub visit_detail_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_detail_source_concept: Option<ConceptSetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_detail_length: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<NumericRange>,
    #[serde(rename = "GenderCS", skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(rename = "ProviderSpecialtyCS", skip_serializing_if = "Option::is_none")]
    pub provider_specialty_cs: Option<ConceptSetSelection>,
    #[serde(rename = "PlaceOfServiceCS", skip_serializing_if = "Option::is_none")]
    pub place_of_service_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_of_service_location: Option<ConceptSetId>,
}

// ============================================================================
// Era domains
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ConditionEra {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub era_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub era_end_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_count: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub era_length: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_at_start: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_at_end: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DrugEra {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub era_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub era_end_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_count: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub era_length: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap_days: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_at_start: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_at_end: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DoseEra {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub era_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub era_end_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unit: Vec<Concept>,
    #[serde(rename = "UnitCS", skip_serializing_if = "Option::is_none")]
    pub unit_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dose_value: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub era_length: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_at_start: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_at_end: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
}

// ============================================================================
// Period domains
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ObservationPeriod {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_end_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_defined_period: Option<UserDefinedPeriod>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub period_type: Vec<Concept>,
    #[serde(rename = "PeriodTypeCS", skip_serializing_if = "Option::is_none")]
    pub period_type_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_length: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_at_start: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_at_end: Option<NumericRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PayerPlanPeriod {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_end_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_defined_period: Option<UserDefinedPeriod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_length: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_at_start: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_at_end: Option<NumericRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<Concept>,
    #[serde(rename = "GenderCS", skip_serializing_if = "Option::is_none")]
    pub gender_cs: Option<ConceptSetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer_concept: Option<ConceptSetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_concept: Option<ConceptSetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsor_concept: Option<ConceptSetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason_concept: Option<ConceptSetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer_source_concept: Option<ConceptSetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_source_concept: Option<ConceptSetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsor_source_concept: Option<ConceptSetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason_source_concept: Option<ConceptSetId>,
}

/// Geographic criterion; parsed so it can be reported by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LocationRegion {
    #[serde(flatten)]
    pub common: CriteriaCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateRange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_externally_tagged_variant() {
        let json = r#"{"DrugExposure": {"CodesetId": 2, "First": true, "DrugTypeCS": {"CodesetId": 4}}}"#;
        let criteria: Criteria = serde_json::from_str(json).unwrap();
        assert_eq!(criteria.variant_name(), "DrugExposure");
        assert_eq!(criteria.common().codeset_id, Some(2));
        assert!(criteria.common().is_first());
        let Criteria::DrugExposure(drug) = criteria else {
            panic!("expected DrugExposure");
        };
        assert_eq!(drug.drug_type_cs.map(|cs| cs.codeset_id), Some(4));
    }

    #[test]
    fn test_measurement_operator_alias() {
        let json = r#"{"Measurement": {"OperatorConcept": [{"CONCEPT_ID": 4172703}]}}"#;
        let Criteria::Measurement(m) = serde_json::from_str::<Criteria>(json).unwrap() else {
            panic!("expected Measurement");
        };
        assert_eq!(m.operator.len(), 1);
        let out = serde_json::to_string(&Criteria::Measurement(m)).unwrap();
        assert!(out.contains("\"Operator\""));
    }

    #[test]
    fn test_unknown_variant_is_rejected() {
        let json = r#"{"Immunization": {"CodesetId": 1}}"#;
        assert!(serde_json::from_str::<Criteria>(json).is_err());
    }

    #[test]
    fn test_empty_fields_are_not_serialized() {
        let criteria = Criteria::ConditionOccurrence(ConditionOccurrence {
            common: CriteriaCommon::with_codeset(1),
            ..Default::default()
        });
        let out = serde_json::to_string(&criteria).unwrap();
        assert_eq!(out, r#"{"ConditionOccurrence":{"CodesetId":1}}"#);
    }
}
