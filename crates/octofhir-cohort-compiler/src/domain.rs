//! Clinical domains and their warehouse tables
//!
//! Every compilable criteria variant maps to exactly one [`Domain`], and every
//! domain maps to one [`DomainTable`] describing the columns compiled queries
//! read. The mapping is total over the supported variants.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Columns shared by every person-scoped table
pub const PERSON_ID: &str = "person_id";
pub const PROVIDER_ID: &str = "provider_id";
pub const CARE_SITE_ID: &str = "care_site_id";
pub const VISIT_OCCURRENCE_ID: &str = "visit_occurrence_id";

/// Layout of a domain table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainTable {
    pub table: &'static str,
    /// Row identifier; `None` for tables keyed only by person
    pub primary_key: Option<&'static str>,
    pub start_date: &'static str,
    pub end_date: Option<&'static str>,
    /// Standard concept column filtered by `CodesetId`
    pub concept: Option<&'static str>,
    pub source_concept: Option<&'static str>,
    /// Visit occurrence the row belongs to
    pub visit: Option<&'static str>,
}

/// A clinical domain of the warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Domain {
    ConditionOccurrence,
    ConditionEra,
    DrugExposure,
    DrugEra,
    DoseEra,
    ProcedureOccurrence,
    Measurement,
    Observation,
    VisitOccurrence,
    VisitDetail,
    DeviceExposure,
    Specimen,
    Death,
    ObservationPeriod,
    PayerPlanPeriod,
}

impl Domain {
    pub const ALL: [Domain; 15] = [
        Self::ConditionOccurrence,
        Self::ConditionEra,
        Self::DrugExposure,
        Self::DrugEra,
        Self::DoseEra,
        Self::ProcedureOccurrence,
        Self::Measurement,
        Self::Observation,
        Self::VisitOccurrence,
        Self::VisitDetail,
        Self::DeviceExposure,
        Self::Specimen,
        Self::Death,
        Self::ObservationPeriod,
        Self::PayerPlanPeriod,
    ];

    pub fn table(&self) -> &'static DomainTable {
        match self {
            Self::ConditionOccurrence => &CONDITION_OCCURRENCE,
            Self::ConditionEra => &CONDITION_ERA,
            Self::DrugExposure => &DRUG_EXPOSURE,
            Self::DrugEra => &DRUG_ERA,
            Self::DoseEra => &DOSE_ERA,
            Self::ProcedureOccurrence => &PROCEDURE_OCCURRENCE,
            Self::Measurement => &MEASUREMENT,
            Self::Observation => &OBSERVATION,
            Self::VisitOccurrence => &VISIT_OCCURRENCE,
            Self::VisitDetail => &VISIT_DETAIL,
            Self::DeviceExposure => &DEVICE_EXPOSURE,
            Self::Specimen => &SPECIMEN,
            Self::Death => &DEATH,
            Self::ObservationPeriod => &OBSERVATION_PERIOD,
            Self::PayerPlanPeriod => &PAYER_PLAN_PERIOD,
        }
    }

    pub fn has_end_date(&self) -> bool {
        self.table().end_date.is_some()
    }

    /// Whether rows carry a visit occurrence id
    pub fn has_visit(&self) -> bool {
        self.table().visit.is_some()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table().table)
    }
}

const CONDITION_OCCURRENCE: DomainTable = DomainTable {
    table: "condition_occurrence",
    primary_key: Some("condition_occurrence_id"),
    start_date: "condition_start_date",
    end_date: Some("condition_end_date"),
    concept: Some("condition_concept_id"),
    source_concept: Some("condition_source_concept_id"),
    visit: Some(VISIT_OCCURRENCE_ID),
};

const CONDITION_ERA: DomainTable = DomainTable {
    table: "condition_era",
    primary_key: Some("condition_era_id"),
    start_date: "condition_era_start_date",
    end_date: Some("condition_era_end_date"),
    concept: Some("condition_concept_id"),
    source_concept: None,
    visit: None,
};

const DRUG_EXPOSURE: DomainTable = DomainTable {
    table: "drug_exposure",
    primary_key: Some("drug_exposure_id"),
    start_date: "drug_exposure_start_date",
    end_date: Some("drug_exposure_end_date"),
    concept: Some("drug_concept_id"),
    source_concept: Some("drug_source_concept_id"),
    visit: Some(VISIT_OCCURRENCE_ID),
};

const DRUG_ERA: DomainTable = DomainTable {
    table: "drug_era",
    primary_key: Some("drug_era_id"),
    start_date: "drug_era_start_date",
    end_date: Some("drug_era_end_date"),
    concept: Some("drug_concept_id"),
    source_concept: None,
    visit: None,
};

const DOSE_ERA: DomainTable = DomainTable {
    table: "dose_era",
    primary_key: Some("dose_era_id"),
    start_date: "dose_era_start_date",
    end_date: Some("dose_era_end_date"),
    concept: Some("drug_concept_id"),
    source_concept: None,
    visit: None,
};

const PROCEDURE_OCCURRENCE: DomainTable = DomainTable {
    table: "procedure_occurrence",
    primary_key: Some("procedure_occurrence_id"),
    start_date: "procedure_date",
    end_date: None,
    concept: Some("procedure_concept_id"),
    source_concept: Some("procedure_source_concept_id"),
    visit: Some(VISIT_OCCURRENCE_ID),
};

const MEASUREMENT: DomainTable = DomainTable {
    table: "measurement",
    primary_key: Some("measurement_id"),
    start_date: "measurement_date",
    end_date: None,
    concept: Some("measurement_concept_id"),
    source_concept: Some("measurement_source_concept_id"),
    visit: Some(VISIT_OCCURRENCE_ID),
};

const OBSERVATION: DomainTable = DomainTable {
    table: "observation",
    primary_key: Some("observation_id"),
    start_date: "observation_date",
    end_date: None,
    concept: Some("observation_concept_id"),
    source_concept: Some("observation_source_concept_id"),
    visit: Some(VISIT_OCCURRENCE_ID),
};

const VISIT_OCCURRENCE: DomainTable = DomainTable {
    table: "visit_occurrence",
    primary_key: Some("visit_occurrence_id"),
    start_date: "visit_start_date",
    end_date: Some("visit_end_date"),
    concept: Some("visit_concept_id"),
    source_concept: Some("visit_source_concept_id"),
    visit: Some(VISIT_OCCURRENCE_ID),
};

const VISIT_DETAIL: DomainTable = DomainTable {
    table: "visit_detail",
    primary_key: Some("visit_detail_id"),
    start_date: "visit_detail_start_date",
    end_date: Some("visit_detail_end_date"),
    concept: Some("visit_detail_concept_id"),
    source_concept: Some("visit_detail_source_concept_id"),
    visit: Some(VISIT_OCCURRENCE_ID),
};

const DEVICE_EXPOSURE: DomainTable = DomainTable {
    table: "device_exposure",
    primary_key: Some("device_exposure_id"),
    start_date: "device_exposure_start_date",
    end_date: Some("device_exposure_end_date"),
    concept: Some("device_concept_id"),
    source_concept: Some("device_source_concept_id"),
    visit: Some(VISIT_OCCURRENCE_ID),
};

const SPECIMEN: DomainTable = DomainTable {
    table: "specimen",
    primary_key: Some("specimen_id"),
    start_date: "specimen_date",
    end_date: None,
    concept: Some("specimen_concept_id"),
    source_concept: Some("specimen_source_concept_id"),
    visit: None,
};

const DEATH: DomainTable = DomainTable {
    table: "death",
    primary_key: None,
    start_date: "death_date",
    end_date: None,
    concept: Some("cause_concept_id"),
    source_concept: Some("cause_source_concept_id"),
    visit: None,
};

const OBSERVATION_PERIOD: DomainTable = DomainTable {
    table: "observation_period",
    primary_key: Some("observation_period_id"),
    start_date: "observation_period_start_date",
    end_date: Some("observation_period_end_date"),
    concept: None,
    source_concept: None,
    visit: None,
};

const PAYER_PLAN_PERIOD: DomainTable = DomainTable {
    table: "payer_plan_period",
    primary_key: Some("payer_plan_period_id"),
    start_date: "payer_plan_period_start_date",
    end_date: Some("payer_plan_period_end_date"),
    concept: None,
    source_concept: None,
    visit: None,
};
