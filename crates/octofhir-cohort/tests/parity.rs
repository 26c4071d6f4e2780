//! Emitted SQL against an embedded DuckDB warehouse
//!
//! Each fixture is loaded into DuckDB for the emitted DuckDB query and into
//! the in-memory warehouse for the executor; both must report the same eras
//! and the same attrition.

use std::sync::Arc;

use chrono::NaiveDate;
use duckdb::Connection;
use octofhir_cohort::eval::AttritionRecord;
use octofhir_cohort::{
    CohortEra, CohortExecutor, CohortResult, Dialect, EmitOptions, InMemoryVocabulary, InMemoryWarehouse,
    SqlEmitter, compile_json,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{Value as JsonValue, json};

const WAREHOUSE_DDL: &str = r#"
CREATE SCHEMA cdm;
CREATE TABLE cdm.person (
    person_id BIGINT, year_of_birth INTEGER, month_of_birth INTEGER, day_of_birth INTEGER,
    gender_concept_id BIGINT, race_concept_id BIGINT, ethnicity_concept_id BIGINT,
    location_id BIGINT, provider_id BIGINT, care_site_id BIGINT
);
CREATE TABLE cdm.observation_period (
    observation_period_id BIGINT, person_id BIGINT,
    observation_period_start_date DATE, observation_period_end_date DATE,
    period_type_concept_id BIGINT
);
CREATE TABLE cdm.condition_occurrence (
    condition_occurrence_id BIGINT, person_id BIGINT, condition_concept_id BIGINT,
    condition_start_date DATE, condition_end_date DATE, condition_type_concept_id BIGINT,
    condition_status_concept_id BIGINT, stop_reason VARCHAR, provider_id BIGINT,
    visit_occurrence_id BIGINT, visit_detail_id BIGINT, condition_source_concept_id BIGINT
);
CREATE TABLE cdm.drug_exposure (
    drug_exposure_id BIGINT, person_id BIGINT, drug_concept_id BIGINT,
    drug_exposure_start_date DATE, drug_exposure_end_date DATE, drug_type_concept_id BIGINT,
    stop_reason VARCHAR, refills INTEGER, quantity DOUBLE, days_supply INTEGER,
    route_concept_id BIGINT, lot_number VARCHAR, provider_id BIGINT,
    visit_occurrence_id BIGINT, visit_detail_id BIGINT, drug_source_concept_id BIGINT
);
CREATE TABLE cdm.death (
    person_id BIGINT, death_date DATE, death_type_concept_id BIGINT,
    cause_concept_id BIGINT, cause_source_concept_id BIGINT
);
"#;

/// Read by the vocabulary, never by the emitted query
const VOCABULARY_TABLES: [&str; 2] = ["concept", "concept_ancestor"];

const DIABETES: &str = r#"{
    "ConceptSets": [
        {"id": 0, "name": "Type 2 diabetes", "expression": {"items": [
            {"concept": {"CONCEPT_ID": 201826}, "includeDescendants": true}
        ]}},
        {"id": 1, "name": "Metformin", "expression": {"items": [
            {"concept": {"CONCEPT_ID": 1503297}}
        ]}}
    ],
    "PrimaryCriteria": {
        "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 0}}],
        "ObservationWindow": {"PriorDays": 365, "PostDays": 0},
        "PrimaryCriteriaLimit": {"Type": "All"}
    },
    "InclusionRules": [
        {"name": "metformin within 180 days", "expression": {
            "Type": "AT_LEAST", "Count": 1,
            "CriteriaList": [{
                "Criteria": {"DrugExposure": {"CodesetId": 1}},
                "StartWindow": {"Start": {"Days": 0, "Coeff": 1}, "End": {"Days": 180, "Coeff": 1}},
                "Occurrence": {"Type": 2, "Count": 1}
            }]
        }}
    ],
    "CollapseSettings": {"CollapseType": "ERA", "EraPad": 30}
}"#;

const METFORMIN_ERAS: &str = r#"{
    "ConceptSets": [
        {"id": 1, "name": "Metformin", "expression": {"items": [
            {"concept": {"CONCEPT_ID": 1503297}}
        ]}}
    ],
    "PrimaryCriteria": {
        "CriteriaList": [{"DrugExposure": {"CodesetId": 1}}],
        "ObservationWindow": {"PriorDays": 0, "PostDays": 0},
        "PrimaryCriteriaLimit": {"Type": "All"}
    },
    "EndStrategy": {"CustomEra": {"DrugCodesetId": 1, "GapDays": 30, "Offset": 0}},
    "CensoringCriteria": [{"Death": {}}],
    "CollapseSettings": {"CollapseType": "ERA", "EraPad": 0}
}"#;

const NEW_USERS: &str = r#"{
    "ConceptSets": [
        {"id": 0, "name": "Type 2 diabetes", "expression": {"items": [
            {"concept": {"CONCEPT_ID": 201826}, "includeDescendants": true}
        ]}},
        {"id": 1, "name": "Metformin", "expression": {"items": [
            {"concept": {"CONCEPT_ID": 1503297}}
        ]}},
        {"id": 2, "name": "Insulin", "expression": {"items": [
            {"concept": {"CONCEPT_ID": 1596977}}
        ]}}
    ],
    "PrimaryCriteria": {
        "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 0}}],
        "ObservationWindow": {"PriorDays": 0, "PostDays": 0},
        "PrimaryCriteriaLimit": {"Type": "All"}
    },
    "QualifiedLimit": {"Type": "First"},
    "InclusionRules": [
        {"name": "no insulin in the prior year", "expression": {
            "Type": "ALL",
            "CriteriaList": [{
                "Criteria": {"DrugExposure": {"CodesetId": 2}},
                "StartWindow": {"Start": {"Days": 365, "Coeff": -1}, "End": {"Days": 0, "Coeff": 1}},
                "Occurrence": {"Type": 1, "Count": 0}
            }]
        }},
        {"name": "metformin or aged 65", "expression": {
            "Type": "ANY",
            "CriteriaList": [{
                "Criteria": {"DrugExposure": {"CodesetId": 1}},
                "StartWindow": {"Start": {"Days": 0, "Coeff": 1}, "End": {"Days": 90, "Coeff": 1}},
                "Occurrence": {"Type": 2, "Count": 1}
            }],
            "DemographicCriteriaList": [{"Age": {"Value": 65, "Op": "gte"}}]
        }},
        {"name": "no repeat diagnosis within 30 days", "expression": {
            "Type": "AT_MOST", "Count": 0,
            "CriteriaList": [{
                "Criteria": {"ConditionOccurrence": {"CodesetId": 0}},
                "StartWindow": {"Start": {"Days": 1, "Coeff": 1}, "End": {"Days": 30, "Coeff": 1}},
                "Occurrence": {"Type": 2, "Count": 1}
            }]
        }}
    ],
    "EndStrategy": {"DateOffset": {"DateField": "EndDate", "Offset": 30}},
    "CollapseSettings": {"CollapseType": "ERA", "EraPad": 10}
}"#;

fn observed(person_id: i64) -> JsonValue {
    json!({
        "observation_period_id": person_id,
        "person_id": person_id,
        "observation_period_start_date": "2018-01-01",
        "observation_period_end_date": "2022-12-31"
    })
}

fn condition(id: i64, person_id: i64, start: &str, end: &str) -> JsonValue {
    json!({
        "condition_occurrence_id": id,
        "person_id": person_id,
        "condition_concept_id": 443238,
        "condition_start_date": start,
        "condition_end_date": end
    })
}

fn drug(id: i64, person_id: i64, concept_id: i64, start: &str, days_supply: i64) -> JsonValue {
    json!({
        "drug_exposure_id": id,
        "person_id": person_id,
        "drug_concept_id": concept_id,
        "drug_exposure_start_date": start,
        "days_supply": days_supply
    })
}

fn diabetes_warehouse() -> JsonValue {
    json!({
        "concept": [{"concept_id": 201826}, {"concept_id": 443238}, {"concept_id": 1503297}],
        "concept_ancestor": [{"ancestor_concept_id": 201826, "descendant_concept_id": 443238}],
        "person": [
            {"person_id": 1, "year_of_birth": 1950},
            {"person_id": 2, "year_of_birth": 1990},
            {"person_id": 3, "year_of_birth": 1960}
        ],
        "observation_period": [observed(1), observed(2), observed(3)],
        "condition_occurrence": [
            condition(11, 1, "2020-01-01", "2020-01-10"),
            condition(12, 1, "2020-01-30", "2020-02-05"),
            condition(21, 2, "2020-01-01", "2020-01-10"),
            condition(22, 2, "2020-02-19", "2020-02-25"),
            condition(31, 3, "2020-01-01", "2020-01-10")
        ],
        "drug_exposure": [
            drug(101, 1, 1503297, "2020-02-01", 30),
            drug(201, 2, 1503297, "2020-03-01", 30)
        ]
    })
}

fn metformin_warehouse() -> JsonValue {
    json!({
        "concept": [{"concept_id": 1503297}],
        "person": [{"person_id": 1, "year_of_birth": 1950}, {"person_id": 2, "year_of_birth": 1950}],
        "observation_period": [observed(1), observed(2)],
        "drug_exposure": [
            drug(1, 1, 1503297, "2020-01-01", 30),
            drug(2, 1, 1503297, "2020-02-20", 30),
            drug(3, 2, 1503297, "2020-01-01", 10),
            drug(4, 2, 1503297, "2020-03-01", 10)
        ],
        "death": [{"person_id": 1, "death_date": "2020-03-01"}]
    })
}

/// Subject 1 passes every rule twice, subject 2 once; subject 3 had
/// insulin and subject 4 is young without metformin.
fn new_users_warehouse() -> JsonValue {
    json!({
        "concept": [
            {"concept_id": 201826}, {"concept_id": 443238},
            {"concept_id": 1503297}, {"concept_id": 1596977}
        ],
        "concept_ancestor": [{"ancestor_concept_id": 201826, "descendant_concept_id": 443238}],
        "person": [
            {"person_id": 1, "year_of_birth": 1950},
            {"person_id": 2, "year_of_birth": 1990},
            {"person_id": 3, "year_of_birth": 1985},
            {"person_id": 4, "year_of_birth": 1960}
        ],
        "observation_period": [observed(1), observed(2), observed(3), observed(4)],
        "condition_occurrence": [
            condition(11, 1, "2020-01-01", "2020-01-05"),
            condition(12, 1, "2020-03-01", "2020-03-03"),
            condition(21, 2, "2020-02-01", "2020-02-02"),
            condition(22, 2, "2020-02-15", "2020-02-16"),
            condition(31, 3, "2020-05-01", "2020-05-10"),
            condition(41, 4, "2020-04-01", "2020-04-02")
        ],
        "drug_exposure": [
            drug(201, 2, 1503297, "2020-02-20", 30),
            drug(301, 3, 1596977, "2020-01-01", 30),
            drug(302, 3, 1503297, "2020-05-05", 30),
            drug(401, 4, 1596977, "2018-01-10", 30)
        ]
    })
}

fn with_era_pad(document: &str, pad: i64) -> String {
    let mut value: JsonValue = serde_json::from_str(document).unwrap();
    value["CollapseSettings"]["EraPad"] = json!(pad);
    value.to_string()
}

fn literal(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::String(text) => format!("'{}'", text.replace('\'', "''")),
        other => other.to_string(),
    }
}

/// An in-memory DuckDB database holding the fixture's clinical tables under `cdm`
fn duckdb_warehouse(tables: &JsonValue) -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(WAREHOUSE_DDL).unwrap();
    for (table, rows) in tables.as_object().unwrap() {
        if VOCABULARY_TABLES.contains(&table.as_str()) {
            continue;
        }
        for row in rows.as_array().unwrap() {
            let row = row.as_object().unwrap();
            let columns: Vec<&str> = row.keys().map(String::as_str).collect();
            let values: Vec<String> = row.values().map(literal).collect();
            conn.execute_batch(&format!(
                "INSERT INTO cdm.{table} ({}) VALUES ({});",
                columns.join(", "),
                values.join(", ")
            ))
            .unwrap();
        }
    }
    conn
}

fn date(text: &str) -> NaiveDate {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
}

fn query_eras(conn: &Connection, cohort: &str) -> Vec<CohortEra> {
    let sql = format!(
        "SELECT CAST(subject_id AS BIGINT), CAST(cohort_start_date AS VARCHAR), CAST(cohort_end_date AS VARCHAR)\nFROM (\n{cohort}\n) c\nORDER BY 1, 2"
    );
    let mut stmt = conn.prepare(&sql).unwrap();
    stmt.query_map([], |row| {
        Ok(CohortEra {
            subject_id: row.get(0)?,
            cohort_start_date: date(&row.get::<_, String>(1)?),
            cohort_end_date: date(&row.get::<_, String>(2)?),
        })
    })
    .unwrap()
    .collect::<Result<_, _>>()
    .unwrap()
}

fn query_attrition(conn: &Connection, attrition: &str) -> Vec<AttritionRecord> {
    let sql = format!(
        "SELECT CAST(rule_index AS BIGINT), rule_name, CAST(surviving_count AS BIGINT), CAST(surviving_persons AS BIGINT)\nFROM (\n{attrition}\n) a\nORDER BY 1"
    );
    let mut stmt = conn.prepare(&sql).unwrap();
    stmt.query_map([], |row| {
        Ok(AttritionRecord {
            rule_index: row.get::<_, i64>(0)? as usize,
            rule_name: row.get(1)?,
            surviving_count: row.get::<_, i64>(2)? as usize,
            surviving_persons: row.get::<_, i64>(3)? as usize,
        })
    })
    .unwrap()
    .collect::<Result<_, _>>()
    .unwrap()
}

/// Results of the emitted DuckDB query and of the executor, in that order
async fn run_both(document: &str, tables: &JsonValue) -> (CohortResult, CohortResult) {
    let vocabulary = InMemoryVocabulary::from_warehouse_tables(tables).unwrap();
    let plan = compile_json(document, Arc::new(vocabulary)).await.unwrap().plan;

    let warehouse = InMemoryWarehouse::from_value(tables).unwrap();
    let executed = CohortExecutor::new(&warehouse).execute(&plan).unwrap();

    let emitter = SqlEmitter::new(EmitOptions::new().with_dialect(Dialect::DuckDb).with_attrition(true)).unwrap();
    let query = emitter.emit(&plan).unwrap();
    let conn = duckdb_warehouse(tables);
    let queried = CohortResult {
        eras: query_eras(&conn, &query.cohort),
        attrition: query
            .attrition
            .as_deref()
            .map(|sql| query_attrition(&conn, sql))
            .unwrap_or_default(),
    };
    (queried, executed)
}

#[tokio::test]
async fn test_diabetes_cohort_matches_executor() {
    let (queried, executed) = run_both(DIABETES, &diabetes_warehouse()).await;
    assert_eq!(queried, executed);
    assert_eq!(queried.subjects(), vec![1, 2]);
    assert_eq!(queried.attrition[0].surviving_count, 4);
}

#[tokio::test]
async fn test_drug_era_and_censoring_match_executor() {
    let (queried, executed) = run_both(METFORMIN_ERAS, &metformin_warehouse()).await;
    assert_eq!(queried, executed);
    assert_eq!(queried.eras.len(), 3);
    assert_eq!(queried.eras[0].cohort_end_date, date("2020-03-01"));
}

#[tokio::test]
async fn test_nested_rules_match_executor() {
    let (queried, executed) = run_both(NEW_USERS, &new_users_warehouse()).await;
    assert_eq!(queried, executed);
    assert_eq!(queried.subjects(), vec![1, 2]);
    assert_eq!(queried.attrition.len(), 3);
}

#[tokio::test]
async fn test_date_offset_after_drug_era_matches_executor() {
    let mut document: JsonValue = serde_json::from_str(METFORMIN_ERAS).unwrap();
    document["EndStrategy"]["DateOffset"] = json!({"DateField": "EndDate", "Offset": 7});
    let (queried, executed) = run_both(&document.to_string(), &metformin_warehouse()).await;
    assert_eq!(queried, executed);
}

#[rstest]
#[case::gap_exceeds_pad(19, 2)]
#[case::gap_equals_pad(20, 1)]
#[tokio::test]
async fn test_era_gap_boundary(#[case] pad: i64, #[case] first_subject_eras: usize) {
    let (queried, executed) = run_both(&with_era_pad(DIABETES, pad), &diabetes_warehouse()).await;
    assert_eq!(queried, executed);
    assert_eq!(queried.eras_of(1).count(), first_subject_eras);
}
