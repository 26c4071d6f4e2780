//! CLI tests
//!
//! Commands run in-process with their output redirected to temporary files;
//! exit codes are checked against the built `cohort` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use octofhir_cohort::cli::emit::{EmitConfig, emit};
use octofhir_cohort::cli::execute::{ExecuteConfig, execute};
use octofhir_cohort::cli::output::OutputFormat;
use octofhir_cohort::{CohortResult, EmittedQuery};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use tempfile::TempDir;

const EXPRESSION: &str = r#"{
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
        "ObservationWindow": {"PriorDays": 365, "PostDays": 0}
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

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let workspace = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        workspace.write("cohort.json", EXPRESSION);
        workspace.write("warehouse.json", &warehouse().to_string());
        workspace
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path(name)).unwrap()
    }
}

fn warehouse() -> serde_json::Value {
    let observed = |person_id: i64| {
        json!({
            "person_id": person_id,
            "observation_period_start_date": "2018-01-01",
            "observation_period_end_date": "2022-12-31"
        })
    };
    json!({
        "concept": [{"concept_id": 201826}, {"concept_id": 443238}, {"concept_id": 1503297}],
        "concept_ancestor": [{"ancestor_concept_id": 201826, "descendant_concept_id": 443238}],
        "person": [{"person_id": 1, "year_of_birth": 1950}, {"person_id": 2, "year_of_birth": 1960}],
        "observation_period": [observed(1), observed(2)],
        "condition_occurrence": [
            {"condition_occurrence_id": 1, "person_id": 1, "condition_concept_id": 443238,
             "condition_start_date": "2020-01-01", "condition_end_date": "2020-01-10"},
            {"condition_occurrence_id": 2, "person_id": 2, "condition_concept_id": 443238,
             "condition_start_date": "2020-01-01", "condition_end_date": "2020-01-10"}
        ],
        "drug_exposure": [
            {"drug_exposure_id": 1, "person_id": 1, "drug_concept_id": 1503297,
             "drug_exposure_start_date": "2020-02-01", "days_supply": 30}
        ]
    })
}

fn cohort(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_cohort"))
        .args(args)
        .arg("--no-color")
        .output()
        .unwrap()
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[tokio::test]
async fn test_emit_json() {
    let ws = Workspace::new();
    emit(EmitConfig {
        file: ws.path("cohort.json"),
        dialect: "duckdb".to_string(),
        schema: Some("omop".to_string()),
        vocab: Some(ws.path("warehouse.json")),
        attrition: true,
        format: OutputFormat::Json,
        output_file: Some(ws.path("out.json")),
    })
    .await
    .unwrap();

    let query: EmittedQuery = serde_json::from_str(&ws.read("out.json")).unwrap();
    assert!(query.cohort.contains("omop.condition_occurrence"));
    assert!(query.cohort.contains("(0, 443238)"));
    assert!(query.attrition.is_some());
}

#[tokio::test]
async fn test_emit_text_is_stable() {
    let ws = Workspace::new();
    for name in ["first.sql", "second.sql"] {
        emit(EmitConfig {
            file: ws.path("cohort.json"),
            dialect: "postgres".to_string(),
            schema: None,
            vocab: Some(ws.path("warehouse.json")),
            attrition: false,
            format: OutputFormat::Text,
            output_file: Some(ws.path(name)),
        })
        .await
        .unwrap();
    }
    let first = ws.read("first.sql");
    assert_eq!(first, ws.read("second.sql"));
    assert!(first.starts_with("WITH codesets AS ("));
    assert!(!first.contains("-- attrition"));
}

#[tokio::test]
async fn test_execute_json() {
    let ws = Workspace::new();
    execute(ExecuteConfig {
        file: ws.path("cohort.json"),
        data: ws.path("warehouse.json"),
        format: OutputFormat::Json,
        output_file: Some(ws.path("result.json")),
    })
    .await
    .unwrap();

    let result: CohortResult = serde_json::from_str(&ws.read("result.json")).unwrap();
    assert_eq!(result.subjects(), vec![1]);
    assert_eq!(result.attrition[0].surviving_persons, 1);
}

#[test]
fn test_execute_text_tables() {
    let ws = Workspace::new();
    let output = cohort(&["execute", arg(&ws.path("cohort.json")), "--data", arg(&ws.path("warehouse.json"))]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2020-01-01"));
    assert!(stdout.contains("metformin within 180 days"));
}

#[rstest]
#[case::unknown_dialect(&["emit", "{cohort}", "--dialect", "oracle"], 2)]
#[case::bad_schema(&["emit", "{cohort}", "--schema", "cdm; drop"], 1)]
#[case::undefined_codeset(&["validate", "{cohort}", "{broken}"], 2)]
#[case::missing_table(&["execute", "{cohort}", "--data", "{empty}"], 3)]
#[case::valid(&["validate", "{cohort}"], 0)]
fn test_exit_codes(#[case] args: &[&str], #[case] expected: i32) {
    let ws = Workspace::new();
    let broken = ws.write("broken.json", &EXPRESSION.replace("\"CodesetId\": 1", "\"CodesetId\": 9"));
    let empty = ws.write("empty.json", "{\"person\": []}");
    let cohort_path = ws.path("cohort.json");

    let args: Vec<&str> = args
        .iter()
        .map(|a| match *a {
            "{cohort}" => arg(&cohort_path),
            "{broken}" => arg(&broken),
            "{empty}" => arg(&empty),
            other => other,
        })
        .collect();
    let output = cohort(&args);
    assert_eq!(output.status.code(), Some(expected), "{}", String::from_utf8_lossy(&output.stderr));
}
