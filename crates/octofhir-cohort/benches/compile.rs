//! Compiler benchmarks using divan
//!
//! Compilation and SQL emission for expressions of growing size.

use std::sync::Arc;

use octofhir_cohort::{
    CompiledCohort, Dialect, EmitOptions, InMemoryVocabulary, SqlEmitter, VocabularyProvider, compile_json,
};
use tokio::runtime::Runtime;

fn main() {
    divan::main();
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread().build().unwrap()
}

fn vocabulary() -> Arc<dyn VocabularyProvider> {
    let mut vocab = InMemoryVocabulary::new().with_concept(201826).with_concept(1503297);
    for descendant in 1..=200 {
        vocab = vocab.with_ancestor(201826, 40_000_000 + descendant);
    }
    Arc::new(vocab)
}

/// An expression with `rules` inclusion rules, each a correlated drug lookup
fn expression(rules: usize) -> String {
    let rule = |k: usize| {
        format!(
            r#"{{"name": "rule {k}", "expression": {{"Type": "ALL", "CriteriaList": [{{
                "Criteria": {{"DrugExposure": {{"CodesetId": 1}}}},
                "StartWindow": {{"Start": {{"Days": 0, "Coeff": 1}}, "End": {{"Days": {days}, "Coeff": 1}}}},
                "Occurrence": {{"Type": 2, "Count": 1}}
            }}]}}}}"#,
            days = 30 * (k + 1)
        )
    };
    let rules: Vec<String> = (0..rules).map(rule).collect();
    format!(
        r#"{{
            "ConceptSets": [
                {{"id": 0, "expression": {{"items": [{{"concept": {{"CONCEPT_ID": 201826}}, "includeDescendants": true}}]}}}},
                {{"id": 1, "expression": {{"items": [{{"concept": {{"CONCEPT_ID": 1503297}}}}]}}}}
            ],
            "PrimaryCriteria": {{
                "CriteriaList": [{{"ConditionOccurrence": {{"CodesetId": 0, "First": true}}}}],
                "ObservationWindow": {{"PriorDays": 365, "PostDays": 0}}
            }},
            "InclusionRules": [{}],
            "CollapseSettings": {{"CollapseType": "ERA", "EraPad": 30}}
        }}"#,
        rules.join(",")
    )
}

fn compiled(rules: usize) -> CompiledCohort {
    runtime()
        .block_on(compile_json(&expression(rules), vocabulary()))
        .unwrap()
}

mod compile {
    use super::*;

    #[divan::bench(args = [0, 4, 16])]
    fn inclusion_rules(bencher: divan::Bencher, rules: usize) {
        let json = expression(rules);
        let vocab = vocabulary();
        let rt = runtime();
        bencher.bench_local(|| rt.block_on(compile_json(divan::black_box(&json), vocab.clone())));
    }
}

mod emit {
    use super::*;

    #[divan::bench(args = [Dialect::Postgres, Dialect::SqlServer, Dialect::Spark])]
    fn dialects(bencher: divan::Bencher, dialect: Dialect) {
        let plan = compiled(4).plan;
        let emitter = SqlEmitter::new(EmitOptions::new().with_dialect(dialect).with_attrition(true)).unwrap();
        bencher.bench_local(|| emitter.emit(divan::black_box(&plan)));
    }

    #[divan::bench(args = [0, 4, 16])]
    fn inclusion_rules(bencher: divan::Bencher, rules: usize) {
        let plan = compiled(rules).plan;
        let emitter = SqlEmitter::new(EmitOptions::new()).unwrap();
        bencher.bench_local(|| emitter.emit(divan::black_box(&plan)));
    }
}
