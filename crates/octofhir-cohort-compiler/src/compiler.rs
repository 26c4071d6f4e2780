//! Compilation entry point
//!
//! [`CohortCompiler`] runs the three compile stages in order: structural
//! validation, concept-set resolution through the injected vocabulary, and
//! translation into a [`CohortPlan`]. Only resolution suspends; the other
//! stages are pure.

use std::sync::Arc;

use log::{debug, info};
use octofhir_cohort_diagnostics::{Diagnostic, ExpressionPath, Result};
use octofhir_cohort_expression::{CohortExpression, Validator};
use octofhir_cohort_vocab::VocabularyProvider;

use crate::codesets::CodesetResolver;
use crate::options::CompileOptions;
use crate::plan::{CensorWindow, CohortPlan, CollapsePlan, PrimaryPlan, ResolvedCodeset, RulePlan};
use crate::translate::{CriteriaTranslator, date_at};

/// Output of a successful compilation
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCohort {
    pub plan: CohortPlan,
    /// Non-fatal vocabulary gaps
    pub warnings: Vec<Diagnostic>,
}

/// Compiles cohort expressions against a vocabulary
pub struct CohortCompiler {
    vocabulary: Arc<dyn VocabularyProvider>,
    options: CompileOptions,
}

impl CohortCompiler {
    pub fn new(vocabulary: Arc<dyn VocabularyProvider>) -> Self {
        Self::with_options(vocabulary, CompileOptions::default())
    }

    pub fn with_options(vocabulary: Arc<dyn VocabularyProvider>, options: CompileOptions) -> Self {
        Self { vocabulary, options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Validate, resolve and translate an expression
    ///
    /// Aborts on the first fatal defect; vocabulary gaps are returned as
    /// warnings alongside the plan.
    pub async fn compile(&self, expression: &CohortExpression) -> Result<CompiledCohort> {
        Validator::new()
            .with_max_group_depth(self.options.max_group_depth)
            .validate(expression)?;
        debug!("expression validated");

        let (codesets, warnings) = self.resolve_concept_sets(expression).await?;
        let plan = translate(expression, codesets, &self.options)?;
        info!(
            "compiled cohort: {} primary criteria, {} inclusion rules, {} codesets",
            plan.primary.events.len(),
            plan.inclusion_rules.len(),
            plan.codesets.len()
        );
        Ok(CompiledCohort { plan, warnings })
    }

    /// Flatten every concept set of the expression
    pub async fn resolve_concept_sets(
        &self,
        expression: &CohortExpression,
    ) -> Result<(Vec<ResolvedCodeset>, Vec<Diagnostic>)> {
        CodesetResolver::new(self.vocabulary.as_ref())
            .resolve_all(&expression.concept_sets)
            .await
    }
}

/// Translate a validated expression with already resolved codesets
pub fn translate(
    expression: &CohortExpression,
    codesets: Vec<ResolvedCodeset>,
    options: &CompileOptions,
) -> Result<CohortPlan> {
    let translator = CriteriaTranslator::new(options.max_group_depth);
    let root = ExpressionPath::root();

    let primary_path = root.field("PrimaryCriteria");
    let primary_list = primary_path.field("CriteriaList");
    let primary = &expression.primary_criteria;
    let events = primary
        .criteria_list
        .iter()
        .enumerate()
        .map(|(i, c)| translator.criteria(c, &primary_list.index(i), 0))
        .collect::<Result<Vec<_>>>()?;

    let additional = match &expression.additional_criteria {
        Some(group) => Some(translator.group(group, &root.field("AdditionalCriteria"), 1)?)
            .filter(|plan| !plan.is_empty()),
        None => None,
    };

    let rules_path = root.field("InclusionRules");
    let inclusion_rules = expression
        .inclusion_rules
        .iter()
        .enumerate()
        .map(|(i, rule)| {
            let group = translator.group(&rule.expression, &rules_path.index(i).field("expression"), 1)?;
            Ok(RulePlan {
                name: rule.name.clone(),
                group,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let censoring_path = root.field("CensoringCriteria");
    let censoring = expression
        .censoring_criteria
        .iter()
        .enumerate()
        .map(|(i, c)| translator.criteria(c, &censoring_path.index(i), 0))
        .collect::<Result<Vec<_>>>()?;

    let censor_window = match &expression.censor_window {
        Some(period) => {
            let path = root.field("CensorWindow");
            let start = period
                .start_date
                .as_deref()
                .map(|d| date_at(d, &path.field("StartDate")))
                .transpose()?;
            let end = period
                .end_date
                .as_deref()
                .map(|d| date_at(d, &path.field("EndDate")))
                .transpose()?;
            (start.is_some() || end.is_some()).then_some(CensorWindow { start, end })
        }
        None => None,
    };

    let collapse = CollapsePlan {
        gap_days: expression.collapse_settings.era_gap_days.into(),
        pad_days: expression.collapse_settings.era_pad_days.into(),
    };

    Ok(CohortPlan {
        codesets,
        primary: PrimaryPlan {
            events,
            prior_days: primary.observation_window.prior_days.into(),
            post_days: primary.observation_window.post_days.into(),
            limit: primary.primary_criteria_limit.limit_type,
        },
        additional,
        inclusion_rules,
        expression_limit: expression.expression_limit.limit_type,
        end_strategy: translator.end_strategy(expression.end_strategy.as_ref())?,
        censoring,
        censor_window,
        collapse,
        default_event_days: options.default_event_days,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_cohort_diagnostics::{COH0010, COH0200};
    use octofhir_cohort_expression::{ConceptSet, ConceptSetItem, LimitType};
    use octofhir_cohort_vocab::InMemoryVocabulary;

    fn vocabulary() -> Arc<dyn VocabularyProvider> {
        Arc::new(InMemoryVocabulary::new().with_concept(1).with_concept(2).with_ancestor(1, 2))
    }

    fn expression(json: &str) -> CohortExpression {
        CohortExpression::from_json(json).unwrap()
    }

    #[tokio::test]
    async fn test_compile_minimal() {
        let mut expr = expression(
            r#"{"PrimaryCriteria": {
                "CriteriaList": [{"ConditionOccurrence": {"CodesetId": 0}}],
                "ObservationWindow": {"PriorDays": 365, "PostDays": 0},
                "PrimaryCriteriaLimit": {"Type": "First"}
            }}"#,
        );
        expr.concept_sets = vec![ConceptSet::new(0, "c", vec![ConceptSetItem::new(1).descendants()])];

        let compiled = CohortCompiler::new(vocabulary()).compile(&expr).await.unwrap();
        assert!(compiled.warnings.is_empty());
        let plan = compiled.plan;
        assert_eq!(plan.primary.prior_days, 365);
        assert_eq!(plan.primary.limit, LimitType::First);
        assert_eq!(plan.codeset(0).map(|c| c.concepts.len()), Some(2));
        assert_eq!(plan.default_event_days, 1);
    }

    #[tokio::test]
    async fn test_unsupported_variant_aborts() {
        let expr = expression(
            r#"{"PrimaryCriteria": {"CriteriaList": [{"ConditionOccurrence": {}}]},
                "CensoringCriteria": [{"LocationRegion": {}}]}"#,
        );
        let err = CohortCompiler::new(vocabulary()).compile(&expr).await.unwrap_err();
        assert_eq!(err.code(), COH0200);
        assert_eq!(err.location().map(ToString::to_string).as_deref(), Some("CensoringCriteria[0]"));
    }

    #[test]
    fn test_censor_window_dates() {
        let expr = expression(
            r#"{"PrimaryCriteria": {"CriteriaList": [{"Death": {}}]},
                "CensorWindow": {"StartDate": "2019-01-01"}}"#,
        );
        let plan = translate(&expr, Vec::new(), &CompileOptions::default()).unwrap();
        let window = plan.censor_window.unwrap();
        assert_eq!(window.start, chrono::NaiveDate::from_ymd_opt(2019, 1, 1));
        assert_eq!(window.end, None);

        let bad = expression(
            r#"{"PrimaryCriteria": {"CriteriaList": [{"Death": {}}]},
                "CensorWindow": {"EndDate": "2019-13-01"}}"#,
        );
        let err = translate(&bad, Vec::new(), &CompileOptions::default()).unwrap_err();
        assert_eq!(err.code(), COH0010);
    }

    #[test]
    fn test_empty_additional_criteria_is_dropped() {
        let expr = expression(
            r#"{"PrimaryCriteria": {"CriteriaList": [{"Death": {}}]},
                "AdditionalCriteria": {"Type": "ALL"}}"#,
        );
        let plan = translate(&expr, Vec::new(), &CompileOptions::default()).unwrap();
        assert!(plan.additional.is_none());
    }
}
