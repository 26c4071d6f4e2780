//! Concept set resolution
//!
//! A concept set resolves to the contribution of its included items minus
//! the contribution of its excluded items, where the contribution of a list
//! of items is
//!
//! - every item's own id, when the vocabulary knows it
//! - the descendants of items with `includeDescendants`
//! - concepts that map onto items with `includeMapped` (and onto their
//!   descendants when both flags are set)
//!
//! Each contribution is a set union, so item order never affects the result.

use std::collections::BTreeSet;

use futures::future::join_all;
use log::{debug, warn};
use octofhir_cohort_diagnostics::{COH0100, COH0101, Diagnostic, ExpressionPath, Result};
use octofhir_cohort_expression::{ConceptId, ConceptSet, ConceptSetItem};
use octofhir_cohort_vocab::VocabularyProvider;

use crate::plan::ResolvedCodeset;

/// A resolved codeset with the vocabulary gaps found on the way
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub codeset: ResolvedCodeset,
    pub warnings: Vec<Diagnostic>,
}

/// Flattens concept sets through a vocabulary provider
pub struct CodesetResolver<'a> {
    vocabulary: &'a dyn VocabularyProvider,
}

impl<'a> CodesetResolver<'a> {
    pub fn new(vocabulary: &'a dyn VocabularyProvider) -> Self {
        Self { vocabulary }
    }

    /// Resolve one concept set, discarding warnings
    pub async fn resolve(&self, set: &ConceptSet) -> Result<ResolvedCodeset> {
        let path = ExpressionPath::root().field("ConceptSets");
        Ok(self.resolve_at(set, &path).await?.codeset)
    }

    /// Resolve one concept set located at `path`
    pub async fn resolve_at(&self, set: &ConceptSet, path: &ExpressionPath) -> Result<Resolution> {
        let items = set.items();
        let ids: Vec<ConceptId> = sorted(items.iter().map(ConceptSetItem::concept_id));
        let known = self.lookup_known(&ids).await?;

        let mut warnings = Vec::new();
        for (j, item) in items.iter().enumerate() {
            if !known.contains(&item.concept_id()) {
                warnings.push(
                    Diagnostic::warning(COH0100, format!("concept {} is not in the vocabulary", item.concept_id()))
                        .with_location(path.field("expression").field("items").index(j)),
                );
            }
        }

        let (excluded, included): (Vec<&ConceptSetItem>, Vec<&ConceptSetItem>) =
            items.iter().partition(|item| item.is_excluded);
        let mut concepts = self.contribution(&included, &known).await?;
        if !excluded.is_empty() {
            let removed = self.contribution(&excluded, &known).await?;
            concepts.retain(|id| !removed.contains(id));
        }

        if concepts.is_empty() {
            warnings.push(
                Diagnostic::warning(COH0101, format!("concept set {} ('{}') resolved to no concepts", set.id, set.name))
                    .with_location(path.clone()),
            );
        }
        debug!("concept set {} resolved to {} concepts", set.id, concepts.len());

        Ok(Resolution {
            codeset: ResolvedCodeset {
                id: set.id,
                name: set.name.clone(),
                concepts,
            },
            warnings,
        })
    }

    /// Resolve every concept set of an expression, in declaration order
    ///
    /// Sets are resolved concurrently only when the provider declares that
    /// it supports concurrent lookups.
    pub async fn resolve_all(&self, sets: &[ConceptSet]) -> Result<(Vec<ResolvedCodeset>, Vec<Diagnostic>)> {
        let root = ExpressionPath::root().field("ConceptSets");
        let resolutions = if self.vocabulary.supports_concurrent_lookups() {
            join_all(sets.iter().enumerate().map(|(i, set)| {
                let path = root.index(i);
                async move { self.resolve_at(set, &path).await }
            }))
            .await
        } else {
            let mut out = Vec::with_capacity(sets.len());
            for (i, set) in sets.iter().enumerate() {
                out.push(self.resolve_at(set, &root.index(i)).await);
            }
            out
        };

        let mut codesets = Vec::with_capacity(sets.len());
        let mut warnings = Vec::new();
        for resolution in resolutions {
            let resolution = resolution?;
            codesets.push(resolution.codeset);
            warnings.extend(resolution.warnings);
        }
        if !warnings.is_empty() {
            warn!("{} vocabulary gaps while resolving concept sets", warnings.len());
        }
        Ok((codesets, warnings))
    }

    async fn contribution(&self, items: &[&ConceptSetItem], known: &BTreeSet<ConceptId>) -> Result<BTreeSet<ConceptId>> {
        let mut out: BTreeSet<ConceptId> = items
            .iter()
            .map(|item| item.concept_id())
            .filter(|id| known.contains(id))
            .collect();

        let with_descendants = sorted(items.iter().filter(|i| i.include_descendants).map(|i| i.concept_id()));
        out.extend(self.lookup_descendants(&with_descendants).await?);

        let mapped: Vec<&&ConceptSetItem> = items.iter().filter(|i| i.include_mapped).collect();
        if !mapped.is_empty() {
            let mapped_descendants =
                sorted(mapped.iter().filter(|i| i.include_descendants).map(|i| i.concept_id()));
            let mut targets: BTreeSet<ConceptId> = mapped.iter().map(|i| i.concept_id()).collect();
            targets.extend(self.lookup_descendants(&mapped_descendants).await?);
            let targets: Vec<ConceptId> = targets.into_iter().collect();
            out.extend(self.vocabulary.mapped_from(&targets).await?);
        }
        Ok(out)
    }

    async fn lookup_known(&self, ids: &[ConceptId]) -> Result<BTreeSet<ConceptId>> {
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        Ok(self.vocabulary.known_concepts(ids).await?)
    }

    async fn lookup_descendants(&self, ids: &[ConceptId]) -> Result<BTreeSet<ConceptId>> {
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        Ok(self.vocabulary.descendants(ids).await?)
    }
}

/// Sorted, deduplicated lookup batch
fn sorted(ids: impl Iterator<Item = ConceptId>) -> Vec<ConceptId> {
    ids.collect::<BTreeSet<_>>().into_iter().collect()
}
