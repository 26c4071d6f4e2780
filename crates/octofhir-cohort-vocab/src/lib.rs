//! Vocabulary lookup capability
//!
//! This crate provides:
//! - The [`VocabularyProvider`] trait consulted during concept-set resolution
//! - An in-memory vocabulary built from standard vocabulary tables
//! - A memoising wrapper for providers backed by slow lookups

pub mod cache;
pub mod memory;
pub mod provider;

pub use cache::*;
pub use memory::*;
pub use provider::*;
