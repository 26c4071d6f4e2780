//! Expression-path locations
//!
//! Cohort expressions arrive as JSON documents, so a defect is located by the
//! chain of keys and list indices leading to it rather than by a byte span:
//!
//! ```text
//! InclusionRules[1].Expression.CriteriaList[0].Criteria.DrugExposure.CodesetId
//! ```

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;

/// One step of an [`ExpressionPath`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    /// Object key
    Field(Cow<'static, str>),
    /// List position (0-based)
    Index(usize),
}

/// Location of a node inside a cohort expression document
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpressionPath {
    segments: SmallVec<[PathSegment; 8]>,
}

impl ExpressionPath {
    /// The document root
    pub const fn root() -> Self {
        Self {
            segments: SmallVec::new_const(),
        }
    }

    /// Extend the path with an object key
    #[must_use]
    pub fn field(&self, name: impl Into<Cow<'static, str>>) -> Self {
        let mut next = self.clone();
        next.segments.push(PathSegment::Field(name.into()));
        next
    }

    /// Extend the path with a list index
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.segments.push(PathSegment::Index(index));
        next
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments
    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl fmt::Display for ExpressionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "$");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if i == 0 => write!(f, "{name}")?,
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}
