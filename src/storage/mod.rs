//! Storage layer for the Paideia tutoring memory core
//!
//! Provides the store contract the pipeline is written against, the scalar
//! metadata filter model, and a sqlite-vec backed implementation.

pub mod sqlite;

pub use sqlite::SqliteMemoryStore;

use crate::error::Result;
use crate::types::{MemoryRecord, MetadataValue, RecordId};
use async_trait::async_trait;

/// Record fields addressable by metadata filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    StudentId,
    Subject,
    Topic,
    DifficultyLevel,
    LearningStyle,
    MemoryType,
}

impl FilterField {
    /// Column name in the backing store
    pub fn column(&self) -> &'static str {
        match self {
            FilterField::StudentId => "student_id",
            FilterField::Subject => "subject",
            FilterField::Topic => "topic",
            FilterField::DifficultyLevel => "difficulty_level",
            FilterField::LearningStyle => "learning_style",
            FilterField::MemoryType => "memory_type",
        }
    }
}

/// Comparison applied to a filter field
#[derive(Debug, Clone)]
pub enum FilterOp {
    /// Exact match
    Eq(MetadataValue),

    /// Exact mismatch (used by the cross-student pattern lookup)
    Ne(MetadataValue),

    /// Set membership
    In(Vec<MetadataValue>),
}

/// One metadata predicate; a query takes a conjunction of these
#[derive(Debug, Clone)]
pub struct RecordFilter {
    pub field: FilterField,
    pub op: FilterOp,
}

impl RecordFilter {
    pub fn eq(field: FilterField, value: impl Into<MetadataValue>) -> Self {
        Self {
            field,
            op: FilterOp::Eq(value.into()),
        }
    }

    pub fn ne(field: FilterField, value: impl Into<MetadataValue>) -> Self {
        Self {
            field,
            op: FilterOp::Ne(value.into()),
        }
    }

    pub fn within(field: FilterField, values: Vec<MetadataValue>) -> Self {
        Self {
            field,
            op: FilterOp::In(values),
        }
    }
}

/// Store contract the pipeline requires from a vector similarity backend
///
/// The store owns embedding: callers supply query text and metadata
/// filters only. `query` ranks by the store's native similarity metric and
/// returns each record with its similarity score. An empty result set is a
/// healthy outcome; backend failures must surface as errors instead.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert a new record. Records are append-only; inserting a record
    /// whose identity key already exists is an error.
    async fn insert(&self, record: &MemoryRecord) -> Result<RecordId>;

    /// Retrieve up to `top_k` records matching every filter, ranked by
    /// similarity to `query_text`
    async fn query(
        &self,
        filters: &[RecordFilter],
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<(MemoryRecord, f32)>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryType;

    #[test]
    fn test_filter_constructors() {
        let f = RecordFilter::eq(FilterField::StudentId, "student-1");
        assert!(matches!(f.op, FilterOp::Eq(MetadataValue::Str(_))));

        let f = RecordFilter::ne(FilterField::StudentId, "student-1");
        assert!(matches!(f.op, FilterOp::Ne(_)));

        let f = RecordFilter::within(
            FilterField::MemoryType,
            vec![
                MetadataValue::from(MemoryType::ErrorPattern.as_str()),
                MetadataValue::from(MemoryType::SuccessMilestone.as_str()),
            ],
        );
        match f.op {
            FilterOp::In(values) => assert_eq!(values.len(), 2),
            other => panic!("expected In, got {:?}", other),
        }
    }

    #[test]
    fn test_filter_field_columns() {
        assert_eq!(FilterField::StudentId.column(), "student_id");
        assert_eq!(FilterField::DifficultyLevel.column(), "difficulty_level");
        assert_eq!(FilterField::MemoryType.column(), "memory_type");
    }
}
