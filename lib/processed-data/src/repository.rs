//! The storage contract.

use crate::error::RepositoryError;
use async_trait::async_trait;
use sqlx::FromRow;
use std::str::FromStr;
use weft_core::WorkflowId;

/// Upper bound on values bound into one statement.
pub(crate) const MAX_VALUES_PER_STATEMENT: usize = 1000;

/// One remembered value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessedDataRow {
    pub workflow_id: WorkflowId,
    pub context: String,
    /// The hashed value.
    pub value: String,
}

/// Which contexts a filter matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContextFilter {
    #[default]
    Any,
    Equals(String),
    /// Every context except the listed ones.
    NotIn(Vec<String>),
}

impl ContextFilter {
    #[must_use]
    pub fn matches(&self, context: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Equals(expected) => expected == context,
            Self::NotIn(excluded) => !excluded.iter().any(|e| e == context),
        }
    }
}

/// Selects rows of one workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedDataFilter {
    pub workflow_id: WorkflowId,
    pub context: ContextFilter,
    /// Restricts to these hashed values; `None` matches every value.
    pub values: Option<Vec<String>>,
}

impl ProcessedDataFilter {
    /// Matches every row of a workflow.
    #[must_use]
    pub fn workflow(workflow_id: WorkflowId) -> Self {
        Self {
            workflow_id,
            context: ContextFilter::Any,
            values: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: ContextFilter) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = Some(values);
        self
    }

    /// True when the value list is present but empty, so nothing can match.
    #[must_use]
    pub fn is_empty_selection(&self) -> bool {
        self.values.as_ref().is_some_and(Vec::is_empty)
    }

    /// Splits the value list so each part binds a bounded number of values.
    pub(crate) fn chunked(&self, size: usize) -> Vec<Self> {
        match &self.values {
            None => vec![self.clone()],
            Some(values) => values
                .chunks(size)
                .map(|chunk| self.clone().with_values(chunk.to_vec()))
                .collect(),
        }
    }

    #[must_use]
    pub fn matches(&self, row: &ProcessedDataRow) -> bool {
        row.workflow_id == self.workflow_id
            && self.context.matches(&row.context)
            && self
                .values
                .as_ref()
                .is_none_or(|values| values.contains(&row.value))
    }
}

/// Row type for SQL queries.
#[derive(FromRow)]
pub(crate) struct ProcessedDataRecord {
    workflow_id: String,
    context: String,
    value: String,
}

impl ProcessedDataRecord {
    pub(crate) fn try_into_row(self) -> Result<ProcessedDataRow, RepositoryError> {
        let workflow_id =
            WorkflowId::from_str(&self.workflow_id).map_err(|e| RepositoryError::Backend {
                reason: format!("invalid workflow id '{}': {e}", self.workflow_id),
            })?;
        Ok(ProcessedDataRow {
            workflow_id,
            context: self.context,
            value: self.value,
        })
    }
}

/// A processed-data backend.
///
/// The backend must reject a second row with the same
/// `(workflow_id, context, value)` key atomically.
#[async_trait]
pub trait ProcessedDataRepository: Send + Sync {
    async fn find(&self, filter: &ProcessedDataFilter)
    -> Result<Vec<ProcessedDataRow>, RepositoryError>;

    /// Inserts one row; an existing key yields [`RepositoryError::UniqueViolation`].
    async fn insert(&self, row: &ProcessedDataRow) -> Result<(), RepositoryError>;

    /// Deletes matching rows and returns how many were removed.
    async fn delete(&self, filter: &ProcessedDataFilter) -> Result<u64, RepositoryError>;

    /// Inserts rows, skipping existing keys, and returns the inserted values.
    ///
    /// Backends without insert-or-ignore-returning keep the default.
    async fn insert_or_ignore_returning(
        &self,
        _rows: &[ProcessedDataRow],
    ) -> Result<Vec<String>, RepositoryError> {
        Err(RepositoryError::Unsupported {
            operation: "insert_or_ignore_returning",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(workflow_id: WorkflowId, context: &str, value: &str) -> ProcessedDataRow {
        ProcessedDataRow {
            workflow_id,
            context: context.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn filter_matches_workflow_context_and_values() {
        let workflow_id = WorkflowId::new();
        let filter = ProcessedDataFilter::workflow(workflow_id)
            .with_context(ContextFilter::Equals("n:a".to_string()))
            .with_values(vec!["x".to_string()]);

        assert!(filter.matches(&row(workflow_id, "n:a", "x")));
        assert!(!filter.matches(&row(workflow_id, "n:a", "y")));
        assert!(!filter.matches(&row(workflow_id, "n:b", "x")));
        assert!(!filter.matches(&row(WorkflowId::new(), "n:a", "x")));
    }

    #[test]
    fn not_in_keeps_listed_contexts() {
        let filter = ContextFilter::NotIn(vec![String::new(), "n:a".to_string()]);
        assert!(!filter.matches(""));
        assert!(!filter.matches("n:a"));
        assert!(filter.matches("n:gone"));
    }

    #[test]
    fn chunking_bounds_value_lists() {
        let filter = ProcessedDataFilter::workflow(WorkflowId::new())
            .with_values((0..5).map(|i| i.to_string()).collect());
        let chunks = filter.chunked(2);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].values, Some(vec!["4".to_string()]));

        let unbounded = ProcessedDataFilter::workflow(WorkflowId::new());
        assert_eq!(unbounded.chunked(2), vec![unbounded]);
    }

    #[test]
    fn record_with_bad_workflow_id_is_rejected() {
        let record = ProcessedDataRecord {
            workflow_id: "nope".to_string(),
            context: String::new(),
            value: "v".to_string(),
        };
        assert!(matches!(
            record.try_into_row(),
            Err(RepositoryError::Backend { .. })
        ));
    }

    #[test]
    fn empty_value_list_selects_nothing() {
        let workflow_id = WorkflowId::new();
        let filter = ProcessedDataFilter::workflow(workflow_id).with_values(Vec::new());
        assert!(filter.is_empty_selection());
        assert!(!filter.matches(&row(workflow_id, "", "x")));
    }
}
