//! In-memory repository for tests and single-process hosts.

use crate::error::RepositoryError;
use crate::repository::{ProcessedDataFilter, ProcessedDataRepository, ProcessedDataRow};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Keeps rows in a mutex-guarded set. Supports bulk insert-returning.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    rows: Mutex<BTreeSet<ProcessedDataRow>>,
    insert_failure: Mutex<Option<String>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later insert fail with a backend error.
    pub fn fail_inserts(&self, reason: impl Into<String>) {
        *self
            .insert_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    fn rows(&self) -> MutexGuard<'_, BTreeSet<ProcessedDataRow>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_insert_failure(&self) -> Result<(), RepositoryError> {
        let failure = self
            .insert_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match failure.as_ref() {
            Some(reason) => Err(RepositoryError::Backend {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProcessedDataRepository for InMemoryRepository {
    async fn find(
        &self,
        filter: &ProcessedDataFilter,
    ) -> Result<Vec<ProcessedDataRow>, RepositoryError> {
        Ok(self
            .rows()
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    async fn insert(&self, row: &ProcessedDataRow) -> Result<(), RepositoryError> {
        self.check_insert_failure()?;
        if self.rows().insert(row.clone()) {
            Ok(())
        } else {
            Err(RepositoryError::UniqueViolation)
        }
    }

    async fn delete(&self, filter: &ProcessedDataFilter) -> Result<u64, RepositoryError> {
        let mut rows = self.rows();
        let before = rows.len();
        rows.retain(|row| !filter.matches(row));
        Ok((before - rows.len()) as u64)
    }

    async fn insert_or_ignore_returning(
        &self,
        rows: &[ProcessedDataRow],
    ) -> Result<Vec<String>, RepositoryError> {
        self.check_insert_failure()?;
        let mut stored = self.rows();
        Ok(rows
            .iter()
            .filter(|row| stored.insert((*row).clone()))
            .map(|row| row.value.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ContextFilter;
    use weft_core::WorkflowId;

    fn row(workflow_id: WorkflowId, context: &str, value: &str) -> ProcessedDataRow {
        ProcessedDataRow {
            workflow_id,
            context: context.to_string(),
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn second_insert_is_a_unique_violation() {
        let repository = InMemoryRepository::new();
        let row = row(WorkflowId::new(), "", "v");
        repository.insert(&row).await.unwrap();
        assert_eq!(
            repository.insert(&row).await,
            Err(RepositoryError::UniqueViolation)
        );
        assert_eq!(repository.len(), 1);
    }

    #[tokio::test]
    async fn delete_respects_filter() {
        let repository = InMemoryRepository::new();
        let workflow_id = WorkflowId::new();
        repository.insert(&row(workflow_id, "", "a")).await.unwrap();
        repository.insert(&row(workflow_id, "n:x", "a")).await.unwrap();

        let removed = repository
            .delete(
                &ProcessedDataFilter::workflow(workflow_id)
                    .with_context(ContextFilter::NotIn(vec![String::new()])),
            )
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(repository.len(), 1);
    }

    #[tokio::test]
    async fn insert_or_ignore_returns_only_new_values() {
        let repository = InMemoryRepository::new();
        let workflow_id = WorkflowId::new();
        repository.insert(&row(workflow_id, "", "a")).await.unwrap();

        let inserted = repository
            .insert_or_ignore_returning(&[
                row(workflow_id, "", "a"),
                row(workflow_id, "", "b"),
                row(workflow_id, "", "b"),
            ])
            .await
            .unwrap();
        assert_eq!(inserted, vec!["b".to_string()]);
    }
}
