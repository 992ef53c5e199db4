//! Insert classification strategies.
//!
//! Recording a batch of values must report, per value, whether this call
//! inserted it. Backends differ in how that can be learned atomically, so the
//! store delegates to one of two strategies picked at construction.

use crate::error::RepositoryError;
use crate::repository::{ProcessedDataRepository, ProcessedDataRow};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use tracing::debug;

/// Outcome of recording one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// This call inserted the value.
    Inserted,
    /// The value was recorded before.
    AlreadyProcessed,
}

/// Records rows and classifies each one.
#[async_trait]
pub trait InsertClassificationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns one admission per row, in row order.
    async fn record(
        &self,
        repository: &dyn ProcessedDataRepository,
        rows: &[ProcessedDataRow],
    ) -> Result<Vec<Admission>, RepositoryError>;
}

/// One insert per row, run concurrently and classified by its own outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerRowInsert;

#[async_trait]
impl InsertClassificationStrategy for PerRowInsert {
    fn name(&self) -> &'static str {
        "per-row"
    }

    async fn record(
        &self,
        repository: &dyn ProcessedDataRepository,
        rows: &[ProcessedDataRow],
    ) -> Result<Vec<Admission>, RepositoryError> {
        let outcomes = join_all(rows.iter().map(|row| repository.insert(row))).await;
        outcomes
            .into_iter()
            .map(|outcome| match outcome {
                Ok(()) => Ok(Admission::Inserted),
                Err(RepositoryError::UniqueViolation) => Ok(Admission::AlreadyProcessed),
                Err(error) => Err(error),
            })
            .collect()
    }
}

/// One insert-or-ignore statement; classification by returned value.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkInsertReturning;

#[async_trait]
impl InsertClassificationStrategy for BulkInsertReturning {
    fn name(&self) -> &'static str {
        "bulk-returning"
    }

    async fn record(
        &self,
        repository: &dyn ProcessedDataRepository,
        rows: &[ProcessedDataRow],
    ) -> Result<Vec<Admission>, RepositoryError> {
        let inserted = repository.insert_or_ignore_returning(rows).await?;
        debug!(rows = rows.len(), inserted = inserted.len(), "bulk insert finished");
        Ok(classify_by_value(rows, &inserted))
    }
}

/// Matches rows against returned values as a multiset.
///
/// Each returned value admits exactly one row carrying it, the earliest one,
/// so duplicate rows in a batch are classified per occurrence.
fn classify_by_value(rows: &[ProcessedDataRow], inserted: &[String]) -> Vec<Admission> {
    let mut remaining: HashMap<&str, usize> = HashMap::new();
    for value in inserted {
        *remaining.entry(value.as_str()).or_insert(0) += 1;
    }

    rows.iter()
        .map(|row| match remaining.get_mut(row.value.as_str()) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Admission::Inserted
            }
            _ => Admission::AlreadyProcessed,
        })
        .collect()
}
