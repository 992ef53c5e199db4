//! SQLite repository.
//!
//! SQLite cannot report which rows of a multi-row insert-or-ignore were
//! inserted, so this backend supports the per-row strategy only.

use crate::error::RepositoryError;
use crate::repository::{
    ContextFilter, MAX_VALUES_PER_STATEMENT, ProcessedDataFilter, ProcessedDataRecord,
    ProcessedDataRepository, ProcessedDataRow,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use tracing::{debug, instrument};

/// Processed data in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Wraps an existing pool. Call [`migrate`](Self::migrate) before use.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) a database and applies migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the database cannot be opened,
    /// or a migration fails.
    pub async fn connect(url: &str) -> Result<Self, RepositoryError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = pool_options(url).connect_with(options).await?;
        let repository = Self::new(pool);
        repository.migrate().await?;
        Ok(repository)
    }

    /// Applies the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::migrate!("./migrations/sqlite").run(&self.pool).await?;
        Ok(())
    }
}

/// An in-memory database lives as long as its only connection, so that
/// connection is never reaped.
fn pool_options(url: &str) -> SqlitePoolOptions {
    if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ProcessedDataFilter) {
    builder
        .push(" WHERE workflow_id = ")
        .push_bind(filter.workflow_id.to_string());

    match &filter.context {
        ContextFilter::Any => {}
        ContextFilter::Equals(context) => {
            builder.push(" AND context = ").push_bind(context.clone());
        }
        ContextFilter::NotIn(contexts) if contexts.is_empty() => {}
        ContextFilter::NotIn(contexts) => {
            builder.push(" AND context NOT IN (");
            let mut separated = builder.separated(", ");
            for context in contexts {
                separated.push_bind(context.clone());
            }
            separated.push_unseparated(")");
        }
    }

    if let Some(values) = &filter.values {
        builder.push(" AND value IN (");
        let mut separated = builder.separated(", ");
        for value in values {
            separated.push_bind(value.clone());
        }
        separated.push_unseparated(")");
    }
}

fn select_statement(filter: &ProcessedDataFilter) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::new("SELECT workflow_id, context, value FROM processed_data");
    push_filter(&mut builder, filter);
    builder
}

fn delete_statement(filter: &ProcessedDataFilter) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::new("DELETE FROM processed_data");
    push_filter(&mut builder, filter);
    builder
}

#[async_trait]
impl ProcessedDataRepository for SqliteRepository {
    #[instrument(skip(self, filter), fields(workflow_id = %filter.workflow_id))]
    async fn find(
        &self,
        filter: &ProcessedDataFilter,
    ) -> Result<Vec<ProcessedDataRow>, RepositoryError> {
        if filter.is_empty_selection() {
            return Ok(Vec::new());
        }
        let mut rows = Vec::new();
        for part in filter.chunked(MAX_VALUES_PER_STATEMENT) {
            let records: Vec<ProcessedDataRecord> = select_statement(&part)
                .build_query_as()
                .fetch_all(&self.pool)
                .await?;
            for record in records {
                rows.push(record.try_into_row()?);
            }
        }
        Ok(rows)
    }

    async fn insert(&self, row: &ProcessedDataRow) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO processed_data (workflow_id, context, value) VALUES (?, ?, ?)")
            .bind(row.workflow_id.to_string())
            .bind(&row.context)
            .bind(&row.value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, filter), fields(workflow_id = %filter.workflow_id))]
    async fn delete(&self, filter: &ProcessedDataFilter) -> Result<u64, RepositoryError> {
        if filter.is_empty_selection() {
            return Ok(0);
        }
        let mut removed = 0;
        for part in filter.chunked(MAX_VALUES_PER_STATEMENT) {
            removed += delete_statement(&part)
                .build()
                .execute(&self.pool)
                .await?
                .rows_affected();
        }
        debug!(removed, "deleted processed data");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ProcessedDataConfig, ProcessedDataStore};
    use std::sync::Arc;
    use weft_core::WorkflowId;
    use weft_workflow::{ContextData, ProcessedDataContext, ProcessedDataManager};

    async fn repository() -> SqliteRepository {
        SqliteRepository::connect("sqlite::memory:").await.unwrap()
    }

    fn row(workflow_id: WorkflowId, context: &str, value: &str) -> ProcessedDataRow {
        ProcessedDataRow {
            workflow_id,
            context: context.to_string(),
            value: value.to_string(),
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    #[test]
    fn filter_builds_expected_sql() {
        let filter = ProcessedDataFilter::workflow(WorkflowId::new())
            .with_context(ContextFilter::NotIn(strings(&["", "n:a"])))
            .with_values(strings(&["x"]));
        assert_eq!(
            select_statement(&filter).sql(),
            "SELECT workflow_id, context, value FROM processed_data \
             WHERE workflow_id = ? AND context NOT IN (?, ?) AND value IN (?)"
        );
    }

    #[test]
    fn in_memory_pool_keeps_its_connection() {
        let memory = pool_options("sqlite::memory:");
        assert_eq!(memory.get_max_connections(), 1);
        assert_eq!(memory.get_min_connections(), 1);
        assert_eq!(memory.get_idle_timeout(), None);
        assert_eq!(memory.get_max_lifetime(), None);

        let file = pool_options("sqlite://weft.db");
        assert_eq!(file.get_max_connections(), 5);
        assert!(file.get_idle_timeout().is_some());
    }

    #[tokio::test]
    async fn insert_detects_unique_violation() {
        let repository = repository().await;
        let row = row(WorkflowId::new(), "", "v");
        repository.insert(&row).await.unwrap();
        assert_eq!(
            repository.insert(&row).await,
            Err(RepositoryError::UniqueViolation)
        );
    }

    #[tokio::test]
    async fn find_and_delete_use_filter() {
        let repository = repository().await;
        let workflow_id = WorkflowId::new();
        repository.insert(&row(workflow_id, "", "a")).await.unwrap();
        repository.insert(&row(workflow_id, "n:x", "a")).await.unwrap();
        repository.insert(&row(workflow_id, "n:y", "b")).await.unwrap();

        let found = repository
            .find(
                &ProcessedDataFilter::workflow(workflow_id)
                    .with_context(ContextFilter::Equals("n:x".to_string())),
            )
            .await
            .unwrap();
        assert_eq!(found, vec![row(workflow_id, "n:x", "a")]);

        let removed = repository
            .delete(
                &ProcessedDataFilter::workflow(workflow_id)
                    .with_context(ContextFilter::NotIn(strings(&["", "n:x"]))),
            )
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            repository
                .find(&ProcessedDataFilter::workflow(workflow_id))
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn bulk_insert_is_unsupported() {
        let repository = repository().await;
        assert!(matches!(
            repository
                .insert_or_ignore_returning(&[row(WorkflowId::new(), "", "v")])
                .await,
            Err(RepositoryError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn store_over_sqlite_records_once() {
        let store = ProcessedDataStore::new(
            Arc::new(repository().await),
            ProcessedDataConfig::default(),
        );
        let data = ContextData::for_workflow(WorkflowId::new());
        let items = strings(&["a", "b", "a"]);

        let (left, right) = tokio::join!(
            store.check_processed_and_record(&items, ProcessedDataContext::Workflow, &data),
            store.check_processed_and_record(&items, ProcessedDataContext::Workflow, &data),
        );
        let (left, right) = (left.unwrap(), right.unwrap());
        assert_eq!(left.new.len() + right.new.len(), 2);
        assert_eq!(left.processed.len() + right.processed.len(), 4);

        let check = store
            .check_processed(&strings(&["a", "c"]), ProcessedDataContext::Workflow, &data)
            .await
            .unwrap();
        assert_eq!(check.new, strings(&["c"]));
        assert_eq!(check.processed, strings(&["a"]));
    }
}
