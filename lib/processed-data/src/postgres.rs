//! Postgres repository.

use crate::error::RepositoryError;
use crate::repository::{
    ContextFilter, MAX_VALUES_PER_STATEMENT, ProcessedDataFilter, ProcessedDataRecord,
    ProcessedDataRepository, ProcessedDataRow,
};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, instrument};

/// Rows per bulk insert; three binds each.
const MAX_ROWS_PER_INSERT: usize = MAX_VALUES_PER_STATEMENT;

/// Processed data in a Postgres database.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Wraps an existing pool. Call [`migrate`](Self::migrate) before use.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and applies migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or a migration fails.
    pub async fn connect(url: &str) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
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
        sqlx::migrate!("./migrations/postgres").run(&self.pool).await?;
        Ok(())
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &ProcessedDataFilter) {
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
            builder
                .push(" AND NOT (context = ANY(")
                .push_bind(contexts.clone())
                .push("))");
        }
    }

    if let Some(values) = &filter.values {
        builder
            .push(" AND value = ANY(")
            .push_bind(values.clone())
            .push(")");
    }
}

fn select_statement(filter: &ProcessedDataFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT workflow_id, context, value FROM processed_data");
    push_filter(&mut builder, filter);
    builder
}

fn delete_statement(filter: &ProcessedDataFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("DELETE FROM processed_data");
    push_filter(&mut builder, filter);
    builder
}

fn insert_statement(rows: &[ProcessedDataRow]) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("INSERT INTO processed_data (workflow_id, context, value) ");
    builder.push_values(rows, |mut values, row| {
        values
            .push_bind(row.workflow_id.to_string())
            .push_bind(row.context.clone())
            .push_bind(row.value.clone());
    });
    builder.push(" ON CONFLICT DO NOTHING RETURNING value");
    builder
}

#[async_trait]
impl ProcessedDataRepository for PostgresRepository {
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
        sqlx::query("INSERT INTO processed_data (workflow_id, context, value) VALUES ($1, $2, $3)")
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

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn insert_or_ignore_returning(
        &self,
        rows: &[ProcessedDataRow],
    ) -> Result<Vec<String>, RepositoryError> {
        let mut inserted = Vec::with_capacity(rows.len());
        for chunk in rows.chunks(MAX_ROWS_PER_INSERT) {
            let values: Vec<String> = insert_statement(chunk)
                .build_query_scalar()
                .fetch_all(&self.pool)
                .await?;
            inserted.extend(values);
        }
        Ok(inserted)
    }
}
