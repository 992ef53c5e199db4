//! Processed-data store for weft.
//!
//! Trigger-style nodes record the values they admit so later runs can skip
//! them. Values are hashed and keyed by `(workflow id, context, hash)`; the
//! backend's uniqueness constraint on that key makes recording atomic.
//!
//! - [`ProcessedDataStore`]: the [`ProcessedDataManager`](weft_workflow::ProcessedDataManager)
//!   implementation, also a workflow lifecycle hook
//! - [`ProcessedDataRepository`]: storage backends (in-memory, SQLite, Postgres)
//! - [`InsertClassificationStrategy`]: how recorded values are classified

pub mod context;
pub mod error;
pub mod hash;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod sqlite;
pub mod store;
pub mod strategy;

pub use context::{WORKFLOW_CONTEXT, derive_context, node_context};
pub use error::RepositoryError;
pub use hash::hash_value;
pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;
pub use repository::{ContextFilter, ProcessedDataFilter, ProcessedDataRepository, ProcessedDataRow};
pub use sqlite::SqliteRepository;
pub use store::{ProcessedDataConfig, ProcessedDataStore};
pub use strategy::{Admission, BulkInsertReturning, InsertClassificationStrategy, PerRowInsert};
