// bookstore-core/src/lib.rs
// Embedded document database powering the bookstore demo

pub mod aggregation;
pub mod collection;
pub mod database;
pub mod document;
pub mod error;
pub mod filter;
pub mod find_options;
pub mod index;
pub mod query_planner;
pub mod storage;

// Public exports
pub use aggregation::Pipeline;
pub use collection::{Collection, DeleteResult, UpdateResult};
pub use database::Database;
pub use document::DocumentId;
pub use error::{BookstoreError, Result};
pub use filter::Filter;
pub use find_options::{FindOptions, Projection};
pub use index::{IndexKey, IndexSpec};
pub use query_planner::{ExecStats, QueryPlan, QueryPlanner};
pub use storage::{StorageEngine, StorageStats};
