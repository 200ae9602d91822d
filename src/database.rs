//! Database connectivity and query execution.

pub mod backend;
mod connection;
pub mod metadata;
mod query;
pub mod types;

pub use backend::{SqlBackend, SqlParam};
pub use connection::{create_backend, MssqlBackend};
pub use metadata::{
    ColumnDetail, DatabaseInfo, ForeignKey, IndexInfo, MetadataQueries, TableStructure,
    TableSummary,
};
pub(crate) use query::truncate_for_log;
pub use query::{ColumnInfo, QueryResult, Record, ResultRow};
pub use types::SqlValue;
