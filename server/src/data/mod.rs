//! Data layer
//!
//! - `filters` - Filter expression compiler (parse, plan, resolve, render)
//! - `pagination` - Page requests, ordering and page results
//! - `sql` - SQL dialects for the supported backends
//! - `sqlite` - SQLite executor for prepared searches
//! - `traits` - Executor trait implemented by storage backends
//! - `error` - Storage and search error types

pub mod error;
pub mod filters;
pub mod pagination;
pub mod sql;
pub mod sqlite;
pub mod traits;

pub use error::{DataError, SearchError};
pub use filters::{CompiledFilter, FilterEngine, FilterError, FilterNode, SearchRequest};
pub use pagination::{OrderBy, OrderDirection, PaginationQuery, PaginationResult};
pub use sqlite::{JsonRow, SqliteExecutor};
pub use traits::SearchExecutor;
