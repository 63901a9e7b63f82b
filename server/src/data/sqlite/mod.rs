//! SQLite search executor
//!
//! Runs prepared searches against an SQLite pool. Rows come back either as
//! caller types implementing `FromRow`, or as `JsonRow` when the shape is only
//! known at runtime (CLI output).

mod row;

pub use row::JsonRow;
pub use sqlx::SqlitePool;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{ConnectOptions, FromRow, Row, Sqlite};
use tracing::log::LevelFilter;

use crate::core::constants::{SQLITE_BUSY_TIMEOUT_SECS, SQLITE_MAX_CONNECTIONS};
use crate::data::error::DataError;
use crate::data::filters::{SearchRequest, SqlValue};
use crate::data::traits::SearchExecutor;
use crate::utils::time::format_timestamp;

/// Search executor backed by an SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteExecutor {
    pool: SqlitePool,
}

impl SqliteExecutor {
    /// Open a pool for `url` (`sqlite://path`, `sqlite::memory:` or a bare path)
    pub async fn connect(url: &str) -> Result<Self, DataError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(DataError::from_sqlite)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(SQLITE_BUSY_TIMEOUT_SECS))
            .log_statements(LevelFilter::Trace);

        let pool = SqlitePoolOptions::new()
            .max_connections(SQLITE_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(DataError::from_sqlite)?;

        tracing::debug!(url = %url, "SqliteExecutor initialized");
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("SQLite pool closed");
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in params {
        query = match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Integer(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Timestamp(ts) => query.bind(format_timestamp(ts)),
        };
    }
    query
}

#[async_trait]
impl<T> SearchExecutor<T> for SqliteExecutor
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    async fn count(&self, request: &SearchRequest) -> Result<u64, DataError> {
        let sql = request.count_sql();
        tracing::trace!(sql = %sql, params = request.params().len(), "Counting search rows");
        let row = bind_params(sqlx::query(&sql), request.params())
            .fetch_one(&self.pool)
            .await
            .map_err(DataError::from_sqlite)?;
        let total: i64 = row.try_get(0).map_err(DataError::from_sqlite)?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    async fn fetch_page(&self, request: &SearchRequest) -> Result<Vec<T>, DataError> {
        let sql = request.page_sql();
        tracing::trace!(sql = %sql, params = request.params().len(), "Fetching search page");
        let rows = bind_params(sqlx::query(&sql), request.params())
            .fetch_all(&self.pool)
            .await
            .map_err(DataError::from_sqlite)?;
        rows.iter()
            .map(|row| T::from_row(row).map_err(DataError::from_sqlite))
            .collect()
    }
}
