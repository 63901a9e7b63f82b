//! Error types for the data layer
//!
//! `DataError` covers failures while talking to a database. `SearchError`
//! joins it with `FilterError` for the search path, where either the filter
//! or the backend can be at fault.

use thiserror::Error;

use crate::data::filters::FilterError;

/// Error raised by a storage backend
#[derive(Error, Debug)]
pub enum DataError {
    /// SQLite database error
    #[error("SQLite error: {0}")]
    Sqlite(sqlx::Error),

    /// Backend not available
    #[error("Backend {backend} is not available: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },
}

impl DataError {
    /// Create a SQLite error with preserved context
    pub fn from_sqlite(e: sqlx::Error) -> Self {
        Self::Sqlite(e)
    }

    /// Create a backend unavailable error
    pub fn backend_unavailable(backend: &'static str, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend,
            reason: reason.into(),
        }
    }
}

/// Error raised by a paginated search
#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Data(#[from] DataError),
}

impl SearchError {
    /// True when the caller sent a bad filter or page request
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Filter(e) => e.is_client_error(),
            Self::Data(_) => false,
        }
    }
}
