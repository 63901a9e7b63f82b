//! Executor traits for database backends
//!
//! The filter engine builds SQL; an executor runs it. Each backend implements
//! `SearchExecutor` for the row types it can produce.

use async_trait::async_trait;

use crate::data::error::DataError;
use crate::data::filters::SearchRequest;

/// Runs the count and page queries of a prepared search
#[async_trait]
pub trait SearchExecutor<T: Send>: Send + Sync {
    /// Number of distinct root rows matching the filter
    async fn count(&self, request: &SearchRequest) -> Result<u64, DataError>;

    /// Rows of the requested page, in request order
    async fn fetch_page(&self, request: &SearchRequest) -> Result<Vec<T>, DataError>;
}
