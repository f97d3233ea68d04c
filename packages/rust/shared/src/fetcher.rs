//! The seam between query building and data access.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{QuerySpec, ResultSet};

/// Executes a [`QuerySpec`] against some backend and returns its rows.
///
/// Implementations exist for the REST client, the SQL store, and the
/// retry/cache decorators that wrap either of them.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Run the query and return rows in backend order.
    async fn fetch(&self, query: &QuerySpec) -> Result<ResultSet>;
}
