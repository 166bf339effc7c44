//! Data source port.

use async_trait::async_trait;

use crate::{
    application::error::DataSourceError,
    domain::{descriptor::SourceDescriptor, item::SourceRecord, query::SourceQuery},
};

/// Executes selections for a descriptor.
///
/// Implementations apply the descriptor's visibility filter (non-empty slug, status value) and
/// its query hook to every call, and return records ordered by the date field descending with
/// id descending as tie-break.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn query(
        &self,
        descriptor: &SourceDescriptor,
        query: &SourceQuery,
    ) -> Result<Vec<SourceRecord>, DataSourceError>;

    /// Number of visible records.
    async fn count(&self, descriptor: &SourceDescriptor) -> Result<u64, DataSourceError>;

    /// Distinct years of the date field among visible records, newest first.
    async fn distinct_years(&self, descriptor: &SourceDescriptor)
    -> Result<Vec<i32>, DataSourceError>;
}
