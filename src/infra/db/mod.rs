//! Postgres-backed data source.

mod shape;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    Row,
    postgres::{PgPool, PgPoolOptions},
    query,
};
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    application::{error::DataSourceError, source::DataSource},
    domain::{descriptor::SourceDescriptor, item::SourceRecord, query::SourceQuery},
};

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: Option<i64>,
    slug: Option<String>,
    title: Option<String>,
    name: Option<String>,
    created_at: Option<OffsetDateTime>,
    updated_at: Option<OffsetDateTime>,
    date: Option<String>,
}

impl From<RecordRow> for SourceRecord {
    fn from(row: RecordRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            title: row.title,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
            date: row.date,
        }
    }
}

/// Reads sitemap records straight from the application's tables.
///
/// Translated descriptors join their translation table on the configured locale.
#[derive(Clone)]
pub struct PostgresDataSource {
    pool: Arc<PgPool>,
    locale: String,
}

impl PostgresDataSource {
    pub fn new(pool: PgPool, locale: impl Into<String>) -> Self {
        Self {
            pool: Arc::new(pool),
            locale: locale.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    fn scoped(descriptor: &SourceDescriptor, query: &SourceQuery) -> SourceQuery {
        let mut query = query.clone();
        descriptor.scope_query(&mut query);
        query
    }
}

#[async_trait]
impl DataSource for PostgresDataSource {
    async fn query(
        &self,
        descriptor: &SourceDescriptor,
        query: &SourceQuery,
    ) -> Result<Vec<SourceRecord>, DataSourceError> {
        let query = Self::scoped(descriptor, query);
        let mut qb = shape::select_records(descriptor, &query, &self.locale)?;
        debug!(
            target = "sitemill::db",
            sitemap = descriptor.name(),
            sql = qb.sql(),
            "Querying sitemap records"
        );

        let rows = qb
            .build_query_as::<RecordRow>()
            .fetch_all(self.pool())
            .await
            .map_err(|err| map_sqlx_error(descriptor.name(), err))?;

        Ok(rows.into_iter().map(SourceRecord::from).collect())
    }

    async fn count(&self, descriptor: &SourceDescriptor) -> Result<u64, DataSourceError> {
        let query = Self::scoped(descriptor, &SourceQuery::all());
        let mut qb = shape::count_records(descriptor, &query, &self.locale)?;

        let row = qb
            .build()
            .fetch_one(self.pool())
            .await
            .map_err(|err| map_sqlx_error(descriptor.name(), err))?;
        let total: i64 = row
            .try_get("total")
            .map_err(|err| map_sqlx_error(descriptor.name(), err))?;

        u64::try_from(total)
            .map_err(|_| DataSourceError::query(descriptor.name(), "count is negative"))
    }

    async fn distinct_years(
        &self,
        descriptor: &SourceDescriptor,
    ) -> Result<Vec<i32>, DataSourceError> {
        let query = Self::scoped(descriptor, &SourceQuery::all());
        let mut qb = shape::distinct_years(descriptor, &query, &self.locale)?;

        let rows = qb
            .build()
            .fetch_all(self.pool())
            .await
            .map_err(|err| map_sqlx_error(descriptor.name(), err))?;

        rows.iter()
            .map(|row| {
                row.try_get::<i32, _>("year")
                    .map_err(|err| map_sqlx_error(descriptor.name(), err))
            })
            .collect()
    }
}
