//! In-process data source over fixed rows.
//!
//! Applies the same visibility rules as the Postgres source (non-empty slug, status value,
//! query hook conditions) so cache and URL behavior can be exercised without a database.

use std::{
    cmp::Ordering as CmpOrdering,
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    application::{error::DataSourceError, source::DataSource},
    cache::{rw_read, rw_write},
    domain::{
        descriptor::SourceDescriptor,
        item::SourceRecord,
        query::{Condition, ConditionOp, FilterValue, SourceQuery},
    },
};

const SOURCE: &str = "infra::memory";

/// One stored row: the record handed out plus the columns filters look at.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub record: SourceRecord,
    /// Value of the descriptor's date field.
    pub date: Option<OffsetDateTime>,
    pub columns: BTreeMap<String, FilterValue>,
}

impl MemoryRecord {
    /// A published row (`status = 1`) created at `date`.
    pub fn new(id: i64, slug: impl Into<String>, date: OffsetDateTime) -> Self {
        let mut columns = BTreeMap::new();
        columns.insert("status".to_string(), FilterValue::Int(1));
        Self {
            record: SourceRecord {
                id: Some(id),
                slug: Some(slug.into()),
                created_at: Some(date),
                date: date.format(&Rfc3339).ok(),
                ..SourceRecord::default()
            },
            date: Some(date),
            columns,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.record.title = Some(title.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.record.name = Some(name.into());
        self
    }

    pub fn with_updated_at(mut self, updated_at: OffsetDateTime) -> Self {
        self.record.updated_at = Some(updated_at);
        self
    }

    pub fn with_column(mut self, column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    pub fn without_column(mut self, column: &str) -> Self {
        self.columns.remove(column);
        self
    }

    fn visible(&self, descriptor: &SourceDescriptor, query: &SourceQuery) -> bool {
        let has_slug = self
            .record
            .slug
            .as_deref()
            .is_some_and(|slug| !slug.is_empty());
        let status_ok = descriptor.status().is_none_or(|status| {
            self.columns
                .get(&status.field)
                .is_some_and(|value| value.as_text() == status.value.as_text())
        });
        let year_ok = query
            .year
            .is_none_or(|year| self.date.is_some_and(|date| date.year() == year));

        has_slug && status_ok && year_ok && query.conditions.iter().all(|c| self.matches(c))
    }

    fn matches(&self, condition: &Condition) -> bool {
        let column = self.columns.get(&condition.column);
        match (condition.op, column, condition.value.as_ref()) {
            (ConditionOp::IsNull, column, _) => column.is_none(),
            (ConditionOp::IsNotNull, column, _) => column.is_some(),
            (op, Some(column), Some(value)) => {
                let ordering = compare(column, value);
                match op {
                    ConditionOp::Eq => ordering == CmpOrdering::Equal,
                    ConditionOp::NotEq => ordering != CmpOrdering::Equal,
                    ConditionOp::Lt => ordering == CmpOrdering::Less,
                    ConditionOp::Lte => ordering != CmpOrdering::Greater,
                    ConditionOp::Gt => ordering == CmpOrdering::Greater,
                    ConditionOp::Gte => ordering != CmpOrdering::Less,
                    ConditionOp::IsNull | ConditionOp::IsNotNull => false,
                }
            }
            _ => false,
        }
    }
}

fn compare(left: &FilterValue, right: &FilterValue) -> CmpOrdering {
    match (left, right) {
        (FilterValue::Int(left), FilterValue::Int(right)) => left.cmp(right),
        (left, right) => left.as_text().cmp(&right.as_text()),
    }
}

/// Rows keyed by table name (or sitemap name when the descriptor has no table).
#[derive(Debug, Default)]
pub struct MemoryDataSource {
    tables: RwLock<HashMap<String, Vec<MemoryRecord>>>,
    queries: AtomicUsize,
    counts: AtomicUsize,
    years: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: impl Into<String>, rows: Vec<MemoryRecord>) -> Self {
        self.replace(table, rows);
        self
    }

    pub fn replace(&self, table: impl Into<String>, rows: Vec<MemoryRecord>) {
        rw_write(&self.tables, SOURCE, "replace").insert(table.into(), rows);
    }

    pub fn push(&self, table: &str, row: MemoryRecord) {
        rw_write(&self.tables, SOURCE, "push")
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Make every call fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Total calls across `query`, `count` and `distinct_years`.
    pub fn calls(&self) -> usize {
        self.query_calls() + self.count_calls() + self.years_calls()
    }

    pub fn query_calls(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.counts.load(Ordering::SeqCst)
    }

    pub fn years_calls(&self) -> usize {
        self.years.load(Ordering::SeqCst)
    }

    fn check(&self, descriptor: &SourceDescriptor) -> Result<(), DataSourceError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(DataSourceError::query(descriptor.name(), "memory source unavailable"))
        } else {
            Ok(())
        }
    }

    fn visible(&self, descriptor: &SourceDescriptor, query: &SourceQuery) -> Vec<MemoryRecord> {
        let mut query = query.clone();
        descriptor.scope_query(&mut query);

        let table = descriptor.table().unwrap_or(descriptor.name());
        let tables = rw_read(&self.tables, SOURCE, "visible");
        let mut rows: Vec<MemoryRecord> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.visible(descriptor, &query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        rows.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.record.id.cmp(&a.record.id)));

        let offset = query.offset.map_or(0, |offset| offset as usize);
        let limit = query.limit.map_or(usize::MAX, |limit| limit as usize);
        rows.into_iter().skip(offset).take(limit).collect()
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn query(
        &self,
        descriptor: &SourceDescriptor,
        query: &SourceQuery,
    ) -> Result<Vec<SourceRecord>, DataSourceError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.check(descriptor)?;
        Ok(self
            .visible(descriptor, query)
            .into_iter()
            .map(|row| row.record)
            .collect())
    }

    async fn count(&self, descriptor: &SourceDescriptor) -> Result<u64, DataSourceError> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        self.check(descriptor)?;
        Ok(self.visible(descriptor, &SourceQuery::all()).len() as u64)
    }

    async fn distinct_years(
        &self,
        descriptor: &SourceDescriptor,
    ) -> Result<Vec<i32>, DataSourceError> {
        self.years.fetch_add(1, Ordering::SeqCst);
        self.check(descriptor)?;
        let years: BTreeSet<i32> = self
            .visible(descriptor, &SourceQuery::all())
            .iter()
            .filter_map(|row| row.date.map(|date| date.year()))
            .collect();
        Ok(years.into_iter().rev().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::macros::datetime;

    use super::*;
    use crate::domain::descriptor::SitemapDefinition;

    fn descriptor(definition: SitemapDefinition) -> SourceDescriptor {
        SourceDescriptor::new("posts", definition).unwrap()
    }

    fn source() -> MemoryDataSource {
        MemoryDataSource::new().with_table(
            "posts",
            vec![
                MemoryRecord::new(1, "first", datetime!(2022-01-01 0:00 UTC)),
                MemoryRecord::new(2, "second", datetime!(2024-06-01 0:00 UTC)),
                MemoryRecord::new(3, "third", datetime!(2024-06-01 0:00 UTC)),
                MemoryRecord::new(4, "", datetime!(2024-07-01 0:00 UTC)),
                MemoryRecord::new(5, "draft", datetime!(2024-08-01 0:00 UTC))
                    .with_column("status", 0_i64),
            ],
        )
    }

    #[tokio::test]
    async fn orders_by_date_then_id_descending() {
        let source = source();
        let records = source
            .query(&descriptor(SitemapDefinition::for_table("posts")), &SourceQuery::all())
            .await
            .unwrap();

        let ids: Vec<_> = records.iter().filter_map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn years_and_count_use_visible_rows() {
        let source = source();
        let descriptor = descriptor(SitemapDefinition::for_table("posts"));

        assert_eq!(source.count(&descriptor).await.unwrap(), 3);
        assert_eq!(source.distinct_years(&descriptor).await.unwrap(), vec![2024, 2022]);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn query_hook_conditions_apply() {
        let source = source();
        source.push(
            "posts",
            MemoryRecord::new(6, "hidden", datetime!(2023-01-01 0:00 UTC))
                .with_column("featured", false),
        );
        let descriptor = descriptor(SitemapDefinition {
            query_hook: Some(Arc::new(|query: &mut SourceQuery| {
                query.conditions.push(Condition::is_null("featured"));
            })),
            ..SitemapDefinition::for_table("posts")
        });

        let records = source
            .query(&descriptor, &SourceQuery::bounded(Some(1), Some(1)))
            .await
            .unwrap();
        assert_eq!(records.iter().filter_map(|r| r.id).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn failing_source_reports_query_errors() {
        let source = source();
        source.set_failing(true);
        let err = source
            .count(&descriptor(SitemapDefinition::for_table("posts")))
            .await
            .unwrap_err();
        assert!(matches!(err, DataSourceError::Query { .. }));
    }
}
