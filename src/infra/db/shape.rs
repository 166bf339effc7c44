//! SQL generation for the three record shapes.
//!
//! The base table is always aliased `b`; a translation table, when joined, is `t`. All
//! identifiers come from a validated descriptor and are checked again here before they are
//! spliced into SQL. Values are always bound.

use sqlx::{Postgres, QueryBuilder};

use crate::{
    application::error::DataSourceError,
    domain::{
        descriptor::{SourceDescriptor, SourceKind, is_valid_identifier},
        query::{ConditionOp, FilterValue, SourceQuery},
    },
};

const TRANSLATION_SUFFIX: &str = "_translations";

/// Where a descriptor's slug, title and name columns live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecordShape {
    Plain,
    Translated { table: String, foreign_key: String },
    JsonColumn,
}

impl RecordShape {
    pub(crate) fn for_descriptor(descriptor: &SourceDescriptor) -> Self {
        match descriptor.source_kind() {
            SourceKind::Plain => RecordShape::Plain,
            SourceKind::JsonColumn => RecordShape::JsonColumn,
            SourceKind::Translated { table, foreign_key } => RecordShape::Translated {
                table: table.clone(),
                foreign_key: foreign_key
                    .clone()
                    .unwrap_or_else(|| default_foreign_key(table)),
            },
        }
    }

    fn slug_column(&self, descriptor: &SourceDescriptor) -> String {
        match self {
            RecordShape::Translated { .. } => format!("t.{}", descriptor.slug_field()),
            _ => format!("b.{}", descriptor.slug_field()),
        }
    }

    fn push_columns(&self, qb: &mut QueryBuilder<'static, Postgres>, d: &SourceDescriptor) {
        let slug = self.slug_column(d);
        let (title, name) = match self {
            RecordShape::Translated { .. } => (
                format!("t.{}::TEXT", d.title_field()),
                "NULL::TEXT".to_string(),
            ),
            _ => (
                "NULL::TEXT".to_string(),
                format!("b.{}::TEXT", d.name_field()),
            ),
        };
        qb.push(format!(
            "SELECT b.id::BIGINT AS id, {slug}::TEXT AS slug, {title} AS title, {name} AS name, \
             b.created_at::TIMESTAMPTZ AS created_at, b.updated_at::TIMESTAMPTZ AS updated_at, \
             b.{date}::TEXT AS date ",
            date = d.date_field(),
        ));
    }

    fn push_from(&self, qb: &mut QueryBuilder<'static, Postgres>, table: &str, locale: &str) {
        qb.push(format!("FROM {table} AS b "));
        if let RecordShape::Translated { table, foreign_key } = self {
            qb.push(format!("INNER JOIN {table} AS t ON t.{foreign_key} = b.id AND t.locale = "));
            qb.push_bind(locale.to_string());
            qb.push(" ");
        }
    }
}

/// `post_translations` joins on `post_id`.
fn default_foreign_key(translation_table: &str) -> String {
    let base = translation_table
        .rsplit('.')
        .next()
        .unwrap_or(translation_table);
    let base = base.strip_suffix(TRANSLATION_SUFFIX).unwrap_or(base);
    format!("{base}_id")
}

/// `SELECT` of one partition, ordered newest first.
pub(crate) fn select_records(
    descriptor: &SourceDescriptor,
    query: &SourceQuery,
    locale: &str,
) -> Result<QueryBuilder<'static, Postgres>, DataSourceError> {
    let shape = RecordShape::for_descriptor(descriptor);
    let table = base_table(descriptor)?;

    let mut qb = QueryBuilder::new("");
    shape.push_columns(&mut qb, descriptor);
    shape.push_from(&mut qb, table, locale);
    push_filters(&mut qb, descriptor, &shape, query)?;

    qb.push(format!(
        " ORDER BY b.{} DESC, b.id DESC",
        descriptor.date_field()
    ));
    if let Some(offset) = query.offset {
        qb.push(" OFFSET ");
        qb.push_bind(to_i64(offset));
    }
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(to_i64(limit));
    }
    Ok(qb)
}

pub(crate) fn count_records(
    descriptor: &SourceDescriptor,
    query: &SourceQuery,
    locale: &str,
) -> Result<QueryBuilder<'static, Postgres>, DataSourceError> {
    let shape = RecordShape::for_descriptor(descriptor);
    let table = base_table(descriptor)?;

    let mut qb = QueryBuilder::new("SELECT COUNT(*) AS total ");
    shape.push_from(&mut qb, table, locale);
    push_filters(&mut qb, descriptor, &shape, query)?;
    Ok(qb)
}

pub(crate) fn distinct_years(
    descriptor: &SourceDescriptor,
    query: &SourceQuery,
    locale: &str,
) -> Result<QueryBuilder<'static, Postgres>, DataSourceError> {
    let shape = RecordShape::for_descriptor(descriptor);
    let table = base_table(descriptor)?;
    let date = descriptor.date_field();

    let mut qb = QueryBuilder::new(format!(
        "SELECT DISTINCT EXTRACT(YEAR FROM b.{date})::INT AS year "
    ));
    shape.push_from(&mut qb, table, locale);
    push_filters(&mut qb, descriptor, &shape, query)?;
    qb.push(format!(" AND b.{date} IS NOT NULL ORDER BY year DESC"));
    Ok(qb)
}

fn push_filters(
    qb: &mut QueryBuilder<'static, Postgres>,
    descriptor: &SourceDescriptor,
    shape: &RecordShape,
    query: &SourceQuery,
) -> Result<(), DataSourceError> {
    let slug = shape.slug_column(descriptor);
    qb.push(format!("WHERE {slug} IS NOT NULL AND {slug}::TEXT <> ''"));

    if let Some(status) = descriptor.status() {
        push_comparison(qb, &format!("b.{}", status.field), ConditionOp::Eq, Some(&status.value));
    }

    if let Some(year) = query.year {
        qb.push(format!(
            " AND EXTRACT(YEAR FROM b.{})::INT = ",
            descriptor.date_field()
        ));
        qb.push_bind(year);
    }

    for condition in &query.conditions {
        if !is_valid_identifier(&condition.column) {
            return Err(DataSourceError::unsupported(
                descriptor.name(),
                format!("invalid condition column `{}`", condition.column),
            ));
        }
        if condition.op.is_binary() && condition.value.is_none() {
            return Err(DataSourceError::unsupported(
                descriptor.name(),
                format!("condition on `{}` is missing a value", condition.column),
            ));
        }
        push_comparison(
            qb,
            &format!("b.{}", condition.column),
            condition.op,
            condition.value.as_ref(),
        );
    }
    Ok(())
}

fn push_comparison(
    qb: &mut QueryBuilder<'static, Postgres>,
    column: &str,
    op: ConditionOp,
    value: Option<&FilterValue>,
) {
    match (op.is_binary(), value) {
        (true, Some(FilterValue::Bool(value))) => {
            qb.push(format!(" AND {column} {} ", op.as_sql()));
            qb.push_bind(*value);
        }
        (true, Some(FilterValue::Int(value))) => {
            qb.push(format!(" AND {column} {} ", op.as_sql()));
            qb.push_bind(*value);
        }
        // Text compares against the column's text form so enum and varchar columns both work.
        (true, Some(FilterValue::Text(value))) => {
            qb.push(format!(" AND {column}::TEXT {} ", op.as_sql()));
            qb.push_bind(value.clone());
        }
        _ => {
            qb.push(format!(" AND {column} {}", op.as_sql()));
        }
    }
}

fn base_table(descriptor: &SourceDescriptor) -> Result<&str, DataSourceError> {
    descriptor
        .table()
        .ok_or_else(|| DataSourceError::unsupported(descriptor.name(), "no table configured"))
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
