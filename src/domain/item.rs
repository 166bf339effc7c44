use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::descriptor::Changefreq;

/// Raw row returned by a data source.
///
/// `date` carries the descriptor's date field as stored, unparsed; URL generation parses it
/// leniently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRecord {
    pub id: Option<i64>,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
    pub date: Option<String>,
}

/// One `<url>` entry of a sitemap document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitemapItem {
    pub url: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub lastmod: Option<OffsetDateTime>,
    pub changefreq: Changefreq,
    pub priority: f32,
    pub title: Option<String>,
    pub id: Option<i64>,
}

impl SitemapItem {
    /// Build an entry for `record` using the last update (falling back to creation) as lastmod.
    pub fn from_record(
        record: &SourceRecord,
        url: String,
        changefreq: Changefreq,
        priority: f32,
        title: Option<String>,
    ) -> Self {
        Self {
            url,
            lastmod: record.updated_at.or(record.created_at),
            changefreq,
            priority,
            title,
            id: record.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn lastmod_prefers_updated_at() {
        let record = SourceRecord {
            id: Some(7),
            created_at: Some(datetime!(2023-01-01 0:00 UTC)),
            updated_at: Some(datetime!(2024-05-06 7:08 UTC)),
            ..SourceRecord::default()
        };

        let item = SitemapItem::from_record(
            &record,
            "https://example.com/7".to_string(),
            Changefreq::Daily,
            0.5,
            None,
        );
        assert_eq!(item.lastmod, Some(datetime!(2024-05-06 7:08 UTC)));
        assert_eq!(item.id, Some(7));

        let created_only = SourceRecord {
            updated_at: None,
            ..record
        };
        let item = SitemapItem::from_record(
            &created_only,
            "https://example.com/7".to_string(),
            Changefreq::Daily,
            0.5,
            None,
        );
        assert_eq!(item.lastmod, Some(datetime!(2023-01-01 0:00 UTC)));
    }

    #[test]
    fn cached_form_survives_json() {
        let item = SitemapItem {
            url: "https://example.com/posts/1".to_string(),
            lastmod: Some(datetime!(2024-02-03 4:05:06 +02:00)),
            changefreq: Changefreq::Monthly,
            priority: 0.8,
            title: Some("Hello".to_string()),
            id: Some(1),
        };

        let encoded = serde_json::to_vec(&item).expect("encode");
        let decoded: SitemapItem = serde_json::from_slice(&encoded).expect("decode");
        assert_eq!(decoded, item);
    }
}
