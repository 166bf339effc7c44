//! Canonical URL resolution for source records.
//!
//! Resolution order, first match wins:
//!
//! 1. the descriptor's URL hook, used verbatim;
//! 2. its named route, when the router knows it;
//! 3. its route prefix: `{base}/{prefix}/{id}[/{slug}]`;
//! 4. `{base}/{table or "items"}/{id}`.
//!
//! Slugs may be plain strings or JSON objects keyed by locale.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde_json::Value;
use time::{
    Date, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description,
};
use url::Url;

use crate::{
    application::{error::UrlGenerationError, router::RouteResolver},
    domain::{descriptor::SourceDescriptor, item::SourceRecord},
};

const FALLBACK_COLLECTION: &str = "items";

/// Locale used to pick a value out of a translated field, and the key tried after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleSettings {
    pub active: String,
    pub fallback: String,
}

impl Default for LocaleSettings {
    fn default() -> Self {
        Self {
            active: "en".to_string(),
            fallback: "en".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct UrlResolver {
    base: Url,
    locales: LocaleSettings,
    router: Option<Arc<dyn RouteResolver>>,
}

impl fmt::Debug for UrlResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlResolver")
            .field("base", &self.base.as_str())
            .field("locales", &self.locales)
            .field("router", &self.router.is_some())
            .finish()
    }
}

impl UrlResolver {
    pub fn new(base: Url, locales: LocaleSettings) -> Self {
        Self {
            base,
            locales,
            router: None,
        }
    }

    pub fn with_router(mut self, router: Arc<dyn RouteResolver>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn locales(&self) -> &LocaleSettings {
        &self.locales
    }

    /// Canonical absolute URL of `record`. Deterministic for a given resolver and inputs.
    pub fn resolve(
        &self,
        descriptor: &SourceDescriptor,
        record: &SourceRecord,
    ) -> Result<String, UrlGenerationError> {
        if let Some(hook) = descriptor.url_hook() {
            return hook(record, descriptor).map_err(|source| UrlGenerationError::Hook {
                sitemap: descriptor.name().to_string(),
                source,
            });
        }

        if let (Some(route), Some(router)) = (descriptor.route_name(), self.router.as_ref())
            && router.has(route)
        {
            let params = self.build_route_params(descriptor, record);
            return router.resolve(route, &params);
        }

        if let Some(prefix) = descriptor.route_prefix() {
            return Ok(self.prefixed(prefix, record));
        }

        let collection = descriptor.table().unwrap_or(FALLBACK_COLLECTION);
        let id = record.id.map(|id| id.to_string()).unwrap_or_default();
        Ok(self.join(&[collection, &id]))
    }

    /// Route parameters for `record`: the descriptor's template plus `id`, `slug` and the
    /// `year`/`month`/`day` of the date field. Parameters without a value are dropped.
    pub fn build_route_params(
        &self,
        descriptor: &SourceDescriptor,
        record: &SourceRecord,
    ) -> BTreeMap<String, String> {
        let mut params: BTreeMap<String, String> = descriptor
            .route_params()
            .iter()
            .filter_map(|(key, value)| value.clone().map(|value| (key.clone(), value)))
            .collect();

        if let Some(id) = record.id {
            params.insert("id".to_string(), id.to_string());
        }
        if let Some(slug) = self.slug(record) {
            params.insert("slug".to_string(), slug);
        }
        if let Some(date) = record.date.as_deref().and_then(parse_date) {
            params.insert("year".to_string(), format!("{:04}", date.year()));
            params.insert("month".to_string(), format!("{:02}", u8::from(date.month())));
            params.insert("day".to_string(), format!("{:02}", date.day()));
        }
        params
    }

    /// Pick the active (then fallback) locale out of a JSON-encoded translation map.
    /// Values that are not JSON objects are returned unchanged.
    pub fn localize(&self, raw: &str) -> String {
        if !raw.trim_start().starts_with('{') {
            return raw.to_string();
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => [&self.locales.active, &self.locales.fallback]
                .into_iter()
                .find_map(|locale| map.get(locale.as_str()).and_then(Value::as_str))
                .unwrap_or_default()
                .to_string(),
            _ => raw.to_string(),
        }
    }

    /// Localized title of `record`, falling back to its name.
    pub fn title(&self, record: &SourceRecord) -> Option<String> {
        record
            .title
            .as_deref()
            .map(|value| self.localize(value))
            .filter(|value| !value.is_empty())
            .or_else(|| {
                record
                    .name
                    .as_deref()
                    .map(|value| self.localize(value))
                    .filter(|value| !value.is_empty())
            })
    }

    /// Absolute URL of a site-relative path such as `sitemap-posts.xml`.
    pub fn absolute(&self, path: &str) -> String {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.join(&segments)
    }

    fn prefixed(&self, prefix: &str, record: &SourceRecord) -> String {
        let Some(id) = record.id else {
            return self.base.to_string();
        };
        let id = id.to_string();
        let mut segments: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
        segments.push(&id);
        let slug = self.slug(record);
        if let Some(slug) = slug.as_deref() {
            segments.push(slug);
        }
        self.join(&segments)
    }

    /// Localized slug, unless empty or equal to the record id.
    fn slug(&self, record: &SourceRecord) -> Option<String> {
        let slug = self.localize(record.slug.as_deref()?);
        let same_as_id = record.id.is_some_and(|id| id.to_string() == slug);
        (!slug.is_empty() && !same_as_id).then_some(slug)
    }

    fn join(&self, segments: &[&str]) -> String {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.into()
    }
}

/// RFC 3339 first, then a leading `YYYY-MM-DD`. Anything else yields `None`.
fn parse_date(raw: &str) -> Option<Date> {
    let raw = raw.trim();
    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(parsed.date());
    }
    let head = raw.get(..10)?;
    Date::parse(head, format_description!("[year]-[month]-[day]")).ok()
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::{
        application::router::RouteTable,
        domain::descriptor::{HookError, SitemapDefinition},
    };

    fn base() -> Url {
        Url::parse("https://example.com").unwrap()
    }

    fn resolver(active: &str, fallback: &str) -> UrlResolver {
        UrlResolver::new(
            base(),
            LocaleSettings {
                active: active.to_string(),
                fallback: fallback.to_string(),
            },
        )
    }

    fn descriptor(definition: SitemapDefinition) -> SourceDescriptor {
        SourceDescriptor::new("posts", definition).unwrap()
    }

    fn record(id: i64, slug: &str) -> SourceRecord {
        SourceRecord {
            id: Some(id),
            slug: Some(slug.to_string()),
            date: Some("2024-03-05 10:11:12+00".to_string()),
            ..SourceRecord::default()
        }
    }

    #[test]
    fn json_slug_follows_active_then_fallback_locale() {
        let slug = r#"{"en":"foo","ar":"bar"}"#;
        assert_eq!(resolver("en", "ar").localize(slug), "foo");
        assert_eq!(resolver("fr", "ar").localize(slug), "bar");
        assert_eq!(resolver("fr", "de").localize(slug), "");
        assert_eq!(resolver("en", "ar").localize("{not json"), "{not json");
    }

    #[test]
    fn missing_locale_drops_the_slug_segment() {
        let descriptor = descriptor(SitemapDefinition {
            route_prefix: Some("news".to_string()),
            ..SitemapDefinition::for_table("posts")
        });
        let record = record(12, r#"{"en":"foo","ar":"bar"}"#);

        assert_eq!(
            resolver("en", "ar").resolve(&descriptor, &record).unwrap(),
            "https://example.com/news/12/foo"
        );
        assert_eq!(
            resolver("fr", "ar").resolve(&descriptor, &record).unwrap(),
            "https://example.com/news/12/bar"
        );
        assert_eq!(
            resolver("fr", "de").resolve(&descriptor, &record).unwrap(),
            "https://example.com/news/12"
        );
    }

    #[test]
    fn hook_beats_route_and_prefix() {
        let table = RouteTable::new(base()).with_route("posts.show", "/blog/{slug}");
        let resolver = resolver("en", "en").with_router(Arc::new(table));
        let descriptor = descriptor(SitemapDefinition {
            route_name: Some("posts.show".to_string()),
            route_prefix: Some("news".to_string()),
            url_hook: Some(Arc::new(
                |record: &SourceRecord, _: &SourceDescriptor| -> Result<String, HookError> {
                    Ok(format!("https://cdn.example.com/{}", record.id.unwrap_or_default()))
                },
            )),
            ..SitemapDefinition::for_table("posts")
        });

        assert_eq!(
            resolver.resolve(&descriptor, &record(3, "hello")).unwrap(),
            "https://cdn.example.com/3"
        );
    }

    #[test]
    fn route_beats_prefix() {
        let table = RouteTable::new(base()).with_route("posts.show", "/blog/{year}/{month}/{slug}");
        let resolver = resolver("en", "en").with_router(Arc::new(table));
        let descriptor = descriptor(SitemapDefinition {
            route_name: Some("posts.show".to_string()),
            route_prefix: Some("news".to_string()),
            ..SitemapDefinition::for_table("posts")
        });

        assert_eq!(
            resolver.resolve(&descriptor, &record(3, "hello")).unwrap(),
            "https://example.com/blog/2024/03/hello?day=05&id=3"
        );
    }

    #[test]
    fn unknown_route_falls_through_to_prefix() {
        let resolver = resolver("en", "en").with_router(Arc::new(RouteTable::new(base())));
        let descriptor = descriptor(SitemapDefinition {
            route_name: Some("posts.show".to_string()),
            route_prefix: Some("news".to_string()),
            ..SitemapDefinition::for_table("posts")
        });

        assert_eq!(
            resolver.resolve(&descriptor, &record(3, "hello")).unwrap(),
            "https://example.com/news/3/hello"
        );
    }

    #[test]
    fn hook_failure_propagates() {
        let descriptor = descriptor(SitemapDefinition {
            url_hook: Some(Arc::new(
                |_: &SourceRecord, _: &SourceDescriptor| -> Result<String, HookError> {
                    Err("no canonical url".into())
                },
            )),
            ..SitemapDefinition::for_table("posts")
        });

        assert!(matches!(
            resolver("en", "en").resolve(&descriptor, &record(1, "a")),
            Err(UrlGenerationError::Hook { .. })
        ));
    }

    #[test]
    fn fallback_uses_table_or_items() {
        let resolver = resolver("en", "en");
        let with_table = descriptor(SitemapDefinition::for_table("posts"));
        let without_table = descriptor(SitemapDefinition::default());

        assert_eq!(
            resolver.resolve(&with_table, &record(4, "x")).unwrap(),
            "https://example.com/posts/4"
        );
        let no_id = SourceRecord::default();
        assert_eq!(
            resolver.resolve(&without_table, &no_id).unwrap(),
            "https://example.com/items/"
        );
    }

    #[test]
    fn prefix_without_id_is_site_root() {
        let descriptor = descriptor(SitemapDefinition {
            route_prefix: Some("news".to_string()),
            ..SitemapDefinition::default()
        });
        assert_eq!(
            resolver("en", "en")
                .resolve(&descriptor, &SourceRecord::default())
                .unwrap(),
            "https://example.com/"
        );
    }

    #[test]
    fn route_params_skip_slug_equal_to_id_and_bad_dates() {
        let mut template = BTreeMap::new();
        template.insert("lang".to_string(), Some("en".to_string()));
        template.insert("unused".to_string(), None);
        let descriptor = descriptor(SitemapDefinition {
            route_params: template,
            ..SitemapDefinition::for_table("posts")
        });
        let record = SourceRecord {
            id: Some(8),
            slug: Some("8".to_string()),
            date: Some("yesterday".to_string()),
            ..SourceRecord::default()
        };

        let params = resolver("en", "en").build_route_params(&descriptor, &record);
        assert_eq!(
            params.into_iter().collect::<Vec<_>>(),
            vec![
                ("id".to_string(), "8".to_string()),
                ("lang".to_string(), "en".to_string()),
            ]
        );
    }

    #[test]
    fn lenient_date_parsing() {
        assert_eq!(parse_date("2024-03-05T10:11:12Z"), Some(date!(2024 - 03 - 05)));
        assert_eq!(parse_date("2024-03-05 10:11:12+00"), Some(date!(2024 - 03 - 05)));
        assert_eq!(parse_date("2024-03-05"), Some(date!(2024 - 03 - 05)));
        assert_eq!(parse_date("03/05/2024"), None);
    }

    #[test]
    fn title_falls_back_to_localized_name() {
        let resolver = resolver("ar", "en");
        let record = SourceRecord {
            title: Some(String::new()),
            name: Some(r#"{"ar":"مرحبا","en":"Hello"}"#.to_string()),
            ..SourceRecord::default()
        };
        assert_eq!(resolver.title(&record).as_deref(), Some("مرحبا"));
    }

    #[test]
    fn absolute_paths_join_the_base() {
        assert_eq!(
            resolver("en", "en").absolute("sitemap-posts.xml"),
            "https://example.com/sitemap-posts.xml"
        );
    }
}
