//! `<urlset>` and `<sitemapindex>` documents.

use std::fmt::Write as _;

use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

use crate::{application::manager::IndexEntry, domain::item::SitemapItem};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

const LASTMOD_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]"
);

pub fn render_urlset(items: &[SitemapItem]) -> String {
    let mut body = String::with_capacity(128 + items.len() * 192);
    body.push_str(XML_DECLARATION);
    let _ = writeln!(body, "<urlset xmlns=\"{SITEMAP_NS}\">");

    for item in items {
        body.push_str("  <url>\n");
        let _ = writeln!(body, "    <loc>{}</loc>", xml_escape(&item.url));
        if let Some(lastmod) = item.lastmod.and_then(format_lastmod) {
            let _ = writeln!(body, "    <lastmod>{lastmod}</lastmod>");
        }
        let _ = writeln!(body, "    <changefreq>{}</changefreq>", item.changefreq);
        let _ = writeln!(body, "    <priority>{:.1}</priority>", item.priority);
        body.push_str("  </url>\n");
    }

    body.push_str("</urlset>\n");
    body
}

pub fn render_index(entries: &[IndexEntry]) -> String {
    let mut body = String::with_capacity(128 + entries.len() * 160);
    body.push_str(XML_DECLARATION);
    let _ = writeln!(body, "<sitemapindex xmlns=\"{SITEMAP_NS}\">");

    for entry in entries {
        body.push_str("  <sitemap>\n");
        let _ = writeln!(body, "    <loc>{}</loc>", xml_escape(&entry.loc));
        if let Some(lastmod) = format_lastmod(entry.lastmod) {
            let _ = writeln!(body, "    <lastmod>{lastmod}</lastmod>");
        }
        body.push_str("  </sitemap>\n");
    }

    body.push_str("</sitemapindex>\n");
    body
}

fn format_lastmod(value: OffsetDateTime) -> Option<String> {
    value.format(LASTMOD_FORMAT).ok()
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::descriptor::Changefreq;

    fn item(url: &str) -> SitemapItem {
        SitemapItem {
            url: url.to_string(),
            lastmod: Some(datetime!(2024-03-05 6:07:08 +02:00)),
            changefreq: Changefreq::Daily,
            priority: 0.8,
            title: Some("Hello".to_string()),
            id: Some(1),
        }
    }

    #[test]
    fn urlset_renders_every_field() {
        let xml = render_urlset(&[item("https://example.com/posts/hello")]);

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">"));
        assert!(xml.contains("<loc>https://example.com/posts/hello</loc>"));
        assert!(xml.contains("<lastmod>2024-03-05T06:07:08+02:00</lastmod>"));
        assert!(xml.contains("<changefreq>daily</changefreq>"));
        assert!(xml.contains("<priority>0.8</priority>"));
        assert!(xml.trim_end().ends_with("</urlset>"));
    }

    #[test]
    fn urlset_escapes_locations_and_skips_missing_lastmod() {
        let mut entry = item("https://example.com/search?a=1&b=<2>");
        entry.lastmod = None;
        entry.priority = 1.0;

        let xml = render_urlset(&[entry]);
        assert!(xml.contains("<loc>https://example.com/search?a=1&amp;b=&lt;2&gt;</loc>"));
        assert!(!xml.contains("<lastmod>"));
        assert!(xml.contains("<priority>1.0</priority>"));
    }

    #[test]
    fn empty_urlset_is_well_formed() {
        let xml = render_urlset(&[]);
        assert!(!xml.contains("<url>"));
        assert!(xml.contains("</urlset>"));
    }

    #[test]
    fn index_lists_files_in_order() {
        let entries = vec![
            IndexEntry {
                loc: "https://example.com/sitemap-posts-latest.xml".to_string(),
                lastmod: datetime!(2024-01-02 3:04:05 UTC),
            },
            IndexEntry {
                loc: "https://example.com/sitemap-posts-2024.xml".to_string(),
                lastmod: datetime!(2024-01-02 3:04:05 UTC),
            },
        ];

        let xml = render_index(&entries);
        let latest = xml.find("sitemap-posts-latest.xml").unwrap();
        let year = xml.find("sitemap-posts-2024.xml").unwrap();
        assert!(latest < year);
        assert!(xml.contains("<lastmod>2024-01-02T03:04:05+00:00</lastmod>"));
        assert_eq!(xml.matches("<sitemap>").count(), 2);
    }
}
