//! Named route table used for canonical URL generation.

use std::collections::{BTreeMap, HashMap};

use url::{Url, form_urlencoded::Serializer};

use crate::application::error::UrlGenerationError;

/// Resolves a named route and its parameters to an absolute URL.
pub trait RouteResolver: Send + Sync {
    fn has(&self, route: &str) -> bool;

    fn resolve(
        &self,
        route: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<String, UrlGenerationError>;
}

/// Path templates keyed by route name, e.g. `blog.show => /blog/{year}/{slug}`.
///
/// Placeholders are replaced segment by segment and percent-encoded. Parameters the template
/// does not consume are appended as a query string in key order.
#[derive(Debug, Clone)]
pub struct RouteTable {
    base: Url,
    templates: HashMap<String, String>,
}

impl RouteTable {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            templates: HashMap::new(),
        }
    }

    pub fn with_route(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.insert(name, template);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, template: impl Into<String>) {
        self.templates.insert(name.into(), template.into());
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl RouteResolver for RouteTable {
    fn has(&self, route: &str) -> bool {
        self.templates.contains_key(route)
    }

    fn resolve(
        &self,
        route: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<String, UrlGenerationError> {
        let template = self
            .templates
            .get(route)
            .ok_or_else(|| UrlGenerationError::UnknownRoute(route.to_string()))?;

        let mut used = Vec::new();
        let mut segments = Vec::new();
        for raw in template.split('/').filter(|segment| !segment.is_empty()) {
            segments.push(fill_segment(route, raw, params, &mut used)?);
        }

        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in &segments {
                path.push(segment);
            }
        }

        let mut query = Serializer::new(String::new());
        let mut has_query = false;
        for (key, value) in params {
            if !used.iter().any(|name| name == key) {
                query.append_pair(key, value);
                has_query = true;
            }
        }
        if has_query {
            url.set_query(Some(&query.finish()));
        }

        Ok(url.into())
    }
}

fn fill_segment(
    route: &str,
    raw: &str,
    params: &BTreeMap<String, String>,
    used: &mut Vec<String>,
) -> Result<String, UrlGenerationError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &rest[start + 1..start + len];
        let value = params
            .get(name)
            .ok_or_else(|| UrlGenerationError::MissingParameter {
                route: route.to_string(),
                parameter: name.to_string(),
            })?;
        out.push_str(value);
        used.push(name.to_string());
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
