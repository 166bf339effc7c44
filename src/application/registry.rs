//! Name to descriptor lookup.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::{info, warn};

use crate::{
    application::partition::PartitionFile,
    cache::{rw_read, rw_write},
    domain::{
        descriptor::{SitemapDefinition, SourceDescriptor},
        error::ConfigurationError,
    },
};

const SOURCE: &str = "application::registry";

/// Registered sitemap sources. Populated at startup; reads are lock-shared.
#[derive(Debug, Default)]
pub struct SitemapRegistry {
    descriptors: RwLock<HashMap<String, Arc<SourceDescriptor>>>,
}

impl SitemapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `definition` and store it under `name`, replacing any previous entry.
    ///
    /// Names ending in `-latest`, `-part-N` or a four digit year are rejected: their full
    /// file would be served as a partition of the shorter name.
    pub fn register(
        &self,
        name: &str,
        definition: SitemapDefinition,
    ) -> Result<Arc<SourceDescriptor>, ConfigurationError> {
        let descriptor = Arc::new(SourceDescriptor::new(name, definition)?);
        let full = PartitionFile::Full.file_name(name);
        if PartitionFile::parse(&full) != Some((name.to_string(), PartitionFile::Full)) {
            return Err(ConfigurationError::AmbiguousName(name.to_string()));
        }

        let previous = rw_write(&self.descriptors, SOURCE, "register")
            .insert(name.to_string(), Arc::clone(&descriptor));

        if previous.is_some() {
            warn!(
                target = "sitemill::registry",
                sitemap = name,
                "Sitemap registered twice; the later definition wins"
            );
        } else {
            info!(
                target = "sitemill::registry",
                sitemap = name,
                mode = ?descriptor.mode(),
                "Sitemap registered"
            );
        }
        Ok(descriptor)
    }

    pub fn get(&self, name: &str) -> Option<Arc<SourceDescriptor>> {
        rw_read(&self.descriptors, SOURCE, "get").get(name).cloned()
    }

    /// Lookup that reports an unregistered name as a configuration error.
    pub fn require(&self, name: &str) -> Result<Arc<SourceDescriptor>, ConfigurationError> {
        self.get(name)
            .ok_or_else(|| ConfigurationError::UnknownSitemap(name.to_string()))
    }

    /// All descriptors, sorted by name.
    pub fn list(&self) -> Vec<(String, Arc<SourceDescriptor>)> {
        let mut entries: Vec<_> = rw_read(&self.descriptors, SOURCE, "list")
            .iter()
            .map(|(name, descriptor)| (name.clone(), Arc::clone(descriptor)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        rw_read(&self.descriptors, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
