use thiserror::Error;

/// Raised while building or registering a descriptor. Never raised at fetch time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("sitemap `{name}` declares conflicting partition modes")]
    ConflictingPartitionModes { name: String },
    #[error("sitemap `{name}` uses range partitioning with a zero range size")]
    ZeroRangeSize { name: String },
    #[error("sitemap `{name}` has priority {value} outside 0.0..=1.0")]
    PriorityOutOfRange { name: String, value: String },
    #[error("unknown change frequency `{0}`")]
    UnknownChangefreq(String),
    #[error("unknown split strategy `{0}`")]
    UnknownSplitStrategy(String),
    #[error("unknown source kind `{0}`")]
    UnknownSourceKind(String),
    #[error("sitemap `{name}` has an invalid identifier for `{field}`: `{value}`")]
    InvalidIdentifier {
        name: String,
        field: &'static str,
        value: String,
    },
    #[error("sitemap name must be a non-empty token of letters, digits, `_` or `-`, got `{0}`")]
    InvalidName(String),
    #[error("sitemap name `{0}` reads as a partition file of another sitemap")]
    AmbiguousName(String),
    #[error("sitemap `{name}` has a zero latest limit")]
    ZeroLatestLimit { name: String },
    #[error("sitemap `{0}` is not registered")]
    UnknownSitemap(String),
}

impl ConfigurationError {
    pub fn invalid_identifier(
        name: impl Into<String>,
        field: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidIdentifier {
            name: name.into(),
            field,
            value: value.into(),
        }
    }
}
