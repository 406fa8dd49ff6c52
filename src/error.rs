//! Error kinds surfaced by the relay pipeline.

use thiserror::Error;

/// Failure while turning a post body into Markdown segments.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentParseError {
    #[error("element nesting exceeds {0} levels")]
    TooDeep(usize),
    #[error("converter failed on malformed markup")]
    Converter,
    #[error("invalid asset path {path:?}: {reason}")]
    InvalidAssetPath { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("login failed: {0:#}")]
    Login(#[source] anyhow::Error),

    #[error("failed to fetch feed: {0:#}")]
    FeedFetch(#[source] anyhow::Error),

    #[error("failed to fetch post @{nr}: {source:#}")]
    DetailFetch {
        nr: i64,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to fetch author of post @{nr}: {source:#}")]
    AuthorFetch {
        nr: i64,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to convert post @{nr}: {source}")]
    ContentParse {
        nr: i64,
        #[source]
        source: ContentParseError,
    },

    #[error("failed to deliver post @{nr}: {source:#}")]
    Delivery {
        nr: i64,
        #[source]
        source: anyhow::Error,
    },

    #[error("watermark store error: {0:#}")]
    WatermarkStore(#[source] anyhow::Error),
}

impl RelayError {
    /// Whether this error ends processing of the whole course.
    pub fn aborts_course(&self) -> bool {
        matches!(
            self,
            RelayError::Login(_) | RelayError::FeedFetch(_) | RelayError::WatermarkStore(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Login(_) => "login",
            RelayError::FeedFetch(_) => "feed_fetch",
            RelayError::DetailFetch { .. } => "detail_fetch",
            RelayError::AuthorFetch { .. } => "author_fetch",
            RelayError::ContentParse { .. } => "content_parse",
            RelayError::Delivery { .. } => "delivery",
            RelayError::WatermarkStore(_) => "watermark_store",
        }
    }
}
