//! Error types for ingestkit.
//!
//! Library crates use [`IngestError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.
//!
//! Per-item failures ([`IngestError::Fetch`], [`IngestError::EmptyContent`],
//! [`IngestError::UnreadablePdf`], [`IngestError::Llm`]) are recovered by the
//! orchestrator: logged into the batch's processing log and the item dropped.
//! [`IngestError::Validation`] and [`IngestError::Crawl`] abort before any
//! processing starts.

use std::path::PathBuf;

/// Transport-level failure while retrieving a source.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// DNS/connect-level failure, host unreachable.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// Request exceeded the configured timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Non-2xx HTTP status.
    #[error("{url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// Response is not text/HTML/PDF, or exceeds the payload size cap.
    #[error("{url}: unsupported media ({reason})")]
    UnsupportedMedia { url: String, reason: String },
}

/// Top-level error type for all ingestkit operations.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport failure for one source item.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// No content region could be isolated from a page.
    #[error("empty content: {url}")]
    EmptyContent { url: String },

    /// PDF could not be parsed, or is encrypted.
    #[error("unreadable PDF: {0}")]
    UnreadablePdf(String),

    /// LLM author-extraction call failed (tier is skipped, never fatal).
    #[error("llm error: {0}")]
    Llm(String),

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Batch request validation error (missing team_id, zero sources, ...).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Crawl frontier violation (depth over ceiling, multi-root continuation).
    #[error("crawl error: {message}")]
    Crawl { message: String },

    /// Webhook delivery exhausted its retries.
    #[error("webhook error: {0}")]
    Webhook(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, IngestError>;

impl IngestError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a crawl-frontier error from any displayable message.
    pub fn crawl(msg: impl Into<String>) -> Self {
        Self::Crawl {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this failure is scoped to one item (batch continues) rather
    /// than the whole batch.
    pub fn is_item_scoped(&self) -> bool {
        matches!(
            self,
            Self::Fetch(_)
                | Self::EmptyContent { .. }
                | Self::UnreadablePdf(_)
                | Self::Llm(_)
                | Self::Conversion(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = IngestError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = IngestError::validation("team_id must be non-empty");
        assert!(err.to_string().contains("team_id"));
    }

    #[test]
    fn fetch_error_wraps_into_ingest_error() {
        let err: IngestError = FetchError::Status {
            url: "https://example.com/".into(),
            status: 503,
        }
        .into();
        assert!(err.to_string().contains("HTTP 503"));
        assert!(err.is_item_scoped());
    }

    #[test]
    fn batch_level_errors_are_not_item_scoped() {
        assert!(!IngestError::validation("no sources").is_item_scoped());
        assert!(!IngestError::crawl("depth 9 exceeds ceiling 3").is_item_scoped());
    }
}
