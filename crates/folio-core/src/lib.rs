//! Folio Core Library
//!
//! Reading-mode content engine for serialized fiction sites:
//! - Document hosts (headless Chrome and static HTTP) that run the snapshot query
//! - Link classification and content extraction over document snapshots
//! - Chapter/catalog page classification with confidence scoring
//! - Chapter index resolution and the process-wide catalog cache
//! - The reading session state machine with retry and seamless paging

pub mod catalog;
pub mod chrome;
pub mod classify;
pub mod config;
pub mod extract;
pub mod host;
pub mod links;
pub mod resolve;
pub mod session;
pub mod snapshot;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export key types
pub use catalog::{CatalogCache, CatalogStore, ChapterEntry, ChapterList, JsonFileStore, MemoryStore};
pub use chrome::{ChromeConfig, ChromeHost, ChromeManager};
pub use classify::{classify, ClassificationResult, PageKind};
pub use config::EngineConfig;
pub use extract::{extract, ExtractionResult, PageFeatures};
pub use host::{DocumentHandle, DocumentHost, QueryProgram, StaticHost};
pub use resolve::resolve;
pub use session::{
    PendingNavigation, ReadingSession, SessionEvent, SessionHandle, SessionState, Transition,
};
pub use snapshot::DocumentSnapshot;

#[derive(Error, Debug)]
pub enum FolioError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("Query failed: {0}")]
    HostError(String),

    #[error("Content extraction failed: {0}")]
    ExtractionError(String),

    #[error("Reading session is not active")]
    NotActive,

    #[error("No chapter at index {target} (list has {len} chapters)")]
    OutOfBounds { target: i64, len: usize },

    #[error("No chapter list available")]
    NoChapterList,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, FolioError>;

/// A link that looks like it points at a chapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterLink {
    /// The visible link text
    pub title: String,
    /// The target URL
    pub url: String,
}

impl ChapterLink {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }

    /// The URL in the form used for equality checks
    pub fn normalized_url(&self) -> String {
        normalize_url(&self.url)
    }
}

impl PartialEq for ChapterLink {
    fn eq(&self, other: &Self) -> bool {
        self.normalized_url() == other.normalized_url()
    }
}

impl Eq for ChapterLink {}

impl std::hash::Hash for ChapterLink {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalized_url().hash(state);
    }
}

/// Normalize a URL for comparison: trimmed, lowercased, without fragment or trailing slash.
///
/// The query string is kept, since many sites address chapters as `read.php?id=N`.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = url.split('#').next().unwrap_or(url);
    url.trim_end_matches('/').to_lowercase()
}

/// Number of characters (not bytes) in a string
pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url(" https://Example.com/Book/1.html#top "),
            "https://example.com/book/1.html"
        );
        assert_eq!(normalize_url("https://example.com/book/"), "https://example.com/book");
        assert_eq!(
            normalize_url("https://example.com/read.php?id=3"),
            "https://example.com/read.php?id=3"
        );
    }

    #[test]
    fn test_chapter_link_equality_uses_normalized_url() {
        let a = ChapterLink::new("第一章", "https://example.com/1.html");
        let b = ChapterLink::new("Chapter 1", "https://EXAMPLE.com/1.html#anchor");
        let c = ChapterLink::new("第一章", "https://example.com/2.html");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_char_len_counts_cjk_as_one() {
        assert_eq!(char_len("第一章"), 3);
        assert_eq!(char_len("abc"), 3);
    }
}
