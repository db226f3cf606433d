//! Page classification: chapter, catalog, or indeterminate
//!
//! Confidence that a page is a catalog is accumulated from independent
//! weighted signals. The decision then applies fixed tie-break rules: a
//! substantial body always makes a chapter page.

use crate::config::ClassifyConfig;
use crate::extract::ExtractionResult;
use crate::links::{count_chapter_markers, is_chapter_link, url_path};
use crate::char_len;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::debug;

const STRONG_SIGNAL: f32 = 0.3;
const WEAK_SIGNAL: f32 = 0.15;
const CATALOG_CONTAINER_SIGNAL: f32 = 0.2;
const TITLE_KEYWORD_SIGNAL: f32 = 0.1;
const URL_HINT_SIGNAL: f32 = 0.2;
const PENALTY: f32 = 0.3;

/// Long bodies are chapters, not catalogs
const LONG_BODY_CHARS: usize = 3000;

/// Links a chapter-list container needs before it counts
const CATALOG_CONTAINER_MIN_LINKS: usize = 5;

/// A book detail page lists at most this many chapters (latest updates)
const DETAIL_PAGE_MAX_CHAPTERS: usize = 5;

/// Tolerance for float accumulation when comparing against the threshold
const EPSILON: f32 = 1e-6;

const CATALOG_TITLE_KEYWORDS: &[&str] = &[
    "目录",
    "章节列表",
    "全部章节",
    "最新章节",
    "catalog",
    "table of contents",
    "chapter list",
    "all chapters",
];

static CATALOG_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(catalog|mulu|chapterlist|chapter-list|chapter_list|/chapters?/?$|/list|/dir|/toc|/index\.s?html?$|/all\.s?html?$|/[0-9]+/$)",
    )
    .expect("catalog url pattern is valid")
});

static READER_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(/read/|/read\.|reader|chapter_?id=|cid=|/detail|/profile|/info|book_info|/[0-9]+(?:_[0-9]+)?\.s?html?$)",
    )
    .expect("reader url pattern is valid")
});

/// What kind of page a document is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PageKind {
    Chapter,
    Catalog,
    Indeterminate,
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageKind::Chapter => write!(f, "chapter"),
            PageKind::Catalog => write!(f, "catalog"),
            PageKind::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// Outcome of classifying one extraction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub page_kind: PageKind,
    /// Catalog confidence in [0, 1]
    pub confidence: f32,
    /// Human-readable reasons, for diagnostics only
    pub signals: Vec<String>,
}

struct Score {
    confidence: f32,
    signals: Vec<String>,
}

impl Score {
    fn add(&mut self, weight: f32, reason: impl std::fmt::Display) {
        self.confidence += weight;
        self.signals.push(format!("{:+.2} {}", weight, reason));
    }
}

/// Classify an extraction of the document at `url`
pub fn classify(
    extraction: &ExtractionResult,
    url: &str,
    config: &ClassifyConfig,
) -> ClassificationResult {
    let features = &extraction.features;
    let body_len = char_len(&extraction.body_text);
    let mut score = Score {
        confidence: 0.0,
        signals: Vec::new(),
    };

    let markers = count_chapter_markers(&extraction.body_text);
    if markers >= 3 {
        score.add(STRONG_SIGNAL, format!("{} chapter markers in body", markers));
    } else if markers >= 1 {
        score.add(WEAK_SIGNAL, format!("{} chapter markers in body", markers));
    }

    let chapter_like = extraction
        .chapter_links
        .iter()
        .filter(|l| is_chapter_link(&l.title, &l.url))
        .count();
    if chapter_like >= 3 {
        score.add(STRONG_SIGNAL, format!("{} chapter-like links", chapter_like));
    } else if chapter_like >= 1 {
        score.add(WEAK_SIGNAL, format!("{} chapter-like links", chapter_like));
    }

    if features.catalog_container_links >= CATALOG_CONTAINER_MIN_LINKS {
        score.add(
            CATALOG_CONTAINER_SIGNAL,
            format!(
                "chapter-list container with {} links",
                features.catalog_container_links
            ),
        );
    }

    let title = features.document_title.to_lowercase();
    if CATALOG_TITLE_KEYWORDS.iter().any(|kw| title.contains(kw)) {
        score.add(TITLE_KEYWORD_SIGNAL, "catalog keyword in document title");
    }

    if url_catalog_hint(url) {
        score.add(URL_HINT_SIGNAL, "catalog-like URL");
    }

    if body_len >= LONG_BODY_CHARS || features.has_reading_controls {
        score.add(-PENALTY, "long body or reading controls");
    }

    if features.has_cover_image && features.has_intro_text && chapter_like <= DETAIL_PAGE_MAX_CHAPTERS
    {
        score.add(-PENALTY, "book detail page (cover and introduction)");
    }

    if features.list_items >= 3 && features.metadata_list_items * 2 > features.list_items {
        score.add(-PENALTY, "list items describe books, not chapters");
    }

    let confidence = score.confidence.clamp(0.0, 1.0);
    let page_kind = if body_len >= config.chapter_min_body {
        PageKind::Chapter
    } else if confidence + EPSILON >= config.catalog_threshold
        && extraction.chapter_links.len() >= config.catalog_min_links
    {
        PageKind::Catalog
    } else {
        PageKind::Indeterminate
    };

    debug!(
        "Classified {} as {} (confidence {:.2}): {:?}",
        url, page_kind, confidence, score.signals
    );

    ClassificationResult {
        page_kind,
        confidence,
        signals: score.signals,
    }
}

/// Whether the URL alone suggests a catalog page.
///
/// Needs no document, so it can be computed before the first query.
pub fn url_catalog_hint(url: &str) -> bool {
    let path = url_path(url);
    let query = url.split_once('?').map(|(_, q)| q).unwrap_or_default();
    let target = format!("{}?{}", path, query);
    let target = target.trim_end_matches('?');
    CATALOG_URL_RE.is_match(target) && !READER_URL_RE.is_match(target)
}
