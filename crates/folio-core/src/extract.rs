//! Chapter content extraction over document snapshots
//!
//! Body text is found by a fixed selector list first and by paragraph density
//! second; titles, chapter lists, and navigation links are extracted
//! independently. Everything here is a pure function of the snapshot.

use crate::config::ExtractConfig;
use crate::links::{
    contains_ordinal, is_chapter_link, is_navigation_link, is_pseudo_url,
};
use crate::snapshot::{ContainerSnapshot, DocumentSnapshot, LinkSnapshot};
use crate::{char_len, ChapterLink};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

/// Returned when no title can be found
pub const UNKNOWN_CHAPTER_TITLE: &str = "Unknown chapter";

/// Titles without an ordinal are only trusted up to this length
const SHORT_TITLE_CHARS: usize = 30;

/// Lines of at most this length that carry a boilerplate phrase are dropped whole
const BOILERPLATE_LINE_CHARS: usize = 40;

/// Conventional article-body identifiers, in priority order
const BODY_IDENTIFIERS: &[&str] = &[
    "content",
    "chaptercontent",
    "chapter-content",
    "chapter_content",
    "booktxt",
    "booktext",
    "htmlcontent",
    "txtcontent",
    "txt",
    "nr1",
    "read-content",
    "readcontent",
    "article-content",
    "articlecontent",
    "entry-content",
    "post-content",
];

/// Tags tried after the identifiers
const BODY_TAGS: &[&str] = &["article", "main"];

/// Conventional chapter-title identifiers, in priority order
const TITLE_IDENTIFIERS: &[&str] = &[
    "chaptername",
    "chapter-title",
    "chapter_title",
    "chaptertitle",
    "j_chaptername",
    "title",
    "bookname",
    "article-title",
    "entry-title",
];

/// Identifier tokens marking site chrome
const CHROME_TOKENS: &[&str] = &["header", "footer", "nav", "menu"];

/// Paragraph fragments containing these are navigation or ads, not prose
const BOILERPLATE_FRAGMENTS: &[&str] = &[
    "previous chapter",
    "next chapter",
    "table of contents",
    "advertisement",
    "上一章",
    "下一章",
    "章节目录",
    "返回目录",
    "广告",
];

/// Recurring navigation and ad phrases stripped from body text
const BOILERPLATE_PHRASES: &[&str] = &[
    "previous chapter",
    "next chapter",
    "previous page",
    "next page",
    "table of contents",
    "back to index",
    "add bookmark",
    "advertisement",
    "上一章",
    "下一章",
    "上一页",
    "下一页",
    "返回目录",
    "章节目录",
    "返回书页",
    "加入书签",
    "投推荐票",
    "推荐本书",
    "最快更新",
    "天才一秒记住",
    "首发域名",
    "手机阅读",
    "请收藏本站",
    "广告",
];

const NEXT_KEYWORDS: &[&str] = &["下一章", "下一页", "下一节", "下章", "next chapter", "next page"];

const PREV_KEYWORDS: &[&str] = &[
    "上一章",
    "上一页",
    "上一节",
    "上章",
    "previous chapter",
    "prev chapter",
    "previous page",
];

/// Catalog link keywords, in priority order
const CATALOG_KEYWORDS: &[&str] = &[
    "全部章节",
    "完整目录",
    "章节目录",
    "章节列表",
    "目录",
    "all chapters",
    "full catalog",
    "chapter list",
    "table of contents",
    "index",
];

/// Catalog link text may exceed its keyword by this many characters
const CATALOG_KEYWORD_SLACK: usize = 4;

/// Identifier tokens of chapter-list containers
const CATALOG_TOKENS: &[&str] = &[
    "chapter-list",
    "chapterlist",
    "chapter_list",
    "catalog",
    "directory",
    "mulu",
    "listmain",
];

/// Short catalog identifiers, only matched as whole words
const CATALOG_WORDS: &[&str] = &["toc"];

/// Identifier tokens of book introductions
const INTRO_TOKENS: &[&str] = &["intro", "desc", "summary", "synopsis", "jianjie"];

/// Text markers of book introductions
const INTRO_MARKERS: &[&str] = &["内容简介", "作品简介", "简介：", "作者：", "synopsis", "author:"];

/// Reader controls shown around chapter text
const READING_CONTROLS: &[&str] = &[
    "previous chapter",
    "next chapter",
    "font size",
    "night mode",
    "上一章",
    "下一章",
    "字体大小",
    "字号",
    "夜间模式",
];

/// Words of book listings (browse and category pages)
const BOOK_METADATA_WORDS: &[&str] = &[
    "novel", "completed", "author", "ongoing", "小说", "完本", "完结", "连载", "作者",
];

static BOILERPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = BOILERPLATE_PHRASES
        .iter()
        .map(|phrase| regex::escape(phrase))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){alternation}")).expect("boilerplate pattern is valid")
});

/// Everything extracted from one document
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionResult {
    /// Chapter title, never empty
    pub title: String,
    /// Body text; empty means extraction failed
    pub body_text: String,
    /// Links of the best chapter-list container
    pub chapter_links: Vec<ChapterLink>,
    pub next_url: Option<String>,
    pub prev_url: Option<String>,
    pub catalog_url: Option<String>,
    /// Page-level signals for the classifier
    pub features: PageFeatures,
}

/// Page-level signals that are not part of the prose
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageFeatures {
    /// The declared document title
    pub document_title: String,
    /// Most links in a container identified as a chapter list
    pub catalog_container_links: usize,
    pub has_cover_image: bool,
    pub has_intro_text: bool,
    /// Reader control phrases appear anywhere in the document
    pub has_reading_controls: bool,
    pub list_items: usize,
    /// List items carrying book-listing words and no chapter marker
    pub metadata_list_items: usize,
}

/// Extract title, body, chapter links, and navigation URLs from a snapshot
pub fn extract(snapshot: &DocumentSnapshot, config: &ExtractConfig) -> ExtractionResult {
    let body_text = extract_body(snapshot, config);
    let title = extract_title(snapshot, &body_text, config);
    let chapter_links = extract_chapter_links(snapshot, config);

    debug!(
        "Extracted {}: title={:?}, body={} chars, {} chapter links",
        snapshot.url,
        title,
        char_len(&body_text),
        chapter_links.len()
    );

    ExtractionResult {
        title,
        body_text,
        chapter_links,
        next_url: find_link(&snapshot.links, NEXT_KEYWORDS),
        prev_url: find_link(&snapshot.links, PREV_KEYWORDS),
        catalog_url: find_catalog_link(&snapshot.links),
        features: page_features(snapshot),
    }
}

/// Body text by selector list, then density scoring; empty when both fail
pub fn extract_body(snapshot: &DocumentSnapshot, config: &ExtractConfig) -> String {
    if let Some(text) = body_by_selector(snapshot, config) {
        return text;
    }
    body_by_density(snapshot, config).unwrap_or_default()
}

fn body_by_selector(snapshot: &DocumentSnapshot, config: &ExtractConfig) -> Option<String> {
    let candidates = snapshot.containers.iter().filter(|c| !c.is_structural_chrome());

    for ident in BODY_IDENTIFIERS {
        for container in candidates.clone().filter(|c| c.has_identifier(ident)) {
            let text = strip_boilerplate(&container.text);
            if char_len(&text) > config.selector_min_chars {
                debug!("Found body using identifier: {}", ident);
                return Some(text);
            }
        }
    }

    for tag in BODY_TAGS {
        for container in candidates.clone().filter(|c| c.tag == *tag) {
            let text = strip_boilerplate(&container.text);
            if char_len(&text) > config.selector_min_chars {
                debug!("Found body using tag: {}", tag);
                return Some(text);
            }
        }
    }

    None
}

fn body_by_density(snapshot: &DocumentSnapshot, config: &ExtractConfig) -> Option<String> {
    let mut best: Option<(usize, &ContainerSnapshot)> = None;

    for container in &snapshot.containers {
        if container.is_structural_chrome()
            || CHROME_TOKENS.iter().any(|t| container.identifier_contains(t))
        {
            continue;
        }

        let score = paragraph_density(container);
        // Ties go to the later, more deeply nested container
        if score > config.density_floor && best.map_or(true, |(top, _)| score >= top) {
            best = Some((score, container));
        }
    }

    best.map(|(score, container)| {
        debug!(
            "Found body by density: {} #{} .{} ({} chars)",
            container.tag, container.id, container.class, score
        );
        strip_boilerplate(&container.text)
    })
}

/// Total length of a container's paragraph fragments that are not boilerplate
fn paragraph_density(container: &ContainerSnapshot) -> usize {
    container
        .paragraphs
        .iter()
        .filter(|fragment| !is_boilerplate_fragment(fragment))
        .map(|fragment| char_len(fragment))
        .sum()
}

fn is_boilerplate_fragment(fragment: &str) -> bool {
    let lower = fragment.to_lowercase();
    BOILERPLATE_FRAGMENTS.iter().any(|marker| lower.contains(marker))
}

/// Remove recurring navigation and ad phrases.
///
/// Short lines carrying a phrase are dropped whole; longer lines only lose
/// the phrase itself.
pub fn strip_boilerplate(text: &str) -> String {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            if !BOILERPLATE_RE.is_match(line) {
                return Some(line.to_string());
            }
            if char_len(line) <= BOILERPLATE_LINE_CHARS {
                return None;
            }
            let stripped = crate::snapshot::collapse(&BOILERPLATE_RE.replace_all(line, " "));
            (!stripped.is_empty()).then_some(stripped)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Chapter title; falls back to [`UNKNOWN_CHAPTER_TITLE`]
pub fn extract_title(snapshot: &DocumentSnapshot, body_text: &str, config: &ExtractConfig) -> String {
    let headings: Vec<&str> = snapshot
        .headings
        .iter()
        .filter(|h| (1..=3).contains(&h.level))
        .map(|h| h.text.trim())
        .collect();
    if let Some(title) = pick_title(&headings, config.title_max_chars) {
        return title;
    }

    let title_containers: Vec<&str> = TITLE_IDENTIFIERS
        .iter()
        .flat_map(|ident| {
            snapshot
                .containers
                .iter()
                .filter(move |c| c.has_identifier(ident))
                .filter_map(|c| c.text.lines().next())
        })
        .collect();
    if let Some(title) = pick_title(&title_containers, config.title_max_chars) {
        return title;
    }

    if let Some(line) = body_text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .filter(|line| char_len(line) <= config.title_max_chars && contains_ordinal(line))
    {
        return line.to_string();
    }

    strip_site_suffix(&snapshot.title).unwrap_or_else(|| UNKNOWN_CHAPTER_TITLE.to_string())
}

/// Prefer a short candidate with an ordinal, else any very short candidate
fn pick_title(candidates: &[&str], max_chars: usize) -> Option<String> {
    candidates
        .iter()
        .find(|text| !text.is_empty() && char_len(text) <= max_chars && contains_ordinal(text))
        .or_else(|| {
            candidates
                .iter()
                .find(|text| !text.is_empty() && char_len(text) <= SHORT_TITLE_CHARS)
        })
        .map(|text| text.to_string())
}

/// `第一章 风起_某某小说_笔趣阁` becomes `第一章 风起`
fn strip_site_suffix(title: &str) -> Option<String> {
    let head = title.split(['-', '_', '|']).next().unwrap_or(title).trim();
    (!head.is_empty()).then(|| head.to_string())
}

/// Links of the highest-scoring chapter-list container
pub fn extract_chapter_links(snapshot: &DocumentSnapshot, config: &ExtractConfig) -> Vec<ChapterLink> {
    let mut best: Option<(usize, Vec<&LinkSnapshot>)> = None;

    for container in &snapshot.containers {
        if container.links.len() < config.list_min_links {
            continue;
        }

        let valid: Vec<&LinkSnapshot> = container.links.iter().filter(|l| is_valid_link(l)).collect();
        if valid.len() < config.list_min_links {
            continue;
        }

        let chapter_like = valid
            .iter()
            .filter(|l| is_chapter_link(&l.text, &l.href))
            .count();
        let score = if chapter_like * 2 > valid.len() {
            valid.len() + 2 * chapter_like
        } else {
            valid.len()
        };

        // Ties go to the later, more deeply nested container
        if best.as_ref().map_or(true, |(top, _)| score >= *top) {
            best = Some((score, valid));
        }
    }

    let Some((score, links)) = best else {
        return Vec::new();
    };
    debug!("Chapter list container scored {} with {} links", score, links.len());

    let mut seen = HashSet::new();
    links
        .into_iter()
        .map(|l| ChapterLink::new(l.text.trim(), l.href.trim()))
        .filter(|link| seen.insert(link.normalized_url()))
        .collect()
}

/// Non-empty text, a real URL, and not site navigation
fn is_valid_link(link: &LinkSnapshot) -> bool {
    !link.text.trim().is_empty() && !is_pseudo_url(&link.href) && !is_navigation_link(&link.text)
}

fn find_link(links: &[LinkSnapshot], keywords: &[&str]) -> Option<String> {
    links
        .iter()
        .filter(|l| !is_pseudo_url(&l.href))
        .find(|l| {
            let text = l.text.to_lowercase();
            keywords.iter().any(|kw| text.contains(kw))
        })
        .map(|l| l.href.clone())
}

fn find_catalog_link(links: &[LinkSnapshot]) -> Option<String> {
    let candidates: Vec<(String, &LinkSnapshot)> = links
        .iter()
        .filter(|l| !is_pseudo_url(&l.href))
        .map(|l| (l.text.trim().to_lowercase(), l))
        .collect();

    CATALOG_KEYWORDS.iter().find_map(|kw| {
        candidates
            .iter()
            .find(|(text, _)| {
                text == kw
                    || (text.contains(kw) && char_len(text) <= char_len(kw) + CATALOG_KEYWORD_SLACK)
            })
            .map(|(_, l)| l.href.clone())
    })
}

fn page_features(snapshot: &DocumentSnapshot) -> PageFeatures {
    let catalog_container_links = snapshot
        .containers
        .iter()
        .filter(|c| {
            CATALOG_TOKENS.iter().any(|t| c.identifier_contains(t))
                || CATALOG_WORDS.iter().any(|w| c.has_identifier_word(w))
        })
        .map(|c| c.links.len())
        .max()
        .unwrap_or(0);

    let body_lower = snapshot.body_text.to_lowercase();
    let has_intro_text = INTRO_MARKERS.iter().any(|m| body_lower.contains(m))
        || snapshot.containers.iter().any(|c| {
            !c.text.is_empty() && INTRO_TOKENS.iter().any(|t| c.identifier_contains(t))
        });

    let metadata_list_items = snapshot
        .list_items
        .iter()
        .filter(|item| {
            let lower = item.to_lowercase();
            !contains_ordinal(item) && BOOK_METADATA_WORDS.iter().any(|w| lower.contains(w))
        })
        .count();

    PageFeatures {
        document_title: snapshot.title.clone(),
        catalog_container_links,
        has_cover_image: snapshot.images.iter().any(|img| img.looks_like_cover()),
        has_intro_text,
        has_reading_controls: READING_CONTROLS.iter().any(|c| body_lower.contains(c)),
        list_items: snapshot.list_items.len(),
        metadata_list_items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(n: usize) -> String {
        format!("这是第{}段正文，山风吹过竹林，少年握紧了手中的剑，心中默念师父的教诲。", n)
    }

    fn chapter_page() -> String {
        let body: String = (0..12).map(|n| format!("<p>{}</p>", paragraph(n))).collect();
        format!(
            r#"<html><head><title>第十章 归来_剑仙传_某某书屋</title></head><body>
            <div class="header"><a href="/">首页</a><a href="/top/">排行榜</a></div>
            <div class="bookname"><h1>第十章 归来</h1>
              <a href="9.html">上一章</a><a href="index.html">章节目录</a><a href="11.html">下一章</a>
            </div>
            <div id="wrapper"><div id="content">{body}<p>天才一秒记住本站地址</p></div></div>
            </body></html>"#
        )
    }

    fn catalog_page(count: usize) -> String {
        let items: String = (1..=count)
            .map(|n| format!(r#"<li><a href="/book/42/{n}.html">第{n}章 风云</a></li>"#))
            .collect();
        format!(
            r#"<html><head><title>剑仙传最新章节列表</title></head><body>
            <ul class="nav"><li><a href="/">首页</a></li><li><a href="/sort/1/">玄幻小说</a></li></ul>
            <div id="list"><ul class="chapter-list">{items}</ul></div>
            </body></html>"#
        )
    }

    fn snapshot(html: &str) -> DocumentSnapshot {
        DocumentSnapshot::from_html(html, "https://example.com/book/42/10.html")
    }

    #[test]
    fn test_selector_body_wins_and_is_stripped() {
        let snap = snapshot(&chapter_page());
        let result = extract(&snap, &ExtractConfig::default());
        assert!(result.body_text.starts_with(&paragraph(0)));
        assert!(!result.body_text.contains("天才一秒记住"));
        assert_eq!(result.body_text.lines().count(), 12);
    }

    #[test]
    fn test_selector_body_equals_stripped_container_text() {
        let snap = snapshot(&chapter_page());
        let content = snap.containers.iter().find(|c| c.id == "content").unwrap();
        assert_eq!(
            extract_body(&snap, &ExtractConfig::default()),
            strip_boilerplate(&content.text)
        );
    }

    #[test]
    fn test_density_fallback() {
        let body: String = (0..20).map(|n| format!("<p>{}</p>", paragraph(n))).collect();
        let html = format!(
            r#"<html><body><div class="menu"><p>{}</p></div>
            <div class="story-body">{body}<p>下一章</p></div></body></html>"#,
            paragraph(99).repeat(20)
        );
        let snap = snapshot(&html);
        let body_text = extract_body(&snap, &ExtractConfig::default());
        assert!(body_text.starts_with(&paragraph(0)));
        assert!(!body_text.contains("下一章"));
        assert!(!body_text.contains(&paragraph(99)));
    }

    #[test]
    fn test_short_page_has_empty_body() {
        let snap = snapshot("<html><body><div><p>太短了。</p></div></body></html>");
        assert_eq!(extract_body(&snap, &ExtractConfig::default()), "");
    }

    #[test]
    fn test_title_from_heading() {
        let snap = snapshot(&chapter_page());
        let result = extract(&snap, &ExtractConfig::default());
        assert_eq!(result.title, "第十章 归来");
    }

    #[test]
    fn test_title_from_title_container() {
        let html = r#"<html><body><h1>剑仙传全文免费阅读网站欢迎各位书友光临本站阅读最新章节与精彩内容，更新速度全网最快</h1>
            <span id="chaptername" class="title">第三章 夜雨</span></body></html>"#;
        let snap = snapshot(html);
        assert_eq!(extract_title(&snap, "", &ExtractConfig::default()), "第三章 夜雨");
    }

    #[test]
    fn test_title_from_body_then_document_title() {
        let snap = DocumentSnapshot {
            title: "夜雨 - 剑仙传 | 某某书屋".to_string(),
            ..Default::default()
        };
        let config = ExtractConfig::default();
        assert_eq!(extract_title(&snap, "第三章 夜雨\n正文开始", &config), "第三章 夜雨");
        assert_eq!(extract_title(&snap, "正文开始", &config), "夜雨");
    }

    #[test]
    fn test_title_placeholder() {
        let snap = DocumentSnapshot::default();
        assert_eq!(
            extract_title(&snap, "", &ExtractConfig::default()),
            UNKNOWN_CHAPTER_TITLE
        );
    }

    #[test]
    fn test_chapter_links_from_catalog() {
        let snap = snapshot(&catalog_page(20));
        let links = extract_chapter_links(&snap, &ExtractConfig::default());
        assert_eq!(links.len(), 20);
        assert_eq!(links[0].title, "第1章 风云");
        assert_eq!(links[0].url, "https://example.com/book/42/1.html");
        assert_eq!(links[19].url, "https://example.com/book/42/20.html");
    }

    #[test]
    fn test_too_few_links_is_empty() {
        let snap = snapshot(&catalog_page(9));
        assert!(extract_chapter_links(&snap, &ExtractConfig::default()).is_empty());
    }

    #[test]
    fn test_navigation_links_are_excluded_even_if_chapter_like() {
        let mut items: String = (1..=10)
            .map(|n| format!(r#"<li><a href="/book/42/{n}.html">第{n}章</a></li>"#))
            .collect();
        items.push_str(r#"<li><a href="/book/42/99.html">最新章节 第99章</a></li>"#);
        items.push_str(r#"<li><a href="/vip/chapter-100">VIP Chapter 100</a></li>"#);
        let snap = snapshot(&format!("<html><body><ul>{items}</ul></body></html>"));

        let links = extract_chapter_links(&snap, &ExtractConfig::default());
        assert_eq!(links.len(), 10);
        assert!(links.iter().all(|l| !is_navigation_link(&l.title)));
    }

    #[test]
    fn test_duplicate_links_are_collapsed() {
        let items: String = (1..=12)
            .map(|n| {
                let n = (n + 1) / 2;
                format!(r#"<li><a href="/book/42/{n}.html#c">第{n}章</a></li>"#)
            })
            .collect();
        let snap = snapshot(&format!("<html><body><ul>{items}</ul></body></html>"));
        // Twelve links are enough for the container; six distinct chapters survive
        assert_eq!(extract_chapter_links(&snap, &ExtractConfig::default()).len(), 6);
    }

    #[test]
    fn test_navigation_urls() {
        let snap = snapshot(&chapter_page());
        let result = extract(&snap, &ExtractConfig::default());
        assert_eq!(result.prev_url.as_deref(), Some("https://example.com/book/42/9.html"));
        assert_eq!(result.next_url.as_deref(), Some("https://example.com/book/42/11.html"));
        assert_eq!(
            result.catalog_url.as_deref(),
            Some("https://example.com/book/42/index.html")
        );
    }

    #[test]
    fn test_catalog_keyword_priority_and_tightness() {
        let links = vec![
            LinkSnapshot {
                text: "Back to the site index page".to_string(),
                href: "https://e.com/".to_string(),
            },
            LinkSnapshot {
                text: "Index".to_string(),
                href: "https://e.com/book/index.html".to_string(),
            },
            LinkSnapshot {
                text: "All Chapters".to_string(),
                href: "https://e.com/book/all.html".to_string(),
            },
        ];
        assert_eq!(
            find_catalog_link(&links).as_deref(),
            Some("https://e.com/book/all.html")
        );
        assert_eq!(
            find_catalog_link(&links[..2]).as_deref(),
            Some("https://e.com/book/index.html")
        );
    }

    #[test]
    fn test_strip_boilerplate() {
        let text = "上一章 返回目录 下一章\n他推开门，外面是无边的夜色。\n\n请记住：天才一秒记住本站地址\nThis is a long line that mentions the next chapter in passing, and keeps going on.";
        assert_eq!(
            strip_boilerplate(text),
            "他推开门，外面是无边的夜色。\nThis is a long line that mentions the in passing, and keeps going on."
        );
    }

    #[test]
    fn test_page_features() {
        let html = r#"<html><head><title>剑仙传</title></head><body>
            <img class="cover" src="/c.jpg"><div class="intro">一个少年的修仙故事。</div>
            <ul><li>剑仙传 作者：某某</li><li>凡人歌 连载中</li><li>第一章 风起</li></ul>
            </body></html>"#;
        let features = page_features(&snapshot(html));
        assert!(features.has_cover_image);
        assert!(features.has_intro_text);
        assert!(!features.has_reading_controls);
        assert_eq!(features.list_items, 3);
        assert_eq!(features.metadata_list_items, 2);
    }

    #[test]
    fn test_toc_matches_whole_identifier_words() {
        let links: String = (1..=6)
            .map(|n| format!(r#"<a href="/p/{n}.html">item {n}</a>"#))
            .collect();
        let page = |class: &str| {
            format!(r#"<html><body><div class="{class}">{links}</div></body></html>"#)
        };

        assert_eq!(page_features(&snapshot(&page("stock"))).catalog_container_links, 0);
        assert_eq!(page_features(&snapshot(&page("photocard"))).catalog_container_links, 0);
        assert_eq!(page_features(&snapshot(&page("book-toc"))).catalog_container_links, 6);
        assert_eq!(page_features(&snapshot(&page("toc_list"))).catalog_container_links, 6);
        assert_eq!(page_features(&snapshot(&page("toc"))).catalog_container_links, 6);
    }
}
