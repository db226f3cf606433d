//! Document snapshots: the structured result of the snapshot query program
//!
//! A snapshot is what a document host returns for [`SNAPSHOT_SCRIPT`]. Chrome
//! evaluates the script against its live rendering; for static HTML the same
//! shape is built with `scraper` by [`DocumentSnapshot::from_html`]. Everything
//! downstream (extraction, classification) works on the snapshot alone.

use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

/// JavaScript query program returning a [`DocumentSnapshot`] as JSON
pub const SNAPSHOT_SCRIPT: &str = include_str!("snapshot.js");

/// Tags enumerated as containers even without an id
const CONTAINER_TAGS: &[&str] = &[
    "div", "section", "article", "main", "td", "ul", "ol", "dl", "dd", "table", "tbody",
];

/// Structural chrome; containers inside these never hold the article body
const CHROME_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript", "template",
];

/// Never visible
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Tags that break lines in visible text
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul",
    "ol", "dl", "dt", "dd", "tr", "table", "tbody", "blockquote", "pre", "header", "footer",
    "nav", "aside",
];

/// Structured view of a rendered document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentSnapshot {
    /// The document URL after redirects
    pub url: String,
    /// The declared document title
    pub title: String,
    /// Visible text of the whole body, one block per line
    pub body_text: String,
    /// Heading elements, levels 1-3
    pub headings: Vec<HeadingSnapshot>,
    /// Block containers and identified elements, in document order
    pub containers: Vec<ContainerSnapshot>,
    /// Every link in document order
    pub links: Vec<LinkSnapshot>,
    /// Text of every list item
    pub list_items: Vec<String>,
    /// Every image
    pub images: Vec<ImageSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingSnapshot {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerSnapshot {
    /// Lowercase tag name
    pub tag: String,
    pub id: String,
    pub class: String,
    /// Visible text, one block per line
    pub text: String,
    /// Paragraph-like fragments: descendant `<p>` text and the container's own text runs
    pub paragraphs: Vec<String>,
    /// Descendant links
    pub links: Vec<LinkSnapshot>,
    /// Whether the container sits inside structural chrome
    pub in_chrome: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSnapshot {
    pub text: String,
    /// Absolute URL, or the raw attribute for fragments and script links
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSnapshot {
    pub src: String,
    pub alt: String,
    pub class: String,
    pub id: String,
}

impl ContainerSnapshot {
    /// Lowercased id and class tokens
    pub fn identifiers(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.id.as_str())
            .chain(self.class.split_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    /// Whether the id or one of the classes equals `name`
    pub fn has_identifier(&self, name: &str) -> bool {
        self.identifiers().any(|ident| ident == name)
    }

    /// Whether the id or one of the classes contains `token`
    pub fn identifier_contains(&self, token: &str) -> bool {
        self.identifiers().any(|ident| ident.contains(token))
    }

    /// Whether an identifier has `word` between `-`/`_` separators
    /// (`toc`, `book-toc`, `toc_list`; not `stock`)
    pub fn has_identifier_word(&self, word: &str) -> bool {
        self.identifiers()
            .any(|ident| ident.split(['-', '_']).any(|part| part == word))
    }

    /// Whether the container is structural chrome by tag or by ancestry
    pub fn is_structural_chrome(&self) -> bool {
        self.in_chrome || CHROME_TAGS.contains(&self.tag.as_str())
    }
}

impl ImageSnapshot {
    /// Book covers are conventionally marked in the source, class, id, or alt text
    pub fn looks_like_cover(&self) -> bool {
        [&self.src, &self.class, &self.id, &self.alt].iter().any(|field| {
            let field = field.to_lowercase();
            field.contains("cover") || field.contains("bookimg") || field.contains("封面")
        })
    }
}

impl DocumentSnapshot {
    /// Evaluate the snapshot query over static HTML
    pub fn from_html(html: &str, url: &str) -> Self {
        let document = Html::parse_document(html);
        let base = Url::parse(url).ok();

        let title = Selector::parse("title")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .map(|el| collapse(&el.text().collect::<String>()))
            .unwrap_or_default();

        let body_text = Selector::parse("body")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .map(block_text)
            .unwrap_or_default();

        let headings = select_all(&document, "h1, h2, h3")
            .map(|el| HeadingSnapshot {
                level: el.value().name()[1..].parse().unwrap_or(1),
                text: collapse(&el.text().collect::<String>()),
            })
            .collect();

        let links = select_all(&document, "a[href]")
            .map(|a| link_snapshot(a, base.as_ref()))
            .collect();

        let list_items = select_all(&document, "li")
            .map(|li| collapse(&li.text().collect::<String>()))
            .filter(|text| !text.is_empty())
            .collect();

        let images = select_all(&document, "img")
            .map(|img| {
                let attr = |name: &str| img.value().attr(name).unwrap_or_default().to_string();
                ImageSnapshot {
                    src: attr("src"),
                    alt: attr("alt"),
                    class: attr("class"),
                    id: attr("id"),
                }
            })
            .collect();

        let link_selector = Selector::parse("a[href]").ok();
        let containers = select_all(&document, "body *")
            .filter_map(|el| container_snapshot(el, link_selector.as_ref(), base.as_ref()))
            .collect();

        Self {
            url: url.to_string(),
            title,
            body_text,
            headings,
            containers,
            links,
            list_items,
            images,
        }
    }
}

fn select_all<'a>(document: &'a Html, selector: &str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    let selector = Selector::parse(selector).ok();
    selector
        .map(|sel| document.select(&sel).collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter()
}

fn container_snapshot(
    element: ElementRef,
    link_selector: Option<&Selector>,
    base: Option<&Url>,
) -> Option<ContainerSnapshot> {
    let tag = element.value().name();
    let id = element.value().attr("id").unwrap_or_default();
    if SKIPPED_TAGS.contains(&tag) || !(CONTAINER_TAGS.contains(&tag) || !id.is_empty()) {
        return None;
    }

    let links: Vec<LinkSnapshot> = link_selector
        .map(|sel| element.select(sel).map(|a| link_snapshot(a, base)).collect())
        .unwrap_or_default();
    let text = block_text(element);
    if text.is_empty() && links.is_empty() {
        return None;
    }

    Some(ContainerSnapshot {
        tag: tag.to_string(),
        id: id.to_string(),
        class: element.value().attr("class").unwrap_or_default().to_string(),
        text,
        paragraphs: paragraphs(element),
        links,
        in_chrome: in_chrome(element),
    })
}

fn link_snapshot(anchor: ElementRef, base: Option<&Url>) -> LinkSnapshot {
    let raw = anchor.value().attr("href").unwrap_or_default().trim();
    let href = if raw.is_empty() || raw.starts_with('#') || raw.to_lowercase().starts_with("javascript:")
    {
        raw.to_string()
    } else {
        base.and_then(|b| b.join(raw).ok())
            .map(|u| u.to_string())
            .unwrap_or_else(|| raw.to_string())
    };

    LinkSnapshot {
        text: collapse(&anchor.text().collect::<String>()),
        href,
    }
}

/// Descendant `<p>` text plus the element's own text runs
fn paragraphs(element: ElementRef) -> Vec<String> {
    let mut out: Vec<String> = Selector::parse("p")
        .ok()
        .map(|sel| {
            element
                .select(&sel)
                .filter(|p| !in_chrome(*p))
                .map(|p| collapse(&p.text().collect::<String>()))
                .filter(|text| !text.is_empty())
                .collect()
        })
        .unwrap_or_default();

    for child in element.children() {
        if let Node::Text(text) = child.value() {
            let content = collapse(text.text.as_ref());
            if !content.is_empty() {
                out.push(content);
            }
        }
    }
    out
}

fn in_chrome(element: ElementRef) -> bool {
    std::iter::once(*element)
        .chain(element.ancestors())
        .filter_map(|node| node.value().as_element())
        .any(|el| CHROME_TAGS.contains(&el.name()))
}

/// Visible text with block elements and `<br>` on their own lines
fn block_text(element: ElementRef) -> String {
    let mut raw = String::new();
    push_block_text(element, &mut raw);
    raw.lines()
        .map(collapse)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_block_text(element: ElementRef, output: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let content: &str = text.text.as_ref();
                output.push_str(&content.replace(['\n', '\r', '\t'], " "));
            }
            Node::Element(_) => {
                if let Some(elem) = ElementRef::wrap(child) {
                    let tag = elem.value().name();
                    if SKIPPED_TAGS.contains(&tag) {
                        continue;
                    }
                    if tag == "br" {
                        output.push('\n');
                        continue;
                    }
                    let block = BLOCK_TAGS.contains(&tag);
                    if block {
                        output.push('\n');
                    }
                    push_block_text(elem, output);
                    if block {
                        output.push('\n');
                    }
                }
            }
            _ => {}
        }
    }
}

/// Collapse whitespace runs (including full-width and non-breaking spaces)
pub(crate) fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>第一章 风起_某某小说_笔趣阁</title></head>
<body>
  <nav id="topnav"><a href="/">首页</a><a href="/sort/">分类</a></nav>
  <h1>第一章 风起</h1>
  <div id="content" class="read-content box">
    &nbsp;&nbsp;天色将晚。<br/><br/>&nbsp;&nbsp;山门外起了风。
    <p>他推开门。</p>
  </div>
  <ul class="list"><li><a href="2.html">第二章</a></li><li><a href="javascript:void(0)">收藏</a></li></ul>
  <img class="book-cover" src="/img/cover.jpg" alt="封面">
  <script>var x = "hidden";</script>
</body></html>"#;

    #[test]
    fn test_from_html_basics() {
        let snap = DocumentSnapshot::from_html(PAGE, "https://example.com/book/42/1.html");
        assert_eq!(snap.title, "第一章 风起_某某小说_笔趣阁");
        assert_eq!(snap.headings.len(), 1);
        assert_eq!(snap.headings[0].level, 1);
        assert_eq!(snap.headings[0].text, "第一章 风起");
        assert!(!snap.body_text.contains("hidden"));
        assert_eq!(snap.list_items, vec!["第二章", "收藏"]);
        assert!(snap.images[0].looks_like_cover());
    }

    #[test]
    fn test_links_are_resolved_except_pseudo_urls() {
        let snap = DocumentSnapshot::from_html(PAGE, "https://example.com/book/42/1.html");
        let hrefs: Vec<&str> = snap.links.iter().map(|l| l.href.as_str()).collect();
        assert_eq!(
            hrefs,
            vec![
                "https://example.com/",
                "https://example.com/sort/",
                "https://example.com/book/42/2.html",
                "javascript:void(0)",
            ]
        );
    }

    #[test]
    fn test_container_text_and_paragraphs() {
        let snap = DocumentSnapshot::from_html(PAGE, "https://example.com/book/42/1.html");
        let content = snap
            .containers
            .iter()
            .find(|c| c.id == "content")
            .expect("content container");
        assert_eq!(content.text, "天色将晚。\n山门外起了风。\n他推开门。");
        assert_eq!(content.paragraphs, vec!["他推开门。", "天色将晚。", "山门外起了风。"]);
        assert!(content.has_identifier("read-content"));
        assert!(content.identifier_contains("box"));
        assert!(!content.is_structural_chrome());

        let nav = snap.containers.iter().find(|c| c.id == "topnav").expect("nav");
        assert!(nav.is_structural_chrome());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let json = r#"{"url":"https://e.com/1.html","title":"T","bodyText":"x",
            "containers":[{"tag":"div","id":"content","class":"","text":"x","paragraphs":["x"],
            "links":[],"inChrome":false}],"listItems":["a"]}"#;
        let snap: DocumentSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.body_text, "x");
        assert_eq!(snap.containers[0].id, "content");
        assert_eq!(snap.list_items, vec!["a"]);
        assert!(snap.links.is_empty());
    }
}
