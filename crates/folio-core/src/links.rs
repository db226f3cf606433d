//! Link classification and the chapter text patterns shared by the extractor,
//! classifier, and resolver

use regex::Regex;
use std::sync::LazyLock;

const NUMERAL_CLASS: &str = "0-9０-９零〇一二两三四五六七八九十百千万";

/// `第十二章`, `第3节`, `Chapter 12`, `Ch. 12`
static ORDINAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)第\s*([{NUMERAL_CLASS}]+)\s*[章节回卷集部篇话]|\bchapter\s*([0-9]+)|\bch\.\s*([0-9]+)"
    ))
    .expect("ordinal pattern is valid")
});

/// Unnumbered chapter markers
static SPECIAL_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)序章|楔子|引子|番外|尾声|后记|终章|\b(?:prologue|epilogue|interlude)\b")
        .expect("marker pattern is valid")
});

/// `12.` or `12、` at the start of a line
static ENUMERATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[0-9]+\s*[.、]").expect("enumerator pattern is valid"));

/// Numeric file names such as `1024.html`, `15_2.htm`, or a bare `/1024`
static NUMERIC_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9]+(?:_[0-9]+)?(?:\.s?html?|\.php|\.aspx?)?$")
        .expect("numeric file pattern is valid")
});

/// Site chrome vocabulary matched as whole words
const NAVIGATION_WORDS: &[&str] = &[
    "home", "homepage", "category", "categories", "search", "login", "log in", "sign in",
    "register", "sign up", "about", "contact", "help", "settings", "setting", "profile",
    "ranking", "rankings", "rank", "hot", "newest", "latest", "completed", "serialized",
    "ongoing", "free", "vip", "bookshelf", "library",
];

/// Site chrome vocabulary matched as substrings (no word boundaries in CJK)
const NAVIGATION_CJK: &[&str] = &[
    "首页", "主页", "分类", "搜索", "登录", "登陆", "注册", "关于", "联系", "帮助", "设置",
    "个人中心", "用户中心", "排行", "热门", "最新", "完本", "全本", "已完结", "连载", "免费",
    "书架", "书库", "会员",
];

/// Decide whether a link looks like it points at a chapter.
///
/// The link text is checked first, the URL path second; either suffices.
pub fn is_chapter_link(text: &str, url: &str) -> bool {
    let text = text.trim();
    let url = url.trim();
    if text.is_empty() || url.is_empty() {
        return false;
    }

    if contains_ordinal(text) || ENUMERATOR_RE.is_match(text) || SPECIAL_MARKER_RE.is_match(text)
    {
        return true;
    }

    is_chapter_url(url)
}

/// Decide whether a link text looks like site navigation rather than content
pub fn is_navigation_link(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return false;
    }

    if NAVIGATION_CJK.iter().any(|word| lower.contains(word)) {
        return true;
    }

    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    NAVIGATION_WORDS.iter().any(|vocab| {
        let parts: Vec<&str> = vocab.split(' ').collect();
        words.windows(parts.len()).any(|window| window == parts.as_slice())
    })
}

/// Links that can never lead to a chapter: fragments and script pseudo-URLs
pub fn is_pseudo_url(url: &str) -> bool {
    let url = url.trim().to_lowercase();
    url.is_empty()
        || url.starts_with('#')
        || url.starts_with("javascript:")
        || url.starts_with("mailto:")
        || url.starts_with("tel:")
}

/// Whether a URL path carries a chapter-like token
pub fn is_chapter_url(url: &str) -> bool {
    let path = url_path(url).to_lowercase();
    if path.contains("chapter") || path.contains("chap") {
        return true;
    }
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(|last| NUMERIC_FILE_RE.is_match(last))
        .unwrap_or(false)
}

/// The path part of an absolute or relative URL, without query or fragment
pub(crate) fn url_path(url: &str) -> &str {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            rest.find('/').map(|slash| &rest[slash..]).unwrap_or("/")
        }
        None => url,
    }
}

/// Whether the text contains an ordinal chapter phrase
pub fn contains_ordinal(text: &str) -> bool {
    ORDINAL_RE.is_match(text)
}

/// Count chapter markers in a block of text: ordinals, unnumbered markers,
/// and enumerated lines
pub fn count_chapter_markers(text: &str) -> usize {
    ORDINAL_RE.find_iter(text).count()
        + SPECIAL_MARKER_RE.find_iter(text).count()
        + ENUMERATOR_RE.find_iter(text).count()
}

/// Numbers named by ordinal phrases in the text (`第十二章` and `Chapter 12` both give 12)
pub fn ordinal_numbers(text: &str) -> Vec<u64> {
    ORDINAL_RE
        .captures_iter(text)
        .filter_map(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .next()
                .and_then(|m| parse_numeral(m.as_str()))
        })
        .collect()
}

/// Parse Arabic (including full-width) or Chinese numerals
pub fn parse_numeral(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.chars().all(|c| c.is_ascii_digit() || ('０'..='９').contains(&c)) {
        let ascii: String = text
            .chars()
            .map(|c| match c {
                '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
                _ => c,
            })
            .collect();
        return ascii.parse().ok();
    }

    let mut total = 0u64;
    let mut section = 0u64;
    let mut digit = 0u64;
    for c in text.chars() {
        match c {
            '零' | '〇' => digit = 0,
            '一' => digit = 1,
            '二' | '两' => digit = 2,
            '三' => digit = 3,
            '四' => digit = 4,
            '五' => digit = 5,
            '六' => digit = 6,
            '七' => digit = 7,
            '八' => digit = 8,
            '九' => digit = 9,
            '十' | '百' | '千' => {
                let unit = match c {
                    '十' => 10,
                    '百' => 100,
                    _ => 1000,
                };
                section += digit.max(1) * unit;
                digit = 0;
            }
            '万' => {
                total += (section + digit).max(1) * 10_000;
                section = 0;
                digit = 0;
            }
            _ => return None,
        }
    }
    Some(total + section + digit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chapter_link_by_text() {
        assert!(is_chapter_link("第十二章 风起", "/book/1/abc.html"));
        assert!(is_chapter_link("第3节", "/x"));
        assert!(is_chapter_link("12. The Return", "/x"));
        assert!(is_chapter_link("12、归来", "/x"));
        assert!(is_chapter_link("Chapter 7: Storm", "/x"));
        assert!(is_chapter_link("楔子", "/x"));
    }

    #[test]
    fn test_chapter_link_by_url() {
        assert!(is_chapter_link("风起", "https://example.com/book/42/1024.html"));
        assert!(is_chapter_link("Storm", "https://example.com/novel/chapter-7"));
        assert!(is_chapter_link("Storm", "/chap/7?from=list"));
        assert!(!is_chapter_link("Storm", "https://example.com/novel/storm.html"));
    }

    #[test]
    fn test_empty_inputs_are_false() {
        assert!(!is_chapter_link("", "https://example.com/1.html"));
        assert!(!is_chapter_link("第一章", ""));
        assert!(!is_navigation_link(""));
        assert!(!is_navigation_link("   "));
    }

    #[test]
    fn test_navigation_vocabulary() {
        assert!(is_navigation_link("Home"));
        assert!(is_navigation_link("VIP Chapters"));
        assert!(is_navigation_link("Log in"));
        assert!(is_navigation_link("首页"));
        assert!(is_navigation_link("玄幻分类"));
        assert!(is_navigation_link("排行榜"));
        assert!(!is_navigation_link("第一章 初入江湖"));
        assert!(!is_navigation_link("Chapter 3: Hotel California"));
    }

    #[test]
    fn test_pseudo_urls() {
        assert!(is_pseudo_url("#top"));
        assert!(is_pseudo_url("javascript:void(0)"));
        assert!(is_pseudo_url("JavaScript:addBookmark()"));
        assert!(!is_pseudo_url("/book/1.html"));
    }

    #[test]
    fn test_url_path() {
        assert_eq!(url_path("https://example.com/a/b.html?x=1"), "/a/b.html");
        assert_eq!(url_path("https://example.com"), "/");
        assert_eq!(url_path("/a/b#c"), "/a/b");
    }

    #[test]
    fn test_count_chapter_markers() {
        let text = "第一章 开始\n正文内容\n第二章 继续\n1. 列表项\n尾声";
        assert_eq!(count_chapter_markers(text), 4);
        assert_eq!(count_chapter_markers("no markers here"), 0);
    }

    #[test]
    fn test_parse_numeral() {
        assert_eq!(parse_numeral("12"), Some(12));
        assert_eq!(parse_numeral("１２"), Some(12));
        assert_eq!(parse_numeral("十"), Some(10));
        assert_eq!(parse_numeral("十一"), Some(11));
        assert_eq!(parse_numeral("二十"), Some(20));
        assert_eq!(parse_numeral("一百零五"), Some(105));
        assert_eq!(parse_numeral("两千三百"), Some(2300));
        assert_eq!(parse_numeral("一万零一"), Some(10001));
        assert_eq!(parse_numeral("abc"), None);
    }

    #[test]
    fn test_ordinal_numbers() {
        assert_eq!(ordinal_numbers("第十章 风起"), vec![10]);
        assert_eq!(ordinal_numbers("Chapter 10 - The Storm"), vec![10]);
        assert!(ordinal_numbers("Prologue").is_empty());
    }
}
