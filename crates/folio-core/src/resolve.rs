//! Chapter index resolution: where a URL sits in a chapter list

use crate::catalog::ChapterList;
use crate::links::{ordinal_numbers, url_path};
use crate::normalize_url;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// `<digits>` right before `.html`, `.htm`, or the end of the path
static TRAILING_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([0-9]+)(?:\.s?html?)?/?$").expect("trailing number pattern is valid")
});

/// Find the position of `url` in the chapter list.
///
/// Tries exact and suffix matches, then a trailing chapter number, then
/// the last path segment. `None` means the caller should navigate to the URL
/// without list context.
pub fn resolve(url: &str, list: &ChapterList) -> Option<usize> {
    if url.trim().is_empty() || list.is_empty() {
        return None;
    }

    let found = match_by_url(url, list)
        .or_else(|| match_by_number(url, list))
        .or_else(|| match_by_segment(url, list));
    debug!("Resolved {} to chapter index {:?}", url, found);
    found
}

fn match_by_url(url: &str, list: &ChapterList) -> Option<usize> {
    let target = normalize_url(url);
    let urls: Vec<String> = list.entries.iter().map(|e| normalize_url(&e.url)).collect();

    if let Some(found) = find_exact_or_suffix(&target, &urls) {
        return Some(found);
    }

    // Cache-busting queries (`10.html?v=2`) on list entries
    if !target.contains('?') {
        let bare: Vec<String> = urls.iter().map(|u| strip_query(u).to_string()).collect();
        return find_exact_or_suffix(&target, &bare);
    }
    None
}

fn find_exact_or_suffix(target: &str, urls: &[String]) -> Option<usize> {
    urls.iter()
        .position(|u| u == target)
        .or_else(|| urls.iter().position(|u| is_path_suffix(u, target) || is_path_suffix(target, u)))
}

/// Whether `short` ends `long` at a path boundary (`/42/10.html` ends
/// `https://e.com/book/42/10.html`, but `0.html` does not end `10.html`)
fn is_path_suffix(long: &str, short: &str) -> bool {
    if short.is_empty() || !long.ends_with(short) {
        return false;
    }
    let prefix = &long[..long.len() - short.len()];
    prefix.is_empty() || prefix.ends_with('/') || short.starts_with('/')
}

fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Trailing numeric token of the URL path
fn trailing_number(url: &str) -> Option<&str> {
    TRAILING_NUMBER_RE
        .captures(url_path(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn match_by_number(url: &str, list: &ChapterList) -> Option<usize> {
    let number = trailing_number(url)?;
    let value: Option<u64> = number.parse().ok();

    list.entries
        .iter()
        .position(|e| trailing_number(&e.url) == Some(number))
        .or_else(|| {
            let value = value?;
            list.entries
                .iter()
                .position(|e| ordinal_numbers(&e.title).contains(&value))
        })
        .or_else(|| list.entries.iter().position(|e| url_path(&e.url).contains(number)))
}

fn last_segment(url: &str) -> Option<String> {
    url_path(url)
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_lowercase)
}

fn match_by_segment(url: &str, list: &ChapterList) -> Option<usize> {
    let target = last_segment(url)?;
    list.entries.iter().position(|e| {
        last_segment(&e.url)
            .map(|segment| segment.contains(&target) || target.contains(&segment))
            .unwrap_or(false)
    })
}
