//! # Text Cleaner
//! Pure helpers that turn scraped, numeric-looking strings and headline text
//! into something the rest of the pipeline can sort and compare.
//!
//! `clean_numeric` is total: it never fails and never returns NaN/∞, so
//! downstream arithmetic does not need null checks.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Currency marks and separators removed before parsing.
const STRIP_CHARS: [char; 8] = ['₹', '$', '€', '£', '¥', ',', '%', '\u{00A0}'];

/// Textual currency prefixes some Indian sources use instead of `₹`.
const STRIP_PREFIXES: [&str; 3] = ["rs.", "rs", "inr"];

/// Parse a numeric-looking string, defaulting to `0.0` on any failure.
///
/// Footnotes in parentheses are dropped (`"₹15 (subject to change)"` → 15.0).
pub fn clean_numeric(raw: &str) -> f64 {
    let head = match raw.find('(') {
        Some(i) => &raw[..i],
        None => raw,
    };

    let mut s: String = head.chars().filter(|c| !STRIP_CHARS.contains(c)).collect();
    s = s.trim().to_string();

    let lower = s.to_ascii_lowercase();
    for p in STRIP_PREFIXES {
        if lower.starts_with(p) {
            s = s[p.len()..].trim().to_string();
            break;
        }
    }

    // Inner whitespace ("1 234") counts as a separator too.
    s.retain(|c| !c.is_whitespace());

    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Normalize scraped text: decode entities, strip tags, fold quotes, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Strip corporate suffixes so a company name works as a search query.
pub fn clean_topic(raw: &str) -> String {
    const SUFFIXES: [&str; 5] = ["ltd", "ltd.", "limited", "pvt", "pvt."];
    clean_text(raw)
        .split_whitespace()
        .filter(|w| !SUFFIXES.contains(&w.to_ascii_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}
