// src/normalize.rs
//! Text canonicalization shared by the article sources and the vectorizers.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Upper bound for stripped article text kept in memory.
pub const MAX_BODY_CHARS: usize = 5_000;

fn re_non_word() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").expect("non-word regex"))
}

fn re_ws() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

fn re_tags() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"))
}

/// Clustering input: lower-case, drop everything that is not a word char or
/// whitespace, collapse whitespace runs, trim.
pub fn clean_text(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped = re_non_word().replace_all(&lowered, "");
    re_ws().replace_all(&stripped, " ").trim().to_string()
}

/// Feed text cleanup: decode entities, strip tags, fold typographic quotes,
/// collapse whitespace. Paragraph breaks (`<p>`, `<br>`, blank lines) survive
/// as `\n\n` so [`paragraphs`] can still split the result.
pub fn strip_markup(raw: &str) -> String {
    // Entities first: escaped markup must be stripped like literal markup.
    let decoded = html_escape::decode_html_entities(raw);

    // Block-level tags become paragraph breaks before all tags are dropped.
    static RE_BLOCK: OnceCell<Regex> = OnceCell::new();
    let re_block = RE_BLOCK
        .get_or_init(|| Regex::new(r"(?i)<\s*(br|/p|/div|/li)\s*/?\s*>").expect("block regex"));
    let with_breaks = re_block.replace_all(&decoded, "\n\n");
    let mut out = re_tags().replace_all(&with_breaks, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");

    let paras: Vec<String> = paragraphs(&out)
        .into_iter()
        .map(|p| re_ws().replace_all(p, " ").trim().to_string())
        .collect();
    let mut joined = paras.join("\n\n");

    if joined.chars().count() > MAX_BODY_CHARS {
        joined = joined.chars().take(MAX_BODY_CHARS).collect();
    }
    joined
}

/// Non-empty paragraphs of a body, split on blank lines (or single line
/// breaks when the text has no blank lines).
pub fn paragraphs(body: &str) -> Vec<&str> {
    static RE_BLANK: OnceCell<Regex> = OnceCell::new();
    let re_blank = RE_BLANK.get_or_init(|| Regex::new(r"\n\s*\n").expect("blank-line regex"));

    let parts: Vec<&str> = if re_blank.is_match(body) {
        re_blank.split(body).collect()
    } else {
        body.lines().collect()
    };
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Truncate to at most `max_chars` characters without splitting a char.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
