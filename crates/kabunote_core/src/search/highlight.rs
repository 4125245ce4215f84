//! Snippet highlighting for search results.
//!
//! # Invariants
//! - Output is HTML-escaped before `<mark>` tags are inserted, so user text
//!   can never inject markup.
//! - Matching is case-insensitive on Unicode lower-case forms.

/// Escapes `& < > " '` for safe inclusion in HTML.
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Wraps every case-insensitive occurrence of any term in `<mark>`.
pub fn highlight(text: &str, terms: &[String]) -> String {
    let chars: Vec<char> = text.chars().collect();
    let lowered: Vec<char> = chars.iter().map(|c| lower_char(*c)).collect();
    let needles: Vec<Vec<char>> = terms
        .iter()
        .map(|term| term.chars().map(lower_char).collect::<Vec<char>>())
        .filter(|needle| !needle.is_empty())
        .collect();

    let mut output = String::with_capacity(text.len() + 16);
    let mut plain = String::new();
    let mut index = 0;
    while index < chars.len() {
        let matched = needles
            .iter()
            .filter(|needle| lowered[index..].starts_with(needle))
            .map(Vec::len)
            .max();
        match matched {
            Some(len) => {
                output.push_str(&escape_html(&plain));
                plain.clear();
                let hit: String = chars[index..index + len].iter().collect();
                output.push_str("<mark>");
                output.push_str(&escape_html(&hit));
                output.push_str("</mark>");
                index += len;
            }
            None => {
                plain.push(chars[index]);
                index += 1;
            }
        }
    }
    output.push_str(&escape_html(&plain));
    output
}

/// Counts non-overlapping case-insensitive occurrences of all terms.
pub fn count_matches(text: &str, terms: &[String]) -> usize {
    let haystack = text.to_lowercase();
    terms
        .iter()
        .map(|term| term.to_lowercase())
        .filter(|term| !term.is_empty())
        .map(|term| haystack.matches(term.as_str()).count())
        .sum()
}

/// Returns a window of about `width` chars around the first match, with
/// `...` marking trimmed edges. Falls back to the leading text.
pub fn excerpt(text: &str, terms: &[String], width: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= width {
        return text.to_string();
    }
    let lowered: Vec<char> = chars.iter().map(|c| lower_char(*c)).collect();
    let first_hit = terms
        .iter()
        .map(|term| term.chars().map(lower_char).collect::<Vec<char>>())
        .filter(|needle| !needle.is_empty())
        .filter_map(|needle| {
            (0..lowered.len()).find(|start| lowered[*start..].starts_with(&needle))
        })
        .min()
        .unwrap_or(0);

    let start = first_hit.saturating_sub(width / 4);
    let end = (start + width).min(chars.len());
    let start = end.saturating_sub(width);
    let mut window: String = chars[start..end].iter().collect();
    if start > 0 {
        window.insert_str(0, "...");
    }
    if end < chars.len() {
        window.push_str("...");
    }
    window
}

fn lower_char(ch: char) -> char {
    // Multi-char lowercase forms keep the original to preserve indexing.
    let mut lower = ch.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(single), None) => single,
        _ => ch,
    }
}
