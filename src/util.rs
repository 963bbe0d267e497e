//! Shared helpers for parsing generator output and formatting it for people.

use sha2::{Digest, Sha256};

/// Extract the first balanced JSON value (object or array) from text that may
/// contain other content (prose, markdown fences). Brackets inside JSON
/// strings are ignored, and a bracketed span that is not valid JSON (such as
/// `[bar 3]` in prose) is skipped in favour of the next candidate.
pub fn extract_json_value(text: &str) -> Option<String> {
    text.char_indices()
        .filter(|(_, ch)| matches!(ch, '{' | '['))
        .filter_map(|(start, _)| balanced_span(&text[start..]))
        .find(|span| serde_json::from_str::<serde_json::Value>(span).is_ok())
        .map(str::to_string)
}

/// The balanced `{...}` or `[...]` at the start of `text`.
fn balanced_span(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// First 12 hex chars of the SHA-256 of `content`.
pub fn short_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..12].to_string()
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `…`.
pub fn truncate_for_display(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
