//! Email text helpers: sender normalization and quoted-reply stripping.

use std::sync::LazyLock;

use regex::Regex;

static EMAIL_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}")
        .expect("email address regex is valid")
});

/// Extract the bare, lowercased address from a `From` header value such as
/// `"Alice" <Alice@Example.com>`. Returns an empty string if none is found.
pub fn normalize_address(raw: &str) -> String {
    EMAIL_ADDRESS
        .find(raw)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default()
}

/// Drop quoted reply content so items from an earlier message in the thread
/// are not counted twice.
///
/// Removes `>`-prefixed lines and everything after an `On ... wrote:`
/// attribution or an `Original Message` separator.
pub fn strip_quoted_text(body: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();
        let is_attribution = trimmed.starts_with("On ") && trimmed.ends_with("wrote:");
        let is_separator = trimmed.starts_with("---") && trimmed.contains("Original Message");
        if is_attribution || is_separator {
            break;
        }
        if !trimmed.starts_with('>') {
            kept.push(line);
        }
    }

    while kept.last().is_some_and(|l| l.trim().is_empty()) {
        kept.pop();
    }
    kept.join("\n")
}
