//! Heuristic line-item extraction from free-text email bodies.
//!
//! A quantity token is an integer not glued to a preceding word, number or
//! hyphen, optionally followed by an `x`/`X` separator. A separator glued to
//! the number (`3xWidget`) only counts when an uppercase letter, digit or
//! hyphen follows it, so `3xylophone` stays a name. The product name is
//! the run of word characters, hyphens and horizontal spaces after it, up to
//! the next quantity token or any other character. Best effort only: callers
//! must tolerate false negatives.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::pipeline::types::LineItem;

/// Quantity token. Group 1 is the number (fractions are captured so they can
/// be skipped rather than split into two tokens). Group 2 is a separator glued
/// to the number, which `name_start` decides on.
static QUANTITY_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w.,\-])(\d+(?:[.,]\d+)?)(?:[ \t]*[xX][ \t]+|([xX])|[ \t]*)")
        .expect("quantity token regex is valid")
});

/// Leading product-name run.
static NAME_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\- \t]+").expect("name regex is valid"));

/// Where the name begins after a glued `x`: past it when the next character
/// looks like the start of a product code, otherwise at the `x` itself.
fn name_start(text: &str, glued_at: usize, after: usize) -> usize {
    match text[after..].chars().next() {
        Some(c) if c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' => after,
        _ => glued_at,
    }
}

/// Pluggable extractor so the orchestrator does not depend on the heuristic.
pub trait ItemExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<LineItem>;
}

/// Default regex-based extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexExtractor;

impl ItemExtractor for RegexExtractor {
    fn extract(&self, text: &str) -> Vec<LineItem> {
        parse_items(text)
    }
}

/// Parse free text into deduplicated line items, in first-seen sku order.
pub fn parse_items(text: &str) -> Vec<LineItem> {
    let tokens: Vec<(usize, usize, &str)> = QUANTITY_TOKEN
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let qty = caps.get(1)?;
            let start = match caps.get(2) {
                Some(glued) => name_start(text, glued.start(), whole.end()),
                None => whole.end(),
            };
            Some((qty.start(), start, qty.as_str()))
        })
        .collect();

    let mut items: Vec<LineItem> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (i, &(_, name_start, qty_str)) in tokens.iter().enumerate() {
        let segment_end = tokens.get(i + 1).map_or(text.len(), |next| next.0);
        let Some(segment) = text.get(name_start..segment_end) else {
            continue;
        };

        let Ok(quantity) = qty_str.parse::<u32>() else {
            // fractional or overflowing
            continue;
        };
        if quantity == 0 {
            continue;
        }

        let Some(name) = NAME_RUN.find(segment).map(|m| m.as_str().trim()) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        match index.get(name) {
            Some(&pos) => {
                let item = &mut items[pos];
                item.quantity = item.quantity.saturating_add(quantity);
            }
            None => {
                index.insert(name.to_string(), items.len());
                items.push(LineItem::new(name, quantity));
            }
        }
    }

    items
}

/// Render items back into the `qty x sku` one-per-line form the parser reads.
pub fn render_items(items: &[LineItem]) -> String {
    items
        .iter()
        .map(|it| format!("{} x {}", it.quantity, it.sku))
        .collect::<Vec<_>>()
        .join("\n")
}
