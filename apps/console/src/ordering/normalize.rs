use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static LEADING_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[0-9]+\s+").expect("leading code pattern is valid"));

/// Drops a row/vendor code prefix such as `"000020 "`.
pub fn strip_leading_code(name: &str) -> &str {
    match LEADING_CODE.find(name) {
        Some(m) => name[m.end()..].trim(),
        None => name.trim(),
    }
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036f}').contains(&c)
}

/// Match key for a block or category name.
///
/// Code prefix removed, accents folded to their base letter, whitespace
/// collapsed and trimmed, upper-cased.
pub fn normalize_order_name(name: &str) -> String {
    let folded: String = strip_leading_code(name)
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    folded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}
