//! Name normalization and slug derivation.
//!
//! Both functions are total: any input string produces an output, and
//! applying either one to its own output is a no-op.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize a restaurant name into a name-based resolution key.
///
/// Decomposes to NFD, drops combining marks (so `"Café"` and `"Cafe"`
/// collide), lowercases, and collapses whitespace runs to single spaces.
///
/// ```
/// use belly_buzz_core::normalize::normalize_name;
///
/// assert_eq!(normalize_name("  Café   Boulud "), "cafe boulud");
/// ```
pub fn normalize_name(name: &str) -> String {
    let stripped: String = name.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derive a URL-safe slug from a display name.
///
/// Lowercases, drops everything outside `[a-z0-9]` except whitespace and
/// hyphens, turns each run of whitespace/hyphens into one `-`, and never
/// emits a leading or trailing hyphen. The result may be empty when the
/// name has no ASCII alphanumerics.
///
/// ```
/// use belly_buzz_core::normalize::slug;
///
/// assert_eq!(slug("The Burger's Priest"), "the-burgers-priest");
/// assert_eq!(slug(" -- Pai  Northern_Thai -- "), "pai-northernthai");
/// ```
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;

    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_sep = true;
        }
    }

    out
}
