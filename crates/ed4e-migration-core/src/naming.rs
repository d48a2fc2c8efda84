//! Name folding and slug generation.
//!
//! Legacy documents refer to each other by display name, while current
//! documents carry a stable `edid` slug. Both sides are folded with the same
//! rules so a cached legacy name can be compared against a current identifier.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Maximum length for generated slugs.
const MAX_SLUG_LENGTH: usize = 96;

/// Regex for runs of characters that are not slug-safe.
static NON_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Regex for consecutive hyphens.
static CONSECUTIVE_HYPHENS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());

/// Strip diacritics and lowercase.
///
/// ```
/// use ed4e_migration::naming::fold;
///
/// assert_eq!(fold("Équipement"), "equipement");
/// assert_eq!(fold("Wütender Angriff"), "wutender angriff");
/// ```
pub fn fold(input: &str) -> String {
    input
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Normalize a document type string for rule lookup.
///
/// Trims, folds case and diacritics, and drops inner whitespace so that
/// `"Spell Matrix"`, `"spellmatrix"` and `"SPELLMATRIX "` share one key.
pub fn normalize_type_key(type_name: &str) -> String {
    fold(type_name.trim())
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Build the `edid` slug for a display name.
///
/// # Rules Applied
/// 1. Fold case and diacritics
/// 2. Replace apostrophes with nothing (`"Thief's Eye"` → `thiefs-eye`)
/// 3. Replace every other non-alphanumeric run with a hyphen
/// 4. Collapse and trim hyphens
/// 5. Truncate to MAX_SLUG_LENGTH on a hyphen boundary where possible
///
/// ```
/// use ed4e_migration::naming::slugify;
///
/// assert_eq!(slugify("Air Sailing"), "air-sailing");
/// assert_eq!(slugify("  Thief's Eye "), "thiefs-eye");
/// assert_eq!(slugify("Élan (Rank 2)"), "elan-rank-2");
/// ```
pub fn slugify(name: &str) -> String {
    let mut result = fold(name);

    result = result.replace(['\'', '’', '`'], "");
    result = NON_SLUG.replace_all(&result, "-").to_string();
    result = CONSECUTIVE_HYPHENS.replace_all(&result, "-").to_string();
    result = result.trim_matches('-').to_string();

    if result.len() > MAX_SLUG_LENGTH {
        result.truncate(MAX_SLUG_LENGTH);
        if let Some(pos) = result.rfind('-') {
            if pos > MAX_SLUG_LENGTH / 2 {
                result.truncate(pos);
            }
        }
        result = result.trim_matches('-').to_string();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Melee Weapons"), "melee-weapons");
        assert_eq!(slugify("Karma Ritual"), "karma-ritual");
    }

    #[test]
    fn test_slugify_is_idempotent() {
        let once = slugify("Lion Heart / Rank 3");
        assert_eq!(slugify(&once), once);
    }

    #[test]
    fn test_slugify_empty_and_symbols() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slugify_truncates_long_names() {
        let long = "word ".repeat(40);
        let slug = slugify(&long);
        assert!(slug.len() <= MAX_SLUG_LENGTH);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_normalize_type_key() {
        assert_eq!(normalize_type_key(" Spell Matrix "), "spellmatrix");
        assert_eq!(normalize_type_key("Équipement"), "equipement");
        assert_eq!(normalize_type_key("PC"), "pc");
    }
}
