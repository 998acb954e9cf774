//! Error-code detection in free-text queries.

use regex::Regex;
use std::sync::OnceLock;

// One to three letters, optional dash or space, two to five digits.
// Covers the common service-code shapes: C-2801, SC542, E 100, F28.
const CODE_PATTERN: &str = r"(?i)\b([A-Z]{1,3})[- ]?(\d{2,5})\b";

fn code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CODE_PATTERN).expect("hardcoded pattern compiles"))
}

/// Pull probable error codes out of a query string, as written.
///
/// Matches are returned in query order without duplicates so the caller can
/// look each one up in the catalog. "why does C-2801 appear" yields
/// `["C-2801"]`.
pub fn detect_error_codes(query: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for m in code_regex().find_iter(query) {
        let code = m.as_str().to_string();
        let normalized = fixfinder_core::normalize_error_code(&code);
        if !seen
            .iter()
            .any(|(n, _)| *n == normalized)
        {
            seen.push((normalized, code));
        }
    }
    seen.into_iter().map(|(_, code)| code).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_dashed_code() {
        assert_eq!(detect_error_codes("paper jam C-2801 on tray 2"), vec!["C-2801"]);
    }

    #[test]
    fn test_detects_bare_code() {
        assert_eq!(detect_error_codes("sc542 after warmup"), vec!["sc542"]);
    }

    #[test]
    fn test_multiple_codes_in_order() {
        let codes = detect_error_codes("first E-100 then SC542");
        assert_eq!(codes, vec!["E-100", "SC542"]);
    }

    #[test]
    fn test_dedupes_variant_spellings() {
        let codes = detect_error_codes("C-2801 aka C2801");
        assert_eq!(codes.len(), 1);
    }

    #[test]
    fn test_plain_words_and_numbers_ignored() {
        assert!(detect_error_codes("fuser roller replacement").is_empty());
        assert!(detect_error_codes("manual from 2019").is_empty());
    }
}
