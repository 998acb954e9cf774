//! Error-code extraction from document text.
//!
//! Pattern-based extraction produces candidates, never authoritative catalog
//! entries. Confidence and severity are heuristics scored from the text
//! around the match; a human reviewer promotes candidates to verified.

use fixfinder_core::Severity;
use regex::Regex;
use std::sync::OnceLock;

// Same code shapes the query detector recognizes. Uppercase only; document
// text keeps service codes capitalized and this avoids prose false hits.
const CODE_PATTERN: &str = r"\b([A-Z]{1,3})-?(\d{2,5})\b";

// Words that mark a match as an actual error code rather than a model
// number or section reference.
const SIGNAL_WORDS: [&str; 6] = ["error", "code", "fault", "trouble", "malfunction", "indicates"];

const CRITICAL_WORDS: [&str; 4] = ["fire", "shock", "hazard", "power off immediately"];
const HIGH_WORDS: [&str; 4] = ["critical", "stops", "inoperable", "service call"];
const LOW_WORDS: [&str; 3] = ["warning", "notice", "informational"];

const CONTEXT_WINDOW: usize = 120;

fn code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CODE_PATTERN).expect("hardcoded pattern compiles"))
}

/// An error-code candidate pulled from chunk text.
#[derive(Debug, Clone)]
pub struct ExtractedCode {
    pub code: String,
    /// The text surrounding the match, used as the candidate description.
    pub context: String,
    pub severity: Severity,
    pub confidence: f64,
}

/// Scan text for error-code candidates.
///
/// Each distinct code is reported once with the context of its first
/// occurrence. Matches with no error-signal word nearby still come back,
/// just with low confidence.
pub fn extract_error_codes(text: &str) -> Vec<ExtractedCode> {
    let mut seen: Vec<String> = Vec::new();
    let mut extracted = Vec::new();

    for m in code_regex().find_iter(text) {
        // Skip compound identifiers like part number FU-100-B
        let tail = &text[m.end()..];
        if tail.starts_with('-')
            && tail[1..]
                .chars()
                .next()
                .map(|c| c.is_ascii_alphanumeric())
                .unwrap_or(false)
        {
            continue;
        }

        let code = m.as_str().to_string();
        let normalized = fixfinder_core::normalize_error_code(&code);
        if seen.contains(&normalized) {
            continue;
        }
        seen.push(normalized);

        let context = context_around(text, m.start(), m.end());
        let lowered = context.to_lowercase();

        let mut confidence = 0.35;
        if SIGNAL_WORDS.iter().any(|w| lowered.contains(w)) {
            confidence += 0.35;
        }
        if code.contains('-') {
            confidence += 0.1;
        }

        let severity = if CRITICAL_WORDS.iter().any(|w| lowered.contains(w)) {
            Severity::Critical
        } else if HIGH_WORDS.iter().any(|w| lowered.contains(w)) {
            Severity::High
        } else if LOW_WORDS.iter().any(|w| lowered.contains(w)) {
            Severity::Low
        } else {
            Severity::Medium
        };

        extracted.push(ExtractedCode {
            code,
            context,
            severity,
            confidence,
        });
    }

    extracted
}

fn context_around(text: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(CONTEXT_WINDOW);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + CONTEXT_WINDOW).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_code_with_signal_words() {
        let text = "Error code C-2801 indicates a fuser thermistor open circuit. \
                    Replace the fuser unit and clear the code from the service menu.";
        let codes = extract_error_codes(text);

        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code, "C-2801");
        assert!(codes[0].confidence > 0.6);
        assert!(codes[0].context.contains("thermistor"));
    }

    #[test]
    fn test_bare_match_gets_low_confidence() {
        let codes = extract_error_codes("See section A-100 for lubrication points.");
        assert_eq!(codes.len(), 1);
        assert!(codes[0].confidence < 0.6);
    }

    #[test]
    fn test_severity_from_context() {
        let critical =
            extract_error_codes("Fault SC990: shock hazard, power off immediately and unplug.");
        assert_eq!(critical[0].severity, Severity::Critical);

        let high = extract_error_codes("Error E-404 means the machine stops until serviced.");
        assert_eq!(high[0].severity, Severity::High);

        let low = extract_error_codes("Code W-20 is an informational warning only.");
        assert_eq!(low[0].severity, Severity::Low);
    }

    #[test]
    fn test_repeated_code_reported_once() {
        let text = "Error C-2801 at warmup. If C-2801 persists, replace the fuser.";
        assert_eq!(extract_error_codes(text).len(), 1);
    }

    #[test]
    fn test_compound_part_numbers_skipped() {
        assert!(extract_error_codes("Order replacement part FU-100-B from stock.").is_empty());
    }

    #[test]
    fn test_plain_text_yields_nothing() {
        assert!(extract_error_codes("Remove the rear cover and two screws.").is_empty());
    }
}
