// src/normalize/text.rs - Deterministic canonicalization of company names and addresses
use once_cell::sync::Lazy;
use regex::Regex;

/// Ordered abbreviation substitutions, applied over word boundaries after
/// uppercasing. The dotted forms are end-anchored: "ST." at the end of a
/// field collapses to "ST" without re-triggering the STREET rule elsewhere.
/// Table order is the declared order.
const ABBREVIATION_TABLE: [(&str, &str); 23] = [
    (r"\bSTREET\b", "ST"),
    (r"\bST\.$", "ST"),
    (r"\bSAINT\b", "ST"),
    (r"\bAVENUE\b", "AVE"),
    (r"\bAVE\.$", "AVE"),
    (r"\bDRIVE\b", "DR"),
    (r"\bDR\.$", "DR"),
    (r"\bBOULEVARD\b", "BLVD"),
    (r"\bBLVD\.$", "BLVD"),
    (r"\bCOURT\b", "CT"),
    (r"\bCT\.$", "CT"),
    (r"\bROAD\b", "RD"),
    (r"\bRD\.$", "RD"),
    (r"\bHIGHWAY\b", "HWY"),
    (r"\bHWY\.$", "HWY"),
    (r"\bNORTH\b", "N"),
    (r"\bN\.$", "N"),
    (r"\bSOUTH\b", "S"),
    (r"\bS\.$", "S"),
    (r"\bEAST\b", "E"),
    (r"\bE\.$", "E"),
    (r"\bWEST\b", "W"),
    (r"\bW\.$", "W"),
];

static ABBREVIATIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    ABBREVIATION_TABLE
        .iter()
        .map(|(pattern, replacement)| {
            (
                Regex::new(pattern).expect("abbreviation pattern is valid"),
                *replacement,
            )
        })
        .collect()
});

/// Canonicalize a free-text name or address field for comparison.
///
/// Uppercases, collapses whitespace, applies the abbreviation table in
/// declared order, strips remaining punctuation, and re-collapses. Empty or
/// blank input yields an empty string. Deterministic and idempotent.
pub fn normalize(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    let uppercased = text.to_uppercase();
    let mut normalized = uppercased.split_whitespace().collect::<Vec<_>>().join(" ");
    for (pattern, replacement) in ABBREVIATIONS.iter() {
        normalized = pattern.replace_all(&normalized, *replacement).into_owned();
    }
    normalized = normalized
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a nullable field: `None` yields an empty string, never raises.
pub fn normalize_opt(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}
