// src/normalize/state.rs - Full US state names to two-letter codes
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// The 50 states plus DC, keyed by uppercased full name.
const STATE_TABLE: [(&str, &str); 51] = [
    ("ALABAMA", "AL"),
    ("ALASKA", "AK"),
    ("ARIZONA", "AZ"),
    ("ARKANSAS", "AR"),
    ("CALIFORNIA", "CA"),
    ("COLORADO", "CO"),
    ("CONNECTICUT", "CT"),
    ("DELAWARE", "DE"),
    ("DISTRICT OF COLUMBIA", "DC"),
    ("FLORIDA", "FL"),
    ("GEORGIA", "GA"),
    ("HAWAII", "HI"),
    ("IDAHO", "ID"),
    ("ILLINOIS", "IL"),
    ("INDIANA", "IN"),
    ("IOWA", "IA"),
    ("KANSAS", "KS"),
    ("KENTUCKY", "KY"),
    ("LOUISIANA", "LA"),
    ("MAINE", "ME"),
    ("MARYLAND", "MD"),
    ("MASSACHUSETTS", "MA"),
    ("MICHIGAN", "MI"),
    ("MINNESOTA", "MN"),
    ("MISSISSIPPI", "MS"),
    ("MISSOURI", "MO"),
    ("MONTANA", "MT"),
    ("NEBRASKA", "NE"),
    ("NEVADA", "NV"),
    ("NEW HAMPSHIRE", "NH"),
    ("NEW JERSEY", "NJ"),
    ("NEW MEXICO", "NM"),
    ("NEW YORK", "NY"),
    ("NORTH CAROLINA", "NC"),
    ("NORTH DAKOTA", "ND"),
    ("OHIO", "OH"),
    ("OKLAHOMA", "OK"),
    ("OREGON", "OR"),
    ("PENNSYLVANIA", "PA"),
    ("RHODE ISLAND", "RI"),
    ("SOUTH CAROLINA", "SC"),
    ("SOUTH DAKOTA", "SD"),
    ("TENNESSEE", "TN"),
    ("TEXAS", "TX"),
    ("UTAH", "UT"),
    ("VERMONT", "VT"),
    ("VIRGINIA", "VA"),
    ("WASHINGTON", "WA"),
    ("WEST VIRGINIA", "WV"),
    ("WISCONSIN", "WI"),
    ("WYOMING", "WY"),
];

static STATE_CODES: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| STATE_TABLE.iter().copied().collect());

/// Map a free-text state to its two-letter code.
///
/// Empty input is returned unchanged so an unmapped empty value stays
/// distinguishable downstream. A value that is already two characters after
/// trimming and uppercasing is treated as canonical and passed through
/// without validation. Unrecognized full names pass through uppercased and
/// trimmed — fail open, never raises.
pub fn canonicalize(state: &str) -> String {
    let trimmed = state.trim();
    if trimmed.is_empty() {
        return state.to_string();
    }
    let upper = trimmed.to_uppercase();
    if upper.chars().count() == 2 {
        return upper;
    }
    match STATE_CODES.get(upper.as_str()) {
        Some(code) => (*code).to_string(),
        None => upper,
    }
}
