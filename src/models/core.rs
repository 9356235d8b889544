// src/models/core.rs - Uploaded and reference record types plus their normalized forms
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::normalize::state::canonicalize;
use crate::normalize::text::normalize;

/// A single row of an uploaded customer list, field names matching the
/// upload schema (`companyName`, `companyAddress`, ...). Immutable once read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    pub company_name: String,
    pub company_address: String,
    #[serde(default)]
    pub company_address2: Option<String>,
    pub company_city: String,
    pub company_state: String,
    pub company_zip_code: String,
}

impl RawRecord {
    /// Street address as a single string: line 1 joined with a non-empty line 2.
    pub fn full_address(&self) -> String {
        match self
            .company_address2
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
        {
            Some(line2) => format!("{} {}", self.company_address.trim(), line2),
            None => self.company_address.trim().to_string(),
        }
    }
}

/// A record fetched from the CRM reference store. Descriptive columns beyond
/// the core address fields are carried opaquely in `attributes` and preserved
/// verbatim on any emitted match candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    #[serde(flatten)]
    pub record: RawRecord,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

/// An uploaded record plus its derived comparison fields. Derived
/// deterministically at construction and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    pub record: RawRecord,
    pub normalized_name: String,
    pub normalized_address: String,
    /// Canonical two-letter state code where the state text maps to one;
    /// otherwise the canonicalizer's pass-through value. Used as the
    /// partition key for reference lookups.
    pub state_code: String,
}

impl NormalizedRecord {
    pub fn from_raw(record: RawRecord) -> Self {
        let normalized_name = normalize(&record.company_name);
        let normalized_address = normalize(&record.full_address());
        let state_code = canonicalize(&record.company_state);
        Self {
            record,
            normalized_name,
            normalized_address,
            state_code,
        }
    }
}

/// A reference record plus its derived comparison fields. Reference rows are
/// already scoped to a partition when fetched, so no state code is derived.
#[derive(Debug, Clone)]
pub struct NormalizedReference {
    pub reference: ReferenceRecord,
    pub normalized_name: String,
    pub normalized_address: String,
}

impl NormalizedReference {
    pub fn from_reference(reference: ReferenceRecord) -> Self {
        let normalized_name = normalize(&reference.record.company_name);
        let normalized_address = normalize(&reference.record.full_address());
        Self {
            reference,
            normalized_name,
            normalized_address,
        }
    }
}
