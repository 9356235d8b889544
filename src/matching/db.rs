// src/matching/db.rs - Postgres-backed reference source
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;
use tokio_postgres::types::Type;
use tokio_postgres::Row;

use crate::matching::source::ReferenceSource;
use crate::models::core::{RawRecord, ReferenceRecord};
use crate::utils::db_connect::PgPool;

const DEFAULT_REFERENCE_TABLE: &str = "crm_account";

/// Core address columns mapped onto RawRecord; everything else on the row is
/// carried through as an opaque passthrough attribute.
const CORE_COLUMNS: [&str; 6] = [
    "company_name",
    "company_address",
    "company_address2",
    "company_city",
    "company_state",
    "company_zip_code",
];

/// The production reference source: one query per partition, scoped by state
/// code. The table is expected to expose the core address columns; any other
/// column rides along untouched.
pub struct PostgresReferenceSource {
    pool: PgPool,
    table: String,
}

impl PostgresReferenceSource {
    pub fn new(pool: PgPool) -> Self {
        let table =
            env::var("CRM_REFERENCE_TABLE").unwrap_or_else(|_| DEFAULT_REFERENCE_TABLE.to_string());
        Self { pool, table }
    }
}

#[async_trait]
impl ReferenceSource for PostgresReferenceSource {
    async fn fetch(&self, partition_key: &str) -> Result<Vec<ReferenceRecord>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for reference fetch")?;

        let query = format!(
            "SELECT * FROM {} WHERE UPPER(TRIM(company_state)) = $1",
            self.table
        );
        let rows = conn
            .query(&query, &[&partition_key])
            .await
            .with_context(|| format!("Reference query failed for partition '{}'", partition_key))?;

        rows.iter().map(row_to_reference).collect()
    }
}

fn row_to_reference(row: &Row) -> Result<ReferenceRecord> {
    let record = RawRecord {
        company_name: row.try_get("company_name").context("Missing company_name")?,
        company_address: row
            .try_get("company_address")
            .context("Missing company_address")?,
        company_address2: row.try_get("company_address2").unwrap_or(None),
        company_city: row.try_get("company_city").context("Missing company_city")?,
        company_state: row
            .try_get("company_state")
            .context("Missing company_state")?,
        company_zip_code: row
            .try_get("company_zip_code")
            .context("Missing company_zip_code")?,
    };

    let mut attributes = HashMap::new();
    for (idx, column) in row.columns().iter().enumerate() {
        if CORE_COLUMNS.contains(&column.name()) {
            continue;
        }
        if let Some(value) = column_value(row, idx, column.type_()) {
            attributes.insert(column.name().to_string(), value);
        }
    }

    Ok(ReferenceRecord { record, attributes })
}

/// Convert a dynamic column to JSON by Postgres type. Columns of types we
/// cannot represent are skipped rather than failing the fetch.
fn column_value(row: &Row, idx: usize, ty: &Type) -> Option<Value> {
    if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME {
        row.try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(Value::from)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
    } else if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(Value::from)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<Value>>(idx).ok().flatten()
    } else {
        debug!(
            "Skipping reference column '{}' with unsupported type {}",
            row.columns()[idx].name(),
            ty
        );
        None
    }
}
