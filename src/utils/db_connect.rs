// src/utils/db_connect.rs - Connection pool for the CRM reference database
use anyhow::{Context, Result};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::info;
use std::env;
use tokio_postgres::NoTls;

pub type PgPool = Pool;

const DEFAULT_POOL_SIZE: usize = 16;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Build a connection pool from POSTGRES_* environment variables and verify
/// it with a round trip. Retry policy around transient outages belongs to
/// the operator (systemd, k8s), not here.
pub async fn connect() -> Result<PgPool> {
    let host = env_or("POSTGRES_HOST", "localhost");
    let port = env_or("POSTGRES_PORT", "5432")
        .parse::<u16>()
        .context("POSTGRES_PORT must be a port number")?;
    let user = env_or("POSTGRES_USER", "postgres");
    let password = env::var("POSTGRES_PASSWORD").unwrap_or_default();
    let dbname = env_or("POSTGRES_DB", "crm");
    let pool_size = env_or("POSTGRES_POOL_SIZE", &DEFAULT_POOL_SIZE.to_string())
        .parse::<usize>()
        .unwrap_or(DEFAULT_POOL_SIZE);

    let mut pg_config = tokio_postgres::Config::new();
    pg_config
        .host(&host)
        .port(port)
        .user(&user)
        .password(&password)
        .dbname(&dbname);

    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let pool = Pool::builder(manager)
        .max_size(pool_size)
        .build()
        .context("Failed to build connection pool")?;

    // Round trip to fail fast on bad credentials or unreachable host.
    let conn = pool
        .get()
        .await
        .context("Failed to get initial DB connection")?;
    conn.simple_query("SELECT 1")
        .await
        .context("Initial connectivity check failed")?;
    info!(
        "Connected to {}:{}/{} (pool size {})",
        host, port, dbname, pool_size
    );

    Ok(pool)
}

/// Pool status as (max_size, available, in_use).
pub fn get_pool_status(pool: &PgPool) -> (usize, usize, usize) {
    let status = pool.status();
    let available = status.available.max(0) as usize;
    let in_use = status.size.saturating_sub(available);
    (status.max_size, available, in_use)
}
