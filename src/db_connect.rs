use anyhow::{Context, Result};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use log::info;
use std::time::Duration;
use tokio_postgres::{Config, NoTls};

/// Shared pool of store connections, created once per process and passed to
/// whoever reads or writes cases.
pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

const APPLICATION_NAME: &str = "customization_cases";
const DEFAULT_POOL_SIZE: u32 = 16;

/// Connection and pool settings taken from `POSTGRES_*` and `CASES_DB_POOL_SIZE`.
#[derive(Debug, Clone, PartialEq)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub pool_size: u32,
}

impl DbSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Missing or unparsable values fall back to a local development database.
    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        DbSettings {
            host: lookup("POSTGRES_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: lookup("POSTGRES_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(5432),
            dbname: lookup("POSTGRES_DB").unwrap_or_else(|| "customization".to_string()),
            user: lookup("POSTGRES_USER").unwrap_or_else(|| "postgres".to_string()),
            password: lookup("POSTGRES_PASSWORD").unwrap_or_default(),
            pool_size: lookup("CASES_DB_POOL_SIZE")
                .and_then(|v| v.trim().parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_POOL_SIZE),
        }
    }

    fn pg_config(&self) -> Config {
        let mut config = Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user)
            .password(&self.password)
            .application_name(APPLICATION_NAME)
            .connect_timeout(Duration::from_secs(10));
        config
    }
}

/// Opens the pool and checks it with `SELECT 1` before handing it out.
pub async fn connect() -> Result<PgPool> {
    let settings = DbSettings::from_env();
    info!(
        "Connecting to PostgreSQL at {}:{} (db={}, user={}, pool_size={})",
        settings.host, settings.port, settings.dbname, settings.user, settings.pool_size
    );
    let manager = PostgresConnectionManager::new(settings.pg_config(), NoTls);

    // Requests read the whole collection once each, so a single warm
    // connection covers idle periods.
    let pool = Pool::builder()
        .max_size(settings.pool_size)
        .min_idle(Some(1))
        .idle_timeout(Some(Duration::from_secs(180)))
        .connection_timeout(Duration::from_secs(20))
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;

    pool.get()
        .await
        .context("Failed to get test connection from pool")?
        .query_one("SELECT 1", &[])
        .await
        .context("Store health check failed")?;
    info!("Connection pool ready.");
    Ok(pool)
}

/// Returns `(total, idle, in_use)` connection counts for the pool.
pub fn get_pool_status(pool: &PgPool) -> (usize, usize, usize) {
    let state = pool.state();
    let total = state.connections as usize;
    let idle = state.idle_connections as usize;
    (total, idle, total.saturating_sub(idle))
}
