use std::{fmt::Display, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::anyhow;

/// Process configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub cors_origin: String,
    /// Deadline for every storage call.
    pub storage_timeout: Duration,
    pub bcrypt_cost: u32,
    pub session_inactivity: time::Duration,
    /// Secure + SameSite=None cookies, for a frontend on another origin.
    pub session_secure: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        dotenv::dotenv().ok();
        Config::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        Ok(Config {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://tempchat.db?mode=rwc".to_owned()),
            db_max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS", 16)?,
            bind_addr: parsed(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 4000)))?,
            cors_origin: lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_owned()),
            storage_timeout: Duration::from_millis(parsed(&lookup, "STORAGE_TIMEOUT_MS", 5_000)?),
            bcrypt_cost: parsed(&lookup, "BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            session_inactivity: time::Duration::minutes(parsed(&lookup, "SESSION_INACTIVITY_MINUTES", 60)?),
            session_secure: parsed(&lookup, "SESSION_SECURE", false)?,
        })
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|err| anyhow!("{key}={raw:?}: {err}")),
        None => Ok(default),
    }
}
