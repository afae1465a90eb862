//! Server configuration from the environment.

use std::net::SocketAddr;

use anyhow::Context;

use famreport_infra::{CrmConfig, SyncConfig, default_db_path};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8001";

/// Where cached records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    InMemory,
    Sqlite(String),
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub cache: CacheBackend,
    pub crm: CrmConfig,
    pub sync: SyncConfig,
    pub cors_origins: Vec<String>,
}

/// Comma-separated `CORS_ORIGINS`; `*` allows any origin.
pub fn parse_cors_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

impl ApiConfig {
    /// `BIND_ADDR`, `DATABASE_URL`, `USE_IN_MEMORY_CACHE`, `CORS_ORIGINS`,
    /// plus the CRM and sync settings.
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_raw = std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse()
            .with_context(|| format!("invalid BIND_ADDR {bind_raw:?}"))?;

        let in_memory = std::env::var("USE_IN_MEMORY_CACHE")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let cache = if in_memory {
            CacheBackend::InMemory
        } else {
            match std::env::var("DATABASE_URL").ok().filter(|u| !u.trim().is_empty()) {
                Some(url) => CacheBackend::Sqlite(url),
                None => {
                    let path = default_db_path().context("no data directory for the default database")?;
                    CacheBackend::Sqlite(format!("sqlite://{}", path.to_string_lossy()))
                }
            }
        };

        let cors_origins = parse_cors_origins(&std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string()));

        Ok(Self {
            bind_addr,
            cache,
            crm: CrmConfig::from_env(),
            sync: SyncConfig::from_env(),
            cors_origins,
        })
    }

    /// In-memory cache, default CRM and sync settings.
    pub fn in_memory() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            cache: CacheBackend::InMemory,
            crm: CrmConfig::default(),
            sync: SyncConfig::default(),
            cors_origins: vec!["*".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_origins_split_on_commas() {
        assert_eq!(
            parse_cors_origins("http://localhost:3000, https://reports.example.org ,"),
            vec!["http://localhost:3000", "https://reports.example.org"]
        );
        assert_eq!(parse_cors_origins("*"), vec!["*"]);
        assert!(parse_cors_origins("").is_empty());
    }
}
