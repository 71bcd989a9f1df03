//! Process configuration and tracing bootstrap.
//!
//! Every binary calls `bootstrap_env()` first (dev-time `.env.local`
//! loading, silent when absent), then `Config::from_env()`, then
//! `init_tracing(&config)`.

use anyhow::{anyhow, Context, Result};

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEnv {
    Development,
    Production,
    Test,
}

impl NodeEnv {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "development" => Ok(NodeEnv::Development),
            "production" => Ok(NodeEnv::Production),
            "test" => Ok(NodeEnv::Test),
            other => Err(anyhow!("invalid NODE_ENV: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeEnv::Development => "development",
            NodeEnv::Production => "production",
            NodeEnv::Test => "test",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Logical chain networks this deployment serves. `NETWORKS` (csv) wins
    /// over `NETWORK`; default is a single "mainnet".
    pub networks: Vec<String>,
    pub log_level: String,
    pub node_env: NodeEnv,
    /// Bypasses plan enforcement and ownership scoping end-to-end.
    pub dev_mode: bool,
    pub indexer_url: Option<String>,
    pub stacks_network: Option<String>,
    /// Worker loops per worker process.
    pub worker_count: usize,
    pub recovery_interval_secs: u64,
    pub stale_claim_minutes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var(ENV_DATABASE_URL)
            .with_context(|| format!("missing env var {ENV_DATABASE_URL}"))?;

        let networks = match std::env::var("NETWORKS") {
            Ok(csv) => parse_networks(&csv)?,
            Err(_) => vec![std::env::var("NETWORK").unwrap_or_else(|_| "mainnet".to_string())],
        };

        let node_env = match std::env::var("NODE_ENV") {
            Ok(v) => NodeEnv::parse(&v)?,
            Err(_) => NodeEnv::Development,
        };

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        validate_log_level(&log_level)?;

        Ok(Self {
            database_url,
            networks,
            log_level,
            node_env,
            dev_mode: env_flag("DEV_MODE"),
            indexer_url: std::env::var("INDEXER_URL").ok(),
            stacks_network: std::env::var("STACKS_NETWORK").ok(),
            worker_count: env_parse("WORKER_COUNT", 1)?,
            recovery_interval_secs: env_parse("RECOVERY_INTERVAL_SECS", 60)?,
            stale_claim_minutes: env_parse("STALE_CLAIM_MINUTES", 5)?,
        })
    }

    /// First configured network; payloads carry this unless the job says
    /// otherwise.
    pub fn primary_network(&self) -> &str {
        &self.networks[0]
    }
}

/// Load `.env.local` if present. Production injects env vars directly.
pub fn bootstrap_env() {
    let _ = dotenvy::from_filename(".env.local");
}

/// JSON logs in production, human-readable everywhere else. `LOG_LEVEL` (or
/// a full `RUST_LOG` filter) controls verbosity.
pub fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));

    if config.node_env == NodeEnv::Production {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|e| anyhow!("invalid {name}: {e}")),
        Err(_) => Ok(default),
    }
}

fn parse_networks(csv: &str) -> Result<Vec<String>> {
    let networks: Vec<String> = csv
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if networks.is_empty() {
        return Err(anyhow!("NETWORKS must name at least one network"));
    }
    Ok(networks)
}

fn validate_log_level(level: &str) -> Result<()> {
    match level {
        "debug" | "info" | "warn" | "error" => Ok(()),
        other => Err(anyhow!("invalid LOG_LEVEL: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn networks_csv_parses_and_trims() {
        let n = parse_networks("mainnet, testnet").unwrap();
        assert_eq!(n, vec!["mainnet", "testnet"]);
        assert!(parse_networks(" , ").is_err());
    }

    #[test]
    fn node_env_rejects_unknown() {
        assert!(NodeEnv::parse("prod").is_err());
        assert_eq!(NodeEnv::parse("production").unwrap(), NodeEnv::Production);
    }

    #[test]
    fn log_levels_are_the_documented_set() {
        for lvl in ["debug", "info", "warn", "error"] {
            assert!(validate_log_level(lvl).is_ok());
        }
        assert!(validate_log_level("trace").is_err());
    }
}
