use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use crate::error::{AppError, Result};

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub fetch_timeout: Duration,
    pub max_response_bytes: u64,
    /// Overall deadline for one ingestion including sub-resource fetches. Off unless set.
    pub ingest_deadline: Option<Duration>,
    pub allow_private_hosts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            ingest_deadline: None,
            allow_private_hosts: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = lookup("PORT").unwrap_or_else(|| "3000".to_string());
        let port = port.parse::<u16>().map_err(|e| AppError::Config(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::Config(format!("Invalid host address: {}", e)))?;

        let fetch_timeout = match lookup("FETCH_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number(&raw, "FETCH_TIMEOUT_SECS")?),
            None => Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        };

        let max_response_bytes = match lookup("MAX_RESPONSE_BYTES") {
            Some(raw) => parse_number(&raw, "MAX_RESPONSE_BYTES")?,
            None => DEFAULT_MAX_RESPONSE_BYTES,
        };

        let ingest_deadline = lookup("INGEST_DEADLINE_SECS")
            .map(|raw| parse_number(&raw, "INGEST_DEADLINE_SECS").map(Duration::from_secs))
            .transpose()?;

        let allow_private_hosts = match lookup("ALLOW_PRIVATE_HOSTS").as_deref() {
            None | Some("") | Some("0") | Some("false") | Some("no") => false,
            Some("1") | Some("true") | Some("yes") => true,
            Some(other) => {
                return Err(AppError::Config(format!("Invalid ALLOW_PRIVATE_HOSTS value: {}", other)));
            }
        };

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            fetch_timeout,
            max_response_bytes,
            ingest_deadline,
            allow_private_hosts,
        })
    }
}

fn parse_number(raw: &str, key: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| AppError::Config(format!("Invalid {}: {}", key, e)))
}
