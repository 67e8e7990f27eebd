//! Configuration module - command line and environment variable parsing

use std::env;
use std::net::SocketAddr;

use clap::Parser;

/// Default listen address; a bare port binds all interfaces
const DEFAULT_LISTEN_ADDR: &str = ":8080";

/// Command line arguments
#[derive(Parser, Debug, Default)]
#[clap(author, version, about)]
pub struct Cli {
    /// Listen address, e.g. ":8080" or "127.0.0.1:9000"
    #[clap(short, long)]
    pub addr: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[clap(short, long)]
    pub log_level: Option<String>,
}

/// Application configuration merged from CLI flags and environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma-separated. Any origin when unset.
    pub client_origin: Option<String>,
    /// Fixed seed for room spawn randomness
    pub arena_seed: Option<u64>,
}

impl Config {
    /// Load configuration from the CLI and the process environment
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        Self::from_sources(cli, |key| env::var(key).ok())
    }

    /// CLI flags win over the environment. `PORT` (set by most hosts) wins
    /// over `SERVER_ADDR`.
    fn from_sources(cli: &Cli, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen = match (&cli.addr, var("PORT"), var("SERVER_ADDR")) {
            (Some(addr), _, _) => addr.clone(),
            (None, Some(port), _) => format!(":{}", port),
            (None, None, Some(addr)) => addr,
            (None, None, None) => DEFAULT_LISTEN_ADDR.to_string(),
        };

        let arena_seed = match var("ARENA_SEED") {
            Some(raw) => Some(raw.trim().parse().map_err(|_| ConfigError::InvalidSeed(raw))?),
            None => None,
        };

        Ok(Self {
            server_addr: parse_listen_addr(&listen)?,
            log_level: cli
                .log_level
                .clone()
                .or_else(|| var("LOG_LEVEL"))
                .unwrap_or_else(|| "info".to_string()),
            client_origin: var("CLIENT_ORIGIN").filter(|s| !s.trim().is_empty()),
            arena_seed,
        })
    }
}

/// Parse a listen address. A bare `:port` binds every interface.
pub fn parse_listen_addr(raw: &str) -> Result<SocketAddr, ConfigError> {
    let raw = raw.trim();
    let full = if raw.starts_with(':') {
        format!("0.0.0.0{}", raw)
    } else {
        raw.to_string()
    };

    full.parse()
        .map_err(|_| ConfigError::InvalidAddress(raw.to_string()))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Invalid ARENA_SEED, expected an unsigned integer: {0}")]
    InvalidSeed(String),
}
