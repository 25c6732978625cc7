//! Command line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

const DEFAULT_BIND: ([u8; 4], u16) = ([127, 0, 0, 1], 5000);
const DEFAULT_SINK_FILE: &str = "checkouts.jsonl";
const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SINK_CAPACITY: usize = 1024;

/// Record point-of-sale checkouts and estimate the queue behind each one.
///
/// Every option can also be set with a CHECKOUT_* environment variable
/// (or a .env file). Flags win over the environment.
///
/// Examples:
///   checkout                                        # listen on 127.0.0.1:5000
///   checkout --bind 0.0.0.0:8080 --sink-file rows.jsonl
///   checkout --webhook-url https://example.com/rows -vv
#[derive(Debug, Parser)]
#[command(name = "checkout")]
#[command(version)]
#[command(about = "Record point-of-sale checkouts and estimate the queue behind each one")]
pub struct Cli {
    /// Address to listen on [env: CHECKOUT_BIND] [default: 127.0.0.1:5000]
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    /// Append rows to a JSONL file [env: CHECKOUT_SINK_FILE] [default: checkouts.jsonl]
    #[arg(long, value_name = "PATH", conflicts_with = "webhook_url")]
    pub sink_file: Option<PathBuf>,

    /// POST rows as JSON to this URL instead of a file [env: CHECKOUT_WEBHOOK_URL]
    #[arg(long, value_name = "URL")]
    pub webhook_url: Option<String>,

    /// Webhook request timeout in seconds [env: CHECKOUT_WEBHOOK_TIMEOUT] [default: 10]
    #[arg(long, value_name = "SECS")]
    pub webhook_timeout: Option<u64>,

    /// Rows buffered for the sink before new ones are dropped [env: CHECKOUT_SINK_CAPACITY] [default: 1024]
    #[arg(long, value_name = "ROWS")]
    pub sink_capacity: Option<usize>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Where recorded rows are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkConfig {
    Jsonl(PathBuf),
    Webhook { url: String, timeout: Duration },
}

/// Resolved server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub sink: SinkConfig,
    pub sink_capacity: usize,
}

impl ServerConfig {
    /// Resolves settings from flags, falling back to process environment
    /// variables and then defaults.
    ///
    /// ## Errors
    ///
    /// Returns an error if an environment variable holds an unparsable value.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        Self::resolve(cli, |key| std::env::var(key).ok())
    }

    /// Resolves settings using `lookup` for environment variables.
    pub fn resolve<F>(cli: &Cli, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = match cli.bind {
            Some(bind) => bind,
            None => parse_env(&lookup, "CHECKOUT_BIND")?
                .unwrap_or_else(|| SocketAddr::from(DEFAULT_BIND)),
        };

        let webhook_url = cli
            .webhook_url
            .clone()
            .or_else(|| lookup("CHECKOUT_WEBHOOK_URL"))
            .filter(|url| !url.trim().is_empty());

        let sink = match (cli.sink_file.clone(), webhook_url) {
            (Some(path), _) => SinkConfig::Jsonl(path),
            (None, Some(url)) => {
                let secs = match cli.webhook_timeout {
                    Some(secs) => secs,
                    None => parse_env(&lookup, "CHECKOUT_WEBHOOK_TIMEOUT")?
                        .unwrap_or(DEFAULT_WEBHOOK_TIMEOUT_SECS),
                };
                SinkConfig::Webhook {
                    url,
                    timeout: Duration::from_secs(secs),
                }
            }
            (None, None) => SinkConfig::Jsonl(
                lookup("CHECKOUT_SINK_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SINK_FILE)),
            ),
        };

        let sink_capacity = match cli.sink_capacity {
            Some(capacity) => capacity,
            None => parse_env(&lookup, "CHECKOUT_SINK_CAPACITY")?.unwrap_or(DEFAULT_SINK_CAPACITY),
        };

        Ok(Self {
            bind,
            sink,
            sink_capacity: sink_capacity.max(1),
        })
    }
}

fn parse_env<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value }),
    }
}
