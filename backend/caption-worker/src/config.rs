//! Configuration for the caption worker
use crate::error::{Result, WorkerError};
use crate::providers::caption_api::DEFAULT_CAPTION_URL;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable prefix for every setting
pub const ENV_PREFIX: &str = "WORKER_";

/// Main configuration struct, loaded from `WORKER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Captioning API endpoint
    #[serde(default = "default_caption_url")]
    pub caption_url: String,

    /// Captioning API key (required)
    #[serde(default)]
    pub caption_key: String,

    /// Redis `host:port`
    #[serde(default = "default_redis_addr")]
    pub redis_addr: String,

    /// Redis password, empty for none
    #[serde(default)]
    pub redis_passwd: String,

    /// Redis logical database index
    #[serde(default)]
    pub redis_db: i64,

    /// Channel the worker subscribes to
    #[serde(default = "default_redis_channel")]
    pub redis_channel: String,

    /// Channel for enriched records; the input channel when unset
    #[serde(default)]
    pub output_channel: Option<String>,

    /// Channel receiving records whose enrichment failed; failures are dropped when unset
    #[serde(default)]
    pub dead_letter_channel: Option<String>,

    /// Maximum enrichments running at once
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Image download timeout in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Captioning API timeout in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub caption_timeout_secs: u64,

    /// How long to wait for the subscription confirmation at startup
    #[serde(default = "default_subscribe_timeout_secs")]
    pub subscribe_timeout_secs: u64,
}

fn default_caption_url() -> String {
    DEFAULT_CAPTION_URL.to_string()
}

fn default_redis_addr() -> String {
    "localhost:6379".to_string()
}

fn default_redis_channel() -> String {
    "queue".to_string()
}

fn default_max_in_flight() -> usize {
    64
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_subscribe_timeout_secs() -> u64 {
    10
}

/// Whether `WORKER_LOG_FORMAT=json` asks for JSON log lines
///
/// Read before the rest of the config so logging is up before config errors are reported.
pub fn json_logs_from_env() -> bool {
    is_json_log_format(std::env::var(format!("{}LOG_FORMAT", ENV_PREFIX)).ok().as_deref())
}

fn is_json_log_format(value: Option<&str>) -> bool {
    matches!(value, Some(format) if format.trim().eq_ignore_ascii_case("json"))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config: Config = envy::prefixed(ENV_PREFIX)
            .from_env()
            .map_err(|e| WorkerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from explicit key/value pairs (keys carry the `WORKER_` prefix)
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Config = envy::prefixed(ENV_PREFIX)
            .from_iter(pairs)
            .map_err(|e| WorkerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the worker cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.caption_key.trim().is_empty() {
            return Err(WorkerError::Config(format!(
                "{}CAPTION_KEY is required",
                ENV_PREFIX
            )));
        }

        if self.max_in_flight == 0 {
            return Err(WorkerError::Config(format!(
                "{}MAX_IN_FLIGHT must be at least 1",
                ENV_PREFIX
            )));
        }

        self.redis_connection_info()?;
        Ok(())
    }

    /// Channel enriched records are published to
    pub fn output_channel(&self) -> &str {
        match self.output_channel.as_deref() {
            Some(channel) if !channel.is_empty() => channel,
            _ => &self.redis_channel,
        }
    }

    /// Dead-letter channel, if one is configured
    pub fn dead_letter_channel(&self) -> Option<&str> {
        self.dead_letter_channel
            .as_deref()
            .filter(|channel| !channel.is_empty())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn caption_timeout(&self) -> Duration {
        Duration::from_secs(self.caption_timeout_secs)
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_secs(self.subscribe_timeout_secs)
    }

    /// Build Redis connection info from address, password and database index
    pub fn redis_connection_info(&self) -> Result<ConnectionInfo> {
        let (host, port) = self.redis_addr.rsplit_once(':').ok_or_else(|| {
            WorkerError::Config(format!(
                "{}REDIS_ADDR must be host:port, got '{}'",
                ENV_PREFIX, self.redis_addr
            ))
        })?;

        let port = port.parse::<u16>().map_err(|_| {
            WorkerError::Config(format!(
                "{}REDIS_ADDR has an invalid port '{}'",
                ENV_PREFIX, port
            ))
        })?;

        if host.is_empty() {
            return Err(WorkerError::Config(format!(
                "{}REDIS_ADDR has an empty host",
                ENV_PREFIX
            )));
        }

        let password = if self.redis_passwd.is_empty() {
            None
        } else {
            Some(self.redis_passwd.clone())
        };

        Ok(ConnectionInfo {
            addr: ConnectionAddr::Tcp(host.to_string(), port),
            redis: RedisConnectionInfo {
                db: self.redis_db,
                password,
                ..Default::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_pairs(pairs(&[("WORKER_CAPTION_KEY", "secret")])).unwrap();

        assert_eq!(config.caption_url, "https://api.deepai.org/api/neuraltalk");
        assert_eq!(config.redis_addr, "localhost:6379");
        assert_eq!(config.redis_passwd, "");
        assert_eq!(config.redis_db, 0);
        assert_eq!(config.redis_channel, "queue");
        assert_eq!(config.output_channel(), "queue");
        assert_eq!(config.dead_letter_channel(), None);
        assert_eq!(config.max_in_flight, 64);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.caption_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let err = Config::from_pairs(pairs(&[("WORKER_REDIS_CHANNEL", "photos")])).unwrap_err();
        assert!(matches!(err, WorkerError::Config(ref msg) if msg.contains("CAPTION_KEY")));

        let err = Config::from_pairs(pairs(&[("WORKER_CAPTION_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, WorkerError::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_pairs(pairs(&[
            ("WORKER_CAPTION_KEY", "secret"),
            ("WORKER_CAPTION_URL", "http://captions.local/api"),
            ("WORKER_REDIS_ADDR", "redis.internal:6380"),
            ("WORKER_REDIS_PASSWD", "hunter2"),
            ("WORKER_REDIS_DB", "3"),
            ("WORKER_REDIS_CHANNEL", "photos"),
            ("WORKER_OUTPUT_CHANNEL", "photos:captioned"),
            ("WORKER_DEAD_LETTER_CHANNEL", "photos:dlq"),
            ("WORKER_MAX_IN_FLIGHT", "8"),
            ("WORKER_FETCH_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.caption_url, "http://captions.local/api");
        assert_eq!(config.output_channel(), "photos:captioned");
        assert_eq!(config.dead_letter_channel(), Some("photos:dlq"));
        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));

        let info = config.redis_connection_info().unwrap();
        assert_eq!(info.redis.db, 3);
        assert_eq!(info.redis.password.as_deref(), Some("hunter2"));
        match info.addr {
            ConnectionAddr::Tcp(host, port) => {
                assert_eq!(host, "redis.internal");
                assert_eq!(port, 6380);
            }
            other => panic!("unexpected address {:?}", other),
        }
    }

    #[test]
    fn test_empty_optional_channels_fall_back() {
        let config = Config::from_pairs(pairs(&[
            ("WORKER_CAPTION_KEY", "secret"),
            ("WORKER_OUTPUT_CHANNEL", ""),
            ("WORKER_DEAD_LETTER_CHANNEL", ""),
        ]))
        .unwrap();

        assert_eq!(config.output_channel(), "queue");
        assert_eq!(config.dead_letter_channel(), None);
    }

    #[test]
    fn test_invalid_redis_addr() {
        let err = Config::from_pairs(pairs(&[
            ("WORKER_CAPTION_KEY", "secret"),
            ("WORKER_REDIS_ADDR", "localhost"),
        ]))
        .unwrap_err();
        assert!(matches!(err, WorkerError::Config(_)));

        let err = Config::from_pairs(pairs(&[
            ("WORKER_CAPTION_KEY", "secret"),
            ("WORKER_REDIS_ADDR", "localhost:redis"),
        ]))
        .unwrap_err();
        assert!(matches!(err, WorkerError::Config(_)));
    }

    #[test]
    fn test_log_format() {
        assert!(is_json_log_format(Some("json")));
        assert!(is_json_log_format(Some("JSON")));
        assert!(!is_json_log_format(Some("text")));
        assert!(!is_json_log_format(None));
    }

    #[test]
    fn test_zero_in_flight_rejected() {
        let err = Config::from_pairs(pairs(&[
            ("WORKER_CAPTION_KEY", "secret"),
            ("WORKER_MAX_IN_FLIGHT", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, WorkerError::Config(_)));
    }
}
