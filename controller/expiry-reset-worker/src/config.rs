//! Configuration for the expiry reset worker

use crate::subscriber::ReconnectPolicy;
use clap::Parser;
use std::env;
use std::time::Duration;

/// Counter key watched when `COUNTER_KEY` is unset
pub const DEFAULT_COUNTER_KEY: &str = "contador_reset";

/// Configuration for the expiry reset worker
#[derive(Debug, Clone, Parser)]
#[command(name = "expiry-reset-worker")]
#[command(about = "Calls the backend reset endpoint when the watched Redis key expires")]
pub struct Config {
    /// Redis host
    #[arg(long, env)]
    pub redis_host: String,

    /// Redis port
    #[arg(long, env)]
    pub redis_port: u16,

    /// Redis password (empty or unset connects without AUTH)
    #[arg(long, env, hide_env_values = true)]
    pub redis_password: Option<String>,

    /// Reset endpoint URL (HTTP POST target)
    #[arg(long, env)]
    pub reset_endpoint_url: String,

    /// Shared secret sent in the x-secret header
    #[arg(long, env, hide_env_values = true)]
    pub reset_secret: String,

    /// Key whose expiration triggers the reset
    #[arg(long, env, default_value = DEFAULT_COUNTER_KEY)]
    pub counter_key: String,

    /// Reset call timeout in seconds (unset uses the HTTP client default)
    #[arg(long, env)]
    pub reset_timeout_secs: Option<u64>,

    /// Only react to expirations in this database index (unset matches any)
    #[arg(long, env)]
    pub expired_db_index: Option<u32>,

    /// Never run two reset calls at the same time
    #[arg(long, env)]
    pub serialize_resets: bool,

    /// Upper bound for the reconnect delay in milliseconds
    #[arg(long, env, default_value_t = 2000)]
    pub reconnect_max_delay_ms: u64,

    /// Output logs in JSON format
    #[arg(long, env)]
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_host: env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            redis_port: env::var("REDIS_PORT")
                .unwrap_or_else(|_| "6379".to_string())
                .parse()
                .unwrap_or(6379),
            redis_password: env::var("REDIS_PASSWORD").ok(),
            reset_endpoint_url: env::var("RESET_ENDPOINT_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8080/reset".to_string()),
            reset_secret: env::var("RESET_SECRET").unwrap_or_default(),
            counter_key: env::var("COUNTER_KEY")
                .unwrap_or_else(|_| DEFAULT_COUNTER_KEY.to_string()),
            reset_timeout_secs: env::var("RESET_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
            expired_db_index: env::var("EXPIRED_DB_INDEX")
                .ok()
                .and_then(|s| s.parse().ok()),
            serialize_resets: env::var("SERIALIZE_RESETS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            reconnect_max_delay_ms: env::var("RECONNECT_MAX_DELAY_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2000),
            log_json: env::var("LOG_JSON")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
        }
    }
}

impl Config {
    /// Parse configuration from command-line args and environment variables
    pub fn parse_config() -> Self {
        Config::parse()
    }

    /// Connection target for both the command and the pub/sub connection
    pub fn redis_connection_info(&self) -> redis::ConnectionInfo {
        redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(self.redis_host.clone(), self.redis_port),
            redis: redis::RedisConnectionInfo {
                password: self.redis_password.clone().filter(|p| !p.is_empty()),
                ..Default::default()
            },
        }
    }

    pub fn reset_timeout(&self) -> Option<Duration> {
        self.reset_timeout_secs.map(Duration::from_secs)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(Duration::from_millis(self.reconnect_max_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_KEYS: [&str; 6] = [
        "REDIS_HOST",
        "REDIS_PORT",
        "COUNTER_KEY",
        "EXPIRED_DB_INDEX",
        "SERIALIZE_RESETS",
        "RECONNECT_MAX_DELAY_MS",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            env::remove_var(key);
        }
    }

    fn test_config() -> Config {
        Config {
            redis_host: "redis.internal".to_string(),
            redis_port: 6380,
            redis_password: None,
            reset_endpoint_url: "http://backend:8080/reset".to_string(),
            reset_secret: "s3cret".to_string(),
            counter_key: DEFAULT_COUNTER_KEY.to_string(),
            reset_timeout_secs: None,
            expired_db_index: None,
            serialize_resets: false,
            reconnect_max_delay_ms: 2000,
            log_json: false,
        }
    }

    #[test]
    fn test_connection_info_without_password() {
        let info = test_config().redis_connection_info();
        match info.addr {
            redis::ConnectionAddr::Tcp(host, port) => {
                assert_eq!(host, "redis.internal");
                assert_eq!(port, 6380);
            }
            other => panic!("unexpected address {:?}", other),
        }
        assert!(info.redis.password.is_none());
    }

    #[test]
    fn test_empty_password_means_no_auth() {
        let mut config = test_config();
        config.redis_password = Some(String::new());
        assert!(config.redis_connection_info().redis.password.is_none());

        config.redis_password = Some("hunter2".to_string());
        assert_eq!(
            config.redis_connection_info().redis.password.as_deref(),
            Some("hunter2")
        );
    }

    #[test]
    #[serial]
    fn test_counter_key_defaults_when_unset() {
        clear_env();
        let config = Config::try_parse_from([
            "expiry-reset-worker",
            "--redis-host",
            "localhost",
            "--redis-port",
            "6379",
            "--reset-endpoint-url",
            "http://localhost/reset",
            "--reset-secret",
            "abc",
        ])
        .unwrap();

        assert_eq!(config.counter_key, DEFAULT_COUNTER_KEY);
        assert_eq!(config.reconnect_max_delay_ms, 2000);
        assert!(config.expired_db_index.is_none());
        assert!(!config.serialize_resets);
    }

    #[test]
    #[serial]
    fn test_default_falls_back_without_env() {
        clear_env();
        let config = Config::default();

        assert_eq!(config.redis_host, "127.0.0.1");
        assert_eq!(config.redis_port, 6379);
        assert_eq!(config.counter_key, DEFAULT_COUNTER_KEY);
        assert_eq!(config.expired_db_index, None);
        assert!(!config.serialize_resets);
        assert_eq!(config.reconnect_max_delay_ms, 2000);
    }

    #[test]
    #[serial]
    fn test_default_reads_env() {
        clear_env();
        env::set_var("REDIS_HOST", "cache");
        env::set_var("REDIS_PORT", "6390");
        env::set_var("COUNTER_KEY", "daily_counter");
        env::set_var("EXPIRED_DB_INDEX", "2");
        env::set_var("SERIALIZE_RESETS", "true");
        env::set_var("RECONNECT_MAX_DELAY_MS", "not-a-number");

        let config = Config::default();
        clear_env();

        assert_eq!(config.redis_host, "cache");
        assert_eq!(config.redis_port, 6390);
        assert_eq!(config.counter_key, "daily_counter");
        assert_eq!(config.expired_db_index, Some(2));
        assert!(config.serialize_resets);
        // unparsable values fall back
        assert_eq!(config.reconnect_max_delay_ms, 2000);
    }

    #[test]
    fn test_reset_timeout_is_optional() {
        let mut config = test_config();
        assert_eq!(config.reset_timeout(), None);

        config.reset_timeout_secs = Some(5);
        assert_eq!(config.reset_timeout(), Some(Duration::from_secs(5)));
    }
}
