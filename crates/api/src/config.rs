//! Application configuration loaded from environment variables.

use std::time::Duration;

use message::RetryPolicy;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server and runtime configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DOMAIN_CONTEXT`: context given to registrations that leave it empty
///   (default: `"default"`)
/// - `BUS_RETRY_DELAY_MS`: pause between redeliveries (default: `1000`)
/// - `BUS_MAX_ATTEMPTS`: delivery attempts before giving up (default: unset,
///   retry indefinitely)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub domain_context: String,
    pub bus_retry_delay: Duration,
    pub bus_max_attempts: Option<u32>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: std::env::var("LOG_FORMAT")
                .map(|value| LogFormat::parse(&value))
                .unwrap_or(defaults.log_format),
            domain_context: std::env::var("DOMAIN_CONTEXT")
                .ok()
                .filter(|context| !context.is_empty())
                .unwrap_or(defaults.domain_context),
            bus_retry_delay: parsed("BUS_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.bus_retry_delay),
            bus_max_attempts: parsed("BUS_MAX_ATTEMPTS").or(defaults.bus_max_attempts),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the redelivery policy for the message bus.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.bus_max_attempts {
            Some(max_attempts) => RetryPolicy::bounded(max_attempts, self.bus_retry_delay),
            None => RetryPolicy::indefinite(self.bus_retry_delay),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            domain_context: "default".to_string(),
            bus_retry_delay: Duration::from_millis(1000),
            bus_max_attempts: None,
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    const KEYS: [&str; 7] = [
        "HOST",
        "PORT",
        "RUST_LOG",
        "LOG_FORMAT",
        "DOMAIN_CONTEXT",
        "BUS_RETRY_DELAY_MS",
        "BUS_MAX_ATTEMPTS",
    ];

    fn clear_env() {
        for key in KEYS {
            // SAFETY: env tests are serialized with `#[serial]`.
            unsafe { std::env::remove_var(key) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: env tests are serialized with `#[serial]`.
        unsafe { std::env::set_var(key, value) };
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.domain_context, "default");
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    #[serial]
    fn test_from_env_without_variables() {
        clear_env();
        let config = Config::from_env();
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.bus_max_attempts, None);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_variables() {
        clear_env();
        set_env("PORT", "8081");
        set_env("LOG_FORMAT", "JSON");
        set_env("DOMAIN_CONTEXT", "billing");
        set_env("BUS_RETRY_DELAY_MS", "5");
        set_env("BUS_MAX_ATTEMPTS", "3");

        let config = Config::from_env();
        clear_env();

        assert_eq!(config.port, 8081);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.domain_context, "billing");
        assert_eq!(
            config.retry_policy(),
            RetryPolicy::bounded(3, Duration::from_millis(5))
        );
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_invalid_values() {
        clear_env();
        set_env("PORT", "not-a-port");
        set_env("BUS_MAX_ATTEMPTS", "-1");
        set_env("DOMAIN_CONTEXT", "");

        let config = Config::from_env();
        clear_env();

        assert_eq!(config.port, 3000);
        assert_eq!(config.bus_max_attempts, None);
        assert_eq!(config.domain_context, "default");
    }
}
