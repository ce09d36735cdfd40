// Application configuration, loaded from environment variables and CLI flags.

use std::time::Duration;

use crate::competition::ActiveLimits;
use crate::snapshot::CaptureSettings;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Seconds between lifecycle ticks.
    pub lifecycle_interval: Duration,
    /// Upper bound on a single statistics lookup.
    pub stats_timeout: Duration,
    /// Statistics lookups in flight per competition.
    pub capture_concurrency: usize,
    pub max_active_per_owner: i64,
    pub max_active_per_server: i64,
    /// Relay that posts announcements to chat. Log-only when unset.
    pub notify_webhook_url: Option<String>,
    /// Run one lifecycle tick and exit.
    pub run_once: bool,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:competitions.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `LIFECYCLE_INTERVAL_SECS` - tick period (default: 60)
    /// - `STATS_TIMEOUT_SECS` - per-lookup timeout (default: 10)
    /// - `CAPTURE_CONCURRENCY` - parallel lookups per competition (default: 8)
    /// - `MAX_ACTIVE_PER_OWNER` / `MAX_ACTIVE_PER_SERVER` - creation caps (default: 1 / 2)
    /// - `NOTIFY_WEBHOOK_URL` - announcement relay
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    /// - `--once` - Run a single lifecycle tick and exit
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let database_url = env("DATABASE_URL")
            .unwrap_or_else(|| "sqlite:competitions.db?mode=rwc".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env("PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(3000);

        let number = |key: &str, default: u64| -> u64 {
            env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
        };

        Config {
            database_url,
            port,
            lifecycle_interval: Duration::from_secs(number("LIFECYCLE_INTERVAL_SECS", 60).max(1)),
            stats_timeout: Duration::from_secs(number("STATS_TIMEOUT_SECS", 10).max(1)),
            capture_concurrency: number("CAPTURE_CONCURRENCY", 8).max(1) as usize,
            max_active_per_owner: number("MAX_ACTIVE_PER_OWNER", 1) as i64,
            max_active_per_server: number("MAX_ACTIVE_PER_SERVER", 2) as i64,
            notify_webhook_url: env("NOTIFY_WEBHOOK_URL").filter(|v| !v.is_empty()),
            run_once: args.iter().any(|a| a == "--once"),
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            lookup_timeout: self.stats_timeout,
            concurrency: self.capture_concurrency,
        }
    }

    pub fn active_limits(&self) -> ActiveLimits {
        ActiveLimits {
            per_owner: self.max_active_per_owner,
            per_server: self.max_active_per_server,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(args: &[&str], env: &[(&str, &str)]) -> Config {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_sources(&args, |key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&["scout-competitions"], &[]);
        assert_eq!(config.database_url, "sqlite:competitions.db?mode=rwc");
        assert_eq!(config.port, 3000);
        assert_eq!(config.lifecycle_interval, Duration::from_secs(60));
        assert_eq!(config.stats_timeout, Duration::from_secs(10));
        assert_eq!(config.capture_concurrency, 8);
        assert_eq!(config.max_active_per_owner, 1);
        assert_eq!(config.max_active_per_server, 2);
        assert!(config.notify_webhook_url.is_none());
        assert!(!config.run_once);
    }

    #[test]
    fn test_cli_port_overrides_env() {
        let config = load(
            &["scout-competitions", "--port", "8081", "--once"],
            &[("PORT", "9000"), ("NOTIFY_WEBHOOK_URL", "http://relay/notify")],
        );
        assert_eq!(config.port, 8081);
        assert!(config.run_once);
        assert_eq!(
            config.notify_webhook_url.as_deref(),
            Some("http://relay/notify")
        );
    }

    #[test]
    fn test_garbage_values_fall_back() {
        let config = load(
            &["scout-competitions"],
            &[("PORT", "nope"), ("CAPTURE_CONCURRENCY", "0"), ("STATS_TIMEOUT_SECS", "x")],
        );
        assert_eq!(config.port, 3000);
        assert_eq!(config.capture_concurrency, 1);
        assert_eq!(config.stats_timeout, Duration::from_secs(10));
    }
}
