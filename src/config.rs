//! Application configuration, loaded from the environment via figment.

use chrono_tz::Tz;
use figment::Figment;
use figment::providers::Env;
use fundu::DurationParser;
use serde::{Deserialize, Deserializer};
use std::num::NonZeroU32;
use std::time::Duration;

/// Base URL of the Performance API (dwells, headways, travel times, past alerts).
pub const DEFAULT_PERFORMANCE_API_URL: &str = "https://performanceapi.mbta.com/developer/api/v2.1";

/// Base URL of the V3 API used for seeding routes, stops and shapes.
pub const DEFAULT_V3_API_URL: &str = "https://api-v3.mbta.com";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,

    /// Credential sent as `api_key` on every Performance API request.
    pub performance_api_key: String,

    #[serde(default = "default_performance_api_url")]
    pub performance_api_url: String,

    #[serde(default = "default_v3_api_url")]
    pub v3_api_url: String,

    /// Optional V3 API key; anonymous requests are heavily rate limited upstream.
    #[serde(default)]
    pub v3_api_key: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Grace period for in-flight requests after a shutdown signal.
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,

    /// Upper bound for a single upstream request.
    #[serde(
        default = "default_upstream_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub upstream_timeout: Duration,

    /// Client-side request budget shared by every concurrent fetch task.
    #[serde(default = "default_upstream_requests_per_second")]
    pub upstream_requests_per_second: NonZeroU32,

    /// Operating timezone; "today" and the retention horizon are local midnights here.
    #[serde(default = "default_timezone", deserialize_with = "deserialize_timezone")]
    pub timezone: Tz,
}

impl Config {
    /// Read every key from the process environment (`DATABASE_URL`, `PORT`, ...).
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new().merge(Env::raw()).extract()
    }
}

fn default_performance_api_url() -> String {
    DEFAULT_PERFORMANCE_API_URL.to_owned()
}

fn default_v3_api_url() -> String {
    DEFAULT_V3_API_URL.to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_upstream_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_upstream_requests_per_second() -> NonZeroU32 {
    NonZeroU32::new(5).unwrap_or(NonZeroU32::MIN)
}

fn default_timezone() -> Tz {
    chrono_tz::America::New_York
}

/// Parse a human duration (`8s`, `1m`, `250ms`, bare numbers are seconds).
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let parsed = DurationParser::with_all_time_units()
        .parse(raw.trim())
        .map_err(|e| format!("invalid duration {raw:?}: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration {raw:?}: {e}"))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    // figment hands bare numbers through as integers, everything else as strings.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

fn deserialize_timezone<'de, D>(deserializer: D) -> Result<Tz, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse::<Tz>()
        .map_err(|e| serde::de::Error::custom(format!("invalid timezone {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;
    use serde_json::json;

    fn extract(values: serde_json::Value) -> Result<Config, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(values))
            .extract()
    }

    #[test]
    fn test_defaults_applied() {
        let config = extract(json!({
            "database_url": "postgres://localhost/perf",
            "performance_api_key": "secret",
        }))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.performance_api_url, DEFAULT_PERFORMANCE_API_URL);
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));
        assert_eq!(config.upstream_requests_per_second.get(), 5);
        assert_eq!(config.timezone, chrono_tz::America::New_York);
        assert!(config.v3_api_key.is_none());
    }

    #[test]
    fn test_duration_and_timezone_overrides() {
        let config = extract(json!({
            "database_url": "postgres://localhost/perf",
            "performance_api_key": "secret",
            "shutdown_timeout": "1m",
            "upstream_timeout": 12,
            "timezone": "America/Chicago",
        }))
        .unwrap();

        assert_eq!(config.shutdown_timeout, Duration::from_secs(60));
        assert_eq!(config.upstream_timeout, Duration::from_secs(12));
        assert_eq!(config.timezone, chrono_tz::America::Chicago);
    }

    #[test]
    fn test_missing_credential_rejected() {
        let result = extract(json!({ "database_url": "postgres://localhost/perf" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_timezone_rejected() {
        let result = extract(json!({
            "database_url": "postgres://localhost/perf",
            "performance_api_key": "secret",
            "timezone": "Mars/Olympus_Mons",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("5").unwrap(), Duration::from_secs(5));
        assert!(parse_duration("soon").is_err());
    }
}
