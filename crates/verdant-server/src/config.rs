use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use verdant_gateway::Heartbeat;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// Ten years. Tokens outliving that are a misconfiguration.
const MAX_TOKEN_TTL_DAYS: u64 = 3650;

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl: chrono::Duration,
    /// `None` disables the reaper.
    pub reaper_interval: Option<Duration>,
    pub reaper_retention: chrono::Duration,
    pub heartbeat: Heartbeat,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("VERDANT_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("VERDANT_JWT_SECRET is unset or still a placeholder; set it in .env and restart");
        }

        let number = |key: &str, default: u64| -> anyhow::Result<u64> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a non-negative integer, got {:?}", key, raw)),
                None => Ok(default),
            }
        };

        let port = number("VERDANT_PORT", 3000)?;
        let port = u16::try_from(port).context("VERDANT_PORT is out of range")?;
        let ttl_days = number("VERDANT_TOKEN_TTL_DAYS", 30)?;
        if ttl_days == 0 || ttl_days > MAX_TOKEN_TTL_DAYS {
            bail!(
                "VERDANT_TOKEN_TTL_DAYS must be between 1 and {}, got {}",
                MAX_TOKEN_TTL_DAYS,
                ttl_days
            );
        }
        let token_ttl = i64::try_from(ttl_days)
            .ok()
            .and_then(chrono::Duration::try_days)
            .context("VERDANT_TOKEN_TTL_DAYS is out of range")?;

        let interval_secs = number("VERDANT_REAPER_INTERVAL_SECS", 3600)?;
        let retention_hours = number("VERDANT_REAPER_RETENTION_HOURS", 168)?;
        let reaper_retention = i64::try_from(retention_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .context("VERDANT_REAPER_RETENTION_HOURS is out of range")?;

        let heartbeat_secs = number("VERDANT_HEARTBEAT_SECS", 15)?;
        if heartbeat_secs == 0 {
            bail!("VERDANT_HEARTBEAT_SECS must be at least 1");
        }
        let max_missed = number("VERDANT_HEARTBEAT_MAX_MISSED", 2)?;
        let max_missed = u8::try_from(max_missed)
            .ok()
            .filter(|n| *n > 0)
            .context("VERDANT_HEARTBEAT_MAX_MISSED must be between 1 and 255")?;

        Ok(Self {
            jwt_secret,
            db_path: lookup("VERDANT_DB_PATH")
                .unwrap_or_else(|| "verdant.db".into())
                .into(),
            host: lookup("VERDANT_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            token_ttl,
            reaper_interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            reaper_retention,
            heartbeat: Heartbeat {
                interval: Duration::from_secs(heartbeat_secs),
                max_missed,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[("VERDANT_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.db_path, PathBuf::from("verdant.db"));
        assert_eq!(cfg.token_ttl, chrono::Duration::days(30));
        assert_eq!(cfg.reaper_interval, Some(Duration::from_secs(3600)));
        assert_eq!(cfg.reaper_retention, chrono::Duration::hours(168));
        assert_eq!(cfg.heartbeat, Heartbeat::default());
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        assert!(config(&[]).is_err());
        assert!(config(&[("VERDANT_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn zero_interval_disables_reaper() {
        let cfg = config(&[
            ("VERDANT_JWT_SECRET", "s3cret"),
            ("VERDANT_REAPER_INTERVAL_SECS", "0"),
            ("VERDANT_PORT", "8080"),
        ])
        .unwrap();
        assert_eq!(cfg.reaper_interval, None);
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn bad_numbers_are_errors() {
        assert!(config(&[("VERDANT_JWT_SECRET", "s3cret"), ("VERDANT_PORT", "http")]).is_err());
        assert!(config(&[("VERDANT_JWT_SECRET", "s3cret"), ("VERDANT_PORT", "70000")]).is_err());
    }

    #[test]
    fn out_of_range_durations_are_errors() {
        for (key, value) in [
            ("VERDANT_TOKEN_TTL_DAYS", "18446744073709551615"),
            ("VERDANT_TOKEN_TTL_DAYS", "9223372036854775807"),
            ("VERDANT_TOKEN_TTL_DAYS", "0"),
            ("VERDANT_REAPER_RETENTION_HOURS", "18446744073709551615"),
            ("VERDANT_REAPER_RETENTION_HOURS", "9223372036854775807"),
        ] {
            assert!(
                config(&[("VERDANT_JWT_SECRET", "s3cret"), (key, value)]).is_err(),
                "{}={} should be rejected",
                key,
                value
            );
        }

        let cfg = config(&[
            ("VERDANT_JWT_SECRET", "s3cret"),
            ("VERDANT_TOKEN_TTL_DAYS", "3650"),
        ])
        .unwrap();
        assert_eq!(cfg.token_ttl, chrono::Duration::days(3650));

        for value in ["0", "256"] {
            assert!(
                config(&[
                    ("VERDANT_JWT_SECRET", "s3cret"),
                    ("VERDANT_HEARTBEAT_MAX_MISSED", value)
                ])
                .is_err()
            );
        }
        assert!(config(&[("VERDANT_JWT_SECRET", "s3cret"), ("VERDANT_HEARTBEAT_SECS", "0")]).is_err());
    }
}
