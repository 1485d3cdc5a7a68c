//! Runtime configuration, read from the environment.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `STOCK_LEDGER_UTC_OFFSET_MINUTES` | `0` | Local offset used to bound "today" in reports |
//! | `STOCK_LEDGER_STRICT_CATALOG` | `false` | Reject movements for products without terms |
//! | `DATABASE_URL` | unset | Postgres connection string (persistent store only) |

use chrono::{DateTime, Duration, FixedOffset, Offset, Timelike, Utc};
use thiserror::Error;

pub const UTC_OFFSET_VAR: &str = "STOCK_LEDGER_UTC_OFFSET_MINUTES";
pub const STRICT_CATALOG_VAR: &str = "STOCK_LEDGER_STRICT_CATALOG";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Offset of the business's local day from UTC.
    pub utc_offset: FixedOffset,
    /// When set, only products registered through `configure_product` accept movements.
    pub strict_catalog: bool,
    pub database_url: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
            strict_catalog: false,
            database_url: None,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment, or a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(UTC_OFFSET_VAR) {
            let minutes = raw.trim().parse::<i32>().map_err(|_| ConfigError::Invalid {
                key: UTC_OFFSET_VAR,
                value: raw.clone(),
                reason: "expected whole minutes",
            })?;
            config = config.with_utc_offset_minutes(minutes)?;
        }

        if let Some(raw) = lookup(STRICT_CATALOG_VAR) {
            config.strict_catalog = parse_flag(&raw).ok_or(ConfigError::Invalid {
                key: STRICT_CATALOG_VAR,
                value: raw.clone(),
                reason: "expected true or false",
            })?;
        }

        config.database_url = lookup(DATABASE_URL_VAR).filter(|url| !url.trim().is_empty());
        if config.database_url.is_none() {
            tracing::debug!("{DATABASE_URL_VAR} not set; only the in-memory store is available");
        }

        Ok(config)
    }

    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Result<Self, ConfigError> {
        self.utc_offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::Invalid {
                key: UTC_OFFSET_VAR,
                value: minutes.to_string(),
                reason: "offset must be within +/- 24 hours",
            })?;
        Ok(self)
    }

    pub fn with_strict_catalog(mut self, strict: bool) -> Self {
        self.strict_catalog = strict;
        self
    }

    /// The local calendar day containing `now`, as a half-open UTC range.
    pub fn today_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let local = now.with_timezone(&self.utc_offset);
        let since_midnight = Duration::seconds(i64::from(local.num_seconds_from_midnight()))
            + Duration::nanoseconds(i64::from(local.nanosecond()));
        let start = (local - since_midnight).with_timezone(&Utc);
        (start, start + Duration::days(1))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.utc_offset.local_minus_utc(), 0);
    }

    #[test]
    fn reads_offset_strict_flag_and_database_url() {
        let config = LedgerConfig::from_lookup(lookup(&[
            (UTC_OFFSET_VAR, "-180"),
            (STRICT_CATALOG_VAR, "TRUE"),
            (DATABASE_URL_VAR, "postgres://localhost/ledger"),
        ]))
        .unwrap();

        assert_eq!(config.utc_offset.local_minus_utc(), -180 * 60);
        assert!(config.strict_catalog);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/ledger"));
    }

    #[test]
    fn rejects_malformed_values() {
        let err = LedgerConfig::from_lookup(lookup(&[(UTC_OFFSET_VAR, "three hours")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: UTC_OFFSET_VAR, .. }));

        assert!(LedgerConfig::from_lookup(lookup(&[(UTC_OFFSET_VAR, "1500")])).is_err());
        assert!(LedgerConfig::from_lookup(lookup(&[(STRICT_CATALOG_VAR, "maybe")])).is_err());
    }

    #[test]
    fn today_window_in_utc() {
        let config = LedgerConfig::default();
        let now = Utc.with_ymd_and_hms(2024, 7, 15, 13, 45, 10).unwrap();
        let (start, end) = config.today_window(now);

        assert_eq!(start, Utc.with_ymd_and_hms(2024, 7, 15, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 7, 16, 0, 0, 0).unwrap());
    }

    #[test]
    fn today_window_follows_the_local_day() {
        // UTC-3: 01:30 UTC on the 15th is still 22:30 on the 14th locally.
        let config = LedgerConfig::default().with_utc_offset_minutes(-180).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 7, 15, 1, 30, 0).unwrap();
        let (start, end) = config.today_window(now);

        assert_eq!(start, Utc.with_ymd_and_hms(2024, 7, 14, 3, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 7, 15, 3, 0, 0).unwrap());
        assert!(start <= now && now < end);
    }
}
