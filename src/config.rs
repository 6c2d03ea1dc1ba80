//! Process configuration read from the environment at startup

use crate::cost::{CostModel, DEFAULT_USD_TO_EUR_RATE};
use crate::runtime::{RetryPolicy, RuntimeSettings};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub usd_to_eur_rate: f64,
    pub turn_delay: Duration,
    pub generation_timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(None),
            port: 8000,
            usd_to_eur_rate: DEFAULT_USD_TO_EUR_RATE,
            turn_delay: Duration::from_millis(1000),
            generation_timeout: Duration::from_secs(120),
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values keep defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            db_path: lookup("DUET_DB_PATH")
                .map_or_else(|| default_db_path(lookup("HOME")), PathBuf::from),
            port: parsed(&lookup, "DUET_PORT").unwrap_or(defaults.port),
            usd_to_eur_rate: parsed(&lookup, "DUET_USD_TO_EUR_RATE")
                .filter(|rate: &f64| rate.is_finite() && *rate > 0.0)
                .unwrap_or(defaults.usd_to_eur_rate),
            turn_delay: parsed(&lookup, "DUET_TURN_DELAY_MS")
                .map_or(defaults.turn_delay, Duration::from_millis),
            generation_timeout: parsed(&lookup, "DUET_GENERATION_TIMEOUT_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map_or(defaults.generation_timeout, Duration::from_secs),
            max_tokens: parsed(&lookup, "DUET_MAX_TOKENS").unwrap_or(defaults.max_tokens),
            temperature: parsed(&lookup, "DUET_TEMPERATURE").unwrap_or(defaults.temperature),
        }
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            turn_delay: self.turn_delay,
            generation_timeout: self.generation_timeout,
            retry: RetryPolicy::default(),
            cost_model: CostModel::new(self.usd_to_eur_rate),
        }
    }
}

fn default_db_path(home: Option<String>) -> PathBuf {
    let home = home.unwrap_or_else(|| "/tmp".to_string());
    PathBuf::from(home).join(".duet").join("duet.db")
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = lookup(key)?;
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(key, value = %value, "Ignoring unparsable setting");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("HOME", "/home/duet")]);
        assert_eq!(config.db_path, PathBuf::from("/home/duet/.duet/duet.db"));
        assert_eq!(config.port, 8000);
        assert_eq!(config.turn_delay, Duration::from_secs(1));
        assert_eq!(config.generation_timeout, Duration::from_secs(120));
        assert_eq!(config.max_tokens, 1000);
        assert!((config.usd_to_eur_rate - 0.92).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("DUET_DB_PATH", "/data/x.db"),
            ("DUET_PORT", "9001"),
            ("DUET_USD_TO_EUR_RATE", "0.85"),
            ("DUET_TURN_DELAY_MS", "0"),
            ("DUET_TEMPERATURE", "1.2"),
        ]);
        assert_eq!(config.db_path, PathBuf::from("/data/x.db"));
        assert_eq!(config.port, 9001);
        assert_eq!(config.turn_delay, Duration::ZERO);
        assert!((config.runtime_settings().cost_model.usd_to_eur_rate() - 0.85).abs() < 1e-12);
        assert!((config.temperature - 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_every_typed_setting_is_read() {
        let config = config(&[
            ("DUET_PORT", " 8080 "),
            ("DUET_USD_TO_EUR_RATE", "1.1"),
            ("DUET_TURN_DELAY_MS", "250"),
            ("DUET_GENERATION_TIMEOUT_SECS", "30"),
            ("DUET_MAX_TOKENS", "512"),
            ("DUET_TEMPERATURE", "0.2"),
        ]);
        assert_eq!(config.port, 8080);
        assert!((config.usd_to_eur_rate - 1.1).abs() < 1e-12);
        assert_eq!(config.turn_delay, Duration::from_millis(250));
        assert_eq!(config.generation_timeout, Duration::from_secs(30));
        assert_eq!(config.max_tokens, 512);
        assert!((config.temperature - 0.2).abs() < 1e-6);

        let settings = config.runtime_settings();
        assert_eq!(settings.turn_delay, Duration::from_millis(250));
        assert_eq!(settings.generation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = config(&[
            ("DUET_PORT", "http"),
            ("DUET_USD_TO_EUR_RATE", "-1"),
            ("DUET_GENERATION_TIMEOUT_SECS", "0"),
        ]);
        assert_eq!(config.port, 8000);
        assert!((config.usd_to_eur_rate - DEFAULT_USD_TO_EUR_RATE).abs() < f64::EPSILON);
        assert_eq!(config.generation_timeout, Duration::from_secs(120));
    }
}
