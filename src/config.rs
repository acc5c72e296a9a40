//! Engine settings from the environment (and `.env`), overridable on the
//! command line.

use std::time::Duration;

use thiserror::Error;

pub const ENV_SLOTS: &str = "VAMP_SLOTS";
pub const ENV_TICK_MS: &str = "VAMP_TICK_MS";
pub const ENV_EXCLUSIVE: &str = "VAMP_EXCLUSIVE";

const MAX_SLOTS: usize = 64;
const TICK_MS_RANGE: std::ops::RangeInclusive<u64> = 5..=1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{key} must be {expected}, got {value:?}")]
pub struct SettingError {
    pub key: &'static str,
    pub expected: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Slots on a fresh board.
    pub slot_count: usize,
    /// Scheduler resolution.
    pub tick_interval: Duration,
    /// Starting one slot stops the others.
    pub exclusive_playback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slot_count: 5,
            tick_interval: Duration::from_millis(50),
            exclusive_playback: true,
        }
    }
}

impl EngineConfig {
    /// Reads `VAMP_*` variables, loading `.env` from the working directory first.
    pub fn from_env() -> Result<Self, SettingError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingError> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_SLOTS) {
            config.slot_count = parse_slots(&raw)?;
        }
        if let Some(raw) = lookup(ENV_TICK_MS) {
            config.tick_interval = parse_tick_ms(&raw)?;
        }
        if let Some(raw) = lookup(ENV_EXCLUSIVE) {
            config.exclusive_playback = parse_flag(ENV_EXCLUSIVE, &raw)?;
        }
        Ok(config)
    }

    /// Half a tick: a loop may wrap this early and still land on time.
    pub fn lookahead(&self) -> Duration {
        self.tick_interval / 2
    }
}

pub fn parse_slots(raw: &str) -> Result<usize, SettingError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if (1..=MAX_SLOTS).contains(&n) => Ok(n),
        _ => Err(SettingError {
            key: ENV_SLOTS,
            expected: "a slot count between 1 and 64",
            value: raw.to_string(),
        }),
    }
}

pub fn parse_tick_ms(raw: &str) -> Result<Duration, SettingError> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if TICK_MS_RANGE.contains(&ms) => Ok(Duration::from_millis(ms)),
        _ => Err(SettingError {
            key: ENV_TICK_MS,
            expected: "milliseconds between 5 and 1000",
            value: raw.to_string(),
        }),
    }
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, SettingError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingError {
            key,
            expected: "true or false",
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = EngineConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.lookahead(), Duration::from_millis(25));
    }

    #[test]
    fn env_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_SLOTS, "8"),
            (ENV_TICK_MS, "20"),
            (ENV_EXCLUSIVE, "off"),
        ]))
        .expect("config");
        assert_eq!(config.slot_count, 8);
        assert_eq!(config.tick_interval, Duration::from_millis(20));
        assert!(!config.exclusive_playback);
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = EngineConfig::from_lookup(lookup(&[(ENV_TICK_MS, "2")])).unwrap_err();
        assert_eq!(err.key, ENV_TICK_MS);
        assert!(parse_slots("0").is_err());
        assert!(parse_slots("65").is_err());
        assert!(EngineConfig::from_lookup(lookup(&[(ENV_EXCLUSIVE, "maybe")])).is_err());
    }
}
