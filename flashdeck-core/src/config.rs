//! Configuration types

use crate::constants::{
    DEFAULT_CACHE_TIME_MS, ENV_CACHE_TIME_MS, ENV_SWEEP_INTERVAL_MS, MAX_RETENTION_MS,
};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long an abandoned entity may stay cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Retention {
    /// Evict once abandoned for longer than this.
    After(Duration),
    /// Never evicted by the sweep, e.g. the signed-in user's profile.
    Forever,
}

impl Retention {
    pub fn is_forever(&self) -> bool {
        matches!(self, Self::Forever)
    }
}

/// Process-wide configuration of the entity client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Default survival time of an entity after its last leasee released it.
    pub cache_time: Duration,
    /// How often the sweeper runs. `None` ties it to `cache_time`.
    pub sweep_interval: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache_time: Duration::from_millis(DEFAULT_CACHE_TIME_MS),
            sweep_interval: None,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default cache time.
    pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    /// Set an explicit sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// The interval the sweeper actually ticks at.
    pub fn effective_sweep_interval(&self) -> Duration {
        self.sweep_interval.unwrap_or(self.cache_time)
    }

    /// Default retention for leases without their own override.
    pub fn default_retention(&self) -> Retention {
        Retention::After(self.cache_time)
    }

    /// Create ClientConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `FLASHDECK_CACHE_TIME_MS`: default cache time (default: 300000)
    /// - `FLASHDECK_SWEEP_INTERVAL_MS`: sweep interval (default: cache time)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_CACHE_TIME_MS) {
            config.cache_time = parse_millis(ENV_CACHE_TIME_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SWEEP_INTERVAL_MS) {
            config.sweep_interval = Some(parse_millis(ENV_SWEEP_INTERVAL_MS, &raw)?);
        }
        config.validate()?;
        Ok(config)
    }

    /// Both durations must be non-zero and at most [`MAX_RETENTION_MS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_duration("cache_time", self.cache_time)?;
        if let Some(interval) = self.sweep_interval {
            check_duration("sweep_interval", interval)?;
        }
        Ok(())
    }
}

fn check_duration(field: &str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    if value > Duration::from_millis(MAX_RETENTION_MS) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("must be at most {MAX_RETENTION_MS} ms"),
        });
    }
    Ok(())
}

fn parse_millis(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    let millis: u64 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        reason: format!("{}: {:?}", e, raw),
    })?;
    if millis == 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.cache_time, Duration::from_millis(300_000));
        assert_eq!(config.effective_sweep_interval(), config.cache_time);
        assert_eq!(
            config.default_retention(),
            Retention::After(Duration::from_millis(300_000))
        );
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (ENV_CACHE_TIME_MS, "1000"),
            (ENV_SWEEP_INTERVAL_MS, "250"),
        ]))
        .unwrap();
        assert_eq!(config.cache_time, Duration::from_secs(1));
        assert_eq!(config.effective_sweep_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = ClientConfig::from_lookup(lookup_from(&[(ENV_CACHE_TIME_MS, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == ENV_CACHE_TIME_MS));
    }

    #[test]
    fn test_zero_values_rejected() {
        assert!(ClientConfig::from_lookup(lookup_from(&[(ENV_SWEEP_INTERVAL_MS, "0")])).is_err());
        assert!(ClientConfig::new()
            .with_cache_time(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_oversized_values_rejected() {
        let too_long = Duration::from_millis(MAX_RETENTION_MS + 1);
        let err = ClientConfig::new().with_sweep_interval(too_long).validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "sweep_interval")
        );
        assert!(ClientConfig::new().with_cache_time(too_long).validate().is_err());
        assert!(ClientConfig::new()
            .with_cache_time(Duration::from_millis(MAX_RETENTION_MS))
            .validate()
            .is_ok());
    }
}
