use chrono::{FixedOffset, Offset, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    DynamoDb {
        table_name: String,
        station_table_name: String,
    },
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    pub store: StoreBackend,
    /// Compact the pending set when a car withdraws a pending entry.
    pub renumber_on_withdraw: bool,
    pub max_commit_attempts: u32,
    pub retry_base_delay: Duration,
    /// Offset used to find the station-local day for daily stats.
    pub station_utc_offset: FixedOffset,
    pub minutes_per_car: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            store: StoreBackend::Memory,
            renumber_on_withdraw: true,
            max_commit_attempts: 5,
            retry_base_delay: Duration::from_millis(25),
            station_utc_offset: Utc.fix(),
            minutes_per_car: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(String),
    Invalid { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} environment variable must be set", key),
            ConfigError::Invalid { key, value } => {
                write!(f, "Invalid value for {}: {}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl CoordinatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = CoordinatorConfig::default();

        let store = match lookup("QUEUE_STORE").as_deref() {
            None | Some("dynamodb") => StoreBackend::DynamoDb {
                table_name: required(&lookup, "FUEL_QUEUE_TABLE")?,
                station_table_name: required(&lookup, "STATION_QUEUE_TABLE")?,
            },
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "QUEUE_STORE".to_string(),
                    value: other.to_string(),
                })
            }
        };

        let offset_minutes: i32 = parse_or(&lookup, "STATION_UTC_OFFSET_MINUTES", 0)?;
        let station_utc_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::Invalid {
                key: "STATION_UTC_OFFSET_MINUTES".to_string(),
                value: offset_minutes.to_string(),
            })?;

        let max_commit_attempts =
            parse_or(&lookup, "MAX_COMMIT_ATTEMPTS", defaults.max_commit_attempts)?;
        if max_commit_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_COMMIT_ATTEMPTS".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(CoordinatorConfig {
            store,
            renumber_on_withdraw: parse_flag(
                &lookup,
                "RENUMBER_ON_WITHDRAW",
                defaults.renumber_on_withdraw,
            )?,
            max_commit_attempts,
            retry_base_delay: Duration::from_millis(parse_or(
                &lookup,
                "RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )?),
            station_utc_offset,
            minutes_per_car: parse_or(&lookup, "MINUTES_PER_CAR", defaults.minutes_per_car)?,
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn parse_flag<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Shared, observable configuration. Clones point at the same value;
/// `update` is visible to every holder on its next read and wakes
/// `subscribe` receivers.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    sender: Arc<watch::Sender<CoordinatorConfig>>,
}

impl ConfigHandle {
    pub fn new(config: CoordinatorConfig) -> Self {
        let (sender, _) = watch::channel(config);
        ConfigHandle {
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> CoordinatorConfig {
        self.sender.borrow().clone()
    }

    pub fn update<F>(&self, modify: F)
    where
        F: FnOnce(&mut CoordinatorConfig),
    {
        self.sender.send_modify(modify);
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorConfig> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| values.get(key).cloned()
    }

    #[test]
    fn test_memory_store_with_defaults() {
        let config = CoordinatorConfig::from_lookup(lookup_from(&[("QUEUE_STORE", "memory")]))
            .unwrap();

        assert_eq!(config.store, StoreBackend::Memory);
        assert!(config.renumber_on_withdraw);
        assert_eq!(config.max_commit_attempts, 5);
        assert_eq!(config.minutes_per_car, 5);
        assert_eq!(config.station_utc_offset.local_minus_utc(), 0);
    }

    #[test]
    fn test_dynamodb_store_requires_tables() {
        let result = CoordinatorConfig::from_lookup(lookup_from(&[("FUEL_QUEUE_TABLE", "q")]));
        assert_eq!(
            result.unwrap_err(),
            ConfigError::Missing("STATION_QUEUE_TABLE".to_string())
        );

        let config = CoordinatorConfig::from_lookup(lookup_from(&[
            ("FUEL_QUEUE_TABLE", "fuel_queue"),
            ("STATION_QUEUE_TABLE", "fuel_queue_stations"),
            ("RENUMBER_ON_WITHDRAW", "false"),
            ("STATION_UTC_OFFSET_MINUTES", "180"),
        ]))
        .unwrap();
        assert_eq!(
            config.store,
            StoreBackend::DynamoDb {
                table_name: "fuel_queue".to_string(),
                station_table_name: "fuel_queue_stations".to_string(),
            }
        );
        assert!(!config.renumber_on_withdraw);
        assert_eq!(config.station_utc_offset.local_minus_utc(), 180 * 60);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let result = CoordinatorConfig::from_lookup(lookup_from(&[
            ("QUEUE_STORE", "memory"),
            ("MAX_COMMIT_ATTEMPTS", "lots"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { key, .. }) if key == "MAX_COMMIT_ATTEMPTS"));

        let result = CoordinatorConfig::from_lookup(lookup_from(&[
            ("QUEUE_STORE", "memory"),
            ("RENUMBER_ON_WITHDRAW", "maybe"),
        ]));
        assert!(result.is_err());

        let result = CoordinatorConfig::from_lookup(lookup_from(&[("QUEUE_STORE", "redis")]));
        assert!(result.is_err());

        for minutes in ["2147483647", "-2147483648", "1500"] {
            let result = CoordinatorConfig::from_lookup(lookup_from(&[
                ("QUEUE_STORE", "memory"),
                ("STATION_UTC_OFFSET_MINUTES", minutes),
            ]));
            assert!(
                matches!(result, Err(ConfigError::Invalid { ref key, .. }) if key == "STATION_UTC_OFFSET_MINUTES"),
                "{} minutes",
                minutes
            );
        }
    }

    #[tokio::test]
    async fn test_config_handle_broadcasts_updates() {
        let handle = ConfigHandle::new(CoordinatorConfig::default());
        let other = handle.clone();
        let mut receiver = handle.subscribe();

        other.update(|config| config.renumber_on_withdraw = false);

        receiver.changed().await.unwrap();
        assert!(!receiver.borrow().renumber_on_withdraw);
        assert!(!handle.current().renumber_on_withdraw);
    }
}
