//! List configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! initial_capacity = 256
//!
//! [delivery]
//! capacity = 4096
//! margin_divisor = 10
//! on_near_full = "drop_oldest"
//! snooze_iters = 8
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::delivery::DeliveryPolicy;
use crate::error::ConfigError;

/// Default number of node slots reserved up front.
pub const DEFAULT_INITIAL_CAPACITY: usize = 64;

/// Largest `initial_capacity` a configuration file may request.
pub const MAX_INITIAL_CAPACITY: usize = 1 << 24;

/// Largest `delivery.capacity` a configuration file may request.
pub const MAX_SINK_CAPACITY: usize = 1 << 24;

/// Construction parameters for a [`KeyedList`](crate::KeyedList).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    /// Node slots (and index entries) reserved before the first insert.
    pub initial_capacity: usize,

    /// How events reach the sink.
    pub delivery: DeliveryPolicy,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            delivery: DeliveryPolicy::default(),
        }
    }
}

impl ListConfig {
    /// Parses a configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed TOML, [`ConfigError::OutOfRange`]
    /// if a capacity exceeds its maximum.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the capacities can be allocated up front.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_max("initial_capacity", self.initial_capacity, MAX_INITIAL_CAPACITY)?;
        check_max("delivery.capacity", self.delivery.capacity, MAX_SINK_CAPACITY)
    }

    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryPolicy) -> Self {
        self.delivery = delivery;
        self
    }
}

fn check_max(field: &'static str, value: usize, max: usize) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::OutOfRange { field, value, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::OnNearFull;

    #[test]
    fn empty_document_is_default() {
        let config = ListConfig::from_toml_str("").unwrap();
        assert_eq!(config, ListConfig::default());
        assert_eq!(config.delivery.capacity, 1024);
        assert_eq!(config.delivery.margin_divisor, 10);
        assert_eq!(config.delivery.on_near_full, OnNearFull::SpawnDetached);
    }

    #[test]
    fn partial_delivery_table() {
        let config = ListConfig::from_toml_str(
            r#"
            initial_capacity = 8

            [delivery]
            on_near_full = "drop_oldest"
            "#,
        )
        .unwrap();

        assert_eq!(config.initial_capacity, 8);
        assert_eq!(config.delivery.on_near_full, OnNearFull::DropOldest);
        assert_eq!(config.delivery.capacity, 1024);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = ListConfig::from_toml_str(
            r#"
            [delivery]
            on_near_full = "shrug"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn oversized_capacities_are_rejected() {
        let err = ListConfig::from_toml_str("initial_capacity = 9223372036854775807").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                field: "initial_capacity",
                max: MAX_INITIAL_CAPACITY,
                ..
            }
        ));

        let err = ListConfig::from_toml_str(
            r#"
            [delivery]
            capacity = 4611686018427387904
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                field: "delivery.capacity",
                ..
            }
        ));
        assert!(err.to_string().contains("delivery.capacity"));
    }

    #[test]
    fn capacities_at_the_limit_are_accepted() {
        let config = ListConfig::default()
            .with_initial_capacity(MAX_INITIAL_CAPACITY)
            .with_delivery(DeliveryPolicy::default().with_capacity(MAX_SINK_CAPACITY));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ListConfig::load("/nonexistent/linkmap.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn builder_methods() {
        let config = ListConfig::default()
            .with_initial_capacity(3)
            .with_delivery(DeliveryPolicy::default().with_on_near_full(OnNearFull::BlockingSend));
        assert_eq!(config.initial_capacity, 3);
        assert_eq!(config.delivery.on_near_full, OnNearFull::BlockingSend);
    }
}
