//! Configuration defaults and loader/registry settings.
//!
//! Values can be built in code, deserialized from any serde format, or read
//! from the environment with `from_env()`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FactoryError, Result};

/// Library path reported by a factory before the loader records its origin.
pub const UNKNOWN_LIBRARY_PATH: &str = "Unknown";

/// Entry point resolved in a plugin library to register its factories.
pub const REGISTER_SYMBOL: &str = "classload_register_factories";

/// Environment variable names
pub mod env_vars {
    pub const ORPHAN_POLICY: &str = "CLASSLOAD_ORPHAN_POLICY";
    pub const REGISTER_SYMBOL: &str = "CLASSLOAD_REGISTER_SYMBOL";
    pub const LOAD_ON_DEMAND: &str = "CLASSLOAD_LOAD_ON_DEMAND";
}

/// What the registry does with a factory once its last owner is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Destroy the factory as soon as it becomes orphaned.
    #[default]
    Purge,
    /// Keep orphaned factories until `purge_orphans()` is called.
    Retain,
}

impl FromStr for OrphanPolicy {
    type Err = FactoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "purge" => Ok(OrphanPolicy::Purge),
            "retain" => Ok(OrphanPolicy::Retain),
            other => Err(FactoryError::InvalidConfig(format!(
                "unknown orphan policy '{}'",
                other
            ))),
        }
    }
}

/// Registry settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub orphan_policy: OrphanPolicy,
}

impl RegistryConfig {
    /// Build from `CLASSLOAD_ORPHAN_POLICY`, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(env_vars::ORPHAN_POLICY) {
            config.orphan_policy = value.parse()?;
        }
        Ok(config)
    }

    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self
    }
}

/// Loader context settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Symbol resolved in the plugin library to register its factories
    #[serde(default = "default_register_symbol")]
    pub register_symbol: String,

    /// Open the library on the first `create_instance` instead of requiring
    /// an explicit `load_library`
    #[serde(default)]
    pub load_on_demand: bool,
}

fn default_register_symbol() -> String {
    REGISTER_SYMBOL.to_string()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            register_symbol: default_register_symbol(),
            load_on_demand: false,
        }
    }
}

impl LoaderConfig {
    /// Build from `CLASSLOAD_REGISTER_SYMBOL` and `CLASSLOAD_LOAD_ON_DEMAND`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(symbol) = std::env::var(env_vars::REGISTER_SYMBOL) {
            config.register_symbol = symbol;
        }
        if let Ok(value) = std::env::var(env_vars::LOAD_ON_DEMAND) {
            config.load_on_demand = parse_bool(&value)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_register_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.register_symbol = symbol.into();
        self
    }

    pub fn with_load_on_demand(mut self, enabled: bool) -> Self {
        self.load_on_demand = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.register_symbol.trim().is_empty() {
            return Err(FactoryError::InvalidConfig(
                "register_symbol must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(FactoryError::InvalidConfig(format!(
            "expected a boolean, got '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orphan_policy_parse() {
        assert_eq!("purge".parse::<OrphanPolicy>().unwrap(), OrphanPolicy::Purge);
        assert_eq!(" Retain ".parse::<OrphanPolicy>().unwrap(), OrphanPolicy::Retain);
        assert!(matches!(
            "later".parse::<OrphanPolicy>(),
            Err(FactoryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_loader_config_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.register_symbol, REGISTER_SYMBOL);
        assert!(!config.load_on_demand);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_loader_config_rejects_empty_symbol() {
        let config = LoaderConfig::default().with_register_symbol("  ");
        assert!(matches!(
            config.validate(),
            Err(FactoryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let registry: RegistryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(registry.orphan_policy, OrphanPolicy::Purge);

        let registry: RegistryConfig =
            serde_json::from_str(r#"{"orphan_policy":"retain"}"#).unwrap();
        assert_eq!(registry.orphan_policy, OrphanPolicy::Retain);

        let loader: LoaderConfig = serde_json::from_str(r#"{"load_on_demand":true}"#).unwrap();
        assert_eq!(loader.register_symbol, REGISTER_SYMBOL);
        assert!(loader.load_on_demand);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("yes").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}
