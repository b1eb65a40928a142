//! String-keyed property store
//!
//! Only used to pick the thermal config file name. The environment-backed
//! store maps `vendor.thermal.config` to `VENDOR_THERMAL_CONFIG`.

use crate::constants::config;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Source of system properties
pub trait PropertyStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }
}

/// Properties read from the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvProperties;

impl EnvProperties {
    /// `vendor.thermal.config` -> `VENDOR_THERMAL_CONFIG`
    pub fn env_key(key: &str) -> String {
        key.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

impl PropertyStore for EnvProperties {
    fn get(&self, key: &str) -> Option<String> {
        env::var(Self::env_key(key)).ok()
    }
}

/// In-memory properties
#[derive(Debug, Default, Clone)]
pub struct MapProperties {
    values: HashMap<String, String>,
}

impl MapProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl PropertyStore for MapProperties {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// `<etc_dir>/<vendor.thermal.config or the default file name>`
pub fn config_path(props: &dyn PropertyStore, etc_dir: &Path) -> PathBuf {
    etc_dir.join(props.get_or(config::CONFIG_PROPERTY, config::DEFAULT_CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_key_mapping() {
        assert_eq!(EnvProperties::env_key("vendor.thermal.config"), "VENDOR_THERMAL_CONFIG");
    }

    #[test]
    fn test_config_path_default_and_override() {
        let etc = Path::new("/vendor/etc");
        assert_eq!(
            config_path(&MapProperties::new(), etc),
            PathBuf::from("/vendor/etc/thermal_info_config.json")
        );

        let props =
            MapProperties::new().with("vendor.thermal.config", "thermal_info_config_evt.json");
        assert_eq!(
            config_path(&props, etc),
            PathBuf::from("/vendor/etc/thermal_info_config_evt.json")
        );
    }

    #[test]
    fn test_empty_value_falls_back() {
        let props = MapProperties::new().with("vendor.thermal.config", "");
        assert_eq!(props.get_or("vendor.thermal.config", "x.json"), "x.json");
    }
}
