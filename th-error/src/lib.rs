//! Unified error handling for thermhal
//!
//! This crate provides the single error type shared by the thermal core and the
//! HAL daemon. It uses thiserror for Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using ThermalError
pub type Result<T> = std::result::Result<T, ThermalError>;

/// Unified error type for all thermhal operations
#[derive(thiserror::Error, Debug)]
pub enum ThermalError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Duplicate {kind} name: {name}")]
    DuplicateName {
        kind: &'static str,
        name: String,
    },

    #[error("Unknown {kind} type: {value:?}")]
    UnknownType {
        kind: &'static str,
        value: String,
    },

    // ============================================================================
    // Platform Errors
    // ============================================================================
    #[error("{kind} {name} has no matching sysfs entry")]
    MissingSysfsEntry {
        kind: &'static str,
        name: String,
    },

    #[error("Sensor {sensor} does not support uevent notification (policy {policy:?})")]
    UeventUnsupported {
        sensor: String,
        policy: String,
    },

    #[error("Sensor {0} has no hot threshold set")]
    NoTripThreshold(String),

    // ============================================================================
    // Query Errors
    // ============================================================================
    #[error("Sensor not found: {0}")]
    SensorNotFound(String),

    #[error("Cooling device not found: {0}")]
    CoolingDeviceNotFound(String),

    #[error("Invalid reading {value:?} for {name}")]
    InvalidReading {
        name: String,
        value: String,
    },

    #[error("No data: {0}")]
    NoData(String),

    // ============================================================================
    // Watcher and Callback Errors
    // ============================================================================
    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Callback error: {0}")]
    Callback(String),
}

impl ThermalError {
    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid configuration value error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a watcher error from a string
    pub fn watcher(msg: impl Into<String>) -> Self {
        Self::Watcher(msg.into())
    }

    /// Create a callback error from a string
    pub fn callback(msg: impl Into<String>) -> Self {
        Self::Callback(msg.into())
    }

    /// Whether this error comes from a bad configuration document
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::JsonParse(_)
                | Self::InvalidConfig { .. }
                | Self::DuplicateName { .. }
                | Self::UnknownType { .. }
        )
    }
}
