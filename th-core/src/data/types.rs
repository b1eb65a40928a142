//! Core data types for thermhal
//!
//! Severity levels, sensor and cooling-device catalogues, the static
//! configuration records, and the values returned by queries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of throttling severity levels (NONE through SHUTDOWN)
pub const SEVERITY_COUNT: usize = 7;

/// One value per severity level; NaN marks a level as unset
pub type ThrottlingArray = [f32; SEVERITY_COUNT];

/// Array with every level unset
pub const UNSET_THRESHOLDS: ThrottlingArray = [f32::NAN; SEVERITY_COUNT];

/// Array with every level at zero
pub const ZERO_HYSTERESIS: ThrottlingArray = [0.0; SEVERITY_COUNT];

// ============================================================================
// Throttling Severity
// ============================================================================

/// Ordered throttling severity, higher is more severe
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThrottlingSeverity {
    #[default]
    None = 0,
    Light = 1,
    Moderate = 2,
    Severe = 3,
    Critical = 4,
    Emergency = 5,
    Shutdown = 6,
}

impl ThrottlingSeverity {
    /// All levels from least to most severe
    pub const ALL: [ThrottlingSeverity; SEVERITY_COUNT] = [
        Self::None,
        Self::Light,
        Self::Moderate,
        Self::Severe,
        Self::Critical,
        Self::Emergency,
        Self::Shutdown,
    ];

    /// Index into a [`ThrottlingArray`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Light => "LIGHT",
            Self::Moderate => "MODERATE",
            Self::Severe => "SEVERE",
            Self::Critical => "CRITICAL",
            Self::Emergency => "EMERGENCY",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for ThrottlingSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Type Catalogues
// ============================================================================

/// Semantic type of a temperature sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemperatureType {
    Unknown = -1,
    Cpu = 0,
    Gpu = 1,
    Battery = 2,
    Skin = 3,
    UsbPort = 4,
    PowerAmplifier = 5,
    BclVoltage = 6,
    BclCurrent = 7,
    BclPercentage = 8,
    Npu = 9,
}

impl TemperatureType {
    pub const ALL: [TemperatureType; 11] = [
        Self::Unknown,
        Self::Cpu,
        Self::Gpu,
        Self::Battery,
        Self::Skin,
        Self::UsbPort,
        Self::PowerAmplifier,
        Self::BclVoltage,
        Self::BclCurrent,
        Self::BclPercentage,
        Self::Npu,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Cpu => "CPU",
            Self::Gpu => "GPU",
            Self::Battery => "BATTERY",
            Self::Skin => "SKIN",
            Self::UsbPort => "USB_PORT",
            Self::PowerAmplifier => "POWER_AMPLIFIER",
            Self::BclVoltage => "BCL_VOLTAGE",
            Self::BclCurrent => "BCL_CURRENT",
            Self::BclPercentage => "BCL_PERCENTAGE",
            Self::Npu => "NPU",
        }
    }

    /// Exact, case-sensitive lookup by canonical name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    /// Collapse to the legacy catalogue, which stops at SKIN
    pub fn legacy(self) -> Self {
        if (self as i32) > (Self::Skin as i32) {
            Self::Unknown
        } else {
            self
        }
    }
}

impl fmt::Display for TemperatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a cooling device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoolingType {
    Fan = 0,
    Battery = 1,
    Cpu = 2,
    Gpu = 3,
    Modem = 4,
    Npu = 5,
    Component = 6,
}

impl CoolingType {
    pub const ALL: [CoolingType; 7] = [
        Self::Fan,
        Self::Battery,
        Self::Cpu,
        Self::Gpu,
        Self::Modem,
        Self::Npu,
        Self::Component,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fan => "FAN",
            Self::Battery => "BATTERY",
            Self::Cpu => "CPU",
            Self::Gpu => "GPU",
            Self::Modem => "MODEM",
            Self::Npu => "NPU",
            Self::Component => "COMPONENT",
        }
    }

    /// Exact, case-sensitive lookup by canonical name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for CoolingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Static Configuration
// ============================================================================

/// Static description of one sensor, immutable after load
#[derive(Debug, Clone)]
pub struct SensorInfo {
    pub sensor_type: TemperatureType,
    pub hot_thresholds: ThrottlingArray,
    pub cold_thresholds: ThrottlingArray,
    pub hot_hysteresis: ThrottlingArray,
    pub cold_hysteresis: ThrottlingArray,
    pub vr_threshold: f32,
    /// Conversion factor from the raw sysfs integer to degrees
    pub multiplier: f32,
    /// Participates in watcher-driven severity tracking
    pub is_monitor: bool,
}

impl SensorInfo {
    /// Lowest severity whose hot threshold and hysteresis are both set
    pub fn first_hot_trip(&self) -> Option<ThrottlingSeverity> {
        ThrottlingSeverity::ALL.iter().copied().find(|sev| {
            !self.hot_thresholds[sev.index()].is_nan() && !self.hot_hysteresis[sev.index()].is_nan()
        })
    }
}

// Unset entries compare equal to each other
impl PartialEq for SensorInfo {
    fn eq(&self, other: &Self) -> bool {
        self.sensor_type == other.sensor_type
            && arrays_eq(&self.hot_thresholds, &other.hot_thresholds)
            && arrays_eq(&self.cold_thresholds, &other.cold_thresholds)
            && arrays_eq(&self.hot_hysteresis, &other.hot_hysteresis)
            && arrays_eq(&self.cold_hysteresis, &other.cold_hysteresis)
            && floats_eq(self.vr_threshold, other.vr_threshold)
            && floats_eq(self.multiplier, other.multiplier)
            && self.is_monitor == other.is_monitor
    }
}

fn floats_eq(a: f32, b: f32) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn arrays_eq(a: &ThrottlingArray, b: &ThrottlingArray) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| floats_eq(*x, *y))
}

/// Mutable per-sensor severity state owned by the helper
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorStatus {
    /// Combined severity last reported to observers
    pub severity: ThrottlingSeverity,
    pub prev_hot_severity: ThrottlingSeverity,
    pub prev_cold_severity: ThrottlingSeverity,
}

// ============================================================================
// Query Results
// ============================================================================

/// Current reading of a sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Temperature {
    pub name: String,
    pub temperature_type: TemperatureType,
    pub value: f32,
    pub throttling_status: ThrottlingSeverity,
}

/// Reading in the legacy shape, carrying thresholds instead of a severity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyTemperature {
    pub name: String,
    pub temperature_type: TemperatureType,
    pub current_value: f32,
    pub throttling_threshold: f32,
    pub shutdown_threshold: f32,
    pub vr_throttling_threshold: f32,
}

/// Configured thresholds of a sensor
#[derive(Debug, Clone, Serialize)]
pub struct TemperatureThreshold {
    pub name: String,
    pub temperature_type: TemperatureType,
    pub hot_throttling_thresholds: ThrottlingArray,
    pub cold_throttling_thresholds: ThrottlingArray,
    pub vr_throttling_threshold: f32,
}

/// Current state of a cooling device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoolingDevice {
    pub name: String,
    pub cooling_type: CoolingType,
    pub value: u64,
}

/// Aggregate CPU time counters of one core
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpuUsage {
    pub name: String,
    /// user + nice + system
    pub active: u64,
    /// active + idle
    pub total: u64,
    pub is_online: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering_and_index() {
        assert!(ThrottlingSeverity::Shutdown > ThrottlingSeverity::Severe);
        assert_eq!(ThrottlingSeverity::Severe.index(), 3);
        assert_eq!(ThrottlingSeverity::from_index(6), Some(ThrottlingSeverity::Shutdown));
        assert_eq!(ThrottlingSeverity::from_index(7), None);
        assert_eq!(ThrottlingSeverity::default(), ThrottlingSeverity::None);
    }

    #[test]
    fn test_type_names_are_case_sensitive() {
        assert_eq!(TemperatureType::from_name("USB_PORT"), Some(TemperatureType::UsbPort));
        assert_eq!(TemperatureType::from_name("skin"), None);
        assert_eq!(CoolingType::from_name("MODEM"), Some(CoolingType::Modem));
        assert_eq!(CoolingType::from_name("Fan"), None);
    }

    #[test]
    fn test_legacy_type_collapse() {
        assert_eq!(TemperatureType::Skin.legacy(), TemperatureType::Skin);
        assert_eq!(TemperatureType::Npu.legacy(), TemperatureType::Unknown);
        assert_eq!(TemperatureType::UsbPort.legacy(), TemperatureType::Unknown);
    }

    #[test]
    fn test_first_hot_trip_skips_unset_levels() {
        let mut hot = UNSET_THRESHOLDS;
        hot[5] = 45.0;
        hot[6] = 50.0;
        let info = SensorInfo {
            sensor_type: TemperatureType::Battery,
            hot_thresholds: hot,
            cold_thresholds: UNSET_THRESHOLDS,
            hot_hysteresis: ZERO_HYSTERESIS,
            cold_hysteresis: ZERO_HYSTERESIS,
            vr_threshold: f32::NAN,
            multiplier: 0.001,
            is_monitor: true,
        };
        assert_eq!(info.first_hot_trip(), Some(ThrottlingSeverity::Emergency));
        assert_eq!(info.clone(), info);
    }
}
