//! Data types and configuration modules
//!
//! Contains the static sensor/cooling-device records and the JSON config parser.

mod config;
mod types;

pub use config::{
    cooling_devices_from_str, load_cooling_devices, load_sensor_info, parse_cooling_devices,
    parse_sensor_info, sensors_from_str,
};
pub use types::{
    CoolingDevice, CoolingType, CpuUsage, LegacyTemperature, SensorInfo, SensorStatus,
    Temperature, TemperatureThreshold, TemperatureType, ThrottlingArray, ThrottlingSeverity,
    SEVERITY_COUNT, UNSET_THRESHOLDS, ZERO_HYSTERESIS,
};
