//! Thermhal Core Library
//!
//! Thermal monitoring and throttling-severity engine over the Linux thermal
//! sysfs interface.
//!
//! # Features
//!
//! - **Configuration**: JSON sensor and cooling-device catalogue with validation
//! - **Severity**: Per-level hysteresis classification in both hot and cold directions
//! - **Watcher**: Kernel uevent driven re-evaluation with polling fallback
//! - **Observers**: Type-filtered callbacks with dead-observer pruning
//!
//! # Module Structure
//!
//! - `hw/` - Kernel interfaces (sysfs discovery, trip points, uevents, CPU stats)
//! - `data/` - Data types and the config parser
//! - `engine/` - Severity classifier, watcher loop and thermal helper
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use th_core::{SysfsLayout, Temperature, ThermalHelper};
//!
//! let helper = ThermalHelper::init(
//!     Path::new("/vendor/etc/thermal_info_config.json"),
//!     SysfsLayout::default(),
//!     Arc::new(|changed: &[Temperature]| println!("{} changed", changed.len())),
//! )
//! .unwrap();
//! let temps = helper.current_temperatures(None).unwrap();
//! ```

// Grouped modules
pub mod data;
pub mod engine;
pub mod hw;

// Standalone modules
pub mod callbacks;
pub mod constants;
pub mod properties;

pub mod error {
    pub use th_error::*;
}

// Re-export primary types from data/
pub use data::{
    CoolingDevice, CoolingType, CpuUsage, LegacyTemperature, SensorInfo, SensorStatus,
    Temperature, TemperatureThreshold, TemperatureType, ThrottlingArray, ThrottlingSeverity,
    SEVERITY_COUNT, UNSET_THRESHOLDS, ZERO_HYSTERESIS,
};

// Re-export config functions from data/
pub use data::{
    cooling_devices_from_str, load_cooling_devices, load_sensor_info, parse_cooling_devices,
    parse_sensor_info, sensors_from_str,
};

// Re-export error types
pub use error::{Result, ThermalError};

// Re-export engine types
pub use engine::{
    classify, poll_interval, severity_from_thresholds, EventSource, KernelEventSource,
    SeverityPair, ThermalHelper, ThermalWatcher, ThrottlingNotifier, WaitOutcome, Waker,
    WatcherState,
};

// Re-export hardware functions from hw/
pub use hw::{
    cpu_core_count, cpu_usages, decode_datagram, discover_paths, parse_uevent, program_trip_point,
    FileKind, SysfsLayout, ThermalFiles, UeventSocket,
};

// Re-export callback registry
pub use callbacks::{CallbackRegistry, CallbackSetting, ThermalChangedCallback};

// Re-export property lookup
pub use properties::{config_path, EnvProperties, MapProperties, PropertyStore};
