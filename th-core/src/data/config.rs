//! Thermal configuration parsing
//!
//! Reads the JSON document describing sensors and cooling devices and
//! validates it into typed maps. Any validation failure rejects the whole
//! document; there is no partially-loaded configuration.

use crate::data::types::{
    CoolingType, SensorInfo, TemperatureType, ThrottlingArray, SEVERITY_COUNT, UNSET_THRESHOLDS,
    ZERO_HYSTERESIS,
};
use crate::error::{Result, ThermalError};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

// ============================================================================
// Raw Document
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawConfig {
    #[serde(default)]
    sensors: Vec<RawSensor>,
    #[serde(default)]
    cooling_devices: Vec<RawCoolingDevice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSensor {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "Type")]
    sensor_type: String,
    hot_threshold: Option<Vec<NumberOrString>>,
    hot_hysteresis: Option<Vec<NumberOrString>>,
    cold_threshold: Option<Vec<NumberOrString>>,
    cold_hysteresis: Option<Vec<NumberOrString>>,
    vr_threshold: Option<NumberOrString>,
    multiplier: Option<NumberOrString>,
    monitor: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawCoolingDevice {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "Type")]
    cooling_type: String,
}

/// Threshold entries may be JSON numbers or numeric strings such as "NAN"
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f32),
    Text(String),
}

impl NumberOrString {
    fn to_f32(&self, field: &str) -> Result<f32> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => {
                let trimmed = s.trim();
                if trimmed.eq_ignore_ascii_case("nan") {
                    return Ok(f32::NAN);
                }
                trimmed.parse::<f32>().map_err(|_| {
                    ThermalError::invalid_config(field, format!("not a number: {s:?}"))
                })
            }
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

fn read_document(path: &Path) -> Result<RawConfig> {
    let text = fs::read_to_string(path).map_err(|source| ThermalError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

/// Load and validate the `Sensors` section of a config file
pub fn load_sensor_info(path: &Path) -> Result<BTreeMap<String, SensorInfo>> {
    let doc = read_document(path)?;
    validate_sensors(&doc.sensors)
}

/// Load and validate the `CoolingDevices` section of a config file
pub fn load_cooling_devices(path: &Path) -> Result<BTreeMap<String, CoolingType>> {
    let doc = read_document(path)?;
    validate_cooling_devices(&doc.cooling_devices)
}

/// Parse sensors from an in-memory JSON document
pub fn sensors_from_str(json: &str) -> Result<BTreeMap<String, SensorInfo>> {
    let doc: RawConfig = serde_json::from_str(json)?;
    validate_sensors(&doc.sensors)
}

/// Parse cooling devices from an in-memory JSON document
pub fn cooling_devices_from_str(json: &str) -> Result<BTreeMap<String, CoolingType>> {
    let doc: RawConfig = serde_json::from_str(json)?;
    validate_cooling_devices(&doc.cooling_devices)
}

/// Fail-closed sensor parse: any error is logged and yields an empty map
pub fn parse_sensor_info(path: &Path) -> BTreeMap<String, SensorInfo> {
    load_sensor_info(path).unwrap_or_else(|e| {
        error!(path = %path.display(), error = %e, "Failed to parse sensor config");
        BTreeMap::new()
    })
}

/// Fail-closed cooling device parse: any error is logged and yields an empty map
pub fn parse_cooling_devices(path: &Path) -> BTreeMap<String, CoolingType> {
    load_cooling_devices(path).unwrap_or_else(|e| {
        error!(path = %path.display(), error = %e, "Failed to parse cooling device config");
        BTreeMap::new()
    })
}

// ============================================================================
// Validation
// ============================================================================

fn validate_sensors(raw: &[RawSensor]) -> Result<BTreeMap<String, SensorInfo>> {
    let mut parsed = BTreeMap::new();
    let mut seen = HashSet::new();

    for (i, sensor) in raw.iter().enumerate() {
        let name = sensor.name.as_str();
        debug!(index = i, name, "Sensor name");
        if name.is_empty() {
            return Err(fail(ThermalError::invalid_config(
                format!("Sensor[{i}].Name"),
                "missing or empty",
            )));
        }
        if !seen.insert(name) {
            return Err(fail(ThermalError::DuplicateName {
                kind: "sensor",
                name: name.to_string(),
            }));
        }

        debug!(sensor = name, value = %sensor.sensor_type, "Sensor type");
        let sensor_type = TemperatureType::from_name(&sensor.sensor_type).ok_or_else(|| {
            fail(ThermalError::UnknownType {
                kind: "sensor",
                value: sensor.sensor_type.clone(),
            })
        })?;

        let hot_thresholds = match &sensor.hot_threshold {
            None => {
                debug!(sensor = name, "No HotThreshold, all levels unset");
                UNSET_THRESHOLDS
            }
            Some(values) => {
                let field = format!("Sensor[{name}].HotThreshold");
                let array = threshold_array(values, &field).map_err(fail)?;
                check_monotonic(&array, &field, Direction::Hot).map_err(fail)?;
                array
            }
        };

        let hot_hysteresis =
            hysteresis_array(sensor.hot_hysteresis.as_deref(), name, "HotHysteresis")
                .map_err(fail)?;

        let cold_thresholds = match sensor.cold_threshold.as_deref() {
            Some(values) if values.len() == SEVERITY_COUNT => {
                let field = format!("Sensor[{name}].ColdThreshold");
                let array = threshold_array(values, &field).map_err(fail)?;
                check_monotonic(&array, &field, Direction::Cold).map_err(fail)?;
                array
            }
            _ => {
                debug!(sensor = name, "No valid ColdThreshold, all levels unset");
                UNSET_THRESHOLDS
            }
        };

        let cold_hysteresis =
            hysteresis_array(sensor.cold_hysteresis.as_deref(), name, "ColdHysteresis")
                .map_err(fail)?;

        let vr_threshold = match &sensor.vr_threshold {
            Some(v) => v
                .to_f32(&format!("Sensor[{name}].VrThreshold"))
                .map_err(fail)?,
            None => f32::NAN,
        };
        debug!(sensor = name, vr_threshold, "Sensor VR threshold");

        let multiplier_field = format!("Sensor[{name}].Multiplier");
        let multiplier = match &sensor.multiplier {
            Some(v) => v.to_f32(&multiplier_field).map_err(fail)?,
            None => {
                return Err(fail(ThermalError::invalid_config(multiplier_field, "missing")));
            }
        };
        if !multiplier.is_finite() || multiplier == 0.0 {
            return Err(fail(ThermalError::invalid_config(
                multiplier_field,
                format!("must be finite and non-zero, got {multiplier}"),
            )));
        }
        debug!(sensor = name, multiplier, "Sensor multiplier");

        let is_monitor = match sensor.monitor.as_ref().and_then(serde_json::Value::as_bool) {
            Some(flag) => flag,
            None => {
                debug!(sensor = name, "Monitor missing or not a bool, set to false");
                false
            }
        };
        debug!(sensor = name, is_monitor, "Sensor monitor flag");

        parsed.insert(
            name.to_string(),
            SensorInfo {
                sensor_type,
                hot_thresholds,
                cold_thresholds,
                hot_hysteresis,
                cold_hysteresis,
                vr_threshold,
                multiplier,
                is_monitor,
            },
        );
    }

    info!(count = parsed.len(), "Sensors parsed successfully");
    Ok(parsed)
}

fn validate_cooling_devices(raw: &[RawCoolingDevice]) -> Result<BTreeMap<String, CoolingType>> {
    let mut parsed = BTreeMap::new();

    for (i, device) in raw.iter().enumerate() {
        let name = device.name.as_str();
        debug!(index = i, name, "Cooling device name");
        if name.is_empty() {
            return Err(fail(ThermalError::invalid_config(
                format!("CoolingDevice[{i}].Name"),
                "missing or empty",
            )));
        }
        if parsed.contains_key(name) {
            return Err(fail(ThermalError::DuplicateName {
                kind: "cooling device",
                name: name.to_string(),
            }));
        }

        let cooling_type = CoolingType::from_name(&device.cooling_type).ok_or_else(|| {
            fail(ThermalError::UnknownType {
                kind: "cooling device",
                value: device.cooling_type.clone(),
            })
        })?;
        debug!(cooling_device = name, cooling_type = %cooling_type, "Cooling device type");

        parsed.insert(name.to_string(), cooling_type);
    }

    info!(count = parsed.len(), "Cooling devices parsed successfully");
    Ok(parsed)
}

fn fail(err: ThermalError) -> ThermalError {
    error!(error = %err, "Invalid thermal config");
    err
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Hot,
    Cold,
}

fn threshold_array(values: &[NumberOrString], field: &str) -> Result<ThrottlingArray> {
    if values.len() != SEVERITY_COUNT {
        return Err(ThermalError::invalid_config(
            field,
            format!("expected {SEVERITY_COUNT} entries, got {}", values.len()),
        ));
    }
    let mut array = UNSET_THRESHOLDS;
    for (slot, value) in array.iter_mut().zip(values) {
        *slot = value.to_f32(field)?;
    }
    debug!(field, values = ?array, "Thresholds");
    Ok(array)
}

/// Set hot entries must be non-decreasing with severity, set cold entries non-increasing
fn check_monotonic(array: &ThrottlingArray, field: &str, direction: Direction) -> Result<()> {
    let mut last: Option<f32> = None;
    for (level, &value) in array.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        if let Some(prev) = last {
            let out_of_order = match direction {
                Direction::Hot => value < prev,
                Direction::Cold => value > prev,
            };
            if out_of_order {
                return Err(ThermalError::invalid_config(
                    format!("{field}[{level}]"),
                    format!("{value} is out of order after {prev}"),
                ));
            }
        }
        last = Some(value);
    }
    Ok(())
}

fn hysteresis_array(
    values: Option<&[NumberOrString]>,
    sensor: &str,
    key: &str,
) -> Result<ThrottlingArray> {
    let values = match values {
        Some(v) if v.len() == SEVERITY_COUNT => v,
        _ => {
            debug!(sensor, key, "No valid hysteresis, default all to 0.0");
            return Ok(ZERO_HYSTERESIS);
        }
    };

    let field = format!("Sensor[{sensor}].{key}");
    let mut array = ZERO_HYSTERESIS;
    for (slot, value) in array.iter_mut().zip(values) {
        let v = value.to_f32(&field)?;
        if v.is_nan() {
            return Err(ThermalError::invalid_config(field, "hysteresis entries must be set"));
        }
        *slot = v;
    }
    debug!(sensor, key, values = ?array, "Hysteresis");
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID: &str = r#"{
        "Sensors": [
            {
                "Name": "SKIN",
                "Type": "SKIN",
                "HotThreshold": ["NAN", "NAN", 35.0, 40.0, 45.0, 50.0, 55.0],
                "HotHysteresis": [0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0],
                "VrThreshold": "NAN",
                "Multiplier": 0.001,
                "Monitor": true
            },
            {
                "Name": "battery",
                "Type": "BATTERY",
                "HotThreshold": ["NAN", "NAN", "NAN", "NAN", "NAN", 45.0, 50.0],
                "ColdThreshold": [0.0, -5.0, "NAN", "NAN", "NAN", "NAN", -20.0],
                "VrThreshold": "60",
                "Multiplier": 0.001
            }
        ],
        "CoolingDevices": [
            { "Name": "thermal-cpufreq-0", "Type": "CPU" },
            { "Name": "battery", "Type": "BATTERY" }
        ]
    }"#;

    fn write_config(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    fn with_sensor(fields: &str) -> String {
        format!(
            r#"{{"Sensors": [{{"Name": "cpu0", "Type": "CPU", "Multiplier": 1.0 {fields}}}]}}"#
        )
    }

    #[test]
    fn test_parse_valid_sensors() {
        let file = write_config(VALID);
        let sensors = parse_sensor_info(file.path());
        assert_eq!(sensors.len(), 2);

        let skin = &sensors["SKIN"];
        assert_eq!(skin.sensor_type, TemperatureType::Skin);
        assert!(skin.hot_thresholds[0].is_nan());
        assert!(skin.hot_thresholds[1].is_nan());
        assert_eq!(skin.hot_thresholds[2], 35.0);
        assert_eq!(skin.hot_thresholds[6], 55.0);
        assert_eq!(skin.hot_hysteresis[2], 1.0);
        assert!(skin.cold_thresholds.iter().all(|v| v.is_nan()));
        assert_eq!(skin.multiplier, 0.001);
        assert!(skin.is_monitor);

        let battery = &sensors["battery"];
        assert!(!battery.is_monitor);
        assert_eq!(battery.vr_threshold, 60.0);
        assert_eq!(battery.cold_thresholds[1], -5.0);
        assert_eq!(battery.hot_hysteresis, ZERO_HYSTERESIS);
    }

    #[test]
    fn test_reparse_yields_equal_maps() {
        let file = write_config(VALID);
        let first = parse_sensor_info(file.path());
        let second = parse_sensor_info(file.path());
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_cooling_devices() {
        let file = write_config(VALID);
        let devices = parse_cooling_devices(file.path());
        assert_eq!(devices.len(), 2);
        assert_eq!(devices["thermal-cpufreq-0"], CoolingType::Cpu);
        assert_eq!(devices["battery"], CoolingType::Battery);
    }

    #[test]
    fn test_short_hot_threshold_fails_closed() {
        let json = with_sensor(r#", "HotThreshold": [1, 2, 3, 4, 5, 6]"#);
        assert!(sensors_from_str(&json).is_err());

        let file = write_config(&json);
        assert!(parse_sensor_info(file.path()).is_empty());
    }

    #[test]
    fn test_decreasing_hot_threshold_fails_closed() {
        let json = with_sensor(r#", "HotThreshold": ["NAN", 10, 50, 30, "NAN", "NAN", "NAN"]"#);
        let err = sensors_from_str(&json).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_one_bad_sensor_discards_everything() {
        let json = r#"{"Sensors": [
            {"Name": "good", "Type": "CPU", "Multiplier": 1.0},
            {"Name": "bad", "Type": "CPU", "Multiplier": 1.0,
             "HotThreshold": [10, 50, 30, 60, 70, 80, 90]}
        ]}"#;
        let file = write_config(json);
        assert!(parse_sensor_info(file.path()).is_empty());
    }

    #[test]
    fn test_increasing_cold_threshold_fails_closed() {
        let json = with_sensor(r#", "ColdThreshold": [0, -5, 5, "NAN", "NAN", "NAN", "NAN"]"#);
        assert!(sensors_from_str(&json).is_err());
    }

    #[test]
    fn test_wrong_length_cold_threshold_defaults_to_unset() {
        let json = with_sensor(r#", "ColdThreshold": [0, -5]"#);
        let sensors = sensors_from_str(&json).unwrap();
        assert!(sensors["cpu0"].cold_thresholds.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_hysteresis_defaults_and_nan_rejection() {
        let json = with_sensor(r#", "HotHysteresis": [1, 2]"#);
        let sensors = sensors_from_str(&json).unwrap();
        assert_eq!(sensors["cpu0"].hot_hysteresis, ZERO_HYSTERESIS);

        let json = with_sensor(r#", "ColdHysteresis": [0, 0, 0, "NAN", 0, 0, 0]"#);
        assert!(sensors_from_str(&json).is_err());
    }

    #[test]
    fn test_duplicate_and_empty_names_rejected() {
        let dup = r#"{"Sensors": [
            {"Name": "a", "Type": "CPU", "Multiplier": 1.0},
            {"Name": "a", "Type": "GPU", "Multiplier": 1.0}
        ]}"#;
        assert!(matches!(
            sensors_from_str(dup),
            Err(ThermalError::DuplicateName { .. })
        ));

        let empty = r#"{"Sensors": [{"Name": "", "Type": "CPU", "Multiplier": 1.0}]}"#;
        assert!(sensors_from_str(empty).is_err());

        let dup_cdev = r#"{"CoolingDevices": [
            {"Name": "fan", "Type": "FAN"}, {"Name": "fan", "Type": "FAN"}
        ]}"#;
        assert!(cooling_devices_from_str(dup_cdev).is_err());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{"Sensors": [{"Name": "a", "Type": "cpu", "Multiplier": 1.0}]}"#;
        assert!(matches!(
            sensors_from_str(json),
            Err(ThermalError::UnknownType { .. })
        ));

        let json = r#"{"CoolingDevices": [{"Name": "x", "Type": "HEATER"}]}"#;
        assert!(cooling_devices_from_str(json).is_err());
    }

    #[test]
    fn test_monitor_non_bool_defaults_false() {
        let json = with_sensor(r#", "Monitor": "yes""#);
        let sensors = sensors_from_str(&json).unwrap();
        assert!(!sensors["cpu0"].is_monitor);
    }

    #[test]
    fn test_multiplier_required() {
        let json = r#"{"Sensors": [{"Name": "a", "Type": "CPU"}]}"#;
        assert!(sensors_from_str(json).is_err());

        let json = r#"{"Sensors": [{"Name": "a", "Type": "CPU", "Multiplier": 0}]}"#;
        assert!(sensors_from_str(json).is_err());
    }

    #[test]
    fn test_unreadable_or_malformed_file_yields_empty() {
        assert!(parse_sensor_info(Path::new("/nonexistent/thermal.json")).is_empty());
        let file = write_config("{ not json");
        assert!(parse_cooling_devices(file.path()).is_empty());
        assert!(matches!(
            load_sensor_info(file.path()),
            Err(ThermalError::JsonParse(_))
        ));
    }
}
