//! Thermal sysfs and procfs access
//!
//! - **Discovery**: maps `thermal_zoneN` / `cooling_deviceN` directories to the
//!   name found in their `type` file
//! - **Trip points**: programs `trip_point_0_temp` / `trip_point_0_hyst` so the
//!   kernel emits a uevent at the first severity boundary
//! - **CPU usage**: aggregate time counters from `/proc/stat` plus per-core
//!   `online` state
//!
//! Every root lives in a [`SysfsLayout`] so the whole stack can run against a
//! temporary tree.

use crate::constants::{paths, sysfs};
use crate::data::{CpuUsage, SensorInfo};
use crate::error::{Result, ThermalError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn};

/// Locations of the kernel interfaces read by the thermal core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsLayout {
    pub thermal_root: PathBuf,
    pub cpu_root: PathBuf,
    pub cpu_present_file: PathBuf,
    pub cpu_usage_file: PathBuf,
    pub vendor_etc_dir: PathBuf,
}

impl Default for SysfsLayout {
    fn default() -> Self {
        Self {
            thermal_root: PathBuf::from(paths::THERMAL_SENSORS_ROOT),
            cpu_root: PathBuf::from(paths::CPU_ONLINE_ROOT),
            cpu_present_file: PathBuf::from(paths::CPU_PRESENT_FILE),
            cpu_usage_file: PathBuf::from(paths::CPU_USAGE_FILE),
            vendor_etc_dir: PathBuf::from(paths::VENDOR_ETC_DIR),
        }
    }
}

impl SysfsLayout {
    /// The default layout re-rooted under `root`, e.g. `root/sys/devices/virtual/thermal`
    pub fn rooted_at(root: &Path) -> Self {
        let reroot = |p: &str| root.join(p.trim_start_matches('/'));
        Self {
            thermal_root: reroot(paths::THERMAL_SENSORS_ROOT),
            cpu_root: reroot(paths::CPU_ONLINE_ROOT),
            cpu_present_file: reroot(paths::CPU_PRESENT_FILE),
            cpu_usage_file: reroot(paths::CPU_USAGE_FILE),
            vendor_etc_dir: reroot(paths::VENDOR_ETC_DIR),
        }
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// Map each `<prefix>N` directory under `root` to the trimmed contents of its `type` file
///
/// A missing root yields an empty map; unreadable `type` files are skipped.
pub fn discover_paths(root: &Path, prefix: &str) -> BTreeMap<String, PathBuf> {
    let mut map = BTreeMap::new();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "Cannot open thermal sysfs root");
            return map;
        }
    };

    for entry in entries.flatten() {
        let dir = entry.path();
        let is_match = entry
            .file_name()
            .to_str()
            .map(|n| n.starts_with(prefix))
            .unwrap_or(false);
        if !is_match || !dir.is_dir() {
            continue;
        }

        let type_path = dir.join(sysfs::NAME_FILE);
        match fs::read_to_string(&type_path) {
            Ok(name) => {
                let name = name.trim().to_string();
                trace!(name = %name, dir = %dir.display(), "Discovered thermal node");
                map.entry(name).or_insert(dir);
            }
            Err(e) => {
                error!(path = %type_path.display(), error = %e, "Failed to read thermal node type");
            }
        }
    }

    debug!(prefix, count = map.len(), "Thermal sysfs discovery complete");
    map
}

// ============================================================================
// Trip Points
// ============================================================================

fn write_value(path: &Path, value: &str) -> Result<()> {
    fs::write(path, value).map_err(|source| ThermalError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Verify the zone reports uevents and program trip point 0 at its first hot boundary
///
/// Both values are divided by the multiplier and rounded to the nearest
/// integer, the units the kernel expects.
pub fn program_trip_point(name: &str, zone_dir: &Path, info: &SensorInfo) -> Result<()> {
    let policy_path = zone_dir.join(sysfs::POLICY_FILE);
    let policy = fs::read_to_string(&policy_path).map_err(|source| ThermalError::FileRead {
        path: policy_path.clone(),
        source,
    })?;
    let policy = policy.trim();
    if policy != sysfs::USER_SPACE_POLICY {
        return Err(ThermalError::UeventUnsupported {
            sensor: name.to_string(),
            policy: policy.to_string(),
        });
    }

    let level = info
        .first_hot_trip()
        .ok_or_else(|| ThermalError::NoTripThreshold(name.to_string()))?;
    let idx = level.index();

    let temp = (info.hot_thresholds[idx] / info.multiplier).round() as i64;
    let hyst = (info.hot_hysteresis[idx] / info.multiplier).round() as i64;

    write_value(&zone_dir.join(sysfs::TRIP_POINT_0_TEMP_FILE), &temp.to_string())?;
    write_value(&zone_dir.join(sysfs::TRIP_POINT_0_HYST_FILE), &hyst.to_string())?;

    info!(sensor = name, level = %level, temp, hyst, "Programmed trip point 0");
    Ok(())
}

// ============================================================================
// CPU Usage
// ============================================================================

/// Number of cores described by a `present` file such as `0-7`
pub fn cpu_core_count(present_file: &Path) -> Result<usize> {
    let content = fs::read_to_string(present_file).map_err(|source| ThermalError::FileRead {
        path: present_file.to_path_buf(),
        source,
    })?;
    let content = content.trim();

    let invalid = || ThermalError::InvalidReading {
        name: present_file.display().to_string(),
        value: content.to_string(),
    };

    let (min, max) = content.split_once('-').ok_or_else(invalid)?;
    let min: usize = min.trim().parse().map_err(|_| invalid())?;
    let max: usize = max.trim().parse().map_err(|_| invalid())?;
    if max < min {
        return Err(invalid());
    }
    Ok(max - min + 1)
}

/// Read per-core CPU time counters and online state, ordered by core number
pub fn cpu_usages(layout: &SysfsLayout) -> Result<Vec<CpuUsage>> {
    let max_cpus = cpu_core_count(&layout.cpu_present_file)?;
    let stat = fs::read_to_string(&layout.cpu_usage_file).map_err(|source| {
        ThermalError::FileRead {
            path: layout.cpu_usage_file.clone(),
            source,
        }
    })?;

    let mut usages: BTreeMap<usize, CpuUsage> = BTreeMap::new();
    for line in stat.lines() {
        let mut words = line.split_whitespace();
        let Some(cpu_name) = words.next() else {
            continue;
        };
        let Some(num) = cpu_name.strip_prefix("cpu") else {
            continue;
        };
        if !num.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }

        let bad_line = || ThermalError::InvalidReading {
            name: layout.cpu_usage_file.display().to_string(),
            value: line.to_string(),
        };
        let cpu_num: usize = num.parse().map_err(|_| bad_line())?;
        if cpu_num >= max_cpus {
            error!(cpu = cpu_name, max_cpus, "Unexpected cpu number");
            return Err(bad_line());
        }

        let mut counters = [0u64; 4];
        for slot in counters.iter_mut() {
            *slot = words
                .next()
                .and_then(|w| w.parse().ok())
                .ok_or_else(bad_line)?;
        }
        let [user, nice, system, idle] = counters;

        let online_path = layout.cpu_root.join(cpu_name).join(sysfs::CPU_ONLINE_FILE);
        let online = fs::read_to_string(&online_path).map_err(|source| ThermalError::FileRead {
            path: online_path.clone(),
            source,
        })?;

        let active = user + nice + system;
        usages.insert(
            cpu_num,
            CpuUsage {
                name: cpu_name.to_string(),
                active,
                total: active + idle,
                is_online: online.trim() == "1",
            },
        );
    }

    Ok(usages.into_values().collect())
}
