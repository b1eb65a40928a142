//! Thermal helper
//!
//! Owns the static sensor/cooling-device configuration, the sysfs file
//! registries and the per-sensor severity state. Query methods may be called
//! from any thread; severity state is only written by the watcher callback.
//!
//! Startup is fail-closed: a bad config, a sensor with no sysfs node, or a
//! monitored zone that cannot emit uevents aborts construction.

use crate::constants::sysfs as sysfs_names;
use crate::data::{
    load_cooling_devices, load_sensor_info, CoolingDevice, CoolingType, CpuUsage,
    LegacyTemperature, SensorInfo, SensorStatus, Temperature, TemperatureThreshold,
    TemperatureType, ThrottlingSeverity,
};
use crate::engine::severity::{classify, SeverityPair};
use crate::engine::watcher::{EventSource, KernelEventSource, ThermalWatcher};
use crate::error::{Result, ThermalError};
use crate::hw::{
    cpu_usages, discover_paths, program_trip_point, FileKind, SysfsLayout, ThermalFiles,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Receives the batch of sensors whose combined severity changed
pub trait ThrottlingNotifier: Send + Sync {
    fn notify(&self, temperatures: &[Temperature]);
}

impl<F> ThrottlingNotifier for F
where
    F: Fn(&[Temperature]) + Send + Sync,
{
    fn notify(&self, temperatures: &[Temperature]) {
        self(temperatures)
    }
}

pub struct ThermalHelper {
    sensor_info: BTreeMap<String, SensorInfo>,
    cooling_devices: BTreeMap<String, CoolingType>,
    sensor_files: ThermalFiles,
    cooling_files: ThermalFiles,
    /// One entry per monitored sensor
    sensor_status: RwLock<BTreeMap<String, SensorStatus>>,
    notifier: Arc<dyn ThrottlingNotifier>,
    layout: SysfsLayout,
    watcher: Mutex<Option<ThermalWatcher>>,
}

impl std::fmt::Debug for ThermalHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThermalHelper")
            .field("sensors", &self.sensor_info.len())
            .field("cooling_devices", &self.cooling_devices.len())
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl ThermalHelper {
    // ========================================================================
    // Startup
    // ========================================================================

    /// Load `config_path`, resolve sysfs nodes under `layout` and program trip points
    ///
    /// The watcher is not started; see [`ThermalHelper::start`] and [`ThermalHelper::init`].
    pub fn new(
        config_path: &Path,
        layout: SysfsLayout,
        notifier: Arc<dyn ThrottlingNotifier>,
    ) -> Result<Self> {
        info!(config = %config_path.display(), "Loading thermal config");
        let sensor_info = load_sensor_info(config_path)?;
        if sensor_info.is_empty() {
            return Err(ThermalError::config(format!(
                "no sensors configured in {}",
                config_path.display()
            )));
        }
        let cooling_devices = load_cooling_devices(config_path)?;

        let sensor_status: BTreeMap<String, SensorStatus> = sensor_info
            .iter()
            .filter(|(_, info)| info.is_monitor)
            .map(|(name, _)| (name.clone(), SensorStatus::default()))
            .collect();

        let zones = discover_paths(&layout.thermal_root, sysfs_names::SENSOR_PREFIX);
        let cdevs = discover_paths(&layout.thermal_root, sysfs_names::COOLING_DEVICE_PREFIX);

        let sensor_files = build_registry(
            &sensor_info,
            &zones,
            sysfs_names::SENSOR_TEMP_FILE,
            FileKind::Sensor,
        )?;
        let cooling_files = build_registry(
            &cooling_devices,
            &cdevs,
            sysfs_names::COOLING_DEVICE_STATE_FILE,
            FileKind::CoolingDevice,
        )?;

        for name in sensor_status.keys() {
            let zone = &zones[name];
            program_trip_point(name, zone, &sensor_info[name]).map_err(|e| {
                error!(sensor = %name, error = %e, "Failed to program trip point");
                e
            })?;
        }

        info!(
            sensors = sensor_info.len(),
            monitored = sensor_status.len(),
            cooling_devices = cooling_devices.len(),
            "Thermal helper initialized"
        );

        Ok(Self {
            sensor_info,
            cooling_devices,
            sensor_files,
            cooling_files,
            sensor_status: RwLock::new(sensor_status),
            notifier,
            layout,
            watcher: Mutex::new(None),
        })
    }

    /// Construct the helper and start watching kernel uevents
    pub fn init(
        config_path: &Path,
        layout: SysfsLayout,
        notifier: Arc<dyn ThrottlingNotifier>,
    ) -> Result<Arc<Self>> {
        let helper = Arc::new(Self::new(config_path, layout, notifier)?);
        let source = KernelEventSource::new(helper.monitored_sensors());
        helper.start(source)?;
        Ok(helper)
    }

    /// Start the watcher thread over `source`
    ///
    /// The thread holds only a weak reference, so dropping the last
    /// `Arc<ThermalHelper>` stops it.
    pub fn start<S: EventSource + 'static>(self: &Arc<Self>, source: S) -> Result<()> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Err(ThermalError::watcher("watcher already running"));
        }
        let helper = Arc::downgrade(self);
        let watcher = ThermalWatcher::start(source, move |sensors| {
            helper
                .upgrade()
                .map(|h| h.on_uevent_batch(sensors))
                .unwrap_or(false)
        })?;
        *slot = Some(watcher);
        Ok(())
    }

    /// Force the watcher to re-evaluate immediately
    pub fn wake(&self) {
        if let Some(watcher) = self.watcher.lock().as_ref() {
            watcher.wake();
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .as_ref()
            .map(ThermalWatcher::is_running)
            .unwrap_or(false)
    }

    /// Stop the watcher thread, if running
    pub fn shutdown(&self) {
        let watcher = self.watcher.lock().take();
        if let Some(watcher) = watcher {
            watcher.shutdown();
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn sensor_info_map(&self) -> &BTreeMap<String, SensorInfo> {
        &self.sensor_info
    }

    pub fn cooling_device_map(&self) -> &BTreeMap<String, CoolingType> {
        &self.cooling_devices
    }

    pub fn layout(&self) -> &SysfsLayout {
        &self.layout
    }

    pub fn monitored_sensors(&self) -> BTreeSet<String> {
        self.sensor_info
            .iter()
            .filter(|(_, info)| info.is_monitor)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Copy of one sensor's status, taken under the shared lock
    pub fn sensor_status(&self, name: &str) -> Option<SensorStatus> {
        self.sensor_status.read().get(name).copied()
    }

    fn info(&self, name: &str) -> Result<&SensorInfo> {
        self.sensor_info
            .get(name)
            .ok_or_else(|| ThermalError::SensorNotFound(name.to_string()))
    }

    // ========================================================================
    // Sensor Queries
    // ========================================================================

    /// Raw reading scaled by the sensor's multiplier
    fn read_value(&self, name: &str, info: &SensorInfo) -> Result<f32> {
        let raw = self.sensor_files.read(name)?;
        let invalid = || ThermalError::InvalidReading {
            name: name.to_string(),
            value: raw.clone(),
        };
        if raw.is_empty() {
            return Err(invalid());
        }
        let raw_value: f32 = raw.parse().map_err(|_| invalid())?;
        Ok(raw_value * info.multiplier)
    }

    /// Read a sensor and classify it against the stored previous severities
    ///
    /// Takes the shared lock only to copy the previous severities; the
    /// stored status is never modified here.
    pub fn read_temperature_with_status(&self, name: &str) -> Result<(Temperature, SeverityPair)> {
        let info = self.info(name)?;
        let value = self.read_value(name, info)?;

        let pair = if info.is_monitor {
            let prev = self.sensor_status(name).unwrap_or_default();
            classify(info, prev.prev_hot_severity, prev.prev_cold_severity, value)
        } else {
            SeverityPair::default()
        };

        let temperature = Temperature {
            name: name.to_string(),
            temperature_type: info.sensor_type,
            value,
            throttling_status: pair.combined(),
        };
        Ok((temperature, pair))
    }

    pub fn read_temperature(&self, name: &str) -> Result<Temperature> {
        self.read_temperature_with_status(name).map(|(t, _)| t)
    }

    /// Current temperatures of all sensors, optionally limited to one type
    ///
    /// Any read failure fails the whole query, as does an empty result.
    pub fn current_temperatures(
        &self,
        filter: Option<TemperatureType>,
    ) -> Result<Vec<Temperature>> {
        let mut temperatures = Vec::new();
        for (name, info) in &self.sensor_info {
            if filter.map_or(false, |t| t != info.sensor_type) {
                continue;
            }
            temperatures.push(self.read_temperature(name).map_err(|e| {
                error!(sensor = %name, error = %e, "Error reading temperature");
                e
            })?);
        }
        if temperatures.is_empty() {
            return Err(ThermalError::NoData("no temperatures matched".into()));
        }
        Ok(temperatures)
    }

    /// Reading in the legacy shape for one sensor
    pub fn read_legacy_temperature(&self, name: &str) -> Result<LegacyTemperature> {
        let info = self.info(name)?;
        let value = self.read_value(name, info)?;
        Ok(LegacyTemperature {
            name: name.to_string(),
            temperature_type: info.sensor_type.legacy(),
            current_value: value,
            throttling_threshold: info.hot_thresholds[ThrottlingSeverity::Severe.index()],
            shutdown_threshold: info.hot_thresholds[ThrottlingSeverity::Shutdown.index()],
            vr_throttling_threshold: info.vr_threshold,
        })
    }

    /// Legacy readings of every sensor
    pub fn legacy_temperatures(&self) -> Result<Vec<LegacyTemperature>> {
        let temperatures = self
            .sensor_info
            .keys()
            .map(|name| self.read_legacy_temperature(name))
            .collect::<Result<Vec<_>>>()?;
        if temperatures.is_empty() {
            return Err(ThermalError::NoData("no sensors".into()));
        }
        Ok(temperatures)
    }

    // ========================================================================
    // Threshold Queries
    // ========================================================================

    pub fn read_temperature_threshold(&self, name: &str) -> Result<TemperatureThreshold> {
        let info = self.info(name)?;
        Ok(TemperatureThreshold {
            name: name.to_string(),
            temperature_type: info.sensor_type,
            hot_throttling_thresholds: info.hot_thresholds,
            cold_throttling_thresholds: info.cold_thresholds,
            vr_throttling_threshold: info.vr_threshold,
        })
    }

    pub fn temperature_thresholds(
        &self,
        filter: Option<TemperatureType>,
    ) -> Result<Vec<TemperatureThreshold>> {
        let thresholds = self
            .sensor_info
            .iter()
            .filter(|(_, info)| filter.map_or(true, |t| t == info.sensor_type))
            .map(|(name, _)| self.read_temperature_threshold(name))
            .collect::<Result<Vec<_>>>()?;
        if thresholds.is_empty() {
            return Err(ThermalError::NoData("no thresholds matched".into()));
        }
        Ok(thresholds)
    }

    // ========================================================================
    // Cooling Device Queries
    // ========================================================================

    pub fn read_cooling_device(&self, name: &str) -> Result<CoolingDevice> {
        let cooling_type = *self
            .cooling_devices
            .get(name)
            .ok_or_else(|| ThermalError::CoolingDeviceNotFound(name.to_string()))?;
        let raw = self.cooling_files.read(name)?;
        let value = raw.parse::<u64>().map_err(|_| ThermalError::InvalidReading {
            name: name.to_string(),
            value: raw.clone(),
        })?;
        Ok(CoolingDevice {
            name: name.to_string(),
            cooling_type,
            value,
        })
    }

    pub fn current_cooling_devices(
        &self,
        filter: Option<CoolingType>,
    ) -> Result<Vec<CoolingDevice>> {
        let mut devices = Vec::new();
        for (name, cooling_type) in &self.cooling_devices {
            if filter.map_or(false, |t| t != *cooling_type) {
                continue;
            }
            devices.push(self.read_cooling_device(name).map_err(|e| {
                error!(cooling_device = %name, error = %e, "Error reading cooling device");
                e
            })?);
        }
        if devices.is_empty() {
            return Err(ThermalError::NoData("no cooling devices matched".into()));
        }
        Ok(devices)
    }

    pub fn cpu_usages(&self) -> Result<Vec<CpuUsage>> {
        let usages = cpu_usages(&self.layout)?;
        if usages.is_empty() {
            return Err(ThermalError::NoData("no cpu usage reported".into()));
        }
        Ok(usages)
    }

    // ========================================================================
    // Watcher Callback
    // ========================================================================

    /// Re-evaluate monitored sensors after a uevent batch or timeout
    ///
    /// An empty `uevent_sensors` re-reads every monitored sensor; otherwise
    /// only the named ones. Returns whether any monitored sensor is still
    /// above NONE.
    pub fn on_uevent_batch(&self, uevent_sensors: &BTreeSet<String>) -> bool {
        let mut changed = Vec::new();
        let mut thermal_triggered = false;

        for (name, info) in &self.sensor_info {
            if !info.is_monitor {
                continue;
            }

            if !uevent_sensors.is_empty() && !uevent_sensors.contains(name) {
                let throttled = self
                    .sensor_status(name)
                    .map_or(false, |s| s.severity != ThrottlingSeverity::None);
                if throttled {
                    thermal_triggered = true;
                }
                trace!(sensor = %name, "Not in uevent batch, skipped");
                continue;
            }

            let (temperature, pair) = match self.read_temperature_with_status(name) {
                Ok(reading) => reading,
                Err(e) => {
                    warn!(sensor = %name, error = %e, "Error reading temperature, skipped");
                    continue;
                }
            };

            let severity = {
                let mut status_map = self.sensor_status.write();
                let status = status_map.entry(name.clone()).or_default();
                status.prev_hot_severity = pair.hot;
                status.prev_cold_severity = pair.cold;
                if temperature.throttling_status != status.severity {
                    debug!(
                        sensor = %name,
                        from = %status.severity,
                        to = %temperature.throttling_status,
                        "Severity changed"
                    );
                    status.severity = temperature.throttling_status;
                    changed.push(temperature.clone());
                }
                status.severity
            };

            if severity != ThrottlingSeverity::None {
                thermal_triggered = true;
                info!(
                    sensor = %name,
                    value = temperature.value,
                    severity = %severity,
                    "Sensor throttling"
                );
            }
        }

        if !changed.is_empty() {
            self.notifier.notify(&changed);
        }
        thermal_triggered
    }
}

impl Drop for ThermalHelper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Resolve every configured name to `<node dir>/<file>`; any miss is fatal
fn build_registry<V>(
    configured: &BTreeMap<String, V>,
    nodes: &BTreeMap<String, PathBuf>,
    file: &str,
    kind: FileKind,
) -> Result<ThermalFiles> {
    let kind_label = kind.label();
    let mut files = ThermalFiles::new(kind);
    for name in configured.keys() {
        let dir = nodes.get(name).ok_or_else(|| {
            error!(name = %name, kind = kind_label, "Could not find in sysfs");
            ThermalError::MissingSysfsEntry {
                kind: kind_label,
                name: name.clone(),
            }
        })?;
        if !files.add(name, dir.join(file)) {
            return Err(ThermalError::DuplicateName {
                kind: kind_label,
                name: name.clone(),
            });
        }
    }
    Ok(files)
}
