/*
 * This file is part of thermhal.
 *
 * Copyright (C) 2025 thermhal contributors
 *
 * thermhal is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * thermhal is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with thermhal. If not, see <https://www.gnu.org/licenses/>.
 */

//! Thermal HAL surface
//!
//! Every query answers with a [`ThermalStatus`] next to its data instead of
//! an error, so callers always get an explicit success/failure code and a
//! diagnostic string.

use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use th_core::{
    CallbackRegistry, CoolingDevice, CoolingType, CpuUsage, EventSource, KernelEventSource,
    LegacyTemperature, SysfsLayout, Temperature, TemperatureThreshold, TemperatureType,
    ThermalChangedCallback, ThermalError, ThermalHelper, ThrottlingArray,
};
use tracing::{error, info};

pub const INIT_FAILURE_MESSAGE: &str = "Failure initializing thermal HAL";
pub const READ_FAILURE_MESSAGE: &str = "Failed to read thermal sensors.";
pub const CPU_USAGE_FAILURE_MESSAGE: &str = "Failed to get CPU usages.";
pub const NULL_CALLBACK_MESSAGE: &str = "Invalid nullptr callback";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThermalStatusCode {
    Success,
    Failure,
}

/// Outcome of a HAL call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThermalStatus {
    pub code: ThermalStatusCode,
    pub debug_message: String,
}

impl ThermalStatus {
    pub fn success() -> Self {
        Self {
            code: ThermalStatusCode::Success,
            debug_message: String::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            code: ThermalStatusCode::Failure,
            debug_message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == ThermalStatusCode::Success
    }
}

impl fmt::Display for ThermalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            ThermalStatusCode::Success => write!(f, "SUCCESS"),
            ThermalStatusCode::Failure => write!(f, "FAILURE: {}", self.debug_message),
        }
    }
}

/// Point-in-time view of every query, for machine-readable dumps
#[derive(Debug, Clone, Serialize)]
pub struct HalSnapshot {
    pub status: ThermalStatus,
    pub temperatures: Vec<Temperature>,
    pub thresholds: Vec<TemperatureThreshold>,
    pub cooling_devices: Vec<CoolingDevice>,
    pub cpu_usages: Vec<CpuUsage>,
}

/// The thermal HAL: a helper (when startup succeeded) plus the observer list
///
/// A failed startup leaves the HAL up but answering every query with
/// [`INIT_FAILURE_MESSAGE`].
pub struct ThermalHal {
    helper: Option<Arc<ThermalHelper>>,
    callbacks: Arc<CallbackRegistry>,
}

impl ThermalHal {
    /// Start against the kernel uevent socket
    pub fn new(config_path: &Path, layout: SysfsLayout) -> Self {
        let callbacks = Arc::new(CallbackRegistry::new());
        let notifier = Self::notifier(&callbacks);
        let helper = ThermalHelper::init(config_path, layout, notifier)
            .map_err(|e| error!(error = %e, "ThermalHAL not initialized properly"))
            .ok();
        Self { helper, callbacks }
    }

    /// Start with a caller-supplied event source
    pub fn with_event_source<S: EventSource + 'static>(
        config_path: &Path,
        layout: SysfsLayout,
        source: S,
    ) -> Self {
        let callbacks = Arc::new(CallbackRegistry::new());
        let notifier = Self::notifier(&callbacks);
        let helper = ThermalHelper::new(config_path, layout, notifier)
            .map(Arc::new)
            .and_then(|helper| helper.start(source).map(|()| helper))
            .map_err(|e| error!(error = %e, "ThermalHAL not initialized properly"))
            .ok();
        Self { helper, callbacks }
    }

    /// Start with polling only; no uevent socket is opened
    pub fn polling(config_path: &Path, layout: SysfsLayout) -> Self {
        let callbacks = Arc::new(CallbackRegistry::new());
        let notifier = Self::notifier(&callbacks);
        let helper = ThermalHelper::new(config_path, layout, notifier)
            .map(Arc::new)
            .and_then(|helper| {
                let source = KernelEventSource::polling(helper.monitored_sensors());
                helper.start(source).map(|()| helper)
            })
            .map_err(|e| error!(error = %e, "ThermalHAL not initialized properly"))
            .ok();
        Self { helper, callbacks }
    }

    fn notifier(callbacks: &Arc<CallbackRegistry>) -> Arc<dyn th_core::ThrottlingNotifier> {
        let callbacks = Arc::clone(callbacks);
        Arc::new(move |temps: &[Temperature]| callbacks.dispatch(temps))
    }

    pub fn is_initialized(&self) -> bool {
        self.helper.is_some()
    }

    pub fn helper(&self) -> Option<&Arc<ThermalHelper>> {
        self.helper.as_ref()
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Stop the watcher thread
    pub fn shutdown(&self) {
        if let Some(helper) = &self.helper {
            helper.shutdown();
        }
    }

    /// Run `query` against the helper, mapping any failure to `message`
    fn query<T, F>(&self, message: &str, query: F) -> (ThermalStatus, Vec<T>)
    where
        F: FnOnce(&ThermalHelper) -> th_core::Result<Vec<T>>,
    {
        let Some(helper) = &self.helper else {
            error!("ThermalHAL not initialized properly");
            return (ThermalStatus::failure(INIT_FAILURE_MESSAGE), Vec::new());
        };
        match query(helper) {
            Ok(data) => (ThermalStatus::success(), data),
            Err(e) => {
                error!(error = %e, "{}", message);
                (ThermalStatus::failure(message), Vec::new())
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_temperatures(&self) -> (ThermalStatus, Vec<LegacyTemperature>) {
        self.query(READ_FAILURE_MESSAGE, |h| h.legacy_temperatures())
    }

    pub fn get_cpu_usages(&self) -> (ThermalStatus, Vec<CpuUsage>) {
        self.query(CPU_USAGE_FAILURE_MESSAGE, |h| h.cpu_usages())
    }

    /// Legacy cooling-device query; always empty once initialized
    pub fn get_cooling_devices(&self) -> (ThermalStatus, Vec<CoolingDevice>) {
        self.query(READ_FAILURE_MESSAGE, |_| Ok(Vec::new()))
    }

    pub fn get_current_temperatures(
        &self,
        filter: Option<TemperatureType>,
    ) -> (ThermalStatus, Vec<Temperature>) {
        self.query(READ_FAILURE_MESSAGE, |h| h.current_temperatures(filter))
    }

    pub fn get_temperature_thresholds(
        &self,
        filter: Option<TemperatureType>,
    ) -> (ThermalStatus, Vec<TemperatureThreshold>) {
        self.query(READ_FAILURE_MESSAGE, |h| h.temperature_thresholds(filter))
    }

    pub fn get_current_cooling_devices(
        &self,
        filter: Option<CoolingType>,
    ) -> (ThermalStatus, Vec<CoolingDevice>) {
        self.query(READ_FAILURE_MESSAGE, |h| h.current_cooling_devices(filter))
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    pub fn register_thermal_changed_callback(
        &self,
        callback: Option<Arc<dyn ThermalChangedCallback>>,
        filter: Option<TemperatureType>,
    ) -> ThermalStatus {
        let Some(callback) = callback else {
            error!("{}", NULL_CALLBACK_MESSAGE);
            return ThermalStatus::failure(NULL_CALLBACK_MESSAGE);
        };
        match self.callbacks.register(callback, filter) {
            Ok(()) => ThermalStatus::success(),
            Err(e) => {
                error!(error = %e, "Callback registration rejected");
                callback_failure(e)
            }
        }
    }

    pub fn unregister_thermal_changed_callback(
        &self,
        callback: Option<Arc<dyn ThermalChangedCallback>>,
    ) -> ThermalStatus {
        let Some(callback) = callback else {
            error!("{}", NULL_CALLBACK_MESSAGE);
            return ThermalStatus::failure(NULL_CALLBACK_MESSAGE);
        };
        match self.callbacks.unregister(&callback) {
            Ok(()) => ThermalStatus::success(),
            Err(e) => {
                error!(error = %e, "Callback unregistration rejected");
                callback_failure(e)
            }
        }
    }

    // ========================================================================
    // Debug Dump
    // ========================================================================

    /// Human-readable state summary; the format is not stable
    pub fn dump(&self, out: &mut dyn Write) -> io::Result<()> {
        let Some(helper) = &self.helper else {
            return writeln!(out, "ThermalHAL not initialized properly.");
        };

        writeln!(out, "getTemperatures:")?;
        match helper.legacy_temperatures() {
            Ok(temps) => {
                for t in temps {
                    writeln!(
                        out,
                        concat!(
                            " Type: {} Name: {} CurrentValue: {} ThrottlingThreshold: {}",
                            " ShutdownThreshold: {} VrThrottlingThreshold: {}"
                        ),
                        t.temperature_type,
                        t.name,
                        t.current_value,
                        t.throttling_threshold,
                        t.shutdown_threshold,
                        t.vr_throttling_threshold
                    )?;
                }
            }
            Err(_) => writeln!(out, "{}", READ_FAILURE_MESSAGE)?,
        }

        writeln!(out, "getCpuUsages:")?;
        match helper.cpu_usages() {
            Ok(usages) => {
                for u in usages {
                    writeln!(
                        out,
                        " Name: {} Active: {} Total: {} IsOnline: {}",
                        u.name, u.active, u.total, u.is_online
                    )?;
                }
            }
            Err(_) => writeln!(out, "{}", CPU_USAGE_FAILURE_MESSAGE)?,
        }

        writeln!(out, "getCurrentTemperatures:")?;
        match helper.current_temperatures(None) {
            Ok(temps) => {
                for t in temps {
                    writeln!(
                        out,
                        " Type: {} Name: {} CurrentValue: {} ThrottlingStatus: {}",
                        t.temperature_type, t.name, t.value, t.throttling_status
                    )?;
                }
            }
            Err(_) => writeln!(out, "Failed to getCurrentTemperatures.")?,
        }

        writeln!(out, "getTemperatureThresholds:")?;
        match helper.temperature_thresholds(None) {
            Ok(thresholds) => {
                for t in thresholds {
                    writeln!(
                        out,
                        concat!(
                            " Type: {} Name: {} hotThrottlingThreshold: {}",
                            " coldThrottlingThreshold: {} vrThrottlingThreshold: {}"
                        ),
                        t.temperature_type,
                        t.name,
                        format_array(&t.hot_throttling_thresholds),
                        format_array(&t.cold_throttling_thresholds),
                        t.vr_throttling_threshold
                    )?;
                }
            }
            Err(_) => writeln!(out, "Failed to getTemperatureThresholds.")?,
        }

        writeln!(out, "getCurrentCoolingDevices:")?;
        match helper.current_cooling_devices(None) {
            Ok(devices) => {
                for c in devices {
                    writeln!(
                        out,
                        " Type: {} Name: {} CurrentValue: {}",
                        c.cooling_type, c.name, c.value
                    )?;
                }
            }
            Err(_) => writeln!(out, "Failed to getCurrentCoolingDevices.")?,
        }

        let callbacks = self.callbacks.snapshot();
        writeln!(out, "Callbacks: Total {}", callbacks.len())?;
        for c in &callbacks {
            match c.filter {
                Some(t) => writeln!(out, " IsFilter: true Type: {}", t)?,
                None => writeln!(out, " IsFilter: false")?,
            }
        }

        writeln!(out, "getHysteresis:")?;
        for (name, info) in helper.sensor_info_map() {
            writeln!(
                out,
                " Name: {} hotHysteresis: {} coldHysteresis: {}",
                name,
                format_array(&info.hot_hysteresis),
                format_array(&info.cold_hysteresis)
            )?;
        }

        writeln!(out, "Monitor:")?;
        for (name, info) in helper.sensor_info_map() {
            match helper.sensor_status(name) {
                Some(status) => writeln!(
                    out,
                    " Name: {} Monitor: {} Severity: {}",
                    name, info.is_monitor, status.severity
                )?,
                None => writeln!(out, " Name: {} Monitor: {}", name, info.is_monitor)?,
            }
        }
        Ok(())
    }

    /// Collect every query; `status` is the first failure, if any
    pub fn snapshot(&self) -> HalSnapshot {
        let (temp_status, temperatures) = self.get_current_temperatures(None);
        let (threshold_status, thresholds) = self.get_temperature_thresholds(None);
        let (cdev_status, cooling_devices) = self.get_current_cooling_devices(None);
        let (cpu_status, cpu_usages) = self.get_cpu_usages();
        let status = [temp_status, threshold_status, cdev_status, cpu_status]
            .into_iter()
            .find(|s| !s.is_success())
            .unwrap_or_else(ThermalStatus::success);
        HalSnapshot {
            status,
            temperatures,
            thresholds,
            cooling_devices,
            cpu_usages,
        }
    }

    pub fn snapshot_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    pub fn debug_dump(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = self.dump(&mut buf) {
            error!(error = %e, "Failed to dump state");
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Drop for ThermalHal {
    fn drop(&mut self) {
        info!("Thermal HAL shutting down");
        self.shutdown();
    }
}

fn callback_failure(e: ThermalError) -> ThermalStatus {
    match e {
        ThermalError::Callback(message) => ThermalStatus::failure(message),
        other => ThermalStatus::failure(other.to_string()),
    }
}

fn format_array(values: &ThrottlingArray) -> String {
    let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", items.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn uninitialized() -> ThermalHal {
        ThermalHal::polling(
            &PathBuf::from("/nonexistent/thermal.json"),
            SysfsLayout::rooted_at(Path::new("/nonexistent")),
        )
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ThermalStatus::success().to_string(), "SUCCESS");
        assert_eq!(ThermalStatus::failure("boom").to_string(), "FAILURE: boom");
        assert!(ThermalStatus::success().is_success());
    }

    #[test]
    fn test_uninitialized_queries_fail() {
        let hal = uninitialized();
        assert!(!hal.is_initialized());

        let (status, temps) = hal.get_current_temperatures(None);
        assert_eq!(status, ThermalStatus::failure(INIT_FAILURE_MESSAGE));
        assert!(temps.is_empty());

        let (status, _) = hal.get_cpu_usages();
        assert_eq!(status.debug_message, INIT_FAILURE_MESSAGE);
        let (status, _) = hal.get_cooling_devices();
        assert_eq!(status.code, ThermalStatusCode::Failure);

        assert_eq!(hal.debug_dump(), "ThermalHAL not initialized properly.\n");
    }

    #[test]
    fn test_null_callback_rejected() {
        let hal = uninitialized();
        assert_eq!(
            hal.register_thermal_changed_callback(None, None),
            ThermalStatus::failure(NULL_CALLBACK_MESSAGE)
        );
        assert_eq!(
            hal.unregister_thermal_changed_callback(None),
            ThermalStatus::failure(NULL_CALLBACK_MESSAGE)
        );
    }

    #[test]
    fn test_callback_status_messages() {
        let hal = uninitialized();
        let cb: Arc<dyn ThermalChangedCallback> =
            Arc::new(|_: &Temperature| -> th_core::Result<()> { Ok(()) });

        assert!(hal.register_thermal_changed_callback(Some(Arc::clone(&cb)), None).is_success());
        let dup = hal.register_thermal_changed_callback(Some(Arc::clone(&cb)), None);
        assert_eq!(dup, ThermalStatus::failure("Same callback registered already"));

        assert!(hal.unregister_thermal_changed_callback(Some(Arc::clone(&cb))).is_success());
        let missing = hal.unregister_thermal_changed_callback(Some(cb));
        assert_eq!(missing, ThermalStatus::failure("The callback was not registered before"));
    }

    #[test]
    fn test_uninitialized_snapshot() {
        let hal = uninitialized();
        let snapshot = hal.snapshot();
        assert_eq!(snapshot.status, ThermalStatus::failure(INIT_FAILURE_MESSAGE));
        assert!(snapshot.temperatures.is_empty());

        let json: serde_json::Value = serde_json::from_str(&hal.snapshot_json().unwrap()).unwrap();
        assert_eq!(json["status"]["code"], "FAILURE");
        assert_eq!(json["status"]["debug_message"], INIT_FAILURE_MESSAGE);
    }

    #[test]
    fn test_format_array() {
        let mut values = [f32::NAN; 7];
        values[2] = 35.0;
        assert_eq!(format_array(&values), "[NaN NaN 35 NaN NaN NaN NaN]");
    }
}
