//! Throttling observer registry
//!
//! Observers are compared by identity. A failed delivery drops that observer;
//! observers filtered out by type are skipped and kept. Delivery runs without
//! the registry lock held, so an observer may register or unregister from
//! inside its own notification.

use crate::data::{Temperature, TemperatureType};
use crate::error::{Result, ThermalError};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info};

/// Receives severity change notifications
pub trait ThermalChangedCallback: Send + Sync {
    /// Deliver one changed temperature; an error marks the observer as dead
    fn notify_throttling(&self, temperature: &Temperature) -> Result<()>;
}

impl<F> ThermalChangedCallback for F
where
    F: Fn(&Temperature) -> Result<()> + Send + Sync,
{
    fn notify_throttling(&self, temperature: &Temperature) -> Result<()> {
        self(temperature)
    }
}

/// A registered observer and its optional type filter
#[derive(Clone)]
pub struct CallbackSetting {
    pub callback: Arc<dyn ThermalChangedCallback>,
    pub filter: Option<TemperatureType>,
}

impl CallbackSetting {
    fn accepts(&self, temperature_type: TemperatureType) -> bool {
        self.filter.map_or(true, |t| t == temperature_type)
    }
}

impl std::fmt::Debug for CallbackSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSetting")
            .field("callback", &Arc::as_ptr(&self.callback))
            .field("filter", &self.filter)
            .finish()
    }
}

fn same_callback(
    a: &Arc<dyn ThermalChangedCallback>,
    b: &Arc<dyn ThermalChangedCallback>,
) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Thread-safe list of observers
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    callbacks: Mutex<Vec<CallbackSetting>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer; registering the same observer twice fails
    pub fn register(
        &self,
        callback: Arc<dyn ThermalChangedCallback>,
        filter: Option<TemperatureType>,
    ) -> Result<()> {
        let mut callbacks = self.callbacks.lock();
        if callbacks.iter().any(|c| same_callback(&c.callback, &callback)) {
            return Err(ThermalError::callback("Same callback registered already"));
        }
        callbacks.push(CallbackSetting { callback, filter });
        info!(filter = ?filter, "A callback has been registered");
        Ok(())
    }

    /// Remove an observer by identity
    pub fn unregister(&self, callback: &Arc<dyn ThermalChangedCallback>) -> Result<()> {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|c| !same_callback(&c.callback, callback));
        if callbacks.len() == before {
            return Err(ThermalError::callback("The callback was not registered before"));
        }
        info!("A callback has been unregistered");
        Ok(())
    }

    /// Deliver each temperature to every observer whose filter accepts it
    ///
    /// Observers registered during delivery first hear from the next batch.
    pub fn dispatch(&self, temperatures: &[Temperature]) {
        let callbacks = self.snapshot();
        let mut dead: Vec<Arc<dyn ThermalChangedCallback>> = Vec::new();

        for t in temperatures {
            info!(
                sensor = %t.name,
                temperature_type = %t.temperature_type,
                value = t.value,
                severity = %t.throttling_status,
                "Sending notification"
            );
            for c in &callbacks {
                if !c.accepts(t.temperature_type)
                    || dead.iter().any(|d| same_callback(d, &c.callback))
                {
                    continue;
                }
                if let Err(e) = c.callback.notify_throttling(t) {
                    error!(error = %e, "A thermal callback is dead, removed from callback list");
                    dead.push(Arc::clone(&c.callback));
                }
            }
        }

        if !dead.is_empty() {
            self.callbacks
                .lock()
                .retain(|c| !dead.iter().any(|d| same_callback(d, &c.callback)));
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }

    /// Copy of the current registrations
    pub fn snapshot(&self) -> Vec<CallbackSetting> {
        self.callbacks.lock().clone()
    }
}
