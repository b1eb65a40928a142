//! Name-to-file registry for sensors and cooling devices
//!
//! Populated once at startup, then only read. No locking is needed since
//! nothing mutates it after the watcher thread starts.

use crate::error::{Result, ThermalError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// What a registry holds; picks the error for unknown names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Sensor,
    CoolingDevice,
}

impl FileKind {
    pub fn label(self) -> &'static str {
        match self {
            FileKind::Sensor => "sensor",
            FileKind::CoolingDevice => "cooling device",
        }
    }

    fn not_found(self, name: &str) -> ThermalError {
        match self {
            FileKind::Sensor => ThermalError::SensorNotFound(name.to_string()),
            FileKind::CoolingDevice => ThermalError::CoolingDeviceNotFound(name.to_string()),
        }
    }
}

/// Maps a logical sensor or cooling device name to the file holding its reading
#[derive(Debug)]
pub struct ThermalFiles {
    kind: FileKind,
    files: HashMap<String, PathBuf>,
}

impl ThermalFiles {
    pub fn new(kind: FileKind) -> Self {
        Self {
            kind,
            files: HashMap::new(),
        }
    }

    /// Register a file; returns false if the name is already present
    pub fn add(&mut self, name: &str, path: impl Into<PathBuf>) -> bool {
        if self.files.contains_key(name) {
            return false;
        }
        self.files.insert(name.to_string(), path.into());
        true
    }

    pub fn path(&self, name: &str) -> Option<&Path> {
        self.files.get(name).map(PathBuf::as_path)
    }

    /// Read the trimmed contents of the file registered under `name`
    pub fn read(&self, name: &str) -> Result<String> {
        let path = self
            .path(name)
            .ok_or_else(|| self.kind.not_found(name))?;
        let content = fs::read_to_string(path).map_err(|source| {
            warn!(name, path = %path.display(), error = %source, "Failed to read thermal file");
            ThermalError::FileRead {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(content.trim().to_string())
    }

    pub fn count(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_add_rejects_duplicates() {
        let mut files = ThermalFiles::new(FileKind::Sensor);
        assert!(files.add("cpu0", "/tmp/a"));
        assert!(!files.add("cpu0", "/tmp/b"));
        assert_eq!(files.count(), 1);
        assert_eq!(files.path("cpu0"), Some(Path::new("/tmp/a")));
    }

    #[test]
    fn test_read_trims_contents() {
        let dir = TempDir::new().unwrap();
        let temp = dir.path().join("temp");
        fs::write(&temp, "42000\n").unwrap();

        let mut files = ThermalFiles::new(FileKind::Sensor);
        files.add("skin", &temp);
        assert_eq!(files.read("skin").unwrap(), "42000");
    }

    #[test]
    fn test_read_unknown_or_missing() {
        let dir = TempDir::new().unwrap();
        let mut files = ThermalFiles::new(FileKind::Sensor);
        files.add("gone", dir.path().join("missing"));

        assert!(matches!(
            files.read("nope"),
            Err(ThermalError::SensorNotFound(_))
        ));
        assert!(matches!(
            files.read("gone"),
            Err(ThermalError::FileRead { .. })
        ));
    }

    #[test]
    fn test_unknown_cooling_device_named_as_such() {
        let files = ThermalFiles::new(FileKind::CoolingDevice);
        let err = files.read("modem").unwrap_err();
        assert!(matches!(err, ThermalError::CoolingDeviceNotFound(ref n) if n == "modem"));
        assert!(err.to_string().starts_with("Cooling device not found"));
    }
}
