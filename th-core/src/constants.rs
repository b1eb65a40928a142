//! Constants and configuration values for thermhal
//!
//! Centralizes paths, sysfs file names, and watcher timing.
//! Add new magic numbers here rather than inlining them.

use std::time::Duration;

/// Filesystem roots consumed by the thermal core
pub mod paths {
    /// Root holding `thermal_zoneN` and `cooling_deviceN` directories
    pub const THERMAL_SENSORS_ROOT: &str = "/sys/devices/virtual/thermal";

    /// CPU topology root (per-core `cpuN/online` files)
    pub const CPU_ONLINE_ROOT: &str = "/sys/devices/system/cpu";

    /// Range of present CPUs, e.g. `0-7`
    pub const CPU_PRESENT_FILE: &str = "/sys/devices/system/cpu/present";

    /// Aggregate CPU time counters
    pub const CPU_USAGE_FILE: &str = "/proc/stat";

    /// Directory holding the vendor thermal configuration
    pub const VENDOR_ETC_DIR: &str = "/vendor/etc";
}

/// Names of files and directories inside the thermal sysfs tree
pub mod sysfs {
    pub const SENSOR_PREFIX: &str = "thermal_zone";
    pub const COOLING_DEVICE_PREFIX: &str = "cooling_device";
    pub const NAME_FILE: &str = "type";
    pub const POLICY_FILE: &str = "policy";
    pub const SENSOR_TEMP_FILE: &str = "temp";
    pub const TRIP_POINT_0_TEMP_FILE: &str = "trip_point_0_temp";
    pub const TRIP_POINT_0_HYST_FILE: &str = "trip_point_0_hyst";
    pub const COOLING_DEVICE_STATE_FILE: &str = "cur_state";
    pub const CPU_ONLINE_FILE: &str = "online";

    /// Policy value meaning the zone emits uevents on trip crossings
    pub const USER_SPACE_POLICY: &str = "user_space";
}

/// Thermal configuration lookup
pub mod config {
    /// Property naming the JSON config file inside the vendor etc dir
    pub const CONFIG_PROPERTY: &str = "vendor.thermal.config";

    /// File used when the property is unset
    pub const DEFAULT_CONFIG_FILE: &str = "thermal_info_config.json";
}

/// Watcher loop timing and uevent buffer sizes
pub mod watcher {
    use super::Duration;

    /// Poll interval while throttling or when uevents are unavailable
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(2000);

    /// Maximum wait for a uevent while nothing is throttled
    pub const UEVENT_POLL_TIMEOUT: Duration = Duration::from_millis(300_000);

    /// Largest uevent message accepted; longer messages are dropped
    pub const UEVENT_MSG_LEN: usize = 2048;

    /// Receive buffer requested for the netlink socket
    pub const UEVENT_SOCKET_RCVBUF: usize = 64 * 1024;

    /// Name given to the watcher thread
    pub const THREAD_NAME: &str = "thermal-watcher";
}

/// Uevent record markers
pub mod uevent {
    pub const SUBSYSTEM_KEY: &str = "SUBSYSTEM=";
    pub const THERMAL_SUBSYSTEM: &str = "SUBSYSTEM=thermal";
    pub const NAME_KEY: &str = "NAME=";
}
