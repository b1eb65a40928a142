//! Kernel interface modules
//!
//! Contains all sysfs, procfs and netlink access for thermal zones and
//! cooling devices.

mod files;
mod sysfs;
mod uevent;

pub use files::{FileKind, ThermalFiles};
pub use sysfs::{
    cpu_core_count, cpu_usages, discover_paths, program_trip_point, SysfsLayout,
};
pub use uevent::{decode_datagram, parse_uevent, UeventSocket};
