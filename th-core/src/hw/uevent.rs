//! Kernel uevent decoding and the netlink socket that delivers them
//!
//! A uevent is a datagram of NUL-separated `KEY=value` records. Thermal zones
//! crossing a trip point send `SUBSYSTEM=thermal` followed later by
//! `NAME=<zone type>`.

use crate::constants::{uevent, watcher};
use std::collections::BTreeSet;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use tracing::{debug, error, trace, warn};

/// Decode one uevent message into a monitored sensor name
///
/// Records before the first `SUBSYSTEM=` record are ignored. A non-thermal
/// subsystem ends the scan, as does the first `NAME=` record after the
/// thermal marker. Names outside `monitored` are dropped.
pub fn parse_uevent(msg: &[u8], monitored: &BTreeSet<String>) -> Option<String> {
    let mut thermal_event = false;

    for record in msg.split(|&b| b == 0) {
        if record.is_empty() {
            continue;
        }
        let Ok(record) = std::str::from_utf8(record) else {
            trace!("Skipping non-UTF-8 uevent record");
            continue;
        };

        if !thermal_event {
            if record.starts_with(uevent::SUBSYSTEM_KEY) {
                if record.contains(uevent::THERMAL_SUBSYSTEM) {
                    thermal_event = true;
                } else {
                    return None;
                }
            }
        } else if let Some(pos) = record.find(uevent::NAME_KEY) {
            let name = &record[pos + uevent::NAME_KEY.len()..];
            if monitored.contains(name) {
                return Some(name.to_string());
            }
            trace!(name, "Uevent for unmonitored sensor");
            return None;
        }
    }
    None
}

/// Decode one received datagram, discarding any that filled the buffer
///
/// A datagram of [`watcher::UEVENT_MSG_LEN`] bytes or more may have been
/// truncated, so it is dropped rather than parsed.
pub fn decode_datagram(msg: &[u8], monitored: &BTreeSet<String>) -> Option<String> {
    if msg.len() >= watcher::UEVENT_MSG_LEN {
        error!(len = msg.len(), "Uevent overflowed buffer, discarding");
        return None;
    }
    parse_uevent(msg, monitored)
}

/// Non-blocking netlink socket subscribed to kernel uevents
#[derive(Debug)]
pub struct UeventSocket {
    fd: OwnedFd,
}

impl UeventSocket {
    /// Open and bind the socket with the given receive buffer size
    pub fn open(rcvbuf: usize) -> io::Result<Self> {
        // SAFETY: socket() has no memory-safety preconditions; the result is checked below.
        let raw = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_DGRAM | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
                libc::NETLINK_KOBJECT_UEVENT,
            )
        };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: raw is a freshly created descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let size = rcvbuf as libc::c_int;
        // SAFETY: the option value points at a live c_int of the declared length.
        let forced = unsafe {
            libc::setsockopt(
                raw,
                libc::SOL_SOCKET,
                libc::SO_RCVBUFFORCE,
                &size as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if forced != 0 {
            // SO_RCVBUFFORCE needs CAP_NET_ADMIN
            // SAFETY: same as above.
            unsafe {
                libc::setsockopt(
                    raw,
                    libc::SOL_SOCKET,
                    libc::SO_RCVBUF,
                    &size as *const _ as *const libc::c_void,
                    mem::size_of::<libc::c_int>() as libc::socklen_t,
                );
            }
        }

        // SAFETY: sockaddr_nl is a plain C struct; all-zero is a valid value.
        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        addr.nl_groups = 0xffff_ffff;

        // SAFETY: addr is a valid sockaddr_nl and the length matches its size.
        let ret = unsafe {
            libc::bind(
                raw,
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }

        debug!(fd = raw, rcvbuf, "Opened uevent socket");
        Ok(Self { fd })
    }

    /// Receive one datagram from the kernel
    ///
    /// Returns `Ok(None)` once the socket has nothing left to read.
    /// Datagrams from userspace senders come back as an empty slice.
    fn recv<'a>(&self, buf: &'a mut [u8]) -> io::Result<Option<&'a [u8]>> {
        loop {
            // SAFETY: sockaddr_nl is a plain C struct; all-zero is a valid value.
            let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
            let mut addr_len = mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;

            // SAFETY: buf and addr are valid for writes of the lengths passed.
            let n = unsafe {
                libc::recvfrom(
                    self.fd.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                    &mut addr as *mut _ as *mut libc::sockaddr,
                    &mut addr_len,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                return match err.kind() {
                    io::ErrorKind::WouldBlock => Ok(None),
                    io::ErrorKind::Interrupted => continue,
                    _ => Err(err),
                };
            }
            if addr.nl_groups == 0 || addr.nl_pid != 0 {
                trace!(pid = addr.nl_pid, "Ignoring uevent not sent by the kernel");
                return Ok(Some(&buf[..0]));
            }
            return Ok(Some(&buf[..n as usize]));
        }
    }

    /// Read every pending uevent and collect the monitored sensors they name
    pub fn drain(&self, monitored: &BTreeSet<String>) -> BTreeSet<String> {
        let mut sensors = BTreeSet::new();
        let mut buf = vec![0u8; watcher::UEVENT_MSG_LEN];

        loop {
            match self.recv(&mut buf) {
                Ok(Some(msg)) => {
                    if let Some(name) = decode_datagram(msg, monitored) {
                        sensors.insert(name);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Error reading from uevent socket");
                    break;
                }
            }
        }
        sensors
    }
}

impl AsRawFd for UeventSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
