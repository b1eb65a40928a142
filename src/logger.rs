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

use std::path::Path;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "THERMHAL_LOG";
pub const DEFAULT_LOG_LEVEL: &str = "info";
const JOURNAL_SOCKET: &str = "/run/systemd/journal/socket";

/// Where log records end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Journald,
    Stderr,
}

impl std::fmt::Display for LogTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogTarget::Journald => write!(f, "systemd journal"),
            LogTarget::Stderr => write!(f, "stderr"),
        }
    }
}

/// `THERMHAL_LOG`, or `info` when unset or empty
pub fn log_level() -> String {
    std::env::var(LOG_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

/// Install the global subscriber
///
/// Uses the journal when its socket exists and falls back to stderr.
/// `verbose` forces `debug` regardless of `THERMHAL_LOG`.
pub fn init_logging(verbose: bool) -> LogTarget {
    let level = if verbose { "debug".to_string() } else { log_level() };

    if Path::new(JOURNAL_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                let installed = tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(EnvFilter::new(&level))
                    .try_init();
                if installed.is_ok() {
                    return LogTarget::Journald;
                }
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stderr", e);
            }
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_env_filter(EnvFilter::new(&level))
        .try_init();
    LogTarget::Stderr
}
