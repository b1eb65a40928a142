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

//! Thermal HAL daemon (thermald)
//!
//! Loads the thermal config, programs trip points, watches kernel uevents and
//! logs every throttling change until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use th_core::{config_path, EnvProperties, SysfsLayout, Temperature, ThermalChangedCallback};
use thermhal::logger::{self, LOG_ENV};
use thermhal::ThermalHal;
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Command Line
// ============================================================================

#[derive(Debug, Default, PartialEq, Eq)]
struct Options {
    config: Option<PathBuf>,
    sysfs_root: Option<PathBuf>,
    dump: bool,
    json: bool,
    debug: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run(Options),
    Help,
    Version,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Command> {
    let mut options = Options::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            "-d" | "--debug" => options.debug = true,
            "--dump" => options.dump = true,
            "--json" => options.json = true,
            "-c" | "--config" => {
                let path = args.next().context("--config requires a path argument")?;
                options.config = Some(PathBuf::from(path));
            }
            "--sysfs-root" => {
                let path = args.next().context("--sysfs-root requires a path argument")?;
                options.sysfs_root = Some(PathBuf::from(path));
            }
            other => bail!("Unknown argument: {}", other),
        }
    }
    Ok(Command::Run(options))
}

fn print_help() {
    eprintln!("thermald {} - Thermal HAL daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    thermald [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config FILE     Thermal config");
    eprintln!("                          (default: <vendor etc>/thermal_info_config.json)");
    eprintln!("        --sysfs-root DIR  Prefix for every sysfs/procfs path");
    eprintln!("        --dump            Print the HAL state and exit");
    eprintln!("        --json            With --dump, print a JSON snapshot instead");
    eprintln!("    -d, --debug           Log at debug level");
    eprintln!("    -v, --version         Print version");
    eprintln!("    -h, --help            Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    {:<20}  Log filter (trace, debug, info, warn, error)", LOG_ENV);
    eprintln!("    VENDOR_THERMAL_CONFIG   Config file name under the vendor etc dir");
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        error!(location = %location, "PANIC: {}", panic_info);
        eprintln!("thermald panicked at {}: {}", location, panic_info);
    }));

    let options = match parse_args(std::env::args().skip(1))? {
        Command::Help => {
            print_help();
            return Ok(());
        }
        Command::Version => {
            println!("thermald {}", VERSION);
            return Ok(());
        }
        Command::Run(options) => options,
    };

    let target = logger::init_logging(options.debug);
    info!(version = VERSION, log_target = %target, "thermald starting");

    let layout = match &options.sysfs_root {
        Some(root) => SysfsLayout::rooted_at(root),
        None => SysfsLayout::default(),
    };
    let config = options
        .config
        .clone()
        .unwrap_or_else(|| config_path(&EnvProperties, &layout.vendor_etc_dir));
    info!(config = %config.display(), thermal_root = %layout.thermal_root.display(), "Using paths");

    let hal = ThermalHal::new(&config, layout);
    if !hal.is_initialized() {
        bail!("thermal HAL failed to initialize from {}", config.display());
    }

    if options.dump {
        if options.json {
            println!("{}", hal.snapshot_json().context("failed to serialize snapshot")?);
        } else {
            print!("{}", hal.debug_dump());
        }
        return Ok(());
    }

    let log_changes = |t: &Temperature| -> th_core::Result<()> {
        warn!(
            sensor = %t.name,
            temperature_type = %t.temperature_type,
            value = t.value,
            severity = %t.throttling_status,
            "Throttling status changed"
        );
        Ok(())
    };
    let log_changes: Arc<dyn ThermalChangedCallback> = Arc::new(log_changes);
    let status = hal.register_thermal_changed_callback(Some(log_changes), None);
    if !status.is_success() {
        warn!(status = %status, "Could not register logging callback");
    }

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM - initiating shutdown");
        let _ = stop_tx.send(());
    })
    .context("failed to install signal handler")?;

    info!(pid = std::process::id(), "thermald running");
    if stop_rx.recv().is_err() {
        warn!("Signal channel closed unexpectedly");
    }

    hal.shutdown();
    info!("SHUTDOWN: thermald terminated gracefully");
    Ok(())
}
