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

//! thermhal - thermal HAL daemon over the Linux thermal sysfs interface
//!
//! This library exposes the HAL surface (status-carrying queries, observer
//! registration and the debug dump) on top of `th-core`, plus the logging
//! setup used by the `thermald` binary.

pub mod hal;
pub mod logger;

pub use hal::{HalSnapshot, ThermalHal, ThermalStatus, ThermalStatusCode};
