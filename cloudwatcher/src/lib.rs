//! # cloudwatcher
//!
//! A library for talking to the AAG CloudWatcher weather station over its
//! serial link.
//!
//! This crate provides:
//!
//! - The normal command protocol: 15-byte response frames terminated by a
//!   handshake frame, and typed getters for every station command
//! - A connection guard that absorbs short bursts of line noise and
//!   re-acquires the link when they persist
//! - The three-phase firmware upgrade (preamble, byte transfer, drain)
//! - Pure conversions from raw readings to physical units
//!
//! ## Supported Firmware
//!
//! - **Current** (default): no parity, electrical constants probed on open
//! - **Legacy**: odd parity with an inter-byte timeout
//!
//! ## Features
//!
//! - `native` (default): serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use cloudwatcher::{CloudWatcher, ProtocolVariant, convert};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let mut station = CloudWatcher::open("/dev/ttyUSB0", ProtocolVariant::Current)?;
//!
//!         println!("Serial number: {}", station.serial_number()?);
//!
//!         let sky = convert::ir_temperature(station.sky_ir_raw()?);
//!         let ambient = convert::ir_temperature(station.ir_sensor_raw()?);
//!         println!("Sky {sky:.1} °C, ambient {ambient:.1} °C");
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod convert;
pub mod error;
pub mod guard;
pub mod link;
pub mod protocol;
pub mod station;
pub mod upgrade;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use link::{NativeLink, list_ports};
pub use {
    error::{Error, Result},
    guard::{ConnectionGuard, FAILURE_THRESHOLD, GuardAction},
    link::{Link, LinkConfig, PortInfo},
    protocol::{Command, Frame, HeaterPwm, ProtocolVariant},
    station::{
        AnalogValues, CloudWatcher, ElectricalConstants, InternalErrors, Precision,
        SensorReading,
    },
    upgrade::{
        FirmwareImage, NoProgress, ProgressObserver, ProgressSnapshot, UpgradeReport,
        UpgradeSettings,
    },
};
