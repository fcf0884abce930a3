#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![allow(async_fn_in_trait)]

//! Forced-mode acquisition for the Bosch BME688 gas sensor on Embassy.
//!
//! The crate drives the sensor through its configuration, triggers one conversion at a time,
//! waits for the conversion plus heater soak, drops the warm-up sample and emits one text line
//! per reading:
//!
//! ```text
//! timestamp_ms;temperature_C;humidity_pct;pressure_hPa;gas_ohm
//! 4182;22.500;45.12;1013.25;50000
//! ```
//!
//! Layers, leaves first: [`transport`] (register reads/writes over async I2C with a timeout),
//! [`clock`] (delays and timestamps), [`bme68x`] (calibration, configuration and compensation)
//! and [`acquisition`] (the measurement-cycle state machine).

#[macro_use]
mod fmt;

pub mod acquisition;
#[cfg(any(test, feature = "std"))]
pub mod analysis;
pub mod bme68x;
pub mod clock;
pub mod config;
pub mod engine;
pub mod record;
pub mod transport;

#[cfg(test)]
mod testing;

use core::fmt::{self as core_fmt, Display, Formatter};

pub use acquisition::{Acquisition, CycleOutcome, RecordSink, run};
pub use bme68x::Bme68x;
pub use clock::{Clock, EmbassyClock};
pub use config::AcquisitionConfig;
pub use engine::MeasurementEngine;
pub use fmt::Loggable;
pub use record::Record;
pub use transport::{I2cTransport, Transport};

/// One compensated reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    /// Monotonic milliseconds at which the result was read.
    pub timestamp_ms: u64,
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_pa: f32,
    /// Gas resistance. Not meaningful until the heater has stabilised.
    pub gas_ohm: f32,
    pub gas_valid: bool,
    pub heat_stable: bool,
}

/// Failure of a single bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// The transaction did not complete within the bus timeout.
    Timeout,
    /// The device did not acknowledge its address or data.
    NoAcknowledge,
    /// Any other failure reported by the I2C peripheral.
    Bus,
    /// The write payload exceeds [`transport::MAX_WRITE_LEN`]. Nothing was sent.
    PayloadTooLarge,
}

/// The bus or device could not be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusInitError {
    /// Not a 7-bit address.
    InvalidAddress(u8),
    /// Clock rate outside 1 Hz..=1 MHz.
    InvalidFrequency(u32),
    /// A zero timeout would fail every transaction.
    ZeroTimeout,
}

/// A configuration the measurement engine refuses to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Pressure and humidity compensation need a temperature reading.
    TemperatureSkipped,
    /// Heater duration in ms, must be 1..=4032 when the heater is enabled.
    HeaterDuration(u16),
    /// Heater target in °C, must not exceed 400.
    HeaterTemperature(u16),
}

/// BME68x engine error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    Bus(BusError),
    Config(ConfigError),
    /// The sensor kept reporting an active mode after repeated sleep requests.
    NotSleeping,
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Error::Bus(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl Display for BusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core_fmt::Result {
        match self {
            BusError::Timeout => f.write_str("bus transaction timed out"),
            BusError::NoAcknowledge => f.write_str("device did not acknowledge"),
            BusError::Bus => f.write_str("bus error"),
            BusError::PayloadTooLarge => f.write_str("write payload too large"),
        }
    }
}

impl Display for BusInitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core_fmt::Result {
        match self {
            BusInitError::InvalidAddress(a) => write!(f, "invalid 7-bit address {a:#04x}"),
            BusInitError::InvalidFrequency(hz) => write!(f, "unsupported bus clock {hz} Hz"),
            BusInitError::ZeroTimeout => f.write_str("bus timeout must be non-zero"),
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core_fmt::Result {
        match self {
            ConfigError::TemperatureSkipped => {
                f.write_str("temperature oversampling is required for pressure and humidity")
            }
            ConfigError::HeaterDuration(ms) => write!(f, "heater duration {ms} ms out of range"),
            ConfigError::HeaterTemperature(c) => write!(f, "heater target {c} °C out of range"),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> core_fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "{e}"),
            Error::Config(e) => write!(f, "{e}"),
            Error::NotSleeping => f.write_str("sensor did not enter sleep mode"),
        }
    }
}
