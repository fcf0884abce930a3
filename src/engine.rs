//! Measurement engine contract consumed by the acquisition loop.

use heapless::Vec;

use crate::{ConfigError, Loggable, Sample};

/// Largest batch a single [`MeasurementEngine::get_data`] call may return.
pub const MAX_SAMPLES: usize = 3;

/// Candidate samples from one fetch. Empty means "nothing new", not an error.
pub type Samples = Vec<Sample, MAX_SAMPLES>;

/// Longest heater soak the gas-wait register can encode.
pub const MAX_HEATER_DURATION_MS: u16 = 0xFC0;
/// Highest heater target accepted.
pub const MAX_HEATER_TEMP_C: u16 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatingMode {
    Sleep = 0,
    /// One conversion, then back to sleep.
    Forced = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Oversampling {
    Skipped = 0,
    X1 = 1,
    X2 = 2,
    X4 = 3,
    X8 = 4,
    X16 = 5,
}

impl Oversampling {
    /// Conversion cycles this setting costs.
    pub const fn cycles(self) -> u32 {
        match self {
            Oversampling::Skipped => 0,
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
            Oversampling::X16 => 16,
        }
    }
}

/// IIR filter coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Filter {
    Off = 0,
    Size1 = 1,
    Size3 = 2,
    Size7 = 3,
    Size15 = 4,
    Size31 = 5,
    Size63 = 6,
    Size127 = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MeasurementConfig {
    pub os_temp: Oversampling,
    pub os_pres: Oversampling,
    pub os_hum: Oversampling,
    pub filter: Filter,
}

impl MeasurementConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let needs_temp =
            self.os_pres != Oversampling::Skipped || self.os_hum != Oversampling::Skipped;
        if needs_temp && self.os_temp == Oversampling::Skipped {
            return Err(ConfigError::TemperatureSkipped);
        }
        Ok(())
    }
}

/// Gas heater profile for forced mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeaterConfig {
    pub enable: bool,
    pub target_temp_c: u16,
    pub duration_ms: u16,
}

impl HeaterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enable {
            return Ok(());
        }
        if self.duration_ms == 0 || self.duration_ms > MAX_HEATER_DURATION_MS {
            return Err(ConfigError::HeaterDuration(self.duration_ms));
        }
        if self.target_temp_c > MAX_HEATER_TEMP_C {
            return Err(ConfigError::HeaterTemperature(self.target_temp_c));
        }
        Ok(())
    }

    /// Heater soak in microseconds. Counted whether or not the heater is enabled.
    pub fn soak_us(&self) -> u32 {
        u32::from(self.duration_ms) * 1000
    }
}

/// Calibrated gas/temperature/humidity/pressure sensor.
///
/// The engine owns calibration state; callers only configure it, trigger conversions and
/// collect results.
pub trait MeasurementEngine {
    type Error: Loggable;

    async fn set_config(&mut self, config: &MeasurementConfig) -> Result<(), Self::Error>;

    async fn set_heater_config(
        &mut self,
        mode: OperatingMode,
        heater: &HeaterConfig,
    ) -> Result<(), Self::Error>;

    /// Conversion time in microseconds for `config`, excluding heater soak.
    fn measurement_duration(&self, mode: OperatingMode, config: &MeasurementConfig) -> u32;

    /// Entering [`OperatingMode::Forced`] starts one conversion.
    async fn set_operating_mode(&mut self, mode: OperatingMode) -> Result<(), Self::Error>;

    async fn get_data(&mut self, mode: OperatingMode) -> Result<Samples, Self::Error>;
}
