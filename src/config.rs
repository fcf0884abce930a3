//! Fixed run configuration.
//!
//! Everything is decided at build time; nothing is reconfigured while the loop runs.

use crate::engine::{Filter, HeaterConfig, MeasurementConfig, Oversampling};

/// Secondary BME68x address (SDO pulled high).
pub const SENSOR_ADDRESS: u8 = 0x77;
/// Standard-mode I2C.
pub const BUS_FREQUENCY_HZ: u32 = 100_000;
/// Upper bound for one bus transaction.
pub const BUS_TIMEOUT_MS: u32 = 50;

/// Chip id register and the value a BME68x reports there.
pub const CHIP_ID_REGISTER: u8 = 0xD0;
pub const EXPECTED_CHIP_ID: u8 = 0x61;

/// Valid conversions dropped after boot before anything is emitted.
pub const WARMUP_SAMPLES: u8 = 1;
/// Pause after each cycle, on top of the conversion wait.
pub const CYCLE_INTERVAL_MS: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    pub address: u8,
    pub frequency_hz: u32,
    pub timeout_ms: u32,
}

impl BusConfig {
    pub const DEFAULT: Self = Self {
        address: SENSOR_ADDRESS,
        frequency_hz: BUS_FREQUENCY_HZ,
        timeout_ms: BUS_TIMEOUT_MS,
    };
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// What to do when the chip id does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdentityPolicy {
    /// Log the mismatch and carry on. Tolerates sensor variants.
    Warn,
    /// Treat a mismatch or an unreadable id as a setup failure.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AcquisitionConfig {
    pub bus: BusConfig,
    pub identity: IdentityPolicy,
    pub expected_chip_id: u8,
    pub measurement: MeasurementConfig,
    pub heater: HeaterConfig,
    pub warmup_samples: u8,
    pub interval_ms: u32,
}

impl AcquisitionConfig {
    pub const DEFAULT: Self = Self {
        bus: BusConfig::DEFAULT,
        identity: IdentityPolicy::Warn,
        expected_chip_id: EXPECTED_CHIP_ID,
        measurement: MeasurementConfig {
            os_temp: Oversampling::X8,
            os_pres: Oversampling::X4,
            os_hum: Oversampling::X2,
            filter: Filter::Off,
        },
        heater: HeaterConfig {
            enable: true,
            target_temp_c: 320,
            duration_ms: 150,
        },
        warmup_samples: WARMUP_SAMPLES,
        interval_ms: CYCLE_INTERVAL_MS,
    };
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
