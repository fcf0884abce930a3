//! Bosch BME680/BME688 driver implementing [`MeasurementEngine`].
//!
//! Register writes go out as interleaved register/value pairs in a single transaction, which
//! is how the BME68x accepts multi-register updates over I2C.

mod calib;
mod compensate;

pub use calib::CalibData;
pub use compensate::AMBIENT_TEMP_C;

use crate::clock::Clock;
use crate::engine::{
    HeaterConfig, MeasurementConfig, MeasurementEngine, OperatingMode, Oversampling, Samples,
};
use crate::transport::Transport;
use crate::{Error, Sample};

pub(crate) mod regs {
    pub const RES_HEAT_0: u8 = 0x5A;
    pub const GAS_WAIT_0: u8 = 0x64;
    pub const CTRL_GAS_0: u8 = 0x70;
    pub const CTRL_GAS_1: u8 = 0x71;
    pub const CTRL_HUM: u8 = 0x72;
    pub const CTRL_MEAS: u8 = 0x74;
    pub const CONFIG: u8 = 0x75;
    /// First byte of the 17-byte field block.
    pub const FIELD_0: u8 = 0x1D;
    pub const CHIP_ID: u8 = 0xD0;
    pub const SOFT_RESET: u8 = 0xE0;
    pub const VARIANT_ID: u8 = 0xF0;
}

mod msks {
    pub const SOFT_RESET_CMD: u8 = 0xB6;
    pub const MODE: u8 = 0x03;
    pub const OSRS_H: u8 = 0x07;
    pub const OSRS_T: u8 = 0xE0;
    pub const OSRS_P: u8 = 0x1C;
    pub const FILTER: u8 = 0x1C;
    pub const HEATER_OFF: u8 = 0x08;
    pub const NB_CONV: u8 = 0x0F;
    pub const RUN_GAS: u8 = 0x30;
    pub const NEW_DATA: u8 = 0x80;
    pub const GAS_VALID: u8 = 0x20;
    pub const HEAT_STAB: u8 = 0x10;
    pub const GAS_RANGE: u8 = 0x0F;
}

const FIELD_LEN: usize = 17;
/// Wait after a soft reset, and between mode and data polls.
const POLL_PERIOD_US: u32 = 10_000;
const MODE_POLLS: usize = 5;
const DATA_POLLS: usize = 5;

// Conversion timing, in microseconds.
const CYCLE_US: u32 = 1963;
const TPH_SWITCHING_US: u32 = 477 * 4;
const GAS_MEASUREMENT_US: u32 = 477 * 5;
const WAKE_UP_US: u32 = 1000;

/// Gas ADC generation, from the variant id register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Variant {
    /// BME680.
    GasLow,
    /// BME688.
    GasHigh,
}

impl Variant {
    fn from_id(id: u8) -> Self {
        if id == 0x01 {
            Variant::GasHigh
        } else {
            Variant::GasLow
        }
    }

    fn run_gas(self) -> u8 {
        match self {
            Variant::GasLow => 0x01,
            Variant::GasHigh => 0x02,
        }
    }
}

/// Conversion time in microseconds, excluding heater soak.
pub fn measurement_duration(config: &MeasurementConfig) -> u32 {
    let cycles = config.os_temp.cycles() + config.os_pres.cycles() + config.os_hum.cycles();
    cycles * CYCLE_US + TPH_SWITCHING_US + GAS_MEASUREMENT_US + WAKE_UP_US
}

/// Driver state: the transport, a clock for its internal waits, and the calibration.
pub struct Bme68x<T, C> {
    transport: T,
    clock: C,
    calib: CalibData,
    variant: Variant,
    config: MeasurementConfig,
}

impl<T: Transport, C: Clock> Bme68x<T, C> {
    /// Soft-resets the sensor and loads its calibration.
    ///
    /// The chip id is not checked here.
    pub async fn init(transport: T, clock: C) -> Result<Self, Error> {
        let mut dev = Self {
            transport,
            clock,
            calib: CalibData::default(),
            variant: Variant::GasLow,
            config: MeasurementConfig {
                os_temp: Oversampling::Skipped,
                os_pres: Oversampling::Skipped,
                os_hum: Oversampling::Skipped,
                filter: crate::engine::Filter::Off,
            },
        };

        dev.transport
            .write_register(regs::SOFT_RESET, &[msks::SOFT_RESET_CMD])
            .await?;
        dev.clock.delay_us(POLL_PERIOD_US).await;

        dev.variant = Variant::from_id(dev.read_byte(regs::VARIANT_ID).await?);

        let mut image = [0u8; calib::LEN];
        let mut offset = 0;
        for (start, len) in calib::BLOCKS {
            dev.transport
                .read_register(start, &mut image[offset..offset + len])
                .await?;
            offset += len;
        }
        dev.calib = CalibData::parse(&image);
        debug!("bme68x variant {:?}", dev.variant);

        Ok(dev)
    }

    pub fn calibration(&self) -> &CalibData {
        &self.calib
    }

    /// Last configuration accepted by [`MeasurementEngine::set_config`].
    pub fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub async fn chip_id(&mut self) -> Result<u8, Error> {
        self.read_byte(regs::CHIP_ID).await
    }

    /// Gives back the transport and clock.
    pub fn release(self) -> (T, C) {
        (self.transport, self.clock)
    }

    async fn read_byte(&mut self, register: u8) -> Result<u8, Error> {
        let mut buf = [0u8];
        self.transport.read_register(register, &mut buf).await?;
        Ok(buf[0])
    }

    /// Writes up to eight register/value pairs in one transaction.
    async fn set_regs(&mut self, pairs: &[(u8, u8)]) -> Result<(), Error> {
        let Some(((first, first_val), rest)) = pairs.split_first() else {
            return Ok(());
        };
        let mut payload = heapless::Vec::<u8, 15>::new();
        let _ = payload.push(*first_val);
        for (reg, val) in rest {
            payload
                .extend_from_slice(&[*reg, *val])
                .map_err(|_| Error::Bus(crate::BusError::PayloadTooLarge))?;
        }
        self.transport.write_register(*first, &payload).await?;
        Ok(())
    }

    async fn current_mode(&mut self) -> Result<(u8, u8), Error> {
        let ctrl_meas = self.read_byte(regs::CTRL_MEAS).await?;
        Ok((ctrl_meas, ctrl_meas & msks::MODE))
    }

    /// Puts the sensor to sleep, waiting out a conversion in progress.
    async fn enter_sleep(&mut self) -> Result<u8, Error> {
        for _ in 0..MODE_POLLS {
            let (ctrl_meas, mode) = self.current_mode().await?;
            if mode == OperatingMode::Sleep as u8 {
                return Ok(ctrl_meas);
            }
            self.set_regs(&[(regs::CTRL_MEAS, ctrl_meas & !msks::MODE)])
                .await?;
            self.clock.delay_us(POLL_PERIOD_US).await;
        }
        warn!("bme68x did not enter sleep mode");
        Err(Error::NotSleeping)
    }

    fn compensate(&self, field: &[u8; FIELD_LEN], timestamp_ms: u64) -> Sample {
        let press_adc = (u32::from(field[2]) << 12)
            | (u32::from(field[3]) << 4)
            | (u32::from(field[4]) >> 4);
        let temp_adc = (u32::from(field[5]) << 12)
            | (u32::from(field[6]) << 4)
            | (u32::from(field[7]) >> 4);
        let hum_adc = u16::from_be_bytes([field[8], field[9]]);

        // Each generation reports its gas result in a different register pair.
        let (gas_msb, gas_lsb) = match self.variant {
            Variant::GasLow => (field[13], field[14]),
            Variant::GasHigh => (field[15], field[16]),
        };
        let gas_adc = (u16::from(gas_msb) << 2) | u16::from(gas_lsb >> 6);
        let gas_range = gas_lsb & msks::GAS_RANGE;

        let (temperature_c, t_fine) = compensate::temperature(&self.calib, temp_adc);
        let gas_ohm = match self.variant {
            Variant::GasLow => compensate::gas_resistance_low(&self.calib, gas_adc, gas_range),
            Variant::GasHigh => compensate::gas_resistance_high(gas_adc, gas_range),
        };

        Sample {
            timestamp_ms,
            temperature_c,
            humidity_pct: compensate::humidity(&self.calib, t_fine, hum_adc),
            pressure_pa: compensate::pressure(&self.calib, t_fine, press_adc),
            gas_ohm,
            gas_valid: gas_lsb & msks::GAS_VALID != 0,
            heat_stable: gas_lsb & msks::HEAT_STAB != 0,
        }
    }
}

impl<T: Transport, C: Clock> MeasurementEngine for Bme68x<T, C> {
    type Error = Error;

    async fn set_config(&mut self, config: &MeasurementConfig) -> Result<(), Error> {
        config.validate()?;
        let ctrl_meas = self.enter_sleep().await?;

        let mut ctrl = [0u8; 5];
        self.transport.read_register(regs::CTRL_GAS_1, &mut ctrl).await?;
        let ctrl_hum = (ctrl[1] & !msks::OSRS_H) | config.os_hum as u8;
        let ctrl_meas = (ctrl_meas & !(msks::OSRS_T | msks::OSRS_P))
            | ((config.os_temp as u8) << 5)
            | ((config.os_pres as u8) << 2);
        let conf = (ctrl[4] & !msks::FILTER) | ((config.filter as u8) << 2);

        // ctrl_hum only takes effect once ctrl_meas is written after it.
        self.set_regs(&[
            (regs::CTRL_HUM, ctrl_hum),
            (regs::CTRL_MEAS, ctrl_meas),
            (regs::CONFIG, conf),
        ])
        .await?;
        self.config = *config;
        debug!(
            "bme68x configured: os_t {:?} os_p {:?} os_h {:?} filter {:?}",
            config.os_temp, config.os_pres, config.os_hum, config.filter
        );
        Ok(())
    }

    async fn set_heater_config(
        &mut self,
        _mode: OperatingMode,
        heater: &HeaterConfig,
    ) -> Result<(), Error> {
        heater.validate()?;
        self.enter_sleep().await?;

        if heater.enable {
            let res_heat =
                compensate::heater_resistance(&self.calib, heater.target_temp_c, AMBIENT_TEMP_C);
            let gas_wait = compensate::gas_wait(heater.duration_ms);
            self.set_regs(&[(regs::RES_HEAT_0, res_heat), (regs::GAS_WAIT_0, gas_wait)])
                .await?;
        }

        let mut ctrl_gas = [0u8; 2];
        self.transport
            .read_register(regs::CTRL_GAS_0, &mut ctrl_gas)
            .await?;
        let (heater_off, run_gas) = if heater.enable {
            (0, self.variant.run_gas())
        } else {
            (msks::HEATER_OFF, 0)
        };
        let ctrl_gas_0 = (ctrl_gas[0] & !msks::HEATER_OFF) | heater_off;
        // Profile 0, the only one forced mode uses.
        let ctrl_gas_1 = (ctrl_gas[1] & !(msks::NB_CONV | msks::RUN_GAS)) | (run_gas << 4);
        self.set_regs(&[(regs::CTRL_GAS_0, ctrl_gas_0), (regs::CTRL_GAS_1, ctrl_gas_1)])
            .await?;
        debug!(
            "bme68x heater: enable {} target {} C for {} ms",
            heater.enable, heater.target_temp_c, heater.duration_ms
        );
        Ok(())
    }

    // Only parallel mode skips the wake-up time, and it is not supported.
    fn measurement_duration(&self, _mode: OperatingMode, config: &MeasurementConfig) -> u32 {
        measurement_duration(config)
    }

    async fn set_operating_mode(&mut self, mode: OperatingMode) -> Result<(), Error> {
        let ctrl_meas = self.enter_sleep().await?;
        if mode != OperatingMode::Sleep {
            self.set_regs(&[(regs::CTRL_MEAS, (ctrl_meas & !msks::MODE) | mode as u8)])
                .await?;
        }
        Ok(())
    }

    async fn get_data(&mut self, mode: OperatingMode) -> Result<Samples, Error> {
        let mut samples = Samples::new();
        if mode != OperatingMode::Forced {
            return Ok(samples);
        }

        let mut field = [0u8; FIELD_LEN];
        for attempt in 0..DATA_POLLS {
            self.transport.read_register(regs::FIELD_0, &mut field).await?;
            if field[0] & msks::NEW_DATA != 0 {
                let sample = self.compensate(&field, self.clock.now_ms());
                let _ = samples.push(sample);
                return Ok(samples);
            }
            if attempt + 1 < DATA_POLLS {
                self.clock.delay_us(POLL_PERIOD_US).await;
            }
        }
        trace!("bme68x: no new data");
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::engine::Filter;
    use crate::testing::{BusOp, ClockEvent, FakeBme688, FakeClock, field_block};
    use crate::transport::I2cTransport;
    use crate::{BusError, ConfigError};
    use embassy_futures::block_on;

    type Dev = Bme68x<I2cTransport<FakeBme688, FakeClock>, FakeClock>;

    const CONFIG: MeasurementConfig = MeasurementConfig {
        os_temp: Oversampling::X8,
        os_pres: Oversampling::X4,
        os_hum: Oversampling::X2,
        filter: Filter::Off,
    };

    const HEATER: HeaterConfig = HeaterConfig {
        enable: true,
        target_temp_c: 320,
        duration_ms: 150,
    };

    fn init(device: &FakeBme688, clock: &FakeClock) -> Dev {
        let t = I2cTransport::new(device.clone(), &BusConfig::DEFAULT, clock.clone()).unwrap();
        block_on(Bme68x::init(t, clock.clone())).unwrap()
    }

    #[test]
    fn init_resets_and_reads_calibration() {
        let device = FakeBme688::new(0x77);
        let clock = FakeClock::default();
        let dev = init(&device, &clock);

        assert_eq!(
            device.ops(),
            vec![
                BusOp::Write(vec![0xE0, 0xB6]),
                BusOp::Read {
                    register: 0xF0,
                    len: 1
                },
                BusOp::Read {
                    register: 0x8A,
                    len: 23
                },
                BusOp::Read {
                    register: 0xE1,
                    len: 14
                },
                BusOp::Read {
                    register: 0x00,
                    len: 5
                },
            ]
        );
        assert_eq!(clock.events(), vec![ClockEvent::Sleep(10)]);
        assert_eq!(dev.variant(), Variant::GasHigh);
        assert_eq!(dev.calibration().par_t1, 26201);
    }

    #[test]
    fn init_does_not_check_chip_id() {
        let device = FakeBme688::new(0x77);
        device.set_reg(regs::CHIP_ID, 0x55);
        let clock = FakeClock::default();
        let mut dev = init(&device, &clock);
        assert_eq!(block_on(dev.chip_id()), Ok(0x55));
    }

    #[test]
    fn release_returns_a_working_transport() {
        let device = FakeBme688::new(0x77);
        let clock = FakeClock::default();
        let dev = init(&device, &clock);
        device.clear_ops();

        let (mut transport, _clock) = dev.release();
        assert_eq!(transport.address(), 0x77);
        let mut id = [0u8];
        block_on(transport.read_register(regs::CHIP_ID, &mut id)).unwrap();
        assert_eq!(id, [0x61]);
        assert_eq!(
            device.ops(),
            vec![BusOp::Read {
                register: regs::CHIP_ID,
                len: 1
            }]
        );
    }

    #[test]
    fn init_fails_on_bus_error() {
        let device = FakeBme688::new(0x76);
        let clock = FakeClock::default();
        let t = I2cTransport::new(device.clone(), &BusConfig::DEFAULT, clock.clone()).unwrap();
        let res = block_on(Bme68x::init(t, clock));
        assert!(matches!(res, Err(Error::Bus(BusError::NoAcknowledge))));
    }

    #[test]
    fn bme680_variant_is_detected() {
        let device = FakeBme688::new(0x77);
        device.set_reg(regs::VARIANT_ID, 0x00);
        let clock = FakeClock::default();
        assert_eq!(init(&device, &clock).variant(), Variant::GasLow);
    }

    #[test]
    fn config_writes_oversampling_and_filter() {
        let device = FakeBme688::new(0x77);
        let clock = FakeClock::default();
        let mut dev = init(&device, &clock);
        device.set_reg(regs::CONFIG, 0xE3);

        block_on(dev.set_config(&CONFIG)).unwrap();
        assert_eq!(device.reg(regs::CTRL_HUM), 0b010);
        assert_eq!(device.reg(regs::CTRL_MEAS), (0b100 << 5) | (0b011 << 2));
        // Bits outside the filter field are preserved.
        assert_eq!(device.reg(regs::CONFIG), 0xE3);
        assert!(
            device
                .ops()
                .contains(&BusOp::Write(vec![0x72, 0x02, 0x74, 0x8C, 0x75, 0xE3]))
        );
    }

    #[test]
    fn invalid_config_is_rejected_before_bus_traffic() {
        let device = FakeBme688::new(0x77);
        let clock = FakeClock::default();
        let mut dev = init(&device, &clock);
        device.clear_ops();

        let bad = MeasurementConfig {
            os_temp: Oversampling::Skipped,
            ..CONFIG
        };
        assert_eq!(
            block_on(dev.set_config(&bad)),
            Err(Error::Config(ConfigError::TemperatureSkipped))
        );
        let hot = HeaterConfig {
            target_temp_c: 450,
            ..HEATER
        };
        assert_eq!(
            block_on(dev.set_heater_config(OperatingMode::Forced, &hot)),
            Err(Error::Config(ConfigError::HeaterTemperature(450)))
        );
        assert!(device.ops().is_empty());
    }

    #[test]
    fn heater_profile_zero_is_programmed() {
        let device = FakeBme688::new(0x77);
        let clock = FakeClock::default();
        let mut dev = init(&device, &clock);
        device.set_reg(regs::CTRL_GAS_0, 0x08);

        block_on(dev.set_heater_config(OperatingMode::Forced, &HEATER)).unwrap();
        assert_eq!(device.reg(regs::RES_HEAT_0), 119);
        assert_eq!(device.reg(regs::GAS_WAIT_0), 0x65);
        assert_eq!(device.reg(regs::CTRL_GAS_0), 0x00);
        assert_eq!(device.reg(regs::CTRL_GAS_1), 0x20);

        let off = HeaterConfig {
            enable: false,
            ..HEATER
        };
        block_on(dev.set_heater_config(OperatingMode::Forced, &off)).unwrap();
        assert_eq!(device.reg(regs::CTRL_GAS_0), 0x08);
        assert_eq!(device.reg(regs::CTRL_GAS_1), 0x00);
    }

    #[test]
    fn duration_for_default_oversampling() {
        assert_eq!(measurement_duration(&CONFIG), 32_775);
        let minimal = MeasurementConfig {
            os_temp: Oversampling::X1,
            os_pres: Oversampling::Skipped,
            os_hum: Oversampling::Skipped,
            filter: Filter::Off,
        };
        assert_eq!(measurement_duration(&minimal), 7256);
    }

    #[test]
    fn duration_is_positive_for_every_accepted_config() {
        use Oversampling::*;
        let levels = [Skipped, X1, X2, X4, X8, X16];
        for t in levels {
            for p in levels {
                for h in levels {
                    let config = MeasurementConfig {
                        os_temp: t,
                        os_pres: p,
                        os_hum: h,
                        filter: Filter::Off,
                    };
                    if config.validate().is_ok() {
                        assert!(measurement_duration(&config) > 0);
                    }
                }
            }
        }
    }

    #[test]
    fn forced_mode_triggers_one_conversion() {
        let device = FakeBme688::new(0x77);
        let clock = FakeClock::default();
        let mut dev = init(&device, &clock);
        block_on(dev.set_config(&CONFIG)).unwrap();

        block_on(dev.set_operating_mode(OperatingMode::Forced)).unwrap();
        assert_eq!(device.forced_triggers(), 1);
        // The model returns to sleep once the conversion is latched.
        assert_eq!(device.reg(regs::CTRL_MEAS) & 0x03, 0);
        assert_eq!(device.reg(regs::CTRL_MEAS) & !0x03, 0x8C);
    }

    #[test]
    fn stuck_conversion_reports_not_sleeping() {
        let device = FakeBme688::new(0x77);
        let clock = FakeClock::default();
        let mut dev = init(&device, &clock);
        device.stick_in_mode(0x02);
        let before = clock.events().len();

        assert_eq!(
            block_on(dev.set_operating_mode(OperatingMode::Forced)),
            Err(Error::NotSleeping)
        );
        assert_eq!(device.forced_triggers(), 0);
        assert_eq!(clock.events()[before..], [ClockEvent::Sleep(10); 5]);
    }

    #[test]
    fn data_is_compensated() {
        let device = FakeBme688::new(0x77);
        let clock = FakeClock::default();
        let mut dev = init(&device, &clock);
        device.queue_conversion(field_block(350_000, 500_000, 22_000, 0, 11, true));

        block_on(dev.set_operating_mode(OperatingMode::Forced)).unwrap();
        let samples = block_on(dev.get_data(OperatingMode::Forced)).unwrap();
        assert_eq!(samples.len(), 1);
        let s = samples[0];
        assert!((s.temperature_c - 25.276).abs() < 0.01);
        assert!((s.pressure_pa - 101_143.25).abs() < 20.0);
        assert!((s.humidity_pct - 49.712).abs() < 0.05);
        assert_eq!(s.gas_ohm, 50_000.0);
        assert!(s.gas_valid && s.heat_stable);
    }

    #[test]
    fn missing_new_data_yields_no_samples() {
        let device = FakeBme688::new(0x77);
        let clock = FakeClock::default();
        let mut dev = init(&device, &clock);
        device.queue_conversion(field_block(350_000, 500_000, 22_000, 0, 11, false));
        block_on(dev.set_operating_mode(OperatingMode::Forced)).unwrap();

        let before = clock.events().len();
        let samples = block_on(dev.get_data(OperatingMode::Forced)).unwrap();
        assert!(samples.is_empty());
        // Five polls, 10 ms apart.
        assert_eq!(clock.events()[before..], [ClockEvent::Sleep(10); 4]);
    }

    #[test]
    fn sleep_mode_fetch_is_empty_without_bus_traffic() {
        let device = FakeBme688::new(0x77);
        let clock = FakeClock::default();
        let mut dev = init(&device, &clock);
        device.clear_ops();
        let samples = block_on(dev.get_data(OperatingMode::Sleep)).unwrap();
        assert!(samples.is_empty());
        assert!(device.ops().is_empty());
    }
}
