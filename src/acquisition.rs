//! The measurement-cycle state machine.
//!
//! One conversion is in flight at a time. Each cycle triggers a forced-mode conversion, waits for
//! the conversion plus heater soak, collects the result and then pauses for the configured
//! interval:
//!
//! ```text
//! setup -> Configured -> Triggered -> Waiting -> Collected -> Triggered -> ...
//! ```
//!
//! Failures after setup never stop the loop. They are logged and the next cycle is the retry.

use core::convert::Infallible;
use core::fmt::{self, Display, Formatter};

use embedded_hal_async::i2c::I2c;

use crate::bme68x::Bme68x;
use crate::clock::Clock;
use crate::config::{AcquisitionConfig, CHIP_ID_REGISTER, IdentityPolicy};
use crate::engine::{HeaterConfig, MeasurementEngine, OperatingMode};
use crate::record::{HEADER, Record};
use crate::transport::{I2cTransport, Transport};
use crate::{BusInitError, Error, Sample};

/// Destination for output lines, header included.
pub trait RecordSink {
    fn write_line(&mut self, line: &str);
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn write_line(&mut self, line: &str) {
        (**self).write_line(line)
    }
}

/// Prints every line over the defmt transport.
#[cfg(feature = "defmt")]
#[derive(Debug, Default, Clone, Copy)]
pub struct DefmtSink;

#[cfg(feature = "defmt")]
impl RecordSink for DefmtSink {
    fn write_line(&mut self, line: &str) {
        defmt::println!("{=str}", line);
    }
}

#[cfg(any(test, feature = "std"))]
impl RecordSink for std::vec::Vec<std::string::String> {
    fn write_line(&mut self, line: &str) {
        self.push(line.into());
    }
}

/// Where the current cycle is. An [`Acquisition`] only exists once configured, so there is no
/// state for the time before setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Configured,
    Triggered,
    Waiting,
    Collected,
}

/// Valid samples still to be dropped before output starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WarmupCounter(u8);

impl WarmupCounter {
    pub const fn new(samples: u8) -> Self {
        Self(samples)
    }

    pub fn remaining(&self) -> u8 {
        self.0
    }

    /// Consumes one warm-up slot. Returns `false` once warm-up is over.
    fn take(&mut self) -> bool {
        if self.0 == 0 {
            return false;
        }
        self.0 -= 1;
        true
    }
}

/// What one cycle produced.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleOutcome<E> {
    /// A line was written to the sink.
    Emitted(Record),
    /// A valid sample was consumed by warm-up.
    WarmupDropped,
    /// The engine had nothing new.
    NoData,
    /// Triggering or fetching failed. Nothing was written.
    Failed(E),
}

/// Startup failed; the acquisition loop never started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetupError<E> {
    BusInit(BusInitError),
    /// Only raised under [`IdentityPolicy::Abort`]. `found` is `None` when the id was unreadable.
    IdentityMismatch { expected: u8, found: Option<u8> },
    EngineInit(E),
    Config(E),
}

impl<E: Display> Display for SetupError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::BusInit(e) => write!(f, "bus initialisation failed: {e}"),
            SetupError::IdentityMismatch {
                expected,
                found: Some(found),
            } => write!(f, "chip id {found:#04x}, expected {expected:#04x}"),
            SetupError::IdentityMismatch {
                expected,
                found: None,
            } => write!(f, "chip id unreadable, expected {expected:#04x}"),
            SetupError::EngineInit(e) => write!(f, "sensor initialisation failed: {e}"),
            SetupError::Config(e) => write!(f, "sensor configuration rejected: {e}"),
        }
    }
}

/// Reads the chip id and applies the identity policy.
///
/// A mismatch, or a failed read, is logged either way. It is only an error under
/// [`IdentityPolicy::Abort`].
pub async fn verify_identity<T: Transport>(
    transport: &mut T,
    config: &AcquisitionConfig,
) -> Result<(), SetupError<Error>> {
    let mut id = [0u8];
    let found = match transport.read_register(CHIP_ID_REGISTER, &mut id).await {
        Ok(()) => Some(id[0]),
        Err(e) => {
            warn!("chip id read failed: {:?}", e);
            None
        }
    };
    if found == Some(config.expected_chip_id) {
        debug!("chip id {:#x}", config.expected_chip_id);
        return Ok(());
    }

    warn!(
        "unexpected chip id {:?}, expected {:#x}",
        found, config.expected_chip_id
    );
    match config.identity {
        IdentityPolicy::Warn => Ok(()),
        IdentityPolicy::Abort => Err(SetupError::IdentityMismatch {
            expected: config.expected_chip_id,
            found,
        }),
    }
}

/// A configured engine plus the per-cycle state.
pub struct Acquisition<M, C, S> {
    engine: M,
    clock: C,
    sink: S,
    state: State,
    warmup: WarmupCounter,
    duration_us: u32,
    heater: HeaterConfig,
    interval_ms: u32,
}

impl<M: MeasurementEngine, C: Clock, S: RecordSink> Acquisition<M, C, S> {
    /// Applies the measurement and heater configuration, then writes the header line.
    pub async fn configure(
        mut engine: M,
        clock: C,
        mut sink: S,
        config: &AcquisitionConfig,
    ) -> Result<Self, SetupError<M::Error>> {
        engine
            .set_config(&config.measurement)
            .await
            .map_err(SetupError::Config)?;
        engine
            .set_heater_config(OperatingMode::Forced, &config.heater)
            .await
            .map_err(SetupError::Config)?;
        let duration_us = engine.measurement_duration(OperatingMode::Forced, &config.measurement);

        sink.write_line(HEADER);

        let acquisition = Self {
            engine,
            clock,
            sink,
            state: State::Configured,
            warmup: WarmupCounter::new(config.warmup_samples),
            duration_us,
            heater: config.heater,
            interval_ms: config.interval_ms,
        };
        info!(
            "acquisition configured: wait {} us per conversion, {} warm-up sample(s)",
            acquisition.conversion_wait_us(),
            config.warmup_samples
        );
        Ok(acquisition)
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn warmup(&self) -> WarmupCounter {
        self.warmup
    }

    pub fn engine(&self) -> &M {
        &self.engine
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Conversion time plus heater soak, in microseconds.
    pub fn conversion_wait_us(&self) -> u32 {
        self.duration_us.saturating_add(self.heater.soak_us())
    }

    /// Runs one trigger, wait, collect and pause sequence.
    pub async fn cycle(&mut self) -> CycleOutcome<M::Error> {
        self.state = State::Triggered;
        let triggered = self.engine.set_operating_mode(OperatingMode::Forced).await;

        // The wait and fetch happen even after a failed trigger.
        self.state = State::Waiting;
        self.clock.delay_us(self.conversion_wait_us()).await;

        self.state = State::Collected;
        let fetched = self.engine.get_data(OperatingMode::Forced).await;
        let outcome = match (triggered, fetched) {
            (_, Ok(samples)) if !samples.is_empty() => self.collect(&samples[0]),
            (Err(e), fetched) => {
                warn!("trigger failed: {:?}", e);
                if let Err(fetch_error) = fetched {
                    warn!("fetch failed: {:?}", fetch_error);
                }
                CycleOutcome::Failed(e)
            }
            (Ok(()), Err(e)) => {
                warn!("fetch failed: {:?}", e);
                CycleOutcome::Failed(e)
            }
            (Ok(()), Ok(_)) => {
                trace!("no new data");
                CycleOutcome::NoData
            }
        };

        self.clock.sleep_ms(self.interval_ms).await;
        outcome
    }

    /// Cycles forever.
    pub async fn run(&mut self) -> Infallible {
        loop {
            let _ = self.cycle().await;
        }
    }

    // Batches beyond the first sample are discarded.
    fn collect(&mut self, sample: &Sample) -> CycleOutcome<M::Error> {
        if self.warmup.take() {
            debug!("warm-up sample dropped, {} left", self.warmup.remaining());
            return CycleOutcome::WarmupDropped;
        }
        let record = Record::from(sample);
        self.sink.write_line(&record.to_line());
        CycleOutcome::Emitted(record)
    }
}

/// Acquisition over a BME68x on an I2C bus.
pub type Bme68xAcquisition<I2C, C, S> = Acquisition<Bme68x<I2cTransport<I2C, C>, C>, C, S>;

/// Registers the bus, checks the chip id, initialises and configures the sensor.
pub async fn setup<I2C: I2c, C: Clock + Clone, S: RecordSink>(
    i2c: I2C,
    clock: C,
    sink: S,
    config: &AcquisitionConfig,
) -> Result<Bme68xAcquisition<I2C, C, S>, SetupError<Error>> {
    let mut transport =
        I2cTransport::new(i2c, &config.bus, clock.clone()).map_err(SetupError::BusInit)?;
    verify_identity(&mut transport, config).await?;
    let engine = Bme68x::init(transport, clock.clone())
        .await
        .map_err(SetupError::EngineInit)?;
    Acquisition::configure(engine, clock, sink, config).await
}

/// Sets up the sensor and runs the acquisition loop.
///
/// Only returns if setup fails.
pub async fn run<I2C: I2c, C: Clock + Clone, S: RecordSink>(
    i2c: I2C,
    clock: C,
    sink: S,
    config: &AcquisitionConfig,
) -> SetupError<Error> {
    match setup(i2c, clock, sink, config).await {
        Ok(mut acquisition) => match acquisition.run().await {},
        Err(e) => {
            error!("setup failed: {}", e);
            e
        }
    }
}
