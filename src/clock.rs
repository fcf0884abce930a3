//! Delays, timeouts and timestamps.

use core::future::Future;

use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Instant, Timer, block_for};

/// Delays shorter than this are busy-waited; longer ones yield to the executor.
pub const BUSY_WAIT_THRESHOLD_US: u32 = 1000;

/// How a requested delay is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DelayStep {
    /// Spin for exactly this many microseconds.
    Busy { us: u32 },
    /// Sleep for this many whole milliseconds, rounded up from the request.
    Coarse { ms: u32 },
}

impl DelayStep {
    pub const fn for_micros(us: u32) -> Self {
        if us < BUSY_WAIT_THRESHOLD_US {
            DelayStep::Busy { us }
        } else {
            DelayStep::Coarse {
                ms: us.div_ceil(1000),
            }
        }
    }
}

/// The wrapped future did not finish in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimedOut;

/// Time source and delay provider.
///
/// Delays always run to completion; there is no cancellation.
pub trait Clock {
    /// Monotonic milliseconds since boot.
    fn now_ms(&self) -> u64;

    /// Spins without yielding.
    fn busy_wait_us(&mut self, us: u32);

    /// Yields to the executor for at least `ms` milliseconds.
    async fn sleep_ms(&mut self, ms: u32);

    /// Runs `fut` to completion unless `ms` milliseconds pass first.
    async fn timeout<F: Future>(&self, ms: u32, fut: F) -> Result<F::Output, TimedOut>;

    /// Waits at least `us` microseconds.
    ///
    /// Requests at or above [`BUSY_WAIT_THRESHOLD_US`] are rounded up to the next whole
    /// millisecond and may overshoot by up to one tick.
    async fn delay_us(&mut self, us: u32) {
        match DelayStep::for_micros(us) {
            DelayStep::Busy { us } => self.busy_wait_us(us),
            DelayStep::Coarse { ms } => self.sleep_ms(ms).await,
        }
    }
}

/// [`Clock`] backed by the `embassy-time` driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }

    fn busy_wait_us(&mut self, us: u32) {
        block_for(Duration::from_micros(us.into()));
    }

    async fn sleep_ms(&mut self, ms: u32) {
        Timer::after_millis(ms.into()).await;
    }

    async fn timeout<F: Future>(&self, ms: u32, fut: F) -> Result<F::Output, TimedOut> {
        match select(fut, Timer::after_millis(ms.into())).await {
            Either::First(output) => Ok(output),
            Either::Second(()) => Err(TimedOut),
        }
    }
}
