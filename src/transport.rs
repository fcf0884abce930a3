//! Register access over the I2C bus.

use embedded_hal_async::i2c::{Error as _, ErrorKind, I2c};

use crate::clock::Clock;
use crate::config::BusConfig;
use crate::{BusError, BusInitError};

/// Largest payload accepted by a register write, excluding the register address.
pub const MAX_WRITE_LEN: usize = 32;

const MAX_FREQUENCY_HZ: u32 = 1_000_000;

/// Register-oriented access to one device.
///
/// No retries happen at this layer.
pub trait Transport {
    /// Reads `buf.len()` bytes starting at `register`.
    async fn read_register(&mut self, register: u8, buf: &mut [u8]) -> Result<(), BusError>;

    /// Writes `register` followed by `payload` in one transaction.
    async fn write_register(&mut self, register: u8, payload: &[u8]) -> Result<(), BusError>;
}

/// [`Transport`] over an async I2C bus, addressing a single device.
///
/// Owns the bus exclusively. Sharing it with another consumer requires serialising whole
/// transactions, since an address write followed by a read is not atomic otherwise.
pub struct I2cTransport<I2C, C> {
    i2c: I2C,
    address: u8,
    timeout_ms: u32,
    clock: C,
}

impl<I2C: I2c, C: Clock> I2cTransport<I2C, C> {
    /// Registers the device described by `bus`.
    pub fn new(i2c: I2C, bus: &BusConfig, clock: C) -> Result<Self, BusInitError> {
        if bus.address > 0x7F {
            return Err(BusInitError::InvalidAddress(bus.address));
        }
        if bus.frequency_hz == 0 || bus.frequency_hz > MAX_FREQUENCY_HZ {
            return Err(BusInitError::InvalidFrequency(bus.frequency_hz));
        }
        if bus.timeout_ms == 0 {
            return Err(BusInitError::ZeroTimeout);
        }
        Ok(Self {
            i2c,
            address: bus.address,
            timeout_ms: bus.timeout_ms,
            clock,
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Gives the bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

fn bus_error(kind: ErrorKind) -> BusError {
    match kind {
        ErrorKind::NoAcknowledge(_) => BusError::NoAcknowledge,
        _ => BusError::Bus,
    }
}

impl<I2C: I2c, C: Clock> Transport for I2cTransport<I2C, C> {
    async fn read_register(&mut self, register: u8, buf: &mut [u8]) -> Result<(), BusError> {
        let pointer = [register];
        let op = self.i2c.write_read(self.address, &pointer, buf);
        match self.clock.timeout(self.timeout_ms, op).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                trace!("read {:#x} failed", register);
                Err(bus_error(e.kind()))
            }
            Err(_) => Err(BusError::Timeout),
        }
    }

    async fn write_register(&mut self, register: u8, payload: &[u8]) -> Result<(), BusError> {
        if payload.len() > MAX_WRITE_LEN {
            return Err(BusError::PayloadTooLarge);
        }
        let mut buf = [0u8; 1 + MAX_WRITE_LEN];
        buf[0] = register;
        buf[1..=payload.len()].copy_from_slice(payload);

        let op = self.i2c.write(self.address, &buf[..=payload.len()]);
        match self.clock.timeout(self.timeout_ms, op).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                trace!("write {:#x} failed", register);
                Err(bus_error(e.kind()))
            }
            Err(_) => Err(BusError::Timeout),
        }
    }
}
