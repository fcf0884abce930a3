//! Host-side fakes shared by the unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal_async::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use crate::clock::{Clock, TimedOut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    Busy(u32),
    Sleep(u32),
}

#[derive(Default)]
struct ClockState {
    now_us: u64,
    events: Vec<ClockEvent>,
    expire_timeouts: bool,
}

/// Clock that advances only when waited on and records every wait.
#[derive(Clone, Default)]
pub struct FakeClock {
    state: Rc<RefCell<ClockState>>,
}

impl FakeClock {
    pub fn events(&self) -> Vec<ClockEvent> {
        self.state.borrow().events.clone()
    }

    pub fn now_us(&self) -> u64 {
        self.state.borrow().now_us
    }

    /// Makes every later `timeout` call expire without polling its future.
    pub fn expire_timeouts(&self) {
        self.state.borrow_mut().expire_timeouts = true;
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.state.borrow().now_us / 1000
    }

    fn busy_wait_us(&mut self, us: u32) {
        let mut state = self.state.borrow_mut();
        state.now_us += u64::from(us);
        state.events.push(ClockEvent::Busy(us));
    }

    async fn sleep_ms(&mut self, ms: u32) {
        let mut state = self.state.borrow_mut();
        state.now_us += u64::from(ms) * 1000;
        state.events.push(ClockEvent::Sleep(ms));
    }

    async fn timeout<F: core::future::Future>(
        &self,
        _ms: u32,
        fut: F,
    ) -> Result<F::Output, TimedOut> {
        if self.state.borrow().expire_timeouts {
            return Err(TimedOut);
        }
        Ok(fut.await)
    }
}

/// One bus transaction as seen by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    /// Register pointer write followed by a read of `len` bytes.
    Read { register: u8, len: usize },
    /// Raw write payload, register address first.
    Write(Vec<u8>),
}

pub const FIELD_LEN: usize = 17;

struct DeviceState {
    address: u8,
    regs: [u8; 256],
    pointer: u8,
    ops: Vec<BusOp>,
    conversions: VecDeque<[u8; FIELD_LEN]>,
    forced_triggers: usize,
    fail_with: Option<ErrorKind>,
    stuck_mode: Option<u8>,
}

/// Register-level model of a BME688 on the I2C bus.
///
/// Writes are interpreted as register/value pairs. Writing forced mode into `ctrl_meas`
/// latches the next queued field block into `0x1D..=0x2D` and drops back to sleep; with
/// nothing queued the new-data bit stays clear.
#[derive(Clone)]
pub struct FakeBme688 {
    state: Rc<RefCell<DeviceState>>,
}

pub const CHIP_ID: u8 = 0x61;
pub const VARIANT_GAS_HIGH: u8 = 0x01;

impl FakeBme688 {
    pub fn new(address: u8) -> Self {
        let mut regs = [0u8; 256];
        regs[0xD0] = CHIP_ID;
        regs[0xF0] = VARIANT_GAS_HIGH;
        for (i, b) in CALIBRATION.iter().enumerate() {
            regs[calibration_register(i) as usize] = *b;
        }
        Self {
            state: Rc::new(RefCell::new(DeviceState {
                address,
                regs,
                pointer: 0,
                ops: Vec::new(),
                conversions: VecDeque::new(),
                forced_triggers: 0,
                fail_with: None,
                stuck_mode: None,
            })),
        }
    }

    pub fn set_reg(&self, register: u8, value: u8) {
        self.state.borrow_mut().regs[register as usize] = value;
    }

    pub fn reg(&self, register: u8) -> u8 {
        self.state.borrow().regs[register as usize]
    }

    pub fn queue_conversion(&self, field: [u8; FIELD_LEN]) {
        self.state.borrow_mut().conversions.push_back(field);
    }

    pub fn fail_with(&self, kind: Option<ErrorKind>) {
        self.state.borrow_mut().fail_with = kind;
    }

    /// Pins the mode bits of `ctrl_meas`, ignoring mode writes.
    pub fn stick_in_mode(&self, mode: u8) {
        let mut state = self.state.borrow_mut();
        state.stuck_mode = Some(mode);
        state.regs[0x74] = (state.regs[0x74] & !0x03) | mode;
    }

    pub fn ops(&self) -> Vec<BusOp> {
        self.state.borrow().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().ops.clear();
    }

    pub fn forced_triggers(&self) -> usize {
        self.state.borrow().forced_triggers
    }
}

impl DeviceState {
    fn store(&mut self, register: u8, value: u8) {
        match register {
            0xE0 if value == 0xB6 => {
                // Soft reset clears the control registers but keeps the NVM contents.
                for r in 0x70..=0x75 {
                    self.regs[r] = 0;
                }
            }
            0x74 if self.stuck_mode.is_some() => {
                let mode = self.stuck_mode.unwrap_or(0);
                self.regs[0x74] = (value & !0x03) | mode;
            }
            0x74 => {
                self.regs[0x74] = value;
                if value & 0x03 == 0x01 {
                    self.forced_triggers += 1;
                    let field = self.conversions.pop_front().unwrap_or([0; FIELD_LEN]);
                    self.regs[0x1D..0x1D + FIELD_LEN].copy_from_slice(&field);
                    self.regs[0x74] = value & !0x03;
                }
            }
            _ => self.regs[register as usize] = value,
        }
    }
}

impl ErrorType for FakeBme688 {
    type Error = ErrorKind;
}

impl I2c for FakeBme688 {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if let Some(kind) = state.fail_with {
            return Err(kind);
        }
        if address != state.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    let Some((&register, rest)) = bytes.split_first() else {
                        continue;
                    };
                    state.pointer = register;
                    if rest.is_empty() {
                        continue;
                    }
                    state.ops.push(BusOp::Write(bytes.to_vec()));
                    state.store(register, rest[0]);
                    for pair in rest[1..].chunks(2) {
                        if let [r, v] = pair {
                            state.store(*r, *v);
                        }
                    }
                }
                Operation::Read(buf) => {
                    let register = state.pointer;
                    state.ops.push(BusOp::Read {
                        register,
                        len: buf.len(),
                    });
                    for (i, b) in buf.iter_mut().enumerate() {
                        *b = state.regs[(register as usize + i) % 256];
                    }
                }
            }
        }
        Ok(())
    }
}

/// Factory calibration image in read order: `0x8A..` (23), `0xE1..` (14), `0x00..` (5).
///
/// Decodes to T1 26201, T2 26243, T3 3, P1 36290, P2 -10434, P3 88, P4 6912, P5 -93,
/// P6 30, P7 38, P8 -3226, P9 -2456, P10 30, H1 780, H2 1017, H3 0, H4 45, H5 20, H6 120,
/// H7 -100, GH1 -30, GH2 -8040, GH3 18, res_heat_val 40, res_heat_range 1, range_sw_err 0.
pub const CALIBRATION: [u8; 42] = [
    // 0x8A: T2, T3, -, P1, P2, P3, -, P4, P5, P7, P6, -, -, P8, P9, P10
    0x83, 0x66, 0x03, 0x00, 0xC2, 0x8D, 0x3E, 0xD7, 0x58, 0x00, 0x00, 0x1B, 0xA3, 0xFF, 0x26,
    0x1E, 0x00, 0x00, 0x66, 0xF3, 0x68, 0xF6, 0x1E,
    // 0xE1: H2 msb, H1 lsb / H2 lsb, H1 msb, H3..H7, T1, GH2, GH1, GH3
    0x3F, 0x9C, 0x30, 0x00, 0x2D, 0x14, 0x78, 0x9C, 0x59, 0x66, 0x98, 0xE0, 0xE2, 0x12,
    // 0x00: res_heat_val, -, res_heat_range, -, range_sw_err
    0x28, 0x00, 0x10, 0x00, 0x00,
];

pub fn calibration_register(index: usize) -> u8 {
    match index {
        0..23 => 0x8A + index as u8,
        23..37 => 0xE1 + (index - 23) as u8,
        _ => (index - 37) as u8,
    }
}

/// Encodes a BME688 field block as it appears at `0x1D`.
pub fn field_block(
    press_adc: u32,
    temp_adc: u32,
    hum_adc: u16,
    gas_adc: u16,
    gas_range: u8,
    new_data: bool,
) -> [u8; FIELD_LEN] {
    let mut f = [0u8; FIELD_LEN];
    f[0] = if new_data { 0x80 } else { 0x00 };
    f[2] = (press_adc >> 12) as u8;
    f[3] = (press_adc >> 4) as u8;
    f[4] = ((press_adc & 0x0F) << 4) as u8;
    f[5] = (temp_adc >> 12) as u8;
    f[6] = (temp_adc >> 4) as u8;
    f[7] = ((temp_adc & 0x0F) << 4) as u8;
    f[8] = (hum_adc >> 8) as u8;
    f[9] = hum_adc as u8;
    f[15] = (gas_adc >> 2) as u8;
    f[16] = ((gas_adc & 0x03) << 6) as u8 | 0x20 | 0x10 | (gas_range & 0x0F);
    f
}
