//! The line-oriented output format.

use core::fmt::{self, Display, Formatter, Write as _};

use crate::Sample;

/// First line of every output stream.
pub const HEADER: &str = "timestamp_ms;temperature_C;humidity_pct;pressure_hPa;gas_ohm";

/// Capacity of a formatted line, generous for any reading the sensor can produce.
pub const LINE_CAPACITY: usize = 80;

pub type Line = heapless::String<LINE_CAPACITY>;

/// One emitted reading, in output units.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Record {
    pub timestamp_ms: u64,
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_hpa: f32,
    pub gas_ohm: f32,
}

impl From<&Sample> for Record {
    fn from(s: &Sample) -> Self {
        Self {
            timestamp_ms: s.timestamp_ms,
            temperature_c: s.temperature_c,
            humidity_pct: s.humidity_pct,
            pressure_hpa: s.pressure_pa / 100.0,
            gas_ohm: s.gas_ohm,
        }
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{:.3};{:.2};{:.2};{:.0}",
            self.timestamp_ms, self.temperature_c, self.humidity_pct, self.pressure_hpa, self.gas_ohm
        )
    }
}

impl Record {
    /// Renders the record without allocating.
    pub fn to_line(&self) -> Line {
        let mut line = Line::new();
        // Compensated values are bounded, so the line always fits.
        let _ = write!(line, "{self}");
        line
    }
}

/// Fields that do not make a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseRecordError {
    /// Expected five fields.
    FieldCount(usize),
    /// The field at this index is not a number.
    Field(usize),
}

impl Display for ParseRecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParseRecordError::FieldCount(n) => write!(f, "expected 5 fields, found {n}"),
            ParseRecordError::Field(i) => write!(f, "field {i} is not a number"),
        }
    }
}

impl Record {
    /// Builds a record from the five fields of one line, in [`HEADER`] order.
    pub fn from_fields<'a>(
        fields: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ParseRecordError> {
        let mut values = [""; 5];
        let mut count = 0;
        for field in fields {
            if let Some(slot) = values.get_mut(count) {
                *slot = field;
            }
            count += 1;
        }
        if count != values.len() {
            return Err(ParseRecordError::FieldCount(count));
        }

        let num = |i: usize| values[i].parse::<f32>().map_err(|_| ParseRecordError::Field(i));
        Ok(Self {
            timestamp_ms: values[0].parse().map_err(|_| ParseRecordError::Field(0))?,
            temperature_c: num(1)?,
            humidity_pct: num(2)?,
            pressure_hpa: num(3)?,
            gas_ohm: num(4)?,
        })
    }
}
