//! Offline statistics over recorded output streams.
//!
//! Everything here works on [`Record`]s read back from emitted streams. Gas resistance is
//! reported in kΩ.

use core::fmt::{self, Display, Formatter};
use std::io::Read;
use std::vec::Vec;

use crate::record::Record;

/// Steady-state window: the last this-many records.
pub const TAIL_SAMPLES: usize = 200;
/// Records averaged for the initial level of a step response.
pub const START_SAMPLES: usize = 10;
/// Fraction of the total change reached after one time constant.
pub const TAU_FRACTION: f64 = 0.632;
/// Fraction of the total change reached after three time constants.
pub const THREE_TAU_FRACTION: f64 = 0.95;

/// Records parsed from a log, with the count of lines that were not records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedLog {
    pub records: Vec<Record>,
    pub skipped: usize,
}

/// Reads `;`-separated records, skipping the header and any other row that is not a record.
///
/// Blank lines are ignored and not counted. Only I/O failures are errors.
pub fn read_log<R: Read>(reader: R) -> Result<ParsedLog, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut log = ParsedLog::default();
    for row in reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(e),
            Err(_) => {
                log.skipped += 1;
                continue;
            }
        };
        match Record::from_fields(row.iter()) {
            Ok(record) => log.records.push(record),
            Err(_) => log.skipped += 1,
        }
    }
    Ok(log)
}

/// [`read_log`] over text already in memory.
pub fn parse_log(text: &str) -> ParsedLog {
    // A byte slice never fails to read.
    read_log(text.as_bytes()).unwrap_or_default()
}

fn tail(records: &[Record], n: usize) -> &[Record] {
    &records[records.len().saturating_sub(n)..]
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator). Needs two values.
fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

fn gas_kohm(r: &Record) -> f64 {
    f64::from(r.gas_ohm) / 1000.0
}

fn time_s(r: &Record) -> f64 {
    r.timestamp_ms as f64 / 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    pub count: usize,
    pub mean: f64,
    /// `None` with fewer than two values.
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
}

impl ChannelStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        Some(Self {
            count: values.len(),
            mean: mean(values)?,
            std: sample_std(values),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

/// Per-channel statistics over the last records of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TailStats {
    pub temperature_c: ChannelStats,
    pub humidity_pct: ChannelStats,
    pub pressure_hpa: ChannelStats,
    pub gas_kohm: ChannelStats,
}

impl TailStats {
    /// `None` for an empty run.
    pub fn from_records(records: &[Record], tail_len: usize) -> Option<Self> {
        let window = tail(records, tail_len);
        let channel = |f: fn(&Record) -> f64| {
            let values: Vec<f64> = window.iter().map(f).collect();
            ChannelStats::from_values(&values)
        };
        Some(Self {
            temperature_c: channel(|r| f64::from(r.temperature_c))?,
            humidity_pct: channel(|r| f64::from(r.humidity_pct))?,
            pressure_hpa: channel(|r| f64::from(r.pressure_hpa))?,
            gas_kohm: channel(gas_kohm)?,
        })
    }

    pub fn count(&self) -> usize {
        self.gas_kohm.count
    }
}

/// Gas resistance spread over a steady-state tail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Repeatability {
    pub samples: usize,
    pub mean_kohm: f64,
    pub std_kohm: f64,
    /// U = 2s (coverage factor k = 2).
    pub expanded_uncertainty_kohm: f64,
    pub min_kohm: f64,
    pub max_kohm: f64,
}

/// `None` with fewer than two records in the tail.
pub fn repeatability(records: &[Record], tail_len: usize) -> Option<Repeatability> {
    let values: Vec<f64> = tail(records, tail_len).iter().map(gas_kohm).collect();
    let stats = ChannelStats::from_values(&values)?;
    let std = stats.std?;
    Some(Repeatability {
        samples: stats.count,
        mean_kohm: stats.mean,
        std_kohm: std,
        expanded_uncertainty_kohm: 2.0 * std,
        min_kohm: stats.min,
        max_kohm: stats.max,
    })
}

/// Check of a fitted time constant at three times its value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreeTauCheck {
    pub target_s: f64,
    pub nearest_s: f64,
    /// Level a first-order response reaches at 3τ.
    pub theory_kohm: f64,
    pub actual_kohm: f64,
    /// Change reached at 3τ as a percentage of the total change. `None` for a flat run.
    pub span_pct: Option<f64>,
}

/// First-order step response of the gas channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeConstant {
    /// Timestamp, in seconds, of the sample that first reaches 63.2 % of the total change.
    pub tau_s: f64,
    pub r0_kohm: f64,
    pub r_inf_kohm: f64,
    pub target_kohm: f64,
    pub actual_kohm: f64,
    pub three_tau: ThreeTauCheck,
}

/// Index of the sample closest to `target` under `key`.
fn closest(records: &[Record], target: f64, key: fn(&Record) -> f64) -> usize {
    records
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (key(a) - target).abs().total_cmp(&(key(b) - target).abs()))
        .map_or(0, |(i, _)| i)
}

/// `None` for an empty run.
pub fn time_constant(records: &[Record]) -> Option<TimeConstant> {
    let gas: Vec<f64> = records.iter().map(gas_kohm).collect();
    let r0 = mean(&gas[..START_SAMPLES.min(gas.len())])?;
    let r_inf = mean(&gas[gas.len().saturating_sub(TAIL_SAMPLES)..])?;
    let target = r0 + TAU_FRACTION * (r_inf - r0);

    let rising = r_inf >= r0;
    let idx = gas
        .iter()
        .position(|&r| if rising { r >= target } else { r <= target })
        .unwrap_or_else(|| closest(records, target, gas_kohm));
    let tau_s = time_s(&records[idx]);

    let target_3 = 3.0 * tau_s;
    let idx_3 = closest(records, target_3, time_s);
    let actual_3 = gas[idx_3];
    let span = r_inf - r0;

    Some(TimeConstant {
        tau_s,
        r0_kohm: r0,
        r_inf_kohm: r_inf,
        target_kohm: target,
        actual_kohm: gas[idx],
        three_tau: ThreeTauCheck {
            target_s: target_3,
            nearest_s: time_s(&records[idx_3]),
            theory_kohm: r0 + THREE_TAU_FRACTION * span,
            actual_kohm: actual_3,
            span_pct: (span != 0.0).then(|| (actual_3 - r0) / span * 100.0),
        },
    })
}

/// Least-squares line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// `None` with fewer than two points or when every x is equal.
    pub fn from_points(points: &[(f64, f64)]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as f64;
        let mx = points.iter().map(|p| p.0).sum::<f64>() / n;
        let my = points.iter().map(|p| p.1).sum::<f64>() / n;
        let sxx: f64 = points.iter().map(|p| (p.0 - mx) * (p.0 - mx)).sum();
        if sxx == 0.0 {
            return None;
        }
        let sxy: f64 = points.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
        let slope = sxy / sxx;
        Some(Self {
            slope,
            intercept: my - slope * mx,
        })
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Sensitivity and linearity of steady-state gas resistance against concentration.
#[derive(Debug, Clone, PartialEq)]
pub struct Linearity {
    pub fit: LinearFit,
    /// Measured minus fitted, per point.
    pub residuals: Vec<f64>,
    pub residual_std: Option<f64>,
}

impl Linearity {
    /// `points` are `(concentration, mean resistance in kΩ)`.
    pub fn from_points(points: &[(f64, f64)]) -> Option<Self> {
        let fit = LinearFit::from_points(points)?;
        let residuals: Vec<f64> = points.iter().map(|&(x, y)| y - fit.eval(x)).collect();
        let residual_std = sample_std(&residuals);
        Some(Self {
            fit,
            residuals,
            residual_std,
        })
    }

    /// Magnitude of the slope, in kΩ per unit of concentration.
    pub fn sensitivity(&self) -> f64 {
        self.fit.slope.abs()
    }
}

/// Drift of steady-state gas resistance across runs at different temperatures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reproducibility {
    /// `R = slope * T + intercept`, R in kΩ and T in °C.
    pub fit: LinearFit,
    pub runs: usize,
    /// Sample standard deviation of the run means.
    pub std_kohm: f64,
    /// U = 2s (coverage factor k = 2).
    pub expanded_uncertainty_kohm: f64,
}

/// `points` are per-run `(mean temperature in °C, mean resistance in kΩ)`.
///
/// `None` with fewer than two runs or when every run has the same temperature.
pub fn reproducibility(points: &[(f64, f64)]) -> Option<Reproducibility> {
    let fit = LinearFit::from_points(points)?;
    let means: Vec<f64> = points.iter().map(|p| p.1).collect();
    let std = sample_std(&means)?;
    Some(Reproducibility {
        fit,
        runs: points.len(),
        std_kohm: std,
        expanded_uncertainty_kohm: 2.0 * std,
    })
}

/// Kind of run, from the naming convention of recorded logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementKind {
    Baseline,
    Sensitivity,
    Repeatability,
    Reproducibility,
    Unknown,
}

impl MeasurementKind {
    pub fn detect(file_name: &str) -> Self {
        let name = file_name.to_lowercase();
        if name.contains("baseline") {
            MeasurementKind::Baseline
        } else if name.contains("sens_") {
            MeasurementKind::Sensitivity
        } else if name.contains("repeat_") {
            MeasurementKind::Repeatability
        } else if name.contains("reprod_") {
            MeasurementKind::Reproducibility
        } else {
            MeasurementKind::Unknown
        }
    }
}

impl Display for MeasurementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MeasurementKind::Baseline => "Baseline (air)",
            MeasurementKind::Sensitivity => "Sensitivity & Linearity",
            MeasurementKind::Repeatability => "Repeatability",
            MeasurementKind::Reproducibility => "Reproducibility",
            MeasurementKind::Unknown => "Unknown",
        })
    }
}
