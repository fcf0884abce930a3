//! Summarises recorded BME688 output streams.
//!
//! ```text
//! bme688-summary logs/20251201_baseline.csv logs/repeat_1pct.csv
//! bme688-summary --tail 100 --no-tau logs/sens_2pct.csv
//! bme688-summary --linearity 1:25.81 --linearity 2:20.56 --linearity 4:14.38
//! bme688-summary logs/reprod_9C.csv logs/reprod_25C.csv logs/reprod_45C.csv
//! ```
//!
//! Runs whose file name marks them as reproducibility runs are also fitted together, steady-state
//! gas resistance against temperature.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use embassy_bme688_sensor::analysis::{
    self, ChannelStats, Linearity, MeasurementKind, TAIL_SAMPLES, TailStats,
};

#[derive(Parser, Debug)]
#[command(version, about = "Summarise recorded BME688 runs")]
struct Args {
    /// Log files, one emitted stream each.
    files: Vec<PathBuf>,

    /// Records in the steady-state tail.
    #[arg(long, default_value_t = TAIL_SAMPLES)]
    tail: usize,

    /// Skip the time constant estimate.
    #[arg(long)]
    no_tau: bool,

    /// Steady-state point `concentration:kohm` for the sensitivity fit. Repeat for each point.
    #[arg(long, value_parser = parse_point)]
    linearity: Vec<(f64, f64)>,
}

fn parse_point(s: &str) -> Result<(f64, f64)> {
    let (c, r) = s
        .split_once(':')
        .with_context(|| format!("expected concentration:kohm, got {s:?}"))?;
    Ok((
        c.trim().parse().context("bad concentration")?,
        r.trim().parse().context("bad resistance")?,
    ))
}

fn print_channel(name: &str, s: &ChannelStats) {
    let std = s.std.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
    println!(
        "  {name:<14} {:>6} {:>10.2} {:>8} {:>10.2} {:>10.2}",
        s.count, s.mean, std, s.min, s.max
    );
}

fn summarise(path: &Path, tail: usize, tau: bool) -> Result<(MeasurementKind, TailStats)> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let log = analysis::read_log(file).with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let kind = MeasurementKind::detect(&name);

    println!("\n{name}");
    println!("  type: {kind}");
    println!(
        "  {} records, {} other lines skipped",
        log.records.len(),
        log.skipped
    );
    let Some(stats) = TailStats::from_records(&log.records, tail) else {
        bail!("{}: no records", path.display());
    };

    println!("  last {} records:", stats.count());
    println!(
        "  {:<14} {:>6} {:>10} {:>8} {:>10} {:>10}",
        "", "count", "mean", "std", "min", "max"
    );
    print_channel("temperature_C", &stats.temperature_c);
    print_channel("humidity_pct", &stats.humidity_pct);
    print_channel("pressure_hPa", &stats.pressure_hpa);
    print_channel("gas_kohm", &stats.gas_kohm);

    if let Some(rep) = analysis::repeatability(&log.records, tail) {
        println!(
            "  repeatability: mean {:.3} kΩ, s {:.3} kΩ, U(k=2) {:.3} kΩ",
            rep.mean_kohm, rep.std_kohm, rep.expanded_uncertainty_kohm
        );
    }

    if tau {
        if let Some(tc) = analysis::time_constant(&log.records) {
            println!(
                "  tau: {:.1} s (R0 {:.2} kΩ, R_inf {:.2} kΩ, target {:.2} kΩ, actual {:.2} kΩ)",
                tc.tau_s, tc.r0_kohm, tc.r_inf_kohm, tc.target_kohm, tc.actual_kohm
            );
            let check = tc.three_tau;
            let span = check
                .span_pct
                .map_or_else(|| "-".to_string(), |p| format!("{p:.1} %"));
            println!(
                "  3tau: {:.1} s (nearest {:.1} s), R theory {:.2} kΩ, actual {:.2} kΩ, {span} of span",
                check.target_s, check.nearest_s, check.theory_kohm, check.actual_kohm
            );
        }
    }
    Ok((kind, stats))
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.files.is_empty() && args.linearity.is_empty() {
        bail!("nothing to do: pass log files or --linearity points");
    }

    let mut failed = 0;
    let mut reprod = Vec::new();
    for path in &args.files {
        match summarise(path, args.tail, !args.no_tau) {
            Ok((MeasurementKind::Reproducibility, stats)) => {
                reprod.push((stats.temperature_c.mean, stats.gas_kohm.mean));
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("{e:#}");
                failed += 1;
            }
        }
    }

    if !reprod.is_empty() {
        println!("\nreproducibility over {} runs:", reprod.len());
        for (t, r) in &reprod {
            println!("  T = {t:.2} C: R = {r:.2} kΩ");
        }
        match analysis::reproducibility(&reprod) {
            Some(rep) => {
                println!(
                    "fit: R = {:.4} * T + {:.2}",
                    rep.fit.slope, rep.fit.intercept
                );
                println!(
                    "s {:.3} kΩ, U(k=2) {:.3} kΩ",
                    rep.std_kohm, rep.expanded_uncertainty_kohm
                );
            }
            None => eprintln!("reproducibility needs at least two runs at different temperatures"),
        }
    }

    if !args.linearity.is_empty() {
        let lin = Linearity::from_points(&args.linearity)
            .context("linearity needs at least two distinct concentrations")?;
        println!("\nsensitivity: {:.2} kΩ per unit", lin.sensitivity());
        println!(
            "fit: R = {:.3} * C + {:.2}",
            lin.fit.slope, lin.fit.intercept
        );
        for (&(c, r), e) in args.linearity.iter().zip(&lin.residuals) {
            println!(
                "  C = {c}: R = {r:.2} kΩ, fit {:.2} kΩ, residual {e:.2} kΩ",
                lin.fit.eval(c)
            );
        }
        if let Some(s) = lin.residual_std {
            println!("residual std: {s:.3} kΩ");
        }
    }

    if failed > 0 {
        bail!("{failed} of {} files failed", args.files.len());
    }
    Ok(())
}
