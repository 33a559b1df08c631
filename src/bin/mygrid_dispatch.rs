//! CLI front (§6): wires meter CSV ingestion, solar alignment, tariff
//! construction, and the LP dispatch solver (or its greedy fallback) into a
//! single command writing a dispatch schedule CSV.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use clap::Parser;
use log::{error, info};

use mygrid_dispatch::config::General;
use mygrid_dispatch::site_series::{align_site_series, SolarReference};
use mygrid_dispatch::tariff::{build_tariff, TariffSchedule};
use mygrid_dispatch::{dispatch_greedy, dispatch_lp, BatteryParameters};

/// Computes a one-year behind-the-meter dispatch schedule for a solar +
/// battery site under a time-of-use tariff.
#[derive(Parser, Debug)]
#[command(name = "mygrid_dispatch", version, about)]
struct Args {
    /// Utility meter CSV export (TYPE,DATE,START TIME,END TIME,USAGE (kWh),...)
    load_csv: PathBuf,

    /// Solar reference CSV with `timestamp,kwh_per_kw` columns.
    solar_ref_csv: PathBuf,

    /// Installed solar size in kW.
    solar_size_kw: f64,

    /// Where to write the dispatch schedule CSV (P_batt, P_grid, E).
    output_csv: PathBuf,

    /// IANA timezone name for the deployment region, e.g. `America/Los_Angeles`.
    #[arg(long, default_value = "America/Los_Angeles")]
    timezone: String,

    /// Battery capacity in kWh.
    #[arg(long, default_value_t = 13.5)]
    e_max_kwh: f64,

    /// Battery power rating in kW.
    #[arg(long, default_value_t = 5.0)]
    p_max_kw: f64,

    /// Round-trip efficiency in (0, 1].
    #[arg(long, default_value_t = 0.85)]
    round_trip_efficiency: f64,

    /// Reserve fraction in [0, 1).
    #[arg(long, default_value_t = 0.2)]
    reserve_fraction: f64,

    /// Use the non-optimizing greedy self-consumption baseline instead of the LP.
    #[arg(long)]
    greedy: bool,

    /// Log to stdout in addition to the default log file.
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = init_logging(args.verbose) {
        eprintln!("failed to initialize logging: {e:#}");
        std::process::exit(2);
    }
    if let Err(e) = run(args) {
        error!("{e:#}");
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let general = General {
        log_path: "mygrid_dispatch.log".to_string(),
        log_level: log::LevelFilter::Info,
        log_to_stdout: verbose,
        timezone: "UTC".to_string(),
    };
    mygrid_dispatch::logging::init_logger(&general)
}

fn run(args: Args) -> Result<()> {
    let tz = Tz::from_str(&args.timezone).map_err(|e| anyhow::anyhow!("unknown timezone: {e}"))?;

    info!("ingesting load series from {}", args.load_csv.display());
    let load = mygrid_dispatch::ingestion::parse_meter_csv(&args.load_csv, tz, None)
        .context("failed to parse meter CSV")?;

    info!("loading solar reference from {}", args.solar_ref_csv.display());
    let solar_ref = read_solar_reference(&args.solar_ref_csv, tz)?;

    let site = align_site_series(&load, &solar_ref, args.solar_size_kw)
        .context("failed to align solar reference onto load index")?;

    let tariff = build_tariff(&site.index, &TariffSchedule::default())
        .context("failed to build tariff table")?;

    let battery = BatteryParameters {
        e_max_kwh: args.e_max_kwh,
        p_max_kw: args.p_max_kw,
        round_trip_efficiency: args.round_trip_efficiency,
        reserve_fraction: args.reserve_fraction,
    };

    let schedule = if args.greedy {
        info!("solving with the greedy self-consumption baseline");
        dispatch_greedy(&site, &tariff, &battery)
    } else {
        info!("solving the LP dispatch problem over {} hours", site.index.len());
        dispatch_lp(&site, &tariff, &battery)
    }
    .context("dispatch computation failed")?;

    write_schedule_csv(&args.output_csv, &schedule)?;
    info!("wrote dispatch schedule to {}", args.output_csv.display());
    Ok(())
}

fn read_solar_reference(path: &std::path::Path, tz: Tz) -> Result<SolarReference> {
    let mut reader = csv::Reader::from_path(path).context("failed to open solar reference CSV")?;
    let mut index = Vec::new();
    let mut kwh_per_kw = Vec::new();

    for record in reader.records() {
        let record = record.context("failed to read solar reference row")?;
        let ts = record.get(0).context("missing timestamp column")?;
        let value = record.get(1).context("missing kwh_per_kw column")?;

        let naive = NaiveDateTime::parse_from_str(ts.trim(), "%Y-%m-%d %H:%M:%S")
            .with_context(|| format!("could not parse timestamp `{ts}`"))?;
        let Some(localized) = tz.from_local_datetime(&naive).single() else {
            continue;
        };
        index.push(localized);
        kwh_per_kw.push(value.trim().parse::<f64>().with_context(|| format!("could not parse value `{value}`"))?);
    }

    Ok(SolarReference::new(index, kwh_per_kw))
}

fn write_schedule_csv(path: &std::path::Path, schedule: &mygrid_dispatch::Schedule) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("failed to create output CSV")?;
    writer.write_record(["timestamp", "P_batt", "P_grid", "E"])?;
    for i in 0..schedule.index.len() {
        writer.write_record([
            schedule.index[i].to_rfc3339(),
            schedule.p_batt[i].to_string(),
            schedule.p_grid[i].to_string(),
            schedule.e[i].to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
