//! Production line simulation application.
#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::default_trait_access)]

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use eyre::WrapErr;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use serde::Serialize;

use linesim::{run_replications, LineConfig, ReplicationReport};

/// Simulates a production line and reports throughput, utilization, and bottlenecks.
#[derive(Parser)]
#[clap(version, author)]
struct Opt {
    /// Path to a JSON file with the line configuration.
    #[clap(long)]
    config: PathBuf,

    /// Overrides the seed of the configuration.
    #[clap(long)]
    seed: Option<u64>,

    /// Overrides the number of replications of the configuration.
    #[clap(long)]
    replications: Option<usize>,

    /// Writes the full report in JSON format to this file.
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Writes the work-in-progress series of all replications in CSV format to this file.
    #[clap(long)]
    wip_csv: Option<PathBuf>,

    /// Verbosity.
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Store the logs this file.
    #[clap(long)]
    log_output: Option<PathBuf>,

    /// Do not log to the stderr.
    #[clap(long)]
    no_stderr: bool,
}

#[derive(Serialize)]
struct WipRow {
    replication: usize,
    time: f64,
    wip: u64,
}

fn load_config(opt: &Opt) -> eyre::Result<LineConfig> {
    let file = File::open(&opt.config).wrap_err("unable to read line config")?;
    let mut config =
        LineConfig::from_reader(BufReader::new(file)).wrap_err("unable to parse line config")?;
    if let Some(seed) = opt.seed {
        config.seed = seed;
    }
    if let Some(replications) = opt.replications {
        config.replications = replications;
    }
    config.validate().wrap_err("invalid line config")?;
    Ok(config)
}

fn write_wip_csv(path: &Path, report: &ReplicationReport) -> eyre::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for result in &report.replications {
        for sample in &result.wip_series {
            writer.serialize(WipRow {
                replication: result.replication,
                time: sample.time,
                wip: sample.wip,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn print_summary<W: Write>(mut out: W, report: &ReplicationReport) -> io::Result<()> {
    let interval = |half_width: Option<f64>| {
        half_width.map_or_else(String::new, |h| format!(" +/- {:.4}", h))
    };
    writeln!(
        out,
        "Throughput:      {:.4}{}",
        report.throughput.mean,
        interval(report.throughput.half_width)
    )?;
    writeln!(
        out,
        "Mean cycle time: {:.3}{}",
        report.cycle_time.mean,
        interval(report.cycle_time.half_width)
    )?;
    writeln!(
        out,
        "Utilization:     {}",
        report
            .machines
            .iter()
            .map(|m| format!("{}={:.1}%", m.name, m.utilization.mean * 100.0))
            .join(", ")
    )?;
    writeln!(
        out,
        "Bottleneck:      {}",
        report
            .machines
            .iter()
            .filter(|m| m.bottleneck_count > 0)
            .sorted_by(|a, b| b.bottleneck_count.cmp(&a.bottleneck_count))
            .map(|m| format!("{} ({}/{})", m.name, m.bottleneck_count, report.replications.len()))
            .join(", ")
    )?;
    let balance = &report.balance;
    writeln!(
        out,
        "Line balance:    efficiency {:.1}%, expected bottleneck {}, throughput bound {}",
        balance.efficiency * 100.0,
        balance.bottleneck.as_deref().unwrap_or("-"),
        balance
            .throughput
            .map_or_else(|| String::from("-"), |t| format!("{:.4}", t))
    )?;
    Ok(())
}

fn set_up_logger(opt: &Opt) -> Result<(), fern::InitError> {
    let log_level = match opt.verbose {
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        3 => log::LevelFilter::Trace,
        _ => log::LevelFilter::Warn,
    };
    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| out.finish(format_args!("[{}] {}", record.level(), message)))
        .level(log_level);
    let dispatch = if let Some(path) = &opt.log_output {
        let _ = std::fs::remove_file(path);
        dispatch.chain(
            std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .append(false)
                .open(path)?,
        )
    } else {
        dispatch
    };
    let dispatch = if opt.no_stderr {
        dispatch
    } else {
        dispatch.chain(std::io::stderr())
    };
    dispatch.apply()?;
    Ok(())
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let opt = Opt::parse();
    set_up_logger(&opt)?;
    let config = load_config(&opt)?;
    let pb = if opt.no_stderr {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(config.replications as u64)
            .with_style(ProgressStyle::default_bar().template("{msg} {wide_bar} {pos}/{len}"))
    };
    pb.set_message("Replications");
    let report = run_replications(&config, Some(&pb))?;
    pb.finish();
    if let Some(path) = &opt.output {
        let file = File::create(path).wrap_err("unable to create output file")?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)
            .wrap_err("unable to write report")?;
    }
    if let Some(path) = &opt.wip_csv {
        write_wip_csv(path, &report).wrap_err("unable to write WIP series")?;
    }
    print_summary(io::stdout().lock(), &report)?;
    Ok(())
}
