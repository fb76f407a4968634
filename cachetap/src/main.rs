//! # cachetap - Main Entry Point
//!
//! Program flow:
//! 1. Parse arguments (usage errors exit 1)
//! 2. Pre-flight checks, map TARGET (open/map failures exit 2)
//! 3. Load and validate the offset table against the mapped size
//! 4. Pick the threshold (fixed or calibrated)
//! 5. Poll on a blocking thread until Ctrl+C or `--duration` elapses

// Time conversions lose precision for display
#![allow(clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cachetap::classifier::DebounceClassifier;
use cachetap::cli::Args;
use cachetap::domain::{RegionError, Sample};
use cachetap::poll::{PollLoop, PollStats};
use cachetap::preflight::{describe_image, run_preflight_checks};
use cachetap::probe::NativeProbe;
use cachetap::region::SharedRegion;
use cachetap::table::SymbolOffsetTable;
use cachetap::threshold::{calibrate, ThresholdModel};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 1;
const EXIT_RESOURCE: i32 = 2;

fn main() {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(EXIT_USAGE);
        }
        // --help / --version
        Err(e) => e.exit(),
    };

    std::process::exit(match run(args) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.downcast_ref::<RegionError>().is_some()) {
        EXIT_RESOURCE
    } else {
        EXIT_ERROR
    }
}

fn format_summary(exit_reason: &str, elapsed: Duration, stats: &PollStats) -> String {
    let mut by_symbol = String::new();
    for (symbol, count) in &stats.emissions_by_symbol {
        if !by_symbol.is_empty() {
            by_symbol.push(' ');
        }
        let _ = write!(by_symbol, "{symbol}={count}");
    }

    format!(
        "{exit_reason}: {:.1}s, {} cycles, {} probes, {} hits, {} symbols ({by_symbol})",
        elapsed.as_secs_f64(),
        stats.cycles,
        stats.probes,
        stats.hits,
        stats.emissions,
    )
}

#[tokio::main]
async fn run(args: Args) -> Result<()> {
    let quiet = args.quiet;

    run_preflight_checks(&args.config)?;

    // ── Map the target and load the offset table ────────────────────────
    let region = SharedRegion::open(&args.target, args.region_size)?;
    if let Some(kind) = describe_image(&region.as_slice()[..region.size().min(4096)]) {
        info!("{}: {kind} image", region.path().display());
    }

    let table = SymbolOffsetTable::load(&args.config, region.size())
        .with_context(|| format!("Invalid offset table {}", args.config.display()))?;
    info!(
        "Loaded {} entries in {} groups ({} distinct symbols)",
        table.len(),
        table.groups().len(),
        table.symbols().len()
    );

    // ── Threshold ───────────────────────────────────────────────────────
    let mut probe = NativeProbe::new();
    let threshold = if args.calibrate {
        ThresholdModel::Calibrated(calibrate(&mut probe, args.calibration_rounds))
    } else {
        ThresholdModel::Fixed(Sample(args.threshold))
    };

    let mapped = region.size();
    let mut poll_loop = PollLoop::new(
        region,
        table,
        probe,
        threshold,
        DebounceClassifier::new(args.quiet_count),
        std::io::stdout(),
    )?;
    if let Some(separator) = args.separator {
        poll_loop = poll_loop.with_separator(separator);
    }

    if !quiet {
        eprintln!("cachetap v{}", env!("CARGO_PKG_VERSION"));
        eprintln!("target: {} ({mapped} bytes mapped)", args.target.display());
        eprintln!("config: {} ({} entries)", args.config.display(), poll_loop.table().len());
        eprintln!("threshold: {}", poll_loop.threshold());
        eprintln!("quiet count: {}", poll_loop.classifier().arm_after());
    }

    // ── Poll on a dedicated thread until cancelled ──────────────────────
    let cancel = Arc::new(AtomicBool::new(false));
    let loop_cancel = Arc::clone(&cancel);
    let started = Instant::now();
    let mut handle =
        tokio::task::spawn_blocking(move || poll_loop.run(&loop_cancel).cloned());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let duration_limit =
        if args.duration > 0 { Some(Duration::from_secs(args.duration)) } else { None };
    let deadline = async {
        match duration_limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let (exit_reason, joined) = tokio::select! {
        joined = &mut handle => ("poll loop stopped", joined),
        _ = &mut ctrl_c => {
            cancel.store(true, Ordering::Relaxed);
            ("interrupted", (&mut handle).await)
        }
        () = &mut deadline => {
            cancel.store(true, Ordering::Relaxed);
            ("duration limit reached", (&mut handle).await)
        }
    };

    let stats = joined
        .context("Poll loop thread panicked")?
        .context("Failed to write symbols to stdout")?;

    if !quiet {
        eprintln!("\n{}", format_summary(exit_reason, started.elapsed(), &stats));
    }

    Ok(())
}
