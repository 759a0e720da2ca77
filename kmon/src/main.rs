//! # kmon - Main Entry Point
//!
//! Two subcommands, one table each:
//! - **exec**: execve calls, one row per completed call with its joined arguments
//! - **route**: IPv4 forwarding-table inserts and deletes, one row per call
//!
//! Startup is all-or-nothing: any failure before the first poll exits non-zero.

use anyhow::Result;
use aya::{maps::Map, Ebpf};
use clap::Parser;
use kmon_common::{ExecEvent, RouteEvent};
use log::{info, warn};
use std::io;
use std::time::Instant;
use tokio::sync::mpsc;

use kmon::cli::{Args, Command};
use kmon::domain::{CpuId, MonitorError};
use kmon::layout::KernelLayout;
use kmon::monitoring::{
    consume, init_ebpf_logger, load_ebpf_program, online_cpus, print_summary, setup_exec_probes,
    setup_route_probes, spawn_readers, write_config, DropCounter, ExecProcessor, KernelSymbols,
    RawRecord, RecordProcessor, RouteProcessor, RunSummary, SyscallSymbol, EXEC_EVENTS_MAP,
    ROUTE_EVENTS_MAP,
};
use kmon::preflight::run_preflight_checks;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else if msg.contains("invalid argument value") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

#[tokio::main(flavor = "current_thread")]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    if !args.buffer_pages.is_power_of_two() {
        anyhow::bail!(
            "Invalid argument value: --buffer-pages must be a power of two (got {})",
            args.buffer_pages
        );
    }

    run_preflight_checks(&args.object, args.layout.as_deref(), &args.btf)?;

    let layout = KernelLayout::load(args.layout.as_deref(), &args.btf)?;
    info!("Kernel layout: {layout:?}");
    let symbols = KernelSymbols::load()?;

    let mut bpf = load_ebpf_program(&args.object)?;
    init_ebpf_logger(&mut bpf);

    let cpus = online_cpus()?;
    let drops = DropCounter::new();
    let started = Instant::now();

    let mut summary = match &args.command {
        Command::Exec { symbol } => {
            let execve = match symbol {
                Some(name) => SyscallSymbol::from_name(name),
                None => symbols.syscall("execve")?,
            };
            symbols.require(&execve.name)?;

            write_config(&mut bpf, &layout, execve.wrapper)?;
            setup_exec_probes(&mut bpf, &execve)?;

            let map = take_map(&mut bpf, EXEC_EVENTS_MAP)?;
            let (mut rx, _readers) = spawn_readers(
                map,
                &cpus,
                args.buffer_pages,
                std::mem::size_of::<ExecEvent>(),
                &drops,
            )?;
            let mut processor = ExecProcessor::new(io::stdout(), args.max_pending, started);
            stream(&mut rx, &mut processor, &cpus, quiet).await?
        }
        Command::Route { insert_symbol, delete_symbol } => {
            symbols.require(insert_symbol)?;
            symbols.require(delete_symbol)?;

            write_config(&mut bpf, &layout, false)?;
            setup_route_probes(&mut bpf, insert_symbol, delete_symbol)?;

            let map = take_map(&mut bpf, ROUTE_EVENTS_MAP)?;
            let (mut rx, _readers) = spawn_readers(
                map,
                &cpus,
                args.buffer_pages,
                std::mem::size_of::<RouteEvent>(),
                &drops,
            )?;
            let mut processor = RouteProcessor::new(io::stdout());
            stream(&mut rx, &mut processor, &cpus, quiet).await?
        }
    };

    summary.lost = drops.total();
    if !quiet {
        print_summary(&summary);
    }

    Ok(())
}

fn take_map(bpf: &mut Ebpf, name: &str) -> Result<Map, MonitorError> {
    bpf.take_map(name).ok_or_else(|| MonitorError::MapNotFound(name.to_string()))
}

/// Print the header, then rows until Ctrl-C
async fn stream<P: RecordProcessor>(
    rx: &mut mpsc::Receiver<RawRecord>,
    processor: &mut P,
    cpus: &[CpuId],
    quiet: bool,
) -> Result<RunSummary> {
    if !quiet {
        eprintln!("Tracing on {} CPUs... Hit Ctrl-C to end.", cpus.len());
    }
    processor.write_header()?;

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    consume(rx, processor, interrupted).await?;

    Ok(processor.summary())
}
