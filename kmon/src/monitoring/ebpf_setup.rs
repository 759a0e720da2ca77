//! # eBPF Program Loading and Attachment
//!
//! Loads the compiled eBPF object and attaches its programs to kernel hook points.
//!
//! ## Functions
//!
//! - [`load_ebpf_program()`] - Load the eBPF object from disk
//! - [`write_config()`] - Push struct offsets and the wrapper flag into `CONFIG`
//! - [`setup_exec_probes()`] - Attach the execve entry/return probes
//! - [`setup_route_probes()`] - Attach the `fib_table` insert/delete probes
//!
//! `CONFIG` must be written before any probe is attached, otherwise early events
//! are captured with all offsets unknown. Every failure here is fatal.

use std::path::Path;

use anyhow::{Context, Result};
use aya::{maps::HashMap, programs::KProbe, Ebpf};
use aya_log::EbpfLogger;
use kmon_common::CONFIG_SYSCALL_WRAPPER;
use log::{debug, info, warn};

use super::symbols::SyscallSymbol;
use crate::domain::MonitorError;
use crate::layout::KernelLayout;

/// Program names in the eBPF object
pub const EXEC_ENTRY_PROGRAM: &str = "exec_entry";
pub const EXEC_RETURN_PROGRAM: &str = "exec_return";
pub const FIB_INSERT_PROGRAM: &str = "fib_insert";
pub const FIB_DELETE_PROGRAM: &str = "fib_delete";

/// Map names in the eBPF object
pub const CONFIG_MAP: &str = "CONFIG";
pub const EXEC_EVENTS_MAP: &str = "EXEC_EVENTS";
pub const ROUTE_EVENTS_MAP: &str = "ROUTE_EVENTS";

/// Load the eBPF object built by `cargo xtask build-ebpf`
///
/// # Errors
/// Returns an error if the object cannot be read or the kernel rejects a map
pub fn load_ebpf_program(path: &Path) -> Result<Ebpf, MonitorError> {
    let bpf = Ebpf::load_file(path).map_err(|e| MonitorError::EbpfLoadFailed {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    debug!("Loaded eBPF object {}", path.display());
    Ok(bpf)
}

/// Initialize eBPF logger
pub fn init_ebpf_logger(bpf: &mut Ebpf) {
    if let Err(e) = EbpfLogger::init(bpf) {
        warn!("Failed to initialize eBPF logger: {e}");
    }
}

/// Write struct offsets and the syscall wrapper flag into the `CONFIG` map
///
/// # Errors
/// Returns an error if the map is missing or an update fails
pub fn write_config(bpf: &mut Ebpf, layout: &KernelLayout, syscall_wrapper: bool) -> Result<()> {
    let mut config: HashMap<_, u32, u64> = HashMap::try_from(
        bpf.map_mut(CONFIG_MAP).ok_or_else(|| MonitorError::MapNotFound(CONFIG_MAP.to_string()))?,
    )?;

    config
        .insert(CONFIG_SYSCALL_WRAPPER, u64::from(syscall_wrapper), 0)
        .context("Failed to write syscall wrapper flag")?;
    for (key, offset) in layout.config_entries() {
        config.insert(key, offset, 0).with_context(|| format!("Failed to write CONFIG[{key}]"))?;
    }

    debug!("CONFIG written: {layout:?}, wrapper={syscall_wrapper}");
    Ok(())
}

/// Load the kprobe or kretprobe `program` and attach it to `symbol`
///
/// # Errors
/// Returns an error if the program is missing, rejected by the verifier or the
/// symbol cannot be probed
pub fn attach_kprobe(bpf: &mut Ebpf, program: &str, symbol: &str) -> Result<(), MonitorError> {
    let attach_failed = |error: String| MonitorError::ProbeAttachFailed {
        probe: program.to_string(),
        symbol: symbol.to_string(),
        error,
    };

    let probe: &mut KProbe = bpf
        .program_mut(program)
        .ok_or_else(|| MonitorError::ProgramNotFound(program.to_string()))?
        .try_into()
        .map_err(|e: aya::programs::ProgramError| attach_failed(e.to_string()))?;
    probe.load().map_err(|e| attach_failed(e.to_string()))?;
    probe.attach(symbol, 0).map_err(|e| attach_failed(e.to_string()))?;

    info!("✓ Attached {program} to {symbol}");
    Ok(())
}

/// Attach the execve entry and return probes
///
/// # Errors
/// Returns an error if either probe fails to attach
pub fn setup_exec_probes(bpf: &mut Ebpf, execve: &SyscallSymbol) -> Result<(), MonitorError> {
    attach_kprobe(bpf, EXEC_ENTRY_PROGRAM, &execve.name)?;
    attach_kprobe(bpf, EXEC_RETURN_PROGRAM, &execve.name)?;
    Ok(())
}

/// Attach the forwarding-table insert and delete probes
///
/// # Errors
/// Returns an error if either probe fails to attach
pub fn setup_route_probes(
    bpf: &mut Ebpf,
    insert_symbol: &str,
    delete_symbol: &str,
) -> Result<(), MonitorError> {
    attach_kprobe(bpf, FIB_INSERT_PROGRAM, insert_symbol)?;
    attach_kprobe(bpf, FIB_DELETE_PROGRAM, delete_symbol)?;
    Ok(())
}
