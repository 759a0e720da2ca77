//! Monitoring core modules
//!
//! Everything between the kernel probes and stdout:
//! - eBPF loading, `CONFIG` setup and probe attachment
//! - Kernel symbol resolution
//! - Per-CPU perf readers and drop accounting
//! - Record decoding, exec correlation and table formatting

pub mod channel;
pub mod correlator;
pub mod cpu_utils;
pub mod decode;
pub mod diagnostics;
pub mod ebpf_setup;
pub mod event_display;
pub mod event_processor;
pub mod symbols;

// Re-export common types
pub use channel::{spawn_readers, DropCounter, RawRecord};
pub use correlator::{CompletedExec, Correlator};
pub use cpu_utils::online_cpus;
pub use decode::{decode_exec, decode_route, ExecRecord, RouteRecord};
pub use diagnostics::{print_summary, RunSummary};
pub use ebpf_setup::{
    init_ebpf_logger, load_ebpf_program, setup_exec_probes, setup_route_probes, write_config,
    EXEC_EVENTS_MAP, ROUTE_EVENTS_MAP,
};
pub use event_processor::{consume, ExecProcessor, RecordProcessor, RouteProcessor};
pub use symbols::{KernelSymbols, SyscallSymbol};
