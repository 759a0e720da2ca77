//! # kmon - eBPF Process-Execution and Route-Change Monitor
//!
//! kmon attaches small eBPF programs to the execve syscall and to the kernel's
//! IPv4 forwarding-table mutators, and prints what they see as two fixed-width
//! tables on stdout.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     eBPF Programs (Kernel)                      │
//! │  • Kprobe/kretprobe: execve entry (argv fragments) and return   │
//! │  • Kprobes: fib_table_insert / fib_table_delete                 │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ per-CPU perf buffers (lossy)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       kmon (This Crate)                         │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │ Per-CPU      │──▶│   Decode +   │──▶│    Table     │──▶ stdout
//! │  │ readers      │   │  Correlator  │   │  formatting  │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! │         │                                                       │
//! │         ▼                                                       │
//! │  drop counter ──────────────────────────────────────▶ stderr    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`monitoring`]: eBPF loading and attachment, perf readers, decoding,
//!   exec correlation and table output
//! - [`layout`]: kernel struct offsets, discovered from BTF or read from JSON
//! - [`preflight`]: privilege, kernel version and file checks before loading
//! - [`cli`]: command-line argument parsing and configuration
//! - [`domain`]: core domain types (Pid, CpuId, event kinds) and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Build the eBPF object once
//! cargo xtask build-ebpf --release
//!
//! # Every execve with its full command line
//! sudo ./kmon exec
//!
//! # Every IPv4 route insert/delete
//! sudo ./kmon route
//! ```
//!
//! ## Key Concepts
//!
//! - **Fragment**: one piece of a command line (the path or one argv slot)
//! - **Completion**: the execve return, which triggers joining the fragments
//! - **Perf buffer**: per-CPU kernel→userspace queue that drops when full

pub mod cli;
pub mod domain;
pub mod layout;
pub mod monitoring;
pub mod preflight;
