//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default location of the eBPF object produced by `cargo xtask build-ebpf`
pub const DEFAULT_OBJECT: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/../target/bpfel-unknown-none/release/kmon");

/// Default kernel BTF source for layout discovery
pub const DEFAULT_BTF: &str = "/sys/kernel/btf/vmlinux";

#[derive(Parser)]
#[command(
    name = "kmon",
    about = "Watch process executions and IPv4 route changes from kernel probes",
    after_help = "\
EXAMPLES:
    sudo kmon exec                                 Stream execve calls with their arguments
    sudo kmon route                                Stream fib_table insert/delete calls
    sudo kmon --layout layout.json route           Use explicit kernel struct offsets
    sudo kmon exec --symbol __x64_sys_execve       Override the probed syscall symbol"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Compiled eBPF object to load
    #[arg(long, value_name = "FILE", default_value = DEFAULT_OBJECT, global = true)]
    pub object: PathBuf,

    /// JSON file with kernel struct offsets (skips BTF discovery)
    #[arg(long, value_name = "FILE", global = true)]
    pub layout: Option<PathBuf>,

    /// Kernel BTF used to discover struct offsets
    #[arg(long, value_name = "FILE", default_value = DEFAULT_BTF, global = true)]
    pub btf: PathBuf,

    /// Pages per CPU for each perf buffer (power of two)
    #[arg(long, default_value = "8", global = true)]
    pub buffer_pages: usize,

    /// Maximum processes with arguments pending completion
    #[arg(long, default_value = "4096", global = true)]
    pub max_pending: usize,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Trace execve calls and print each command line once it completes
    Exec {
        /// Kernel symbol of the execve syscall (resolved from /proc/kallsyms if omitted)
        #[arg(long, value_name = "NAME")]
        symbol: Option<String>,
    },
    /// Trace IPv4 forwarding-table inserts and deletes
    Route {
        /// Kernel symbol called on route insert
        #[arg(long, value_name = "NAME", default_value = "fib_table_insert")]
        insert_symbol: String,

        /// Kernel symbol called on route delete
        #[arg(long, value_name = "NAME", default_value = "fib_table_delete")]
        delete_symbol: String,
    },
}
