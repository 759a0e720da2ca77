use anyhow::{Context, Result};
use clap::Parser;
use std::process::Command;

/// Package holding the kernel-side probes
const EBPF_PACKAGE: &str = "kmon-ebpf";

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Build the eBPF object loaded by `kmon --object`
    BuildEbpf {
        #[arg(long, default_value = "bpfel-unknown-none")]
        target: String,
        /// Accepted for compatibility; the object is always built in release mode
        #[arg(long)]
        release: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::BuildEbpf { target, release: _ } => build_ebpf(&target)?,
    }

    Ok(())
}

/// Debug builds pull in formatting code the BPF linker rejects, so this is
/// always a release build.
fn build_ebpf(target: &str) -> Result<()> {
    let status = Command::new("cargo")
        .args(["+nightly", "build", "--package", EBPF_PACKAGE, "--target", target])
        .args(["-Z", "build-std=core", "--release"])
        .status()
        .context("Failed to run cargo for the eBPF build")?;

    if !status.success() {
        anyhow::bail!("Failed to build {EBPF_PACKAGE}");
    }

    println!("✓ eBPF object built");
    println!("  Target: {target}");
    println!("  Output: target/{target}/release/kmon");

    Ok(())
}
