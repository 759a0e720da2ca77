//! Pre-flight checks for kmon
//!
//! Validates system requirements before attempting to load eBPF programs.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::monitoring::symbols::KALLSYMS_PATH;

/// `bpf_probe_read_user`/`bpf_probe_read_kernel` arrived in 5.5
const MIN_KERNEL_VERSION: (u32, u32) = (5, 5);

/// Run all pre-flight checks before eBPF loading
///
/// # Errors
/// Returns the first failed check with a hint on how to fix it
pub fn run_preflight_checks(object: &Path, layout: Option<&Path>, btf: &Path) -> Result<()> {
    check_privileges()?;
    check_kernel_version()?;
    check_kallsyms_readable()?;
    check_object_exists(object)?;
    check_layout_source(layout, btf)?;
    Ok(())
}

/// Check if running with sufficient privileges for eBPF
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    bail!(
        "Permission denied: kmon requires root privileges to load eBPF programs.\n\n\
         Run with: sudo kmon ..."
    );
}

/// Check if the kernel version is sufficient for eBPF features
fn check_kernel_version() -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // "Linux version 6.1.0-arch1-1 ..."
    let release = version_str.split_whitespace().nth(2).unwrap_or("unknown");
    let Some(version) = parse_kernel_release(release) else {
        // Can't parse, assume it's fine
        return Ok(());
    };

    if version < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {}.{} is too old.\n\n\
             kmon requires Linux {}.{} or newer for the bpf_probe_read_user/kernel helpers.\n\
             Current kernel: {}",
            version.0,
            version.1,
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
            release
        );
    }

    Ok(())
}

/// `(major, minor)` of a release string like `"5.15.0-91-generic"`
fn parse_kernel_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts
        .next()?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()?;
    Some((major, minor))
}

/// Symbol resolution reads /proc/kallsyms
fn check_kallsyms_readable() -> Result<()> {
    std::fs::File::open(KALLSYMS_PATH).with_context(|| {
        format!(
            "Cannot read {KALLSYMS_PATH}\n\n\
             This usually means /proc is not mounted or access is restricted."
        )
    })?;
    Ok(())
}

/// Check the compiled eBPF object is where we expect it
fn check_object_exists(object: &Path) -> Result<()> {
    if !object.is_file() {
        bail!(
            "eBPF object not found: {}\n\n\
             Build it with: cargo xtask build-ebpf --release\n\
             or point --object at a compiled kmon-ebpf binary.",
            object.display()
        );
    }
    Ok(())
}

/// Without a layout file, struct offsets come from kernel BTF
fn check_layout_source(layout: Option<&Path>, btf: &Path) -> Result<()> {
    match layout {
        Some(path) if !path.is_file() => {
            bail!("Layout file not found: {}", path.display());
        }
        Some(_) => Ok(()),
        None if !btf.exists() => bail!(
            "Kernel BTF not found at {}\n\n\
             This kernel was likely built without CONFIG_DEBUG_INFO_BTF.\n\
             Pass --btf <FILE> or provide struct offsets with --layout <FILE>.",
            btf.display()
        ),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kernel_release() {
        assert_eq!(parse_kernel_release("5.15.0-91-generic"), Some((5, 15)));
        assert_eq!(parse_kernel_release("6.1.0-arch1-1"), Some((6, 1)));
        assert_eq!(parse_kernel_release("4.19rc1"), Some((4, 19)));
        assert_eq!(parse_kernel_release("unknown"), None);
    }

    #[test]
    fn test_minimum_version_ordering() {
        assert!((5, 4) < MIN_KERNEL_VERSION);
        assert!((5, 10) >= MIN_KERNEL_VERSION);
        assert!((6, 0) >= MIN_KERNEL_VERSION);
    }

    #[test]
    fn test_object_not_found() {
        let err = check_object_exists(Path::new("/nonexistent/kmon")).unwrap_err().to_string();
        assert!(err.contains("eBPF object not found"));
        assert!(err.contains("build-ebpf"));
    }

    #[test]
    fn test_missing_btf_suggests_layout() {
        let err = check_layout_source(None, Path::new("/nonexistent/vmlinux"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("--layout"));
    }

    #[test]
    fn test_layout_override_skips_btf() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(check_layout_source(Some(file.path()), Path::new("/nonexistent/vmlinux")).is_ok());
        assert!(check_layout_source(Some(Path::new("/nonexistent.json")), file.path()).is_err());
    }
}
