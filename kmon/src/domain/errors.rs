//! Structured error types for kmon
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to load eBPF object {path}: {error}")]
    EbpfLoadFailed { path: PathBuf, error: String },

    #[error("eBPF program {0} not found in object")]
    ProgramNotFound(String),

    #[error("eBPF map {0} not found in object")]
    MapNotFound(String),

    #[error("Failed to attach {probe} to {symbol}: {error}")]
    ProbeAttachFailed { probe: String, symbol: String, error: String },

    #[error("Kernel symbol {0} not found in /proc/kallsyms")]
    SymbolNotFound(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A raw perf record that could not be turned into an event
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record too short: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("unknown event kind {0}")]
    UnknownKind(u32),
}

/// Malformed or incomplete kernel BTF
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BtfError {
    #[error("bad BTF magic {0:#06x}")]
    BadMagic(u16),

    #[error("BTF truncated at byte {0}")]
    Truncated(usize),

    #[error("unsupported BTF kind {0}")]
    UnknownKind(u32),

    #[error("struct {0} not found in BTF")]
    StructNotFound(String),

    #[error("member {member} not found in struct {strukt}")]
    MemberNotFound { strukt: String, member: String },
}

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("Failed to parse layout file {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },

    #[error("Kernel layout discovery failed: {0}")]
    Btf(#[from] BtfError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_attach_error() {
        let err = MonitorError::ProbeAttachFailed {
            probe: "fib_insert".to_string(),
            symbol: "fib_table_insert".to_string(),
            error: "symbol not found".to_string(),
        };
        assert!(err.to_string().contains("fib_insert"));
        assert!(err.to_string().contains("fib_table_insert"));
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::Truncated { expected: 168, actual: 12 };
        assert_eq!(err.to_string(), "record too short: expected 168 bytes, got 12");
    }

    #[test]
    fn test_btf_error_wraps_into_layout() {
        let err: LayoutError = BtfError::StructNotFound("fib_config".to_string()).into();
        assert!(err.to_string().contains("fib_config"));
    }
}
