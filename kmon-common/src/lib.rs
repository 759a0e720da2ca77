//! # Shared Data Structures (eBPF ↔ Userspace)
//!
//! Defines the event records and constants shared between the kernel-side probes
//! and the userspace monitor. All records use `#[repr(C)]` with explicit padding so
//! both sides agree on the layout byte for byte.
//!
//! ## Event Streams
//!
//! 1. **Exec** - [`ExecEvent`] via `EXEC_EVENTS`. One `EXEC_ARGUMENT` record per argv
//!    fragment, then one `EXEC_COMPLETION` record when the syscall returns.
//! 2. **Route** - [`RouteEvent`] via `ROUTE_EVENTS`. One record per forwarding-table
//!    insert or delete.
//!
//! ## Kernel Configuration
//!
//! Userspace writes struct field offsets into the `CONFIG` map before attaching the
//! probes. Keys are the `CONFIG_*` constants below.

#![cfg_attr(not(test), no_std)]

// ============================================================================
// Sizes
// ============================================================================

/// Width of a task command name (`TASK_COMM_LEN`)
pub const COMM_LEN: usize = 16;

/// Width of one argument fragment, including the terminating NUL
pub const ARG_LEN: usize = 128;

/// Maximum number of argv slots the exec probe visits
///
/// The verifier needs a compile-time bound on the walk. Slots past this are
/// dropped without any signal downstream.
pub const MAX_ARGS: usize = 20;

// ============================================================================
// Event Kinds
// ============================================================================

/// **Exec**: one fragment of the argument vector (the path, or one argv slot)
pub const EXEC_ARGUMENT: u32 = 0;

/// **Exec**: the execve syscall returned; no payload
pub const EXEC_COMPLETION: u32 = 1;

/// **Route**: `fib_table_insert` was called
pub const ROUTE_INSERT: u32 = 0;

/// **Route**: `fib_table_delete` was called
pub const ROUTE_DELETE: u32 = 1;

// ============================================================================
// CONFIG map keys
// ============================================================================

/// Non-zero when the execve symbol is an arch wrapper taking `struct pt_regs *`
pub const CONFIG_SYSCALL_WRAPPER: u32 = 0;
/// Byte offset of `task_struct.real_parent`
pub const CONFIG_TASK_REAL_PARENT: u32 = 1;
/// Byte offset of `task_struct.tgid`
pub const CONFIG_TASK_TGID: u32 = 2;
/// Byte offset of `task_struct.comm`
pub const CONFIG_TASK_COMM: u32 = 3;
/// Byte offset of `task_struct.nsproxy`
pub const CONFIG_TASK_NSPROXY: u32 = 4;
/// Byte offset of `nsproxy.pid_ns_for_children`
pub const CONFIG_NSPROXY_PID_NS: u32 = 5;
/// Byte offset of `pid_namespace.ns.inum`
pub const CONFIG_PID_NS_INUM: u32 = 6;
/// Byte offset of `fib_config.fc_dst`
pub const CONFIG_FIB_CONFIG_DST: u32 = 7;

// ============================================================================
// Shared Data Structures
// ============================================================================

/// Exec event sent from the execve probes to userspace
///
/// **Size**: 168 bytes, fits comfortably in the 512-byte eBPF stack.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ExecEvent {
    /// Timestamp in nanoseconds (from `bpf_ktime_get_ns()`)
    ///
    /// Monotonic and only comparable with events from the same CPU.
    pub timestamp_ns: u64,

    /// Process ID (TGID in Linux terms), the correlation key
    pub pid: u32,

    /// TGID of `task->real_parent`, 0 when unreadable
    pub ppid: u32,

    /// Command name of the current task, NUL-padded
    pub comm: [u8; COMM_LEN],

    /// One argument fragment, NUL-terminated within its width
    ///
    /// Strings longer than `ARG_LEN - 1` are truncated by the kernel copy.
    pub argv: [u8; ARG_LEN],

    /// `EXEC_ARGUMENT` or `EXEC_COMPLETION`
    pub kind: u32,

    /// Padding for 8-byte alignment
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: [u8; 4],
}

impl ExecEvent {
    /// An all-zero record of the given kind
    #[must_use]
    pub const fn zeroed(kind: u32) -> Self {
        Self {
            timestamp_ns: 0,
            pid: 0,
            ppid: 0,
            comm: [0; COMM_LEN],
            argv: [0; ARG_LEN],
            kind,
            _padding: [0; 4],
        }
    }
}

/// Route event sent from the `fib_table_{insert,delete}` probes to userspace
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RouteEvent {
    /// Timestamp in nanoseconds (from `bpf_ktime_get_ns()`)
    pub timestamp_ns: u64,

    /// Process ID (TGID) of the task mutating the table
    pub pid: u32,

    /// TGID of `task->real_parent`, 0 when unreadable
    pub ppid: u32,

    /// Command name of the current task
    pub comm: [u8; COMM_LEN],

    /// Command name of `task->real_parent`, all zero if the parent is gone
    pub pcomm: [u8; COMM_LEN],

    /// `ROUTE_INSERT` or `ROUTE_DELETE`
    pub kind: u32,

    /// `cfg->fc_dst` exactly as the kernel stores it (network byte order)
    pub dst: u32,

    /// Inode number of `task->nsproxy->pid_ns_for_children`
    pub pidns_inum: u32,

    /// Padding for 8-byte alignment
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: [u8; 4],
}

impl RouteEvent {
    /// An all-zero record of the given kind
    #[must_use]
    pub const fn zeroed(kind: u32) -> Self {
        Self {
            timestamp_ns: 0,
            pid: 0,
            ppid: 0,
            comm: [0; COMM_LEN],
            pcomm: [0; COMM_LEN],
            kind,
            dst: 0,
            pidns_inum: 0,
            _padding: [0; 4],
        }
    }
}

// ============================================================================
// Fixed-width text helpers
// ============================================================================

/// Force a NUL into the last byte so the field is terminated whatever was copied in
#[inline(always)]
pub fn terminate(buf: &mut [u8]) {
    if let Some(last) = buf.last_mut() {
        *last = 0;
    }
}

/// The bytes of a fixed-width text field up to (not including) the first NUL
#[must_use]
pub fn field_bytes(buf: &[u8]) -> &[u8] {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    &buf[..end]
}

// ============================================================================
// Bounded argv walk
// ============================================================================

/// Outcome of visiting one argv slot
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArgStep {
    /// A fragment was emitted, keep walking
    Next,
    /// NULL (or unreadable) slot, stop the walk
    Stop,
}

/// Visit argv slots `0..MAX_ARGS` in order, stopping at the first [`ArgStep::Stop`]
///
/// Returns how many slots were visited with [`ArgStep::Next`], which is the number
/// of fragments the caller emitted.
#[inline(always)]
pub fn walk_args<F: FnMut(usize) -> ArgStep>(mut visit: F) -> usize {
    let mut emitted = 0;
    for slot in 0..MAX_ARGS {
        if visit(slot) == ArgStep::Stop {
            break;
        }
        emitted += 1;
    }
    emitted
}

#[cfg(feature = "user")]
use aya::Pod;

// Plain bytes across the perf buffer
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for ExecEvent {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for RouteEvent {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes_are_fixed() {
        assert_eq!(core::mem::size_of::<ExecEvent>(), 168);
        assert_eq!(core::mem::size_of::<RouteEvent>(), 64);
        assert_eq!(core::mem::align_of::<ExecEvent>(), 8);
    }

    #[test]
    fn test_terminate_long_field() {
        let mut buf = [b'x'; COMM_LEN];
        terminate(&mut buf);
        assert_eq!(field_bytes(&buf).len(), COMM_LEN - 1);
    }

    #[test]
    fn test_field_bytes_stops_at_nul() {
        let mut buf = [0u8; 8];
        buf[..3].copy_from_slice(b"abc");
        buf[4] = b'z';
        assert_eq!(field_bytes(&buf), b"abc");
        assert_eq!(field_bytes(b"full"), b"full");
    }

    #[test]
    fn test_walk_args_caps_at_max() {
        let argv: Vec<Option<&str>> = (0..MAX_ARGS + 5).map(|_| Some("a")).collect();
        let mut seen = Vec::new();
        let emitted = walk_args(|slot| match argv[slot] {
            Some(arg) => {
                seen.push(arg);
                ArgStep::Next
            }
            None => ArgStep::Stop,
        });
        assert_eq!(emitted, MAX_ARGS);
        assert_eq!(seen.len(), MAX_ARGS);
    }

    #[test]
    fn test_walk_args_stops_at_null() {
        let argv = [Some("ls"), Some("-la"), None, Some("ignored")];
        let mut seen = Vec::new();
        let emitted = walk_args(|slot| match argv.get(slot).copied().flatten() {
            Some(arg) => {
                seen.push(arg);
                ArgStep::Next
            }
            None => ArgStep::Stop,
        });
        assert_eq!(emitted, 2);
        assert_eq!(seen, ["ls", "-la"]);
    }
}
