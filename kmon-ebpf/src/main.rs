//! # eBPF Kernel-Side Instrumentation
//!
//! eBPF programs that run inside the Linux kernel and stream exec and route events.
//!
//! ## Programs
//!
//! - **Kprobe**: `exec_entry` - execve entry, one record per argv fragment
//! - **Kretprobe**: `exec_return` - execve return, one completion record
//! - **Kprobe**: `fib_insert` / `fib_delete` - IPv4 forwarding-table mutation
//!
//! ## Maps (Shared with Userspace)
//!
//! - `EXEC_EVENTS` - Per-CPU perf buffers for [`ExecEvent`]
//! - `ROUTE_EVENTS` - Per-CPU perf buffers for [`RouteEvent`]
//! - `CONFIG` - Kernel struct offsets and the syscall wrapper flag
//!
//! ## Build
//!
//! Always compiled in release mode:
//! ```bash
//! cargo xtask build-ebpf --release
//! ```

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

use aya_ebpf::{
    args::FromPtRegs,
    bindings::pt_regs,
    helpers::{
        bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_get_current_task, bpf_ktime_get_ns,
        bpf_probe_read_kernel, bpf_probe_read_user, bpf_probe_read_user_str_bytes,
    },
    macros::{kprobe, kretprobe, map},
    maps::{HashMap, PerfEventArray},
    programs::{ProbeContext, RetProbeContext},
    EbpfContext,
};
use aya_log_ebpf::debug;
use kmon_common::{
    terminate, walk_args, ArgStep, ExecEvent, RouteEvent, COMM_LEN, CONFIG_FIB_CONFIG_DST,
    CONFIG_NSPROXY_PID_NS, CONFIG_PID_NS_INUM, CONFIG_SYSCALL_WRAPPER, CONFIG_TASK_COMM,
    CONFIG_TASK_NSPROXY, CONFIG_TASK_REAL_PARENT, CONFIG_TASK_TGID, EXEC_ARGUMENT,
    EXEC_COMPLETION, ROUTE_DELETE, ROUTE_INSERT,
};

// ============================================================================
// eBPF Maps - Shared data structures between kernel and userspace
// ============================================================================

/// Per-CPU perf buffers for exec events
///
/// `output()` never blocks: when the CPU's buffer is full the record is dropped
/// and userspace only sees it in the lost-sample count.
#[map]
static EXEC_EVENTS: PerfEventArray<ExecEvent> = PerfEventArray::new(0);

/// Per-CPU perf buffers for route events
#[map]
static ROUTE_EVENTS: PerfEventArray<RouteEvent> = PerfEventArray::new(0);

/// Map: Config key → Config value
///
/// Written once by userspace before attach (see `CONFIG_*` in `kmon-common`).
/// An offset of 0 means "unknown" and the dependent field is left zeroed.
#[map]
static CONFIG: HashMap<u32, u64> = HashMap::with_max_entries(16, 0);

// ============================================================================
// Exec probes
// ============================================================================

/// Hook: execve syscall entry
#[kprobe]
pub fn exec_entry(ctx: ProbeContext) -> u32 {
    match try_exec_entry(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_exec_entry(ctx: &ProbeContext) -> Result<(), i64> {
    let mut event = exec_header(EXEC_ARGUMENT);

    let filename: *const u8 = syscall_arg(ctx, 0).ok_or(1i64)?;
    let argv: *const *const u8 = syscall_arg(ctx, 1).ok_or(1i64)?;

    submit_fragment(ctx, &mut event, filename);

    walk_args(|slot| {
        // SAFETY: only the address is computed here, the read goes through the helper
        let slot_ptr = unsafe { argv.add(slot) };
        let arg = match unsafe { bpf_probe_read_user(slot_ptr) } {
            Ok(arg) => arg,
            Err(_) => {
                debug!(ctx, "argv slot {} unreadable", slot);
                return ArgStep::Stop;
            }
        };
        if arg.is_null() {
            return ArgStep::Stop;
        }
        submit_fragment(ctx, &mut event, arg);
        ArgStep::Next
    });

    Ok(())
}

/// Hook: execve syscall return (success or failure)
#[kretprobe]
pub fn exec_return(ctx: RetProbeContext) -> u32 {
    let event = exec_header(EXEC_COMPLETION);
    unsafe {
        EXEC_EVENTS.output(&ctx, &event, 0);
    }
    0
}

fn exec_header(kind: u32) -> ExecEvent {
    let task = current_task();
    let mut event = ExecEvent::zeroed(kind);
    event.timestamp_ns = unsafe { bpf_ktime_get_ns() };
    event.pid = current_tgid();
    event.ppid = parent_tgid(task).unwrap_or(0);
    event.comm = bpf_get_current_comm().unwrap_or([0u8; COMM_LEN]);
    event
}

/// Copy one user string into the payload and submit the record
///
/// A failed read still submits, with an empty fragment.
fn submit_fragment<C: EbpfContext>(ctx: &C, event: &mut ExecEvent, src: *const u8) {
    if unsafe { bpf_probe_read_user_str_bytes(src, &mut event.argv) }.is_err() {
        event.argv[0] = 0;
    }
    terminate(&mut event.argv);
    unsafe {
        EXEC_EVENTS.output(ctx, event, 0);
    }
}

/// Read argument `n` of the probed syscall
///
/// Arch wrappers (`__x64_sys_execve` and friends) receive a single `struct pt_regs *`
/// holding the real arguments, so those are read from the inner register set.
fn syscall_arg<T>(ctx: &ProbeContext, n: usize) -> Option<*const T> {
    if config(CONFIG_SYSCALL_WRAPPER) == 0 {
        return ctx.arg(n);
    }
    let regs: *const pt_regs = ctx.arg(0)?;
    let regs = unsafe { bpf_probe_read_kernel(regs) }.ok()?;
    <*const T as FromPtRegs>::from_argument(&regs, n)
}

// ============================================================================
// Route probes
// ============================================================================

/// Hook: `fib_table_insert(net, tb, cfg, extack)`
#[kprobe]
pub fn fib_insert(ctx: ProbeContext) -> u32 {
    match try_fib_event(&ctx, ROUTE_INSERT) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// Hook: `fib_table_delete(net, tb, cfg, extack)`
#[kprobe]
pub fn fib_delete(ctx: ProbeContext) -> u32 {
    match try_fib_event(&ctx, ROUTE_DELETE) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_fib_event(ctx: &ProbeContext, kind: u32) -> Result<(), i64> {
    let cfg: *const u8 = ctx.arg(2).ok_or(1i64)?;
    let task = current_task();
    let parent = read_ptr(task, config(CONFIG_TASK_REAL_PARENT));

    let mut event = RouteEvent::zeroed(kind);
    event.timestamp_ns = unsafe { bpf_ktime_get_ns() };
    event.pid = current_tgid();
    event.ppid = parent_tgid(task).unwrap_or(0);
    event.comm = bpf_get_current_comm().unwrap_or([0u8; COMM_LEN]);
    event.pcomm = parent
        .and_then(|parent| read_field(parent, config(CONFIG_TASK_COMM)))
        .unwrap_or([0u8; COMM_LEN]);
    terminate(&mut event.pcomm);
    event.dst = read_field(cfg, config(CONFIG_FIB_CONFIG_DST)).unwrap_or(0);
    event.pidns_inum = children_pidns_inum(task).unwrap_or(0);

    unsafe {
        ROUTE_EVENTS.output(ctx, &event, 0);
    }
    Ok(())
}

// ============================================================================
// task_struct walking (offsets supplied by userspace)
// ============================================================================

fn config(key: u32) -> u64 {
    unsafe { CONFIG.get(&key).copied().unwrap_or(0) }
}

fn current_task() -> *const u8 {
    unsafe { bpf_get_current_task() as *const u8 }
}

fn current_tgid() -> u32 {
    (bpf_get_current_pid_tgid() >> 32) as u32
}

fn read_field<T>(base: *const u8, offset: u64) -> Option<T> {
    if base.is_null() || offset == 0 {
        return None;
    }
    let ptr = unsafe { base.add(offset as usize) as *const T };
    unsafe { bpf_probe_read_kernel(ptr).ok() }
}

fn read_ptr(base: *const u8, offset: u64) -> Option<*const u8> {
    let addr: usize = read_field(base, offset)?;
    if addr == 0 {
        None
    } else {
        Some(addr as *const u8)
    }
}

fn parent_tgid(task: *const u8) -> Option<u32> {
    let parent = read_ptr(task, config(CONFIG_TASK_REAL_PARENT))?;
    let tgid: i32 = read_field(parent, config(CONFIG_TASK_TGID))?;
    Some(tgid as u32)
}

fn children_pidns_inum(task: *const u8) -> Option<u32> {
    let nsproxy = read_ptr(task, config(CONFIG_TASK_NSPROXY))?;
    let pid_ns = read_ptr(nsproxy, config(CONFIG_NSPROXY_PID_NS))?;
    read_field(pid_ns, config(CONFIG_PID_NS_INUM))
}

#[unsafe(no_mangle)]
#[unsafe(link_section = "license")]
pub static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
