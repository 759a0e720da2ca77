//! Raw perf records to typed events
//!
//! Records come off the perf buffer as byte slices. They are copied out with an
//! unaligned read after a length check, then turned into owned records with the
//! kind discriminant validated.

use std::mem::size_of;

use aya::Pod;
use kmon_common::{field_bytes, ExecEvent, RouteEvent};

use crate::domain::{DecodeError, ExecKind, Pid, RouteKind};

/// Copy a `T` out of the front of `bytes`
///
/// # Errors
/// Returns [`DecodeError::Truncated`] if `bytes` is shorter than `T`
#[allow(unsafe_code)]
pub fn read_record<T: Pod>(bytes: &[u8]) -> Result<T, DecodeError> {
    let expected = size_of::<T>();
    if bytes.len() < expected {
        return Err(DecodeError::Truncated { expected, actual: bytes.len() });
    }
    // SAFETY: length checked above and `T: Pod` accepts any bit pattern
    Ok(unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<T>()) })
}

/// Lossy UTF-8 view of a NUL-padded kernel text field
#[must_use]
pub fn field_text(buf: &[u8]) -> String {
    String::from_utf8_lossy(field_bytes(buf)).into_owned()
}

/// One decoded exec record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRecord {
    pub kind: ExecKind,
    pub timestamp_ns: u64,
    pub pid: Pid,
    pub ppid: Pid,
    pub comm: String,
    /// Empty for completions
    pub argument: String,
}

impl TryFrom<&ExecEvent> for ExecRecord {
    type Error = DecodeError;

    fn try_from(event: &ExecEvent) -> Result<Self, Self::Error> {
        let kind = ExecKind::try_from(event.kind)?;
        let argument = match kind {
            ExecKind::Argument => field_text(&event.argv),
            ExecKind::Completion => String::new(),
        };
        Ok(Self {
            kind,
            timestamp_ns: event.timestamp_ns,
            pid: Pid(event.pid),
            ppid: Pid(event.ppid),
            comm: field_text(&event.comm),
            argument,
        })
    }
}

/// One decoded route record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub kind: RouteKind,
    pub timestamp_ns: u64,
    pub pid: Pid,
    pub ppid: Pid,
    pub comm: String,
    pub pcomm: String,
    /// Destination exactly as the kernel stored it
    pub dst: u32,
    pub pidns_inum: u32,
}

impl TryFrom<&RouteEvent> for RouteRecord {
    type Error = DecodeError;

    fn try_from(event: &RouteEvent) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: RouteKind::try_from(event.kind)?,
            timestamp_ns: event.timestamp_ns,
            pid: Pid(event.pid),
            ppid: Pid(event.ppid),
            comm: field_text(&event.comm),
            pcomm: field_text(&event.pcomm),
            dst: event.dst,
            pidns_inum: event.pidns_inum,
        })
    }
}

/// Decode an exec record from raw perf bytes
///
/// # Errors
/// Returns an error on a short buffer or unknown kind
pub fn decode_exec(bytes: &[u8]) -> Result<ExecRecord, DecodeError> {
    let event: ExecEvent = read_record(bytes)?;
    ExecRecord::try_from(&event)
}

/// Decode a route record from raw perf bytes
///
/// # Errors
/// Returns an error on a short buffer or unknown kind
pub fn decode_route(bytes: &[u8]) -> Result<RouteRecord, DecodeError> {
    let event: RouteEvent = read_record(bytes)?;
    RouteRecord::try_from(&event)
}

/// View a record as the bytes the kernel would have submitted
#[allow(unsafe_code)]
#[must_use]
pub fn record_bytes<T: Pod>(record: &T) -> Vec<u8> {
    // SAFETY: `T: Pod` is plain data without interior pointers
    unsafe { std::slice::from_raw_parts((record as *const T).cast::<u8>(), size_of::<T>()) }
        .to_vec()
}

#[cfg(test)]
mod tests {
    use kmon_common::{EXEC_ARGUMENT, EXEC_COMPLETION, ROUTE_DELETE};

    use super::*;

    fn fill(dst: &mut [u8], text: &str) {
        dst[..text.len()].copy_from_slice(text.as_bytes());
    }

    #[test]
    fn test_decode_exec_argument() {
        let mut event = ExecEvent::zeroed(EXEC_ARGUMENT);
        event.pid = 4242;
        event.ppid = 1;
        fill(&mut event.comm, "bash");
        fill(&mut event.argv, "/bin/ls");

        let record = decode_exec(&record_bytes(&event)).unwrap();
        assert_eq!(record.kind, ExecKind::Argument);
        assert_eq!(record.pid, Pid(4242));
        assert_eq!(record.comm, "bash");
        assert_eq!(record.argument, "/bin/ls");
    }

    #[test]
    fn test_completion_ignores_payload() {
        let mut event = ExecEvent::zeroed(EXEC_COMPLETION);
        fill(&mut event.argv, "stale");
        let record = decode_exec(&record_bytes(&event)).unwrap();
        assert_eq!(record.kind, ExecKind::Completion);
        assert!(record.argument.is_empty());
    }

    #[test]
    fn test_short_buffer() {
        let event = ExecEvent::zeroed(EXEC_ARGUMENT);
        let bytes = record_bytes(&event);
        let err = decode_exec(&bytes[..100]).unwrap_err();
        assert_eq!(err, DecodeError::Truncated { expected: 168, actual: 100 });
    }

    #[test]
    fn test_unknown_kind() {
        let event = RouteEvent::zeroed(9);
        assert_eq!(decode_route(&record_bytes(&event)), Err(DecodeError::UnknownKind(9)));
    }

    #[test]
    fn test_decode_route_from_unaligned_slice() {
        let mut event = RouteEvent::zeroed(ROUTE_DELETE);
        event.dst = u32::from_ne_bytes([192, 168, 1, 0]);
        event.pidns_inum = 4_026_531_836;
        fill(&mut event.pcomm, "systemd");

        // perf buffers give no alignment guarantee
        let mut bytes = vec![0u8];
        bytes.extend(record_bytes(&event));
        let record = decode_route(&bytes[1..]).unwrap();

        assert_eq!(record.kind, RouteKind::Delete);
        assert_eq!(record.pcomm, "systemd");
        assert_eq!(record.dst.to_ne_bytes(), [192, 168, 1, 0]);
        assert_eq!(record.pidns_inum, 4_026_531_836);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        assert_eq!(field_text(&[b'a', 0xff, b'b', 0, b'z']), "a\u{fffd}b");
    }
}
