//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep raw kernel integers from being mixed up, and the
//! kind enums give the `u32` discriminants carried in the event records a name.

use std::fmt;

use kmon_common::{EXEC_ARGUMENT, EXEC_COMPLETION, ROUTE_DELETE, ROUTE_INSERT};

use super::errors::DecodeError;

/// Process ID (TGID)
///
/// The correlation key for exec fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// CPU ID
///
/// Represents a CPU core ID (0, 1, 2, ...). Each one owns a perf buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuId(pub u32);

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU:{}", self.0)
    }
}

/// Discriminant of an exec record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecKind {
    /// One argv fragment
    Argument,
    /// execve returned
    Completion,
}

impl TryFrom<u32> for ExecKind {
    type Error = DecodeError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            EXEC_ARGUMENT => Ok(Self::Argument),
            EXEC_COMPLETION => Ok(Self::Completion),
            other => Err(DecodeError::UnknownKind(other)),
        }
    }
}

/// Discriminant of a route record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Insert,
    Delete,
}

impl RouteKind {
    /// Short label used in the route table
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Insert => "add",
            Self::Delete => "del",
        }
    }
}

impl TryFrom<u32> for RouteKind {
    type Error = DecodeError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            ROUTE_INSERT => Ok(Self::Insert),
            ROUTE_DELETE => Ok(Self::Delete),
            other => Err(DecodeError::UnknownKind(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_discriminants() {
        assert_eq!(ExecKind::try_from(0).unwrap(), ExecKind::Argument);
        assert_eq!(ExecKind::try_from(1).unwrap(), ExecKind::Completion);
        assert_eq!(RouteKind::try_from(1).unwrap(), RouteKind::Delete);
        assert!(matches!(RouteKind::try_from(7), Err(DecodeError::UnknownKind(7))));
    }

    #[test]
    fn test_route_labels() {
        assert_eq!(RouteKind::Insert.label(), "add");
        assert_eq!(RouteKind::Delete.label(), "del");
    }
}
