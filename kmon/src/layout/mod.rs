//! Kernel struct layout used by the probes
//!
//! The kernel-side programs walk `task_struct` and `fib_config` through raw
//! offsets written into the `CONFIG` map. Offsets come from kernel BTF, or from a
//! JSON file when BTF is missing (`--layout`).

pub mod btf;

use std::path::Path;

use kmon_common::{
    CONFIG_FIB_CONFIG_DST, CONFIG_NSPROXY_PID_NS, CONFIG_PID_NS_INUM, CONFIG_TASK_COMM,
    CONFIG_TASK_NSPROXY, CONFIG_TASK_REAL_PARENT, CONFIG_TASK_TGID,
};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::domain::{BtfError, LayoutError};
pub use btf::Btf;

/// Byte offsets of the kernel struct fields the probes read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelLayout {
    pub task_real_parent: u32,
    pub task_tgid: u32,
    pub task_comm: u32,
    pub task_nsproxy: u32,
    pub nsproxy_pid_ns_for_children: u32,
    /// `pid_namespace.ns` plus `ns_common.inum`
    pub pid_ns_inum: u32,
    pub fib_config_dst: u32,
}

impl KernelLayout {
    /// Resolve every offset from parsed BTF
    ///
    /// # Errors
    /// Returns an error if any struct or member is missing
    pub fn from_btf(btf: &Btf) -> Result<Self, BtfError> {
        let ns_common = btf.member_offset("pid_namespace", "ns")?;
        let inum = btf.member_offset("ns_common", "inum")?;

        Ok(Self {
            task_real_parent: btf.member_offset("task_struct", "real_parent")?,
            task_tgid: btf.member_offset("task_struct", "tgid")?,
            task_comm: btf.member_offset("task_struct", "comm")?,
            task_nsproxy: btf.member_offset("task_struct", "nsproxy")?,
            nsproxy_pid_ns_for_children: btf.member_offset("nsproxy", "pid_ns_for_children")?,
            pid_ns_inum: ns_common + inum,
            fib_config_dst: btf.member_offset("fib_config", "fc_dst")?,
        })
    }

    /// Parse the BTF file at `path` and resolve the layout
    ///
    /// # Errors
    /// Returns an error if the file is unreadable or incomplete
    pub fn discover(path: &Path) -> Result<Self, LayoutError> {
        let btf = Btf::from_file(path)?;
        debug!("Parsed {} BTF types from {}", btf.type_count(), path.display());
        Ok(Self::from_btf(&btf)?)
    }

    /// Read a layout override written as JSON
    ///
    /// # Errors
    /// Returns an error if the file is unreadable or not a complete layout
    pub fn from_file(path: &Path) -> Result<Self, LayoutError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| LayoutError::Read { path: path.to_path_buf(), source })?;
        serde_json::from_str(&text)
            .map_err(|source| LayoutError::Parse { path: path.to_path_buf(), source })
    }

    /// Override file wins; otherwise discover from BTF
    ///
    /// # Errors
    /// Propagates the error of whichever source was used
    pub fn load(override_path: Option<&Path>, btf_path: &Path) -> Result<Self, LayoutError> {
        match override_path {
            Some(path) => Self::from_file(path),
            None => Self::discover(btf_path),
        }
    }

    /// `(key, value)` pairs for the `CONFIG` map
    #[must_use]
    pub fn config_entries(&self) -> [(u32, u64); 7] {
        [
            (CONFIG_TASK_REAL_PARENT, u64::from(self.task_real_parent)),
            (CONFIG_TASK_TGID, u64::from(self.task_tgid)),
            (CONFIG_TASK_COMM, u64::from(self.task_comm)),
            (CONFIG_TASK_NSPROXY, u64::from(self.task_nsproxy)),
            (CONFIG_NSPROXY_PID_NS, u64::from(self.nsproxy_pid_ns_for_children)),
            (CONFIG_PID_NS_INUM, u64::from(self.pid_ns_inum)),
            (CONFIG_FIB_CONFIG_DST, u64::from(self.fib_config_dst)),
        ]
    }
}
