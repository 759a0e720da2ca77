//! Kernel symbol lookup via `/proc/kallsyms`
//!
//! The execve entry point is named differently per architecture and kernel
//! version. Since 4.17 the syscall table points at `__<arch>_sys_execve`, which
//! takes a single `struct pt_regs *`; older kernels expose plain `sys_execve`.

use std::collections::HashSet;
use std::path::Path;

use log::debug;

use crate::domain::MonitorError;

pub const KALLSYMS_PATH: &str = "/proc/kallsyms";

/// Architecture wrapper prefixes, tried in order before the bare `sys_` name
pub const WRAPPER_PREFIXES: [&str; 5] =
    ["__x64_sys_", "__arm64_sys_", "__s390x_sys_", "__riscv_sys_", "__ia32_sys_"];

/// A resolved syscall entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallSymbol {
    pub name: String,
    /// Entry takes `struct pt_regs *` holding the real arguments
    pub wrapper: bool,
}

impl SyscallSymbol {
    /// Classify a symbol name given on the command line
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let wrapper = WRAPPER_PREFIXES.iter().any(|prefix| name.starts_with(prefix));
        Self { name: name.to_string(), wrapper }
    }
}

/// Set of kernel function names
pub struct KernelSymbols {
    names: HashSet<String>,
}

impl KernelSymbols {
    /// Read `/proc/kallsyms`
    ///
    /// # Errors
    /// Returns an error if the file cannot be read
    pub fn load() -> Result<Self, MonitorError> {
        Self::load_from(Path::new(KALLSYMS_PATH))
    }

    /// Read a kallsyms-formatted file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read
    pub fn load_from(path: &Path) -> Result<Self, MonitorError> {
        let text = std::fs::read_to_string(path)?;
        let symbols = Self::parse(&text);
        debug!("Loaded {} kernel symbols from {}", symbols.len(), path.display());
        Ok(symbols)
    }

    /// Parse `address type name [module]` lines
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let names = text
            .lines()
            .filter_map(|line| line.split_whitespace().nth(2))
            .map(str::to_string)
            .collect();
        Self { names }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Find the entry point of `syscall` (e.g. `"execve"`)
    ///
    /// # Errors
    /// Returns [`MonitorError::SymbolNotFound`] if no candidate is present
    pub fn syscall(&self, syscall: &str) -> Result<SyscallSymbol, MonitorError> {
        WRAPPER_PREFIXES
            .iter()
            .map(|prefix| format!("{prefix}{syscall}"))
            .find(|name| self.contains(name))
            .map(|name| SyscallSymbol { name, wrapper: true })
            .or_else(|| {
                let name = format!("sys_{syscall}");
                self.contains(&name).then_some(SyscallSymbol { name, wrapper: false })
            })
            .ok_or_else(|| MonitorError::SymbolNotFound(format!("sys_{syscall}")))
    }

    /// Fail unless `name` is present
    ///
    /// # Errors
    /// Returns [`MonitorError::SymbolNotFound`] if the symbol is missing
    pub fn require(&self, name: &str) -> Result<(), MonitorError> {
        if self.contains(name) {
            Ok(())
        } else {
            Err(MonitorError::SymbolNotFound(name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const X86_KALLSYMS: &str = "\
ffffffff81000000 T startup_64
ffffffff8130a0b0 T __ia32_sys_execve
ffffffff8130a0f0 T __x64_sys_execve
ffffffff81b2c3d0 T fib_table_insert
ffffffff81b2d010 T fib_table_delete
ffffffffc0a01000 t nf_hook_slow	[nf_tables]
";

    #[test]
    fn test_prefers_x64_wrapper() {
        let symbols = KernelSymbols::parse(X86_KALLSYMS);
        let execve = symbols.syscall("execve").unwrap();
        assert_eq!(execve.name, "__x64_sys_execve");
        assert!(execve.wrapper);
    }

    #[test]
    fn test_falls_back_to_plain_name() {
        let symbols = KernelSymbols::parse("0000000000000000 T sys_execve\n");
        let execve = symbols.syscall("execve").unwrap();
        assert_eq!(execve, SyscallSymbol { name: "sys_execve".to_string(), wrapper: false });
    }

    #[test]
    fn test_missing_syscall() {
        let symbols = KernelSymbols::parse("0000000000000000 T do_execve\n");
        assert!(matches!(symbols.syscall("execve"), Err(MonitorError::SymbolNotFound(_))));
    }

    #[test]
    fn test_module_symbols_parsed() {
        let symbols = KernelSymbols::parse(X86_KALLSYMS);
        assert!(symbols.contains("nf_hook_slow"));
        assert!(symbols.require("fib_table_delete").is_ok());
        assert!(symbols.require("fib_table_lookup").is_err());
        assert_eq!(symbols.len(), 6);
    }

    #[test]
    fn test_explicit_symbol_classification() {
        assert!(SyscallSymbol::from_name("__arm64_sys_execve").wrapper);
        assert!(!SyscallSymbol::from_name("sys_execve").wrapper);
        assert!(!SyscallSymbol::from_name("do_execveat_common").wrapper);
    }
}
