//! Static name tables.
//!
//! Syscall/trap/IRQ/softIRQ names are established once at model construction.
//! Their sizes drive the sizing of the corresponding resource state tables,
//! and handlers use them to label execution-state submodes.

use serde::{Deserialize, Serialize};

const SOFT_IRQ_NAMES: &[&str] = &[
    "HI", "TIMER", "NET_TX", "NET_RX", "BLOCK", "IRQ_POLL", "TASKLET", "SCHED", "HRTIMER", "RCU",
];

const TRAP_NAMES: &[&str] = &[
    "divide_error",
    "debug",
    "nmi",
    "int3",
    "overflow",
    "bounds",
    "invalid_op",
    "device_not_available",
    "double_fault",
    "coprocessor_segment_overrun",
    "invalid_tss",
    "segment_not_present",
    "stack_segment",
    "general_protection",
    "page_fault",
    "spurious_interrupt",
    "coprocessor_error",
    "alignment_check",
];

const SYSCALL_NAMES: &[&str] = &[
    "read",
    "write",
    "open",
    "close",
    "stat",
    "fstat",
    "lstat",
    "poll",
    "lseek",
    "mmap",
    "mprotect",
    "munmap",
    "brk",
    "rt_sigaction",
    "rt_sigprocmask",
    "ioctl",
    "pread64",
    "pwrite64",
    "readv",
    "writev",
    "access",
    "pipe",
    "select",
    "sched_yield",
    "mremap",
    "msync",
    "nanosleep",
    "getpid",
    "socket",
    "connect",
    "accept",
    "sendto",
    "recvfrom",
    "clone",
    "fork",
    "vfork",
    "execve",
    "exit",
    "wait4",
    "kill",
    "futex",
];

/// Static name tables for syscalls, traps, IRQs, and softIRQs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameTables {
    /// Syscall names indexed by syscall id
    pub syscalls: Vec<String>,
    /// Trap names indexed by trap id
    pub traps: Vec<String>,
    /// IRQ line names indexed by IRQ number
    pub irqs: Vec<String>,
    /// SoftIRQ names indexed by softIRQ number
    pub soft_irqs: Vec<String>,
}

impl NameTables {
    /// Create tables from explicit name lists (normally trace metadata)
    #[must_use]
    pub fn new(
        syscalls: Vec<String>,
        traps: Vec<String>,
        irqs: Vec<String>,
        soft_irqs: Vec<String>,
    ) -> Self {
        Self {
            syscalls,
            traps,
            irqs,
            soft_irqs,
        }
    }

    /// Built-in tables matching a stock Linux kernel, 16 IRQ lines
    #[must_use]
    pub fn linux_default() -> Self {
        Self {
            syscalls: SYSCALL_NAMES.iter().map(|s| (*s).to_string()).collect(),
            traps: TRAP_NAMES.iter().map(|s| (*s).to_string()).collect(),
            irqs: (0..16).map(|n| format!("irq{}", n)).collect(),
            soft_irqs: SOFT_IRQ_NAMES.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Syscall name for `id`, or a stable placeholder for unknown ids
    #[must_use]
    pub fn syscall_name(&self, id: u64) -> String {
        Self::lookup(&self.syscalls, id, "syscall")
    }

    /// Trap name for `id`
    #[must_use]
    pub fn trap_name(&self, id: u64) -> String {
        Self::lookup(&self.traps, id, "trap")
    }

    /// IRQ line name for `id`
    #[must_use]
    pub fn irq_name(&self, id: u64) -> String {
        Self::lookup(&self.irqs, id, "irq")
    }

    /// SoftIRQ name for `id`
    #[must_use]
    pub fn soft_irq_name(&self, id: u64) -> String {
        Self::lookup(&self.soft_irqs, id, "softirq")
    }

    fn lookup(table: &[String], id: u64, kind: &str) -> String {
        usize::try_from(id)
            .ok()
            .and_then(|i| table.get(i))
            .cloned()
            .unwrap_or_else(|| format!("{}#{}", kind, id))
    }
}

impl Default for NameTables {
    fn default() -> Self {
        Self::linux_default()
    }
}
