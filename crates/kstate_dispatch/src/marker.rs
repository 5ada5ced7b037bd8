//! Marker kinds.
//!
//! The compile-time-checked mapping from marker names to handlers. Unknown
//! names map to `None` and are handled as diagnosed no-ops by the dispatcher.

/// Kind of a handled kernel trace event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// Context switch
    SchedSchedule,
    /// Process creation
    ProcessFork,
    /// Process called exit
    ProcessExit,
    /// Process descriptor freed
    ProcessFree,
    /// System call entry
    SyscallEntry,
    /// System call exit
    SyscallExit,
    /// Trap/fault entry
    TrapEntry,
    /// Trap/fault exit
    TrapExit,
    /// Hardware interrupt entry
    IrqEntry,
    /// Hardware interrupt exit
    IrqExit,
    /// SoftIRQ raised
    SoftIrqRaise,
    /// SoftIRQ handler entry
    SoftIrqEntry,
    /// SoftIRQ handler exit
    SoftIrqExit,
    /// Block device request issued
    BdevRequestIssue,
    /// Block device request completed
    BdevRequestComplete,
}

impl MarkerKind {
    /// Resolve a marker name, `None` for unrecognized markers
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sched_schedule" => Some(Self::SchedSchedule),
            "process_fork" => Some(Self::ProcessFork),
            "process_exit" => Some(Self::ProcessExit),
            "process_free" => Some(Self::ProcessFree),
            "syscall_entry" => Some(Self::SyscallEntry),
            "syscall_exit" => Some(Self::SyscallExit),
            "trap_entry" => Some(Self::TrapEntry),
            "trap_exit" => Some(Self::TrapExit),
            "irq_entry" => Some(Self::IrqEntry),
            "irq_exit" => Some(Self::IrqExit),
            "soft_irq_raise" => Some(Self::SoftIrqRaise),
            "soft_irq_entry" => Some(Self::SoftIrqEntry),
            "soft_irq_exit" => Some(Self::SoftIrqExit),
            "bdev_request_issue" => Some(Self::BdevRequestIssue),
            "bdev_request_complete" => Some(Self::BdevRequestComplete),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_known() {
        assert_eq!(
            MarkerKind::from_name("sched_schedule"),
            Some(MarkerKind::SchedSchedule)
        );
        assert_eq!(
            MarkerKind::from_name("irq_entry"),
            Some(MarkerKind::IrqEntry)
        );
        assert_eq!(
            MarkerKind::from_name("bdev_request_complete"),
            Some(MarkerKind::BdevRequestComplete)
        );
    }

    #[test]
    fn test_from_name_unknown() {
        assert_eq!(MarkerKind::from_name("vm_map"), None);
        assert_eq!(MarkerKind::from_name(""), None);
    }
}
