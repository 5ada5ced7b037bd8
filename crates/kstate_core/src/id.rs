//! Resource identifiers.

use serde::{Deserialize, Serialize};

/// Identifier of one trace within an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraceId(u32);

impl TraceId {
    /// Create from a raw index
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw index value
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "trace{}", self.0)
    }
}

/// Kernel process id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pid(u32);

impl Pid {
    /// Pid 0 - the per-CPU idle/swapper placeholder
    pub const IDLE: Self = Self(0);

    /// Create from a raw pid
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw pid value
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Whether this is the idle placeholder pid
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pid{}", self.0)
    }
}

/// CPU id, dense in `[0, num_cpus)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CpuId(u32);

impl CpuId {
    /// Create from a raw CPU number
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw CPU number
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Index form for dense per-CPU tables
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for CpuId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cpu{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id() {
        let id = TraceId::new(3);
        assert_eq!(id.as_u32(), 3);
        assert_eq!(id.to_string(), "trace3");
    }

    #[test]
    fn test_pid_idle() {
        assert!(Pid::IDLE.is_idle());
        assert!(!Pid::new(42).is_idle());
    }

    #[test]
    fn test_pid_ord() {
        assert!(Pid::new(1) < Pid::new(2));
        assert_eq!(Pid::new(7), Pid::new(7));
    }

    #[test]
    fn test_cpu_id_index() {
        let cpu = CpuId::new(2);
        assert_eq!(cpu.index(), 2);
        assert_eq!(cpu.to_string(), "cpu2");
    }
}
