//! Per-resource state records.
//!
//! CPUs carry a mode stack (interrupts nest on top of whatever was running);
//! IRQ lines, softIRQs and traps track nesting/pending counters; block
//! devices track in-flight requests.

use serde::{Deserialize, Serialize};

/// Mode of a CPU at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpuMode {
    /// Not yet determined
    Unknown,
    /// Running the idle task
    Idle,
    /// Running a real process
    Busy,
    /// Servicing a hardware interrupt
    Irq,
    /// Servicing a softIRQ
    SoftIrq,
    /// Servicing a trap/fault
    Trap,
}

/// State of one CPU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    /// Mode stack, never empty; index 0 is the scheduled base mode
    pub mode_stack: Vec<CpuMode>,
}

impl CpuState {
    /// Create a CPU state with an unknown base mode
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode_stack: vec![CpuMode::Unknown],
        }
    }

    /// Current mode, the top of the stack
    #[must_use]
    pub fn current(&self) -> CpuMode {
        *self.mode_stack.last().expect("mode stack is never empty")
    }

    /// Replace the base mode (what a context switch decides)
    pub fn set_base(&mut self, mode: CpuMode) {
        self.mode_stack[0] = mode;
    }

    /// Push a nested mode (interrupt/trap entry)
    pub fn push(&mut self, mode: CpuMode) {
        self.mode_stack.push(mode);
    }

    /// Pop a nested mode; the base entry is never popped
    pub fn pop(&mut self) {
        if self.mode_stack.len() > 1 {
            self.mode_stack.pop();
        }
    }
}

impl Default for CpuState {
    fn default() -> Self {
        Self::new()
    }
}

/// State of one IRQ line
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IrqState {
    /// Handler nesting depth; 0 means the line is idle
    pub nesting: u64,
}

impl IrqState {
    /// Whether a handler is currently running on this line
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.nesting > 0
    }
}

/// State of one softIRQ
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SoftIrqState {
    /// Raised but not yet run
    pub pending: u64,
    /// Currently running handlers
    pub running: u64,
}

/// State of one trap id
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrapState {
    /// Handler nesting depth
    pub nesting: u64,
}

/// Mode of a block device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BdevMode {
    /// No request in flight
    Idle,
    /// Read request(s) in flight
    BusyReading,
    /// Write request(s) in flight
    BusyWriting,
}

/// State of one block device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BdevState {
    /// Current mode
    pub mode: BdevMode,
    /// Requests issued but not completed
    pub in_flight: u64,
}

impl BdevState {
    /// Create an idle device state
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: BdevMode::Idle,
            in_flight: 0,
        }
    }
}

impl Default for BdevState {
    fn default() -> Self {
        Self::new()
    }
}
