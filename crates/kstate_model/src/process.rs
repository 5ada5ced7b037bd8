//! Per-process state.
//!
//! Each process carries a stack of execution states; nested syscall/trap/IRQ
//! entries push, the matching exits pop. The stack is never empty: the base
//! entry survives every pop so the process always has a current state.

use kstate_core::{CpuId, Pid, TraceId, TraceTime};
use serde::{Deserialize, Serialize};

/// Execution mode of one stack entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Running user code
    UserMode,
    /// Inside a system call
    Syscall,
    /// Inside a trap/fault handler
    Trap,
    /// Inside a hardware interrupt handler
    Irq,
    /// Inside a softIRQ handler
    SoftIrq,
    /// Mode not yet known (process observed mid-trace)
    Unknown,
}

/// Scheduling status of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessStatus {
    /// Forked, never scheduled yet
    WaitFork,
    /// Runnable, waiting for a CPU
    WaitCpu,
    /// Currently scheduled
    Run,
    /// Blocked on I/O or a wait queue
    WaitBlocked,
    /// Called exit, not yet reaped
    Exit,
    /// Exited and reaped
    Zombie,
}

/// One entry of a process execution-state stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Execution mode
    pub mode: ExecutionMode,
    /// Mode detail, e.g. syscall or IRQ name
    pub submode: String,
    /// When this entry was pushed
    pub entry_time: TraceTime,
    /// Scheduling status while in this entry
    pub status: ProcessStatus,
}

impl ExecutionState {
    /// Create a new stack entry
    #[must_use]
    pub fn new(
        mode: ExecutionMode,
        submode: impl Into<String>,
        entry_time: TraceTime,
        status: ProcessStatus,
    ) -> Self {
        Self {
            mode,
            submode: submode.into(),
            entry_time,
            status,
        }
    }
}

/// Reconstructed state of one process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessState {
    /// Process id
    pub pid: Pid,
    /// Thread group id
    pub tgid: Pid,
    /// Parent process id
    pub ppid: Pid,
    /// Command name, if known
    pub name: String,
    /// When the process was created (trace start for pre-existing processes)
    pub creation_time: TraceTime,
    /// Execution-state stack, never empty
    pub exec_stack: Vec<ExecutionState>,
    /// CPU the process last ran on
    pub cpu: CpuId,
    /// Trace this process belongs to
    pub trace_id: TraceId,
    /// Whether the process has been freed; entries are never removed mid-trace
    pub exited: bool,
}

impl ProcessState {
    /// Create a process observed or forked at `creation_time`
    #[must_use]
    pub fn new(
        pid: Pid,
        ppid: Pid,
        cpu: CpuId,
        trace_id: TraceId,
        creation_time: TraceTime,
        status: ProcessStatus,
    ) -> Self {
        Self {
            pid,
            tgid: pid,
            ppid,
            name: String::new(),
            creation_time,
            exec_stack: vec![ExecutionState::new(
                ExecutionMode::Unknown,
                "",
                creation_time,
                status,
            )],
            cpu,
            trace_id,
            exited: false,
        }
    }

    /// The per-CPU idle placeholder created at state init
    #[must_use]
    pub fn idle_placeholder(cpu: CpuId, trace_id: TraceId, start_time: TraceTime) -> Self {
        let mut process = Self::new(
            Pid::IDLE,
            Pid::IDLE,
            cpu,
            trace_id,
            start_time,
            ProcessStatus::Run,
        );
        process.name = "swapper".to_string();
        process
    }

    /// Current (top of stack) execution state
    #[must_use]
    pub fn current(&self) -> &ExecutionState {
        self.exec_stack
            .last()
            .expect("execution stack is never empty")
    }

    /// Mutable current execution state
    pub fn current_mut(&mut self) -> &mut ExecutionState {
        self.exec_stack
            .last_mut()
            .expect("execution stack is never empty")
    }

    /// Push a nested execution state
    pub fn push_mode(&mut self, state: ExecutionState) {
        self.exec_stack.push(state);
    }

    /// Pop the current execution state; the base entry is never popped
    pub fn pop_mode(&mut self) {
        if self.exec_stack.len() > 1 {
            self.exec_stack.pop();
        }
    }

    /// Set the scheduling status of the current execution state
    pub fn set_status(&mut self, status: ProcessStatus) {
        self.current_mut().status = status;
    }

    /// Scheduling status of the current execution state
    #[must_use]
    pub fn status(&self) -> ProcessStatus {
        self.current().status
    }

    /// Nesting depth of the execution-state stack
    #[must_use]
    pub fn depth(&self) -> usize {
        self.exec_stack.len()
    }
}
