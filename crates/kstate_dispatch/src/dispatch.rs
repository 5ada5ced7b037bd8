//! The dispatch table and state-transition handlers.
//!
//! Exactly one handler runs per event, selected by marker kind. Handlers
//! mutate the model in place and return whether downstream propagation
//! should continue. Unknown markers are recorded and skipped, never fatal.

use crate::marker::MarkerKind;
use kstate_core::{CpuId, Pid, TraceTime};
use kstate_event::RawEvent;
use kstate_model::{
    BdevMode, CpuMode, ExecutionMode, ExecutionState, ProcessState, ProcessStatus, StateModel,
};
use std::collections::BTreeSet;

/// Routes raw events to state-transition handlers
#[derive(Debug, Default)]
pub struct EventDispatcher {
    /// Marker names seen without a registered handler
    not_handled: BTreeSet<String>,
}

impl EventDispatcher {
    /// Create a dispatcher with an empty diagnostic set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event to the model
    ///
    /// Returns whether downstream propagation should continue. Events with
    /// unregistered markers are recorded in the not-handled set and leave the
    /// model untouched.
    pub fn process(&mut self, event: &RawEvent, model: &mut StateModel) -> bool {
        match MarkerKind::from_name(&event.marker) {
            Some(kind) => handle(kind, event, model),
            None => {
                if self.not_handled.insert(event.marker.clone()) {
                    tracing::debug!(marker = %event.marker, "no handler registered for marker");
                }
                true
            }
        }
    }

    /// Marker names seen without a handler, for diagnostics
    #[must_use]
    pub fn not_handled(&self) -> &BTreeSet<String> {
        &self.not_handled
    }
}

fn handle(kind: MarkerKind, event: &RawEvent, model: &mut StateModel) -> bool {
    match kind {
        MarkerKind::SchedSchedule => sched_schedule(event, model),
        MarkerKind::ProcessFork => process_fork(event, model),
        MarkerKind::ProcessExit => process_exit(event, model),
        MarkerKind::ProcessFree => process_free(event, model),
        MarkerKind::SyscallEntry => syscall_entry(event, model),
        MarkerKind::SyscallExit => mode_exit(event, model, ExecutionMode::Syscall),
        MarkerKind::TrapEntry => trap_entry(event, model),
        MarkerKind::TrapExit => trap_exit(event, model),
        MarkerKind::IrqEntry => irq_entry(event, model),
        MarkerKind::IrqExit => irq_exit(event, model),
        MarkerKind::SoftIrqRaise => soft_irq_raise(event, model),
        MarkerKind::SoftIrqEntry => soft_irq_entry(event, model),
        MarkerKind::SoftIrqExit => soft_irq_exit(event, model),
        MarkerKind::BdevRequestIssue => bdev_request_issue(event, model),
        MarkerKind::BdevRequestComplete => bdev_request_complete(event, model),
    }
}

fn pid_field(event: &RawEvent, name: &str) -> Option<Pid> {
    event
        .field_u64(name)
        .and_then(|v| u32::try_from(v).ok())
        .map(Pid::new)
}

fn resource_id(event: &RawEvent, name: &str) -> Option<u32> {
    event.field_u64(name).and_then(|v| u32::try_from(v).ok())
}

/// Context switch: demote the previous process, promote the next one, and
/// rebase the CPU mode.
fn sched_schedule(event: &RawEvent, model: &mut StateModel) -> bool {
    let (Some(prev_pid), Some(next_pid)) = (
        pid_field(event, "prev_pid"),
        pid_field(event, "next_pid"),
    ) else {
        return true;
    };
    let prev_state = event.field_i64("prev_state").unwrap_or(0);
    let cpu = event.cpu;
    let t = event.timestamp;

    let prev_index = model.find_or_create_process(prev_pid, cpu, t);
    if !model.processes[prev_index].pid.is_idle() {
        let status = if prev_state == 0 {
            ProcessStatus::WaitCpu
        } else {
            ProcessStatus::WaitBlocked
        };
        model.processes[prev_index].set_status(status);
    }

    let next_index = model.find_or_create_process(next_pid, cpu, t);
    model.processes[next_index].set_status(ProcessStatus::Run);
    model.set_running(cpu, next_index);

    let base = if next_pid.is_idle() {
        CpuMode::Idle
    } else {
        CpuMode::Busy
    };
    if let Some(cpu_state) = model.cpu_states.get_mut(&cpu) {
        cpu_state.set_base(base);
    }
    true
}

/// Fork: grow the process table with the child, in WaitFork until first
/// scheduled. Re-forking a live pid is a no-op.
fn process_fork(event: &RawEvent, model: &mut StateModel) -> bool {
    let Some(child_pid) = pid_field(event, "child_pid") else {
        return true;
    };
    let parent_pid = pid_field(event, "parent_pid").unwrap_or(Pid::IDLE);
    let cpu = event.cpu;

    if model.process_index(child_pid, cpu).is_some() {
        return true;
    }

    let mut child = ProcessState::new(
        child_pid,
        parent_pid,
        cpu,
        model.trace_id,
        event.timestamp,
        ProcessStatus::WaitFork,
    );
    if let Some(tgid) = pid_field(event, "child_tgid") {
        child.tgid = tgid;
    }
    if let Some(comm) = event.field_text("child_comm") {
        child.name = comm.to_string();
    }
    model.add_process(child);
    true
}

fn process_exit(event: &RawEvent, model: &mut StateModel) -> bool {
    let Some(pid) = pid_field(event, "pid") else {
        return true;
    };
    if let Some(index) = model.process_index(pid, event.cpu) {
        model.processes[index].set_status(ProcessStatus::Exit);
    }
    true
}

/// Free: the conceptual removal. The record stays in the table, marked
/// exited, so later pid reuse creates a fresh record.
fn process_free(event: &RawEvent, model: &mut StateModel) -> bool {
    let Some(pid) = pid_field(event, "pid") else {
        return true;
    };
    if let Some(index) = model.process_index(pid, event.cpu) {
        model.processes[index].set_status(ProcessStatus::Zombie);
        model.processes[index].exited = true;
    }
    true
}

fn syscall_entry(event: &RawEvent, model: &mut StateModel) -> bool {
    let Some(id) = event.field_u64("syscall_id") else {
        return true;
    };
    let submode = model.tables.syscall_name(id);
    let t = event.timestamp;
    if let Some(process) = model.running_on_mut(event.cpu) {
        process.push_mode(ExecutionState::new(
            ExecutionMode::Syscall,
            submode,
            t,
            ProcessStatus::Run,
        ));
    }
    true
}

/// Pop the running process's execution stack if the current mode matches.
/// The guard keeps unmatched exits (trace starts mid-handler) from popping
/// unrelated entries.
fn mode_exit(event: &RawEvent, model: &mut StateModel, mode: ExecutionMode) -> bool {
    if let Some(process) = model.running_on_mut(event.cpu) {
        if process.current().mode == mode {
            process.pop_mode();
        }
    }
    true
}

fn pop_cpu_mode(model: &mut StateModel, cpu: CpuId, mode: CpuMode) {
    if let Some(cpu_state) = model.cpu_states.get_mut(&cpu) {
        if cpu_state.current() == mode {
            cpu_state.pop();
        }
    }
}

fn push_process_mode(
    model: &mut StateModel,
    cpu: CpuId,
    mode: ExecutionMode,
    submode: String,
    t: TraceTime,
) {
    if let Some(process) = model.running_on_mut(cpu) {
        process.push_mode(ExecutionState::new(mode, submode, t, ProcessStatus::Run));
    }
}

fn trap_entry(event: &RawEvent, model: &mut StateModel) -> bool {
    let Some(id) = resource_id(event, "trap_id") else {
        return true;
    };
    model.trap_states.entry(id).or_default().nesting += 1;
    if let Some(cpu_state) = model.cpu_states.get_mut(&event.cpu) {
        cpu_state.push(CpuMode::Trap);
    }
    let submode = model.tables.trap_name(u64::from(id));
    push_process_mode(
        model,
        event.cpu,
        ExecutionMode::Trap,
        submode,
        event.timestamp,
    );
    true
}

fn trap_exit(event: &RawEvent, model: &mut StateModel) -> bool {
    if let Some(id) = resource_id(event, "trap_id") {
        if let Some(trap) = model.trap_states.get_mut(&id) {
            trap.nesting = trap.nesting.saturating_sub(1);
        }
    }
    pop_cpu_mode(model, event.cpu, CpuMode::Trap);
    mode_exit(event, model, ExecutionMode::Trap)
}

fn irq_entry(event: &RawEvent, model: &mut StateModel) -> bool {
    let Some(id) = resource_id(event, "irq_id") else {
        return true;
    };
    model.irq_states.entry(id).or_default().nesting += 1;
    if let Some(cpu_state) = model.cpu_states.get_mut(&event.cpu) {
        cpu_state.push(CpuMode::Irq);
    }
    let submode = model.tables.irq_name(u64::from(id));
    push_process_mode(
        model,
        event.cpu,
        ExecutionMode::Irq,
        submode,
        event.timestamp,
    );
    true
}

fn irq_exit(event: &RawEvent, model: &mut StateModel) -> bool {
    if let Some(id) = resource_id(event, "irq_id") {
        if let Some(irq) = model.irq_states.get_mut(&id) {
            irq.nesting = irq.nesting.saturating_sub(1);
        }
    }
    pop_cpu_mode(model, event.cpu, CpuMode::Irq);
    mode_exit(event, model, ExecutionMode::Irq)
}

fn soft_irq_raise(event: &RawEvent, model: &mut StateModel) -> bool {
    if let Some(id) = resource_id(event, "softirq_id") {
        model.soft_irq_states.entry(id).or_default().pending += 1;
    }
    true
}

fn soft_irq_entry(event: &RawEvent, model: &mut StateModel) -> bool {
    let Some(id) = resource_id(event, "softirq_id") else {
        return true;
    };
    let softirq = model.soft_irq_states.entry(id).or_default();
    softirq.pending = softirq.pending.saturating_sub(1);
    softirq.running += 1;
    if let Some(cpu_state) = model.cpu_states.get_mut(&event.cpu) {
        cpu_state.push(CpuMode::SoftIrq);
    }
    let submode = model.tables.soft_irq_name(u64::from(id));
    push_process_mode(
        model,
        event.cpu,
        ExecutionMode::SoftIrq,
        submode,
        event.timestamp,
    );
    true
}

fn soft_irq_exit(event: &RawEvent, model: &mut StateModel) -> bool {
    if let Some(id) = resource_id(event, "softirq_id") {
        if let Some(softirq) = model.soft_irq_states.get_mut(&id) {
            softirq.running = softirq.running.saturating_sub(1);
        }
    }
    pop_cpu_mode(model, event.cpu, CpuMode::SoftIrq);
    mode_exit(event, model, ExecutionMode::SoftIrq)
}

fn bdev_request_issue(event: &RawEvent, model: &mut StateModel) -> bool {
    let Some(dev) = event.field_u64("dev") else {
        return true;
    };
    let writing = event.field_u64("rw").unwrap_or(0) != 0;
    let bdev = model.bdev_state_mut(dev);
    bdev.in_flight += 1;
    bdev.mode = if writing {
        BdevMode::BusyWriting
    } else {
        BdevMode::BusyReading
    };
    true
}

fn bdev_request_complete(event: &RawEvent, model: &mut StateModel) -> bool {
    let Some(dev) = event.field_u64("dev") else {
        return true;
    };
    let bdev = model.bdev_state_mut(dev);
    bdev.in_flight = bdev.in_flight.saturating_sub(1);
    if bdev.in_flight == 0 {
        bdev.mode = BdevMode::Idle;
    }
    true
}
