//! The state model aggregate.

use crate::names::NameTables;
use crate::process::{ProcessState, ProcessStatus};
use crate::resource::{BdevState, CpuState, IrqState, SoftIrqState, TrapState};
use kstate_core::{CoreError, CoreResult, CpuId, Pid, TraceId, TraceTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Input context for state initialization, derived from the trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitContext {
    /// Trace this model reconstructs
    pub trace_id: TraceId,
    /// Declared CPU count
    pub num_cpus: usize,
    /// Timestamp of the first event
    pub start_time: TraceTime,
}

impl InitContext {
    /// Create an init context
    #[must_use]
    pub fn new(trace_id: TraceId, num_cpus: usize, start_time: TraceTime) -> Self {
        Self {
            trace_id,
            num_cpus,
            start_time,
        }
    }
}

/// Reconstructed system state at one instant
///
/// All containers are owned and back references are indices, so `Clone`
/// yields a fully independent deep copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateModel {
    /// Trace this model belongs to
    pub trace_id: TraceId,
    /// CPU count the tables were sized for
    pub num_cpus: usize,
    /// All processes ever observed; grows on fork, never shrinks mid-trace
    pub processes: Vec<ProcessState>,
    /// CPU id to index into `processes` of the scheduled process
    pub running_process: BTreeMap<CpuId, usize>,
    /// Per-CPU state
    pub cpu_states: BTreeMap<CpuId, CpuState>,
    /// Per-IRQ-line state, sized from the IRQ name table
    pub irq_states: BTreeMap<u32, IrqState>,
    /// Per-softIRQ state, sized from the softIRQ name table
    pub soft_irq_states: BTreeMap<u32, SoftIrqState>,
    /// Per-trap state, sized from the trap name table
    pub trap_states: BTreeMap<u32, TrapState>,
    /// Per-block-device state, keyed by device number, grown on demand
    pub bdev_states: BTreeMap<u64, BdevState>,
    /// Name tables established at construction
    pub tables: NameTables,
}

impl StateModel {
    /// Build the canonical zero state for a trace
    ///
    /// One idle placeholder process is created per CPU and installed as that
    /// CPU's running process. Resource tables are sized from the name tables.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::StateInit` if the input context is absent.
    pub fn init(ctx: Option<&InitContext>, tables: NameTables) -> CoreResult<Self> {
        let ctx = ctx.ok_or_else(|| CoreError::StateInit {
            reason: "input context is absent".to_string(),
        })?;

        let mut processes = Vec::with_capacity(ctx.num_cpus);
        let mut running_process = BTreeMap::new();
        let mut cpu_states = BTreeMap::new();

        for n in 0..ctx.num_cpus {
            let cpu = CpuId::new(n as u32);
            processes.push(ProcessState::idle_placeholder(
                cpu,
                ctx.trace_id,
                ctx.start_time,
            ));
            running_process.insert(cpu, n);
            cpu_states.insert(cpu, CpuState::new());
        }

        let irq_states = (0..tables.irqs.len() as u32)
            .map(|n| (n, IrqState::default()))
            .collect();
        let soft_irq_states = (0..tables.soft_irqs.len() as u32)
            .map(|n| (n, SoftIrqState::default()))
            .collect();
        let trap_states = (0..tables.traps.len() as u32)
            .map(|n| (n, TrapState::default()))
            .collect();

        Ok(Self {
            trace_id: ctx.trace_id,
            num_cpus: ctx.num_cpus,
            processes,
            running_process,
            cpu_states,
            irq_states,
            soft_irq_states,
            trap_states,
            bdev_states: BTreeMap::new(),
            tables,
        })
    }

    /// Index of the process identified by `pid` as seen from `cpu`
    ///
    /// Pid 0 resolves to that CPU's idle placeholder. Otherwise the most
    /// recently created live process with the pid wins.
    #[must_use]
    pub fn process_index(&self, pid: Pid, cpu: CpuId) -> Option<usize> {
        if pid.is_idle() {
            return self
                .processes
                .iter()
                .position(|p| p.pid.is_idle() && p.cpu == cpu);
        }
        self.processes
            .iter()
            .rposition(|p| p.pid == pid && !p.exited)
    }

    /// Index of `pid`, creating an unnamed process if it was never observed
    ///
    /// Processes first seen mid-trace get `observed_at` as their creation
    /// time and an unknown execution mode.
    pub fn find_or_create_process(
        &mut self,
        pid: Pid,
        cpu: CpuId,
        observed_at: TraceTime,
    ) -> usize {
        if let Some(index) = self.process_index(pid, cpu) {
            return index;
        }
        self.processes.push(ProcessState::new(
            pid,
            Pid::IDLE,
            cpu,
            self.trace_id,
            observed_at,
            ProcessStatus::WaitCpu,
        ));
        self.processes.len() - 1
    }

    /// Append a process and return its index
    pub fn add_process(&mut self, process: ProcessState) -> usize {
        self.processes.push(process);
        self.processes.len() - 1
    }

    /// Install `index` as the running process of `cpu`
    pub fn set_running(&mut self, cpu: CpuId, index: usize) {
        debug_assert!(index < self.processes.len());
        self.running_process.insert(cpu, index);
        self.processes[index].cpu = cpu;
    }

    /// The process currently scheduled on `cpu`
    #[must_use]
    pub fn running_on(&self, cpu: CpuId) -> Option<&ProcessState> {
        self.running_process
            .get(&cpu)
            .and_then(|&i| self.processes.get(i))
    }

    /// Mutable access to the process currently scheduled on `cpu`
    pub fn running_on_mut(&mut self, cpu: CpuId) -> Option<&mut ProcessState> {
        let index = *self.running_process.get(&cpu)?;
        self.processes.get_mut(index)
    }

    /// State of one CPU
    #[must_use]
    pub fn cpu_state(&self, cpu: CpuId) -> Option<&CpuState> {
        self.cpu_states.get(&cpu)
    }

    /// Block-device state for `dev`, created idle on first touch
    pub fn bdev_state_mut(&mut self, dev: u64) -> &mut BdevState {
        self.bdev_states.entry(dev).or_default()
    }

    /// Number of processes ever observed
    #[must_use]
    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    /// Verify the per-CPU invariant: every CPU has a running process and a
    /// CPU state entry
    #[must_use]
    pub fn cpu_invariant_holds(&self) -> bool {
        (0..self.num_cpus).all(|n| {
            let cpu = CpuId::new(n as u32);
            self.running_process
                .get(&cpu)
                .is_some_and(|&i| i < self.processes.len())
                && self.cpu_states.contains_key(&cpu)
        })
    }
}
