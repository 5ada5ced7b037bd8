//! kstate state model
//!
//! The mutable aggregate representing reconstructed system state at one
//! instant: the process table with per-process execution-state stacks, the
//! running-process map, and the per-CPU/IRQ/softIRQ/trap/block-device tables.
//!
//! The model is built exclusively from owned containers and index-based back
//! references, so `Clone` is a structurally independent deep copy. Checkpoint
//! isolation depends on that property.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod model;
pub mod names;
pub mod process;
pub mod resource;

pub use model::{InitContext, StateModel};
pub use names::NameTables;
pub use process::{ExecutionMode, ExecutionState, ProcessState, ProcessStatus};
pub use resource::{BdevMode, BdevState, CpuMode, CpuState, IrqState, SoftIrqState, TrapState};
