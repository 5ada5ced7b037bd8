//! kstate trace state manager
//!
//! One manager per trace. Owns the live state model (seeked arbitrarily by
//! caller-visible requests) and a separate checkpoint-side model that only
//! ever advances forward, feeding the checkpoint index. Restoring a
//! timestamp binary-searches the index for the nearest checkpoint at or
//! before it and clones that snapshot into the live model.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod config;
pub mod manager;

pub use checkpoint::{Checkpoint, CheckpointIndex, RestorePoint};
pub use config::CheckpointConfig;
pub use manager::{ManagerError, TraceStateManager};
