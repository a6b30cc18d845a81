//! Raid Lifecycle - worker state tracking, capacity enforcement, reaping

pub mod state;
pub mod supervisor;

pub use state::{WorkerRecord, WorkerState};
pub use supervisor::{LifecycleSupervisor, SupervisorConfig, SupervisorStats};
