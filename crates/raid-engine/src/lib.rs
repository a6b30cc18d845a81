//! Raid Engine - the Thought-Action-Observation reasoning loop
//!
//! Two flavours share one step machine: the control engine drives meta-tools
//! to orchestrate workers; the worker engine runs inside each container and
//! terminates through `final_answer`.

pub mod agent;
pub mod context;
pub mod control;
pub mod fallback;
pub mod meta_tools;
pub mod mock;
pub mod parser;
pub mod worker;

pub use agent::ControlAgent;
pub use context::{ActionCall, ContextStatus, ReasoningContext, ReasoningStep};
pub use control::{ControlEngine, OBSERVATION_CAP};
pub use meta_tools::{MetaTool, MetaToolContext, MetaToolRegistry};
pub use mock::ScriptedBackend;
pub use parser::{parse_response, ParsedResponse};
pub use worker::{WorkerAgent, WorkerEngine};
