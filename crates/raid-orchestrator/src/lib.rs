//! Raid Orchestrator - container runtime adapter
//!
//! The Docker Engine is an external collaborator; everything above it speaks
//! the `ContainerRuntime` trait so the lifecycle supervisor and tests can run
//! against the in-memory fake.

pub mod docker;
pub mod fake;
pub mod runtime;

pub use docker::DockerRuntime;
pub use fake::FakeRuntime;
pub use runtime::{
    canonical_name, image_tag, ContainerRuntime, OrchestratorError, CONTAINER_NAME_PREFIX,
};
