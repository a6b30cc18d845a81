//! Raid Profiles - worker profile registry, container spec synthesis, and
//! role-based dynamic instantiation

pub mod container_spec;
pub mod profile;
pub mod registry;
pub mod roles;

pub use container_spec::{build_container_spec, ContainerSpec, RAID_IMAGE_LABEL};
pub use profile::{ContainerOptions, LifecyclePolicy, Profile};
pub use registry::ProfileRegistry;
pub use roles::{suggest_role, DynamicWorkerManager, RoleTemplate, RoleTemplates};
