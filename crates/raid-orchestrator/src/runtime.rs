//! Container runtime capability

use raid_profiles::Profile;
use std::collections::HashMap;

/// Prefix for every worker container name. The canonical name is the
/// ownership key: no two workers ever share one.
pub const CONTAINER_NAME_PREFIX: &str = "raid-subagent";

/// Canonical container name for a profile.
pub fn canonical_name(profile_name: &str) -> String {
    format!("{CONTAINER_NAME_PREFIX}-{profile_name}")
}

/// Image tag for a profile: `raid-subagent-<name>:<version>`.
pub fn image_tag(profile: &Profile) -> String {
    format!("{CONTAINER_NAME_PREFIX}-{}:{}", profile.name, profile.version)
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("container runtime unreachable: {0}")]
    Unreachable(String),

    #[error("image build failed: {message}")]
    BuildFailed {
        message: String,
        /// Captured build output, for diagnosis.
        build_log: String,
    },

    #[error("container start failed: {0}")]
    StartFailed(String),

    #[error("container runtime api error: {0}")]
    Api(String),
}

/// The container runtime capability.
///
/// Stop, remove, and logs against a missing container succeed (idempotent);
/// enumeration and prune failures are logged by implementations, never fatal.
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Reachability probe; used for the start-up check.
    async fn ping(&self) -> Result<(), OrchestratorError>;

    /// Build the profile's image if absent, reusing a labeled image with the
    /// same tag. Concurrent calls for one tag share a single build.
    async fn ensure_image(&self, profile: &Profile) -> Result<String, OrchestratorError>;

    /// Idempotently bring up the profile's container and return its handle.
    ///
    /// A running container with the canonical name is reused; an exited one
    /// is removed and recreated. Calls are serialised per canonical name.
    async fn ensure_running(
        &self,
        profile: &Profile,
        env: &HashMap<String, String>,
    ) -> Result<String, OrchestratorError>;

    async fn stop(&self, handle: &str) -> Result<(), OrchestratorError>;

    async fn remove(&self, handle: &str) -> Result<(), OrchestratorError>;

    async fn is_running(&self, handle: &str) -> Result<bool, OrchestratorError>;

    /// Last `tail` lines of container output; empty for a missing container.
    async fn logs(&self, handle: &str, tail: usize) -> Result<String, OrchestratorError>;

    /// Remove dangling images, then labeled worker images beyond the newest
    /// `keep_n` that no container references. Returns how many were removed.
    async fn prune_unused_images(&self, keep_n: usize) -> Result<usize, OrchestratorError>;
}
