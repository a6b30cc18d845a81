//! Control agent: configuration to running engine

use crate::context::ReasoningContext;
use crate::control::ControlEngine;
use crate::meta_tools::{MetaToolContext, MetaToolRegistry};
use raid_core::{RaidConfig, Result};
use raid_fabric::{Broker, CollabManager, Dispatcher};
use raid_lifecycle::{LifecycleSupervisor, SupervisorConfig};
use raid_llm::{create_backend, LlmBackend};
use raid_orchestrator::ContainerRuntime;
use raid_profiles::{DynamicWorkerManager, ProfileRegistry};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

const CONTROL_MAX_STEPS: u32 = 10;
/// How often inactive collaboration groups are swept.
const GROUP_CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);
/// Groups older than this (and fully inactive) are removed.
const GROUP_MAX_AGE_HOURS: i64 = 24;

/// The orchestrator-side agent: owns the managers and the control engine.
pub struct ControlAgent {
    backend: Arc<dyn LlmBackend>,
    engine: ControlEngine,
    ctx: MetaToolContext,
    supervisor: Arc<LifecycleSupervisor>,
    cleanup_cancel: CancellationToken,
}

impl ControlAgent {
    pub fn new(
        config: RaidConfig,
        broker: Arc<dyn Broker>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self> {
        let backend = create_backend(&config.llm)?;

        let profiles = Arc::new(
            ProfileRegistry::new(&config.profiles_dir)
                .with_known_tools(raid_tools::BUILTIN_TOOL_NAMES),
        );
        let supervisor = Arc::new(LifecycleSupervisor::new(
            runtime.clone(),
            SupervisorConfig {
                max_workers: config.max_workers,
                ..Default::default()
            },
        ));
        let dispatcher = Arc::new(Dispatcher::new(broker.clone()));
        let collab = Arc::new(CollabManager::new(broker));
        let dynamic = Arc::new(Mutex::new(DynamicWorkerManager::new(config.max_workers)));

        let ctx = MetaToolContext {
            config,
            profiles,
            dispatcher,
            runtime,
            supervisor: supervisor.clone(),
            collab,
            dynamic,
        };

        let registry = Arc::new(MetaToolRegistry::with_default_tools());
        let engine = ControlEngine::new(backend.clone(), registry, CONTROL_MAX_STEPS);

        // Sweep inactive collaboration groups in the background
        let cleanup_cancel = CancellationToken::new();
        {
            let collab = ctx.collab.clone();
            let cancel = cleanup_cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(GROUP_CLEANUP_INTERVAL) => {
                            let removed = collab.cleanup_inactive(GROUP_MAX_AGE_HOURS).await;
                            if !removed.is_empty() {
                                info!("cleaned up {} inactive group(s)", removed.len());
                            }
                        }
                    }
                }
            });
        }

        info!(
            "control agent ready: backend={} model={}",
            backend.name(),
            backend.model()
        );

        Ok(Self {
            backend,
            engine,
            ctx,
            supervisor,
            cleanup_cancel,
        })
    }

    pub fn supervisor(&self) -> &Arc<LifecycleSupervisor> {
        &self.supervisor
    }

    pub fn meta_context(&self) -> &MetaToolContext {
        &self.ctx
    }

    /// Health of the model backend.
    pub async fn backend_healthy(&self) -> bool {
        self.backend.health_check().await
    }

    /// Process a user goal end to end.
    pub async fn process_goal(&self, goal: &str, task_id: Option<String>) -> ReasoningContext {
        if !self.backend_healthy().await {
            let mut context = ReasoningContext::new(task_id, goal);
            context.complete_failure("model backend is not available");
            return context;
        }

        self.engine.process_goal(&self.ctx, goal, task_id).await
    }

    /// Reap workers and close collaboration groups.
    pub async fn shutdown(&self) {
        self.cleanup_cancel.cancel();
        self.ctx.collab.shutdown_all().await;
        self.supervisor.shutdown().await;
    }
}
