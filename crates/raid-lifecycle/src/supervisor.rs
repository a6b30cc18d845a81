//! Lifecycle supervisor: capacity, reap passes, liveness monitoring
//!
//! The supervisor owns the worker map exclusively; every mutation goes
//! through its methods under one mutex. The monitor loop never propagates
//! errors, it logs and continues.

use crate::state::{WorkerRecord, WorkerState};
use chrono::Duration as ChronoDuration;
use raid_core::{Error, Result};
use raid_orchestrator::ContainerRuntime;
use raid_profiles::LifecyclePolicy;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Images kept when pruning at shutdown.
const SHUTDOWN_PRUNE_KEEP: usize = 10;

type Callback = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Capacity limit for workers not excluded from the count.
    pub max_workers: usize,
    pub idle_timeout: Duration,
    pub heartbeat_timeout: Duration,
    pub reap_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            idle_timeout: Duration::from_secs(600),
            heartbeat_timeout: Duration::from_secs(300),
            reap_interval: Duration::from_secs(60),
        }
    }
}

/// Counters for each reap cause.
#[derive(Clone, Debug, Default)]
pub struct ReapStats {
    pub idle: u64,
    pub stale: u64,
    pub capacity: u64,
    pub shutdown: u64,
}

/// Point-in-time view of the supervisor.
#[derive(Clone, Debug)]
pub struct SupervisorStats {
    pub total_workers: usize,
    pub counted_workers: usize,
    pub persistent_workers: usize,
    pub max_workers: usize,
    pub states: HashMap<&'static str, usize>,
    pub total_tasks_completed: u64,
    pub reaps: ReapStats,
    pub workers: Vec<WorkerRecord>,
}

#[derive(Default)]
struct Callbacks {
    on_registered: Option<Callback>,
    on_reaped: Option<Callback>,
    on_capacity_pressure: Option<Callback>,
}

pub struct LifecycleSupervisor {
    runtime: Arc<dyn ContainerRuntime>,
    config: SupervisorConfig,
    workers: Mutex<HashMap<String, WorkerRecord>>,
    reap_stats: Mutex<ReapStats>,
    tasks_completed: Mutex<u64>,
    callbacks: std::sync::Mutex<Callbacks>,
    monitor_cancel: CancellationToken,
}

impl LifecycleSupervisor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: SupervisorConfig) -> Self {
        info!(
            "lifecycle supervisor: max_workers={} idle_timeout={}s reap_interval={}s",
            config.max_workers,
            config.idle_timeout.as_secs(),
            config.reap_interval.as_secs()
        );
        Self {
            runtime,
            config,
            workers: Mutex::new(HashMap::new()),
            reap_stats: Mutex::new(ReapStats::default()),
            tasks_completed: Mutex::new(0),
            callbacks: std::sync::Mutex::new(Callbacks::default()),
            monitor_cancel: CancellationToken::new(),
        }
    }

    pub fn on_registered(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.callbacks.lock().expect("callbacks").on_registered = Some(Box::new(f));
    }

    pub fn on_reaped(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.callbacks.lock().expect("callbacks").on_reaped = Some(Box::new(f));
    }

    pub fn on_capacity_pressure(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.callbacks.lock().expect("callbacks").on_capacity_pressure = Some(Box::new(f));
    }

    fn fire(&self, which: fn(&Callbacks) -> &Option<Callback>, arg: &str) {
        let callbacks = self.callbacks.lock().expect("callbacks");
        if let Some(f) = which(&callbacks) {
            f(arg);
        }
    }

    /// Register a new worker.
    ///
    /// A non-excluded registration at capacity triggers one capacity reap
    /// pass; if no slot frees up the registration is rejected.
    pub async fn register(
        &self,
        name: &str,
        container_handle: &str,
        profile_name: &str,
        policy: LifecyclePolicy,
    ) -> Result<()> {
        {
            let workers = self.workers.lock().await;
            if workers.contains_key(name) {
                return Err(Error::Internal(format!(
                    "worker '{name}' already registered"
                )));
            }
        }

        if !policy.exclude_from_count {
            let counted = self.counted().await;
            if counted >= self.config.max_workers {
                self.reap_for_capacity(counted - self.config.max_workers + 1)
                    .await;

                let counted = self.counted().await;
                if counted >= self.config.max_workers {
                    warn!(
                        "rejecting worker '{}': capacity {}/{} reached",
                        name, counted, self.config.max_workers
                    );
                    self.fire(|c| &c.on_capacity_pressure, name);
                    return Err(Error::CapacityExceeded {
                        current: counted,
                        limit: self.config.max_workers,
                    });
                }
            }
        }

        let record = WorkerRecord::new(
            name,
            container_handle,
            profile_name,
            policy.persistent,
            policy.exclude_from_count,
        );
        self.workers.lock().await.insert(name.to_string(), record);

        info!(
            "registered worker '{}' (container {}){}{}",
            name,
            container_handle,
            if policy.persistent { " [persistent]" } else { "" },
            if policy.exclude_from_count {
                " [excluded from count]"
            } else {
                ""
            }
        );
        self.fire(|c| &c.on_registered, name);
        Ok(())
    }

    /// Stop and remove a worker's container and delete its record.
    ///
    /// Unknown names are a no-op, so a second unregister is harmless.
    pub async fn unregister(&self, name: &str, reason: &str) -> bool {
        let record = {
            let mut workers = self.workers.lock().await;
            let Some(record) = workers.get_mut(name) else {
                debug!("unregister of unknown worker '{}' ignored", name);
                return false;
            };
            record.state = WorkerState::Stopping;
            record.clone()
        };

        // Stop/remove failures must not abort reaping; the record is
        // removed either way.
        if let Err(e) = self.runtime.stop(&record.container_handle).await {
            error!("failed to stop container for '{}': {}", name, e);
            if let Some(r) = self.workers.lock().await.get_mut(name) {
                r.mark_error();
            }
        } else if let Err(e) = self.runtime.remove(&record.container_handle).await {
            error!("failed to remove container for '{}': {}", name, e);
            if let Some(r) = self.workers.lock().await.get_mut(name) {
                r.mark_error();
            }
        } else if let Some(r) = self.workers.lock().await.get_mut(name) {
            r.state = WorkerState::Stopped;
        }

        self.workers.lock().await.remove(name);
        info!("unregistered worker '{}': {}", name, reason);
        self.fire(|c| &c.on_reaped, name);
        true
    }

    /// Heartbeat from a worker. Unknown names are silently ignored (the
    /// worker may have been reaped concurrently).
    pub async fn heartbeat(&self, name: &str) {
        if let Some(record) = self.workers.lock().await.get_mut(name) {
            record.heartbeat();
        }
    }

    pub async fn mark_task_started(&self, name: &str) {
        if let Some(record) = self.workers.lock().await.get_mut(name) {
            record.mark_task_started();
            debug!("worker '{}' started task #{}", name, record.task_count);
        }
    }

    pub async fn mark_task_completed(&self, name: &str) {
        let mut workers = self.workers.lock().await;
        if let Some(record) = workers.get_mut(name) {
            record.mark_task_completed();
            drop(workers);
            let mut total = self.tasks_completed.lock().await;
            *total += 1;
            debug!("worker '{}' completed task (total {})", name, *total);
        }
    }

    pub async fn mark_error(&self, name: &str) {
        if let Some(record) = self.workers.lock().await.get_mut(name) {
            record.mark_error();
            warn!("worker '{}' error #{}", name, record.error_count);
        }
    }

    pub async fn get(&self, name: &str) -> Option<WorkerRecord> {
        self.workers.lock().await.get(name).cloned()
    }

    async fn counted(&self) -> usize {
        self.workers
            .lock()
            .await
            .values()
            .filter(|w| !w.exclude_from_count)
            .count()
    }

    pub async fn stats(&self) -> SupervisorStats {
        let workers = self.workers.lock().await;
        let mut states: HashMap<&'static str, usize> = HashMap::new();
        for record in workers.values() {
            *states.entry(record.state.as_str()).or_insert(0) += 1;
        }
        SupervisorStats {
            total_workers: workers.len(),
            counted_workers: workers.values().filter(|w| !w.exclude_from_count).count(),
            persistent_workers: workers.values().filter(|w| w.is_persistent).count(),
            max_workers: self.config.max_workers,
            states,
            total_tasks_completed: *self.tasks_completed.lock().await,
            reaps: self.reap_stats.lock().await.clone(),
            workers: workers.values().cloned().collect(),
        }
    }

    // -----------------------------------------------------------------------
    // Reap passes
    // -----------------------------------------------------------------------

    fn chrono(d: Duration) -> ChronoDuration {
        ChronoDuration::from_std(d).unwrap_or_else(|_| ChronoDuration::seconds(i64::MAX / 1000))
    }

    /// Stale pass: workers whose heartbeat lapsed. Persistent workers are
    /// exempt.
    async fn reap_stale(&self) {
        let timeout = Self::chrono(self.config.heartbeat_timeout);
        let stale: Vec<String> = {
            let workers = self.workers.lock().await;
            workers
                .values()
                .filter(|w| !w.is_persistent && w.is_heartbeat_stale(timeout))
                .map(|w| w.name.clone())
                .collect()
        };

        for name in stale {
            self.unregister(&name, "stale heartbeat (unresponsive)").await;
            self.reap_stats.lock().await.stale += 1;
        }
    }

    /// Idle pass: idle workers past the idle timeout. Persistent workers
    /// are exempt.
    async fn reap_idle(&self) {
        let timeout = Self::chrono(self.config.idle_timeout);
        let idle: Vec<String> = {
            let workers = self.workers.lock().await;
            workers
                .values()
                .filter(|w| !w.is_persistent && w.is_idle_too_long(timeout))
                .map(|w| w.name.clone())
                .collect()
        };

        for name in idle {
            self.unregister(&name, "idle timeout").await;
            self.reap_stats.lock().await.idle += 1;
        }
    }

    /// Capacity pass: reap up to `slots_needed` idle non-persistent workers,
    /// oldest activity first.
    async fn reap_for_capacity(&self, slots_needed: usize) {
        let victims: Vec<String> = {
            let workers = self.workers.lock().await;
            let mut idle: Vec<&WorkerRecord> = workers
                .values()
                .filter(|w| {
                    w.state == WorkerState::Idle && !w.is_persistent && !w.exclude_from_count
                })
                .collect();
            idle.sort_by_key(|w| w.last_activity());
            idle.iter()
                .take(slots_needed)
                .map(|w| w.name.clone())
                .collect()
        };

        for name in victims {
            self.unregister(&name, "capacity management").await;
            self.reap_stats.lock().await.capacity += 1;
        }
    }

    /// Liveness pass: a container observed not running while its record says
    /// running/working/idle transitions the record to error, once.
    async fn check_liveness(&self) {
        let candidates: Vec<(String, String)> = {
            let workers = self.workers.lock().await;
            workers
                .values()
                .filter(|w| {
                    matches!(
                        w.state,
                        WorkerState::Running | WorkerState::Working | WorkerState::Idle
                    )
                })
                .map(|w| (w.name.clone(), w.container_handle.clone()))
                .collect()
        };

        for (name, handle) in candidates {
            match self.runtime.is_running(&handle).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("container for worker '{}' is no longer running", name);
                    self.mark_error(&name).await;
                }
                Err(e) => {
                    error!("liveness check failed for '{}': {}", name, e);
                    self.mark_error(&name).await;
                }
            }
        }
    }

    /// One full round of reap passes. Public for tests and for callers that
    /// want an immediate sweep.
    pub async fn run_reap_passes(&self) {
        if self.workers.lock().await.is_empty() {
            return;
        }
        self.reap_stale().await;
        self.reap_idle().await;
        let counted = self.counted().await;
        if counted > self.config.max_workers {
            self.reap_for_capacity(counted - self.config.max_workers).await;
        }
        self.check_liveness().await;
    }

    // -----------------------------------------------------------------------
    // Monitoring
    // -----------------------------------------------------------------------

    /// Spawn the background monitor loop.
    pub fn start_monitoring(self: &Arc<Self>) {
        let supervisor = self.clone();
        let cancel = self.monitor_cancel.clone();
        let interval = self.config.reap_interval;

        tokio::spawn(async move {
            info!("lifecycle monitoring started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        supervisor.run_reap_passes().await;
                    }
                }
            }
            info!("lifecycle monitoring stopped");
        });
    }

    pub fn stop_monitoring(&self) {
        self.monitor_cancel.cancel();
    }

    /// Stop monitoring, reap every non-persistent worker, and prune images.
    pub async fn shutdown(&self) {
        self.stop_monitoring();

        let names: Vec<String> = {
            let workers = self.workers.lock().await;
            workers
                .values()
                .filter(|w| !w.is_persistent)
                .map(|w| w.name.clone())
                .collect()
        };
        for name in names {
            self.unregister(&name, "system shutdown").await;
            self.reap_stats.lock().await.shutdown += 1;
        }

        if let Err(e) = self.runtime.prune_unused_images(SHUTDOWN_PRUNE_KEEP).await {
            warn!("image prune at shutdown failed: {}", e);
        }
    }
}
