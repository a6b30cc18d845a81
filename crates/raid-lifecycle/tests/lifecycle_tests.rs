//! Tests for the lifecycle supervisor: capacity, reaping, liveness

use raid_lifecycle::*;
use raid_orchestrator::{ContainerRuntime, FakeRuntime};
use raid_profiles::LifecyclePolicy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const NORMAL: LifecyclePolicy = LifecyclePolicy {
    persistent: false,
    auto_cleanup: true,
    exclude_from_count: false,
};

const PERSISTENT_EXCLUDED: LifecyclePolicy = LifecyclePolicy {
    persistent: true,
    auto_cleanup: false,
    exclude_from_count: true,
};

fn supervisor_with(
    max_workers: usize,
    idle_timeout: Duration,
) -> (Arc<FakeRuntime>, Arc<LifecycleSupervisor>) {
    let runtime = Arc::new(FakeRuntime::new());
    let supervisor = Arc::new(LifecycleSupervisor::new(
        runtime.clone(),
        SupervisorConfig {
            max_workers,
            idle_timeout,
            heartbeat_timeout: Duration::from_secs(3600),
            reap_interval: Duration::from_secs(60),
        },
    ));
    (runtime, supervisor)
}

async fn spawn_worker(
    runtime: &FakeRuntime,
    supervisor: &LifecycleSupervisor,
    name: &str,
    policy: LifecyclePolicy,
) -> String {
    let profile = raid_profiles::Profile {
        name: name.to_string(),
        description: String::new(),
        version: "1.0".to_string(),
        llm_config: Default::default(),
        tools: vec![],
        system_prompt: String::new(),
        docker_config: Default::default(),
        lifecycle_config: Some(policy),
    };
    let handle = runtime
        .ensure_running(&profile, &Default::default())
        .await
        .unwrap();
    supervisor
        .register(name, &handle, name, policy)
        .await
        .unwrap();
    handle
}

// ===========================================================================
// Registration and capacity
// ===========================================================================

#[tokio::test]
async fn register_and_stats() {
    let (runtime, supervisor) = supervisor_with(5, Duration::from_secs(600));
    spawn_worker(&runtime, &supervisor, "alpha", NORMAL).await;

    let stats = supervisor.stats().await;
    assert_eq!(stats.total_workers, 1);
    assert_eq!(stats.counted_workers, 1);
    assert_eq!(stats.states.get("running"), Some(&1));
}

#[tokio::test]
async fn duplicate_registration_rejected() {
    let (runtime, supervisor) = supervisor_with(5, Duration::from_secs(600));
    spawn_worker(&runtime, &supervisor, "alpha", NORMAL).await;

    let result = supervisor.register("alpha", "other-handle", "alpha", NORMAL).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn capacity_bound_holds() {
    let (runtime, supervisor) = supervisor_with(2, Duration::from_secs(600));
    spawn_worker(&runtime, &supervisor, "a", NORMAL).await;
    spawn_worker(&runtime, &supervisor, "b", NORMAL).await;

    // Both busy: nothing reapable, third registration must fail
    supervisor.mark_task_started("a").await;
    supervisor.mark_task_started("b").await;

    let result = supervisor.register("c", "handle-c", "c", NORMAL).await;
    assert!(matches!(
        result,
        Err(raid_core::Error::CapacityExceeded { current: 2, limit: 2 })
    ));
    assert!(supervisor.stats().await.counted_workers <= 2);
}

#[tokio::test]
async fn capacity_zero_rejects_every_counted_registration() {
    let (_runtime, supervisor) = supervisor_with(0, Duration::from_secs(600));
    let result = supervisor.register("a", "h", "a", NORMAL).await;
    assert!(result.is_err());

    // Excluded workers are still admitted
    let result = supervisor.register("p", "h", "p", PERSISTENT_EXCLUDED).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn excluded_workers_do_not_consume_capacity() {
    let (runtime, supervisor) = supervisor_with(1, Duration::from_secs(600));
    spawn_worker(&runtime, &supervisor, "p", PERSISTENT_EXCLUDED).await;
    spawn_worker(&runtime, &supervisor, "a", NORMAL).await;

    let stats = supervisor.stats().await;
    assert_eq!(stats.total_workers, 2);
    assert_eq!(stats.counted_workers, 1);
}

// ===========================================================================
// Capacity reap (spec scenario: persistent untouched, oldest idle reaped)
// ===========================================================================

#[tokio::test]
async fn registration_at_capacity_reaps_oldest_idle_worker() {
    let (runtime, supervisor) = supervisor_with(2, Duration::from_secs(600));

    spawn_worker(&runtime, &supervisor, "p", PERSISTENT_EXCLUDED).await;
    spawn_worker(&runtime, &supervisor, "a", NORMAL).await;
    spawn_worker(&runtime, &supervisor, "b", NORMAL).await;

    // a's activity is older than b's
    supervisor.mark_task_started("a").await;
    supervisor.mark_task_completed("a").await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    supervisor.mark_task_started("b").await;
    supervisor.mark_task_completed("b").await;

    let reaped = Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let reaped = reaped.clone();
        supervisor.on_reaped(move |name| reaped.lock().unwrap().push(name.to_string()));
    }

    supervisor.register("c", "handle-c", "c", NORMAL).await.unwrap();

    // Oldest-activity idle worker went; persistent and newer one survive
    assert_eq!(reaped.lock().unwrap().as_slice(), &["a".to_string()]);
    assert!(supervisor.get("p").await.is_some());
    assert!(supervisor.get("b").await.is_some());
    assert!(supervisor.get("c").await.is_some());
    assert!(supervisor.get("a").await.is_none());
    assert_eq!(supervisor.stats().await.reaps.capacity, 1);
}

#[tokio::test]
async fn persistent_workers_survive_every_pass() {
    // Zero timeouts: every pass would reap anything non-persistent
    let runtime = Arc::new(FakeRuntime::new());
    let supervisor = Arc::new(LifecycleSupervisor::new(
        runtime.clone(),
        SupervisorConfig {
            max_workers: 1,
            idle_timeout: Duration::ZERO,
            heartbeat_timeout: Duration::ZERO,
            reap_interval: Duration::from_secs(60),
        },
    ));

    let persistent_counted = LifecyclePolicy {
        persistent: true,
        auto_cleanup: false,
        exclude_from_count: false,
    };
    spawn_worker(&runtime, &supervisor, "keeper", persistent_counted).await;
    supervisor.mark_task_started("keeper").await;
    supervisor.mark_task_completed("keeper").await;

    supervisor.run_reap_passes().await;
    supervisor.run_reap_passes().await;

    let record = supervisor.get("keeper").await.unwrap();
    assert_eq!(record.state, WorkerState::Idle);
}

// ===========================================================================
// Stale and idle passes
// ===========================================================================

#[tokio::test]
async fn stale_worker_is_reaped() {
    let runtime = Arc::new(FakeRuntime::new());
    let supervisor = Arc::new(LifecycleSupervisor::new(
        runtime.clone(),
        SupervisorConfig {
            max_workers: 5,
            idle_timeout: Duration::from_secs(3600),
            heartbeat_timeout: Duration::ZERO,
            reap_interval: Duration::from_secs(60),
        },
    ));
    spawn_worker(&runtime, &supervisor, "quiet", NORMAL).await;

    tokio::time::sleep(Duration::from_millis(5)).await;
    supervisor.run_reap_passes().await;

    assert!(supervisor.get("quiet").await.is_none());
    assert_eq!(supervisor.stats().await.reaps.stale, 1);
}

#[tokio::test]
async fn idle_worker_is_reaped_after_timeout() {
    let (runtime, supervisor) = supervisor_with(5, Duration::ZERO);
    spawn_worker(&runtime, &supervisor, "done", NORMAL).await;
    supervisor.mark_task_started("done").await;
    supervisor.mark_task_completed("done").await;

    tokio::time::sleep(Duration::from_millis(5)).await;
    supervisor.run_reap_passes().await;

    assert!(supervisor.get("done").await.is_none());
    assert_eq!(supervisor.stats().await.reaps.idle, 1);
}

#[tokio::test]
async fn busy_worker_is_not_idle_reaped() {
    let (runtime, supervisor) = supervisor_with(5, Duration::ZERO);
    spawn_worker(&runtime, &supervisor, "busy", NORMAL).await;
    supervisor.mark_task_started("busy").await;

    supervisor.run_reap_passes().await;
    assert!(supervisor.get("busy").await.is_some());
}

// ===========================================================================
// Liveness (vanished container -> error, counted once)
// ===========================================================================

#[tokio::test]
async fn vanished_container_errors_once() {
    let (runtime, supervisor) = supervisor_with(5, Duration::from_secs(600));
    let handle = spawn_worker(&runtime, &supervisor, "w", NORMAL).await;

    runtime.kill(&handle);

    supervisor.run_reap_passes().await;
    let record = supervisor.get("w").await.unwrap();
    assert_eq!(record.state, WorkerState::Error);
    assert_eq!(record.error_count, 1);

    // Second pass must not double-count: the record is already in error
    supervisor.run_reap_passes().await;
    let record = supervisor.get("w").await.unwrap();
    assert_eq!(record.error_count, 1);
}

// ===========================================================================
// Unregister and state updates
// ===========================================================================

#[tokio::test]
async fn unregister_twice_is_noop_second_time() {
    let (runtime, supervisor) = supervisor_with(5, Duration::from_secs(600));
    spawn_worker(&runtime, &supervisor, "w", NORMAL).await;

    assert!(supervisor.unregister("w", "test").await);
    assert!(!supervisor.unregister("w", "test").await);
}

#[tokio::test]
async fn updates_for_unknown_workers_are_ignored() {
    let (_runtime, supervisor) = supervisor_with(5, Duration::from_secs(600));
    supervisor.heartbeat("ghost").await;
    supervisor.mark_task_started("ghost").await;
    supervisor.mark_task_completed("ghost").await;
    supervisor.mark_error("ghost").await;
    assert_eq!(supervisor.stats().await.total_workers, 0);
}

#[tokio::test]
async fn stop_failure_does_not_abort_reaping() {
    let (runtime, supervisor) = supervisor_with(5, Duration::from_secs(600));
    spawn_worker(&runtime, &supervisor, "w1", NORMAL).await;
    spawn_worker(&runtime, &supervisor, "w2", NORMAL).await;

    runtime.fail_stops(true);
    assert!(supervisor.unregister("w1", "test").await);
    assert!(supervisor.unregister("w2", "test").await);
    assert_eq!(supervisor.stats().await.total_workers, 0);
}

// ===========================================================================
// Shutdown
// ===========================================================================

#[tokio::test]
async fn shutdown_reaps_only_non_persistent() {
    let (runtime, supervisor) = supervisor_with(5, Duration::from_secs(600));
    spawn_worker(&runtime, &supervisor, "p", PERSISTENT_EXCLUDED).await;
    spawn_worker(&runtime, &supervisor, "a", NORMAL).await;
    spawn_worker(&runtime, &supervisor, "b", NORMAL).await;

    supervisor.shutdown().await;

    let stats = supervisor.stats().await;
    assert_eq!(stats.total_workers, 1);
    assert!(supervisor.get("p").await.is_some());
    assert_eq!(stats.reaps.shutdown, 2);
}

#[tokio::test]
async fn task_counts_accumulate() {
    let (runtime, supervisor) = supervisor_with(5, Duration::from_secs(600));
    spawn_worker(&runtime, &supervisor, "w", NORMAL).await;

    supervisor.mark_task_started("w").await;
    supervisor.mark_task_completed("w").await;
    supervisor.mark_task_started("w").await;
    supervisor.mark_task_completed("w").await;

    let stats = supervisor.stats().await;
    assert_eq!(stats.total_tasks_completed, 2);
    let record = supervisor.get("w").await.unwrap();
    assert_eq!(record.task_count, 2);
}

// ===========================================================================
// Callback wiring
// ===========================================================================

#[tokio::test]
async fn registered_callback_fires() {
    let (runtime, supervisor) = supervisor_with(5, Duration::from_secs(600));
    let count = Arc::new(AtomicUsize::new(0));
    {
        let count = count.clone();
        supervisor.on_registered(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });
    }
    spawn_worker(&runtime, &supervisor, "w", NORMAL).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn capacity_pressure_callback_fires_on_rejection() {
    let (runtime, supervisor) = supervisor_with(1, Duration::from_secs(600));
    spawn_worker(&runtime, &supervisor, "a", NORMAL).await;
    supervisor.mark_task_started("a").await;

    let pressured = Arc::new(AtomicUsize::new(0));
    {
        let pressured = pressured.clone();
        supervisor.on_capacity_pressure(move |_| {
            pressured.fetch_add(1, Ordering::SeqCst);
        });
    }

    let _ = supervisor.register("b", "h", "b", NORMAL).await;
    assert_eq!(pressured.load(Ordering::SeqCst), 1);
}
