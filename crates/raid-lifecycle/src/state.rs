//! Worker state machine and per-worker record

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Worker lifecycle states.
///
/// `Stopped` is terminal; `Error` is reachable from any non-terminal state.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Creating,
    Starting,
    Running,
    Working,
    Idle,
    Stopping,
    Stopped,
    Error,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        self == WorkerState::Stopped
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Creating => "creating",
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::Working => "working",
            WorkerState::Idle => "idle",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
            WorkerState::Error => "error",
        }
    }
}

/// One live worker, owned by the lifecycle supervisor.
#[derive(Clone, Debug)]
pub struct WorkerRecord {
    pub name: String,
    pub profile_name: String,
    pub container_handle: String,
    pub state: WorkerState,
    pub created_at: DateTime<Utc>,
    pub last_task_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub task_count: u64,
    pub error_count: u64,
    pub is_persistent: bool,
    pub exclude_from_count: bool,
}

impl WorkerRecord {
    pub fn new(
        name: impl Into<String>,
        container_handle: impl Into<String>,
        profile_name: impl Into<String>,
        is_persistent: bool,
        exclude_from_count: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            profile_name: profile_name.into(),
            container_handle: container_handle.into(),
            state: WorkerState::Running,
            created_at: now,
            last_task_at: None,
            last_heartbeat_at: now,
            task_count: 0,
            error_count: 0,
            is_persistent,
            exclude_from_count,
        }
    }

    pub fn heartbeat(&mut self) {
        self.last_heartbeat_at = Utc::now();
    }

    pub fn mark_task_started(&mut self) {
        self.state = WorkerState::Working;
        self.last_task_at = Some(Utc::now());
        self.task_count += 1;
        self.heartbeat();
    }

    pub fn mark_task_completed(&mut self) {
        self.state = WorkerState::Idle;
        self.heartbeat();
    }

    pub fn mark_error(&mut self) {
        self.error_count += 1;
        self.state = WorkerState::Error;
        self.heartbeat();
    }

    /// Most recent activity: last task, or creation for a worker that never
    /// took one.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_task_at.unwrap_or(self.created_at)
    }

    pub fn is_idle_too_long(&self, idle_timeout: Duration) -> bool {
        self.state == WorkerState::Idle && Utc::now() - self.last_activity() > idle_timeout
    }

    pub fn is_heartbeat_stale(&self, heartbeat_timeout: Duration) -> bool {
        Utc::now() - self.last_heartbeat_at > heartbeat_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_start_complete_transitions() {
        let mut record = WorkerRecord::new("w", "h", "p", false, false);
        assert_eq!(record.state, WorkerState::Running);

        record.mark_task_started();
        assert_eq!(record.state, WorkerState::Working);
        assert_eq!(record.task_count, 1);
        assert!(record.last_task_at.is_some());

        record.mark_task_completed();
        assert_eq!(record.state, WorkerState::Idle);

        record.mark_task_started();
        assert_eq!(record.task_count, 2);
    }

    #[test]
    fn error_increments_count() {
        let mut record = WorkerRecord::new("w", "h", "p", false, false);
        record.mark_error();
        record.mark_error();
        assert_eq!(record.state, WorkerState::Error);
        assert_eq!(record.error_count, 2);
    }

    #[test]
    fn idle_check_requires_idle_state() {
        let mut record = WorkerRecord::new("w", "h", "p", false, false);
        // Running worker is never idle-too-long, whatever the clock says
        assert!(!record.is_idle_too_long(Duration::zero()));

        record.mark_task_completed();
        assert!(record.is_idle_too_long(Duration::zero()));
        assert!(!record.is_idle_too_long(Duration::minutes(10)));
    }

    #[test]
    fn last_activity_falls_back_to_creation() {
        let record = WorkerRecord::new("w", "h", "p", false, false);
        assert_eq!(record.last_activity(), record.created_at);
    }

    #[test]
    fn stale_heartbeat_detection() {
        let mut record = WorkerRecord::new("w", "h", "p", false, false);
        assert!(!record.is_heartbeat_stale(Duration::minutes(5)));
        record.last_heartbeat_at = Utc::now() - Duration::minutes(10);
        assert!(record.is_heartbeat_stale(Duration::minutes(5)));
    }

    #[test]
    fn only_stopped_is_terminal() {
        assert!(WorkerState::Stopped.is_terminal());
        assert!(!WorkerState::Error.is_terminal());
        assert!(!WorkerState::Stopping.is_terminal());
    }
}
