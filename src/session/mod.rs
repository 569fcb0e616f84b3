//! In-memory signaling between the CLI/API surface and a running analysis
//! loop: pause/cancel requests land here and are polled between chapters,
//! held behind a `RwLock` so readers and writers can share state across
//! tasks without a database round trip.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::models::analysis_task::TaskStatus;

#[derive(Debug, Clone)]
pub struct ProgressEnvelope {
    pub task_id: String,
    pub chapter_num: i64,
    pub status: TaskStatus,
}

/// Tracks desired status per running task and which tasks actually have a
/// loop alive, so a resume after pause only starts a new loop once the old
/// one has genuinely exited.
pub struct TaskSignalManager {
    desired: Arc<RwLock<HashMap<String, TaskStatus>>>,
    active_loops: Arc<RwLock<HashSet<String>>>,
    progress: broadcast::Sender<ProgressEnvelope>,
}

impl TaskSignalManager {
    pub fn new() -> Self {
        let (progress, _) = broadcast::channel(256);
        Self {
            desired: Arc::new(RwLock::new(HashMap::new())),
            active_loops: Arc::new(RwLock::new(HashSet::new())),
            progress,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEnvelope> {
        self.progress.subscribe()
    }

    pub async fn signal(&self, task_id: &str, status: TaskStatus) {
        self.desired.write().await.insert(task_id.to_string(), status);
    }

    /// Checked once per chapter inside the analysis loop.
    pub async fn desired_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.desired.read().await.get(task_id).copied()
    }

    pub async fn clear_signal(&self, task_id: &str) {
        self.desired.write().await.remove(task_id);
    }

    /// Returns `true` if a loop was registered; `false` if one was already
    /// active (the caller should not start a second loop for this task).
    pub async fn try_start_loop(&self, task_id: &str) -> bool {
        self.active_loops.write().await.insert(task_id.to_string())
    }

    pub async fn end_loop(&self, task_id: &str) {
        self.active_loops.write().await.remove(task_id);
    }

    pub async fn is_loop_active(&self, task_id: &str) -> bool {
        self.active_loops.read().await.contains(task_id)
    }

    pub fn broadcast_progress(&self, envelope: ProgressEnvelope) {
        // No active subscribers is not an error; the loop keeps running.
        let _ = self.progress.send(envelope);
    }
}

impl Default for TaskSignalManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_roundtrips_through_desired_status() {
        let mgr = TaskSignalManager::new();
        mgr.signal("t1", TaskStatus::Paused).await;
        assert_eq!(mgr.desired_status("t1").await, Some(TaskStatus::Paused));
        mgr.clear_signal("t1").await;
        assert_eq!(mgr.desired_status("t1").await, None);
    }

    #[tokio::test]
    async fn second_loop_start_is_rejected_while_first_is_active() {
        let mgr = TaskSignalManager::new();
        assert!(mgr.try_start_loop("t1").await);
        assert!(!mgr.try_start_loop("t1").await);
        mgr.end_loop("t1").await;
        assert!(mgr.try_start_loop("t1").await);
    }
}
