//! In-memory task store: one record per agent `execute` run.
//!
//! The store is an external collaborator of the loop: it is consulted once
//! at entry and once at each terminal transition, and its absence never
//! alters control flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not yet started.
    Pending,
    /// Loop in progress.
    Running,
    /// Finished with output.
    Completed,
    /// Finished with an error.
    Failed,
}

/// One tracked agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task id.
    pub id: Uuid,
    /// The instruction the run was given.
    pub instruction: String,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Final output, once completed.
    pub output: Option<String>,
    /// Error text, once failed.
    pub error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Terminal-transition timestamp.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Thread-safe in-memory task store.
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl TaskStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pending task for an instruction.
    pub fn create(&self, instruction: &str) -> Task {
        let task = Task {
            id: Uuid::new_v4(),
            instruction: instruction.to_string(),
            status: TaskStatus::Pending,
            output: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        if let Ok(mut map) = self.tasks.write() {
            map.insert(task.id, task.clone());
        }
        task
    }

    /// Updates a task's status; output and error are only overwritten when
    /// provided. A terminal status stamps `completed_at`.
    pub fn update(
        &self,
        id: Uuid,
        status: TaskStatus,
        output: Option<String>,
        error: Option<String>,
    ) -> Option<Task> {
        let mut map = self.tasks.write().ok()?;
        let task = map.get_mut(&id)?;
        task.status = status;
        if output.is_some() {
            task.output = output;
        }
        if error.is_some() {
            task.error = error;
        }
        if matches!(status, TaskStatus::Completed | TaskStatus::Failed) {
            task.completed_at = Some(Utc::now());
        }
        Some(task.clone())
    }

    /// Looks up a task by id.
    pub fn get(&self, id: Uuid) -> Option<Task> {
        self.tasks.read().ok()?.get(&id).cloned()
    }

    /// Most recent tasks first, up to `limit`.
    pub fn list(&self, limit: usize) -> Vec<Task> {
        let Ok(map) = self.tasks.read() else {
            return Vec::new();
        };
        let mut tasks: Vec<Task> = map.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(limit);
        tasks
    }

    /// Number of tracked tasks.
    pub fn len(&self) -> usize {
        self.tasks.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn create_then_complete() {
        let store = TaskStore::new();
        let task = store.create("count files");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.completed_at.is_none());

        let updated = store
            .update(task.id, TaskStatus::Completed, Some("26".into()), None)
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Completed);
        assert_eq!(updated.output.as_deref(), Some("26"));
        assert!(updated.completed_at.is_some());
    }

    #[test]
    fn failure_keeps_error_text() {
        let store = TaskStore::new();
        let task = store.create("x");
        store.update(
            task.id,
            TaskStatus::Failed,
            None,
            Some("Max iterations reached".into()),
        );
        let fetched = store.get(task.id).unwrap();
        assert_eq!(fetched.status, TaskStatus::Failed);
        assert_eq!(fetched.error.as_deref(), Some("Max iterations reached"));
    }

    #[test]
    fn unknown_id_is_none() {
        let store = TaskStore::new();
        assert!(store.get(Uuid::new_v4()).is_none());
        assert!(store
            .update(Uuid::new_v4(), TaskStatus::Completed, None, None)
            .is_none());
    }

    #[test]
    fn list_is_bounded() {
        let store = TaskStore::new();
        for i in 0..5 {
            store.create(&format!("task {i}"));
        }
        assert_eq!(store.list(3).len(), 3);
        assert_eq!(store.len(), 5);
    }
}
