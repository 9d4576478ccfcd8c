//! Durable task-state storage contract.
//!
//! The interface requires read-your-writes consistency for the issuing
//! process and must not assume single-process memory semantics; the
//! in-memory adapter here is the deterministic, test-friendly reference.

use crate::error::{CoreError, CoreResult};
use crate::types::TaskState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Keyed durable map from task identifier to task state.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a newly created task. Duplicate ids are a conflict.
    async fn create(&self, state: TaskState) -> CoreResult<()>;

    /// Update an existing task in place.
    async fn update(&self, state: TaskState) -> CoreResult<()>;

    /// Point lookup by task identifier.
    async fn get(&self, task_id: &str) -> CoreResult<Option<TaskState>>;
}

/// In-memory task store adapter.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, TaskState>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, state: TaskState) -> CoreResult<()> {
        let mut guard = self
            .tasks
            .write()
            .map_err(|_| CoreError::Backend("task store lock poisoned".to_string()))?;

        if guard.contains_key(&state.task_id) {
            return Err(CoreError::Conflict(format!(
                "task {} already exists",
                state.task_id
            )));
        }

        guard.insert(state.task_id.clone(), state);
        Ok(())
    }

    async fn update(&self, state: TaskState) -> CoreResult<()> {
        let mut guard = self
            .tasks
            .write()
            .map_err(|_| CoreError::Backend("task store lock poisoned".to_string()))?;

        if !guard.contains_key(&state.task_id) {
            return Err(CoreError::NotFound(format!(
                "task {} not found",
                state.task_id
            )));
        }

        guard.insert(state.task_id.clone(), state);
        Ok(())
    }

    async fn get(&self, task_id: &str) -> CoreResult<Option<TaskState>> {
        let guard = self
            .tasks
            .read()
            .map_err(|_| CoreError::Backend("task store lock poisoned".to_string()))?;
        Ok(guard.get(task_id).cloned())
    }
}
