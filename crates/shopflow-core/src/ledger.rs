//! Append-only audit ledger with hash-chain tamper evidence.
//!
//! Every task transition and handler invocation becomes one immutable,
//! sequenced entry. No mutation or removal APIs exist; the only way state
//! changes is by appending another record.

use crate::error::{CoreError, CoreResult};
use crate::router::HandlerKey;
use crate::types::{ActionKind, TaskState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Default cap applied to audit queries when the caller supplies none.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Audit entry kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntryKind {
    TaskEvent,
    HandlerCall,
}

/// Lifecycle events recorded with a full task snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEvent {
    TaskStarted,
    TaskCompleted,
    TaskEscalated,
    TaskFailed,
}

impl TaskEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskStarted => "TASK_STARTED",
            Self::TaskCompleted => "TASK_COMPLETED",
            Self::TaskEscalated => "TASK_ESCALATED",
            Self::TaskFailed => "TASK_FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::TaskStarted)
    }
}

/// Direction of a recorded handler call payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Input,
    Output,
}

/// One immutable, hash-chained audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic, gapless sequence number; never reused.
    pub sequence: u64,
    pub entry_id: String,
    pub task_id: String,
    pub user_id: String,
    pub action: ActionKind,
    pub kind: AuditEntryKind,
    pub event: Option<TaskEvent>,
    pub handler: Option<HandlerKey>,
    pub direction: Option<CallDirection>,
    /// Payload snapshot for handler calls, full task snapshot for events.
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

/// Conjunctive audit filter; unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditQuery {
    pub task_id: Option<String>,
    pub user_id: Option<String>,
    pub handler: Option<HandlerKey>,
    pub event: Option<TaskEvent>,
    pub action: Option<ActionKind>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn for_task(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Self::default()
        }
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Per-user activity rollup inside an export summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserActivity {
    pub total_actions: u64,
    pub actions_by_kind: BTreeMap<String, u64>,
}

/// Aggregated compliance-reporting view over a time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSummary {
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub total_entries: u64,
    pub users: BTreeMap<String, UserActivity>,
    pub generated_at: DateTime<Utc>,
}

/// Append-only ledger of audit entries.
///
/// Side effects are confined to the ledger's own storage; it never calls
/// back into the controller or handlers.
#[derive(Debug, Default, Clone)]
pub struct AuditLedger {
    entries: Vec<AuditEntry>,
}

impl AuditLedger {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a lifecycle event together with a full task snapshot.
    pub fn append_task_event(
        &mut self,
        event: TaskEvent,
        state: &TaskState,
    ) -> CoreResult<AuditEntry> {
        let snapshot =
            serde_json::to_value(state).map_err(|e| CoreError::Serialization(e.to_string()))?;
        self.append(
            &state.task_id,
            &state.user_id,
            state.action,
            AuditEntryKind::TaskEvent,
            Some(event),
            None,
            None,
            snapshot,
        )
    }

    /// Record one side of a handler invocation (input or output payload).
    pub fn append_handler_call(
        &mut self,
        state: &TaskState,
        handler: HandlerKey,
        direction: CallDirection,
        payload: Value,
    ) -> CoreResult<AuditEntry> {
        self.append(
            &state.task_id,
            &state.user_id,
            state.action,
            AuditEntryKind::HandlerCall,
            None,
            Some(handler),
            Some(direction),
            payload,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn append(
        &mut self,
        task_id: &str,
        user_id: &str,
        action: ActionKind,
        kind: AuditEntryKind,
        event: Option<TaskEvent>,
        handler: Option<HandlerKey>,
        direction: Option<CallDirection>,
        payload: Value,
    ) -> CoreResult<AuditEntry> {
        let sequence = self.entries.len() as u64 + 1;
        let timestamp = Utc::now();
        let previous_hash = self.entries.last().map(|e| e.entry_hash.clone());
        let entry_hash = compute_entry_hash(
            sequence,
            task_id,
            kind,
            event,
            handler,
            direction,
            timestamp,
            &payload,
            previous_hash.as_deref(),
        )?;

        let entry = AuditEntry {
            sequence,
            entry_id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            user_id: user_id.to_string(),
            action,
            kind,
            event,
            handler,
            direction,
            payload,
            timestamp,
            previous_hash,
            entry_hash,
        };

        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Query entries newest-first, truncated to the caller's limit
    /// (default [`DEFAULT_QUERY_LIMIT`]).
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        let limit = query.limit.unwrap_or(DEFAULT_QUERY_LIMIT);

        self.entries
            .iter()
            .rev()
            .filter(|entry| {
                if let Some(ref task_id) = query.task_id {
                    if entry.task_id != *task_id {
                        return false;
                    }
                }
                if let Some(ref user_id) = query.user_id {
                    if entry.user_id != *user_id {
                        return false;
                    }
                }
                if let Some(handler) = query.handler {
                    if entry.handler != Some(handler) {
                        return false;
                    }
                }
                if let Some(event) = query.event {
                    if entry.event != Some(event) {
                        return false;
                    }
                }
                if let Some(action) = query.action {
                    if entry.action != action {
                        return false;
                    }
                }
                true
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// Aggregate entry counts grouped by user and action kind over a time
    /// window, for compliance reporting.
    pub fn export_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> AuditSummary {
        let mut users: BTreeMap<String, UserActivity> = BTreeMap::new();
        let mut total_entries = 0_u64;

        for entry in &self.entries {
            if let Some(start) = start {
                if entry.timestamp < start {
                    continue;
                }
            }
            if let Some(end) = end {
                if entry.timestamp > end {
                    continue;
                }
            }

            total_entries += 1;
            let activity = users.entry(entry.user_id.clone()).or_default();
            activity.total_actions += 1;
            *activity
                .actions_by_kind
                .entry(entry.action.as_str().to_string())
                .or_insert(0) += 1;
        }

        AuditSummary {
            window_start: start,
            window_end: end,
            total_entries,
            users,
            generated_at: Utc::now(),
        }
    }

    /// Re-derive every entry hash and check chain linkage.
    pub fn verify_chain(&self) -> bool {
        let mut previous_hash: Option<String> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.sequence != index as u64 + 1 {
                return false;
            }
            if entry.previous_hash != previous_hash {
                return false;
            }
            let expected = compute_entry_hash(
                entry.sequence,
                &entry.task_id,
                entry.kind,
                entry.event,
                entry.handler,
                entry.direction,
                entry.timestamp,
                &entry.payload,
                previous_hash.as_deref(),
            );
            match expected {
                Ok(expected) if expected == entry.entry_hash => {}
                _ => return false,
            }
            previous_hash = Some(entry.entry_hash.clone());
        }
        true
    }
}

/// Durable audit-log contract.
///
/// The in-memory adapter below is the reference implementation; the
/// interface itself makes no single-process memory assumptions, so a
/// database-backed store can satisfy it.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_task_event(
        &self,
        event: TaskEvent,
        state: &TaskState,
    ) -> CoreResult<AuditEntry>;

    async fn append_handler_call(
        &self,
        state: &TaskState,
        handler: HandlerKey,
        direction: CallDirection,
        payload: Value,
    ) -> CoreResult<AuditEntry>;

    /// Filtered read, newest-first, capped per the query.
    async fn query(&self, query: &AuditQuery) -> CoreResult<Vec<AuditEntry>>;

    async fn export_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> CoreResult<AuditSummary>;

    /// Every entry in append order.
    async fn list(&self) -> CoreResult<Vec<AuditEntry>>;

    async fn verify_chain(&self) -> CoreResult<bool>;
}

/// In-memory audit store adapter.
///
/// Appends run under a write lock, which keeps sequence numbers globally
/// unique and strictly increasing across concurrently submitted tasks;
/// readers never observe an entry mid-append.
#[derive(Default)]
pub struct InMemoryAuditStore {
    ledger: RwLock<AuditLedger>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> CoreResult<std::sync::RwLockReadGuard<'_, AuditLedger>> {
        self.ledger
            .read()
            .map_err(|_| CoreError::Backend("audit lock poisoned".to_string()))
    }

    fn write(&self) -> CoreResult<std::sync::RwLockWriteGuard<'_, AuditLedger>> {
        self.ledger
            .write()
            .map_err(|_| CoreError::Backend("audit lock poisoned".to_string()))
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append_task_event(
        &self,
        event: TaskEvent,
        state: &TaskState,
    ) -> CoreResult<AuditEntry> {
        self.write()?.append_task_event(event, state)
    }

    async fn append_handler_call(
        &self,
        state: &TaskState,
        handler: HandlerKey,
        direction: CallDirection,
        payload: Value,
    ) -> CoreResult<AuditEntry> {
        self.write()?.append_handler_call(state, handler, direction, payload)
    }

    async fn query(&self, query: &AuditQuery) -> CoreResult<Vec<AuditEntry>> {
        Ok(self.read()?.query(query))
    }

    async fn export_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> CoreResult<AuditSummary> {
        Ok(self.read()?.export_range(start, end))
    }

    async fn list(&self) -> CoreResult<Vec<AuditEntry>> {
        Ok(self.read()?.entries().to_vec())
    }

    async fn verify_chain(&self) -> CoreResult<bool> {
        Ok(self.read()?.verify_chain())
    }
}

#[allow(clippy::too_many_arguments)]
fn compute_entry_hash(
    sequence: u64,
    task_id: &str,
    kind: AuditEntryKind,
    event: Option<TaskEvent>,
    handler: Option<HandlerKey>,
    direction: Option<CallDirection>,
    timestamp: DateTime<Utc>,
    payload: &Value,
    previous_hash: Option<&str>,
) -> CoreResult<String> {
    let material = serde_json::json!({
        "sequence": sequence,
        "task_id": task_id,
        "kind": kind,
        "event": event,
        "handler": handler,
        "direction": direction,
        "timestamp": timestamp,
        "payload": payload,
        "previous_hash": previous_hash,
    });

    let bytes =
        serde_json::to_vec(&material).map_err(|e| CoreError::Serialization(e.to_string()))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}
