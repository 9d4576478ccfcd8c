use crate::compliance::ComplianceFlag;
use crate::router::HandlerKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Task lifecycle states.
///
/// `Pending` and `InProgress` are transient and only observable while a
/// submission is executing; the remaining states are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Escalated,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Escalated | Self::Failed)
    }
}

/// Boundary-validated action kind for a submission.
///
/// Replaces free-form action strings: handler payloads and results stay
/// opaque, but the action driving compliance checks is typed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Query,
    Create,
    Update,
    Delete,
    Command,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Command => "command",
        }
    }
}

/// Machine-readable error descriptor attached to failed tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDescriptor {
    pub code: String,
    pub message: String,
}

impl ErrorDescriptor {
    pub const EXECUTION_ERROR: &'static str = "EXECUTION_ERROR";
    pub const INTERNAL_ERROR: &'static str = "INTERNAL_ERROR";

    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            code: Self::EXECUTION_ERROR.to_string(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: Self::INTERNAL_ERROR.to_string(),
            message: message.into(),
        }
    }
}

/// Per-invocation record kept on the owning task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerCall {
    pub handler: HandlerKey,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success: bool,
}

/// Durable task execution state.
///
/// Mutated only by the controller; `output` is set iff the task completed
/// or escalated, `error` iff it failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: String,
    pub user_id: String,
    pub session_id: String,
    /// Routing context, e.g. the originating page or category.
    pub context: String,
    pub action: ActionKind,
    pub status: TaskStatus,
    pub input: Value,
    pub output: Option<Value>,
    pub handler_calls: Vec<HandlerCall>,
    pub flags: Vec<ComplianceFlag>,
    pub requires_review: bool,
    pub error: Option<ErrorDescriptor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskState {
    pub fn new(request: &SubmitRequest) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4().to_string(),
            user_id: request.user_id.clone(),
            session_id: request.session_id.clone(),
            context: request.context.clone(),
            action: request.action,
            status: TaskStatus::Pending,
            input: request.payload.clone(),
            output: None,
            handler_calls: Vec::new(),
            flags: Vec::new(),
            requires_review: false,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.touch();
    }

    pub fn finish(&mut self, output: Value, flags: Vec<ComplianceFlag>, escalated: bool) {
        self.status = if escalated {
            TaskStatus::Escalated
        } else {
            TaskStatus::Completed
        };
        self.output = Some(output);
        self.requires_review = escalated;
        self.flags = flags;
        self.touch();
    }

    pub fn fail(&mut self, error: ErrorDescriptor) {
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        self.touch();
    }

    pub fn record_call(&mut self, call: HandlerCall) {
        self.handler_calls.push(call);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Validated submission entering the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub user_id: String,
    pub session_id: String,
    pub context: String,
    pub action: ActionKind,
    pub payload: Value,
}

impl SubmitRequest {
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        context: impl Into<String>,
        action: ActionKind,
        payload: Value,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            context: context.into(),
            action,
            payload,
        }
    }
}

/// Unified submission outcome.
///
/// Every submission that passes validation yields one of these, failed
/// tasks included, so the task id stays queryable and auditable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status: TaskStatus,
    /// Present iff the task completed or escalated. Escalation does not
    /// withhold the computed output; `requires_review` marks it instead.
    pub data: Option<Value>,
    pub flags: Vec<ComplianceFlag>,
    pub requires_review: bool,
    pub error: Option<ErrorDescriptor>,
    pub completed_at: DateTime<Utc>,
}
