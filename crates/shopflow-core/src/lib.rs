//! Shopflow core: task lifecycle control, contextual routing, and an
//! append-only audit/compliance subsystem.
//!
//! An inbound UI action becomes a durable task, is dispatched to one or
//! more domain handlers selected by routing context, and leaves behind an
//! auditable, compliance-checked record of the outcome. Handler business
//! logic, transport, and storage backends live outside this crate behind
//! explicit traits.

#![deny(unsafe_code)]

pub mod compliance;
pub mod controller;
pub mod error;
pub mod ledger;
pub mod registry;
pub mod router;
pub mod store;
pub mod types;

pub use compliance::{
    ComplianceConfig, ComplianceEvaluator, ComplianceFlag, FlagKind, TransactionView,
};
pub use controller::{ControllerConfig, EscalationPolicy, TaskController};
pub use error::{CoreError, CoreResult, HandlerError};
pub use ledger::{
    AuditEntry, AuditEntryKind, AuditLedger, AuditQuery, AuditStore, AuditSummary, CallDirection,
    InMemoryAuditStore, TaskEvent, UserActivity, DEFAULT_QUERY_LIMIT,
};
pub use registry::{DomainHandler, HandlerRegistry};
pub use router::{DispatchMode, DispatchPlan, HandlerKey, Router, FAN_OUT_ORDER};
pub use store::{InMemoryTaskStore, TaskStore};
pub use types::{
    ActionKind, ErrorDescriptor, HandlerCall, SubmitRequest, SubmitResponse, TaskState, TaskStatus,
};
