//! Task lifecycle controller.
//!
//! Composes the router, handler registry, task store, audit ledger, and
//! compliance evaluator into the single submission entrypoint. The
//! controller is the only component that mutates task state, and every
//! transition and handler invocation it performs is audited.

use crate::compliance::{ComplianceEvaluator, ComplianceFlag};
use crate::error::{CoreError, CoreResult};
use crate::ledger::{
    AuditEntry, AuditQuery, AuditStore, AuditSummary, CallDirection, InMemoryAuditStore, TaskEvent,
};
use crate::registry::HandlerRegistry;
use crate::router::{DispatchMode, DispatchPlan, HandlerKey, Router};
use crate::store::TaskStore;
use crate::types::{
    ActionKind, ErrorDescriptor, HandlerCall, SubmitRequest, SubmitResponse, TaskState,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Whether compliance flags escalate a task or remain annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationPolicy {
    /// Flags are returned with a completed task; nothing escalates.
    Advisory,
    /// Any flag upgrades the terminal state to `Escalated`. The computed
    /// output is still attached, marked `requires_review`.
    RequireReview,
}

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Upper bound on a single handler invocation. Expiry fails the task.
    pub handler_timeout_ms: u64,
    pub escalation: EscalationPolicy,
    pub compliance: crate::compliance::ComplianceConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: 10_000,
            escalation: EscalationPolicy::RequireReview,
            compliance: crate::compliance::ComplianceConfig::default(),
        }
    }
}

/// The task lifecycle controller.
///
/// Constructed once at process start and passed to every entry point;
/// there is no hidden global instance. Methods take `&self` so one
/// controller serves concurrent submissions.
pub struct TaskController {
    store: Arc<dyn TaskStore>,
    audit: Arc<dyn AuditStore>,
    registry: HandlerRegistry,
    evaluator: ComplianceEvaluator,
    config: ControllerConfig,
}

impl TaskController {
    /// Controller over the in-memory audit store.
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: HandlerRegistry,
        config: ControllerConfig,
    ) -> Self {
        Self::with_audit_store(store, Arc::new(InMemoryAuditStore::new()), registry, config)
    }

    /// Controller over an explicit audit store backend.
    pub fn with_audit_store(
        store: Arc<dyn TaskStore>,
        audit: Arc<dyn AuditStore>,
        registry: HandlerRegistry,
        config: ControllerConfig,
    ) -> Self {
        let evaluator = ComplianceEvaluator::new(config.compliance.clone());
        Self {
            store,
            audit,
            registry,
            evaluator,
            config,
        }
    }

    /// Submit a request for routed execution.
    ///
    /// Fails fast with `CoreError::Validation` before any task state is
    /// created; afterwards every outcome (handler failures included)
    /// comes back as a response carrying the task id, so failed tasks
    /// stay queryable and auditable.
    pub async fn submit(&self, request: SubmitRequest) -> CoreResult<SubmitResponse> {
        Self::validate(&request)?;

        let mut state = TaskState::new(&request);
        self.store.create(state.clone()).await?;

        if let Err(err) = self.begin(&mut state).await {
            self.fail_task(&mut state, ErrorDescriptor::internal(err.to_string()))
                .await;
            return Ok(Self::response(&state));
        }

        let plan = Router::plan(&state.context);
        info!(
            task_id = %state.task_id,
            context = %state.context,
            handlers = plan.handlers.len(),
            "task started"
        );

        match self.dispatch(&mut state, &plan).await {
            Ok(results) => {
                let flags = self.collect_flags(state.action, &results);
                let output = Self::aggregate_output(&plan, results);
                let escalated =
                    !flags.is_empty() && self.config.escalation == EscalationPolicy::RequireReview;

                state.finish(output, flags, escalated);
                let event = if escalated {
                    TaskEvent::TaskEscalated
                } else {
                    TaskEvent::TaskCompleted
                };

                if let Err(err) = self.finalize(&state, event).await {
                    self.fail_task(&mut state, ErrorDescriptor::internal(err.to_string()))
                        .await;
                    return Ok(Self::response(&state));
                }

                info!(
                    task_id = %state.task_id,
                    status = ?state.status,
                    flags = state.flags.len(),
                    "task finished"
                );
                Ok(Self::response(&state))
            }
            Err(descriptor) => {
                self.fail_task(&mut state, descriptor).await;
                Ok(Self::response(&state))
            }
        }
    }

    /// Look up a task; unknown ids are `CoreError::NotFound`.
    pub async fn get_task(&self, task_id: &str) -> CoreResult<TaskState> {
        self.store
            .get(task_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id} not found")))
    }

    /// Filtered audit trail, newest-first, capped per the query.
    pub async fn audit_trail(&self, query: &AuditQuery) -> CoreResult<Vec<AuditEntry>> {
        self.audit.query(query).await
    }

    /// Compliance-reporting aggregation over a time window.
    pub async fn export_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> CoreResult<AuditSummary> {
        self.audit.export_range(start, end).await
    }

    /// All ledger entries in append order.
    pub async fn audit_entries(&self) -> CoreResult<Vec<AuditEntry>> {
        self.audit.list().await
    }

    pub async fn verify_audit_chain(&self) -> CoreResult<bool> {
        self.audit.verify_chain().await
    }

    fn validate(request: &SubmitRequest) -> CoreResult<()> {
        if request.user_id.trim().is_empty() {
            return Err(CoreError::Validation("user_id is required".to_string()));
        }
        if request.session_id.trim().is_empty() {
            return Err(CoreError::Validation("session_id is required".to_string()));
        }
        if request.context.trim().is_empty() {
            return Err(CoreError::Validation("context is required".to_string()));
        }
        Ok(())
    }

    /// Transition Pending -> InProgress and write TASK_STARTED before any
    /// handler runs.
    async fn begin(&self, state: &mut TaskState) -> CoreResult<()> {
        state.start();
        self.store.update(state.clone()).await?;
        self.append_task_event(TaskEvent::TaskStarted, state).await?;
        Ok(())
    }

    /// Invoke each planned handler in order, auditing input and output
    /// payloads. The first failure abandons the rest of the plan.
    async fn dispatch(
        &self,
        state: &mut TaskState,
        plan: &DispatchPlan,
    ) -> Result<Vec<(HandlerKey, Value)>, ErrorDescriptor> {
        let mut results = Vec::with_capacity(plan.handlers.len());

        for key in &plan.handlers {
            let Some(handler) = self.registry.get(*key) else {
                return Err(ErrorDescriptor::execution(format!(
                    "no handler registered for '{key}'"
                )));
            };

            self.append_handler_call(state, *key, CallDirection::Input, state.input.clone())
                .await
                .map_err(|e| ErrorDescriptor::internal(e.to_string()))?;

            let started_at = Utc::now();
            let timeout = Duration::from_millis(self.config.handler_timeout_ms);

            match tokio::time::timeout(timeout, handler.handle(state.input.clone())).await {
                Ok(Ok(result)) => {
                    state.record_call(HandlerCall {
                        handler: *key,
                        started_at,
                        completed_at: Some(Utc::now()),
                        success: true,
                    });
                    self.append_handler_call(state, *key, CallDirection::Output, result.clone())
                        .await
                        .map_err(|e| ErrorDescriptor::internal(e.to_string()))?;
                    results.push((*key, result));
                }
                Ok(Err(failure)) => {
                    state.record_call(HandlerCall {
                        handler: *key,
                        started_at,
                        completed_at: Some(Utc::now()),
                        success: false,
                    });
                    return Err(ErrorDescriptor::execution(format!("{key}: {failure}")));
                }
                Err(_elapsed) => {
                    state.record_call(HandlerCall {
                        handler: *key,
                        started_at,
                        completed_at: None,
                        success: false,
                    });
                    return Err(ErrorDescriptor::execution(format!(
                        "{key}: handler timed out after {}ms",
                        self.config.handler_timeout_ms
                    )));
                }
            }
        }

        Ok(results)
    }

    fn collect_flags(
        &self,
        action: ActionKind,
        results: &[(HandlerKey, Value)],
    ) -> Vec<ComplianceFlag> {
        let mut flags = Vec::new();
        for (_, result) in results {
            flags.extend(self.evaluator.evaluate_result(action, result));
        }
        flags
    }

    fn aggregate_output(plan: &DispatchPlan, results: Vec<(HandlerKey, Value)>) -> Value {
        match plan.mode {
            DispatchMode::Single => results
                .into_iter()
                .next()
                .map(|(_, value)| value)
                .unwrap_or(Value::Null),
            DispatchMode::FanOut => {
                let mut aggregated = Map::new();
                for (key, value) in results {
                    aggregated.insert(key.as_str().to_string(), value);
                }
                Value::Object(aggregated)
            }
        }
    }

    async fn finalize(&self, state: &TaskState, event: TaskEvent) -> CoreResult<()> {
        self.store.update(state.clone()).await?;
        self.append_task_event(event, state).await?;
        Ok(())
    }

    /// Terminal failure path. Persistence here is best-effort: a broken
    /// backend must not mask the task failure being reported.
    async fn fail_task(&self, state: &mut TaskState, descriptor: ErrorDescriptor) {
        warn!(
            task_id = %state.task_id,
            code = %descriptor.code,
            "task failed: {}",
            descriptor.message
        );
        state.fail(descriptor);

        if let Err(err) = self.store.update(state.clone()).await {
            warn!(task_id = %state.task_id, "failed task state not persisted: {err}");
        }
        if let Err(err) = self.append_task_event(TaskEvent::TaskFailed, state).await {
            warn!(task_id = %state.task_id, "failed task event not audited: {err}");
        }
    }

    async fn append_task_event(&self, event: TaskEvent, state: &TaskState) -> CoreResult<()> {
        self.audit.append_task_event(event, state).await?;
        Ok(())
    }

    async fn append_handler_call(
        &self,
        state: &TaskState,
        handler: HandlerKey,
        direction: CallDirection,
        payload: Value,
    ) -> CoreResult<()> {
        self.audit
            .append_handler_call(state, handler, direction, payload)
            .await?;
        Ok(())
    }

    fn response(state: &TaskState) -> SubmitResponse {
        SubmitResponse {
            task_id: state.task_id.clone(),
            status: state.status,
            data: state.output.clone(),
            flags: state.flags.clone(),
            requires_review: state.requires_review,
            error: state.error.clone(),
            completed_at: state.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::ledger::AuditEntryKind;
    use crate::registry::DomainHandler;
    use crate::router::FAN_OUT_ORDER;
    use crate::store::InMemoryTaskStore;
    use crate::types::TaskStatus;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct StaticHandler {
        key: HandlerKey,
        result: Value,
        invocations: Arc<Mutex<Vec<HandlerKey>>>,
    }

    #[async_trait]
    impl DomainHandler for StaticHandler {
        fn key(&self) -> HandlerKey {
            self.key
        }

        async fn handle(&self, _payload: Value) -> Result<Value, HandlerError> {
            self.invocations
                .lock()
                .expect("invocation log lock")
                .push(self.key);
            Ok(self.result.clone())
        }
    }

    struct FailingHandler {
        key: HandlerKey,
        invocations: Arc<Mutex<Vec<HandlerKey>>>,
    }

    #[async_trait]
    impl DomainHandler for FailingHandler {
        fn key(&self) -> HandlerKey {
            self.key
        }

        async fn handle(&self, _payload: Value) -> Result<Value, HandlerError> {
            self.invocations
                .lock()
                .expect("invocation log lock")
                .push(self.key);
            Err(HandlerError::new("upstream unavailable"))
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl DomainHandler for SlowHandler {
        fn key(&self) -> HandlerKey {
            HandlerKey::Inventory
        }

        async fn handle(&self, _payload: Value) -> Result<Value, HandlerError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({}))
        }
    }

    fn controller_with(
        handlers: Vec<Arc<dyn DomainHandler>>,
        config: ControllerConfig,
    ) -> TaskController {
        let mut registry = HandlerRegistry::new();
        for handler in handlers {
            registry.register(handler);
        }
        TaskController::new(Arc::new(InMemoryTaskStore::new()), registry, config)
    }

    fn static_handler(
        key: HandlerKey,
        result: Value,
        log: &Arc<Mutex<Vec<HandlerKey>>>,
    ) -> Arc<dyn DomainHandler> {
        Arc::new(StaticHandler {
            key,
            result,
            invocations: log.clone(),
        })
    }

    fn inventory_request() -> SubmitRequest {
        SubmitRequest::new(
            "user-1",
            "session-1",
            "inventory",
            ActionKind::Query,
            json!({"sku": "SKU001"}),
        )
    }

    #[tokio::test]
    async fn successful_task_has_one_start_and_one_terminal_event() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let controller = controller_with(
            vec![static_handler(
                HandlerKey::Inventory,
                json!({"status": "success"}),
                &log,
            )],
            ControllerConfig::default(),
        );

        let response = controller.submit(inventory_request()).await.unwrap();
        assert_eq!(response.status, TaskStatus::Completed);
        assert_eq!(response.data, Some(json!({"status": "success"})));
        assert!(response.error.is_none());

        let entries = controller
            .audit_trail(&AuditQuery::for_task(response.task_id.clone()))
            .await
            .unwrap();
        let started = entries
            .iter()
            .filter(|e| e.event == Some(TaskEvent::TaskStarted))
            .count();
        let terminal = entries
            .iter()
            .filter(|e| e.event.map(TaskEvent::is_terminal).unwrap_or(false))
            .count();
        assert_eq!(started, 1);
        assert_eq!(terminal, 1);

        // Handler input and output were both audited.
        let calls: Vec<_> = entries
            .iter()
            .filter(|e| e.kind == AuditEntryKind::HandlerCall)
            .collect();
        assert_eq!(calls.len(), 2);
        assert!(controller.verify_audit_chain().await.unwrap());
    }

    #[tokio::test]
    async fn task_state_is_queryable_after_completion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let controller = controller_with(
            vec![static_handler(HandlerKey::Inventory, json!({"ok": 1}), &log)],
            ControllerConfig::default(),
        );

        let response = controller.submit(inventory_request()).await.unwrap();
        let task = controller.get_task(&response.task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.output, Some(json!({"ok": 1})));
        assert_eq!(task.handler_calls.len(), 1);
        assert!(task.handler_calls[0].success);
    }

    #[tokio::test]
    async fn unknown_task_lookup_is_not_found() {
        let controller = controller_with(vec![], ControllerConfig::default());
        let result = controller.get_task("missing").await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn validation_failure_creates_no_task_and_no_audit() {
        let controller = controller_with(vec![], ControllerConfig::default());
        let request = SubmitRequest::new("", "session-1", "inventory", ActionKind::Query, json!({}));

        let result = controller.submit(request).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
        assert!(controller.audit_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_handler_fails_the_task_and_stops_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let controller = controller_with(
            vec![
                Arc::new(FailingHandler {
                    key: HandlerKey::CustomerService,
                    invocations: log.clone(),
                }),
                static_handler(HandlerKey::Inventory, json!({}), &log),
                static_handler(HandlerKey::Pricing, json!({}), &log),
                static_handler(HandlerKey::Audit, json!({}), &log),
            ],
            ControllerConfig::default(),
        );

        // Unmatched context: fan-out starting with the failing handler.
        let request =
            SubmitRequest::new("user-1", "session-1", "analytics", ActionKind::Query, json!({}));
        let response = controller.submit(request).await.unwrap();

        assert_eq!(response.status, TaskStatus::Failed);
        assert!(response.data.is_none());
        let error = response.error.expect("failed task carries an error");
        assert_eq!(error.code, ErrorDescriptor::EXECUTION_ERROR);
        assert!(error.message.contains("customer-service"));

        // No partial continuation after the failure.
        assert_eq!(
            log.lock().unwrap().clone(),
            vec![HandlerKey::CustomerService]
        );

        let entries = controller
            .audit_trail(&AuditQuery::for_task(response.task_id.clone()))
            .await
            .unwrap();
        assert!(entries
            .iter()
            .any(|e| e.event == Some(TaskEvent::TaskFailed)));
        assert!(!entries
            .iter()
            .any(|e| e.event == Some(TaskEvent::TaskCompleted)));
    }

    #[tokio::test]
    async fn missing_handler_registration_fails_the_task() {
        let controller = controller_with(vec![], ControllerConfig::default());
        let response = controller.submit(inventory_request()).await.unwrap();

        assert_eq!(response.status, TaskStatus::Failed);
        let error = response.error.unwrap();
        assert_eq!(error.code, ErrorDescriptor::EXECUTION_ERROR);
        assert!(error.message.contains("no handler registered"));
    }

    #[tokio::test]
    async fn handler_timeout_fails_the_task() {
        let config = ControllerConfig {
            handler_timeout_ms: 50,
            ..ControllerConfig::default()
        };
        let controller = controller_with(vec![Arc::new(SlowHandler)], config);

        let response = controller.submit(inventory_request()).await.unwrap();
        assert_eq!(response.status, TaskStatus::Failed);
        assert!(response.error.unwrap().message.contains("timed out"));

        let task = controller.get_task(&response.task_id).await.unwrap();
        assert_eq!(task.handler_calls.len(), 1);
        assert!(!task.handler_calls[0].success);
        assert!(task.handler_calls[0].completed_at.is_none());
    }

    #[tokio::test]
    async fn fan_out_invokes_all_handlers_once_in_fixed_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let controller = controller_with(
            vec![
                static_handler(HandlerKey::CustomerService, json!({"cs": true}), &log),
                static_handler(HandlerKey::Inventory, json!({"inv": true}), &log),
                static_handler(HandlerKey::Pricing, json!({"price": true}), &log),
                static_handler(HandlerKey::Audit, json!({"audit": true}), &log),
            ],
            ControllerConfig::default(),
        );

        let request =
            SubmitRequest::new("user-1", "session-1", "dashboard", ActionKind::Query, json!({}));
        let response = controller.submit(request).await.unwrap();

        assert_eq!(response.status, TaskStatus::Completed);
        assert_eq!(log.lock().unwrap().clone(), FAN_OUT_ORDER.to_vec());

        // Aggregated output is keyed by handler name.
        let data = response.data.unwrap();
        assert_eq!(data["customer-service"]["cs"], true);
        assert_eq!(data["inventory"]["inv"], true);
        assert_eq!(data["pricing"]["price"], true);
        assert_eq!(data["audit"]["audit"], true);
    }

    #[tokio::test]
    async fn flagged_transaction_escalates_with_output_attached() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let transaction = json!({
            "status": "success",
            "data": {
                "before_state": {"price": 100.0},
                "after_state": {"price": 160.0}
            }
        });
        let controller = controller_with(
            vec![static_handler(HandlerKey::Pricing, transaction.clone(), &log)],
            ControllerConfig::default(),
        );

        let request = SubmitRequest::new(
            "user-1",
            "session-1",
            "pricing",
            ActionKind::Update,
            json!({"sku": "SKU001", "price": 160.0}),
        );
        let response = controller.submit(request).await.unwrap();

        assert_eq!(response.status, TaskStatus::Escalated);
        assert!(response.requires_review);
        assert_eq!(response.data, Some(transaction));
        assert_eq!(response.flags.len(), 1);

        let entries = controller
            .audit_trail(&AuditQuery::for_task(response.task_id.clone()))
            .await
            .unwrap();
        assert!(entries
            .iter()
            .any(|e| e.event == Some(TaskEvent::TaskEscalated)));
    }

    #[tokio::test]
    async fn advisory_policy_completes_with_flags_as_annotations() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let transaction = json!({
            "data": {
                "before_state": {"price": 100.0},
                "after_state": {"price": 160.0}
            }
        });
        let config = ControllerConfig {
            escalation: EscalationPolicy::Advisory,
            ..ControllerConfig::default()
        };
        let controller = controller_with(
            vec![static_handler(HandlerKey::Pricing, transaction, &log)],
            config,
        );

        let request = SubmitRequest::new(
            "user-1",
            "session-1",
            "pricing",
            ActionKind::Update,
            json!({}),
        );
        let response = controller.submit(request).await.unwrap();

        assert_eq!(response.status, TaskStatus::Completed);
        assert!(!response.requires_review);
        assert_eq!(response.flags.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_submissions_keep_sequences_unique_and_increasing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let controller = Arc::new(controller_with(
            vec![static_handler(HandlerKey::Inventory, json!({}), &log)],
            ControllerConfig::default(),
        ));

        let mut joins = Vec::new();
        for i in 0..16 {
            let controller = controller.clone();
            joins.push(tokio::spawn(async move {
                controller
                    .submit(SubmitRequest::new(
                        format!("user-{i}"),
                        "session-1",
                        "inventory",
                        ActionKind::Query,
                        json!({}),
                    ))
                    .await
                    .unwrap()
            }));
        }
        for join in joins {
            join.await.unwrap();
        }

        let entries = controller.audit_entries().await.unwrap();
        // 16 tasks x (start + input + output + terminal).
        assert_eq!(entries.len(), 64);
        for (index, entry) in entries.iter().enumerate() {
            assert_eq!(entry.sequence, index as u64 + 1);
        }
        assert!(controller.verify_audit_chain().await.unwrap());
    }

    #[tokio::test]
    async fn export_range_summarizes_submissions() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let controller = controller_with(
            vec![static_handler(HandlerKey::Inventory, json!({}), &log)],
            ControllerConfig::default(),
        );

        controller.submit(inventory_request()).await.unwrap();
        controller.submit(inventory_request()).await.unwrap();

        let summary = controller.export_range(None, None).await.unwrap();
        assert_eq!(summary.total_entries, 8);
        assert_eq!(summary.users["user-1"].actions_by_kind["query"], 8);
    }
}
