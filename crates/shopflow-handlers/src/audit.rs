//! Audit-report capability: compliance previews over transaction payloads
//! and lightweight acknowledgments for fan-out plans.
//!
//! The authoritative audit trail lives in the core ledger; this handler
//! only answers "would this transaction be flagged" style questions using
//! the same evaluator the controller runs.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use shopflow_core::{
    ActionKind, ComplianceConfig, ComplianceEvaluator, DomainHandler, HandlerError, HandlerKey,
};

static NULL_STATE: Value = Value::Null;

/// Compliance preview handler.
pub struct AuditReportHandler {
    evaluator: ComplianceEvaluator,
}

impl Default for AuditReportHandler {
    fn default() -> Self {
        Self::new(ComplianceConfig::default())
    }
}

impl AuditReportHandler {
    pub fn new(config: ComplianceConfig) -> Self {
        Self {
            evaluator: ComplianceEvaluator::new(config),
        }
    }

    /// Run the compliance rules against an explicit transaction payload.
    fn compliance_check(&self, payload: &Value) -> Result<Value, HandlerError> {
        let action = transaction_action(payload);
        let before = payload.get("before_state").unwrap_or(&NULL_STATE);
        let after = payload.get("after_state").unwrap_or(&NULL_STATE);
        let amount = payload.get("amount").and_then(Value::as_f64);

        let flags = self.evaluator.evaluate(action, before, after, amount);
        let compliant = flags.is_empty();

        Ok(json!({
            "status": "success",
            "data": {
                "compliant": compliant,
                "flags": flags,
                "requires_approval": !compliant,
                "checked_at": Utc::now(),
            },
        }))
    }

    /// Default acknowledgment used when this handler participates in a
    /// fan-out plan with a non-audit payload.
    fn acknowledge(&self, payload: &Value) -> Result<Value, HandlerError> {
        let field_count = payload.as_object().map(|obj| obj.len()).unwrap_or(0);
        Ok(json!({
            "status": "success",
            "data": {
                "received_fields": field_count,
                "logged_at": Utc::now(),
            },
        }))
    }
}

/// Map the payload's declared transaction action onto a typed kind.
/// Unrecognized or absent actions fall back to `query`, which no rule
/// fires on.
fn transaction_action(payload: &Value) -> ActionKind {
    let declared = payload
        .get("transaction_action")
        .or_else(|| payload.get("action"))
        .and_then(Value::as_str)
        .unwrap_or("");

    match declared.to_ascii_lowercase().as_str() {
        "create" => ActionKind::Create,
        "update" => ActionKind::Update,
        "delete" => ActionKind::Delete,
        "command" => ActionKind::Command,
        _ => ActionKind::Query,
    }
}

#[async_trait]
impl DomainHandler for AuditReportHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::Audit
    }

    async fn handle(&self, payload: Value) -> Result<Value, HandlerError> {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("log");

        match action {
            "compliance_check" => self.compliance_check(&payload),
            "log" => self.acknowledge(&payload),
            other => Err(HandlerError::new(format!("unknown action '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preview_flags_a_price_anomaly() {
        let handler = AuditReportHandler::default();
        let result = handler
            .handle(json!({
                "action": "compliance_check",
                "transaction_action": "UPDATE",
                "before_state": {"price": 100.0},
                "after_state": {"price": 160.0}
            }))
            .await
            .unwrap();

        assert_eq!(result["data"]["compliant"], false);
        assert_eq!(result["data"]["requires_approval"], true);
        assert_eq!(result["data"]["flags"][0]["kind"], "PRICE_ANOMALY");
    }

    #[tokio::test]
    async fn preview_passes_a_clean_transaction() {
        let handler = AuditReportHandler::default();
        let result = handler
            .handle(json!({
                "action": "compliance_check",
                "transaction_action": "UPDATE",
                "before_state": {"price": 100.0},
                "after_state": {"price": 120.0},
                "amount": 120.0
            }))
            .await
            .unwrap();

        assert_eq!(result["data"]["compliant"], true);
        assert_eq!(result["data"]["flags"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn delete_transactions_always_require_approval() {
        let handler = AuditReportHandler::default();
        let result = handler
            .handle(json!({
                "action": "compliance_check",
                "transaction_action": "DELETE"
            }))
            .await
            .unwrap();
        assert_eq!(result["data"]["flags"][0]["kind"], "DELETE_OPERATION");
    }

    #[tokio::test]
    async fn fan_out_payloads_are_acknowledged() {
        let handler = AuditReportHandler::default();
        let result = handler
            .handle(json!({"context": "dashboard", "period": "weekly"}))
            .await
            .unwrap();
        assert_eq!(result["data"]["received_fields"], 2);
    }
}
