//! Wires the controller to the reference handlers and walks a few
//! representative submissions, printing the outcomes and the audit trail.
//!
//! Run with: `cargo run -p shopflow-handlers --example storefront_demo`

use serde_json::json;
use shopflow_core::{
    ActionKind, AuditQuery, ComplianceConfig, ControllerConfig, InMemoryTaskStore, SubmitRequest,
    TaskController,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "shopflow_core=info,info".to_string()),
        )
        .init();

    let registry = shopflow_handlers::default_registry(ComplianceConfig::default());
    let controller = TaskController::new(
        Arc::new(InMemoryTaskStore::new()),
        registry,
        ControllerConfig::default(),
    );

    // A routine stock lookup.
    let response = controller
        .submit(SubmitRequest::new(
            "demo-user",
            "demo-session",
            "inventory",
            ActionKind::Query,
            json!({"action": "query", "sku": "SKU001"}),
        ))
        .await?;
    info!(task_id = %response.task_id, status = ?response.status, "stock lookup");

    // A price change large enough to trip the compliance threshold.
    let response = controller
        .submit(SubmitRequest::new(
            "demo-user",
            "demo-session",
            "pricing",
            ActionKind::Update,
            json!({"action": "update_price", "sku": "SKU001", "price": 59.99}),
        ))
        .await?;
    info!(
        task_id = %response.task_id,
        status = ?response.status,
        requires_review = response.requires_review,
        "price update"
    );
    for flag in &response.flags {
        info!(kind = ?flag.kind, "{}", flag.detail);
    }

    // An unmatched context: fans out across every handler.
    let response = controller
        .submit(SubmitRequest::new(
            "demo-user",
            "demo-session",
            "dashboard",
            ActionKind::Query,
            json!({"customer_id": "CUST001", "sku": "SKU002"}),
        ))
        .await?;
    info!(task_id = %response.task_id, status = ?response.status, "dashboard fan-out");

    let trail = controller
        .audit_trail(&AuditQuery::for_user("demo-user"))
        .await?;
    info!(entries = trail.len(), "audit trail for demo-user");
    for entry in trail.iter().rev() {
        println!(
            "#{:<3} {:<12} {:<16} {}",
            entry.sequence,
            format!("{:?}", entry.kind),
            entry
                .event
                .map(|e| e.as_str().to_string())
                .or_else(|| entry.handler.map(|h| h.to_string()))
                .unwrap_or_default(),
            entry.task_id,
        );
    }

    assert!(controller.verify_audit_chain().await?);
    info!("audit chain verified");

    Ok(())
}
