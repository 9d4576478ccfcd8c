//! Pure compliance flagging over transaction-shaped handler results.
//!
//! Evaluation is deterministic and side-effect free: the same action,
//! states, and amount always produce the same flag set, and malformed or
//! missing fields mean a rule does not apply rather than an error.

use crate::types::ActionKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Externally supplied compliance thresholds. Static for the process
/// lifetime; hot-reload is not supported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceConfig {
    /// Price updates changing more than this percentage are flagged.
    pub max_price_change_percent: f64,
    /// Transaction amounts above this value are flagged for approval.
    pub high_amount_threshold: f64,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            max_price_change_percent: 50.0,
            high_amount_threshold: 1000.0,
        }
    }
}

/// Compliance flag kinds, in check order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagKind {
    PriceAnomaly,
    HighAmount,
    DeleteOperation,
}

/// Advisory review marker derived from a transaction.
///
/// Flags never block a handler's computed output; the controller decides
/// whether their presence escalates the owning task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceFlag {
    pub kind: FlagKind,
    pub detail: String,
}

static NULL_STATE: Value = Value::Null;

/// Borrowed view of the transaction-shaped portion of a handler result.
///
/// A result (or its `data` envelope) is transaction-shaped when it carries
/// any of `before_state`, `after_state`, or `amount`.
#[derive(Debug, Clone, Copy)]
pub struct TransactionView<'a> {
    pub before: &'a Value,
    pub after: &'a Value,
    pub amount: Option<f64>,
}

impl<'a> TransactionView<'a> {
    pub fn from_value(value: &'a Value) -> Option<Self> {
        if let Some(data) = value.get("data") {
            if let Some(view) = Self::from_object(data) {
                return Some(view);
            }
        }
        Self::from_object(value)
    }

    fn from_object(value: &'a Value) -> Option<Self> {
        let object = value.as_object()?;
        if !object.contains_key("before_state")
            && !object.contains_key("after_state")
            && !object.contains_key("amount")
        {
            return None;
        }

        Some(Self {
            before: object.get("before_state").unwrap_or(&NULL_STATE),
            after: object.get("after_state").unwrap_or(&NULL_STATE),
            amount: object.get("amount").and_then(Value::as_f64),
        })
    }
}

/// Deterministic compliance rule engine.
#[derive(Debug, Clone, Default)]
pub struct ComplianceEvaluator {
    config: ComplianceConfig,
}

impl ComplianceEvaluator {
    pub fn new(config: ComplianceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    /// Derive flags from an action and its before/after delta.
    ///
    /// Check order is fixed: price anomaly, high amount, delete.
    pub fn evaluate(
        &self,
        action: ActionKind,
        before: &Value,
        after: &Value,
        amount: Option<f64>,
    ) -> Vec<ComplianceFlag> {
        let mut flags = Vec::new();

        if action == ActionKind::Update {
            if let (Some(old_price), Some(new_price)) = (
                before.get("price").and_then(Value::as_f64),
                after.get("price").and_then(Value::as_f64),
            ) {
                if old_price > 0.0 {
                    let change_percent = ((new_price - old_price) / old_price * 100.0).abs();
                    if change_percent > self.config.max_price_change_percent {
                        flags.push(ComplianceFlag {
                            kind: FlagKind::PriceAnomaly,
                            detail: format!(
                                "{:.1}% change (max allowed: {}%)",
                                change_percent, self.config.max_price_change_percent
                            ),
                        });
                    }
                }
            }
        }

        if let Some(amount) = amount {
            if amount > self.config.high_amount_threshold {
                flags.push(ComplianceFlag {
                    kind: FlagKind::HighAmount,
                    detail: format!(
                        "{:.2} exceeds approval threshold of {:.2}",
                        amount, self.config.high_amount_threshold
                    ),
                });
            }
        }

        if action == ActionKind::Delete {
            flags.push(ComplianceFlag {
                kind: FlagKind::DeleteOperation,
                detail: "all delete operations are flagged for manual review".to_string(),
            });
        }

        flags
    }

    /// Evaluate a full handler result, extracting its transaction view if
    /// one is present. Non-transaction-shaped results yield no flags.
    pub fn evaluate_result(&self, action: ActionKind, result: &Value) -> Vec<ComplianceFlag> {
        match TransactionView::from_value(result) {
            Some(view) => self.evaluate(action, view.before, view.after, view.amount),
            None => Vec::new(),
        }
    }
}
