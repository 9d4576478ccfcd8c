//! Pricing capability: discount rules, dynamic recommendations, and
//! audited price updates.

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shopflow_core::{DomainHandler, HandlerError, HandlerKey};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Volume,
    Seasonal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingRule {
    pub rule_id: String,
    pub name: String,
    pub kind: RuleKind,
    /// Minimum quantity for volume rules.
    pub min_quantity: Option<u64>,
    /// Calendar months (1-12) a seasonal rule applies to.
    pub months: Option<Vec<u32>>,
    pub discount_percent: f64,
    pub active: bool,
}

impl PricingRule {
    fn applies(&self, quantity: u64, month: u32) -> bool {
        if !self.active {
            return false;
        }
        match self.kind {
            RuleKind::Volume => self.min_quantity.map(|min| quantity >= min).unwrap_or(false),
            RuleKind::Seasonal => self
                .months
                .as_ref()
                .map(|months| months.contains(&month))
                .unwrap_or(false),
        }
    }
}

struct PricingState {
    rules: BTreeMap<String, PricingRule>,
    base_prices: BTreeMap<String, f64>,
}

/// Pricing handler over seeded rules and base prices.
pub struct PricingHandler {
    state: RwLock<PricingState>,
}

impl Default for PricingHandler {
    fn default() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(
            "RULE001".to_string(),
            PricingRule {
                rule_id: "RULE001".to_string(),
                name: "Volume Discount".to_string(),
                kind: RuleKind::Volume,
                min_quantity: Some(10),
                months: None,
                discount_percent: 10.0,
                active: true,
            },
        );
        rules.insert(
            "RULE002".to_string(),
            PricingRule {
                rule_id: "RULE002".to_string(),
                name: "Summer Promotion".to_string(),
                kind: RuleKind::Seasonal,
                min_quantity: None,
                months: Some(vec![6, 7, 8]),
                discount_percent: 15.0,
                active: true,
            },
        );

        let base_prices = [("SKU001", 29.99), ("SKU002", 19.99), ("SKU003", 199.99)]
            .into_iter()
            .map(|(sku, price)| (sku.to_string(), price))
            .collect();

        Self {
            state: RwLock::new(PricingState { rules, base_prices }),
        }
    }
}

impl PricingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn calculate(&self, payload: &Value) -> Result<Value, HandlerError> {
        let sku = require_sku(payload)?;
        let quantity = payload.get("quantity").and_then(Value::as_u64).unwrap_or(1);

        let state = self.read_state()?;
        let base_price = *state
            .base_prices
            .get(sku)
            .ok_or_else(|| HandlerError::new(format!("SKU {sku} not found")))?;

        let month = Utc::now().month();
        let applicable: Vec<&PricingRule> = state
            .rules
            .values()
            .filter(|rule| rule.applies(quantity, month))
            .collect();
        let discount_percent = applicable
            .iter()
            .map(|rule| rule.discount_percent)
            .fold(0.0, f64::max);

        let unit_price = base_price * (1.0 - discount_percent / 100.0);
        let total_cost = unit_price * quantity as f64;

        Ok(json!({
            "status": "success",
            "data": {
                "sku": sku,
                "base_price": base_price,
                "quantity": quantity,
                "discount_percent": discount_percent,
                "unit_price_after_discount": unit_price,
                "total_cost": total_cost,
                "amount": total_cost,
                "savings": (base_price - unit_price) * quantity as f64,
                "applicable_rules": applicable.iter().map(|r| r.rule_id.clone()).collect::<Vec<_>>(),
            },
        }))
    }

    fn apply_discount(&self, payload: &Value) -> Result<Value, HandlerError> {
        let sku = require_sku(payload)?;
        let rule_id = payload
            .get("rule_id")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::new("rule_id required"))?;
        let quantity = payload.get("quantity").and_then(Value::as_u64).unwrap_or(1);

        let state = self.read_state()?;
        let rule = state
            .rules
            .get(rule_id)
            .ok_or_else(|| HandlerError::new(format!("rule {rule_id} not found")))?;
        if !rule.active {
            return Err(HandlerError::new(format!("rule {rule_id} is not active")));
        }

        let base_price = state.base_prices.get(sku).copied().unwrap_or(0.0);
        let discounted = base_price * (1.0 - rule.discount_percent / 100.0);

        Ok(json!({
            "status": "success",
            "data": {
                "sku": sku,
                "rule_id": rule.rule_id,
                "rule_name": rule.name,
                "base_price": base_price,
                "discount_percent": rule.discount_percent,
                "discounted_price": discounted,
                "quantity": quantity,
                "total_cost": discounted * quantity as f64,
            },
        }))
    }

    fn recommend(&self, payload: &Value) -> Result<Value, HandlerError> {
        let sku = require_sku(payload)?;
        let current_qty = payload
            .get("inventory")
            .and_then(|inv| inv.get(sku))
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let state = self.read_state()?;
        let base_price = *state
            .base_prices
            .get(sku)
            .ok_or_else(|| HandlerError::new(format!("SKU {sku} not found")))?;

        let (recommended, rationale) = if current_qty < 10 {
            (
                base_price * 1.15,
                "low stock: premium pricing to optimize revenue",
            )
        } else if current_qty > 100 {
            (
                base_price * 0.85,
                "high stock: discounted pricing to move inventory",
            )
        } else {
            (base_price, "normal pricing")
        };

        Ok(json!({
            "status": "success",
            "data": {
                "sku": sku,
                "current_price": base_price,
                "recommended_price": recommended,
                "price_change_percent": (recommended - base_price) / base_price * 100.0,
                "current_inventory": current_qty,
                "rationale": rationale,
            },
        }))
    }

    fn rules(&self) -> Result<Value, HandlerError> {
        let state = self.read_state()?;
        let rules: Vec<&PricingRule> = state.rules.values().collect();
        let count = rules.len();
        let active_count = rules.iter().filter(|r| r.active).count();

        Ok(json!({
            "status": "success",
            "data": {
                "rules": rules,
                "count": count,
                "active_count": active_count,
            },
        }))
    }

    /// Change a base price, reporting the before/after states so the
    /// transaction is visible to compliance checks.
    fn update_price(&self, payload: &Value) -> Result<Value, HandlerError> {
        let sku = require_sku(payload)?;
        let new_price = payload
            .get("price")
            .and_then(Value::as_f64)
            .ok_or_else(|| HandlerError::new("price required"))?;
        if new_price < 0.0 {
            return Err(HandlerError::new("price must be non-negative"));
        }

        let mut state = self.write_state()?;
        let entry = state
            .base_prices
            .get_mut(sku)
            .ok_or_else(|| HandlerError::new(format!("SKU {sku} not found")))?;

        let old_price = *entry;
        *entry = new_price;
        tracing::info!(sku, old_price, new_price, "base price changed");

        Ok(json!({
            "status": "success",
            "data": {
                "sku": sku,
                "before_state": { "price": old_price },
                "after_state": { "price": new_price },
                "updated_at": Utc::now(),
            },
        }))
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, PricingState>, HandlerError> {
        self.state
            .read()
            .map_err(|_| HandlerError::new("pricing lock poisoned"))
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, PricingState>, HandlerError> {
        self.state
            .write()
            .map_err(|_| HandlerError::new("pricing lock poisoned"))
    }
}

fn require_sku(payload: &Value) -> Result<&str, HandlerError> {
    payload
        .get("sku")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::new("sku required"))
}

#[async_trait]
impl DomainHandler for PricingHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::Pricing
    }

    async fn handle(&self, payload: Value) -> Result<Value, HandlerError> {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("calculate");

        match action {
            "calculate" => self.calculate(&payload),
            "apply_discount" => self.apply_discount(&payload),
            "recommend" => self.recommend(&payload),
            "rules" => self.rules(),
            "update_price" => self.update_price(&payload),
            other => Err(HandlerError::new(format!("unknown action '{other}'"))),
        }
    }
}
