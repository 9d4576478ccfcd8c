//! Inventory capability: stock queries, quantity updates, demand
//! forecasts, and reorder checks over a seeded catalog.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shopflow_core::{DomainHandler, HandlerError, HandlerKey};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Assumed daily sell-through rate used by the forecast heuristic.
const DAILY_DEMAND_RATE: f64 = 2.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub sku: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub warehouse_location: String,
    pub last_updated: DateTime<Utc>,
}

/// In-memory inventory handler seeded with a small product catalog.
pub struct InventoryHandler {
    items: RwLock<BTreeMap<String, InventoryItem>>,
}

impl Default for InventoryHandler {
    fn default() -> Self {
        let now = Utc::now();
        let seed = [
            ("SKU001", "Widget Pro", 150, 29.99, "A-01-01"),
            ("SKU002", "Gadget Lite", 45, 19.99, "B-02-03"),
            ("SKU003", "Device Max", 5, 199.99, "C-01-05"),
        ];

        let items = seed
            .into_iter()
            .map(|(sku, name, quantity, unit_price, location)| {
                (
                    sku.to_string(),
                    InventoryItem {
                        sku: sku.to_string(),
                        product_name: name.to_string(),
                        quantity,
                        unit_price,
                        warehouse_location: location.to_string(),
                        last_updated: now,
                    },
                )
            })
            .collect();

        Self {
            items: RwLock::new(items),
        }
    }
}

impl InventoryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn query(&self, payload: &Value) -> Result<Value, HandlerError> {
        let items = self.read_items()?;

        if let Some(sku) = payload.get("sku").and_then(Value::as_str) {
            let item = items
                .get(sku)
                .ok_or_else(|| HandlerError::new(format!("SKU {sku} not found")))?;
            return Ok(json!({
                "status": "success",
                "data": item,
            }));
        }

        let all: Vec<&InventoryItem> = items.values().collect();
        let count = all.len();
        Ok(json!({
            "status": "success",
            "data": all,
            "count": count,
        }))
    }

    fn update(&self, payload: &Value) -> Result<Value, HandlerError> {
        let sku = payload
            .get("sku")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::new("sku and quantity required"))?;
        let quantity = payload
            .get("quantity")
            .and_then(Value::as_i64)
            .ok_or_else(|| HandlerError::new("sku and quantity required"))?;
        let operation = payload
            .get("operation")
            .and_then(Value::as_str)
            .unwrap_or("set");

        let mut items = self.write_items()?;
        let item = items
            .get_mut(sku)
            .ok_or_else(|| HandlerError::new(format!("SKU {sku} not found")))?;

        let old_quantity = item.quantity;
        item.quantity = match operation {
            "set" => quantity,
            "add" => item.quantity + quantity,
            "subtract" => (item.quantity - quantity).max(0),
            other => return Err(HandlerError::new(format!("unknown operation '{other}'"))),
        };
        item.last_updated = Utc::now();
        tracing::debug!(sku, operation, old_quantity, new_quantity = item.quantity, "stock adjusted");

        Ok(json!({
            "status": "success",
            "data": {
                "sku": sku,
                "operation": operation,
                "before_state": { "quantity": old_quantity },
                "after_state": { "quantity": item.quantity },
                "updated_at": item.last_updated,
            },
        }))
    }

    fn forecast(&self, payload: &Value) -> Result<Value, HandlerError> {
        let sku = payload
            .get("sku")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::new("SKU not specified"))?;
        let horizon_days = payload
            .get("horizon_days")
            .and_then(Value::as_i64)
            .unwrap_or(30);

        let items = self.read_items()?;
        let item = items
            .get(sku)
            .ok_or_else(|| HandlerError::new(format!("SKU {sku} not found")))?;

        let estimated_remaining =
            (item.quantity as f64 - DAILY_DEMAND_RATE * horizon_days as f64).max(0.0);
        let days_until_stockout = (item.quantity as f64 / DAILY_DEMAND_RATE) as i64;

        Ok(json!({
            "status": "success",
            "data": {
                "sku": sku,
                "product_name": item.product_name,
                "current_quantity": item.quantity,
                "forecast_horizon_days": horizon_days,
                "estimated_remaining": estimated_remaining,
                "days_until_stockout": days_until_stockout,
            },
        }))
    }

    fn reorder_check(&self, payload: &Value) -> Result<Value, HandlerError> {
        let threshold = payload
            .get("threshold")
            .and_then(Value::as_i64)
            .unwrap_or(50);

        let items = self.read_items()?;
        let needing_reorder: Vec<Value> = items
            .values()
            .filter(|item| item.quantity < threshold)
            .map(|item| {
                json!({
                    "sku": item.sku,
                    "product_name": item.product_name,
                    "current_quantity": item.quantity,
                    "recommended_order_qty": threshold * 3,
                })
            })
            .collect();

        let count = needing_reorder.len();
        Ok(json!({
            "status": "success",
            "data": {
                "threshold": threshold,
                "items_needing_reorder": needing_reorder,
                "count": count,
            },
        }))
    }

    fn read_items(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, InventoryItem>>, HandlerError>
    {
        self.items
            .read()
            .map_err(|_| HandlerError::new("inventory lock poisoned"))
    }

    fn write_items(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, InventoryItem>>, HandlerError>
    {
        self.items
            .write()
            .map_err(|_| HandlerError::new("inventory lock poisoned"))
    }
}

#[async_trait]
impl DomainHandler for InventoryHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::Inventory
    }

    async fn handle(&self, payload: Value) -> Result<Value, HandlerError> {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("query");

        match action {
            "query" => self.query(&payload),
            "update" => self.update(&payload),
            "forecast" => self.forecast(&payload),
            "reorder" => self.reorder_check(&payload),
            other => Err(HandlerError::new(format!("unknown action '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn query_by_sku_returns_the_item() {
        let handler = InventoryHandler::new();
        let result = handler
            .handle(json!({"action": "query", "sku": "SKU001"}))
            .await
            .unwrap();
        assert_eq!(result["data"]["product_name"], "Widget Pro");
        assert_eq!(result["data"]["quantity"], 150);
    }

    #[tokio::test]
    async fn query_without_sku_lists_everything() {
        let handler = InventoryHandler::new();
        let result = handler.handle(json!({"action": "query"})).await.unwrap();
        assert_eq!(result["count"], 3);
    }

    #[tokio::test]
    async fn update_returns_before_and_after_snapshots() {
        let handler = InventoryHandler::new();
        let result = handler
            .handle(json!({
                "action": "update",
                "sku": "SKU002",
                "quantity": 10,
                "operation": "subtract"
            }))
            .await
            .unwrap();

        assert_eq!(result["data"]["before_state"]["quantity"], 45);
        assert_eq!(result["data"]["after_state"]["quantity"], 35);

        // Subtract never drives quantity negative.
        let result = handler
            .handle(json!({
                "action": "update",
                "sku": "SKU002",
                "quantity": 1000,
                "operation": "subtract"
            }))
            .await
            .unwrap();
        assert_eq!(result["data"]["after_state"]["quantity"], 0);
    }

    #[tokio::test]
    async fn unknown_sku_fails() {
        let handler = InventoryHandler::new();
        let err = handler
            .handle(json!({"action": "query", "sku": "SKU999"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("SKU999"));
    }

    #[tokio::test]
    async fn reorder_check_lists_low_stock_items() {
        let handler = InventoryHandler::new();
        let result = handler.handle(json!({"action": "reorder"})).await.unwrap();
        // SKU002 (45) and SKU003 (5) sit below the default threshold of 50.
        assert_eq!(result["data"]["count"], 2);
    }

    #[tokio::test]
    async fn forecast_projects_stockout() {
        let handler = InventoryHandler::new();
        let result = handler
            .handle(json!({"action": "forecast", "sku": "SKU003", "horizon_days": 10}))
            .await
            .unwrap();
        assert_eq!(result["data"]["estimated_remaining"], 0.0);
        assert_eq!(result["data"]["days_until_stockout"], 2);
    }

    #[tokio::test]
    async fn unknown_action_fails() {
        let handler = InventoryHandler::new();
        let err = handler
            .handle(json!({"action": "teleport"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown action"));
    }
}
