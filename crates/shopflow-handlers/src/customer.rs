//! Customer-service capability: profiles, support tickets, loyalty
//! points, and tier-based recommendations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shopflow_core::{DomainHandler, HandlerError, HandlerKey};
use std::collections::BTreeMap;
use std::sync::RwLock;

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "horrible", "problem", "issue", "broken",
];
const POSITIVE_WORDS: &[&str] = &["great", "excellent", "amazing", "love", "perfect"];

/// Dollar value of one redeemed loyalty point.
const POINT_VALUE: f64 = 0.01;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub loyalty_points: f64,
    pub total_purchases: f64,
    pub lifetime_value: f64,
    pub preferences: BTreeMap<String, bool>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub interaction_id: String,
    pub customer_id: String,
    pub interaction_type: String,
    pub subject: String,
    pub message: String,
    pub sentiment: String,
    pub created_at: DateTime<Utc>,
}

struct CustomerState {
    customers: BTreeMap<String, Customer>,
    interactions: Vec<Interaction>,
}

/// Customer-service handler over seeded customer profiles.
pub struct CustomerServiceHandler {
    state: RwLock<CustomerState>,
}

impl Default for CustomerServiceHandler {
    fn default() -> Self {
        let now = Utc::now();
        let mut customers = BTreeMap::new();
        customers.insert(
            "CUST001".to_string(),
            Customer {
                customer_id: "CUST001".to_string(),
                name: "John Smith".to_string(),
                email: "john@example.com".to_string(),
                phone: "555-0001".to_string(),
                loyalty_points: 1250.0,
                total_purchases: 5000.0,
                lifetime_value: 5000.0,
                preferences: BTreeMap::from([
                    ("newsletter".to_string(), true),
                    ("sms_alerts".to_string(), false),
                ]),
                created_at: now,
            },
        );
        customers.insert(
            "CUST002".to_string(),
            Customer {
                customer_id: "CUST002".to_string(),
                name: "Jane Doe".to_string(),
                email: "jane@example.com".to_string(),
                phone: "555-0002".to_string(),
                loyalty_points: 3450.0,
                total_purchases: 12500.0,
                lifetime_value: 12500.0,
                preferences: BTreeMap::from([
                    ("newsletter".to_string(), true),
                    ("sms_alerts".to_string(), true),
                ]),
                created_at: now,
            },
        );

        Self {
            state: RwLock::new(CustomerState {
                customers,
                interactions: Vec::new(),
            }),
        }
    }
}

impl CustomerServiceHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn query_customer(&self, payload: &Value) -> Result<Value, HandlerError> {
        let state = self.read_state()?;

        let customer = if let Some(id) = payload.get("customer_id").and_then(Value::as_str) {
            state.customers.get(id)
        } else if let Some(email) = payload.get("email").and_then(Value::as_str) {
            state.customers.values().find(|c| c.email == email)
        } else {
            None
        };

        let customer = customer.ok_or_else(|| HandlerError::new("customer not found"))?;
        Ok(json!({
            "status": "success",
            "data": customer,
        }))
    }

    fn create_ticket(&self, payload: &Value) -> Result<Value, HandlerError> {
        let customer_id = payload
            .get("customer_id")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::new("customer_id required"))?;
        let subject = payload
            .get("subject")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::new("subject and message required"))?;
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::new("subject and message required"))?;
        let interaction_type = payload
            .get("interaction_type")
            .and_then(Value::as_str)
            .unwrap_or("chat");

        let mut state = self.write_state()?;
        if !state.customers.contains_key(customer_id) {
            return Err(HandlerError::new(format!(
                "customer {customer_id} not found"
            )));
        }

        let sentiment = classify_sentiment(message);
        let interaction_id = format!("TICKET_{:06}", state.interactions.len() + 1);
        let created_at = Utc::now();

        state.interactions.push(Interaction {
            interaction_id: interaction_id.clone(),
            customer_id: customer_id.to_string(),
            interaction_type: interaction_type.to_string(),
            subject: subject.to_string(),
            message: message.to_string(),
            sentiment: sentiment.to_string(),
            created_at,
        });

        Ok(json!({
            "status": "success",
            "data": {
                "ticket_id": interaction_id,
                "customer_id": customer_id,
                "created_at": created_at,
                "sentiment": sentiment,
                "auto_response": auto_response(sentiment, subject),
                "requires_escalation": sentiment == "negative",
            },
        }))
    }

    fn recommendations(&self, payload: &Value) -> Result<Value, HandlerError> {
        let customer_id = payload
            .get("customer_id")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::new("customer_id required"))?;

        let state = self.read_state()?;
        let customer = state
            .customers
            .get(customer_id)
            .ok_or_else(|| HandlerError::new(format!("customer {customer_id} not found")))?;

        let recommendations = if customer.lifetime_value > 10_000.0 {
            json!([{
                "sku": "SKU001",
                "product": "Widget Pro",
                "reason": "premium tier customer preference",
                "discount": 15,
            }])
        } else {
            json!([{
                "sku": "SKU002",
                "product": "Gadget Lite",
                "reason": "popular entry-level product",
                "discount": 10,
            }])
        };

        Ok(json!({
            "status": "success",
            "data": {
                "customer_id": customer_id,
                "customer_tier": tier(customer.lifetime_value),
                "recommendations": recommendations,
            },
        }))
    }

    fn loyalty(&self, payload: &Value) -> Result<Value, HandlerError> {
        let customer_id = payload
            .get("customer_id")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::new("customer_id required"))?;
        let operation = payload
            .get("operation")
            .and_then(Value::as_str)
            .unwrap_or("check");
        let points = payload.get("points").and_then(Value::as_f64).unwrap_or(0.0);

        let mut state = self.write_state()?;
        let customer = state
            .customers
            .get_mut(customer_id)
            .ok_or_else(|| HandlerError::new(format!("customer {customer_id} not found")))?;

        match operation {
            "check" => Ok(json!({
                "status": "success",
                "data": {
                    "customer_id": customer_id,
                    "loyalty_points": customer.loyalty_points,
                    "tier": tier(customer.lifetime_value),
                    "points_to_next_tier": points_to_next_tier(customer.lifetime_value),
                },
            })),
            "add" => {
                customer.loyalty_points += points;
                Ok(json!({
                    "status": "success",
                    "data": {
                        "customer_id": customer_id,
                        "points_added": points,
                        "total_loyalty_points": customer.loyalty_points,
                        "updated_at": Utc::now(),
                    },
                }))
            }
            "redeem" => {
                if customer.loyalty_points < points {
                    return Err(HandlerError::new(format!(
                        "insufficient points, available: {}",
                        customer.loyalty_points
                    )));
                }
                customer.loyalty_points -= points;
                Ok(json!({
                    "status": "success",
                    "data": {
                        "customer_id": customer_id,
                        "points_redeemed": points,
                        "remaining_points": customer.loyalty_points,
                        "reward_value": points * POINT_VALUE,
                    },
                }))
            }
            other => Err(HandlerError::new(format!(
                "unknown loyalty operation '{other}'"
            ))),
        }
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, CustomerState>, HandlerError> {
        self.state
            .read()
            .map_err(|_| HandlerError::new("customer lock poisoned"))
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, CustomerState>, HandlerError> {
        self.state
            .write()
            .map_err(|_| HandlerError::new("customer lock poisoned"))
    }
}

fn classify_sentiment(message: &str) -> &'static str {
    let lowered = message.to_ascii_lowercase();
    let negatives = NEGATIVE_WORDS
        .iter()
        .filter(|word| lowered.contains(*word))
        .count();
    let positives = POSITIVE_WORDS
        .iter()
        .filter(|word| lowered.contains(*word))
        .count();

    if negatives > positives {
        "negative"
    } else if positives > negatives {
        "positive"
    } else {
        "neutral"
    }
}

fn auto_response(sentiment: &str, subject: &str) -> String {
    match sentiment {
        "negative" => format!(
            "We sincerely apologize for the issue with your {subject}. \
             Our support team will prioritize your ticket for immediate resolution."
        ),
        "positive" => format!(
            "Thank you for your positive feedback on {subject}! \
             We're thrilled you're satisfied with your experience."
        ),
        _ => format!(
            "Thank you for reaching out about {subject}. \
             We're here to help and will respond shortly."
        ),
    }
}

fn tier(lifetime_value: f64) -> &'static str {
    if lifetime_value > 10_000.0 {
        "Platinum"
    } else if lifetime_value > 5_000.0 {
        "Gold"
    } else {
        "Silver"
    }
}

fn points_to_next_tier(lifetime_value: f64) -> f64 {
    if lifetime_value < 5_000.0 {
        5_000.0 - lifetime_value
    } else if lifetime_value < 10_000.0 {
        10_000.0 - lifetime_value
    } else {
        0.0
    }
}

#[async_trait]
impl DomainHandler for CustomerServiceHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::CustomerService
    }

    async fn handle(&self, payload: Value) -> Result<Value, HandlerError> {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("query_customer");

        match action {
            "query_customer" => self.query_customer(&payload),
            "create_ticket" => self.create_ticket(&payload),
            "get_recommendations" => self.recommendations(&payload),
            "loyalty" => self.loyalty(&payload),
            other => Err(HandlerError::new(format!("unknown action '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn query_by_id_and_email_find_the_same_customer() {
        let handler = CustomerServiceHandler::new();

        let by_id = handler
            .handle(json!({"action": "query_customer", "customer_id": "CUST001"}))
            .await
            .unwrap();
        let by_email = handler
            .handle(json!({"action": "query_customer", "email": "john@example.com"}))
            .await
            .unwrap();

        assert_eq!(by_id["data"]["customer_id"], by_email["data"]["customer_id"]);
    }

    #[tokio::test]
    async fn negative_tickets_request_escalation() {
        let handler = CustomerServiceHandler::new();
        let result = handler
            .handle(json!({
                "action": "create_ticket",
                "customer_id": "CUST001",
                "subject": "order 42",
                "message": "this is terrible, the item arrived broken"
            }))
            .await
            .unwrap();

        assert_eq!(result["data"]["sentiment"], "negative");
        assert_eq!(result["data"]["requires_escalation"], true);
        assert_eq!(result["data"]["ticket_id"], "TICKET_000001");
    }

    #[tokio::test]
    async fn loyalty_redeem_enforces_balance() {
        let handler = CustomerServiceHandler::new();

        let err = handler
            .handle(json!({
                "action": "loyalty",
                "customer_id": "CUST001",
                "operation": "redeem",
                "points": 99999.0
            }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("insufficient points"));

        let ok = handler
            .handle(json!({
                "action": "loyalty",
                "customer_id": "CUST001",
                "operation": "redeem",
                "points": 250.0
            }))
            .await
            .unwrap();
        assert_eq!(ok["data"]["remaining_points"], 1000.0);
        assert_eq!(ok["data"]["reward_value"], 2.5);
    }

    #[tokio::test]
    async fn recommendations_follow_customer_tier() {
        let handler = CustomerServiceHandler::new();

        let platinum = handler
            .handle(json!({"action": "get_recommendations", "customer_id": "CUST002"}))
            .await
            .unwrap();
        assert_eq!(platinum["data"]["customer_tier"], "Platinum");
        assert_eq!(platinum["data"]["recommendations"][0]["sku"], "SKU001");

        let silver = handler
            .handle(json!({"action": "get_recommendations", "customer_id": "CUST001"}))
            .await
            .unwrap();
        assert_eq!(silver["data"]["customer_tier"], "Silver");
    }

    #[tokio::test]
    async fn unknown_customer_fails() {
        let handler = CustomerServiceHandler::new();
        let err = handler
            .handle(json!({"action": "loyalty", "customer_id": "CUST999"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("CUST999"));
    }
}
