//! Contextual routing: maps a request's page/category context onto an
//! ordered dispatch plan.
//!
//! Routing is a pure decision. It never consults external state and never
//! fails: contexts that match nothing fall through to the fan-out plan, so
//! every valid request produces some dispatch plan.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Keys identifying the registered domain handlers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerKey {
    CustomerService,
    Inventory,
    Pricing,
    Audit,
}

impl HandlerKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CustomerService => "customer-service",
            Self::Inventory => "inventory",
            Self::Pricing => "pricing",
            Self::Audit => "audit",
        }
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-handler dispatch or fan-out over every registered handler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    Single,
    FanOut,
}

/// Ordered list of handlers to invoke for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchPlan {
    pub mode: DispatchMode,
    pub handlers: Vec<HandlerKey>,
}

/// Priority table evaluated top-to-bottom; first substring match wins.
const CONTEXT_PRIORITY: &[(&str, HandlerKey)] = &[
    ("inventory", HandlerKey::Inventory),
    ("price", HandlerKey::Pricing),
    ("pricing", HandlerKey::Pricing),
    ("customer", HandlerKey::CustomerService),
    ("loyalty", HandlerKey::CustomerService),
    ("accounting", HandlerKey::Audit),
];

/// Fan-out order is fixed and deterministic.
pub const FAN_OUT_ORDER: [HandlerKey; 4] = [
    HandlerKey::CustomerService,
    HandlerKey::Inventory,
    HandlerKey::Pricing,
    HandlerKey::Audit,
];

/// Pure routing decision function.
#[derive(Debug, Clone, Copy, Default)]
pub struct Router;

impl Router {
    /// Compute the dispatch plan for a routing context.
    pub fn plan(context: &str) -> DispatchPlan {
        let lowered = context.to_ascii_lowercase();

        for (needle, key) in CONTEXT_PRIORITY {
            if lowered.contains(needle) {
                return DispatchPlan {
                    mode: DispatchMode::Single,
                    handlers: vec![*key],
                };
            }
        }

        DispatchPlan {
            mode: DispatchMode::FanOut,
            handlers: FAN_OUT_ORDER.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_categories_route_to_a_single_handler() {
        let plan = Router::plan("Inventory");
        assert_eq!(plan.mode, DispatchMode::Single);
        assert_eq!(plan.handlers, vec![HandlerKey::Inventory]);

        let plan = Router::plan("PricingPage");
        assert_eq!(plan.handlers, vec![HandlerKey::Pricing]);

        let plan = Router::plan("customer-support");
        assert_eq!(plan.handlers, vec![HandlerKey::CustomerService]);

        let plan = Router::plan("LOYALTY");
        assert_eq!(plan.handlers, vec![HandlerKey::CustomerService]);

        let plan = Router::plan("accounting");
        assert_eq!(plan.handlers, vec![HandlerKey::Audit]);
    }

    #[test]
    fn matching_is_case_insensitive_and_substring_based() {
        let plan = Router::plan("Warehouse Inventory Dashboard");
        assert_eq!(plan.handlers, vec![HandlerKey::Inventory]);
    }

    #[test]
    fn first_match_in_priority_order_wins() {
        // Contains both "inventory" and "price"; inventory sits higher.
        let plan = Router::plan("inventory-price-sync");
        assert_eq!(plan.handlers, vec![HandlerKey::Inventory]);
    }

    #[test]
    fn unmatched_context_falls_through_to_fan_out() {
        let plan = Router::plan("Analytics");
        assert_eq!(plan.mode, DispatchMode::FanOut);
        assert_eq!(plan.handlers, FAN_OUT_ORDER.to_vec());

        let empty = Router::plan("");
        assert_eq!(empty.mode, DispatchMode::FanOut);
        assert_eq!(empty.handlers.len(), 4);
    }
}
