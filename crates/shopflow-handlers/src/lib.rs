//! Reference domain handlers for the shopflow task router.
//!
//! Each handler is an opaque capability provider behind the core's
//! [`DomainHandler`] trait: the controller routes payloads to them and
//! audits every call, but their business rules stay on this side of the
//! boundary.

#![deny(unsafe_code)]

pub mod audit;
pub mod customer;
pub mod inventory;
pub mod pricing;

pub use audit::AuditReportHandler;
pub use customer::{Customer, CustomerServiceHandler, Interaction};
pub use inventory::{InventoryHandler, InventoryItem};
pub use pricing::{PricingHandler, PricingRule, RuleKind};

use shopflow_core::{ComplianceConfig, HandlerRegistry};
use std::sync::Arc;

/// Build a registry with all four reference handlers registered.
pub fn default_registry(compliance: ComplianceConfig) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(CustomerServiceHandler::new()));
    registry.register(Arc::new(InventoryHandler::new()));
    registry.register(Arc::new(PricingHandler::new()));
    registry.register(Arc::new(AuditReportHandler::new(compliance)));
    registry
}
