use crate::error::HandlerError;
use crate::router::HandlerKey;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Pluggable domain capability provider.
///
/// Handlers own their payload and result shapes; the core treats both as
/// opaque structured values and maps any failure to a terminal task state.
#[async_trait]
pub trait DomainHandler: Send + Sync {
    fn key(&self) -> HandlerKey;

    async fn handle(&self, payload: Value) -> Result<Value, HandlerError>;
}

/// Registry mapping routing keys to handler capabilities.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKey, Arc<dyn DomainHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its own key. Re-registration replaces.
    pub fn register(&mut self, handler: Arc<dyn DomainHandler>) {
        self.handlers.insert(handler.key(), handler);
    }

    pub fn get(&self, key: HandlerKey) -> Option<Arc<dyn DomainHandler>> {
        self.handlers.get(&key).cloned()
    }

    pub fn has(&self, key: HandlerKey) -> bool {
        self.handlers.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
