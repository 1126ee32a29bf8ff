//! Handler registry: maps agent ids to the handlers that answer for them

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::types::{ActionTag, AgentId, AgentReply, InboundMessage};

/// A downstream agent that can answer a routed message
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Which agent this handler answers for
    fn id(&self) -> AgentId;

    async fn handle(&self, message: &InboundMessage, action: Option<ActionTag>) -> Result<AgentReply>;
}

/// Registry of agent handlers, built once at startup and shared by `Arc`
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<AgentId, Arc<dyn AgentHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its own id, replacing any previous one
    pub fn register(&mut self, handler: Arc<dyn AgentHandler>) {
        let id = handler.id();
        if self.handlers.insert(id, handler).is_some() {
            warn!("Replacing existing handler for agent '{}'", id);
        } else {
            debug!("Registered handler for agent '{}'", id);
        }
    }

    /// Builder-style registration
    pub fn with(mut self, handler: Arc<dyn AgentHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, id: AgentId) -> Option<Arc<dyn AgentHandler>> {
        self.handlers.get(&id).cloned()
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.handlers.contains_key(&id)
    }

    /// Registered agent ids, in stable order
    pub fn ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self.handlers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Known agents that the classifier may target but that have no handler
    pub fn missing(&self) -> Vec<AgentId> {
        AgentId::ALL
            .into_iter()
            .filter(|id| !self.handlers.contains_key(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoAgent(AgentId);

    #[async_trait]
    impl AgentHandler for EchoAgent {
        fn id(&self) -> AgentId {
            self.0
        }

        async fn handle(&self, message: &InboundMessage, _action: Option<ActionTag>) -> Result<AgentReply> {
            Ok(AgentReply::text(self.0, message.text.clone()))
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.missing(), AgentId::ALL.to_vec());
        assert!(registry.get(AgentId::GeneralAgent).is_none());
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = HandlerRegistry::new().with(Arc::new(EchoAgent(AgentId::GeneralAgent)));
        assert!(registry.contains(AgentId::GeneralAgent));
        assert!(!registry.contains(AgentId::BookingAgent));
        assert_eq!(registry.ids(), vec![AgentId::GeneralAgent]);
        assert_eq!(registry.missing(), vec![AgentId::BookingAgent]);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(EchoAgent(AgentId::BookingAgent)));
        registry.register(Arc::new(EchoAgent(AgentId::BookingAgent)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_handler_invocation() {
        let registry = HandlerRegistry::new().with(Arc::new(EchoAgent(AgentId::GeneralAgent)));
        let handler = registry.get(AgentId::GeneralAgent).unwrap();
        let reply = handler.handle(&InboundMessage::new("hello"), None).await.unwrap();
        assert_eq!(reply.text, "hello");
        assert_eq!(reply.agent, AgentId::GeneralAgent);
    }
}
