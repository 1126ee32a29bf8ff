//! General-purpose conversational agent backed by a text-generation provider

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::registry::AgentHandler;
use crate::providers::{ChatMessage, LlmProvider};
use crate::types::{ActionTag, AgentId, AgentReply, InboundMessage};

/// Persona used when no custom prompt is configured
pub const DEFAULT_PERSONA: &str = "You are the virtual host of an event venue.\n\
\n\
PERSONALITY:\n\
- Warm, friendly and welcoming\n\
- Asks questions to understand what the customer needs\n\
- Offers relevant information proactively\n\
\n\
GUIDELINES:\n\
1. Qualify the lead: ask about the type of event, the date and the number of guests\n\
2. Offer a visit to the venue when appropriate\n\
3. If the customer asks about availability, say that you need to check\n\
4. Stay positive and natural, never robotic";

/// Answers greetings, prices, capacity and everything that is not a booking
pub struct ConversationalAgent {
    id: AgentId,
    provider: Arc<dyn LlmProvider>,
    persona: String,
    history_window: usize,
}

impl ConversationalAgent {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            id: AgentId::GeneralAgent,
            provider,
            persona: DEFAULT_PERSONA.to_string(),
            history_window: 4,
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn with_history_window(mut self, turns: usize) -> Self {
        self.history_window = turns;
        self
    }

    /// Answer under a different agent id
    pub fn with_id(mut self, id: AgentId) -> Self {
        self.id = id;
        self
    }

    fn build_messages(&self, message: &InboundMessage) -> Vec<ChatMessage> {
        let history = &message.conversation_history;
        let recent = &history[history.len().saturating_sub(self.history_window)..];

        let mut messages: Vec<ChatMessage> = recent.iter().map(ChatMessage::from).collect();
        messages.push(ChatMessage::user(format!(
            "[Customer: {}]\n\n{}",
            message.sender_display_name, message.text
        )));
        messages
    }
}

#[async_trait]
impl AgentHandler for ConversationalAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    async fn handle(&self, message: &InboundMessage, _action: Option<ActionTag>) -> Result<AgentReply> {
        let messages = self.build_messages(message);
        debug!(
            "{} answering {} with {} messages",
            self.id,
            message.sender_display_name,
            messages.len()
        );

        let response = self
            .provider
            .chat(&messages, &self.persona)
            .await
            .with_context(|| format!("{} request failed", self.provider.provider_name()))?;

        let text = response.text.trim();
        if text.is_empty() {
            return Err(anyhow!("{} returned an empty reply", self.provider.provider_name()));
        }

        Ok(AgentReply {
            agent: self.id,
            text: text.to_string(),
            metadata: json!({
                "provider": self.provider.provider_name(),
                "model": self.provider.model(),
                "input_tokens": response.usage.input_tokens,
                "output_tokens": response.usage.output_tokens,
            }),
        })
    }
}
