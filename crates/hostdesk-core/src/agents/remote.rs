//! Remote agent: forwards routed messages to an agent service over HTTP

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::registry::AgentHandler;
use crate::types::{ActionTag, AgentId, AgentReply, HistoryTurn, InboundMessage};

#[derive(Debug, Serialize)]
struct RemoteRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<ActionTag>,
    sender_name: &'a str,
    sender_id: &'a str,
    history: &'a [HistoryTurn],
}

#[derive(Debug, Deserialize)]
struct RemoteResponse {
    text: Option<String>,
    response: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// Agent whose answers come from a separate HTTP service
pub struct RemoteAgent {
    id: AgentId,
    client: Client,
    url: String,
}

impl std::fmt::Debug for RemoteAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAgent")
            .field("id", &self.id)
            .field("url", &self.url)
            .finish()
    }
}

impl RemoteAgent {
    pub fn new(id: AgentId, url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            id,
            client,
            url: url.into(),
        })
    }

    fn parse_reply(&self, body: RemoteResponse) -> Result<AgentReply> {
        let text = body
            .text
            .or(body.response)
            .ok_or_else(|| anyhow!("{} reply has neither 'text' nor 'response'", self.id))?;
        Ok(AgentReply {
            agent: self.id,
            text,
            metadata: body.metadata,
        })
    }
}

#[async_trait]
impl AgentHandler for RemoteAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    async fn handle(&self, message: &InboundMessage, action: Option<ActionTag>) -> Result<AgentReply> {
        let request = RemoteRequest {
            message: &message.text,
            action,
            sender_name: &message.sender_display_name,
            sender_id: &message.sender_id,
            history: &message.conversation_history,
        };

        debug!("Forwarding message to {} at {}", self.id, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach {} at {}", self.id, self.url))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "{} request failed with status {}: {}",
                self.id,
                status,
                error_text
            ));
        }

        let body: RemoteResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} reply", self.id))?;

        self.parse_reply(body)
    }
}
