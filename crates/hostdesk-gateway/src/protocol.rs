//! Gateway HTTP protocol: JSON bodies exchanged with channel adapters

use hostdesk_core::{
    ActionTag, AgentId, AgentReply, DispatchEnvelope, InboundMessage, LeadSignal, RoutingDecision,
};
use serde::{Deserialize, Serialize};

/// Reply text used when the chosen agent failed; internal errors are only logged
pub const AGENT_UNAVAILABLE_MESSAGE: &str = "The agent is currently unable to respond.";

// ── Error codes ──

pub const ERR_INVALID_REQUEST: &str = "invalid_request";
pub const ERR_UNAUTHORIZED: &str = "unauthorized";
pub const ERR_UNKNOWN_AGENT: &str = "unknown_agent";
pub const ERR_UNREGISTERED_AGENT: &str = "unregistered_agent";
pub const ERR_AGENT_UNAVAILABLE: &str = "agent_unavailable";
pub const ERR_CANCELLED: &str = "cancelled";

/// `POST /api/classify` response: routing and lead score, no agent call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub request_id: String,
    pub routing: RoutingDecision,
    pub lead: LeadSignal,
}

/// `POST /api/dispatch` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub request_id: String,
    #[serde(flatten)]
    pub envelope: DispatchEnvelope,
}

/// `POST /api/agents/{id}/run` request: the message plus an optional action for the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAgentRequest {
    #[serde(flatten)]
    pub message: InboundMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionTag>,
}

/// `POST /api/agents/{id}/run` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAgentResponse {
    pub request_id: String,
    pub reply: AgentReply,
}

/// One entry of `GET /api/agents`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub id: AgentId,
    pub registered: bool,
}

/// Error body returned with every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub error: ApiError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentId>,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            request_id: None,
            error: ApiError {
                code: code.to_string(),
                message: message.into(),
                agent: None,
            },
        }
    }

    pub fn with_agent(mut self, agent: Option<AgentId>) -> Self {
        self.error.agent = agent;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}
