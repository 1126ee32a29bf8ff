//! Shared types for hostdesk-core

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Who produced a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry of the conversation history (most recent last)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

impl HistoryTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

fn default_sender_name() -> String {
    "Customer".to_string()
}

/// A customer message as received from a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_sender_name")]
    pub sender_display_name: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub conversation_history: Vec<HistoryTurn>,
}

impl InboundMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender_display_name: default_sender_name(),
            sender_id: String::new(),
            conversation_history: Vec::new(),
        }
    }

    pub fn with_sender(mut self, display_name: impl Into<String>, id: impl Into<String>) -> Self {
        self.sender_display_name = display_name.into();
        self.sender_id = id.into();
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.conversation_history = history;
        self
    }

    /// Phone-like part of the sender id (WhatsApp ids look like `5511999999999@s.whatsapp.net`)
    pub fn sender_phone(&self) -> &str {
        self.sender_id
            .split_once('@')
            .map_or(self.sender_id.as_str(), |(phone, _)| phone)
    }
}

/// The statically known set of downstream agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    BookingAgent,
    GeneralAgent,
}

impl AgentId {
    pub const ALL: [AgentId; 2] = [AgentId::BookingAgent, AgentId::GeneralAgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BookingAgent => "booking_agent",
            Self::GeneralAgent => "general_agent",
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known agent
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown agent '{0}' (expected one of: booking_agent, general_agent)")]
pub struct UnknownAgentName(pub String);

impl FromStr for AgentId {
    type Err = UnknownAgentName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "booking_agent" => Ok(Self::BookingAgent),
            "general_agent" => Ok(Self::GeneralAgent),
            other => Err(UnknownAgentName(other.to_string())),
        }
    }
}

/// Follow-up action attached to a routing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTag {
    CreateBooking,
    CheckInfo,
}

impl ActionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateBooking => "create_booking",
            Self::CheckInfo => "check_info",
        }
    }
}

impl std::fmt::Display for ActionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which classification strategy is configured (or actually produced a decision)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierStrategy {
    #[default]
    Rules,
    Model,
}

impl std::fmt::Display for ClassifierStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rules => write!(f, "rules"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// Where a message should go, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub target_agent: AgentId,
    /// Always within `[0, 1]`
    pub confidence: f32,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_tag: Option<ActionTag>,
    #[serde(default)]
    pub strategy: ClassifierStrategy,
}

/// Urgency bucket derived from a lead score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LeadTier {
    Cold,
    Warm,
    Hot,
}

impl std::fmt::Display for LeadTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cold => write!(f, "COLD"),
            Self::Warm => write!(f, "WARM"),
            Self::Hot => write!(f, "HOT"),
        }
    }
}

/// Result of a single lead indicator: a flag, or the text that was detected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndicatorValue {
    Flag(bool),
    Detected(String),
}

impl IndicatorValue {
    pub fn fired(&self) -> bool {
        match self {
            Self::Flag(b) => *b,
            Self::Detected(_) => true,
        }
    }
}

/// Urgency / purchase-intent estimate for one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadSignal {
    pub score: u32,
    pub tier: LeadTier,
    pub indicators: BTreeMap<String, IndicatorValue>,
    pub notify: bool,
}

/// What a downstream agent answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    pub agent: AgentId,
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl AgentReply {
    pub fn text(agent: AgentId, text: impl Into<String>) -> Self {
        Self {
            agent,
            text: text.into(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// Combined result of one dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEnvelope {
    pub primary_response: AgentReply,
    pub routing: RoutingDecision,
    pub lead: LeadSignal,
    pub notified: bool,
}
