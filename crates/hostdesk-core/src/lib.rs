//! hostdesk-core - intent routing and lead scoring for a venue front desk
//!
//! This crate provides:
//! - Intent classification (keyword rules, or a text-generation model with a rule fallback)
//! - Lead scoring with COLD / WARM / HOT tiers
//! - A registry of downstream agents and built-in booking, conversational and remote agents
//! - Hot-lead notifications delivered to an automation webhook
//! - A dispatcher that sequences all of the above for one inbound message

pub mod agents;
pub mod classifier;
pub mod dispatcher;
pub mod errors;
pub mod lead;
pub mod notifications;
pub mod patterns;
pub mod providers;
pub mod types;

// Re-export main types for convenience
pub use agents::{AgentHandler, BookingAgent, ConversationalAgent, HandlerRegistry, RemoteAgent};
pub use classifier::{Classifier, ClassifierConfig, classify_rules};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use errors::{ClassifyError, DispatchError};
pub use lead::{LeadScorer, score_lead};
pub use notifications::{
    NotificationPayload, Notifier, WebhookNotifier, format_report, format_summary_report,
};
pub use providers::{GoogleProvider, LlmProvider, OpenAiProvider};
pub use types::{
    ActionTag, AgentId, AgentReply, ClassifierStrategy, DispatchEnvelope, HistoryTurn,
    InboundMessage, LeadSignal, LeadTier, RoutingDecision,
};
