//! Downstream agents
//!
//! Each agent implements [`AgentHandler`] and is registered once at startup
//! in a [`HandlerRegistry`], keyed by the [`AgentId`](crate::types::AgentId)
//! it answers for. The dispatcher only ever looks handlers up by id.

pub mod booking;
pub mod conversational;
pub mod registry;
pub mod remote;

pub use booking::{BookingAgent, BookingDraft};
pub use conversational::{ConversationalAgent, DEFAULT_PERSONA};
pub use registry::{AgentHandler, HandlerRegistry};
pub use remote::RemoteAgent;
