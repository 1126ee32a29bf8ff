//! hostdesk-gateway: HTTP front door for the dispatcher
//!
//! Channel adapters (WhatsApp bridges, web widgets) post inbound messages
//! here and get the routing decision, the lead score and the agent's reply
//! back as JSON.

pub mod auth;
pub mod protocol;
pub mod server;

pub use server::{GatewayServer, GatewayState};
