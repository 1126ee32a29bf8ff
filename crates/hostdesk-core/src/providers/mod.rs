//! Text-generation providers
//!
//! Supports OpenAI (and any OpenAI-compatible endpoint) and Google Gemini.
//! Providers implement the [`LlmProvider`] trait; the classifier and the
//! conversational agent only ever see `Arc<dyn LlmProvider>`.

pub mod google;
pub mod openai;
pub mod types;

pub use google::GoogleProvider;
pub use openai::OpenAiProvider;
pub use types::{ChatMessage, ChatResponse, ChatRole, ChatUsage, LlmProvider};
