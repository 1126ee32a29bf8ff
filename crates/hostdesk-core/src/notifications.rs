//! Lead notifications
//!
//! When a message scores as a hot lead, the dispatcher hands a
//! [`NotificationPayload`] to a [`Notifier`]. The built-in
//! [`WebhookNotifier`] formats a plain-text lead report and posts it to an
//! automation webhook that relays it to the venue's phone. With a summariser
//! attached, a text-generation provider writes the body of the report; any
//! failure there falls back to the plain transcript.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::providers::{ChatMessage, LlmProvider};
use crate::types::{AgentId, AgentReply, HistoryTurn, InboundMessage, LeadSignal};

/// Path appended to the webhook base URL
pub const REPORT_PATH: &str = "/webhook/send-report";

const MAX_TURN_CHARS: usize = 500;

/// Instruction sent with every summary request
pub const SUMMARY_INSTRUCTION: &str = "You write concise reports of customer service conversations for an event venue.\n\
Write a structured report containing:\n\
1. Conversation summary\n\
2. Customer interest (low/medium/high)\n\
3. Suggested next steps\n\
4. Information collected (date, number of guests, event type)\n\
5. Status (new lead, booking pending, confirmed, gave up)\n\
Be objective and professional.";

/// Everything the venue needs to follow up on a lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub sender_name: String,
    pub sender_id: String,
    pub sender_phone: String,
    /// Prior history, then the inbound message, then the reply just produced
    pub conversation: Vec<HistoryTurn>,
    pub trigger: String,
    pub lead: LeadSignal,
    pub routed_to: AgentId,
    pub created_at: DateTime<Utc>,
}

impl NotificationPayload {
    pub fn compose(message: &InboundMessage, reply: &AgentReply, lead: &LeadSignal) -> Self {
        let mut conversation = message.conversation_history.clone();
        conversation.push(HistoryTurn::user(message.text.clone()));
        conversation.push(HistoryTurn::assistant(reply.text.clone()));

        Self {
            sender_name: message.sender_display_name.clone(),
            sender_id: message.sender_id.clone(),
            sender_phone: message.sender_phone().to_string(),
            conversation,
            trigger: lead.tier.trigger().to_string(),
            lead: lead.clone(),
            routed_to: reply.agent,
            created_at: Utc::now(),
        }
    }
}

/// Something that can deliver a lead notification.
///
/// `Ok(false)` means the notification was attempted but not accepted.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, payload: &NotificationPayload) -> Result<bool>;
}

/// Format a payload into the plain-text lead report sent to the venue
pub fn format_report(payload: &NotificationPayload) -> String {
    format!("{}\n\nCONVERSATION:\n{}", report_header(payload), transcript(payload))
}

/// Same header as [`format_report`], with a model-written summary as the body
pub fn format_summary_report(payload: &NotificationPayload, summary: &str) -> String {
    format!("{}\n\n{}", report_header(payload), summary.trim())
}

/// User prompt asking a provider to summarise the conversation
pub fn build_summary_prompt(payload: &NotificationPayload) -> String {
    format!(
        "Analyse this conversation and write a report:\n\n\
         CUSTOMER: {} ({})\n\
         REASON: {}\n\n\
         CONVERSATION:\n{}\n\n\
         Write the structured report.",
        payload.sender_name,
        display_phone(payload),
        payload.trigger,
        transcript(payload)
    )
}

fn display_phone(payload: &NotificationPayload) -> &str {
    if payload.sender_phone.is_empty() {
        "not provided"
    } else {
        payload.sender_phone.as_str()
    }
}

fn transcript(payload: &NotificationPayload) -> String {
    payload
        .conversation
        .iter()
        .map(|t| format!("{}: {}", t.role, truncate(&t.content, MAX_TURN_CHARS)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn report_header(payload: &NotificationPayload) -> String {
    let fired: Vec<&str> = payload
        .lead
        .indicators
        .iter()
        .filter(|(_, v)| v.fired())
        .map(|(k, _)| k.as_str())
        .collect();
    let fired = if fired.is_empty() {
        "none".to_string()
    } else {
        fired.join(", ")
    };

    format!(
        "LEAD REPORT\n\n\
         👤 Customer: {}\n\
         📱 Phone: {}\n\
         ⏰ Time: {}\n\
         🔔 Trigger: {}\n\
         📈 Score: {} ({})\n\
         ✅ Indicators: {}\n\
         🤖 Answered by: {}",
        payload.sender_name,
        display_phone(payload),
        payload.created_at.format("%d/%m/%Y %H:%M"),
        payload.trigger,
        payload.lead.score,
        payload.lead.tier,
        fired,
        payload.routed_to
    )
}

/// Posts lead reports to `<base>/webhook/send-report`
pub struct WebhookNotifier {
    client: Client,
    url: String,
    phone: String,
    summarizer: Option<Summarizer>,
}

struct Summarizer {
    provider: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &self.url)
            .field(
                "summarizer",
                &self
                    .summarizer
                    .as_ref()
                    .map(|s| format!("{}/{}", s.provider.provider_name(), s.provider.model())),
            )
            .finish()
    }
}

impl WebhookNotifier {
    /// `phone` is the venue number the report is relayed to
    pub fn new(webhook_base: &str, phone: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: format!("{}{}", webhook_base.trim_end_matches('/'), REPORT_PATH),
            phone: phone.into(),
            summarizer: None,
        })
    }

    /// Have `provider` write the report body, giving up after `timeout`
    pub fn with_summarizer(mut self, provider: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        self.summarizer = Some(Summarizer { provider, timeout });
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Summary report when a summariser is attached and answers, plain report otherwise
    pub async fn compose_report(&self, payload: &NotificationPayload) -> String {
        let Some(summarizer) = &self.summarizer else {
            return format_report(payload);
        };

        match summarizer.summarize(payload).await {
            Ok(summary) => format_summary_report(payload, &summary),
            Err(e) => {
                warn!("Lead summary failed, sending plain report: {:#}", e);
                format_report(payload)
            }
        }
    }

    fn body(&self, payload: &NotificationPayload, report: &str) -> serde_json::Value {
        serde_json::json!({
            "phone": self.phone,
            "message": report,
            "timestamp": payload.created_at.to_rfc3339(),
        })
    }
}

impl Summarizer {
    async fn summarize(&self, payload: &NotificationPayload) -> Result<String> {
        let messages = [ChatMessage::user(build_summary_prompt(payload))];
        let response = tokio::time::timeout(
            self.timeout,
            self.provider.chat(&messages, SUMMARY_INSTRUCTION),
        )
        .await
        .map_err(|_| anyhow!("timed out after {:?}", self.timeout))??;

        if response.text.trim().is_empty() {
            bail!("{} returned an empty summary", self.provider.provider_name());
        }
        debug!("Lead summary written by {}", self.provider.model());
        Ok(response.text)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, payload: &NotificationPayload) -> Result<bool> {
        let report = self.compose_report(payload).await;
        let response = self
            .client
            .post(&self.url)
            .json(&self.body(payload, &report))
            .send()
            .await
            .context("Failed to send lead report")?;

        let status = response.status();
        if status.is_success() {
            debug!("Lead report for {} delivered", payload.sender_name);
            Ok(true)
        } else {
            warn!("Lead report webhook answered {}", status);
            Ok(false)
        }
    }
}

fn truncate(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        s
    } else {
        let mut end = max_len;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}
