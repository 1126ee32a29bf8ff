//! Booking agent: extracts event details and collects what is still missing

use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::registry::AgentHandler;
use crate::patterns;
use crate::types::{ActionTag, AgentId, AgentReply, InboundMessage};

/// day/month with an optional year (`25/12`, `25-12-2025`, `12/25/25`)
static FULL_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})[/\-](\d{1,2})(?:[/\-](\d{2,4}))?")
        .expect("FULL_DATE_RE regex should compile")
});

const DEFAULT_EVENT_TIME: &str = "18:00";
const DEFAULT_EVENT_TYPE: &str = "party";

const TIME_OF_DAY: &[(&[&str], &str)] = &[
    (&["morning", "manhã", "manha"], "09:00"),
    (&["afternoon", "tarde"], "14:00"),
    (&["evening", "night", "noite"], "19:00"),
];

const EVENT_TYPES: &[(&[&str], &str)] = &[
    (&["birthday", "aniversário", "aniversario"], "birthday"),
    (&["wedding", "casamento"], "wedding"),
    (&["graduation", "formatura"], "graduation"),
    (&["kids", "children", "infantil"], "kids party"),
];

/// Booking details extracted from one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDraft {
    pub customer_name: String,
    pub customer_phone: String,
    pub event_date: Option<NaiveDate>,
    pub event_time: String,
    pub guest_count: Option<u32>,
    pub event_type: String,
    pub notes: String,
}

impl BookingDraft {
    /// Extract a draft from the message. Dates are read day-first and fall
    /// back to month-first when day-first is not a valid calendar date.
    pub fn extract(message: &InboundMessage, default_year: i32) -> Self {
        let lower = message.text.to_lowercase();

        let event_time = TIME_OF_DAY
            .iter()
            .find(|(words, _)| patterns::contains_any(&lower, words))
            .map_or(DEFAULT_EVENT_TIME, |(_, time)| *time);

        let event_type = EVENT_TYPES
            .iter()
            .find(|(words, _)| patterns::contains_any(&lower, words))
            .map_or(DEFAULT_EVENT_TYPE, |(_, kind)| *kind);

        Self {
            customer_name: message.sender_display_name.clone(),
            customer_phone: message.sender_phone().to_string(),
            event_date: parse_event_date(&lower, default_year),
            event_time: event_time.to_string(),
            guest_count: parse_guest_count(&lower),
            event_type: event_type.to_string(),
            notes: message.text.clone(),
        }
    }

    /// Human-readable names of the required fields that are still missing
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.event_date.is_none() {
            missing.push("event date");
        }
        if self.guest_count.is_none() {
            missing.push("number of guests");
        }
        missing
    }
}

fn parse_event_date(text: &str, default_year: i32) -> Option<NaiveDate> {
    let caps = FULL_DATE_RE.captures(text)?;
    let first: u32 = caps.get(1)?.as_str().parse().ok()?;
    let second: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year = match caps.get(3) {
        Some(y) => {
            let y: i32 = y.as_str().parse().ok()?;
            if y < 100 { 2000 + y } else { y }
        }
        None => default_year,
    };
    NaiveDate::from_ymd_opt(year, second, first)
        .or_else(|| NaiveDate::from_ymd_opt(year, first, second))
}

fn parse_guest_count(text: &str) -> Option<u32> {
    let token = patterns::find_guest_count(text)?;
    let digits: String = token.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Handles booking intent: asks for missing details or summarises the request
pub struct BookingAgent {
    id: AgentId,
    default_year: i32,
}

impl Default for BookingAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingAgent {
    pub fn new() -> Self {
        Self {
            id: AgentId::BookingAgent,
            default_year: Utc::now().year(),
        }
    }

    /// Answer under a different agent id
    pub fn with_id(mut self, id: AgentId) -> Self {
        self.id = id;
        self
    }

    /// Year assumed when the customer gives only day and month
    pub fn with_default_year(mut self, year: i32) -> Self {
        self.default_year = year;
        self
    }

    fn ask_for_details(missing: &[&str]) -> String {
        format!(
            "Great! To confirm your booking I still need a few details:\n\n- {}\n\nCould you send me that? 😊",
            missing.join("\n- ")
        )
    }

    fn summarise(draft: &BookingDraft) -> String {
        let date = draft
            .event_date
            .map_or_else(|| "to be confirmed".to_string(), |d| d.format("%Y-%m-%d").to_string());
        let guests = draft
            .guest_count
            .map_or_else(|| "to be confirmed".to_string(), |n| format!("{} people", n));
        format!(
            "✅ Booking request received!\n\n\
             📅 Date: {}\n\
             ⏰ Time: {}\n\
             👥 Guests: {}\n\
             🎉 Event: {}\n\n\
             We'll be in touch shortly to confirm the details and send the contract. 📄",
            date, draft.event_time, guests, draft.event_type
        )
    }
}

#[async_trait]
impl AgentHandler for BookingAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    async fn handle(&self, message: &InboundMessage, action: Option<ActionTag>) -> Result<AgentReply> {
        let draft = BookingDraft::extract(message, self.default_year);
        let missing = draft.missing();
        let action = action.unwrap_or(ActionTag::CheckInfo);
        debug!(
            "Booking draft for {}: date={:?} guests={:?} missing={:?}",
            draft.customer_name, draft.event_date, draft.guest_count, missing
        );

        let (text, complete) = if !missing.is_empty() && action != ActionTag::CreateBooking {
            (Self::ask_for_details(&missing), false)
        } else {
            (Self::summarise(&draft), true)
        };

        Ok(AgentReply {
            agent: self.id,
            text,
            metadata: json!({
                "action": action,
                "request_complete": complete,
                "missing": missing,
                "draft": draft,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> BookingAgent {
        BookingAgent::new().with_default_year(2025)
    }

    fn draft(text: &str) -> BookingDraft {
        BookingDraft::extract(&InboundMessage::new(text), 2025)
    }

    #[test]
    fn test_date_day_first() {
        assert_eq!(draft("festa 20/12").event_date, NaiveDate::from_ymd_opt(2025, 12, 20));
        assert_eq!(draft("on 5-3-26").event_date, NaiveDate::from_ymd_opt(2026, 3, 5));
        assert_eq!(draft("on 5/3/2027").event_date, NaiveDate::from_ymd_opt(2027, 3, 5));
    }

    #[test]
    fn test_date_month_first_fallback() {
        assert_eq!(draft("on 12/25").event_date, NaiveDate::from_ymd_opt(2025, 12, 25));
    }

    #[test]
    fn test_invalid_or_absent_date() {
        assert_eq!(draft("on 40/40").event_date, None);
        assert_eq!(draft("sometime soon").event_date, None);
    }

    #[test]
    fn test_guest_count() {
        assert_eq!(draft("100 guests").guest_count, Some(100));
        assert_eq!(draft("uns 80 convidados").guest_count, Some(80));
        assert_eq!(draft("a lot of people").guest_count, None);
    }

    #[test]
    fn test_time_and_type() {
        let d = draft("Wedding in the afternoon");
        assert_eq!(d.event_time, "14:00");
        assert_eq!(d.event_type, "wedding");

        let d = draft("festa infantil de manhã");
        assert_eq!(d.event_time, "09:00");
        assert_eq!(d.event_type, "kids party");

        let d = draft("just a get-together");
        assert_eq!(d.event_time, DEFAULT_EVENT_TIME);
        assert_eq!(d.event_type, DEFAULT_EVENT_TYPE);
    }

    #[test]
    fn test_sender_fields() {
        let msg = InboundMessage::new("hi").with_sender("Ana", "5531999990000@s.whatsapp.net");
        let d = BookingDraft::extract(&msg, 2025);
        assert_eq!(d.customer_name, "Ana");
        assert_eq!(d.customer_phone, "5531999990000");
    }

    #[tokio::test]
    async fn test_asks_for_missing_details() {
        let reply = agent()
            .handle(&InboundMessage::new("I'd like to book the hall"), Some(ActionTag::CheckInfo))
            .await
            .unwrap();
        assert_eq!(reply.agent, AgentId::BookingAgent);
        assert!(reply.text.contains("- event date"));
        assert!(reply.text.contains("- number of guests"));
        assert_eq!(reply.metadata["request_complete"], false);
        assert_eq!(reply.metadata["action"], "check_info");
    }

    #[tokio::test]
    async fn test_complete_request_is_summarised() {
        let reply = agent()
            .handle(
                &InboundMessage::new("Birthday on 12/25 for 100 guests, evening"),
                Some(ActionTag::CreateBooking),
            )
            .await
            .unwrap();
        assert!(reply.text.contains("2025-12-25"));
        assert!(reply.text.contains("19:00"));
        assert!(reply.text.contains("100 people"));
        assert!(reply.text.contains("birthday"));
        assert_eq!(reply.metadata["request_complete"], true);
        assert_eq!(reply.metadata["draft"]["event_date"], "2025-12-25");
        assert_eq!(reply.metadata["draft"]["guest_count"], 100);
    }

    #[tokio::test]
    async fn test_create_booking_with_gaps_still_summarises() {
        let reply = agent()
            .handle(&InboundMessage::new("dia 20, 80 pessoas"), Some(ActionTag::CreateBooking))
            .await
            .unwrap();
        assert!(reply.text.contains("Date: to be confirmed"));
        assert_eq!(reply.metadata["missing"][0], "event date");
    }

    #[tokio::test]
    async fn test_with_id() {
        let agent = agent().with_id(AgentId::GeneralAgent);
        assert_eq!(agent.id(), AgentId::GeneralAgent);
        let reply = agent.handle(&InboundMessage::new("oi"), None).await.unwrap();
        assert_eq!(reply.agent, AgentId::GeneralAgent);
    }
}
