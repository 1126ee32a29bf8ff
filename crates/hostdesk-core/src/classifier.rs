//! Intent classification
//!
//! Decides which downstream agent should answer a customer message. Two
//! strategies are available: a keyword/pattern rule table (fast, free, always
//! available) and a model-based classifier that asks a text-generation
//! provider for a label. The rule table is the fallback for every failure of
//! the model path, so `classify` never fails.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::ClassifyError;
use crate::patterns::{self, SCHEDULING_KEYWORDS};
use crate::providers::{ChatMessage, LlmProvider};
use crate::types::{ActionTag, AgentId, ClassifierStrategy, HistoryTurn, RoutingDecision};

const CONFIDENCE_COMPLETE_BOOKING: f32 = 0.9;
const CONFIDENCE_BOOKING_INTEREST: f32 = 0.8;
const CONFIDENCE_GENERAL: f32 = 0.7;
const CONFIDENCE_MODEL_BOOKING: f32 = 0.9;
const CONFIDENCE_MODEL_GENERAL: f32 = 0.85;

/// Instruction sent with every model-based classification request
pub const MODEL_INSTRUCTION: &str = "You route customer messages for an event venue to the right agent.\n\
Reply with exactly one word, either booking_agent or general_agent.\n\
- booking_agent: the customer wants to book, reserve or schedule an event, or asks whether a date is available.\n\
- general_agent: greetings, prices, capacity, location, included services and anything else.";

/// Configuration for the classifier
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub strategy: ClassifierStrategy,
    /// Upper bound on a single model call before falling back to rules
    pub model_timeout: Duration,
    /// How many recent history turns are shown to the model
    pub history_window: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strategy: ClassifierStrategy::Rules,
            model_timeout: Duration::from_secs(15),
            history_window: 4,
        }
    }
}

/// Rule-based classification, evaluated in fixed priority order:
/// date + guest count, then any scheduling keyword, then general.
pub fn classify_rules(text: &str) -> RoutingDecision {
    let lower = text.to_lowercase();

    let has_date = patterns::find_date(&lower).is_some();
    let has_guest_count = patterns::find_guest_count(&lower).is_some();

    if has_date && has_guest_count {
        return RoutingDecision {
            target_agent: AgentId::BookingAgent,
            confidence: CONFIDENCE_COMPLETE_BOOKING,
            reasoning: "Customer provided an event date and a guest count".to_string(),
            action_tag: Some(ActionTag::CreateBooking),
            strategy: ClassifierStrategy::Rules,
        };
    }

    if let Some(keyword) = patterns::first_match(&lower, SCHEDULING_KEYWORDS) {
        return RoutingDecision {
            target_agent: AgentId::BookingAgent,
            confidence: CONFIDENCE_BOOKING_INTEREST,
            reasoning: format!("Customer showed interest in booking (matched '{}')", keyword),
            action_tag: Some(ActionTag::CheckInfo),
            strategy: ClassifierStrategy::Rules,
        };
    }

    RoutingDecision {
        target_agent: AgentId::GeneralAgent,
        confidence: CONFIDENCE_GENERAL,
        reasoning: "General enquiry or greeting".to_string(),
        action_tag: None,
        strategy: ClassifierStrategy::Rules,
    }
}

/// Map a model reply to an agent label.
///
/// Anything mentioning "booking" is the booking agent; any other non-blank
/// reply is the general agent. A blank reply cannot be interpreted.
pub fn parse_model_label(raw: &str) -> Result<AgentId, ClassifyError> {
    let label = raw.trim().to_lowercase();
    if label.is_empty() {
        return Err(ClassifyError::MalformedModelOutput(raw.to_string()));
    }
    if label.contains("booking") {
        Ok(AgentId::BookingAgent)
    } else {
        Ok(AgentId::GeneralAgent)
    }
}

/// Classifier with a configurable strategy and a transparent rule-based fallback
#[derive(Clone)]
pub struct Classifier {
    config: ClassifierConfig,
    provider: Option<Arc<dyn LlmProvider>>,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("config", &self.config)
            .field(
                "provider",
                &self.provider.as_ref().map(|p| format!("{}/{}", p.provider_name(), p.model())),
            )
            .finish()
    }
}

impl Classifier {
    pub fn new(config: ClassifierConfig, provider: Option<Arc<dyn LlmProvider>>) -> Self {
        if config.strategy == ClassifierStrategy::Model && provider.is_none() {
            warn!("Model-based classification requested but no provider is configured; using rules");
        }
        Self { config, provider }
    }

    /// A classifier that only ever uses the rule table
    pub fn rules_only() -> Self {
        Self {
            config: ClassifierConfig::default(),
            provider: None,
        }
    }

    /// Strategy that will be attempted first
    pub fn strategy(&self) -> ClassifierStrategy {
        match (self.config.strategy, &self.provider) {
            (ClassifierStrategy::Model, Some(_)) => ClassifierStrategy::Model,
            _ => ClassifierStrategy::Rules,
        }
    }

    /// Classify a message. Never fails: model errors fall back to the rule table.
    pub async fn classify(&self, text: &str, history: &[HistoryTurn]) -> RoutingDecision {
        if self.strategy() == ClassifierStrategy::Rules {
            let decision = classify_rules(text);
            debug!(
                "Rules classified message as {} ({:.2})",
                decision.target_agent, decision.confidence
            );
            return decision;
        }

        match self.classify_with_model(text, history).await {
            Ok(decision) => {
                debug!(
                    "Model classified message as {} ({:.2})",
                    decision.target_agent, decision.confidence
                );
                decision
            }
            Err(e) => {
                warn!("Model classification failed, using rules: {}", e);
                classify_rules(text)
            }
        }
    }

    async fn classify_with_model(
        &self,
        text: &str,
        history: &[HistoryTurn],
    ) -> Result<RoutingDecision, ClassifyError> {
        let provider = self.provider.as_ref().ok_or(ClassifyError::NoProvider)?;

        let prompt = build_model_prompt(text, history, self.config.history_window);
        let messages = [ChatMessage::user(prompt)];

        let response = tokio::time::timeout(
            self.config.model_timeout,
            provider.chat(&messages, MODEL_INSTRUCTION),
        )
        .await
        .map_err(|_| ClassifyError::Timeout(self.config.model_timeout))?
        .map_err(ClassifyError::Service)?;

        let agent = parse_model_label(&response.text)?;

        let (confidence, action_tag) = match agent {
            AgentId::BookingAgent => (CONFIDENCE_MODEL_BOOKING, Some(booking_action(text))),
            AgentId::GeneralAgent => (CONFIDENCE_MODEL_GENERAL, None),
        };

        Ok(RoutingDecision {
            target_agent: agent,
            confidence,
            reasoning: format!(
                "{} ({}) labelled the message '{}'",
                provider.provider_name(),
                provider.model(),
                response.text.trim()
            ),
            action_tag,
            strategy: ClassifierStrategy::Model,
        })
    }
}

/// Action for a model-chosen booking: complete details mean a booking can be created
fn booking_action(text: &str) -> ActionTag {
    let lower = text.to_lowercase();
    if patterns::find_date(&lower).is_some() && patterns::find_guest_count(&lower).is_some() {
        ActionTag::CreateBooking
    } else {
        ActionTag::CheckInfo
    }
}

fn build_model_prompt(text: &str, history: &[HistoryTurn], window: usize) -> String {
    let recent = &history[history.len().saturating_sub(window)..];
    if recent.is_empty() {
        return format!("Message: {}\n\nAgent:", text);
    }
    let transcript = recent
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Conversation so far:\n{}\n\nNew message: {}\n\nAgent:",
        transcript, text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ChatResponse;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::Mutex;

    enum Behaviour {
        Reply(&'static str),
        Fail,
        Hang,
    }

    struct MockProvider {
        behaviour: Behaviour,
        prompts: Mutex<Vec<String>>,
    }

    impl MockProvider {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        fn provider_name(&self) -> &str {
            "mock"
        }

        fn model(&self) -> &str {
            "mock-1"
        }

        async fn chat(&self, messages: &[ChatMessage], _system: &str) -> Result<ChatResponse> {
            self.prompts
                .lock()
                .unwrap()
                .push(messages[0].content.clone());
            match self.behaviour {
                Behaviour::Reply(text) => Ok(ChatResponse {
                    text: text.to_string(),
                    ..Default::default()
                }),
                Behaviour::Fail => Err(anyhow!("503 Service Unavailable")),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(ChatResponse::default())
                }
            }
        }
    }

    fn model_classifier(provider: Arc<MockProvider>) -> Classifier {
        Classifier::new(
            ClassifierConfig {
                strategy: ClassifierStrategy::Model,
                model_timeout: Duration::from_millis(50),
                history_window: 4,
            },
            Some(provider),
        )
    }

    const SAMPLES: &[&str] = &[
        "",
        "Hi, what's the price?",
        "I want to book for 12/25, 100 guests, it's urgent!",
        "Is the hall available next month?",
        "Quero reservar para o dia 20, festa de 80 pessoas",
        "Where are you located?",
        "bom dia",
        "Do you have parking for 50 guests?",
    ];

    #[test]
    fn test_rules_date_and_guests_creates_booking() {
        for text in [
            "Party on 12/25 for 100 guests",
            "dia 14, 60 pessoas",
            "we are 30 people, day 3",
            "Festa 20/12 com 100 convidados",
        ] {
            let d = classify_rules(text);
            assert_eq!(d.target_agent, AgentId::BookingAgent, "{text}");
            assert_eq!(d.action_tag, Some(ActionTag::CreateBooking), "{text}");
            assert_eq!(d.confidence, 0.9, "{text}");
        }
    }

    #[test]
    fn test_rules_keyword_checks_info() {
        let d = classify_rules("I'd like to reserve the hall");
        assert_eq!(d.target_agent, AgentId::BookingAgent);
        assert_eq!(d.action_tag, Some(ActionTag::CheckInfo));
        assert_eq!(d.confidence, 0.8);
        assert!(d.reasoning.contains("reserve"));
    }

    #[test]
    fn test_rules_date_alone_is_not_complete() {
        // A date without a guest count and without a keyword is general
        let d = classify_rules("What about 12/25?");
        assert_eq!(d.target_agent, AgentId::GeneralAgent);
    }

    #[test]
    fn test_rules_general_fallthrough() {
        for text in ["Hello!", "Hi, what's the price?", "Where are you located?", ""] {
            let d = classify_rules(text);
            assert_eq!(d.target_agent, AgentId::GeneralAgent, "{text}");
            assert_eq!(d.confidence, 0.7, "{text}");
            assert_eq!(d.action_tag, None, "{text}");
            assert_eq!(d.strategy, ClassifierStrategy::Rules);
        }
    }

    #[test]
    fn test_rules_case_insensitive() {
        let d = classify_rules("CAN I BOOK?");
        assert_eq!(d.target_agent, AgentId::BookingAgent);
    }

    #[test]
    fn test_parse_model_label() {
        assert_eq!(parse_model_label("booking_agent").unwrap(), AgentId::BookingAgent);
        assert_eq!(parse_model_label("  BOOKING_AGENT\n").unwrap(), AgentId::BookingAgent);
        assert_eq!(parse_model_label("general_agent").unwrap(), AgentId::GeneralAgent);
        assert_eq!(parse_model_label("maria").unwrap(), AgentId::GeneralAgent);
        assert!(matches!(
            parse_model_label("  \n"),
            Err(ClassifyError::MalformedModelOutput(_))
        ));
    }

    #[test]
    fn test_build_model_prompt_windows_history() {
        let history: Vec<HistoryTurn> = (0..6)
            .map(|i| HistoryTurn::user(format!("turn {}", i)))
            .collect();
        let prompt = build_model_prompt("new", &history, 4);
        assert!(!prompt.contains("turn 1"));
        assert!(prompt.contains("turn 2"));
        assert!(prompt.contains("turn 5"));
        assert!(prompt.contains("New message: new"));

        let bare = build_model_prompt("hello", &[], 4);
        assert_eq!(bare, "Message: hello\n\nAgent:");
    }

    #[tokio::test]
    async fn test_rules_strategy_never_calls_provider() {
        let provider = MockProvider::new(Behaviour::Reply("booking_agent"));
        let classifier = Classifier::new(ClassifierConfig::default(), Some(provider.clone()));
        let d = classifier.classify("Hello", &[]).await;
        assert_eq!(d.target_agent, AgentId::GeneralAgent);
        assert!(provider.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_model_booking_label() {
        let provider = MockProvider::new(Behaviour::Reply("booking_agent"));
        let classifier = model_classifier(provider);
        let d = classifier.classify("Is the hall free in March?", &[]).await;
        assert_eq!(d.target_agent, AgentId::BookingAgent);
        assert_eq!(d.confidence, 0.9);
        assert_eq!(d.action_tag, Some(ActionTag::CheckInfo));
        assert_eq!(d.strategy, ClassifierStrategy::Model);
    }

    #[tokio::test]
    async fn test_model_booking_with_full_details_creates_booking() {
        let provider = MockProvider::new(Behaviour::Reply("Booking"));
        let classifier = model_classifier(provider);
        let d = classifier.classify("12/25, 100 guests", &[]).await;
        assert_eq!(d.action_tag, Some(ActionTag::CreateBooking));
    }

    #[tokio::test]
    async fn test_model_general_label() {
        let provider = MockProvider::new(Behaviour::Reply("general_agent"));
        let classifier = model_classifier(provider);
        let d = classifier.classify("I want to book", &[]).await;
        assert_eq!(d.target_agent, AgentId::GeneralAgent);
        assert_eq!(d.confidence, 0.85);
        assert_eq!(d.action_tag, None);
    }

    #[tokio::test]
    async fn test_model_sees_history() {
        let provider = MockProvider::new(Behaviour::Reply("general_agent"));
        let classifier = model_classifier(provider.clone());
        let history = vec![HistoryTurn::user("oi"), HistoryTurn::assistant("Olá! Como posso ajudar?")];
        classifier.classify("e o preço?", &history).await;
        let prompts = provider.prompts.lock().unwrap();
        assert!(prompts[0].contains("assistant: Olá! Como posso ajudar?"));
    }

    #[tokio::test]
    async fn test_fallback_is_transparent_on_service_failure() {
        let classifier = model_classifier(MockProvider::new(Behaviour::Fail));
        for text in SAMPLES {
            assert_eq!(classifier.classify(text, &[]).await, classify_rules(text), "{text}");
        }
    }

    #[tokio::test]
    async fn test_fallback_on_malformed_output() {
        let classifier = model_classifier(MockProvider::new(Behaviour::Reply("   ")));
        for text in SAMPLES {
            assert_eq!(classifier.classify(text, &[]).await, classify_rules(text), "{text}");
        }
    }

    #[tokio::test]
    async fn test_fallback_on_timeout() {
        let classifier = model_classifier(MockProvider::new(Behaviour::Hang));
        let text = "I want to book for 12/25, 100 guests";
        assert_eq!(classifier.classify(text, &[]).await, classify_rules(text));
    }

    #[tokio::test]
    async fn test_model_strategy_without_provider_uses_rules() {
        let classifier = Classifier::new(
            ClassifierConfig {
                strategy: ClassifierStrategy::Model,
                ..Default::default()
            },
            None,
        );
        assert_eq!(classifier.strategy(), ClassifierStrategy::Rules);
        let d = classifier.classify("reservar", &[]).await;
        assert_eq!(d, classify_rules("reservar"));
    }
}
