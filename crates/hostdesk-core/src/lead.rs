//! Lead scoring
//!
//! Estimates urgency and purchase intent from a single message. Six
//! indicators are always evaluated and each adds a fixed weight to the score.

use std::collections::BTreeMap;

use tracing::debug;

use crate::patterns;
use crate::types::{HistoryTurn, IndicatorValue, LeadSignal, LeadTier};

pub const WEIGHT_URGENCY: u32 = 1;
pub const WEIGHT_COMMITMENT: u32 = 2;
pub const WEIGHT_SPECIFIC_DATE: u32 = 2;
pub const WEIGHT_GUEST_COUNT: u32 = 2;
pub const WEIGHT_PRICE_INQUIRY: u32 = 1;
pub const WEIGHT_AVAILABILITY_INQUIRY: u32 = 1;

/// Sum of all indicator weights
pub const MAX_SCORE: u32 = WEIGHT_URGENCY
    + WEIGHT_COMMITMENT
    + WEIGHT_SPECIFIC_DATE
    + WEIGHT_GUEST_COUNT
    + WEIGHT_PRICE_INQUIRY
    + WEIGHT_AVAILABILITY_INQUIRY;

pub const HOT_THRESHOLD: u32 = 4;
pub const WARM_THRESHOLD: u32 = 2;

const URGENCY_WORDS: &[&str] = &[
    "urgent",
    "today",
    "tomorrow",
    "this week",
    "asap",
    "urgente",
    "hoje",
    "amanhã",
    "amanha",
    "esta semana",
    "essa semana",
];

const COMMITMENT_WORDS: &[&str] = &[
    "i want to book",
    "i'll book",
    "i will book",
    "go ahead and schedule",
    "quero reservar",
    "quero fechar",
    "vou reservar",
    "pode agendar",
];

const PRICE_WORDS: &[&str] = &[
    "price",
    "cost",
    "how much",
    "budget",
    "preço",
    "preco",
    "valor",
    "quanto custa",
    "orçamento",
    "orcamento",
];

const AVAILABILITY_WORDS: &[&str] = &[
    "available",
    "availability",
    "is it open",
    "disponível",
    "disponivel",
    "disponibilidade",
    "tem vaga",
];

impl LeadTier {
    /// Bucket a score: `>= 4` is hot, `>= 2` is warm, anything lower is cold
    pub fn from_score(score: u32) -> Self {
        if score >= HOT_THRESHOLD {
            Self::Hot
        } else if score >= WARM_THRESHOLD {
            Self::Warm
        } else {
            Self::Cold
        }
    }

    /// Notification trigger label for this tier
    pub fn trigger(&self) -> &'static str {
        match self {
            Self::Hot => "hot_lead",
            Self::Warm => "warm_lead",
            Self::Cold => "cold_lead",
        }
    }
}

/// Score one message. Pure: the same text always yields the same signal.
pub fn score_lead(text: &str) -> LeadSignal {
    let lower = text.to_lowercase();
    let mut score = 0;
    let mut indicators = BTreeMap::new();

    let mut flag = |key: &str, fired: bool, weight: u32| {
        if fired {
            score += weight;
        }
        indicators.insert(key.to_string(), IndicatorValue::Flag(fired));
    };

    flag(
        "urgency",
        patterns::contains_any(&lower, URGENCY_WORDS),
        WEIGHT_URGENCY,
    );
    flag(
        "commitment",
        patterns::contains_any(&lower, COMMITMENT_WORDS),
        WEIGHT_COMMITMENT,
    );
    flag(
        "price_inquiry",
        patterns::contains_any(&lower, PRICE_WORDS),
        WEIGHT_PRICE_INQUIRY,
    );
    flag(
        "availability_inquiry",
        patterns::contains_any(&lower, AVAILABILITY_WORDS),
        WEIGHT_AVAILABILITY_INQUIRY,
    );

    for (key, detected, weight) in [
        ("specific_date", patterns::find_date(text), WEIGHT_SPECIFIC_DATE),
        ("guest_count", patterns::find_guest_count(text), WEIGHT_GUEST_COUNT),
    ] {
        let value = match detected {
            Some(found) => {
                score += weight;
                IndicatorValue::Detected(found.to_string())
            }
            None => IndicatorValue::Flag(false),
        };
        indicators.insert(key.to_string(), value);
    }

    let tier = LeadTier::from_score(score);
    LeadSignal {
        score,
        tier,
        indicators,
        notify: tier == LeadTier::Hot,
    }
}

/// Lead scorer handle used by the dispatcher
#[derive(Debug, Clone, Copy, Default)]
pub struct LeadScorer;

impl LeadScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score a message. History is accepted but does not influence the score.
    pub fn score(&self, text: &str, _history: &[HistoryTurn]) -> LeadSignal {
        let signal = score_lead(text);
        debug!(
            "Lead score {} ({}), notify={}",
            signal.score, signal.tier, signal.notify
        );
        signal
    }
}
