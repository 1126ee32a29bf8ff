//! Dispatcher: classify, score, answer, and notify
//!
//! For every inbound message the dispatcher runs the classifier and the lead
//! scorer concurrently, invokes the handler registered for the chosen agent,
//! and, for hot leads, hands a report to the notifier. Notification problems
//! never fail a dispatch; a missing handler always does.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agents::HandlerRegistry;
use crate::classifier::Classifier;
use crate::errors::DispatchError;
use crate::lead::LeadScorer;
use crate::notifications::{NotificationPayload, Notifier};
use crate::types::{
    ActionTag, AgentId, AgentReply, DispatchEnvelope, InboundMessage, LeadSignal, RoutingDecision,
};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound on a single notification attempt
    pub notify_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            notify_timeout: Duration::from_secs(10),
        }
    }
}

pub struct Dispatcher {
    classifier: Classifier,
    scorer: LeadScorer,
    registry: Arc<HandlerRegistry>,
    notifier: Option<Arc<dyn Notifier>>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        classifier: Classifier,
        scorer: LeadScorer,
        registry: Arc<HandlerRegistry>,
        notifier: Option<Arc<dyn Notifier>>,
        config: DispatcherConfig,
    ) -> Self {
        for missing in registry.missing() {
            warn!("No handler registered for '{}'; messages routed there will fail", missing);
        }
        Self {
            classifier,
            scorer,
            registry,
            notifier,
            config,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn has_notifier(&self) -> bool {
        self.notifier.is_some()
    }

    /// Classify and score without invoking any handler
    pub async fn route(&self, message: &InboundMessage) -> (RoutingDecision, LeadSignal) {
        let history = &message.conversation_history;
        let classify = self.classifier.classify(&message.text, history);
        let score = async { self.scorer.score(&message.text, history) };
        tokio::join!(classify, score)
    }

    /// Full dispatch of one message
    pub async fn dispatch(&self, message: &InboundMessage) -> Result<DispatchEnvelope, DispatchError> {
        let (routing, lead) = self.route(message).await;

        let agent = routing.target_agent;
        debug!(
            "Dispatching to {} (confidence {:.2}, action {:?})",
            agent, routing.confidence, routing.action_tag
        );

        let reply = self.run_agent(agent, message, routing.action_tag).await?;

        let notified = if lead.notify {
            self.send_notification(message, &reply, &lead).await
        } else {
            false
        };

        info!(
            "Dispatched message from {} to {} (lead {} {}, notified={})",
            message.sender_display_name, agent, lead.score, lead.tier, notified
        );

        Ok(DispatchEnvelope {
            primary_response: reply,
            routing,
            lead,
            notified,
        })
    }

    /// Invoke one agent directly, skipping classification, scoring and notification
    pub async fn run_agent(
        &self,
        agent: AgentId,
        message: &InboundMessage,
        action: Option<ActionTag>,
    ) -> Result<AgentReply, DispatchError> {
        let handler = self
            .registry
            .get(agent)
            .ok_or(DispatchError::UnregisteredAgent(agent))?;

        handler
            .handle(message, action)
            .await
            .map_err(|source| DispatchError::Handler { agent, source })
    }

    /// Like [`dispatch`](Self::dispatch), but abandons in-flight work once `cancel` fires
    pub async fn dispatch_with_cancel(
        &self,
        message: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<DispatchEnvelope, DispatchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Dispatch for {} cancelled", message.sender_display_name);
                Err(DispatchError::Cancelled)
            }
            result = self.dispatch(message) => result,
        }
    }

    async fn send_notification(&self, message: &InboundMessage, reply: &AgentReply, lead: &LeadSignal) -> bool {
        let Some(notifier) = &self.notifier else {
            debug!("Hot lead but no notifier configured");
            return false;
        };

        let payload = NotificationPayload::compose(message, reply, lead);
        match tokio::time::timeout(self.config.notify_timeout, notifier.notify(&payload)).await {
            Ok(Ok(true)) => true,
            Ok(Ok(false)) => {
                warn!("Lead notification for {} was not accepted", payload.sender_name);
                false
            }
            Ok(Err(e)) => {
                warn!("Lead notification for {} failed: {:#}", payload.sender_name, e);
                false
            }
            Err(_) => {
                warn!(
                    "Lead notification for {} timed out after {:?}",
                    payload.sender_name, self.config.notify_timeout
                );
                false
            }
        }
    }
}
