//! Error kinds surfaced by classification and dispatch

use thiserror::Error;

use crate::types::AgentId;

/// Failure of the model-based classification path.
///
/// Never escapes [`crate::classifier::Classifier::classify`]: every variant
/// triggers the rule-based fallback.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("no text-generation provider configured")]
    NoProvider,
    #[error("text-generation call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("text-generation service failed: {0:#}")]
    Service(#[source] anyhow::Error),
    #[error("model output is not an agent label: {0:?}")]
    MalformedModelOutput(String),
}

/// Errors returned by [`crate::dispatcher::Dispatcher::dispatch`]
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The classifier chose an agent that has no registered handler
    #[error("no handler registered for agent '{0}'")]
    UnregisteredAgent(AgentId),
    /// The chosen handler ran and failed
    #[error("agent '{agent}' failed to respond: {source:#}")]
    Handler {
        agent: AgentId,
        #[source]
        source: anyhow::Error,
    },
    #[error("dispatch cancelled")]
    Cancelled,
}

impl DispatchError {
    /// True for the one fatal routing condition (target agent not registered)
    pub fn is_routing_error(&self) -> bool {
        matches!(self, Self::UnregisteredAgent(_))
    }

    /// Agent this error concerns, if any
    pub fn agent(&self) -> Option<AgentId> {
        match self {
            Self::UnregisteredAgent(agent) | Self::Handler { agent, .. } => Some(*agent),
            Self::Cancelled => None,
        }
    }

    /// Stable machine-readable code for transport layers
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnregisteredAgent(_) => "unregistered_agent",
            Self::Handler { .. } => "agent_unavailable",
            Self::Cancelled => "cancelled",
        }
    }

    /// Suggested HTTP status for transport layers
    pub fn http_status_hint(&self) -> u16 {
        match self {
            Self::UnregisteredAgent(_) => 500,
            Self::Handler { .. } => 502,
            Self::Cancelled => 503,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_agent_names_target() {
        let err = DispatchError::UnregisteredAgent(AgentId::BookingAgent);
        assert!(err.is_routing_error());
        assert!(err.to_string().contains("booking_agent"));
        assert_eq!(err.agent(), Some(AgentId::BookingAgent));
        assert_eq!(err.code(), "unregistered_agent");
        assert_eq!(err.http_status_hint(), 500);
    }

    #[test]
    fn test_handler_error_is_not_routing_error() {
        let err = DispatchError::Handler {
            agent: AgentId::GeneralAgent,
            source: anyhow::anyhow!("connection refused"),
        };
        assert!(!err.is_routing_error());
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.http_status_hint(), 502);
    }

    #[test]
    fn test_cancelled() {
        let err = DispatchError::Cancelled;
        assert_eq!(err.agent(), None);
        assert_eq!(err.code(), "cancelled");
    }

    #[test]
    fn test_classify_error_display() {
        let err = ClassifyError::MalformedModelOutput("   ".into());
        assert!(err.to_string().contains("not an agent label"));
        let err = ClassifyError::Service(anyhow::anyhow!("503 Service Unavailable"));
        assert!(err.to_string().contains("503"));
    }
}
