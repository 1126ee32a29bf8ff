use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use hostdesk_core::agents::{BookingAgent, ConversationalAgent, RemoteAgent};
use hostdesk_core::providers::openai::DEFAULT_OPENAI_BASE_URL;
use hostdesk_core::{
    AgentId, Classifier, ClassifierConfig, ClassifierStrategy, Dispatcher, DispatcherConfig,
    GoogleProvider, HandlerRegistry, LeadScorer, LlmProvider, Notifier, OpenAiProvider,
    WebhookNotifier,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostdeskConfig {
    #[serde(default)]
    pub classifier: ClassifierSection,
    #[serde(default)]
    pub provider: Option<ProviderConfig>,
    #[serde(default = "default_agents")]
    pub agents: BTreeMap<String, AgentConfig>,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

// ── Classifier ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSection {
    #[serde(default)]
    pub strategy: ClassifierStrategy,
    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_model_timeout_secs() -> u64 {
    15
}

fn default_history_window() -> usize {
    4
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            strategy: ClassifierStrategy::Rules,
            model_timeout_secs: default_model_timeout_secs(),
            history_window: default_history_window(),
        }
    }
}

// ── Text-generation provider ────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Google,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_provider_model")]
    pub model: String,
    /// Only used by OpenAI-compatible providers
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    #[serde(default = "default_provider_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &mask_secret(&self.api_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_provider_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_provider_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}
fn default_provider_max_tokens() -> u32 {
    500
}
fn default_provider_timeout_secs() -> u64 {
    30
}

// ── Agents ──────────────────────────────────────────────────────

/// How an agent is implemented. Keyed in the file by agent name: `[agents.booking_agent]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentConfig {
    /// Answers with the configured text-generation provider
    Conversational {
        #[serde(default)]
        persona: Option<String>,
        #[serde(default = "default_history_window")]
        history_window: usize,
    },
    /// Built-in booking detail collector
    Booking {
        #[serde(default)]
        default_year: Option<i32>,
    },
    /// Forwards to an agent service over HTTP
    Remote {
        url: String,
        #[serde(default = "default_remote_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_remote_timeout_secs() -> u64 {
    30
}

fn default_agents() -> BTreeMap<String, AgentConfig> {
    BTreeMap::from([
        (
            AgentId::BookingAgent.to_string(),
            AgentConfig::Booking { default_year: None },
        ),
        (
            AgentId::GeneralAgent.to_string(),
            AgentConfig::Conversational {
                persona: None,
                history_window: default_history_window(),
            },
        ),
    ])
}

// ── Notifications ───────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of the automation service; reports go to `<url>/webhook/send-report`
    #[serde(default)]
    pub webhook_url: String,
    /// Venue phone number the report is relayed to
    #[serde(default)]
    pub phone: String,
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
    /// Have the [provider] write the report body instead of sending the raw transcript
    #[serde(default)]
    pub summarize: bool,
    #[serde(default = "default_summary_timeout_secs")]
    pub summary_timeout_secs: u64,
}

impl std::fmt::Debug for NotificationsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationsConfig")
            .field("enabled", &self.enabled)
            .field("webhook_url", &self.webhook_url)
            .field("phone", &mask_secret(&self.phone))
            .field("timeout_secs", &self.timeout_secs)
            .field("summarize", &self.summarize)
            .field("summary_timeout_secs", &self.summary_timeout_secs)
            .finish()
    }
}

fn default_notify_timeout_secs() -> u64 {
    10
}

fn default_summary_timeout_secs() -> u64 {
    15
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: String::new(),
            phone: String::new(),
            timeout_secs: default_notify_timeout_secs(),
            summarize: false,
            summary_timeout_secs: default_summary_timeout_secs(),
        }
    }
}

// ── Gateway ─────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default)]
    pub auth_token: String,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("auth_token", &mask_secret(&self.auth_token))
            .finish()
    }
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            port: default_gateway_port(),
            auth_token: String::new(),
        }
    }
}

impl GatewayConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("Invalid gateway address {}:{}", self.bind, self.port))
    }
}

/// Mask a secret string for safe display in Debug output / logs.
/// Shows first 3 and last 4 chars for values longer than 7 chars, otherwise "***".
fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hostdesk")
}

impl HostdeskConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        // Refuse group/other-readable config files, they may hold API keys
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `hostdesk init` first.",
                path.display()
            )
        })?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config at {}", path.display()))?;

        if let Some(provider) = &config.provider {
            if content.contains(&format!("\"{}\"", provider.api_key)) && !provider.api_key.is_empty() {
                warn!(
                    "API key is hardcoded in config file. For security, use environment variables: api_key = \"${{OPENAI_API_KEY}}\""
                );
            }
        }

        Ok(config)
    }

    /// Expand allowlisted env vars, parse, and validate
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let agents = self.agent_entries()?;

        if self.classifier.strategy == ClassifierStrategy::Model && self.provider.is_none() {
            bail!("classifier.strategy = \"model\" requires a [provider] section");
        }

        for (id, agent) in &agents {
            match agent {
                AgentConfig::Conversational { .. } if self.provider.is_none() => {
                    bail!("agents.{} is conversational but no [provider] is configured", id);
                }
                AgentConfig::Remote { url, .. } => {
                    validate_http_url(url).with_context(|| format!("agents.{}.url", id))?;
                }
                _ => {}
            }
        }

        if self.notifications.enabled {
            validate_http_url(&self.notifications.webhook_url)
                .context("notifications.webhook_url")?;
            if self.notifications.summarize && self.provider.is_none() {
                bail!("notifications.summarize = true requires a [provider] section");
            }
        }

        self.gateway.socket_addr()?;
        Ok(())
    }

    /// Agent sections keyed by their parsed id
    pub fn agent_entries(&self) -> Result<Vec<(AgentId, &AgentConfig)>> {
        self.agents
            .iter()
            .map(|(name, agent)| {
                let id: AgentId = name
                    .parse()
                    .with_context(|| format!("Invalid section [agents.{}]", name))?;
                Ok((id, agent))
            })
            .collect()
    }

    pub fn build_provider(&self) -> Result<Option<Arc<dyn LlmProvider>>> {
        let Some(cfg) = &self.provider else {
            return Ok(None);
        };
        if cfg.api_key.is_empty() {
            warn!("provider.api_key is empty; model calls will fail until it is set");
        }
        let timeout = Duration::from_secs(cfg.timeout_secs);
        let provider: Arc<dyn LlmProvider> = match cfg.kind {
            ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
                cfg.api_key.clone(),
                cfg.model.clone(),
                cfg.base_url.clone(),
                cfg.max_tokens,
                timeout,
            )?),
            ProviderKind::Google => Arc::new(GoogleProvider::new(
                cfg.api_key.clone(),
                cfg.model.clone(),
                cfg.max_tokens,
                timeout,
            )?),
        };
        info!("Text-generation provider: {} ({})", provider.provider_name(), provider.model());
        Ok(Some(provider))
    }

    pub fn build_registry(&self, provider: Option<&Arc<dyn LlmProvider>>) -> Result<HandlerRegistry> {
        let mut registry = HandlerRegistry::new();
        for (id, agent) in self.agent_entries()? {
            match agent {
                AgentConfig::Conversational {
                    persona,
                    history_window,
                } => {
                    let provider = provider
                        .cloned()
                        .ok_or_else(|| anyhow!("agents.{} needs a [provider]", id))?;
                    let mut handler = ConversationalAgent::new(provider)
                        .with_id(id)
                        .with_history_window(*history_window);
                    if let Some(persona) = persona {
                        handler = handler.with_persona(persona.clone());
                    }
                    registry.register(Arc::new(handler));
                }
                AgentConfig::Booking { default_year } => {
                    let mut handler = BookingAgent::new().with_id(id);
                    if let Some(year) = default_year {
                        handler = handler.with_default_year(*year);
                    }
                    registry.register(Arc::new(handler));
                }
                AgentConfig::Remote { url, timeout_secs } => {
                    let handler = RemoteAgent::new(id, url.clone(), Duration::from_secs(*timeout_secs))?;
                    registry.register(Arc::new(handler));
                }
            }
        }
        Ok(registry)
    }

    pub fn build_notifier(&self, provider: Option<&Arc<dyn LlmProvider>>) -> Result<Option<Arc<dyn Notifier>>> {
        let cfg = &self.notifications;
        if !cfg.enabled {
            return Ok(None);
        }
        let mut notifier = WebhookNotifier::new(
            &cfg.webhook_url,
            cfg.phone.clone(),
            Duration::from_secs(cfg.timeout_secs),
        )?;
        if cfg.summarize {
            let provider = provider
                .cloned()
                .ok_or_else(|| anyhow!("notifications.summarize needs a [provider]"))?;
            notifier = notifier.with_summarizer(provider, Duration::from_secs(cfg.summary_timeout_secs));
        }
        info!("Hot-lead reports go to {}", notifier.url());
        Ok(Some(Arc::new(notifier)))
    }

    /// Overall bound on one notification: the summary (if any) plus the webhook call
    pub fn notify_budget(&self) -> Duration {
        let cfg = &self.notifications;
        let mut secs = cfg.timeout_secs;
        if cfg.summarize {
            secs += cfg.summary_timeout_secs;
        }
        Duration::from_secs(secs)
    }

    /// Wire classifier, scorer, handlers and notifier together
    pub fn build_dispatcher(&self) -> Result<Dispatcher> {
        let provider = self.build_provider()?;
        let registry = self.build_registry(provider.as_ref())?;
        let notifier = self.build_notifier(provider.as_ref())?;

        let classifier = Classifier::new(
            ClassifierConfig {
                strategy: self.classifier.strategy,
                model_timeout: Duration::from_secs(self.classifier.model_timeout_secs),
                history_window: self.classifier.history_window,
            },
            provider,
        );

        Ok(Dispatcher::new(
            classifier,
            LeadScorer::new(),
            Arc::new(registry),
            notifier,
            DispatcherConfig {
                notify_timeout: self.notify_budget(),
            },
        ))
    }
}

fn validate_http_url(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw).with_context(|| format!("'{}' is not a valid URL", raw))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => bail!("unsupported URL scheme '{}' in '{}'", other, raw),
    }
}

/// Allowlist of environment variable names that may be expanded in config files.
/// This prevents an attacker who can modify the config from reading arbitrary env vars.
const ALLOWED_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "GOOGLE_API_KEY",
    "GEMINI_API_KEY",
    "N8N_WEBHOOK_URL",
    "WHATSAPP_PHONE_NUMBER",
    "HOSTDESK_GATEWAY_TOKEN",
];

fn expand_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + len];
        result.push_str(&rest[..start]);
        if ALLOWED_ENV_VARS.contains(&var_name) {
            result.push_str(&std::env::var(var_name).unwrap_or_default());
        } else {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            result.push_str(&rest[start..start + len + 1]);
        }
        rest = &rest[start + len + 1..];
    }
    result.push_str(rest);
    result
}
