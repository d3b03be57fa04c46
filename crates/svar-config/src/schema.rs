// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Serde default helper – returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so fields that should be enabled unless explicitly turned
/// off need a named function.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub guardrails: GuardrailConfig,
    #[serde(default)]
    pub intent: IntentConfig,
    #[serde(default)]
    pub faithfulness: FaithfulnessConfig,
    #[serde(default)]
    pub hitl: HitlConfig,
    #[serde(default)]
    pub tools: ToolServerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Registered agents.  An empty list falls back to the built-in set
    /// (support, billing, tech, escalation).
    #[serde(default)]
    pub agents: Vec<AgentProfileConfig>,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    /// The agent profiles to register, falling back to the built-in set when
    /// the config names none.
    pub fn agent_profiles(&self) -> Vec<AgentProfileConfig> {
        if self.agents.is_empty() {
            AgentProfileConfig::builtin_set()
        } else {
            self.agents.clone()
        }
    }
}

// ─── LLM backend ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider identifier: "openai" (any OpenAI-compatible endpoint) or
    /// "mock" (deterministic echo, no network – useful for local dev).
    pub provider: String,
    /// Model name forwarded to the provider API.
    pub name: String,
    /// Base URL of the chat-completions endpoint.
    pub base_url: String,
    /// Environment variable that holds the API key (read at runtime).
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files.
    pub api_key: Option<String>,
    /// Sampling temperature (0.0–2.0).
    pub temperature: f32,
    /// Nucleus sampling parameter.
    pub top_p: f32,
    /// Per-call timeout.  A call that exceeds it is retried once, then fails.
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "support-chat".into(),
            base_url: "http://127.0.0.1:8080/v1".into(),
            api_key_env: None,
            api_key: None,
            temperature: 0.2,
            top_p: 0.9,
            timeout_seconds: 10,
        }
    }
}

// ─── Supervisor ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Let an LLM pick the agent before routing.  The planner's choice wins
    /// over the intent router's suggestion when both are present.
    #[serde(default)]
    pub planning_enabled: bool,
    /// Replies scoring strictly below this are escalated to a human.
    pub faithfulness_threshold: f32,
    /// Only the last N messages are kept in checkpointed state.
    pub messages_max_len: usize,
    /// Circuit breaker on/off switch.
    #[serde(default = "default_true")]
    pub agent_ops_enabled: bool,
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_cooldown_seconds: u64,
    /// Retry a failed invocation once on the fallback agent.
    #[serde(default = "default_true")]
    pub failover_enabled: bool,
    pub failover_fallback_agent_id: String,
    /// Timeout for a single agent invocation.
    pub agent_invocation_timeout_seconds: u64,
    /// End-to-end deadline for one chat turn.
    pub request_deadline_seconds: u64,
    /// Checkpointed session state expires after this long without activity.
    pub session_ttl_seconds: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            planning_enabled: false,
            faithfulness_threshold: 0.8,
            messages_max_len: 20,
            agent_ops_enabled: true,
            circuit_breaker_failure_threshold: 3,
            circuit_breaker_cooldown_seconds: 60,
            failover_enabled: true,
            failover_fallback_agent_id: "support".into(),
            agent_invocation_timeout_seconds: 30,
            request_deadline_seconds: 60,
            session_ttl_seconds: 86_400,
        }
    }
}

// ─── Agent runner ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Use the ReAct (Thought/Action/Observation) loop instead of native
    /// tool calling.
    #[serde(default)]
    pub react_enabled: bool,
    pub react_max_steps: u32,
    /// Maximum LLM ↔ tool rounds per turn in the tool-calling loop.
    pub max_tool_iters: u32,
    /// How many prior messages are formatted into the prompt.
    pub history_window: usize,
    /// Chunks requested from the retriever per turn.
    pub top_k: usize,
    /// Timeout for a single tool execution.
    pub tool_timeout_seconds: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            react_enabled: false,
            react_max_steps: 10,
            max_tool_iters: 5,
            history_window: 10,
            top_k: 3,
            tool_timeout_seconds: 10,
        }
    }
}

// ─── Guardrails ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub max_input_len: usize,
    pub max_output_len: usize,
    /// Case-insensitive substrings that reject the input outright.
    #[serde(default = "GuardrailConfig::default_blocklist")]
    pub blocklist: Vec<String>,
    /// Case-insensitive substrings scrubbed from outputs.
    #[serde(default = "GuardrailConfig::default_sensitive")]
    pub sensitive: Vec<String>,
}

impl GuardrailConfig {
    fn default_blocklist() -> Vec<String> {
        [
            "hack",
            "exploit",
            "ddos",
            "password crack",
            "credential steal",
            "ignore previous instructions",
            "disregard your instructions",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    fn default_sensitive() -> Vec<String> {
        ["internal use only", "api key", "password"]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_input_len: 8_000,
            max_output_len: 4_000,
            blocklist: Self::default_blocklist(),
            sensitive: Self::default_sensitive(),
        }
    }
}

// ─── Intent classification ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    /// Use the model-based classifier (falls back to the keyword table on any
    /// failure).  Off = keyword table only.
    #[serde(default)]
    pub use_model: bool,
    /// Classifier sidecar endpoint, e.g. `http://127.0.0.1:8091/classify`.
    pub model_url: Option<String>,
    /// Minimum confidence for the model label to be accepted.
    pub confidence_threshold: f32,
    pub timeout_seconds: u64,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            use_model: false,
            model_url: None,
            confidence_threshold: 0.7,
            timeout_seconds: 5,
        }
    }
}

// ─── Faithfulness scoring ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaithfulnessConfig {
    /// Use the model-based scorer (falls back to the pass-through null scorer
    /// on any failure).  Off = null scorer, every reply scores 1.0.
    #[serde(default)]
    pub use_model: bool,
    /// Scorer sidecar endpoint, e.g. `http://127.0.0.1:8092/score`.
    pub model_url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for FaithfulnessConfig {
    fn default() -> Self {
        Self {
            use_model: false,
            model_url: None,
            timeout_seconds: 5,
        }
    }
}

// ─── Human-in-the-loop ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitlHandlerKind {
    Stub,
    Ticket,
    Email,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HitlConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub handler: HitlHandlerKind,
    /// Recipient for the email-notify handler.
    pub email_to: Option<String>,
}

impl Default for HitlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            handler: HitlHandlerKind::Stub,
            email_to: None,
        }
    }
}

// ─── External tool server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolServerConfig {
    /// Base URL of the external tool server.  Enumerated once at startup;
    /// unreachable after retries = startup failure.
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8811".into(),
            timeout_seconds: 10,
        }
    }
}

// ─── Vector retrieval ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Vector store search endpoint.  When unset, a small built-in document
    /// set is served from memory (local dev and tests).
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_seconds: 10,
        }
    }
}

// ─── Agents ───────────────────────────────────────────────────────────────────

fn default_max_concurrent() -> usize {
    4
}

fn default_queue_len() -> usize {
    16
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfileConfig {
    pub agent_id: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Model override for this agent; the global model is used when unset.
    pub model_id: Option<String>,
    /// Concurrent in-flight turns admitted for this agent.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Turns allowed to wait for a slot before overload is reported.
    #[serde(default = "default_queue_len")]
    pub queue_len: usize,
    /// Persona override; a built-in persona is used when unset.
    pub persona: Option<String>,
}

impl AgentProfileConfig {
    fn named(agent_id: &str, capabilities: &[&str]) -> Self {
        Self {
            agent_id: agent_id.into(),
            capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
            model_id: None,
            max_concurrent: 4,
            queue_len: 16,
            persona: None,
        }
    }

    /// The default agent set registered when the config names none.
    pub fn builtin_set() -> Vec<Self> {
        vec![
            Self::named("support", &["general", "faq"]),
            Self::named("billing", &["invoices", "refunds", "payments"]),
            Self::named("tech", &["troubleshooting", "installation"]),
            Self::named("escalation", &["handoff"]),
        ]
    }
}

// ─── HTTP frontend ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8711".into(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
