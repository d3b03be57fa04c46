// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Bottom-up assembly of the dispatcher.
//!
//! Construction order matters: shared services first (provider, tool
//! registry, retriever, guardrail, classifiers), then agents over those
//! services, then the supervisor, then the gateway state.  Agents never
//! mutate services, so everything below the supervisor is shared immutably.
//!
//! The external tool server is a required collaborator: enumeration is
//! retried briefly and then fails startup.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use svar_agents::{AgentRegistry, AgentRunner};
use svar_config::{Config, HitlHandlerKind, ModelConfig};
use svar_core::{
    CircuitBreaker, ConversationStore, EmailHitlHandler, HitlHandler, MemoryCheckpointer,
    MemoryConversationStore, SessionRouter, StubHitlHandler, Supervisor, TicketHitlHandler,
};
use svar_gateway::{build_schema, AppState};
use svar_model::{ChatProvider, EchoProvider, OpenAiCompatProvider};
use svar_runtime::{
    FaithfulnessScorer, Guardrail, HttpRetriever, IntentClassifier, KeywordClassifier,
    NullScorer, RemoteIntentClassifier, RemoteScorer, Retriever, StaticRetriever,
};
use svar_tools::{
    default_tools, discover_external_tools, HttpToolServerClient, ToolRegistry, ToolServerClient,
};

pub fn build_provider(model: &ModelConfig) -> Arc<dyn ChatProvider> {
    match model.provider.as_str() {
        "mock" => Arc::new(EchoProvider),
        _ => {
            let api_key = model.api_key.clone().or_else(|| {
                model
                    .api_key_env
                    .as_ref()
                    .and_then(|var| std::env::var(var).ok())
            });
            Arc::new(OpenAiCompatProvider::new(
                &model.base_url,
                &model.name,
                api_key,
                model.temperature,
                model.top_p,
                Duration::from_secs(model.timeout_seconds),
            ))
        }
    }
}

pub fn build_tool_client(config: &Config) -> Arc<dyn ToolServerClient> {
    Arc::new(HttpToolServerClient::new(
        &config.tools.base_url,
        Duration::from_secs(config.tools.timeout_seconds),
    ))
}

/// Assemble the full application state.  Fails when the external tool server
/// stays unreachable or the configuration is unusable.
pub async fn build(config: &Config) -> anyhow::Result<AppState> {
    let provider = build_provider(&config.model);
    info!(
        provider = provider.name(),
        model = provider.model_name(),
        "chat provider ready"
    );

    let tool_client = build_tool_client(config);
    let external = discover_external_tools(&tool_client).await?;
    let tools = Arc::new(ToolRegistry::build(default_tools(), external));
    info!(tools = ?tools.names(), "tool registry built");

    let retriever: Arc<dyn Retriever> = match &config.retrieval.base_url {
        Some(url) => Arc::new(HttpRetriever::new(
            url,
            Duration::from_secs(config.retrieval.timeout_seconds),
        )),
        None => {
            info!("no retrieval backend configured, serving built-in documents");
            Arc::new(StaticRetriever::with_default_docs())
        }
    };

    let guard = Arc::new(Guardrail::new(
        config.guardrails.enabled,
        config.guardrails.blocklist.clone(),
        config.guardrails.sensitive.clone(),
        config.guardrails.max_input_len,
        config.guardrails.max_output_len,
    ));

    let classifier: Arc<dyn IntentClassifier> = match (config.intent.use_model, &config.intent.model_url) {
        (true, Some(url)) => Arc::new(RemoteIntentClassifier::new(
            url,
            Duration::from_secs(config.intent.timeout_seconds),
            config.intent.confidence_threshold,
        )),
        _ => Arc::new(KeywordClassifier::default()),
    };

    let scorer: Arc<dyn FaithfulnessScorer> =
        match (config.faithfulness.use_model, &config.faithfulness.model_url) {
            (true, Some(url)) => Arc::new(RemoteScorer::new(
                url,
                Duration::from_secs(config.faithfulness.timeout_seconds),
            )),
            _ => Arc::new(NullScorer),
        };

    let mut registry = AgentRegistry::new();
    for profile in config.agent_profiles() {
        info!(agent = %profile.agent_id, "registering agent");
        registry.register(Arc::new(AgentRunner::new(
            profile,
            config.runner.clone(),
            Arc::clone(&provider),
            Arc::clone(&tools),
            Arc::clone(&retriever),
            Arc::clone(&guard),
        )));
    }

    let breaker = Arc::new(CircuitBreaker::new(
        config.supervisor.circuit_breaker_failure_threshold,
        Duration::from_secs(config.supervisor.circuit_breaker_cooldown_seconds),
    ));
    let checkpointer = Arc::new(MemoryCheckpointer::new(Duration::from_secs(
        config.supervisor.session_ttl_seconds,
    )));

    let (hitl, tickets): (Arc<dyn HitlHandler>, Option<Arc<TicketHitlHandler>>) =
        match config.hitl.handler {
            HitlHandlerKind::Stub => (Arc::new(StubHitlHandler), None),
            HitlHandlerKind::Ticket => {
                let handler = Arc::new(TicketHitlHandler::new(Arc::clone(&tools)));
                let dyn_handler: Arc<dyn HitlHandler> = handler.clone();
                (dyn_handler, Some(handler))
            }
            HitlHandlerKind::Email => (
                Arc::new(EmailHitlHandler::new(config.hitl.email_to.clone())),
                None,
            ),
        };

    let supervisor = Arc::new(Supervisor::new(
        config,
        Arc::new(registry),
        Arc::clone(&provider),
        Arc::clone(&breaker),
        checkpointer,
        scorer,
        hitl,
    ));

    let store: Arc<dyn ConversationStore> = Arc::new(MemoryConversationStore::new());
    let schema = build_schema(Arc::clone(&store));

    Ok(AppState {
        router: Arc::new(SessionRouter::new(classifier)),
        supervisor,
        store,
        tickets,
        breaker,
        tool_server: tool_client,
        schema,
    })
}
