//! Subcommand implementations and the wiring they share.

pub mod agent;
pub mod gateway;
pub mod onboard;
pub mod session;
pub mod tools;

use std::sync::Arc;
use std::time::Duration;

use toolwright_agent::{AgentLoop, ChunkObserver, ModelGateway, ToolExecutor};
use toolwright_config::AppConfig;
use toolwright_core::error::{Error, Result};
use toolwright_core::event::EventBus;
use toolwright_core::tool::ToolRegistry;
use toolwright_store::SessionStore;

/// Load `~/.toolwright/config.toml` plus environment overrides.
pub fn load_config() -> Result<AppConfig> {
    AppConfig::load().map_err(|e| Error::Config {
        message: e.to_string(),
    })
}

/// Build the tool registry from the `[tools]` section.
pub fn build_registry(config: &AppConfig) -> Result<Arc<ToolRegistry>> {
    Ok(Arc::new(toolwright_tools::default_registry(&config.tools)?))
}

/// Open the configured backend behind a [`SessionStore`].
pub async fn open_store(config: &AppConfig) -> Result<Arc<SessionStore>> {
    let backend = toolwright_store::open_backend(&config.store).await?;
    Ok(Arc::new(SessionStore::new(
        backend,
        config.system_prompt.clone(),
    )))
}

/// Wire provider, tools, store, and event bus into an [`AgentLoop`].
///
/// With an `observer`, streamed answer text is forwarded as it arrives.
pub async fn build_agent(
    config: &AppConfig,
    observer: Option<ChunkObserver>,
) -> Result<AgentLoop> {
    let provider = toolwright_providers::build_from_config(config)?;
    let tools = build_registry(config)?;
    let store = open_store(config).await?;
    let events = Arc::new(EventBus::default());

    let agent = match observer {
        None => AgentLoop::from_config(config, provider, tools, store, events),
        Some(observer) => {
            let gateway = ModelGateway::new(provider, &config.model, tools.definitions())
                .with_temperature(config.temperature)
                .with_max_tokens(config.max_tokens)
                .with_streaming(config.streaming)
                .with_observer(observer);
            let executor =
                ToolExecutor::new(tools, Duration::from_secs(config.agent.tool_timeout_secs));
            AgentLoop::new(gateway, executor, store, events).with_agent_config(&config.agent)
        }
    };

    tracing::debug!(
        provider = %config.provider,
        model = %config.model,
        tools = agent.tools().len(),
        store = agent.store().backend_name(),
        "Agent wired"
    );
    Ok(agent)
}
