//! The model gateway: one call to the provider, one [`ModelResponse`] back.
//!
//! Providers speak the raw wire shape (optional text plus tool calls whose
//! arguments are JSON strings). The gateway collects streamed chunks, checks
//! the result for structural problems, and decides between a final answer
//! and a tool request.

use std::collections::HashSet;
use std::sync::Arc;

use toolwright_core::error::ProviderError;
use toolwright_core::message::Message;
use toolwright_core::provider::{
    ModelResponse, Provider, ProviderRequest, ProviderResponse, ProviderToolCall, ToolDefinition,
};
use toolwright_core::tool::ToolCall;
use tracing::{debug, trace};

/// Receives text deltas as they stream in.
pub type ChunkObserver = Arc<dyn Fn(&str) + Send + Sync>;

pub struct ModelGateway {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    streaming: bool,
    tools: Vec<ToolDefinition>,
    observer: Option<ChunkObserver>,
}

impl ModelGateway {
    /// Bind a provider and model to a fixed set of tool definitions.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.5,
            max_tokens: None,
            streaming: false,
            tools,
            observer: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Forward streamed text to `observer` (only used when streaming).
    pub fn with_observer(mut self, observer: ChunkObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the model for its next step given the full history.
    pub async fn invoke(&self, messages: &[Message]) -> Result<ModelResponse, ProviderError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.tools.clone(),
            stream: self.streaming,
        };

        let response = if self.streaming {
            self.collect_stream(request).await?
        } else {
            self.provider.complete(request).await?
        };
        if let Some(usage) = &response.usage {
            debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Model usage"
            );
        }
        interpret(response)
    }

    async fn collect_stream(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut rx = self.provider.stream(request).await?;
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        let mut usage = None;

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(delta) = chunk.content.filter(|d| !d.is_empty()) {
                trace!(len = delta.len(), "Stream delta");
                if let Some(observer) = &self.observer {
                    observer(&delta);
                }
                content.push_str(&delta);
            }
            tool_calls.extend(chunk.tool_calls);
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
            if chunk.done {
                return Ok(ProviderResponse {
                    content: Some(content).filter(|c| !c.is_empty()),
                    tool_calls,
                    usage,
                    model: self.model.clone(),
                });
            }
        }
        Err(ProviderError::StreamInterrupted(
            "stream ended before completion".into(),
        ))
    }
}

/// Turn a raw provider response into the model's decision.
pub fn interpret(response: ProviderResponse) -> Result<ModelResponse, ProviderError> {
    if !response.tool_calls.is_empty() {
        if let Some(text) = response.content.as_deref().filter(|t| !t.trim().is_empty()) {
            debug!(dropped = text.len(), "Dropping text that accompanied tool calls");
        }
        return to_tool_calls(response.tool_calls).map(ModelResponse::ToolRequest);
    }

    match response.content {
        Some(text) if !text.trim().is_empty() => Ok(ModelResponse::FinalAnswer(text)),
        _ => Err(ProviderError::MalformedResponse(
            "response had neither content nor tool calls".into(),
        )),
    }
}

fn to_tool_calls(raw: Vec<ProviderToolCall>) -> Result<Vec<ToolCall>, ProviderError> {
    let mut seen = HashSet::new();
    let mut calls = Vec::with_capacity(raw.len());

    for (n, call) in raw.into_iter().enumerate() {
        if call.name.trim().is_empty() {
            return Err(ProviderError::MalformedResponse(format!(
                "tool call #{n} has no name"
            )));
        }
        let id = if call.id.is_empty() {
            format!("call_{n}")
        } else {
            call.id
        };
        if !seen.insert(id.clone()) {
            return Err(ProviderError::MalformedResponse(format!(
                "duplicate tool call id '{id}'"
            )));
        }
        calls.push(ToolCall::new(id, call.name, parse_raw_arguments(&call.arguments)));
    }
    Ok(calls)
}

/// Blank arguments mean "no arguments"; anything unparseable is kept as a
/// string so schema validation reports it back to the model.
fn parse_raw_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
