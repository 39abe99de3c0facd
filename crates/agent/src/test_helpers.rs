//! Shared test doubles for the agent crate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use toolwright_core::error::{ProviderError, StoreError, ToolError};
use toolwright_core::provider::{
    Provider, ProviderRequest, ProviderResponse, ProviderToolCall, StreamChunk, Usage,
};
use toolwright_core::schema::ToolSchema;
use toolwright_core::session::{Session, SessionBackend, SessionId};
use toolwright_core::tool::{Tool, ToolRegistry};

/// A provider that replays a script of responses, one per call.
///
/// Panics if more calls are made than responses provided.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    streams: Mutex<VecDeque<Vec<StreamChunk>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            streams: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Each inner vector is the chunk sequence of one streamed call.
    pub fn streaming(streams: Vec<Vec<StreamChunk>>) -> Self {
        Self {
            streams: Mutex::new(streams.into()),
            ..Self::new(vec![])
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no response scripted for call #{call}"))
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let chunks = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedProvider: no stream scripted");
        let (tx, rx) = tokio::sync::mpsc::channel(chunks.len() + 1);
        for chunk in chunks {
            tx.send(Ok(chunk)).await.unwrap();
        }
        Ok(rx)
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// A plain text answer.
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: Some(text.into()),
        tool_calls: vec![],
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// A tool request with no accompanying text.
pub fn tool_response(calls: Vec<ProviderToolCall>) -> ProviderResponse {
    ProviderResponse {
        content: None,
        tool_calls: calls,
        usage: usage(),
        model: "mock-model".into(),
    }
}

pub fn raw_call(id: &str, name: &str, arguments: &str) -> ProviderToolCall {
    ProviderToolCall {
        id: id.into(),
        name: name.into(),
        arguments: arguments.into(),
    }
}

pub fn registry_with(tools: Vec<Arc<dyn Tool>>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool).unwrap();
    }
    Arc::new(registry)
}

/// Sleeps for a fixed time, then answers with its own name.
pub struct SleepyTool {
    name: String,
    millis: u64,
}

impl SleepyTool {
    pub fn new(name: &str, millis: u64) -> Self {
        Self {
            name: name.into(),
            millis,
        }
    }
}

#[async_trait]
impl Tool for SleepyTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Sleeps, then answers"
    }
    fn input_schema(&self) -> ToolSchema {
        ToolSchema::empty()
    }
    async fn call(&self, _arguments: Value) -> Result<String, ToolError> {
        tokio::time::sleep(Duration::from_millis(self.millis)).await;
        Ok(format!("{} done", self.name))
    }
}

/// Always fails with the given reason.
pub struct FailingTool(pub &'static str);

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "flaky"
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    fn input_schema(&self) -> ToolSchema {
        ToolSchema::empty()
    }
    async fn call(&self, _arguments: Value) -> Result<String, ToolError> {
        Err(ToolError::failed("flaky", self.0))
    }
}

/// A backend whose every operation fails.
pub struct BrokenBackend;

#[async_trait]
impl SessionBackend for BrokenBackend {
    fn name(&self) -> &str {
        "broken"
    }
    async fn load(&self, _id: &SessionId) -> Result<Option<Session>, StoreError> {
        Err(StoreError::Storage("disk on fire".into()))
    }
    async fn save(&self, _session: &Session) -> Result<(), StoreError> {
        Err(StoreError::Storage("disk on fire".into()))
    }
    async fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        Err(StoreError::Storage("disk on fire".into()))
    }
}
