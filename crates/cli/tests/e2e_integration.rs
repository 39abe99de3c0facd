//! End-to-end integration tests for the Toolwright agent.
//!
//! These tests wire the real crates together the way the binary does
//! (config → registry → store → loop) with a scripted provider standing in
//! for the model, and exercise full turns, persistence, and the HTTP API.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use toolwright_agent::{AgentLoop, Approval, MODEL_FAILURE_MESSAGE, TurnOutcome};
use toolwright_config::AppConfig;
use toolwright_core::error::ProviderError;
use toolwright_core::event::{DomainEvent, EventBus};
use toolwright_core::message::{Message, Role};
use toolwright_core::provider::{
    Provider, ProviderRequest, ProviderResponse, ProviderToolCall, Usage,
};
use toolwright_core::session::{SessionBackend, SessionId};
use toolwright_store::{FileBackend, InMemoryBackend, SessionStore, SqliteBackend};
use toolwright_tools::default_registry;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence and records
/// every request it receives.
struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn ok(responses: Vec<ProviderResponse>) -> Arc<Self> {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let count = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider exhausted at call #{count}"))
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: Some(text.into()),
        tool_calls: vec![],
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock".into(),
    }
}

fn tool_response(calls: &[(&str, &str, Value)]) -> ProviderResponse {
    ProviderResponse {
        content: None,
        tool_calls: calls
            .iter()
            .map(|(id, name, args)| ProviderToolCall {
                id: (*id).into(),
                name: (*name).into(),
                arguments: args.to_string(),
            })
            .collect(),
        usage: None,
        model: "mock".into(),
    }
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.model = "mock".into();
    config.streaming = false;
    config
}

fn agent_over(
    config: &AppConfig,
    provider: Arc<ScriptedProvider>,
    backend: Arc<dyn SessionBackend>,
) -> AgentLoop {
    let tools = Arc::new(default_registry(&config.tools).unwrap());
    let store = Arc::new(SessionStore::new(backend, config.system_prompt.clone()));
    AgentLoop::from_config(config, provider, tools, store, Arc::new(EventBus::default()))
}

fn memory_agent(config: &AppConfig, provider: Arc<ScriptedProvider>) -> AgentLoop {
    agent_over(config, provider, Arc::new(InMemoryBackend::new()))
}

fn roles(messages: &[Message]) -> Vec<Role> {
    messages.iter().map(Message::role).collect()
}

// ── E2E: Full Turn Pipeline ──────────────────────────────────────────────

#[tokio::test]
async fn e2e_addition_tool_then_answer() {
    let config = test_config();
    let provider = ScriptedProvider::ok(vec![
        tool_response(&[("call_1", "additionTool", json!({"a": 2, "b": 3}))]),
        text_response("2 + 3 = 5"),
    ]);
    let agent = memory_agent(&config, provider.clone());
    let id = SessionId::from("e2e-add");

    let outcome = agent.run_turn(&id, "what is 2+3?").await.unwrap();
    assert_eq!(outcome.answer(), Some("2 + 3 = 5"));
    assert_eq!(provider.calls(), 2);

    let session = agent.store().find(&id).await.unwrap().unwrap();
    assert_eq!(
        roles(&session.messages),
        vec![Role::System, Role::Human, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(session.messages[3].text(), Some("5"));
    assert!(session.validate().is_ok());

    // The model saw every declared tool on each call
    let first = provider.request(0);
    assert_eq!(first.model, "mock");
    assert!(first.tools.iter().any(|t| t.name == "openWeatherMap"));
    assert!(first.tools.iter().any(|t| t.name == "read_pdf"));
}

#[tokio::test]
async fn e2e_two_tool_calls_land_in_request_order() {
    let config = test_config();
    let provider = ScriptedProvider::ok(vec![
        tool_response(&[
            ("a", "randomNumberTool", json!({"min": 5, "max": 5})),
            ("b", "additionTool", json!({"a": 1.5, "b": 1})),
        ]),
        text_response("done"),
    ]);
    let agent = memory_agent(&config, provider.clone());

    agent
        .run_turn(&SessionId::from("e2e-order"), "go")
        .await
        .unwrap();

    // The second model call sees both results, in request order
    let second = provider.request(1);
    let tool_messages: Vec<_> = second
        .messages
        .iter()
        .filter_map(|m| match m {
            Message::Tool {
                call_id, content, ..
            } => Some((call_id.as_str(), content.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(tool_messages, vec![("a", "5"), ("b", "2.5")]);
}

#[tokio::test]
async fn e2e_invalid_range_is_reported_to_the_model() {
    let config = test_config();
    let provider = ScriptedProvider::ok(vec![
        tool_response(&[("r", "randomNumberTool", json!({"min": 5, "max": 1}))]),
        text_response("That range is invalid."),
    ]);
    let agent = memory_agent(&config, provider);
    let id = SessionId::from("e2e-range");

    agent.run_turn(&id, "pick a number").await.unwrap();

    let session = agent.store().find(&id).await.unwrap().unwrap();
    match &session.messages[3] {
        Message::Tool {
            success, content, ..
        } => {
            assert!(!success);
            assert!(content.contains("Invalid range: min must be less than or equal to max."));
        }
        other => panic!("expected tool message, got {other:?}"),
    }
}

#[tokio::test]
async fn e2e_model_failure_yields_apology() {
    let config = test_config();
    let provider = ScriptedProvider::new(vec![Err(ProviderError::Network(
        "connection refused".into(),
    ))]);
    let agent = memory_agent(&config, provider);
    let id = SessionId::from("e2e-down");

    let outcome = agent.run_turn(&id, "hello?").await.unwrap();
    assert_eq!(outcome.answer(), Some(MODEL_FAILURE_MESSAGE));

    let session = agent.store().find(&id).await.unwrap().unwrap();
    assert_eq!(session.messages.len(), 3);
    assert_eq!(session.last_answer(), Some(MODEL_FAILURE_MESSAGE));
    assert!(session.pending_calls().is_empty());
}

#[tokio::test]
async fn e2e_weather_not_found_keeps_the_loop_going() {
    let app = axum::Router::new().route(
        "/forecast",
        axum::routing::get(|| async {
            (
                StatusCode::NOT_FOUND,
                axum::Json(json!({"cod": "404", "message": "city not found"})),
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = test_config();
    config.tools.openweathermap_url = base;
    config.tools.openweathermap_api_key = Some("test-key".into());

    let provider = ScriptedProvider::ok(vec![
        tool_response(&[("w", "openWeatherMap", json!({"city": "Atlantis"}))]),
        text_response("I couldn't find that city."),
    ]);
    let agent = memory_agent(&config, provider.clone());
    let id = SessionId::from("e2e-weather");

    let outcome = agent.run_turn(&id, "weather in Atlantis?").await.unwrap();
    assert_eq!(outcome.answer(), Some("I couldn't find that city."));
    assert_eq!(provider.calls(), 2);

    let session = agent.store().find(&id).await.unwrap().unwrap();
    match &session.messages[3] {
        Message::Tool {
            success, content, ..
        } => {
            assert!(!success);
            assert!(content.starts_with("Error:"));
        }
        other => panic!("expected tool message, got {other:?}"),
    }
}

// ── E2E: Approval Gate ───────────────────────────────────────────────────

#[tokio::test]
async fn e2e_gated_turn_waits_for_approval() {
    let mut config = test_config();
    config.agent.require_approval = true;
    let provider = ScriptedProvider::ok(vec![
        tool_response(&[("c", "additionTool", json!({"a": 2, "b": 3}))]),
        text_response("It is 5."),
    ]);
    let agent = memory_agent(&config, provider.clone());
    let id = SessionId::from("e2e-gate");

    let outcome = agent.run_turn(&id, "add").await.unwrap();
    let TurnOutcome::AwaitingApproval { pending } = outcome else {
        panic!("expected the gate to open");
    };
    assert_eq!(pending[0].name, "additionTool");
    assert_eq!(provider.calls(), 1);

    let outcome = agent.resolve_approval(&id, Approval::Approve).await.unwrap();
    assert_eq!(outcome.answer(), Some("It is 5."));

    let session = agent.store().find(&id).await.unwrap().unwrap();
    assert!(!session.awaiting_approval);
    assert_eq!(session.messages[3].text(), Some("5"));
}

// ── E2E: Persistence ─────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_file_backend_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let id = SessionId::from("e2e-file");

    {
        let provider = ScriptedProvider::ok(vec![
            tool_response(&[("c", "additionTool", json!({"a": 2, "b": 3}))]),
            text_response("5"),
        ]);
        let agent = agent_over(&config, provider, Arc::new(FileBackend::new(dir.path())));
        agent.run_turn(&id, "add 2 and 3").await.unwrap();
    }

    // A fresh process over the same directory continues the session
    let provider = ScriptedProvider::ok(vec![text_response("You asked me to add.")]);
    let agent = agent_over(&config, provider.clone(), Arc::new(FileBackend::new(dir.path())));
    let outcome = agent.run_turn(&id, "what did I ask?").await.unwrap();
    assert_eq!(outcome.answer(), Some("You asked me to add."));

    // The model received the full prior history
    assert_eq!(provider.request(0).messages.len(), 6);

    let session = agent.store().find(&id).await.unwrap().unwrap();
    assert_eq!(session.messages.len(), 7);
    assert!(session.validate().is_ok());
}

#[tokio::test]
async fn e2e_checkpoint_restores_into_fresh_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let provider = ScriptedProvider::ok(vec![
        tool_response(&[("c", "additionTool", json!({"a": 2, "b": 3}))]),
        text_response("5"),
    ]);
    let agent = memory_agent(&config, provider);
    let id = SessionId::from("e2e-snap");
    agent.run_turn(&id, "add").await.unwrap();

    let snapshot = agent.store().checkpoint(&id).await.unwrap();
    let json = serde_json::to_string(&snapshot).unwrap();

    let db_path = dir.path().join("sessions.db");
    let backend = SqliteBackend::new(&format!("sqlite://{}", db_path.display()))
        .await
        .unwrap();
    let fresh = SessionStore::new(Arc::new(backend), "unused");
    let restored = fresh
        .restore(&id, serde_json::from_str(&json).unwrap())
        .await
        .unwrap();

    let original = agent.store().find(&id).await.unwrap().unwrap();
    assert_eq!(restored.messages, original.messages);
    assert_eq!(fresh.find(&id).await.unwrap().unwrap().messages, original.messages);
}

// ── E2E: Gateway API (router only, no server) ───────────────────────────

async fn call(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn e2e_gateway_turn_and_approval() {
    let mut config = test_config();
    config.agent.require_approval = true;
    let provider = ScriptedProvider::ok(vec![
        tool_response(&[("c", "additionTool", json!({"a": 2, "b": 3}))]),
        text_response("It is 5."),
    ]);
    let app = toolwright_gateway::build_router(Arc::new(memory_agent(&config, provider)));

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = call(&app, "GET", "/v1/tools", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["tools"].as_array().unwrap().len() >= 7);

    let (status, body) = call(
        &app,
        "POST",
        "/v1/sessions/web/turns",
        Some(json!({"message": "add 2 and 3"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "awaiting_approval");
    assert_eq!(body["pending"][0]["name"], "additionTool");

    // A new message while the gate is open is a conflict
    let (status, _) = call(
        &app,
        "POST",
        "/v1/sessions/web/turns",
        Some(json!({"message": "hurry up"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(
        &app,
        "POST",
        "/v1/sessions/web/approval",
        Some(json!({"approve": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["answer"], "It is 5.");
}

// ── E2E: Configuration System ───────────────────────────────────────────

#[test]
fn e2e_config_defaults_and_env_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, AppConfig::default_toml()).unwrap();

    let mut config = AppConfig::load_from(&path).unwrap();
    assert!(config.validate().is_ok());
    assert!(!config.has_api_key());

    config.apply_env(|key| match key {
        "OPENAI_API_KEY" => Some("sk-env".into()),
        "TOOLWRIGHT_MODEL" => Some("gpt-4o-mini".into()),
        "BRAVE_SEARCH_API_KEY" => Some("brave".into()),
        _ => None,
    });
    assert!(config.has_api_key());
    assert_eq!(config.model, "gpt-4o-mini");

    // A search key brings web search into the registry
    let registry = default_registry(&config.tools).unwrap();
    assert!(registry.get("braveSearch").is_some());
    assert!(toolwright_providers::build_from_config(&config).is_ok());
}

// ── E2E: Event System ──────────────────────────────────────────────────

#[tokio::test]
async fn e2e_events_trace_a_turn() {
    let config = test_config();
    let provider = ScriptedProvider::ok(vec![
        tool_response(&[("c", "currentTime", json!({}))]),
        text_response("It's late."),
    ]);
    let agent = memory_agent(&config, provider);
    let mut rx = agent.events().subscribe();

    agent
        .run_turn(&SessionId::from("e2e-events"), "time?")
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(match event.as_ref() {
            DomainEvent::TurnStarted { .. } => "started",
            DomainEvent::ModelResponded { .. } => "model",
            DomainEvent::ToolExecuted { .. } => "tool",
            DomainEvent::ApprovalRequested { .. } => "approval",
            DomainEvent::TurnCompleted { .. } => "completed",
        });
    }
    assert_eq!(kinds, vec!["started", "model", "tool", "model", "completed"]);
}
