//! The agent reasoning loop implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use toolwright_config::{AgentConfig, AppConfig};
use toolwright_core::error::{ProviderError, TurnError};
use toolwright_core::event::{DomainEvent, EventBus};
use toolwright_core::message::Message;
use toolwright_core::provider::{ModelResponse, Provider};
use toolwright_core::session::{Session, SessionId};
use toolwright_core::tool::{ToolCall, ToolRegistry, ToolResult};
use toolwright_store::SessionStore;
use tracing::{debug, info, warn};

use crate::executor::ToolExecutor;
use crate::model::ModelGateway;

/// Appended as the assistant's answer when the model cannot be reached or
/// returns something unusable.
pub const MODEL_FAILURE_MESSAGE: &str =
    "Sorry, I encountered an error while processing your request. Please try again later.";

/// Appended when a turn exhausts its model-call budget.
pub const ITERATION_LIMIT_MESSAGE: &str =
    "I've reached the maximum number of tool call iterations. Please provide further guidance.";

/// Where a turn currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    AwaitingApproval,
    AwaitingTools,
    Done,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The model answered; the text is also the last assistant message.
    Completed { answer: String },
    /// Tool calls are waiting for [`AgentLoop::resolve_approval`].
    AwaitingApproval { pending: Vec<ToolCall> },
}

impl TurnOutcome {
    pub fn answer(&self) -> Option<&str> {
        match self {
            TurnOutcome::Completed { answer } => Some(answer),
            TurnOutcome::AwaitingApproval { .. } => None,
        }
    }
}

/// A human decision on the pending tool calls.
#[derive(Debug, Clone, PartialEq)]
pub enum Approval {
    Approve,
    Reject { reason: String },
}

/// The core agent loop that orchestrates model calls and tool execution.
///
/// One turn: append the human message, then alternate between asking the
/// model and running the tools it requests until it answers. Provider
/// failures end the turn with [`MODEL_FAILURE_MESSAGE`]; tool failures are
/// reported back to the model. Only store failures escape.
pub struct AgentLoop {
    gateway: ModelGateway,
    executor: ToolExecutor,
    store: Arc<SessionStore>,
    events: Arc<EventBus>,

    /// Model calls per turn (0 = unlimited)
    max_iterations: usize,

    model_timeout: Duration,

    /// Pause before every tool dispatch
    require_approval: bool,

    parallel_tools: bool,
}

impl AgentLoop {
    pub fn new(
        gateway: ModelGateway,
        executor: ToolExecutor,
        store: Arc<SessionStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            gateway,
            executor,
            store,
            events,
            max_iterations: 25,
            model_timeout: Duration::from_secs(120),
            require_approval: false,
            parallel_tools: true,
        }
    }

    /// Wire a loop from application configuration.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        store: Arc<SessionStore>,
        events: Arc<EventBus>,
    ) -> Self {
        let gateway = ModelGateway::new(provider, &config.model, tools.definitions())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_streaming(config.streaming);
        let executor = ToolExecutor::new(tools, Duration::from_secs(config.agent.tool_timeout_secs));
        Self::new(gateway, executor, store, events).with_agent_config(&config.agent)
    }

    /// Apply the `[agent]` section (the tool timeout lives on the executor).
    pub fn with_agent_config(self, agent: &AgentConfig) -> Self {
        self.with_max_iterations(agent.max_iterations)
            .with_model_timeout(Duration::from_secs(agent.model_timeout_secs))
            .with_approval(agent.require_approval)
            .with_parallel_tools(agent.parallel_tools)
    }

    /// Set the maximum number of model calls per turn.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Require a human decision before any tool runs.
    pub fn with_approval(mut self, required: bool) -> Self {
        self.require_approval = required;
        self
    }

    pub fn with_parallel_tools(mut self, parallel: bool) -> Self {
        self.parallel_tools = parallel;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        self.executor.registry()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn requires_approval(&self) -> bool {
        self.require_approval
    }

    /// Process one human message on a session.
    pub async fn run_turn(
        &self,
        session_id: &SessionId,
        text: impl Into<String>,
    ) -> Result<TurnOutcome, TurnError> {
        let text = text.into();
        let _guard = self.store.lock(session_id).await;

        let mut session = self.store.get(session_id).await?;
        if session.awaiting_approval {
            if !session.pending_calls().is_empty() {
                return Err(TurnError::ApprovalPending(session_id.clone()));
            }
            // Stale flag with nothing left to approve
            session = self.store.set_awaiting_approval(session_id, false).await?;
        }

        info!(
            session = %session_id,
            messages = session.messages.len(),
            "Starting turn"
        );
        self.events.publish(DomainEvent::TurnStarted {
            session_id: session_id.to_string(),
            content_preview: text.chars().take(80).collect(),
            timestamp: Utc::now(),
        });

        let mut batch = repair_interrupted(&session);
        if !batch.is_empty() {
            warn!(
                session = %session_id,
                unresolved = batch.len(),
                "Closing tool calls left open by an interrupted turn"
            );
        }
        batch.push(Message::human(text));
        let session = self.store.append(session_id, batch).await?;

        self.drive(session_id, session).await
    }

    /// Approve or reject the tool calls a gated turn is waiting on, then
    /// continue the turn.
    pub async fn resolve_approval(
        &self,
        session_id: &SessionId,
        approval: Approval,
    ) -> Result<TurnOutcome, TurnError> {
        let _guard = self.store.lock(session_id).await;

        let Some(session) = self.store.find(session_id).await? else {
            return Err(TurnError::NoPendingApproval(session_id.clone()));
        };
        let pending = session.pending_calls().to_vec();
        if !session.awaiting_approval || pending.is_empty() {
            return Err(TurnError::NoPendingApproval(session_id.clone()));
        }

        // Clear the gate first; a crash from here on is repaired by the next turn
        self.store.set_awaiting_approval(session_id, false).await?;

        let session = match approval {
            Approval::Approve => {
                info!(session = %session_id, calls = pending.len(), "Tool calls approved");
                self.transition(session_id, LoopState::AwaitingApproval, LoopState::AwaitingTools);
                self.dispatch(session_id, &pending).await?
            }
            Approval::Reject { reason } => {
                info!(session = %session_id, %reason, "Tool calls rejected");
                let rejected = pending
                    .iter()
                    .map(|call| {
                        Message::tool_result(unresolved(
                            call,
                            &format!("rejected by the user: {reason}"),
                        ))
                    })
                    .collect();
                self.store.append(session_id, rejected).await?
            }
        };

        self.transition(session_id, LoopState::AwaitingApproval, LoopState::AwaitingModel);
        self.drive(session_id, session).await
    }

    /// Run the model/tool alternation from `AwaitingModel` until the turn
    /// completes or pauses at the gate.
    async fn drive(
        &self,
        session_id: &SessionId,
        mut session: Session,
    ) -> Result<TurnOutcome, TurnError> {
        let mut iteration = 0;

        loop {
            if self.max_iterations > 0 && iteration >= self.max_iterations {
                warn!(
                    session = %session_id,
                    iterations = iteration,
                    "Max iterations reached, ending turn"
                );
                return self
                    .complete(session_id, ITERATION_LIMIT_MESSAGE.to_string(), iteration, false)
                    .await;
            }
            iteration += 1;
            debug!(session = %session_id, iteration, "Agent loop iteration");

            let response = match self.ask_model(&session.messages).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(session = %session_id, iteration, error = %e, "Model call failed");
                    return self
                        .complete(session_id, MODEL_FAILURE_MESSAGE.to_string(), iteration, true)
                        .await;
                }
            };

            self.events.publish(DomainEvent::ModelResponded {
                session_id: session_id.to_string(),
                iteration,
                tool_calls: match &response {
                    ModelResponse::ToolRequest(calls) => calls.len(),
                    ModelResponse::FinalAnswer(_) => 0,
                },
                timestamp: Utc::now(),
            });

            let calls = match response {
                ModelResponse::FinalAnswer(answer) => {
                    return self.complete(session_id, answer, iteration, false).await;
                }
                ModelResponse::ToolRequest(calls) => calls,
            };

            session = self
                .store
                .append(session_id, vec![Message::tool_calls(calls.clone())])
                .await?;

            if self.require_approval {
                self.transition(session_id, LoopState::AwaitingModel, LoopState::AwaitingApproval);
                self.store.set_awaiting_approval(session_id, true).await?;
                self.events.publish(DomainEvent::ApprovalRequested {
                    session_id: session_id.to_string(),
                    tool_names: calls.iter().map(|c| c.name.clone()).collect(),
                    timestamp: Utc::now(),
                });
                return Ok(TurnOutcome::AwaitingApproval { pending: calls });
            }

            self.transition(session_id, LoopState::AwaitingModel, LoopState::AwaitingTools);
            session = self.dispatch(session_id, &calls).await?;
            self.transition(session_id, LoopState::AwaitingTools, LoopState::AwaitingModel);
        }
    }

    async fn ask_model(&self, messages: &[Message]) -> Result<ModelResponse, ProviderError> {
        tokio::time::timeout(self.model_timeout, self.gateway.invoke(messages))
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!(
                    "no response from {} within {}s",
                    self.gateway.provider_name(),
                    self.model_timeout.as_secs()
                ))
            })?
    }

    /// Execute every call and append all results as one batch, in call order.
    async fn dispatch(
        &self,
        session_id: &SessionId,
        calls: &[ToolCall],
    ) -> Result<Session, TurnError> {
        debug!(session = %session_id, calls = calls.len(), parallel = self.parallel_tools, "Executing tool calls");

        let results = if self.parallel_tools {
            join_all(calls.iter().map(|call| self.run_tool(session_id, call))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.run_tool(session_id, call).await);
            }
            results
        };

        let messages = results.into_iter().map(Message::tool_result).collect();
        Ok(self.store.append(session_id, messages).await?)
    }

    async fn run_tool(&self, session_id: &SessionId, call: &ToolCall) -> ToolResult {
        let start = Instant::now();
        let result = self.executor.execute(call).await;
        self.events.publish(DomainEvent::ToolExecuted {
            session_id: session_id.to_string(),
            tool_name: call.name.clone(),
            success: result.success,
            duration_ms: start.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });
        result
    }

    async fn complete(
        &self,
        session_id: &SessionId,
        answer: String,
        iterations: usize,
        model_failed: bool,
    ) -> Result<TurnOutcome, TurnError> {
        self.store
            .append(session_id, vec![Message::answer(answer.clone())])
            .await?;
        self.transition(session_id, LoopState::AwaitingModel, LoopState::Done);
        self.events.publish(DomainEvent::TurnCompleted {
            session_id: session_id.to_string(),
            iterations,
            model_failed,
            timestamp: Utc::now(),
        });
        info!(session = %session_id, iterations, model_failed, "Turn completed");
        Ok(TurnOutcome::Completed { answer })
    }

    fn transition(&self, session_id: &SessionId, from: LoopState, to: LoopState) {
        debug!(session = %session_id, ?from, ?to, "Loop state transition");
    }
}

/// Failure results for calls a previous turn never resolved.
fn repair_interrupted(session: &Session) -> Vec<Message> {
    session
        .pending_calls()
        .iter()
        .map(|call| Message::tool_result(unresolved(call, "interrupted before completion")))
        .collect()
}

fn unresolved(call: &ToolCall, reason: &str) -> ToolResult {
    ToolResult {
        call_id: call.id.clone(),
        tool_name: call.name.clone(),
        success: false,
        output: format!("Error: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use toolwright_core::error::StoreError;
    use toolwright_core::message::{AssistantBody, Role};
    use toolwright_core::provider::ProviderResponse;
    use toolwright_core::tool::Tool;
    use toolwright_store::InMemoryBackend;

    struct Harness {
        agent: AgentLoop,
        provider: Arc<ScriptedProvider>,
        store: Arc<SessionStore>,
    }

    fn harness(
        responses: Vec<Result<ProviderResponse, ProviderError>>,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Harness {
        harness_with(ScriptedProvider::new(responses), tools)
    }

    fn harness_with(provider: ScriptedProvider, tools: Vec<Arc<dyn Tool>>) -> Harness {
        let provider = Arc::new(provider);
        let registry = registry_with(tools);
        let store = Arc::new(SessionStore::new(
            Arc::new(InMemoryBackend::new()),
            "You are a helpful assistant.",
        ));
        let gateway = ModelGateway::new(provider.clone(), "mock-model", registry.definitions());
        let executor = ToolExecutor::new(registry, Duration::from_secs(30));
        let agent = AgentLoop::new(gateway, executor, Arc::clone(&store), Arc::new(EventBus::default()));
        Harness {
            agent,
            provider,
            store,
        }
    }

    fn roles(session: &Session) -> Vec<Role> {
        session.messages.iter().map(Message::role).collect()
    }

    #[tokio::test]
    async fn simple_text_response() {
        let h = harness(vec![Ok(text_response("Hello! How can I help?"))], vec![]);
        let id = SessionId::from("s1");

        let outcome = h.agent.run_turn(&id, "Hello!").await.unwrap();
        assert_eq!(outcome.answer(), Some("Hello! How can I help?"));

        let session = h.store.get(&id).await.unwrap();
        assert_eq!(roles(&session), vec![Role::System, Role::Human, Role::Assistant]);
        assert!(session.validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn two_calls_yield_two_ordered_results_before_next_model_call() {
        // The first call finishes last
        let h = harness(
            vec![
                Ok(tool_response(vec![
                    raw_call("c1", "slow", "{}"),
                    raw_call("c2", "fast", "{}"),
                ])),
                Ok(text_response("both done")),
            ],
            vec![
                Arc::new(SleepyTool::new("slow", 500)),
                Arc::new(SleepyTool::new("fast", 10)),
            ],
        );
        let id = SessionId::from("order");

        let outcome = h.agent.run_turn(&id, "run both").await.unwrap();
        assert_eq!(outcome.answer(), Some("both done"));

        let second = &h.provider.requests()[1].messages;
        let tail: Vec<_> = second[second.len() - 2..].to_vec();
        match (&tail[0], &tail[1]) {
            (
                Message::Tool { call_id: a, content: ca, .. },
                Message::Tool { call_id: b, content: cb, .. },
            ) => {
                assert_eq!((a.as_str(), b.as_str()), ("c1", "c2"));
                assert_eq!((ca.as_str(), cb.as_str()), ("slow done", "fast done"));
            }
            other => panic!("expected two tool messages, got {other:?}"),
        }
        assert!(h.store.get(&id).await.unwrap().validate().is_ok());
    }

    #[tokio::test]
    async fn sequential_dispatch_keeps_order() {
        let h = harness(
            vec![
                Ok(tool_response(vec![
                    raw_call("c1", "a", "{}"),
                    raw_call("c2", "b", "{}"),
                ])),
                Ok(text_response("ok")),
            ],
            vec![Arc::new(SleepyTool::new("a", 1)), Arc::new(SleepyTool::new("b", 1))],
        );
        let agent = h.agent.with_parallel_tools(false);
        let id = SessionId::from("seq");
        agent.run_turn(&id, "go").await.unwrap();

        let session = h.store.get(&id).await.unwrap();
        let ids: Vec<_> = session
            .messages
            .iter()
            .filter_map(|m| match m {
                Message::Tool { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn transport_error_appends_exactly_one_apology() {
        let h = harness(
            vec![Err(ProviderError::Network("connection refused".into()))],
            vec![],
        );
        let id = SessionId::from("down");

        let outcome = h.agent.run_turn(&id, "hi").await.unwrap();
        assert_eq!(outcome.answer(), Some(MODEL_FAILURE_MESSAGE));

        let session = h.store.get(&id).await.unwrap();
        assert_eq!(session.messages.len(), 3);
        assert_eq!(session.last_answer(), Some(MODEL_FAILURE_MESSAGE));
        assert!(session.pending_calls().is_empty());
    }

    #[tokio::test]
    async fn failure_after_tool_round_leaves_no_dangling_calls() {
        let h = harness(
            vec![
                Ok(tool_response(vec![raw_call("c1", "t", "{}")])),
                Err(ProviderError::RateLimited { retry_after_secs: 3 }),
            ],
            vec![Arc::new(SleepyTool::new("t", 1))],
        );
        let id = SessionId::from("mid");
        let outcome = h.agent.run_turn(&id, "hi").await.unwrap();
        assert_eq!(outcome.answer(), Some(MODEL_FAILURE_MESSAGE));

        let session = h.store.get(&id).await.unwrap();
        assert_eq!(
            roles(&session),
            vec![Role::System, Role::Human, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert!(session.validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn model_timeout_is_a_model_failure() {
        let provider = ScriptedProvider::new(vec![Ok(text_response("too late"))])
            .with_delay(Duration::from_secs(600));
        let h = harness_with(provider, vec![]);
        let agent = h.agent.with_model_timeout(Duration::from_secs(5));

        let outcome = agent.run_turn(&SessionId::from("slow"), "hi").await.unwrap();
        assert_eq!(outcome.answer(), Some(MODEL_FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn tool_failure_is_reported_and_loop_continues() {
        let h = harness(
            vec![
                Ok(tool_response(vec![raw_call("c1", "flaky", "{}")])),
                Ok(text_response("The lookup failed, sorry.")),
            ],
            vec![Arc::new(FailingTool("upstream returned 404"))],
        );
        let id = SessionId::from("fail");

        let outcome = h.agent.run_turn(&id, "weather?").await.unwrap();
        assert_eq!(outcome.answer(), Some("The lookup failed, sorry."));

        let session = h.store.get(&id).await.unwrap();
        let Message::Tool { success, content, .. } = &session.messages[3] else {
            panic!("expected tool message");
        };
        assert!(!success);
        assert!(content.contains("upstream returned 404"));
        assert_eq!(h.provider.call_count(), 2);
    }

    #[tokio::test]
    async fn iteration_cap_ends_turn() {
        let looping = || Ok(tool_response(vec![raw_call("c", "t", "{}")]));
        let h = harness(
            vec![looping(), looping(), looping()],
            vec![Arc::new(SleepyTool::new("t", 1))],
        );
        let agent = h.agent.with_max_iterations(2);
        let id = SessionId::from("cap");

        let outcome = agent.run_turn(&id, "loop forever").await.unwrap();
        assert_eq!(outcome.answer(), Some(ITERATION_LIMIT_MESSAGE));
        assert_eq!(h.provider.call_count(), 2);
        assert!(h.store.get(&id).await.unwrap().validate().is_ok());
    }

    #[tokio::test]
    async fn history_is_carried_across_turns() {
        let h = harness(
            vec![
                Ok(text_response("Nice to meet you, Ada.")),
                Ok(text_response("Your name is Ada.")),
            ],
            vec![],
        );
        let id = SessionId::from("memory");
        h.agent.run_turn(&id, "I am Ada").await.unwrap();
        h.agent.run_turn(&id, "Who am I?").await.unwrap();

        let second = &h.provider.requests()[1].messages;
        assert_eq!(second.len(), 4);
        assert_eq!(second[1].text(), Some("I am Ada"));
        assert_eq!(second[2].text(), Some("Nice to meet you, Ada."));
    }

    #[tokio::test]
    async fn invariant_holds_over_many_turns() {
        let mut script = Vec::new();
        for i in 0..5 {
            script.push(Ok(tool_response(vec![
                raw_call(&format!("a{i}"), "t", "{}"),
                raw_call(&format!("b{i}"), "t", "{}"),
            ])));
            script.push(Ok(text_response(&format!("answer {i}"))));
        }
        let h = harness(script, vec![Arc::new(SleepyTool::new("t", 1))]);
        let id = SessionId::from("many");
        for i in 0..5 {
            h.agent.run_turn(&id, format!("question {i}")).await.unwrap();
        }
        let session = h.store.get(&id).await.unwrap();
        assert!(session.validate().is_ok());
        assert_eq!(session.messages.len(), 1 + 5 * 5);
    }

    #[tokio::test]
    async fn gate_pauses_then_approval_runs_tools() {
        let h = harness(
            vec![
                Ok(tool_response(vec![raw_call("c1", "t", "{}")])),
                Ok(text_response("done")),
            ],
            vec![Arc::new(SleepyTool::new("t", 1))],
        );
        let agent = h.agent.with_approval(true);
        let id = SessionId::from("gate");

        let outcome = agent.run_turn(&id, "do it").await.unwrap();
        let TurnOutcome::AwaitingApproval { pending } = outcome else {
            panic!("expected the gate to open");
        };
        assert_eq!(pending[0].id, "c1");
        assert!(h.store.get(&id).await.unwrap().awaiting_approval);

        // A new message is refused while the gate is open
        let err = agent.run_turn(&id, "hello?").await.unwrap_err();
        assert!(matches!(err, TurnError::ApprovalPending(_)));

        let outcome = agent.resolve_approval(&id, Approval::Approve).await.unwrap();
        assert_eq!(outcome.answer(), Some("done"));

        let session = h.store.get(&id).await.unwrap();
        assert!(!session.awaiting_approval);
        assert!(session.validate().is_ok());
        let Message::Tool { success, content, .. } = &session.messages[3] else {
            panic!("expected tool message");
        };
        assert!(success);
        assert_eq!(content, "t done");
    }

    #[tokio::test]
    async fn rejection_reports_reason_to_model() {
        let h = harness(
            vec![
                Ok(tool_response(vec![
                    raw_call("c1", "t", "{}"),
                    raw_call("c2", "t", "{}"),
                ])),
                Ok(text_response("Understood, I won't.")),
            ],
            vec![Arc::new(SleepyTool::new("t", 1))],
        );
        let agent = h.agent.with_approval(true);
        let id = SessionId::from("reject");
        agent.run_turn(&id, "do it").await.unwrap();

        let outcome = agent
            .resolve_approval(&id, Approval::Reject { reason: "too risky".into() })
            .await
            .unwrap();
        assert_eq!(outcome.answer(), Some("Understood, I won't."));

        let session = h.store.get(&id).await.unwrap();
        let rejected: Vec<_> = session
            .messages
            .iter()
            .filter_map(|m| match m {
                Message::Tool { success: false, content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(rejected.len(), 2);
        assert!(rejected.iter().all(|c| c.contains("rejected by the user: too risky")));
        assert!(session.validate().is_ok());
    }

    #[tokio::test]
    async fn approval_without_pending_calls_is_an_error() {
        let h = harness(vec![], vec![]);
        let err = h
            .agent
            .resolve_approval(&SessionId::from("none"), Approval::Approve)
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::NoPendingApproval(_)));
    }

    #[tokio::test]
    async fn interrupted_turn_is_repaired() {
        let h = harness(vec![Ok(text_response("fresh start"))], vec![]);
        let id = SessionId::from("crash");
        h.store
            .append(
                &id,
                vec![
                    Message::human("first"),
                    Message::tool_calls(vec![ToolCall::new("c9", "t", serde_json::json!({}))]),
                ],
            )
            .await
            .unwrap();

        h.agent.run_turn(&id, "again").await.unwrap();
        let session = h.store.get(&id).await.unwrap();
        assert!(session.validate().is_ok());
        let Message::Tool { call_id, success, content, .. } = &session.messages[3] else {
            panic!("expected repair message");
        };
        assert_eq!(call_id, "c9");
        assert!(!success);
        assert!(content.contains("interrupted before completion"));
        assert_eq!(session.messages[4].text(), Some("again"));
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let registry = registry_with(vec![]);
        let store = Arc::new(SessionStore::new(Arc::new(BrokenBackend), "sys"));
        let agent = AgentLoop::new(
            ModelGateway::new(provider, "m", vec![]),
            ToolExecutor::new(registry, Duration::from_secs(1)),
            store,
            Arc::new(EventBus::default()),
        );
        let err = agent.run_turn(&SessionId::from("x"), "hi").await.unwrap_err();
        assert!(matches!(err, TurnError::Store(StoreError::Storage(_))));
    }

    #[tokio::test]
    async fn events_follow_the_turn() {
        let h = harness(
            vec![
                Ok(tool_response(vec![raw_call("c1", "t", "{}")])),
                Ok(text_response("ok")),
            ],
            vec![Arc::new(SleepyTool::new("t", 1))],
        );
        let mut rx = h.agent.events().subscribe();
        h.agent.run_turn(&SessionId::from("ev"), "go").await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match &*event {
                DomainEvent::TurnStarted { .. } => "started",
                DomainEvent::ModelResponded { .. } => "model",
                DomainEvent::ToolExecuted { .. } => "tool",
                DomainEvent::ApprovalRequested { .. } => "approval",
                DomainEvent::TurnCompleted { .. } => "completed",
            });
        }
        assert_eq!(kinds, vec!["started", "model", "tool", "model", "completed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn turns_on_one_session_are_serialized() {
        let provider = ScriptedProvider::new(vec![
            Ok(text_response("first")),
            Ok(text_response("second")),
        ])
        .with_delay(Duration::from_millis(100));
        let h = harness_with(provider, vec![]);
        let agent = Arc::new(h.agent);
        let id = SessionId::from("busy");

        let a = {
            let agent = Arc::clone(&agent);
            let id = id.clone();
            tokio::spawn(async move { agent.run_turn(&id, "one").await })
        };
        let b = {
            let agent = Arc::clone(&agent);
            let id = id.clone();
            tokio::spawn(async move { agent.run_turn(&id, "two").await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let session = h.store.get(&id).await.unwrap();
        assert_eq!(
            roles(&session),
            vec![Role::System, Role::Human, Role::Assistant, Role::Human, Role::Assistant]
        );
        // The second turn saw the first turn's answer
        let second = &h.provider.requests()[1].messages;
        assert_eq!(second.len(), 4);
        assert!(matches!(
            &second[2],
            Message::Assistant { body: AssistantBody::Answer(_) }
        ));
    }
}
