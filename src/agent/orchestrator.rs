//! Agent orchestrator
//!
//! Owns the connectors and the conversation for one run and drives the
//! lifecycle `Idle -> Initializing -> Running -> Closing -> Closed`.

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use super::agentic_loop::{run_agentic_loop, AgentLoopOutput, LoopCallback, LoopConfig, NoOpCallback};
use super::client::ChatBackend;
use super::conversation::{CompletionMode, ConversationModel};
use crate::error::{Error, Result};
use crate::tools::{ToolConnector, ToolRegistry};

/// Lifecycle state of an [`Agent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Initializing,
    Running,
    Closing,
    Closed,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentState::Idle => "idle",
            AgentState::Initializing => "initializing",
            AgentState::Running => "running",
            AgentState::Closing => "closing",
            AgentState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Per-run settings
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Model identifier sent to the backend
    pub model: String,
    pub system_prompt: Option<String>,
    /// Retrieved background context, injected as a prior user turn
    pub context: Option<String>,
    pub mode: CompletionMode,
    pub loop_config: LoopConfig,
}

impl AgentOptions {
    pub fn new(model: impl Into<String>) -> Self {
        AgentOptions {
            model: model.into(),
            system_prompt: None,
            context: None,
            mode: CompletionMode::Blocking,
            loop_config: LoopConfig::default(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_mode(mut self, mode: CompletionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.loop_config.max_iterations = max_iterations;
        self
    }
}

/// A single-use agent run
pub struct Agent {
    /// Connectors in registration order
    connectors: Vec<Box<dyn ToolConnector>>,
    backend: Arc<dyn ChatBackend>,
    options: AgentOptions,
    state: AgentState,
    /// Built once, after every connector is connected
    registry: ToolRegistry,
    /// Present only after a successful `init`
    conversation: Option<ConversationModel>,
    callback: Arc<dyn LoopCallback>,
}

impl Agent {
    pub fn new(
        connectors: Vec<Box<dyn ToolConnector>>,
        backend: Arc<dyn ChatBackend>,
        options: AgentOptions,
    ) -> Self {
        Agent {
            connectors,
            backend,
            options,
            state: AgentState::Idle,
            registry: ToolRegistry::new(),
            conversation: None,
            callback: Arc::new(NoOpCallback::new()),
        }
    }

    /// Receive loop events
    pub fn with_callback(mut self, callback: Arc<dyn LoopCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Connect every connector in registration order and build the
    /// conversation.
    ///
    /// The first connector failure aborts: connectors already connected are
    /// closed and the agent moves straight to `Closed`.
    pub async fn init(&mut self) -> Result<()> {
        if self.state != AgentState::Idle {
            return Err(Error::InvalidState(format!(
                "init requires an idle agent, current state is {}",
                self.state
            )));
        }
        self.state = AgentState::Initializing;

        for index in 0..self.connectors.len() {
            if let Err(e) = self.connectors[index].init().await {
                warn!(
                    "Connector '{}' failed to initialize: {}",
                    self.connectors[index].name(),
                    e
                );
                for connector in self.connectors[..index].iter_mut() {
                    connector.close().await;
                }
                self.state = AgentState::Closed;
                return Err(e);
            }
        }

        self.registry = ToolRegistry::build(&self.connectors);
        if !self.registry.duplicates().is_empty() {
            warn!(
                "Duplicate tool names resolved to their first connector: {:?}",
                self.registry.duplicates()
            );
        }

        let conversation = ConversationModel::new(
            self.backend.clone(),
            self.options.model.clone(),
            self.options.system_prompt.as_deref(),
            self.registry.descriptors(),
            self.options.context.as_deref(),
        )
        .with_mode(self.options.mode);

        info!(
            "Agent ready: {} connector(s), tools {:?}",
            self.connectors.len(),
            self.registry.names()
        );

        self.conversation = Some(conversation);
        self.state = AgentState::Running;
        Ok(())
    }

    /// Run the loop for `prompt` and return the final response content.
    ///
    /// Connectors are closed when this returns, whether or not it succeeded.
    pub async fn invoke(&mut self, prompt: &str) -> Result<String> {
        self.invoke_with_trace(prompt).await.map(|output| output.response)
    }

    /// Like [`Agent::invoke`], also returning the loop trace
    pub async fn invoke_with_trace(&mut self, prompt: &str) -> Result<AgentLoopOutput> {
        if self.state != AgentState::Running {
            return Err(Error::InvalidState(format!(
                "invoke requires a running agent, current state is {}",
                self.state
            )));
        }
        let mut conversation = self
            .conversation
            .take()
            .ok_or_else(|| Error::Internal("running agent without a conversation".to_string()))?;

        let result = run_agentic_loop(
            &mut conversation,
            &self.registry,
            &self.connectors,
            prompt,
            &self.options.loop_config,
            self.callback.as_ref(),
        )
        .await;

        self.conversation = Some(conversation);
        self.close().await;
        result
    }

    /// Close every connector exactly once. Idempotent.
    pub async fn close(&mut self) {
        if matches!(self.state, AgentState::Closing | AgentState::Closed) {
            return;
        }
        self.state = AgentState::Closing;
        for connector in self.connectors.iter_mut() {
            connector.close().await;
        }
        self.state = AgentState::Closed;
        info!("Agent closed");
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Routing table; empty until `init` succeeds
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// The conversation, once `init` has succeeded
    pub fn conversation(&self) -> Option<&ConversationModel> {
        self.conversation.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{FakeConnector, ScriptedBackend};
    use crate::agent::types::{Message, ModelResponse, ToolCallRequest};
    use serde_json::{json, Map, Value};

    fn boxed(connector: FakeConnector) -> Box<dyn ToolConnector> {
        Box::new(connector)
    }

    #[tokio::test]
    async fn test_echo_end_to_end() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(ModelResponse::with_tool_calls(
                "",
                vec![ToolCallRequest::new("call_1", "echo", r#"{"x":1}"#)],
            )),
            Ok(ModelResponse::text("done")),
        ]));
        let (echo, tally) = FakeConnector::new("echo-server", &["echo"], json!({"echoed": 1}));

        let mut agent = Agent::new(vec![boxed(echo)], backend.clone(), AgentOptions::new("m"));
        agent.init().await.unwrap();
        assert_eq!(agent.state(), AgentState::Running);

        let answer = agent.invoke("please echo").await.unwrap();
        assert_eq!(answer, "done");

        let mut expected = Map::new();
        expected.insert("x".into(), Value::from(1));
        assert_eq!(tally.invocations(), vec![("echo".to_string(), expected)]);
        assert_eq!(tally.closes(), 1);
        assert_eq!(agent.state(), AgentState::Closed);

        let transcript = agent.conversation().unwrap().messages();
        assert!(transcript.contains(&Message::tool("call_1", r#"{"echoed":1}"#)));
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_bounded_iterations_close_once() {
        let looping = ModelResponse::with_tool_calls(
            "thinking",
            vec![ToolCallRequest::new("c", "echo", "{}")],
        );
        let backend = Arc::new(ScriptedBackend::always(looping));
        let (echo, echo_tally) = FakeConnector::new("a", &["echo"], json!("again"));
        let (other, other_tally) = FakeConnector::new("b", &["other"], json!(null));

        let mut agent = Agent::new(
            vec![boxed(echo), boxed(other)],
            backend.clone(),
            AgentOptions::new("m"),
        );
        agent.init().await.unwrap();

        let output = agent.invoke_with_trace("loop forever").await.unwrap();
        assert_eq!(output.response, "thinking");
        assert_eq!(
            output.trace.outcome,
            crate::agent::LoopOutcome::MaxIterationsExceeded
        );

        assert_eq!(backend.requests().len(), 11);
        assert_eq!(echo_tally.invocations().len(), 10);
        assert_eq!(echo_tally.closes(), 1);
        assert_eq!(other_tally.closes(), 1);

        // Already closed: no second round of closes
        agent.close().await;
        assert_eq!(echo_tally.closes(), 1);
    }

    #[tokio::test]
    async fn test_init_failure_closes_connected_and_skips_conversation() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let (first, first_tally) = FakeConnector::new("first", &["echo"], json!(null));
        let (broken, broken_tally) = FakeConnector::failing("broken");
        let (last, last_tally) = FakeConnector::new("last", &["other"], json!(null));

        let mut agent = Agent::new(
            vec![boxed(first), boxed(broken), boxed(last)],
            backend.clone(),
            AgentOptions::new("m"),
        );

        let err = agent.init().await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert_eq!(agent.state(), AgentState::Closed);
        assert!(agent.conversation().is_none());

        assert_eq!(first_tally.closes(), 1);
        assert_eq!(broken_tally.inits.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(last_tally.inits.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(backend.requests().is_empty());

        assert!(matches!(agent.invoke("hi").await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_duplicate_tool_first_registration_wins() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(ModelResponse::with_tool_calls(
                "",
                vec![ToolCallRequest::new("c1", "lookup", "{}")],
            )),
            Ok(ModelResponse::text("ok")),
        ]));
        let (first, first_tally) = FakeConnector::new("first", &["lookup"], json!("from first"));
        let (second, second_tally) =
            FakeConnector::new("second", &["lookup", "extra"], json!("from second"));

        let mut agent = Agent::new(
            vec![boxed(first), boxed(second)],
            backend.clone(),
            AgentOptions::new("m"),
        );
        agent.init().await.unwrap();
        assert_eq!(agent.registry().duplicates(), ["lookup".to_string()]);

        agent.invoke("look it up").await.unwrap();

        assert_eq!(first_tally.invocations().len(), 1);
        assert!(second_tally.invocations().is_empty());

        let advertised: Vec<String> = backend.requests()[0]
            .tools
            .iter()
            .map(|t| t.function.name.clone())
            .collect();
        assert_eq!(advertised, vec!["lookup".to_string(), "extra".to_string()]);
    }

    #[tokio::test]
    async fn test_backend_failure_still_closes_connectors() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(Error::Backend(
            "upstream down".into(),
        ))]));
        let (echo, tally) = FakeConnector::new("echo", &["echo"], json!(null));

        let mut agent = Agent::new(vec![boxed(echo)], backend, AgentOptions::new("m"));
        agent.init().await.unwrap();

        let err = agent.invoke("hi").await.unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert_eq!(tally.closes(), 1);
        assert_eq!(agent.state(), AgentState::Closed);
    }

    #[tokio::test]
    async fn test_invoke_requires_running_state() {
        let backend = Arc::new(ScriptedBackend::always(ModelResponse::text("hi")));
        let mut agent = Agent::new(vec![], backend, AgentOptions::new("m"));

        assert!(matches!(agent.invoke("early").await, Err(Error::InvalidState(_))));

        agent.init().await.unwrap();
        assert_eq!(agent.invoke("now").await.unwrap(), "hi");
        assert!(matches!(agent.invoke("again").await, Err(Error::InvalidState(_))));
        assert!(matches!(agent.init().await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_system_prompt_and_context_precede_prompt() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(ModelResponse::text("fine"))]));
        let options = AgentOptions::new("m")
            .with_system_prompt("You are terse.")
            .with_context("Background: cats sit.");
        let mut agent = Agent::new(vec![], backend.clone(), options);
        agent.init().await.unwrap();
        agent.invoke("what do cats do?").await.unwrap();

        let sent = &backend.requests()[0].messages;
        assert_eq!(
            sent,
            &vec![
                Message::system("You are terse."),
                Message::user("Background: cats sit."),
                Message::user("what do cats do?"),
            ]
        );
        assert!(backend.requests()[0].tools.is_empty());
    }
}
