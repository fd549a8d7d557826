//! Bounded request/act/observe loop.
//!
//! Advances the conversation, executes the requested tool calls against the
//! connectors, feeds results back and repeats until the model stops asking
//! for tools or the iteration budget runs out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Map;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::conversation::ConversationModel;
use super::types::{ModelResponse, ToolCallRequest};
use crate::error::{Error, Result};
use crate::tools::{ToolConnector, ToolRegistry};

/// Content reported to the model for a name no connector exposes
pub const TOOL_NOT_FOUND: &str = "Tool not found";

/// Tool results longer than this are truncated in logs
const LOG_PREVIEW_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configurable limits for the agentic loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum tool-call batches before the loop stops.
    pub max_iterations: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        LoopConfig { max_iterations: 10 }
    }
}

impl LoopConfig {
    pub fn with_max_iterations(max_iterations: u32) -> Self {
        LoopConfig { max_iterations }
    }
}

// ---------------------------------------------------------------------------
// Structured trace types
// ---------------------------------------------------------------------------

/// A recorded action (tool call) and its observation (result).
#[derive(Debug, Clone)]
pub struct ToolAction {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: String,
    pub observation: ToolObservation,
}

/// The result of executing a single tool call.
#[derive(Debug, Clone)]
pub struct ToolObservation {
    pub success: bool,
    /// Content appended to the transcript
    pub content: String,
    pub duration_ms: u64,
}

/// One tool-call batch.
#[derive(Debug, Clone)]
pub struct LoopStep {
    pub iteration: u32,
    /// Text the model produced alongside the tool calls (may be empty).
    pub thought: String,
    pub actions: Vec<ToolAction>,
    /// When the batch started
    pub timestamp: DateTime<Utc>,
}

/// Full trace of a loop execution.
#[derive(Debug, Clone)]
pub struct LoopTrace {
    pub steps: Vec<LoopStep>,
    pub outcome: LoopOutcome,
    pub total_duration_ms: u64,
}

impl LoopTrace {
    /// Number of tool calls across all steps
    pub fn tool_calls(&self) -> usize {
        self.steps.iter().map(|s| s.actions.len()).sum()
    }
}

/// How the loop finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The model answered without requesting tools.
    Completed,
    /// The budget ran out while the model still requested tools.
    MaxIterationsExceeded,
}

// ---------------------------------------------------------------------------
// Callback trait
// ---------------------------------------------------------------------------

/// Trait for callers to hook into loop events (e.g. print progress to the
/// terminal).
#[async_trait]
pub trait LoopCallback: Send + Sync {
    /// Called before each tool-call batch runs.
    async fn on_iteration_start(&self, _iteration: u32) {}
    /// Called after each individual tool has been executed.
    async fn on_tool_executed(&self, _tool_name: &str, _observation: &ToolObservation) {}
    /// Called after all results of a batch are in the transcript.
    async fn on_iteration_end(&self, _step: &LoopStep) {}
    /// Called once after the loop terminates.
    async fn on_loop_complete(&self, _trace: &LoopTrace) {}
}

/// Default no-op callback.
#[derive(Debug, Default)]
pub struct NoOpCallback;

impl NoOpCallback {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LoopCallback for NoOpCallback {}

// ---------------------------------------------------------------------------
// Core loop implementation
// ---------------------------------------------------------------------------

/// The result of running the agentic loop.
#[derive(Debug, Clone)]
pub struct AgentLoopOutput {
    /// Content of the last model response (empty if it had none).
    pub response: String,
    /// Structured trace of the full execution.
    pub trace: LoopTrace,
}

/// Run the loop for one prompt.
///
/// Backend errors abort the loop and are returned as-is; tool failures and
/// unknown tools are reported to the model and the loop continues.
pub async fn run_agentic_loop<C: LoopCallback + ?Sized>(
    conversation: &mut ConversationModel,
    registry: &ToolRegistry,
    connectors: &[Box<dyn ToolConnector>],
    prompt: &str,
    config: &LoopConfig,
    callback: &C,
) -> Result<AgentLoopOutput> {
    let loop_start = Instant::now();
    let mut steps: Vec<LoopStep> = Vec::new();
    let mut iteration: u32 = 0;

    let mut response = conversation.advance(Some(prompt)).await?;

    let outcome = loop {
        if !response.has_tool_calls() {
            break LoopOutcome::Completed;
        }
        if iteration >= config.max_iterations {
            warn!(
                "Agent loop exceeded {} iterations with {} tool call(s) unanswered",
                config.max_iterations,
                response.tool_calls.len()
            );
            break LoopOutcome::MaxIterationsExceeded;
        }

        iteration += 1;
        info!("Agent loop iteration {}/{}", iteration, config.max_iterations);
        callback.on_iteration_start(iteration).await;

        let step = execute_batch(conversation, registry, connectors, &response, iteration, callback).await;
        callback.on_iteration_end(&step).await;
        steps.push(step);

        response = conversation.advance(None).await?;
    };

    let trace = LoopTrace {
        steps,
        outcome,
        total_duration_ms: loop_start.elapsed().as_millis() as u64,
    };
    callback.on_loop_complete(&trace).await;

    info!(
        "Agentic loop finished: outcome={:?}, iterations={}, tool_calls={}, duration={}ms",
        trace.outcome,
        iteration,
        trace.tool_calls(),
        trace.total_duration_ms,
    );

    Ok(AgentLoopOutput {
        response: response.content,
        trace,
    })
}

/// Execute one batch sequentially in source order
async fn execute_batch<C: LoopCallback + ?Sized>(
    conversation: &mut ConversationModel,
    registry: &ToolRegistry,
    connectors: &[Box<dyn ToolConnector>],
    response: &ModelResponse,
    iteration: u32,
    callback: &C,
) -> LoopStep {
    let timestamp = Utc::now();
    let mut actions = Vec::with_capacity(response.tool_calls.len());

    for call in &response.tool_calls {
        let observation = execute_call(registry, connectors, call).await;
        conversation.append_tool_result(&call.id, observation.content.clone());
        callback.on_tool_executed(&call.name, &observation).await;

        actions.push(ToolAction {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            observation,
        });
    }

    LoopStep {
        iteration,
        thought: response.content.clone(),
        actions,
        timestamp,
    }
}

async fn execute_call(
    registry: &ToolRegistry,
    connectors: &[Box<dyn ToolConnector>],
    call: &ToolCallRequest,
) -> ToolObservation {
    let started = Instant::now();

    let connector = registry.resolve(&call.name).and_then(|index| {
        connectors
            .get(index)
            .ok_or_else(|| Error::ToolNotFound(call.name.clone()))
    });
    let connector = match connector {
        Ok(connector) => connector,
        Err(e) => {
            warn!("{}", e);
            return ToolObservation {
            success: false,
                content: TOOL_NOT_FOUND.to_string(),
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }
    };

    let arguments = call.parse_arguments().unwrap_or_else(|e| {
        warn!("Failed to parse tool arguments for {}: {}", call.name, e);
        Map::new()
    });

    info!("Executing tool: {} on {}", call.name, connector.name());
    debug!("Tool {} arguments: {}", call.name, call.arguments);

    let result = connector.invoke(&call.name, arguments).await;
    let content = result.to_content();
    let duration_ms = started.elapsed().as_millis() as u64;

    if result.is_success() {
        info!(
            "Tool {} completed in {}ms: {}",
            call.name,
            duration_ms,
            preview(&content)
        );
    } else {
        warn!("Tool {} failed after {}ms: {}", call.name, duration_ms, preview(&content));
    }

    ToolObservation {
        success: result.is_success(),
        content,
        duration_ms,
    }
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &content[..end]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{ConnectorTally, FakeConnector, ScriptedBackend};
    use crate::agent::types::Message;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::sync::Mutex;

    async fn setup(
        backend: ScriptedBackend,
        output: Value,
    ) -> (ConversationModel, ToolRegistry, Vec<Box<dyn ToolConnector>>, Arc<ConnectorTally>) {
        let (mut connector, tally) = FakeConnector::new("fake", &["echo"], output);
        connector.init().await.unwrap();
        let connectors: Vec<Box<dyn ToolConnector>> = vec![Box::new(connector)];
        let registry = ToolRegistry::build(&connectors);
        let conversation =
            ConversationModel::new(Arc::new(backend), "m", None, registry.descriptors(), None);
        (conversation, registry, connectors, tally)
    }

    #[tokio::test]
    async fn test_completes_without_tools() {
        let backend = ScriptedBackend::new(vec![Ok(ModelResponse::text("plain answer"))]);
        let (mut convo, registry, connectors, tally) = setup(backend, Value::Null).await;

        let output = run_agentic_loop(
            &mut convo,
            &registry,
            &connectors,
            "hi",
            &LoopConfig::default(),
            &NoOpCallback::new(),
        )
        .await
        .unwrap();

        assert_eq!(output.response, "plain answer");
        assert_eq!(output.trace.outcome, LoopOutcome::Completed);
        assert!(output.trace.steps.is_empty());
        assert!(tally.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_not_found_and_continues() {
        let backend = ScriptedBackend::new(vec![
            Ok(ModelResponse::with_tool_calls(
                "",
                vec![ToolCallRequest::new("c1", "missing", "{}")],
            )),
            Ok(ModelResponse::text("recovered")),
        ]);
        let (mut convo, registry, connectors, tally) = setup(backend, Value::Null).await;

        let output = run_agentic_loop(
            &mut convo,
            &registry,
            &connectors,
            "go",
            &LoopConfig::default(),
            &NoOpCallback::new(),
        )
        .await
        .unwrap();

        assert_eq!(output.response, "recovered");
        assert!(convo
            .messages()
            .contains(&Message::tool("c1", TOOL_NOT_FOUND)));
        assert!(tally.invocations().is_empty());
        assert!(!output.trace.steps[0].actions[0].observation.success);
    }

    #[tokio::test]
    async fn test_malformed_arguments_fall_back_to_empty_object() {
        let backend = ScriptedBackend::new(vec![
            Ok(ModelResponse::with_tool_calls(
                "",
                vec![
                    ToolCallRequest::new("c1", "echo", "{\"x\":"),
                    ToolCallRequest::new("c2", "echo", "\"just a string\""),
                ],
            )),
            Ok(ModelResponse::text("ok")),
        ]);
        let (mut convo, registry, connectors, tally) = setup(backend, json!("fine")).await;

        run_agentic_loop(
            &mut convo,
            &registry,
            &connectors,
            "go",
            &LoopConfig::default(),
            &NoOpCallback::new(),
        )
        .await
        .unwrap();

        let invocations = tally.invocations();
        assert_eq!(invocations.len(), 2);
        assert!(invocations.iter().all(|(name, args)| name == "echo" && args.is_empty()));
    }

    #[tokio::test]
    async fn test_iteration_budget() {
        let looping = ModelResponse::with_tool_calls(
            "",
            vec![ToolCallRequest::new("c", "echo", "{}")],
        );
        let (mut convo, registry, connectors, tally) =
            setup(ScriptedBackend::always(looping), json!("again")).await;

        let output = run_agentic_loop(
            &mut convo,
            &registry,
            &connectors,
            "go",
            &LoopConfig::with_max_iterations(3),
            &NoOpCallback::new(),
        )
        .await
        .unwrap();

        assert_eq!(output.trace.outcome, LoopOutcome::MaxIterationsExceeded);
        assert_eq!(output.trace.steps.len(), 3);
        assert!(output
            .trace
            .steps
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp));
        assert_eq!(tally.invocations().len(), 3);
        assert_eq!(output.response, "");
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LoopCallback for Recorder {
        async fn on_iteration_start(&self, iteration: u32) {
            self.events.lock().unwrap().push(format!("start {}", iteration));
        }
        async fn on_tool_executed(&self, tool_name: &str, observation: &ToolObservation) {
            self.events
                .lock()
                .unwrap()
                .push(format!("tool {} {}", tool_name, observation.content));
        }
        async fn on_iteration_end(&self, step: &LoopStep) {
            self.events.lock().unwrap().push(format!("end {}", step.iteration));
        }
        async fn on_loop_complete(&self, trace: &LoopTrace) {
            self.events
                .lock()
                .unwrap()
                .push(format!("complete {:?}", trace.outcome));
        }
    }

    #[tokio::test]
    async fn test_callback_events_in_order() {
        let backend = ScriptedBackend::new(vec![
            Ok(ModelResponse::with_tool_calls(
                "",
                vec![ToolCallRequest::new("c1", "echo", "{}")],
            )),
            Ok(ModelResponse::text("done")),
        ]);
        let (mut convo, registry, connectors, _tally) = setup(backend, json!({"v": 1})).await;
        let recorder = Recorder::default();

        run_agentic_loop(
            &mut convo,
            &registry,
            &connectors,
            "go",
            &LoopConfig::default(),
            &recorder,
        )
        .await
        .unwrap();

        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![
                "start 1".to_string(),
                "tool echo {\"v\":1}".to_string(),
                "end 1".to_string(),
                "complete Completed".to_string(),
            ]
        );
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(LOG_PREVIEW_CHARS + 5);
        let short = preview(&long);
        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), LOG_PREVIEW_CHARS + 3);
        assert_eq!(preview("tiny"), "tiny");
    }
}
