//! In-process fakes shared by the agent tests

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::client::{ChatBackend, DeltaStream};
use super::types::{ChatDelta, ChatRequest, ModelResponse, ToolCallFragment};
use crate::error::{Error, Result};
use crate::tools::{ToolConnector, ToolDescriptor, ToolInvocationResult};

/// Backend that replays a fixed script of responses
pub(crate) struct ScriptedBackend {
    script: Mutex<VecDeque<Result<ModelResponse>>>,
    /// Returned once the script runs out
    fallback: Option<ModelResponse>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub(crate) fn new(script: Vec<Result<ModelResponse>>) -> Self {
        ScriptedBackend {
            script: Mutex::new(script.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with `response`
    pub(crate) fn always(response: ModelResponse) -> Self {
        ScriptedBackend {
            fallback: Some(response),
            ..Self::new(vec![])
        }
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &ChatRequest) -> Result<ModelResponse> {
        self.requests.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(item) => item,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| Error::Backend("script exhausted".into())),
        }
    }
}

/// Split a response into several deltas the way a real stream would
fn to_deltas(response: ModelResponse) -> Vec<ChatDelta> {
    let mut deltas = Vec::new();
    let split = response.content.len() / 2;
    let split = (split..=response.content.len())
        .find(|i| response.content.is_char_boundary(*i))
        .unwrap_or(0);
    let (head, tail) = response.content.split_at(split);
    for part in [head, tail] {
        if !part.is_empty() {
            deltas.push(ChatDelta {
                content: Some(part.to_string()),
                tool_calls: vec![],
            });
        }
    }

    for (index, call) in response.tool_calls.into_iter().enumerate() {
        let index = index as u32;
        deltas.push(ChatDelta {
            content: None,
            tool_calls: vec![ToolCallFragment {
                index,
                id: Some(call.id),
                name: Some(call.name),
                arguments: None,
            }],
        });
        for ch in call.arguments.chars() {
            deltas.push(ChatDelta {
                content: None,
                tool_calls: vec![ToolCallFragment {
                    index,
                    arguments: Some(ch.to_string()),
                    ..Default::default()
                }],
            });
        }
    }
    deltas
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<ModelResponse> {
        self.next(request)
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<DeltaStream> {
        let response = self.next(request)?;
        let deltas: Vec<Result<ChatDelta>> = to_deltas(response).into_iter().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(deltas)))
    }
}

/// Counters observed by tests after the connector is handed to an agent
#[derive(Default)]
pub(crate) struct ConnectorTally {
    pub(crate) inits: AtomicUsize,
    pub(crate) closes: AtomicUsize,
    pub(crate) invocations: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl ConnectorTally {
    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn invocations(&self) -> Vec<(String, Map<String, Value>)> {
        self.invocations.lock().unwrap().clone()
    }
}

/// Connector serving fixed tools that answer with a fixed output
pub(crate) struct FakeConnector {
    name: String,
    advertised: Vec<ToolDescriptor>,
    tools: Vec<ToolDescriptor>,
    output: Value,
    fail_init: bool,
    tally: Arc<ConnectorTally>,
}

impl FakeConnector {
    pub(crate) fn new(name: &str, tools: &[&str], output: Value) -> (Self, Arc<ConnectorTally>) {
        let tally = Arc::new(ConnectorTally::default());
        let connector = FakeConnector {
            name: name.to_string(),
            advertised: tools
                .iter()
                .map(|t| ToolDescriptor::new(*t, Some(format!("{} tool", t)), None))
                .collect(),
            tools: Vec::new(),
            output,
            fail_init: false,
            tally: tally.clone(),
        };
        (connector, tally)
    }

    pub(crate) fn failing(name: &str) -> (Self, Arc<ConnectorTally>) {
        let (mut connector, tally) = Self::new(name, &[], Value::Null);
        connector.fail_init = true;
        (connector, tally)
    }
}

#[async_trait]
impl ToolConnector for FakeConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&mut self) -> Result<()> {
        self.tally.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(Error::Connection(format!("{} refused to start", self.name)));
        }
        self.tools = self.advertised.clone();
        Ok(())
    }

    fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    async fn invoke(&self, tool_name: &str, arguments: Map<String, Value>) -> ToolInvocationResult {
        self.tally
            .invocations
            .lock()
            .unwrap()
            .push((tool_name.to_string(), arguments));
        ToolInvocationResult::success(self.output.clone())
    }

    async fn close(&mut self) {
        self.tally.closes.fetch_add(1, Ordering::SeqCst);
        self.tools.clear();
    }
}
