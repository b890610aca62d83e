//! External collaborator contracts: chat-model clients and tools.
//!
//! The core does not parse message formats or speak any provider wire
//! protocol. A [`ChatClient`] receives the state's `messages` value as-is
//! and returns either text or tool-call requests; a [`Tool`] exposes
//! provider-agnostic schema metadata and executes calls. The prebuilt
//! [`ChatNode`] and [`ToolNode`] wire these collaborators into the graph
//! and forward their request/response/error notifications through the run's
//! observer set, keyed by the executing node.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::control::NodeOutput;
use crate::node::{Node, NodeContext, NodeError};
use crate::observers::RunEvent;
use crate::state::{delta, GraphState};

/// Provider-agnostic function metadata for a tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON-Schema-like parameter object.
    pub parameters: Value,
}

/// One tool invocation requested by a model.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: Value,
}

/// What a chat-model call produced.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatReply {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
}

/// Chat-model client contract.
///
/// `messages` is passed through from state without interpretation; `tools`
/// carries the schemas bound to the calling node.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn call(&self, messages: &[Value], tools: &[ToolSchema]) -> Result<ChatReply, NodeError>;
}

/// Tool contract: schema metadata plus execution.
#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    async fn call(&self, request: &ToolCallRequest) -> Result<Value, NodeError>;
}

/// Prebuilt node delegating to a [`ChatClient`].
///
/// Reads the `messages` array from state (absent means empty), optionally
/// prepends a system prompt, and appends the reply as a single message
/// delta. Pair the messages key with an append reducer so turns accumulate.
pub struct ChatNode {
    client: Arc<dyn ChatClient>,
    system_prompt: Option<String>,
    tools: Vec<ToolSchema>,
    messages_key: String,
}

impl ChatNode {
    #[must_use]
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self {
            client,
            system_prompt: None,
            tools: Vec::new(),
            messages_key: "messages".to_string(),
        }
    }

    /// Prepend this system prompt to every call.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Bind tool schemas advertised on every call.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    /// Read messages from a different state key (default `messages`).
    #[must_use]
    pub fn with_messages_key(mut self, key: impl Into<String>) -> Self {
        self.messages_key = key.into();
        self
    }

    fn conversation(&self, state: &GraphState) -> Vec<Value> {
        let mut messages: Vec<Value> = state
            .get(&self.messages_key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if let Some(prompt) = &self.system_prompt {
            messages.insert(0, json!({"role": "system", "content": prompt}));
        }
        messages
    }
}

#[async_trait]
impl Node for ChatNode {
    async fn run(&self, state: &GraphState, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let messages = self.conversation(state);
        ctx.emit(RunEvent::LlmRequest {
            node: ctx.node.encode(),
            payload: json!({
                "messages": messages,
                "tools": self.tools.iter().map(|t| t.name.clone()).collect::<Vec<_>>(),
            }),
        });

        match self.client.call(&messages, &self.tools).await {
            Ok(ChatReply::Text(content)) => {
                ctx.emit(RunEvent::LlmResponse {
                    node: ctx.node.encode(),
                    payload: json!({"content": content}),
                });
                Ok(delta([(
                    self.messages_key.as_str(),
                    json!([{"role": "assistant", "content": content}]),
                )])
                .into())
            }
            Ok(ChatReply::ToolCalls(calls)) => {
                let calls_json: Vec<Value> = calls
                    .iter()
                    .map(|c| json!({"name": c.name, "arguments": c.arguments}))
                    .collect();
                ctx.emit(RunEvent::LlmResponse {
                    node: ctx.node.encode(),
                    payload: json!({"tool_calls": calls_json}),
                });
                Ok(delta([(
                    self.messages_key.as_str(),
                    json!([{"role": "assistant", "tool_calls": calls_json}]),
                )])
                .into())
            }
            Err(error) => {
                ctx.emit(RunEvent::LlmError {
                    node: ctx.node.encode(),
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }

    fn tag(&self) -> &str {
        "chat"
    }
}

/// Prebuilt node executing the tool calls found on the last message.
///
/// Each requested call produces one `role: "tool"` message carrying the
/// tool's result. A last message without tool calls yields an empty delta.
pub struct ToolNode {
    tools: FxHashMap<String, Arc<dyn Tool>>,
    messages_key: String,
}

impl ToolNode {
    #[must_use]
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let tools = tools
            .into_iter()
            .map(|tool| (tool.schema().name, tool))
            .collect();
        Self {
            tools,
            messages_key: "messages".to_string(),
        }
    }

    /// Read messages from a different state key (default `messages`).
    #[must_use]
    pub fn with_messages_key(mut self, key: impl Into<String>) -> Self {
        self.messages_key = key.into();
        self
    }

    fn pending_calls(&self, state: &GraphState) -> Vec<ToolCallRequest> {
        state
            .get(&self.messages_key)
            .and_then(Value::as_array)
            .and_then(|messages| messages.last())
            .and_then(|last| last.get("tool_calls"))
            .and_then(Value::as_array)
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|call| {
                        let name = call.get("name")?.as_str()?.to_string();
                        let arguments = call.get("arguments").cloned().unwrap_or(Value::Null);
                        Some(ToolCallRequest { name, arguments })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Node for ToolNode {
    async fn run(&self, state: &GraphState, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let calls = self.pending_calls(state);
        if calls.is_empty() {
            return Ok(NodeOutput::empty());
        }

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let tool = self.tools.get(&call.name).ok_or_else(|| {
                NodeError::ValidationFailed(format!("no tool registered as '{}'", call.name))
            })?;
            let outcome = tool.call(&call).await?;
            results.push(json!({
                "role": "tool",
                "name": call.name,
                "content": outcome,
            }));
        }
        Ok(delta([(self.messages_key.as_str(), Value::Array(results))]).into())
    }

    fn tag(&self) -> &str {
        "tool"
    }
}

/// Trivial client stub: echoes the last user message back as assistant
/// text. Used by the test-suite and as the minimal reference
/// implementation of the contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoClient;

#[async_trait]
impl ChatClient for EchoClient {
    async fn call(&self, messages: &[Value], _tools: &[ToolSchema]) -> Result<ChatReply, NodeError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.get("role").and_then(Value::as_str) == Some("user"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or("");
        Ok(ChatReply::Text(format!("echo: {last_user}")))
    }
}
