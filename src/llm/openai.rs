//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url，如 DashScope 兼容模式、DeepSeek、OpenAI）。
//! 请求/响应使用本模块的 serde 线格式（byot），以完整表达 tool_calls、tool 消息与流式 tool call delta。

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::Client;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::LlmError;
use crate::llm::{Completion, Fragment, FragmentStream, LlmClient, ModelRequest, ToolCallDelta};
use crate::memory::{Message, Role, ToolCallRequest};
use crate::tools::ToolDescriptor;

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client，模型名与采样参数随每次请求传入
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            usage: TokenUsage::new(),
        }
    }
}

// ---------- 请求线格式 ----------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef,
}

#[derive(Debug, Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&Message> for WireMessage {
    fn from(m: &Message) -> Self {
        let tool_calls = m.has_tool_calls().then(|| {
            m.tool_calls
                .iter()
                .map(|c| WireToolCall {
                    id: c.id.clone(),
                    kind: "function",
                    function: WireFunctionCall {
                        name: c.name.clone(),
                        arguments: c.arguments.clone(),
                    },
                })
                .collect()
        });
        // 只请求工具的 assistant 消息 content 可为 null
        let content = if m.has_tool_calls() && m.content.is_empty() {
            None
        } else {
            Some(m.model_content().to_string())
        };
        Self {
            role: m.role.as_str(),
            content,
            tool_calls,
            tool_call_id: m.tool_call_id.clone(),
            name: (m.role == Role::Tool).then(|| m.tool_name.clone()).flatten(),
        }
    }
}

impl From<&ToolDescriptor> for WireTool {
    fn from(d: &ToolDescriptor) -> Self {
        Self {
            kind: "function",
            function: WireFunctionDef {
                name: d.name.clone(),
                description: d.description.clone(),
                parameters: d.parameters.clone(),
            },
        }
    }
}

impl ChatRequest {
    fn build(request: &ModelRequest, stream: bool) -> Self {
        let tools: Option<Vec<WireTool>> = request
            .tools
            .as_ref()
            .map(|t| t.iter().map(WireTool::from).collect());
        Self {
            model: request.model.clone(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature: request.temperature,
            top_p: request.top_p,
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            stream,
            stream_options: stream.then(|| serde_json::json!({ "include_usage": true })),
        }
    }
}

// ---------- 响应线格式 ----------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    index: u32,
    id: Option<String>,
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    name: Option<String>,
    arguments: Option<String>,
}

impl From<ChatChunk> for Fragment {
    fn from(chunk: ChatChunk) -> Self {
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Fragment::default();
        };
        let tool_calls = choice
            .delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let (name, arguments) = tc
                    .function
                    .map(|f| (f.name, f.arguments))
                    .unwrap_or((None, None));
                ToolCallDelta {
                    index: tc.index,
                    id: tc.id,
                    name,
                    arguments,
                }
            })
            .collect();
        Fragment {
            content: choice.delta.content.filter(|c| !c.is_empty()),
            tool_calls,
            finish_reason: choice.finish_reason,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, request: &ModelRequest) -> Result<Completion, LlmError> {
        let body = ChatRequest::build(request, false);
        tracing::debug!(model = %body.model, messages = body.messages.len(), tools = body.tools.is_some(), "chat completion");

        let response: ChatResponse = self.client.chat().create_byot(body).await?;

        if let Some(usage) = &response.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::MalformedResponse("response has no choices".to_string()))?;

        let calls: Vec<ToolCallRequest> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest::new(tc.id, tc.function.name, tc.function.arguments))
            .collect();
        let content = choice.message.content.unwrap_or_default();

        Ok(Completion {
            message: Message::assistant_with_tool_calls(content, calls),
            finish_reason: choice.finish_reason,
        })
    }

    async fn complete_stream(&self, request: &ModelRequest) -> Result<FragmentStream, LlmError> {
        let body = ChatRequest::build(request, true);
        tracing::debug!(model = %body.model, messages = body.messages.len(), tools = body.tools.is_some(), "chat completion stream");

        let chunks: Pin<Box<dyn Stream<Item = Result<ChatChunk, OpenAIError>> + Send>> =
            self.client.chat().create_stream_byot(body).await?;

        let usage = self.usage.clone();
        let fragments = chunks.map(move |item| {
            let chunk = item.map_err(LlmError::from)?;
            if let Some(u) = &chunk.usage {
                usage.add(u.prompt_tokens, u.completion_tokens);
            }
            Ok(Fragment::from(chunk))
        });
        Ok(Box::pin(fragments))
    }
}
