//! 模型服务边界
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：complete（一次性返回）、complete_stream（增量片段流）。
//! 请求携带完整消息序列、模型名、采样参数与可选的工具目录。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::core::LlmError;
use crate::memory::Message;
use crate::tools::ToolDescriptor;

/// 模型名与采样参数
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingParams {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            model: "qwen-plus".to_string(),
            temperature: 0.3,
            top_p: 1.0,
        }
    }
}

/// 一次模型调用的请求
#[derive(Clone, Debug)]
pub struct ModelRequest {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub messages: Vec<Message>,
    /// None 表示本次调用不附带工具目录
    pub tools: Option<Vec<ToolDescriptor>>,
}

impl ModelRequest {
    pub fn new(sampling: &SamplingParams, messages: &[Message]) -> Self {
        Self {
            model: sampling.model.clone(),
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            messages: messages.to_vec(),
            tools: None,
        }
    }

    /// 附带工具目录；空目录等同于不附带
    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = if tools.is_empty() { None } else { Some(tools) };
        self
    }
}

/// 一次性响应：assistant 消息（可能带 tool_calls）与结束原因
#[derive(Clone, Debug)]
pub struct Completion {
    pub message: Message,
    pub finish_reason: Option<String>,
}

/// 流式 tool call 片段：同一 index 的片段属于同一个调用
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// 增量响应中的一个片段
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fragment {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
    pub finish_reason: Option<String>,
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self {
            tool_calls: vec![delta],
            ..Default::default()
        }
    }
}

/// 片段流；流结束即 end-of-stream
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, LlmError>> + Send>>;

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 一次性完成
    async fn complete(&self, request: &ModelRequest) -> Result<Completion, LlmError>;

    /// 增量完成，返回片段流
    async fn complete_stream(&self, request: &ModelRequest) -> Result<FragmentStream, LlmError>;

    /// 累计 token 使用：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
