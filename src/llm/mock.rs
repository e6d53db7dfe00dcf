//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按脚本依次返回回复；脚本用完后回显最后一条 user 消息。一次性与流式两种模式对同一脚本给出
//! 相同的最终文本（流式时把文本切成若干片段、把 tool call 拆成多个 delta）。
//! 每次调用的请求都会被记录，便于断言发给模型的内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::core::LlmError;
use crate::llm::{
    Completion, Fragment, FragmentStream, LlmClient, ModelRequest, ToolCallDelta, ToolCallTable,
};
use crate::memory::{Message, Role, ToolCallRequest};

/// 流式时每个文本片段的字符数
const CHUNK_CHARS: usize = 4;

/// 一条脚本化回复
#[derive(Clone, Debug)]
pub enum MockReply {
    /// 纯文本回复
    Text(String),
    /// 请求工具调用（可带文本）
    ToolCalls {
        content: String,
        calls: Vec<ToolCallRequest>,
    },
    /// 原样下发的片段序列（用于构造交错的 tool call 片段）
    Fragments(Vec<Fragment>),
    /// 下发若干片段后流出错
    BrokenStream(Vec<Fragment>, LlmError),
    /// 调用直接失败
    Error(LlmError),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        MockReply::ToolCalls {
            content: String::new(),
            calls: vec![ToolCallRequest::new(id, name, arguments)],
        }
    }
}

/// Mock 客户端：脚本队列 + 请求记录
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: MockReply) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(reply);
        }
    }

    /// 已收到的全部请求（按调用顺序）
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_reply(&self, request: &ModelRequest) -> MockReply {
        if let Ok(mut r) = self.requests.lock() {
            r.push(request.clone());
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| MockReply::Text(echo(&request.messages)))
    }
}

fn echo(messages: &[Message]) -> String {
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.model_content())
        .unwrap_or("(no input)");
    format!("Echo from Mock: {}", last_user)
}

fn text_fragments(text: &str) -> Vec<Fragment> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(CHUNK_CHARS)
        .map(|c| Fragment::text(c.iter().collect::<String>()))
        .collect()
}

/// tool call 拆成：首片段带 id + name，参数对半拆成两个片段
fn tool_call_fragments(index: u32, call: &ToolCallRequest) -> Vec<Fragment> {
    let chars: Vec<char> = call.arguments.chars().collect();
    let (head, tail) = chars.split_at(chars.len() / 2);
    vec![
        Fragment::tool_call(ToolCallDelta {
            index,
            id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            arguments: None,
        }),
        Fragment::tool_call(ToolCallDelta {
            index,
            arguments: Some(head.iter().collect()),
            ..Default::default()
        }),
        Fragment::tool_call(ToolCallDelta {
            index,
            arguments: Some(tail.iter().collect()),
            ..Default::default()
        }),
    ]
}

fn finish(mut fragments: Vec<Fragment>, reason: &str) -> Vec<Fragment> {
    fragments.push(Fragment {
        finish_reason: Some(reason.to_string()),
        ..Default::default()
    });
    fragments
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &ModelRequest) -> Result<Completion, LlmError> {
        match self.next_reply(request) {
            MockReply::Text(text) => Ok(Completion {
                message: Message::assistant(text),
                finish_reason: Some("stop".to_string()),
            }),
            MockReply::ToolCalls { content, calls } => Ok(Completion {
                message: Message::assistant_with_tool_calls(content, calls),
                finish_reason: Some("tool_calls".to_string()),
            }),
            MockReply::Fragments(fragments) => {
                let mut text = String::new();
                let mut table = ToolCallTable::new();
                for f in &fragments {
                    if let Some(c) = &f.content {
                        text.push_str(c);
                    }
                    table.merge_fragment(f);
                }
                let calls = table.finish();
                let finish_reason = if calls.is_empty() { "stop" } else { "tool_calls" };
                Ok(Completion {
                    message: Message::assistant_with_tool_calls(text, calls),
                    finish_reason: Some(finish_reason.to_string()),
                })
            }
            MockReply::BrokenStream(_, e) | MockReply::Error(e) => Err(e),
        }
    }

    async fn complete_stream(&self, request: &ModelRequest) -> Result<FragmentStream, LlmError> {
        let items: Vec<Result<Fragment, LlmError>> = match self.next_reply(request) {
            MockReply::Text(text) => finish(text_fragments(&text), "stop")
                .into_iter()
                .map(Ok)
                .collect(),
            MockReply::ToolCalls { content, calls } => {
                let mut fragments = text_fragments(&content);
                for (i, call) in calls.iter().enumerate() {
                    fragments.extend(tool_call_fragments(i as u32, call));
                }
                finish(fragments, "tool_calls").into_iter().map(Ok).collect()
            }
            MockReply::Fragments(fragments) => fragments.into_iter().map(Ok).collect(),
            MockReply::BrokenStream(fragments, e) => fragments
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(e)))
                .collect(),
            MockReply::Error(e) => return Err(e),
        };
        Ok(Box::pin(stream::iter(items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::SamplingParams;
    use futures_util::StreamExt;

    fn request(text: &str) -> ModelRequest {
        ModelRequest::new(&SamplingParams::default(), &[Message::user(text)])
    }

    #[tokio::test]
    async fn test_echo_when_script_empty() {
        let llm = MockLlmClient::new();
        let c = llm.complete(&request("hi")).await.unwrap();
        assert_eq!(c.message.content, "Echo from Mock: hi");
        assert_eq!(llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_text_concatenates_to_same_text() {
        let llm = MockLlmClient::with_replies([MockReply::text("hello world")]);
        let mut s = llm.complete_stream(&request("x")).await.unwrap();
        let mut text = String::new();
        while let Some(f) = s.next().await {
            if let Some(c) = f.unwrap().content {
                text.push_str(&c);
            }
        }
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn test_stream_tool_call_splits_arguments() {
        let llm = MockLlmClient::with_replies([MockReply::tool_call(
            "call_1",
            "exec_code",
            "{\"code\":\"print(1)\"}",
        )]);
        let mut s = llm.complete_stream(&request("x")).await.unwrap();
        let mut table = ToolCallTable::new();
        while let Some(f) = s.next().await {
            table.merge_fragment(&f.unwrap());
        }
        let calls = table.finish();
        assert_eq!(calls, vec![ToolCallRequest::new("call_1", "exec_code", "{\"code\":\"print(1)\"}")]);
    }
}
