//! 对话状态：按时间顺序追加的角色消息序列
//!
//! 首条为不可变的 system 消息；之后只追加、不删除、不压缩，每次模型调用原样重放全部消息。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// 模型发起的一次工具调用请求
///
/// `arguments` 是文本形式的 JSON 参数；流式模式下在累积完成前不保证合法。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// 由模型服务端分配，用于把 tool 消息与请求配对
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// 仅出现在请求工具执行的 assistant 消息上
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// 仅出现在 tool 消息上：对应请求的 id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// 仅出现在 tool 消息上：执行的工具名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// 发送给模型时替代 content 的文本（知识库增强后的提问）；对外展示与持久化仍用 content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            model_override: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// 请求工具执行的 assistant 消息（content 可为空）
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// 工具结果消息，带上原请求 id 与工具名
    pub fn tool(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }

    /// 设置模型侧文本（原始 content 不变）
    pub fn with_model_content(mut self, text: impl Into<String>) -> Self {
        self.model_override = Some(text.into());
        self
    }

    /// 实际发给模型的文本
    pub fn model_content(&self) -> &str {
        self.model_override.as_deref().unwrap_or(&self.content)
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// 单个对话的完整记录，由一个 ChatController 独占
#[derive(Clone, Debug)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    /// 以 system 提示开始一个新对话（索引 0）
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn append(&mut self, msg: Message) {
        tracing::debug!(
            role = msg.role.as_str(),
            content_len = msg.content.len(),
            tool_calls = msg.tool_calls.len(),
            "append message"
        );
        self.messages.push(msg);
    }

    /// 只读视图，按追加顺序
    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    pub fn system_prompt(&self) -> &str {
        self.messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_message_first() {
        let mut state = ConversationState::new("你是个好助手");
        state.append(Message::user("hi"));
        assert_eq!(state.all()[0].role, Role::System);
        assert_eq!(state.system_prompt(), "你是个好助手");
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_model_content_override() {
        let msg = Message::user("What is the capital of France?")
            .with_model_content("Answer with context. Question: What is the capital of France?");
        assert_eq!(msg.content, "What is the capital of France?");
        assert!(msg.model_content().starts_with("Answer with context."));
        assert_eq!(Message::user("plain").model_content(), "plain");
    }

    #[test]
    fn test_tool_message_links_request() {
        let msg = Message::tool("call_1", "exec_code", "6");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.tool_name.as_deref(), Some("exec_code"));
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
