//! 模型调用错误
//!
//! 只在模型服务边界产生；ChatController 捕获后转为 assistant 消息，不向调用方抛出。

use thiserror::Error;

use crate::core::FailureKind;

/// 模型服务端或传输层错误（网络、鉴权、响应格式）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl LlmError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LlmError::Transport(_) => FailureKind::Transport,
            LlmError::Auth(_) => FailureKind::Auth,
            LlmError::MalformedResponse(_) => FailureKind::MalformedResponse,
            LlmError::Config(_) => FailureKind::Config,
        }
    }
}

impl From<async_openai::error::OpenAIError> for LlmError {
    fn from(e: async_openai::error::OpenAIError) -> Self {
        use async_openai::error::OpenAIError;
        match e {
            OpenAIError::ApiError(api) => {
                let lower = api.message.to_lowercase();
                if lower.contains("api key") || lower.contains("unauthorized") || lower.contains("auth") {
                    LlmError::Auth(api.message)
                } else {
                    LlmError::Transport(api.message)
                }
            }
            OpenAIError::InvalidArgument(msg) => LlmError::Config(msg),
            other => {
                let msg = other.to_string();
                if msg.to_lowercase().contains("deserializ") {
                    LlmError::MalformedResponse(msg)
                } else {
                    LlmError::Transport(msg)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(LlmError::Auth("bad key".into()).kind(), FailureKind::Auth);
        assert_eq!(
            LlmError::MalformedResponse("x".into()).kind(),
            FailureKind::MalformedResponse
        );
    }

    #[test]
    fn test_display() {
        let e = LlmError::Transport("connection reset".into());
        assert_eq!(e.to_string(), "Transport error: connection reset");
    }
}
