//! 单轮对话的状态机与结果类型
//!
//! Idle → AwaitingFirstCompletion → [ToolDispatch → AwaitingSecondCompletion] → Idle；
//! 没有终止失败态，出错也会追加一条消息并回到 Idle。

use serde::Serialize;

use crate::memory::Message;

/// 控制器所处阶段
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum TurnPhase {
    #[default]
    Idle,
    AwaitingFirstCompletion,
    ToolDispatch,
    AwaitingSecondCompletion,
}

impl TurnPhase {
    /// 合法转移；任意阶段都可回到 Idle（成功或失败收尾）
    pub fn can_transition_to(self, next: TurnPhase) -> bool {
        use TurnPhase::*;
        matches!(
            (self, next),
            (Idle, AwaitingFirstCompletion)
                | (AwaitingFirstCompletion, ToolDispatch)
                | (ToolDispatch, AwaitingSecondCompletion)
                | (_, Idle)
        )
    }

    /// 转移到 next 并记录；非法转移只告警不中断本轮
    pub fn advance(&mut self, next: TurnPhase) {
        if !self.can_transition_to(next) {
            tracing::warn!(from = ?self, to = ?next, "unexpected turn phase transition");
        } else {
            tracing::debug!(from = ?self, to = ?next, "turn phase");
        }
        *self = next;
    }
}

/// 失败类别（对应模型调用错误）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    Transport,
    Auth,
    MalformedResponse,
    Config,
}

/// 一轮对话的结果：成功或失败都携带已追加的 assistant 消息
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Success { message: Message },
    Failure { message: Message, kind: FailureKind },
}

impl TurnOutcome {
    pub fn message(&self) -> &Message {
        match self {
            TurnOutcome::Success { message } | TurnOutcome::Failure { message, .. } => message,
        }
    }

    /// 回复文本
    pub fn text(&self) -> &str {
        &self.message().content
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TurnOutcome::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            TurnOutcome::Failure { kind, .. } => Some(*kind),
            TurnOutcome::Success { .. } => None,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            TurnOutcome::Success { message } | TurnOutcome::Failure { message, .. } => {
                message.content
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_path_transitions() {
        let mut phase = TurnPhase::Idle;
        for next in [
            TurnPhase::AwaitingFirstCompletion,
            TurnPhase::ToolDispatch,
            TurnPhase::AwaitingSecondCompletion,
            TurnPhase::Idle,
        ] {
            assert!(phase.can_transition_to(next));
            phase.advance(next);
        }
        assert_eq!(phase, TurnPhase::Idle);
    }

    #[test]
    fn test_tool_dispatch_requires_first_completion() {
        assert!(!TurnPhase::Idle.can_transition_to(TurnPhase::ToolDispatch));
        assert!(!TurnPhase::AwaitingFirstCompletion
            .can_transition_to(TurnPhase::AwaitingSecondCompletion));
        assert!(TurnPhase::AwaitingFirstCompletion.can_transition_to(TurnPhase::Idle));
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = TurnOutcome::Success {
            message: Message::assistant("done"),
        };
        assert!(ok.is_success());
        assert_eq!(ok.text(), "done");
        assert_eq!(ok.failure_kind(), None);

        let err = TurnOutcome::Failure {
            message: Message::assistant("Error processing request: boom"),
            kind: FailureKind::Transport,
        };
        assert_eq!(err.failure_kind(), Some(FailureKind::Transport));
        assert_eq!(err.into_text(), "Error processing request: boom");
    }
}
