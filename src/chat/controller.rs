//! 对话控制器
//!
//! 持有一份 ConversationState，对外只暴露 respond(input, sink)：
//! 有 sink 走增量模式，否则走一次性模式。模型调用失败时追加一条错误说明的 assistant 消息并返回 Failure，
//! 不向调用方抛错；每个控制器独占自己的状态，多个对话各建一个控制器。

use std::sync::Arc;

use crate::chat::prompt::knowledge_prompt;
use crate::chat::turn::TurnContext;
use crate::chat::{buffered, incremental};
use crate::core::{TurnOutcome, TurnPhase};
use crate::llm::{LlmClient, SamplingParams};
use crate::memory::{ConversationState, HistoryWriter, KnowledgeLookup, Message, Role};
use crate::tools::ToolDispatcher;

const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_TOP_P: f32 = 1.0;

/// 知识库检索配置
struct KnowledgeHook {
    lookup: Arc<dyn KnowledgeLookup>,
    top_k: usize,
}

pub struct ChatController {
    llm: Arc<dyn LlmClient>,
    dispatcher: Arc<ToolDispatcher>,
    sampling: SamplingParams,
    state: ConversationState,
    phase: TurnPhase,
    knowledge: Option<KnowledgeHook>,
    history: Option<Arc<dyn HistoryWriter>>,
}

impl ChatController {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        dispatcher: Arc<ToolDispatcher>,
        sampling: SamplingParams,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            dispatcher,
            sampling,
            state: ConversationState::new(system_prompt),
            phase: TurnPhase::Idle,
            knowledge: None,
            history: None,
        }
    }

    /// 每轮先用输入检索知识库，命中时改写发给模型的用户消息
    pub fn with_knowledge(mut self, lookup: Arc<dyn KnowledgeLookup>, top_k: usize) -> Self {
        self.knowledge = Some(KnowledgeHook {
            lookup,
            top_k: top_k.max(1),
        });
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryWriter>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn set_history(&mut self, history: Option<Arc<dyn HistoryWriter>>) {
        self.history = history;
    }

    /// 调整采样参数；越界值回落到默认（temperature 0.3，top_p 1.0）
    pub fn set_sampling(&mut self, temperature: f32, top_p: f32) {
        self.sampling.temperature = if (0.0..=2.0).contains(&temperature) {
            temperature
        } else {
            tracing::warn!(temperature, "temperature out of range, using default");
            DEFAULT_TEMPERATURE
        };
        self.sampling.top_p = if top_p > 0.0 && top_p <= 1.0 {
            top_p
        } else {
            tracing::warn!(top_p, "top_p out of range, using default");
            DEFAULT_TOP_P
        };
    }

    pub fn sampling(&self) -> &SamplingParams {
        &self.sampling
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// 把已持久化的消息回放进状态（继续历史对话）；不写历史
    pub fn replay(&mut self, messages: impl IntoIterator<Item = (Role, String)>) {
        for (role, content) in messages {
            let msg = match role {
                Role::User => Message::user(content),
                Role::System => Message::system(content),
                _ => Message::assistant(content),
            };
            self.state.append(msg);
        }
    }

    /// 处理一轮输入；input 为 None 时不追加用户消息
    pub async fn respond(
        &mut self,
        input: Option<&str>,
        sink: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> TurnOutcome {
        if let Some(text) = input {
            let mut msg = Message::user(text);
            if let Some(hook) = &self.knowledge {
                let snippets = hook.lookup.search(text, hook.top_k);
                if !snippets.is_empty() {
                    tracing::info!(snippets = snippets.len(), "knowledge context attached");
                    msg = msg.with_model_content(knowledge_prompt(&snippets, text));
                }
            }
            self.state.append(msg);
            self.record(Role::User, text);
        }

        let streaming = sink.is_some();
        tracing::info!(streaming, messages = self.state.len(), "turn started");

        let ctx = TurnContext {
            llm: self.llm.as_ref(),
            dispatcher: self.dispatcher.as_ref(),
            sampling: &self.sampling,
        };
        let mut phase = TurnPhase::Idle;
        let (result, sink) = match sink {
            Some(sink) => {
                let r = incremental::run(&ctx, &mut self.state, &mut phase, &mut *sink).await;
                (r, Some(sink))
            }
            None => (buffered::run(&ctx, &mut self.state, &mut phase).await, None),
        };

        let outcome = match result {
            Ok(message) => TurnOutcome::Success { message },
            Err(e) => {
                tracing::warn!(error = %e, phase = ?phase, "turn failed");
                let message = Message::assistant(format!("Error processing request: {}", e));
                self.state.append(message.clone());
                if let Some(sink) = sink {
                    sink(&message.content);
                }
                TurnOutcome::Failure {
                    message,
                    kind: e.kind(),
                }
            }
        };
        phase.advance(TurnPhase::Idle);
        self.phase = phase;

        self.record(Role::Assistant, outcome.text());
        tracing::info!(ok = outcome.is_success(), "turn finished");
        outcome
    }

    fn record(&self, role: Role, content: &str) {
        if let Some(history) = &self.history {
            if let Err(e) = history.record(role, content) {
                tracing::warn!(error = %e, "failed to persist message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FailureKind, LlmError};
    use crate::llm::{MockLlmClient, MockReply};
    use crate::tools::ToolRegistry;

    fn controller(llm: MockLlmClient) -> ChatController {
        ChatController::new(
            Arc::new(llm),
            Arc::new(ToolDispatcher::new(ToolRegistry::new())),
            SamplingParams::default(),
            "sys",
        )
    }

    #[tokio::test]
    async fn test_failure_appends_error_message() {
        let mut c = controller(MockLlmClient::with_replies([MockReply::Error(LlmError::Auth(
            "bad key".into(),
        ))]));
        let outcome = c.respond(Some("hi"), None).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Auth));
        assert!(outcome.text().starts_with("Error processing request:"));
        assert_eq!(c.state().len(), 3);
        assert_eq!(c.phase(), TurnPhase::Idle);

        // 状态仍可继续使用
        let next = c.respond(Some("again"), None).await;
        assert!(next.is_success());
        assert_eq!(next.text(), "Echo from Mock: again");
    }

    #[tokio::test]
    async fn test_stream_error_reaches_sink() {
        let mut c = controller(MockLlmClient::with_replies([MockReply::BrokenStream(
            vec![crate::llm::Fragment::text("par")],
            LlmError::Transport("reset".into()),
        )]));
        let mut seen: Vec<String> = Vec::new();
        let mut sink = |s: &str| seen.push(s.to_string());
        let outcome = c.respond(Some("hi"), Some(&mut sink)).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Transport));
        assert_eq!(seen.first().map(String::as_str), Some("par"));
        assert!(seen.last().is_some_and(|s| s.starts_with("Error processing request:")));
    }

    #[test]
    fn test_set_sampling_falls_back() {
        let mut c = controller(MockLlmClient::new());
        c.set_sampling(0.9, 0.5);
        assert_eq!((c.sampling().temperature, c.sampling().top_p), (0.9, 0.5));
        c.set_sampling(-1.0, 0.0);
        assert_eq!((c.sampling().temperature, c.sampling().top_p), (0.3, 1.0));
    }

    #[test]
    fn test_replay_restores_roles() {
        let mut c = controller(MockLlmClient::new());
        c.replay(vec![
            (Role::User, "q".to_string()),
            (Role::Assistant, "a".to_string()),
        ]);
        let roles: Vec<Role> = c.state().all().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }
}
