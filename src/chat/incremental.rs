//! 增量组装：边收片段边把当前完整文本快照交给 sink
//!
//! tool call 片段按 index 合并进 ToolCallTable；流结束后若有调用，追加带 tool_calls 的 assistant 消息，
//! 依次发出「开始执行」标记、分发、「执行完毕」标记，再开第二个不带工具目录的流取最终回答。
//! sink 在拉取片段的同一任务里同步调用，慢 sink 会拖慢片段消费。

use futures_util::StreamExt;

use crate::chat::prompt::{tools_running_marker, TOOLS_FINISHED_MARKER};
use crate::chat::turn::TurnContext;
use crate::core::{LlmError, TurnPhase};
use crate::llm::{ModelRequest, ToolCallTable};
use crate::memory::{ConversationState, Message};

/// 接收文本快照的回调
pub type Sink<'s> = &'s mut (dyn FnMut(&str) + Send);

/// 消费一个片段流：文本累积并逐次推送快照，tool call 片段并入累积表
async fn consume(
    ctx: &TurnContext<'_>,
    request: &ModelRequest,
    sink: &mut (dyn FnMut(&str) + Send),
    table: &mut ToolCallTable,
) -> Result<String, LlmError> {
    let mut stream = ctx.llm.complete_stream(request).await?;
    let mut buffer = String::new();
    let mut fragments = 0usize;
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        fragments += 1;
        if let Some(text) = fragment.content.as_deref().filter(|t| !t.is_empty()) {
            buffer.push_str(text);
            sink(&buffer);
        }
        table.merge_fragment(&fragment);
        if let Some(reason) = &fragment.finish_reason {
            tracing::debug!(finish_reason = %reason, "stream finish reason");
        }
    }
    tracing::debug!(fragments, chars = buffer.chars().count(), "stream ended");
    Ok(buffer)
}

/// 运行增量模式，返回追加到状态末尾的最终 assistant 消息
pub async fn run(
    ctx: &TurnContext<'_>,
    state: &mut ConversationState,
    phase: &mut TurnPhase,
    sink: Sink<'_>,
) -> Result<Message, LlmError> {
    phase.advance(TurnPhase::AwaitingFirstCompletion);
    let mut table = ToolCallTable::new();
    let first_text = consume(ctx, &ctx.request(state, true), &mut *sink, &mut table).await?;

    if table.is_empty() {
        let answer = Message::assistant(first_text);
        state.append(answer.clone());
        return Ok(answer);
    }

    let calls = table.finish();
    let names: Vec<String> = calls.iter().map(|c| c.name.clone()).collect();
    state.append(Message::assistant_with_tool_calls(first_text, calls.clone()));

    sink(&tools_running_marker(&names));
    ctx.dispatch_all(&calls, state, phase).await;
    sink(TOOLS_FINISHED_MARKER);

    phase.advance(TurnPhase::AwaitingSecondCompletion);
    // 第二次调用不带工具目录，残留的 tool call 片段忽略
    let mut ignored = ToolCallTable::new();
    let second_text = consume(ctx, &ctx.request(state, false), &mut *sink, &mut ignored).await?;
    if !ignored.is_empty() {
        tracing::warn!(calls = ignored.len(), "tool calls in second completion ignored");
    }
    let answer = Message::assistant(second_text);
    state.append(answer.clone());
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, MockReply, SamplingParams};
    use crate::memory::Role;
    use crate::tools::{ToolDispatcher, ToolRegistry};

    #[tokio::test]
    async fn test_snapshots_are_full_text() {
        let llm = MockLlmClient::with_replies([MockReply::text("hello world!")]);
        let dispatcher = ToolDispatcher::new(ToolRegistry::new());
        let sampling = SamplingParams::default();
        let ctx = TurnContext {
            llm: &llm,
            dispatcher: &dispatcher,
            sampling: &sampling,
        };
        let mut state = ConversationState::new("sys");
        state.append(Message::user("hi"));
        let mut phase = TurnPhase::Idle;
        let mut snapshots: Vec<String> = Vec::new();
        let mut sink = |s: &str| snapshots.push(s.to_string());

        let answer = run(&ctx, &mut state, &mut phase, &mut sink).await.unwrap();
        assert_eq!(answer.content, "hello world!");
        assert_eq!(snapshots, vec!["hell", "hello wo", "hello world!"]);
        assert_eq!(phase, TurnPhase::AwaitingFirstCompletion);
    }

    #[tokio::test]
    async fn test_tool_round_emits_markers() {
        let llm = MockLlmClient::with_replies([
            MockReply::tool_call("call_9", "missing_tool", "{\"a\":1}"),
            MockReply::text("done"),
        ]);
        let dispatcher = ToolDispatcher::new(ToolRegistry::new());
        let sampling = SamplingParams::default();
        let ctx = TurnContext {
            llm: &llm,
            dispatcher: &dispatcher,
            sampling: &sampling,
        };
        let mut state = ConversationState::new("sys");
        state.append(Message::user("go"));
        let mut phase = TurnPhase::Idle;
        let mut snapshots: Vec<String> = Vec::new();
        let mut sink = |s: &str| snapshots.push(s.to_string());

        let answer = run(&ctx, &mut state, &mut phase, &mut sink).await.unwrap();
        assert_eq!(answer.content, "done");
        assert!(snapshots[0].contains("missing_tool"));
        assert_eq!(snapshots[1], TOOLS_FINISHED_MARKER);
        assert_eq!(snapshots.last().map(String::as_str), Some("done"));

        let all = state.all();
        assert_eq!(all[2].role, Role::Assistant);
        assert_eq!(all[2].tool_calls[0].id, "call_9");
        assert_eq!(all[3].tool_call_id.as_deref(), Some("call_9"));
    }
}
