//! 一次性组装：首次调用带工具目录；有 tool call 则分发后再调用一次取最终回答

use crate::chat::turn::TurnContext;
use crate::core::{LlmError, TurnPhase};
use crate::memory::{ConversationState, Message};

/// 运行一次性模式，返回追加到状态末尾的最终 assistant 消息
pub async fn run(
    ctx: &TurnContext<'_>,
    state: &mut ConversationState,
    phase: &mut TurnPhase,
) -> Result<Message, LlmError> {
    phase.advance(TurnPhase::AwaitingFirstCompletion);
    let first = ctx.llm.complete(&ctx.request(state, true)).await?;
    tracing::debug!(finish_reason = ?first.finish_reason, "first completion");

    if !first.message.has_tool_calls() {
        state.append(first.message.clone());
        return Ok(first.message);
    }

    let calls = first.message.tool_calls.clone();
    state.append(first.message);
    ctx.dispatch_all(&calls, state, phase).await;

    phase.advance(TurnPhase::AwaitingSecondCompletion);
    let second = ctx.llm.complete(&ctx.request(state, false)).await?;
    // 第二次调用不带工具目录，仍返回 tool call 时只保留文本
    let answer = Message::assistant(second.message.content);
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
    async fn test_unknown_tool_still_gets_answer() {
        let llm = MockLlmClient::with_replies([
            MockReply::tool_call("call_1", "weather", "{}"),
            MockReply::text("no weather tool"),
        ]);
        let dispatcher = ToolDispatcher::new(ToolRegistry::new());
        let sampling = SamplingParams::default();
        let ctx = TurnContext {
            llm: &llm,
            dispatcher: &dispatcher,
            sampling: &sampling,
        };
        let mut state = ConversationState::new("sys");
        state.append(Message::user("weather?"));
        let mut phase = TurnPhase::Idle;

        let answer = run(&ctx, &mut state, &mut phase).await.unwrap();
        assert_eq!(answer.content, "no weather tool");
        assert_eq!(phase, TurnPhase::AwaitingSecondCompletion);

        let roles: Vec<Role> = state.all().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        let tool_msg = &state.all()[3];
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_msg.content.contains("weather"));

        let requests = llm.requests();
        assert!(requests[1].tools.is_none());
    }
}
