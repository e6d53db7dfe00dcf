//! 单轮对话中两种组装模式共用的部分：构造请求、按序分发工具调用

use crate::core::TurnPhase;
use crate::llm::{LlmClient, ModelRequest, SamplingParams};
use crate::memory::{ConversationState, Message, ToolCallRequest};
use crate::tools::ToolDispatcher;

/// 一轮对话借用的协作方
pub struct TurnContext<'a> {
    pub llm: &'a dyn LlmClient,
    pub dispatcher: &'a ToolDispatcher,
    pub sampling: &'a SamplingParams,
}

impl<'a> TurnContext<'a> {
    /// 首次调用附带工具目录，第二次调用不附带（每轮最多一轮工具调用）
    pub fn request(&self, state: &ConversationState, with_tools: bool) -> ModelRequest {
        let request = ModelRequest::new(self.sampling, state.all());
        if with_tools {
            request.with_tools(self.dispatcher.catalogue())
        } else {
            request
        }
    }

    /// 按模型给出的顺序逐个执行，每个调用追加一条 tool 消息
    pub async fn dispatch_all(
        &self,
        calls: &[ToolCallRequest],
        state: &mut ConversationState,
        phase: &mut TurnPhase,
    ) {
        phase.advance(TurnPhase::ToolDispatch);
        for call in calls {
            tracing::info!(tool = %call.name, id = %call.id, "dispatching tool call");
            let result = self.dispatcher.execute_call(call).await;
            state.append(Message::tool(call.id.clone(), call.name.clone(), result));
        }
    }
}
