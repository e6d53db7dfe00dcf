//! LLM 层：模型服务边界与实现（OpenAI 兼容 / Mock）

pub mod accumulator;
pub mod mock;
pub mod openai;
pub mod traits;

pub use accumulator::ToolCallTable;
pub use mock::{MockLlmClient, MockReply};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{
    Completion, Fragment, FragmentStream, LlmClient, ModelRequest, SamplingParams, ToolCallDelta,
};
