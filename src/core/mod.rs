//! 核心类型：模型错误、单轮状态机与结果

pub mod error;
pub mod state;

pub use error::LlmError;
pub use state::{FailureKind, TurnOutcome, TurnPhase};
