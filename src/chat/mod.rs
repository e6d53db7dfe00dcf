//! 工具调用对话核心：控制器、两种响应组装模式、tool call 片段累积

pub mod buffered;
pub mod controller;
pub mod incremental;
pub mod prompt;
pub mod turn;

pub use controller::ChatController;
pub use incremental::Sink;
pub use turn::TurnContext;
