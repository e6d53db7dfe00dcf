//! Toolchat - Rust 工具调用对话助手
//!
//! 模块划分：
//! - **app**: 无界面应用层（对话生命周期、历史、上传、图片输入、用户画像）
//! - **chat**: 对话控制器、一次性 / 增量两种响应组装、tool call 片段累积
//! - **config**: 应用配置加载（TOML + 环境变量）与组件构建
//! - **core**: 错误类型、单轮状态机与结果类型
//! - **llm**: 模型服务边界（OpenAI 兼容 / Mock）
//! - **memory**: 对话状态、历史持久化、知识库检索
//! - **observability**: 日志初始化
//! - **tools**: 工具注册表、分发器与内置工具（exec_code、create_ppt、recognize_image_text）

pub mod app;
pub mod chat;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;
