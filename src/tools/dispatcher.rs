//! 工具分发器
//!
//! 持有 ToolRegistry，execute(name, args) 按名路由到具体工具并返回文本；
//! 任何失败（名称无效、未注册、参数不是对象、参数解码失败、工具内部错误或 panic）都转为描述性文本，
//! 绝不向上抛出。每次调用输出结构化审计日志（JSON）。
//!
//! 分发器本身不做隔离（exec_code 等工具的副作用由集成方负责沙箱化）。

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures_util::FutureExt;
use serde_json::Value;

use crate::memory::ToolCallRequest;
use crate::tools::{ToolDescriptor, ToolRegistry};

/// 工具分发器：名称 + 参数 → 文本结果
#[derive(Debug, Default)]
pub struct ToolDispatcher {
    registry: ToolRegistry,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 工具目录（附加到首次模型调用）
    pub fn catalogue(&self) -> Vec<ToolDescriptor> {
        self.registry.list()
    }

    /// 执行模型给出的 tool call：先把文本参数解码为 JSON，再分发
    pub async fn execute_call(&self, call: &ToolCallRequest) -> String {
        match decode_arguments(&call.arguments) {
            Ok(args) => self.execute(&call.name, args).await,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool arguments failed to decode");
                execution_error(&call.name, &format!("invalid arguments: {}", e))
            }
        }
    }

    /// 执行指定工具；失败以文本返回
    pub async fn execute(&self, name: &str, args: Value) -> String {
        let name = name.trim();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return "Error: Invalid tool name".to_string();
        }
        let Some(tool) = self.registry.handler(name) else {
            tracing::warn!(tool = %name, "unknown tool requested");
            return format!("Error: Tool '{}' not found.", name);
        };
        if !args.is_object() {
            return "Error: Parameters must be a JSON object".to_string();
        }

        let start = Instant::now();
        let preview = args_preview(&args);
        let result = AssertUnwindSafe(tool.execute(args)).catch_unwind().await;

        let (ok, outcome, text) = match result {
            Ok(Ok(content)) => (true, "ok", content),
            Ok(Err(e)) => (false, "error", execution_error(name, &e)),
            Err(panic) => (false, "panic", execution_error(name, &panic_message(panic))),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");
        text
    }
}

/// 空参数视为 `{}`（无参工具常见）
fn decode_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
}

fn execution_error(name: &str, message: &str) -> String {
    format!("Error executing tool '{}': {}", name, message)
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
