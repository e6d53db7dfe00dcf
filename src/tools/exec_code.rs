//! exec_code 工具：在子进程中执行模型给出的代码片段
//!
//! 注意：这是危险能力。除子进程超时外没有任何隔离（文件系统、网络、资源均不受限），
//! 是否启用、如何沙箱化由集成方决定；每次执行都会输出 warn 日志。

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::schema::parameters_schema_for;
use crate::tools::Tool;

#[allow(dead_code)]
#[derive(JsonSchema)]
struct ExecCodeArgs {
    /// 要执行的 Python 代码片段
    code: String,
}

/// 代码执行工具：interpreter -c <code>
pub struct ExecCodeTool {
    interpreter: String,
    timeout_secs: u64,
}

impl ExecCodeTool {
    pub fn new(interpreter: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout_secs,
        }
    }
}

impl Default for ExecCodeTool {
    fn default() -> Self {
        Self::new("python3", 30)
    }
}

/// 去掉 markdown 代码围栏（```python ... ```）
pub fn strip_code_fence(code: &str) -> String {
    let mut lines: Vec<&str> = code.trim().lines().collect();
    if lines.first().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.remove(0);
        if lines.last().is_some_and(|l| l.trim().starts_with("```")) {
            lines.pop();
        }
    }
    lines.join("\n")
}

#[async_trait]
impl Tool for ExecCodeTool {
    fn name(&self) -> &str {
        "exec_code"
    }

    fn description(&self) -> &str {
        "Execute arbitrary Python code and return its printed output or the error message."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<ExecCodeArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let code = args.get("code").and_then(|v| v.as_str()).unwrap_or("");
        let code = strip_code_fence(code);
        if code.trim().is_empty() {
            return Ok("Error: No code provided to execute.".to_string());
        }

        tracing::warn!(
            interpreter = %self.interpreter,
            code_len = code.len(),
            "exec_code runs unsandboxed code"
        );

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-c").arg(&code).kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), cmd.output())
            .await
            .map_err(|_| format!("Code execution timed out after {}s", self.timeout_secs))?
            .map_err(|e| format!("failed to start interpreter '{}': {}", self.interpreter, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Ok(format!("Code execution error: {}", stderr));
        }
        if stdout.is_empty() {
            Ok("Code executed successfully but no output returned.".to_string())
        } else {
            Ok(stdout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        let fenced = "```python\nprint(5+1)\n```";
        assert_eq!(strip_code_fence(fenced), "print(5+1)");
        assert_eq!(strip_code_fence("print(1)"), "print(1)");
    }

    #[test]
    fn test_schema_requires_code() {
        let schema = ExecCodeTool::default().parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["code"]));
    }

    #[tokio::test]
    async fn test_missing_code_is_descriptive() {
        let out = ExecCodeTool::default()
            .execute(serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(out, "Error: No code provided to execute.");
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_error() {
        let tool = ExecCodeTool::new("definitely-not-an-interpreter-xyz", 5);
        let err = tool
            .execute(serde_json::json!({"code": "print(1)"}))
            .await
            .unwrap_err();
        assert!(err.contains("failed to start interpreter"));
    }
}
