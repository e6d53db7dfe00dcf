//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），
//! 由 ToolRegistry 按注册顺序保存；对外以只读的 ToolDescriptor 列出工具目录。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::tools::schema::required_params;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON 对象）
///
/// 参数缺失等可预期问题返回 `Ok("Error: ...")` 描述文本，交给模型处理；
/// `Err` 表示工具内部失败，由 ToolDispatcher 统一包装。
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型 tool call 中的 function.name）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 工具目录条目：注册后不再变化
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub required: Vec<String>,
}

impl ToolDescriptor {
    fn from_tool(tool: &dyn Tool) -> Self {
        let parameters = tool.parameters_schema();
        let required = required_params(&parameters);
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters,
            required,
        }
    }
}

/// 工具注册表：保持注册顺序，同名后注册者覆盖前者
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<(ToolDescriptor, Arc<dyn Tool>)>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let descriptor = ToolDescriptor::from_tool(tool.as_ref());
        match self.index.get(&descriptor.name) {
            Some(&i) => self.tools[i] = (descriptor, tool),
            None => {
                self.index.insert(descriptor.name.clone(), self.tools.len());
                self.tools.push((descriptor, tool));
            }
        }
    }

    /// 工具目录（注册顺序）
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|(d, _)| d.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i].0)
    }

    pub(crate) fn handler(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i].1))
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|(d, _)| d.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}
