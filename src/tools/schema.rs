//! 工具参数 JSON Schema 生成（schemars）
//!
//! 各工具用 `#[derive(JsonSchema)]` 的参数结构体描述参数，生成的 schema 即注册表中声明的参数规范。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 由参数类型生成 `{"type":"object","properties":{...},"required":[...]}`
///
/// 去掉 `$schema` / `title` 等对模型无意义的顶层字段；缺省 required 时补空数组。
pub fn parameters_schema_for<T: JsonSchema>() -> Value {
    let root = schema_for!(T);
    let mut value = serde_json::to_value(root).unwrap_or_else(|_| Value::Object(Default::default()));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.remove("definitions");
        obj.entry("type").or_insert_with(|| Value::String("object".into()));
        obj.entry("properties")
            .or_insert_with(|| Value::Object(Default::default()));
        obj.entry("required").or_insert_with(|| Value::Array(Vec::new()));
    }
    value
}

/// 从参数 schema 中取出 required 列表
pub fn required_params(schema: &Value) -> Vec<String> {
    schema
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
