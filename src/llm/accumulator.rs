//! 流式 tool call 累积表
//!
//! 以片段 index 为键的有序表：index 首次出现时新建条目，之后同 index 的片段把 name / arguments
//! 文本追加到该条目；id 取首个非空值。多个调用的片段可以交错到达。
//! index 跳号（服务端违反约定）时仍新建条目并告警，不让本轮失败。

use std::collections::BTreeMap;

use crate::llm::{Fragment, ToolCallDelta};
use crate::memory::ToolCallRequest;

#[derive(Clone, Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// index → 累积中的 tool call
#[derive(Clone, Debug, Default)]
pub struct ToolCallTable {
    entries: BTreeMap<u32, PartialToolCall>,
}

impl ToolCallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并一个片段中的所有 tool call delta
    pub fn merge_fragment(&mut self, fragment: &Fragment) {
        for delta in &fragment.tool_calls {
            self.merge(delta);
        }
    }

    pub fn merge(&mut self, delta: &ToolCallDelta) {
        if !self.entries.contains_key(&delta.index) {
            let expected = self
                .entries
                .keys()
                .next_back()
                .map(|k| k.checked_add(1))
                .unwrap_or(Some(0));
            // 已有 u32::MAX 时没有合法的下一个 index，同样按跳号处理
            if expected.map_or(true, |e| delta.index > e) {
                tracing::warn!(
                    index = delta.index,
                    expected = ?expected,
                    "tool call index skipped ahead, starting new entry"
                );
            }
        }
        let entry = self.entries.entry(delta.index).or_default();
        if let Some(id) = delta.id.as_deref().filter(|s| !s.is_empty()) {
            if entry.id.is_empty() {
                entry.id = id.to_string();
            }
        }
        if let Some(name) = &delta.name {
            entry.name.push_str(name);
        }
        if let Some(args) = &delta.arguments {
            entry.arguments.push_str(args);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 结束累积，按 index 顺序产出请求；缺 id 的条目补一个本地 id
    pub fn finish(self) -> Vec<ToolCallRequest> {
        self.entries
            .into_values()
            .map(|p| ToolCallRequest {
                id: if p.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    p.id
                },
                name: p.name,
                arguments: p.arguments,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(String::from),
            name: name.map(String::from),
            arguments: args.map(String::from),
        }
    }

    #[test]
    fn test_interleaved_indices_merge_in_arrival_order() {
        let mut table = ToolCallTable::new();
        for d in [
            delta(0, Some("call_a"), Some("exec_"), Some("{\"code\":")),
            delta(0, None, Some("code"), Some(" \"print(1)\"")),
            delta(1, Some("call_b"), Some("create_ppt"), Some("{\"topic\":")),
            delta(0, None, None, Some("}")),
            delta(1, None, None, Some(" \"AI\"}")),
        ] {
            table.merge(&d);
        }
        let calls = table.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].name, "exec_code");
        assert_eq!(calls[0].arguments, "{\"code\": \"print(1)\"}");
        assert_eq!(calls[1].id, "call_b");
        assert_eq!(calls[1].name, "create_ppt");
        assert_eq!(calls[1].arguments, "{\"topic\": \"AI\"}");
    }

    #[test]
    fn test_index_gap_still_creates_entry() {
        let mut table = ToolCallTable::new();
        table.merge(&delta(0, Some("a"), Some("x"), Some("{}")));
        table.merge(&delta(3, Some("b"), Some("y"), Some("{}")));
        assert_eq!(table.len(), 2);
        let calls = table.finish();
        assert_eq!(calls[1].name, "y");
    }

    #[test]
    fn test_new_index_after_max_index_does_not_overflow() {
        let mut table = ToolCallTable::new();
        table.merge(&delta(u32::MAX, Some("last"), Some("x"), Some("{}")));
        table.merge(&delta(0, Some("first"), Some("y"), Some("{}")));
        let calls = table.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "first");
        assert_eq!(calls[1].id, "last");
    }

    #[test]
    fn test_first_id_wins_and_missing_id_is_generated() {
        let mut table = ToolCallTable::new();
        table.merge(&delta(0, Some("first"), Some("t"), None));
        table.merge(&delta(0, Some("second"), None, Some("{}")));
        table.merge(&delta(1, None, Some("u"), None));
        let calls = table.finish();
        assert_eq!(calls[0].id, "first");
        assert!(calls[1].id.starts_with("call_"));
    }

    #[test]
    fn test_merge_fragment_without_tool_calls_is_noop() {
        let mut table = ToolCallTable::new();
        table.merge_fragment(&Fragment::text("hello"));
        assert!(table.is_empty());
    }
}
