//! 知识库：文档存储与检索
//!
//! KnowledgeLookup 是控制器使用的检索能力 `search(query, top_k) -> 排序后的文本片段`，空结果表示没有相关内容。
//! KnowledgeBase 是默认实现：文档全文存于 JSON 文件，按词重叠排序，
//! 每个命中文档只返回与问题有共同词的句子（没有则返回全文）。

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::memory::tokenizer::{overlap_score, tokenize, tokenize_to_set};

/// 检索能力
pub trait KnowledgeLookup: Send + Sync {
    fn search(&self, query: &str, top_k: usize) -> Vec<String>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredDocument {
    source: String,
    text: String,
}

/// 文档知识库（可选持久化到 JSON 文件）
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    docs: RwLock<Vec<StoredDocument>>,
    store_path: Option<PathBuf>,
}

impl KnowledgeBase {
    /// 仅内存
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// 打开（或新建）持久化知识库；文件不存在时为空库
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let docs = if path.exists() {
            let data = std::fs::read_to_string(&path)
                .with_context(|| format!("read knowledge store {}", path.display()))?;
            serde_json::from_str(&data).context("parse knowledge store")?
        } else {
            Vec::new()
        };
        tracing::info!(path = %path.display(), documents = docs.len(), "knowledge base loaded");
        Ok(Self {
            docs: RwLock::new(docs),
            store_path: Some(path),
        })
    }

    /// 读取文本文档并加入知识库（段落合并为一段）
    pub fn add_document(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read document {}", path.display()))?;
        let text = raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        self.add_text(path.display().to_string(), text)
    }

    pub fn add_text(&self, source: impl Into<String>, text: impl Into<String>) -> anyhow::Result<()> {
        let doc = StoredDocument {
            source: source.into(),
            text: text.into(),
        };
        tracing::info!(source = %doc.source, chars = doc.text.chars().count(), "add document");
        {
            let mut docs = self
                .docs
                .write()
                .map_err(|_| anyhow::anyhow!("knowledge store lock poisoned"))?;
            docs.push(doc);
        }
        self.save()
    }

    fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.store_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let docs = self
            .docs
            .read()
            .map_err(|_| anyhow::anyhow!("knowledge store lock poisoned"))?;
        std::fs::write(path, serde_json::to_string_pretty(&*docs)?)
            .with_context(|| format!("write knowledge store {}", path.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 只保留与问题有共同词的句子；一句都没有时返回全文
fn relevant_sentences(text: &str, query_tokens: &[String]) -> String {
    let sentences: Vec<&str> = text
        .split_inclusive(|c: char| matches!(c, '。' | '！' | '？'))
        .flat_map(|s| s.split_inclusive(". "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let relevant: Vec<&str> = sentences
        .into_iter()
        .filter(|s| {
            let lower = s.to_lowercase();
            query_tokens.iter().any(|w| lower.contains(w.as_str()))
        })
        .collect();
    if relevant.is_empty() {
        text.to_string()
    } else {
        relevant.join(" ")
    }
}

impl KnowledgeLookup for KnowledgeBase {
    fn search(&self, query: &str, top_k: usize) -> Vec<String> {
        let Ok(docs) = self.docs.read() else {
            return Vec::new();
        };
        if docs.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let query_tokens = tokenize(query);
        let query_set = tokenize_to_set(query);

        let mut scored: Vec<(usize, &StoredDocument)> = docs
            .iter()
            .map(|d| (overlap_score(&query_set, &tokenize_to_set(&d.text)), d))
            .filter(|(score, _)| *score > 0)
            .collect();
        // 稳定排序：同分保持加入顺序
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        scored
            .into_iter()
            .take(top_k)
            .map(|(_, d)| relevant_sentences(&d.text, &query_tokens))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_returns_nothing() {
        let kb = KnowledgeBase::in_memory();
        assert!(kb.search("anything", 3).is_empty());
    }

    #[test]
    fn test_search_returns_relevant_sentence() {
        let kb = KnowledgeBase::in_memory();
        kb.add_text("geo", "Paris is the capital of France. Berlin has many museums")
            .unwrap();
        kb.add_text("food", "Noodles are tasty").unwrap();
        let hits = kb.search("What is the capital of France?", 3);
        assert_eq!(hits, vec!["Paris is the capital of France.".to_string()]);
    }

    #[test]
    fn test_top_k_limits_results() {
        let kb = KnowledgeBase::in_memory();
        kb.add_text("a", "rust ownership rules").unwrap();
        kb.add_text("b", "rust borrowing rules").unwrap();
        assert_eq!(kb.search("rust rules", 1).len(), 1);
    }

    #[test]
    fn test_persisted_store_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("kb.json");
        let doc = dir.path().join("notes.txt");
        std::fs::write(&doc, "Tokio is an async runtime.\n\nIt schedules tasks.").unwrap();

        let kb = KnowledgeBase::open(&store).unwrap();
        kb.add_document(&doc).unwrap();
        drop(kb);

        let kb = KnowledgeBase::open(&store).unwrap();
        assert_eq!(kb.len(), 1);
        assert!(!kb.search("async runtime", 1).is_empty());
    }
}
