//! 对话历史持久化
//!
//! 历史根目录下每个对话一个文件夹，每条消息一个文件 `{时间戳}_{序号}_{role}.txt`。
//! 控制器只通过 HistoryWriter 写入 (role, content)，不关心目录结构与文件命名。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use anyhow::Context;
use regex::Regex;

use crate::memory::Role;

/// 标题最大字符数
const MAX_TITLE_CHARS: usize = 50;

/// 持久化协作方：接收 (role, content)
pub trait HistoryWriter: Send + Sync {
    fn record(&self, role: Role, content: &str) -> anyhow::Result<()>;
}

/// 单个对话文件夹
#[derive(Debug)]
pub struct ConversationFolder {
    dir: PathBuf,
    seq: AtomicU64,
}

impl ConversationFolder {
    fn new(dir: PathBuf) -> Self {
        let existing = std::fs::read_dir(&dir).map(|d| d.count() as u64).unwrap_or(0);
        Self {
            dir,
            seq: AtomicU64::new(existing),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

impl HistoryWriter for ConversationFolder {
    fn record(&self, role: Role, content: &str) -> anyhow::Result<()> {
        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S_%6f");
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let path = self
            .dir
            .join(format!("{}_{:04}_{}.txt", ts, seq, role.as_str()));
        std::fs::write(&path, content)
            .with_context(|| format!("write history file {}", path.display()))?;
        Ok(())
    }
}

/// 历史根目录
#[derive(Debug, Clone)]
pub struct HistoryStore {
    root: PathBuf,
}

impl HistoryStore {
    pub fn new(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("create history dir {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 新建对话文件夹（时间戳命名，重名时追加序号）
    pub fn start_conversation(&self) -> anyhow::Result<ConversationFolder> {
        let base = format!(
            "conversation_{}",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        );
        let mut dir = self.root.join(&base);
        let mut n = 1;
        while dir.exists() {
            dir = self.root.join(format!("{}_{}", base, n));
            n += 1;
        }
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create conversation dir {}", dir.display()))?;
        tracing::info!(dir = %dir.display(), "conversation started");
        Ok(ConversationFolder::new(dir))
    }

    /// 打开已有对话（继续写入）
    pub fn open(&self, name: &str) -> anyhow::Result<ConversationFolder> {
        let dir = self.root.join(name);
        anyhow::ensure!(dir.is_dir(), "conversation not found: {}", name);
        Ok(ConversationFolder::new(dir))
    }

    /// 对话列表，最近修改的在前
    pub fn list(&self) -> anyhow::Result<Vec<String>> {
        let mut folders: Vec<(std::time::SystemTime, String)> = std::fs::read_dir(&self.root)?
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .map(|e| {
                let mtime = e
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::UNIX_EPOCH);
                (mtime, e.file_name().to_string_lossy().to_string())
            })
            .collect();
        folders.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(folders.into_iter().map(|(_, name)| name).collect())
    }

    /// 读取对话消息（按文件名排序）；`_user.txt` 为用户消息，其余视为助手消息
    pub fn load(&self, name: &str) -> anyhow::Result<Vec<(Role, String)>> {
        let dir = self.root.join(name);
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
            .with_context(|| format!("read conversation {}", name))?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        files
            .into_iter()
            .map(|p| {
                let file_name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                let role = if file_name.ends_with("_user.txt") {
                    Role::User
                } else {
                    Role::Assistant
                };
                let content = std::fs::read_to_string(&p)
                    .with_context(|| format!("read {}", p.display()))?;
                Ok((role, content))
            })
            .collect()
    }

    /// 用标题重命名对话文件夹；标题清理后为空则保持原名
    pub fn rename(&self, folder: &ConversationFolder, title: &str) -> anyhow::Result<ConversationFolder> {
        let sanitized = sanitize_title(title);
        if sanitized.is_empty() {
            return Ok(ConversationFolder::new(folder.dir.clone()));
        }
        let mut target = self.root.join(&sanitized);
        if target.exists() {
            target = self.root.join(format!(
                "{}_{}",
                sanitized,
                chrono::Local::now().format("%H%M%S")
            ));
        }
        std::fs::rename(&folder.dir, &target)
            .with_context(|| format!("rename {} -> {}", folder.dir.display(), target.display()))?;
        tracing::info!(title = %sanitized, "conversation renamed");
        Ok(ConversationFolder::new(target))
    }

    /// 所有对话拼成一段文本（"User: ..." / "Assistant: ..."），用于生成用户画像
    pub fn transcript(&self) -> String {
        let mut lines = Vec::new();
        for name in self.list().unwrap_or_default() {
            match self.load(&name) {
                Ok(messages) => {
                    for (role, content) in messages {
                        let who = if role == Role::User { "User" } else { "Assistant" };
                        lines.push(format!("{}: {}", who, content));
                    }
                }
                Err(e) => tracing::warn!(conversation = %name, error = %e, "skip unreadable conversation"),
            }
        }
        lines.join("\n")
    }
}

fn title_regexes() -> &'static (Regex, Regex) {
    static RE: OnceLock<(Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r"[a-zA-Z0-9\p{Han}]").expect("valid regex"),
            Regex::new(r#"[\\/*?:"<>|\n\r\t]"#).expect("valid regex"),
        )
    })
}

/// 把模型生成的标题清理成合法文件夹名：从首个字母/数字/汉字开始，去掉非法字符，空格转下划线，最多 50 字符
pub fn sanitize_title(name: &str) -> String {
    let (meaningful, illegal) = title_regexes();
    let start = meaningful.find(name).map(|m| m.start()).unwrap_or(name.len());
    let cleaned = illegal.replace_all(&name[start..], "");
    cleaned
        .trim()
        .replace(' ', "_")
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect()
}
