//! 无界面应用层：对话生命周期、历史、文档上传、图片输入、用户画像
//!
//! 每个对话一个 ChatController；历史开启时第一条用户消息到来才建文件夹，
//! 首轮结束后用模型生成的标题重命名。

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::chat::prompt::{profile_prompt, title_prompt};
use crate::chat::ChatController;
use crate::config::{build_llm, build_registry, AppConfig};
use crate::core::TurnOutcome;
use crate::llm::LlmClient;
use crate::memory::{ConversationFolder, HistoryStore, KnowledgeBase, KnowledgeLookup};
use crate::tools::{ToolDispatcher, ToolRegistry, OCR_RESULT_PREFIX};

/// 用户画像最多字符数
const PROFILE_MAX_CHARS: usize = 50;

pub struct ChatApp {
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
    dispatcher: Arc<ToolDispatcher>,
    knowledge: Option<Arc<KnowledgeBase>>,
    history: Option<HistoryStore>,
    controller: ChatController,
    folder: Option<Arc<ConversationFolder>>,
    titled: bool,
}

impl ChatApp {
    /// 按配置创建模型客户端与工具
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let llm = build_llm(&config.llm).context("create llm client")?;
        let registry = build_registry(&config, llm.clone());
        Self::with_components(config, llm, registry)
    }

    /// 使用外部提供的模型客户端与工具注册表（测试、嵌入方）
    pub fn with_components(
        config: AppConfig,
        llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
    ) -> anyhow::Result<Self> {
        let knowledge = if config.knowledge.enabled {
            let kb = match &config.knowledge.store_path {
                Some(path) => KnowledgeBase::open(path)?,
                None => KnowledgeBase::in_memory(),
            };
            Some(Arc::new(kb))
        } else {
            None
        };
        let history = if config.history.enabled {
            Some(HistoryStore::new(&config.history.dir)?)
        } else {
            None
        };
        let dispatcher = Arc::new(ToolDispatcher::new(registry));
        tracing::info!(
            tools = ?dispatcher.registry().tool_names(),
            knowledge = knowledge.is_some(),
            history = history.is_some(),
            "chat app ready"
        );
        let controller = Self::make_controller(&config, &llm, &dispatcher, knowledge.as_ref());
        Ok(Self {
            config,
            llm,
            dispatcher,
            knowledge,
            history,
            controller,
            folder: None,
            titled: false,
        })
    }

    fn make_controller(
        config: &AppConfig,
        llm: &Arc<dyn LlmClient>,
        dispatcher: &Arc<ToolDispatcher>,
        knowledge: Option<&Arc<KnowledgeBase>>,
    ) -> ChatController {
        let controller = ChatController::new(
            llm.clone(),
            dispatcher.clone(),
            config.llm.sampling(),
            config.app.system_prompt.clone(),
        );
        match knowledge {
            Some(kb) => {
                let lookup: Arc<dyn KnowledgeLookup> = kb.clone();
                controller.with_knowledge(lookup, config.knowledge.top_k)
            }
            None => controller,
        }
    }

    /// 不带工具与知识库的一次性问答（标题、画像）
    async fn ask_plain(&self, prompt: String) -> TurnOutcome {
        let mut helper = ChatController::new(
            self.llm.clone(),
            Arc::new(ToolDispatcher::default()),
            self.config.llm.sampling(),
            self.config.app.system_prompt.clone(),
        );
        helper.respond(Some(&prompt), None).await
    }

    pub fn controller(&self) -> &ChatController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ChatController {
        &mut self.controller
    }

    /// 累计 token 使用：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 当前对话文件夹名
    pub fn conversation_name(&self) -> Option<String> {
        self.folder.as_ref().map(|f| f.name())
    }

    /// 开始新对话（丢弃当前内存状态）
    pub fn new_conversation(&mut self) {
        self.controller =
            Self::make_controller(&self.config, &self.llm, &self.dispatcher, self.knowledge.as_ref());
        self.folder = None;
        self.titled = false;
        tracing::info!("new conversation");
    }

    fn ensure_folder(&mut self) -> anyhow::Result<()> {
        if self.folder.is_some() {
            return Ok(());
        }
        if let Some(store) = &self.history {
            let folder = Arc::new(store.start_conversation()?);
            self.controller.set_history(Some(folder.clone()));
            self.folder = Some(folder);
        }
        Ok(())
    }

    /// 提交一轮用户输入；sink 为 Some 时流式输出快照
    pub async fn submit(
        &mut self,
        input: &str,
        sink: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> TurnOutcome {
        if let Err(e) = self.ensure_folder() {
            tracing::warn!(error = %e, "history disabled for this conversation");
        }
        let outcome = self.controller.respond(Some(input), sink).await;
        if !self.titled && self.folder.is_some() {
            self.titled = true;
            if let Err(e) = self.rename_from_title(input).await {
                tracing::warn!(error = %e, "conversation rename failed");
            }
        }
        outcome
    }

    async fn rename_from_title(&mut self, first_question: &str) -> anyhow::Result<()> {
        let (Some(store), Some(folder)) = (&self.history, &self.folder) else {
            return Ok(());
        };
        let outcome = self.ask_plain(title_prompt(first_question)).await;
        anyhow::ensure!(outcome.is_success(), "title generation failed: {}", outcome.text());
        let renamed = Arc::new(store.rename(folder, outcome.text())?);
        self.controller.set_history(Some(renamed.clone()));
        self.folder = Some(renamed);
        Ok(())
    }

    /// 上传文档到知识库
    pub fn upload(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let kb = self
            .knowledge
            .as_ref()
            .context("knowledge base is disabled")?;
        kb.add_document(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), documents = kb.len(), "document uploaded");
        Ok(())
    }

    /// 识别图片文字并作为下一轮用户输入提交
    pub async fn submit_image(
        &mut self,
        path: impl AsRef<Path>,
        sink: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> anyhow::Result<TurnOutcome> {
        let args = serde_json::json!({ "image_path": path.as_ref().display().to_string() });
        let result = self.dispatcher.execute("recognize_image_text", args).await;
        let text = result
            .strip_prefix(OCR_RESULT_PREFIX)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!(result.clone()))?;
        Ok(self.submit(&text, sink).await)
    }

    /// 已保存的对话，最近的在前
    pub fn list_history(&self) -> anyhow::Result<Vec<String>> {
        match &self.history {
            Some(store) => store.list(),
            None => Ok(Vec::new()),
        }
    }

    /// 载入历史对话，后续消息继续写入同一文件夹
    pub fn load_history(&mut self, name: &str) -> anyhow::Result<()> {
        let store = self.history.as_ref().context("history is disabled")?;
        let messages = store.load(name)?;
        let folder = Arc::new(store.open(name)?);
        let count = messages.len();
        self.new_conversation();
        self.controller.replay(messages);
        self.controller.set_history(Some(folder.clone()));
        self.folder = Some(folder);
        self.titled = true;
        tracing::info!(conversation = %name, messages = count, "conversation loaded");
        Ok(())
    }

    /// 根据全部历史生成不超过 50 字的用户画像；不影响当前对话
    pub async fn user_profile(&self) -> anyhow::Result<String> {
        let store = self.history.as_ref().context("history is disabled")?;
        let transcript = store.transcript();
        anyhow::ensure!(
            !transcript.trim().is_empty(),
            "not enough conversation history to build a profile"
        );
        let outcome = self.ask_plain(profile_prompt(&transcript)).await;
        anyhow::ensure!(outcome.is_success(), "{}", outcome.text());
        Ok(outcome.text().trim().chars().take(PROFILE_MAX_CHARS).collect())
    }
}
