//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TOOLCHAT__*` 覆盖（双下划线表示嵌套，如 `TOOLCHAT__LLM__PROVIDER=mock`）。
//! 密钥只从配置里指定名字的环境变量读取，不写进配置文件。

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::chat::prompt::DEFAULT_SYSTEM_PROMPT;
use crate::core::LlmError;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient, SamplingParams};
use crate::tools::{ExecCodeTool, OcrSettings, OcrTool, OutlineGenerator, PptTool, ToolRegistry};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub knowledge: KnowledgeSection,
    pub history: HistorySection,
    pub tools: ToolsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub system_prompt: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// [llm] 段：后端、模型与采样参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai（OpenAI 兼容接口）/ mock
    pub provider: String,
    pub base_url: Option<String>,
    pub model: String,
    /// 存放 API Key 的环境变量名
    pub api_key_env: String,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: Some("https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()),
            model: "qwen-plus".to_string(),
            api_key_env: "DASHSCOPE_API_KEY".to_string(),
            temperature: 0.3,
            top_p: 1.0,
        }
    }
}

impl LlmSection {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

/// [knowledge] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KnowledgeSection {
    pub enabled: bool,
    /// 知识库 JSON 存储路径；未设置时仅在内存中
    pub store_path: Option<PathBuf>,
    pub top_k: usize,
}

impl Default for KnowledgeSection {
    fn default() -> Self {
        Self {
            enabled: true,
            store_path: Some(PathBuf::from("knowledge/store.json")),
            top_k: 3,
        }
    }
}

/// [history] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("history"),
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ToolsSection {
    pub exec_code: ExecCodeSection,
    pub ppt: PptSection,
    pub ocr: OcrSection,
}

/// [tools.exec_code] 段；enabled=false 时不注册该工具
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecCodeSection {
    pub enabled: bool,
    pub interpreter: String,
    pub timeout_secs: u64,
}

impl Default for ExecCodeSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interpreter: "python3".to_string(),
            timeout_secs: 30,
        }
    }
}

/// [tools.ppt] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PptSection {
    pub output_dir: PathBuf,
    pub slide_count: usize,
    pub style: String,
    pub max_retries: u32,
}

impl Default for PptSection {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("presentations"),
            slide_count: 8,
            style: "商务风格".to_string(),
            max_retries: 3,
        }
    }
}

/// [tools.ocr] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrSection {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for OcrSection {
    fn default() -> Self {
        Self {
            endpoint: "https://api.siliconflow.cn/v1/chat/completions".to_string(),
            model: "Qwen/Qwen2.5-VL-72B-Instruct".to_string(),
            api_key_env: "SILICONFLOW_API_KEY".to_string(),
            max_tokens: 1000,
            temperature: 0.1,
            timeout_secs: 60,
        }
    }
}

/// 从 config 目录加载配置，环境变量 TOOLCHAT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TOOLCHAT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TOOLCHAT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// 按 [llm].provider 创建客户端
pub fn build_llm(cfg: &LlmSection) -> Result<Arc<dyn LlmClient>, LlmError> {
    match cfg.provider.as_str() {
        "mock" => Ok(Arc::new(MockLlmClient::new())),
        "openai" => {
            let key = env_key(&cfg.api_key_env);
            if key.is_none() {
                tracing::warn!(env = %cfg.api_key_env, "API key not set, requests will likely fail");
            }
            Ok(Arc::new(OpenAiClient::new(
                cfg.base_url.as_deref(),
                key.as_deref(),
            )))
        }
        other => Err(LlmError::Config(format!("unknown llm provider: {}", other))),
    }
}

/// 按配置注册内置工具；create_ppt 用同一个模型客户端生成大纲
pub fn build_registry(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let tools = &cfg.tools;

    if tools.exec_code.enabled {
        registry.register(ExecCodeTool::new(
            tools.exec_code.interpreter.clone(),
            tools.exec_code.timeout_secs,
        ));
    }

    let generator = OutlineGenerator::new(llm, cfg.llm.model.clone(), tools.ppt.max_retries);
    registry.register(
        PptTool::new(generator, tools.ppt.output_dir.clone())
            .with_defaults(tools.ppt.slide_count, tools.ppt.style.clone()),
    );

    registry.register(OcrTool::new(ocr_settings(&tools.ocr)));
    registry
}

pub fn ocr_settings(cfg: &OcrSection) -> OcrSettings {
    OcrSettings {
        endpoint: cfg.endpoint.clone(),
        model: cfg.model.clone(),
        api_key: env_key(&cfg.api_key_env),
        max_tokens: cfg.max_tokens,
        temperature: cfg.temperature,
        timeout_secs: cfg.timeout_secs,
    }
}
