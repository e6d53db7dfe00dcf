//! create_ppt 工具：由模型生成幻灯片大纲，再交给 DeckWriter 写成文件
//!
//! 大纲是 JSON 数组（content / image / conclusion 三类页面），允许包在 ```json 代码块里；
//! 解析失败按 max_retries 重试，全部失败时使用内置模板。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{LlmClient, ModelRequest, SamplingParams};
use crate::memory::{sanitize_title, Message};
use crate::tools::schema::parameters_schema_for;
use crate::tools::Tool;

const OUTLINE_SYSTEM_PROMPT: &str =
    "你是一个专业的PPT内容生成助手，生成结构化、简洁的幻灯片内容，严格返回JSON格式。";

/// 大纲中的一页
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SlideOutline {
    Content {
        title: String,
        #[serde(default)]
        points: Vec<String>,
    },
    Image {
        title: String,
        #[serde(default)]
        image_path: String,
    },
    Conclusion {
        title: String,
        #[serde(default)]
        content: String,
    },
}

impl SlideOutline {
    fn content(title: impl Into<String>, points: &[String]) -> Self {
        SlideOutline::Content {
            title: title.into(),
            points: points.to_vec(),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            SlideOutline::Content { title, .. }
            | SlideOutline::Image { title, .. }
            | SlideOutline::Conclusion { title, .. } => title,
        }
    }
}

/// 解析模型返回的大纲；去掉 ```json 围栏，必须是非空数组
pub fn parse_outline(raw: &str) -> Result<Vec<SlideOutline>, String> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    let slides: Vec<SlideOutline> =
        serde_json::from_str(body).map_err(|e| format!("invalid outline JSON: {}", e))?;
    if slides.is_empty() {
        return Err("outline is empty".to_string());
    }
    Ok(slides)
}

fn filler_slide(topic: &str, n: usize) -> SlideOutline {
    SlideOutline::content(
        format!("补充页{}", n),
        &[
            format!("{}的补充信息{}.1", topic, n),
            format!("补充信息{}.2", n),
            format!("补充信息{}.3", n),
        ],
    )
}

/// 截断或补页到 slide_count
pub fn fit_to_count(mut slides: Vec<SlideOutline>, slide_count: usize, topic: &str) -> Vec<SlideOutline> {
    slides.truncate(slide_count);
    while slides.len() < slide_count {
        let n = slides.len() + 1;
        slides.push(filler_slide(topic, n));
    }
    slides
}

/// 内置模板：概述、详细分析、实际应用、总结
pub fn fallback_outline(topic: &str, requirements: &str, slide_count: usize) -> Vec<SlideOutline> {
    let base = vec![
        SlideOutline::content(
            "概述",
            &[
                format!("关于{}的基本介绍", topic),
                "主要特点和重要性".to_string(),
                "当前发展状况".to_string(),
                "应用领域".to_string(),
            ],
        ),
        SlideOutline::content(
            "详细分析",
            &[
                format!("{}的核心要素", topic),
                "技术原理或实现方法".to_string(),
                "优势与挑战".to_string(),
                "发展趋势".to_string(),
            ],
        ),
        SlideOutline::content(
            "实际应用",
            &[
                "典型应用场景".to_string(),
                "成功案例分析".to_string(),
                "实施策略".to_string(),
                "效果评估".to_string(),
            ],
        ),
        SlideOutline::Conclusion {
            title: "总结与展望".to_string(),
            content: format!(
                "通过对{}的深入分析，我们可以看到其巨大的发展潜力和广阔的应用前景。",
                topic
            ),
        },
    ];
    let mut slides = fit_to_count(base, slide_count, topic);

    let req = requirements.to_lowercase();
    if req.contains("简短") || req.contains("brief") {
        slides.truncate(2);
    } else if req.contains("详细") || req.contains("detailed") {
        let deep_dive = SlideOutline::content(
            "深入探讨",
            &[
                format!("{}的技术细节", topic),
                "相关理论基础".to_string(),
                "实验数据分析".to_string(),
                "对比研究".to_string(),
            ],
        );
        slides.insert(slides.len().min(2), deep_dive);
    }
    slides
}

fn outline_prompt(topic: &str, requirements: &str, slide_count: usize, style: &str) -> String {
    let scene = if requirements.trim().is_empty() { "通用" } else { requirements };
    format!(
        r#"请为主题"{topic}"生成PPT内容，包含{slide_count}页（不含标题页），风格为{style}。
要求：
- 每页包含一个标题和4-5个要点（content类型）或一段总结文本（conclusion类型）。
- 内容必须与"{topic}"高度相关，语言专业，结构清晰，适合{scene}场景。
- 严格返回JSON数组并包裹在```json```代码块中，不要包含额外文本：
```json
[
  {{"type": "content", "title": "概述", "points": ["点1", "点2", "点3", "点4"]}},
  {{"type": "conclusion", "title": "总结与展望", "content": "总结文本"}}
]
```"#
    )
}

/// 用模型生成大纲，失败重试，最终回退到模板
pub struct OutlineGenerator {
    llm: Arc<dyn LlmClient>,
    sampling: SamplingParams,
    max_retries: u32,
}

impl OutlineGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            llm,
            sampling: SamplingParams {
                model: model.into(),
                temperature: 0.3,
                top_p: 1.0,
            },
            max_retries: max_retries.max(1),
        }
    }

    pub async fn generate(
        &self,
        topic: &str,
        requirements: &str,
        slide_count: usize,
        style: &str,
    ) -> Vec<SlideOutline> {
        let messages = [
            Message::system(OUTLINE_SYSTEM_PROMPT),
            Message::user(outline_prompt(topic, requirements, slide_count, style)),
        ];
        let request = ModelRequest::new(&self.sampling, &messages);
        for attempt in 1..=self.max_retries {
            let result = match self.llm.complete(&request).await {
                Ok(c) => parse_outline(&c.message.content),
                Err(e) => Err(e.to_string()),
            };
            match result {
                Ok(slides) => return fit_to_count(slides, slide_count, topic),
                Err(e) => tracing::warn!(
                    attempt,
                    max_retries = self.max_retries,
                    error = %e,
                    "slide outline generation failed"
                ),
            }
        }
        tracing::warn!(topic, "falling back to built-in slide template");
        fallback_outline(topic, requirements, slide_count)
    }
}

/// 幻灯片文件写出方
pub trait DeckWriter: Send + Sync {
    /// 文件扩展名（不含点）
    fn extension(&self) -> &str;

    fn write(&self, path: &Path, title: &str, slides: &[SlideOutline]) -> std::io::Result<()>;
}

/// 默认写出 Markdown 幻灯片：每页一节，`---` 分隔，首页为标题页
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownDeckWriter;

impl MarkdownDeckWriter {
    pub fn render(title: &str, slides: &[SlideOutline]) -> String {
        let mut sections = vec![format!("# {}\n\n由AI助手自动生成", title)];
        for slide in slides {
            let body = match slide {
                SlideOutline::Content { title, points } => {
                    let bullets: Vec<String> = points.iter().map(|p| format!("- {}", p)).collect();
                    format!("## {}\n\n{}", title, bullets.join("\n"))
                }
                SlideOutline::Image { title, image_path } => {
                    if image_path.is_empty() {
                        format!("## {}\n\n[此处应插入相关图片]", title)
                    } else {
                        format!("## {}\n\n![{}]({})", title, title, image_path)
                    }
                }
                SlideOutline::Conclusion { title, content } => format!("## {}\n\n{}", title, content),
            };
            sections.push(body);
        }
        let mut out = sections.join("\n\n---\n\n");
        out.push('\n');
        out
    }
}

impl DeckWriter for MarkdownDeckWriter {
    fn extension(&self) -> &str {
        "md"
    }

    fn write(&self, path: &Path, title: &str, slides: &[SlideOutline]) -> std::io::Result<()> {
        std::fs::write(path, Self::render(title, slides))
    }
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct CreatePptArgs {
    /// 演示文稿主题
    topic: String,
    /// 特殊要求，如 "简短"、"详细"
    requirements: Option<String>,
    /// 幻灯片页数（不含标题页）
    slide_count: Option<u32>,
    /// 风格，如 "商务风格"
    style: Option<String>,
    /// 输出文件名（可选）
    filename: Option<String>,
}

/// 幻灯片生成工具
pub struct PptTool {
    generator: OutlineGenerator,
    writer: Box<dyn DeckWriter>,
    output_dir: PathBuf,
    default_slide_count: usize,
    default_style: String,
}

impl PptTool {
    pub fn new(generator: OutlineGenerator, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            generator,
            writer: Box::new(MarkdownDeckWriter),
            output_dir: output_dir.into(),
            default_slide_count: 8,
            default_style: "商务风格".to_string(),
        }
    }

    pub fn with_writer(mut self, writer: Box<dyn DeckWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_defaults(mut self, slide_count: usize, style: impl Into<String>) -> Self {
        self.default_slide_count = slide_count.max(1);
        self.default_style = style.into();
        self
    }

    /// 文件名来自模型参数，清理后只保留单个文件名，始终落在 output_dir 内
    fn output_path(&self, topic: &str, filename: Option<&str>) -> PathBuf {
        let stem = filename
            .map(sanitize_title)
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| sanitize_title(&format!("{}_presentation", topic)));
        let stem = if stem.is_empty() {
            "presentation".to_string()
        } else {
            stem
        };
        let ext = self.writer.extension();
        let name = if stem.ends_with(&format!(".{}", ext)) {
            stem
        } else {
            format!("{}.{}", stem, ext)
        };
        self.output_dir.join(name)
    }
}

#[async_trait]
impl Tool for PptTool {
    fn name(&self) -> &str {
        "create_ppt"
    }

    fn description(&self) -> &str {
        "Create a slide deck presentation on a topic. Generates an outline and writes the deck file, returning its path."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<CreatePptArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let topic = args
            .get("topic")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        if topic.is_empty() {
            return Ok("Error: Missing required parameter 'topic' for PPT creation.".to_string());
        }
        let requirements = args.get("requirements").and_then(|v| v.as_str()).unwrap_or("");
        let slide_count = args
            .get("slide_count")
            .and_then(|v| v.as_u64())
            .map(|n| n.max(1) as usize)
            .unwrap_or(self.default_slide_count);
        let style = args
            .get("style")
            .and_then(|v| v.as_str())
            .unwrap_or(self.default_style.as_str());
        let filename = args.get("filename").and_then(|v| v.as_str());

        let slides = self
            .generator
            .generate(topic, requirements, slide_count, style)
            .await;

        std::fs::create_dir_all(&self.output_dir).map_err(|e| e.to_string())?;
        let path = self.output_path(topic, filename);
        let title = format!("{} - 专题演示", topic);
        self.writer
            .write(&path, &title, &slides)
            .map_err(|e| format!("write {}: {}", path.display(), e))?;

        tracing::info!(path = %path.display(), slides = slides.len(), "slide deck written");
        Ok(format!(
            "Presentation created successfully: {} ({} slides)",
            path.display(),
            slides.len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LlmError;
    use crate::llm::{MockLlmClient, MockReply};

    #[test]
    fn test_parse_outline_fenced() {
        let raw = "```json\n[{\"type\":\"content\",\"title\":\"概述\",\"points\":[\"a\",\"b\"]},{\"type\":\"conclusion\",\"title\":\"总结\",\"content\":\"end\"}]\n```";
        let slides = parse_outline(raw).unwrap();
        assert_eq!(slides.len(), 2);
        assert_eq!(slides[0].title(), "概述");
        assert!(matches!(slides[1], SlideOutline::Conclusion { .. }));
        assert!(parse_outline("not json").is_err());
        assert!(parse_outline("[]").is_err());
    }

    #[test]
    fn test_fit_to_count_pads_and_truncates() {
        let slides = fit_to_count(vec![], 3, "Rust");
        assert_eq!(slides.len(), 3);
        assert_eq!(slides[2].title(), "补充页3");
        assert_eq!(fit_to_count(slides, 1, "Rust").len(), 1);
    }

    #[test]
    fn test_fallback_requirements() {
        assert_eq!(fallback_outline("AI", "", 8).len(), 8);
        assert_eq!(fallback_outline("AI", "简短一些", 8).len(), 2);
        let detailed = fallback_outline("AI", "详细", 4);
        assert_eq!(detailed.len(), 5);
        assert_eq!(detailed[2].title(), "深入探讨");
    }

    #[test]
    fn test_markdown_render() {
        let slides = vec![
            SlideOutline::content("A", &["x".to_string()]),
            SlideOutline::Image {
                title: "B".to_string(),
                image_path: String::new(),
            },
        ];
        let md = MarkdownDeckWriter::render("Deck", &slides);
        assert!(md.starts_with("# Deck"));
        assert_eq!(md.matches("\n---\n").count(), 2);
        assert!(md.contains("- x"));
        assert!(md.contains("[此处应插入相关图片]"));
    }

    #[tokio::test]
    async fn test_generator_retries_then_falls_back() {
        let llm = Arc::new(MockLlmClient::with_replies([
            MockReply::text("oops"),
            MockReply::Error(LlmError::Transport("down".into())),
        ]));
        let generator = OutlineGenerator::new(llm.clone(), "qwen-plus", 2);
        let slides = generator.generate("AI", "", 4, "商务风格").await;
        assert_eq!(slides[0].title(), "概述");
        assert_eq!(llm.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_tool_writes_deck() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::with_replies([MockReply::text(
            "[{\"type\":\"content\",\"title\":\"Intro\",\"points\":[\"p1\"]}]",
        )]));
        let tool = PptTool::new(OutlineGenerator::new(llm, "qwen-plus", 1), dir.path());
        let out = tool
            .execute(serde_json::json!({"topic": "Rust", "slide_count": 2}))
            .await
            .unwrap();
        assert!(out.contains("2 slides"));
        let md = std::fs::read_to_string(dir.path().join("Rust_presentation.md")).unwrap();
        assert!(md.contains("## Intro"));
        assert!(md.contains("补充页2"));

        let missing = tool.execute(serde_json::json!({})).await.unwrap();
        assert!(missing.contains("topic"));
    }

    #[tokio::test]
    async fn test_filename_cannot_leave_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let decks = dir.path().join("decks");
        let llm = Arc::new(MockLlmClient::new());
        let tool = PptTool::new(OutlineGenerator::new(llm, "qwen-plus", 1), &decks);

        tool.execute(serde_json::json!({"topic": "x", "filename": "../escaped", "slide_count": 1}))
            .await
            .unwrap();
        assert!(decks.join("escaped.md").exists());
        assert!(!dir.path().join("escaped.md").exists());

        tool.execute(serde_json::json!({"topic": "../../up", "slide_count": 1}))
            .await
            .unwrap();
        assert!(decks.join("up_presentation.md").exists());

        assert_eq!(
            tool.output_path("x", Some("/etc/passwd")),
            decks.join("etcpasswd.md")
        );
        assert_eq!(tool.output_path("", Some("///")), decks.join("presentation.md"));
    }
}
