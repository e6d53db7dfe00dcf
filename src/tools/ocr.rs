//! recognize_image_text 工具：调用多模态 chat 接口识别图片文字
//!
//! 读取本地图片 → base64 data URL（MIME 由扩展名推断，默认 image/jpeg）→ POST 到视觉模型端点。
//! 所有失败（路径、HTTP、响应格式）都返回描述文本。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use schemars::JsonSchema;
use serde_json::Value;

use crate::tools::schema::parameters_schema_for;
use crate::tools::Tool;

/// 成功结果前缀；应用层据此剥离出纯文本
pub const OCR_RESULT_PREFIX: &str = "Image text: ";

const OCR_PROMPT: &str =
    "Recognize all text in the image. Return only the text, without any other description.";

#[allow(dead_code)]
#[derive(JsonSchema)]
struct OcrArgs {
    /// 图片文件的完整路径，支持 jpg、jpeg、png、bmp、gif、webp
    image_path: String,
}

/// 视觉接口设置
#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

/// 图片文字识别工具
pub struct OcrTool {
    http: reqwest::Client,
    settings: OcrSettings,
}

impl OcrTool {
    pub fn new(settings: OcrSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { http, settings }
    }

    fn mime_type(path: &Path) -> String {
        mime_guess::from_path(path)
            .first()
            .filter(|m| m.type_() == mime_guess::mime::IMAGE)
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "image/jpeg".to_string())
    }

    async fn recognize(&self, path: &Path) -> Result<String, String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("read failed: {}", e))?;
        let mime = Self::mime_type(path);
        let encoded = STANDARD.encode(&bytes);
        tracing::info!(path = %path.display(), mime = %mime, encoded_len = encoded.len(), "ocr request");

        let body = serde_json::json!({
            "model": self.settings.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": OCR_PROMPT },
                    { "type": "image_url", "image_url": { "url": format!("data:{};base64,{}", mime, encoded) } }
                ]
            }],
            "max_tokens": self.settings.max_tokens,
            "temperature": self.settings.temperature,
        });

        let mut rb = self.http.post(&self.settings.endpoint).json(&body);
        if let Some(key) = &self.settings.api_key {
            rb = rb.bearer_auth(key);
        }
        let resp = rb.send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "ocr api error");
            return Err(format!("API returned {} - {}", status, text));
        }
        let v: Value = resp.json().await.map_err(|e| e.to_string())?;
        v["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| "response has no message content".to_string())
    }
}

#[async_trait]
impl Tool for OcrTool {
    fn name(&self) -> &str {
        "recognize_image_text"
    }

    fn description(&self) -> &str {
        "Recognize the text content of an image file using a multimodal vision API (OCR)."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<OcrArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let image_path = args.get("image_path").and_then(|v| v.as_str()).unwrap_or("");
        if image_path.is_empty() {
            return Ok("Error: Image path is required for text recognition.".to_string());
        }
        let path = Path::new(image_path);
        if !path.exists() {
            return Ok(format!("Error: Image file not found at path: {}", image_path));
        }
        match self.recognize(path).await {
            Ok(text) => Ok(format!("{}{}", OCR_RESULT_PREFIX, text)),
            Err(e) => Ok(format!("Image recognition failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(endpoint: &str) -> OcrTool {
        OcrTool::new(OcrSettings {
            endpoint: endpoint.to_string(),
            model: "vision".to_string(),
            api_key: None,
            max_tokens: 100,
            temperature: 0.1,
            timeout_secs: 2,
        })
    }

    #[test]
    fn test_mime_type_from_extension() {
        assert_eq!(OcrTool::mime_type(Path::new("a.png")), "image/png");
        assert_eq!(OcrTool::mime_type(Path::new("a.unknownext")), "image/jpeg");
        assert_eq!(OcrTool::mime_type(Path::new("notes.txt")), "image/jpeg");
    }

    #[tokio::test]
    async fn test_missing_and_nonexistent_path() {
        let t = tool("http://127.0.0.1:9/v1/chat/completions");
        let out = t.execute(serde_json::json!({})).await.unwrap();
        assert!(out.contains("Image path is required"));
        let out = t
            .execute(serde_json::json!({"image_path": "/no/such/image.png"}))
            .await
            .unwrap();
        assert!(out.contains("Image file not found"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_text() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("scan.png");
        std::fs::write(&img, [0x89, b'P', b'N', b'G']).unwrap();
        let t = tool("http://127.0.0.1:9/v1/chat/completions");
        let out = t
            .execute(serde_json::json!({"image_path": img.to_string_lossy()}))
            .await
            .unwrap();
        assert!(out.starts_with("Image recognition failed:"));
    }
}
