use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{NotebookError, Result};

// OpenAI 兼容接口的响应结构
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Serialize)]
pub struct RequestMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

// 多模态消息片段
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl RequestMessage {
    pub fn system(text: impl Into<String>) -> Self {
        RequestMessage {
            role: "system".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// 文本 + 图片（data URI）的用户消息
    pub fn user_with_image(text: impl Into<String>, image: impl Into<String>) -> Self {
        RequestMessage {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: image.into() },
                },
            ]),
        }
    }
}

impl ChatResponse {
    /// 第一个候选的文本内容
    pub fn first_content(&self) -> Result<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| NotebookError::AnalysisFailure("模型返回了空内容".to_string()))
    }
}

pub struct ApiClient {
    client: Client,
    config: Config,
}

impl ApiClient {
    pub fn new(config: Config) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.processing.request_timeout_seconds))
            .build()
            .map_err(|e| NotebookError::AnalysisFailure(format!("HTTP 客户端创建失败: {}", e)))?;

        Ok(ApiClient { client, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 发送请求；失败时按配置的次数重试（默认不重试）
    pub async fn make_request_with_retry(&self, request: &ChatRequest) -> Result<ChatResponse> {
        if self.config.api.api_key.trim().is_empty() {
            return Err(NotebookError::AnalysisFailure(
                "未配置 API 密钥（config.toml 的 api.api_key 或环境变量 NOTEBOOK_API_KEY）".to_string(),
            ));
        }

        let mut last_error = None;

        for attempt in 0..=self.config.processing.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(self.config.processing.request_delay_ms * (attempt as u64 + 1));
                info!("⏳ 重试 {}/{} 次，等待 {:?}...", attempt, self.config.processing.max_retries, delay);
                sleep(delay).await;
            }

            match self.send_once(request).await {
                Ok(response) => {
                    if attempt > 0 {
                        info!("✅ 重试成功！");
                    }
                    return Ok(response);
                }
                Err(e) => {
                    warn!("❌ 尝试 {}: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| NotebookError::AnalysisFailure("所有重试都失败了".to_string())))
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let response = self
            .client
            .post(&self.config.api.base_url)
            .header("Authorization", format!("Bearer {}", self.config.api.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| NotebookError::AnalysisFailure(format!("网络请求失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|e| format!("读取错误响应失败: {}", e));
            return Err(NotebookError::AnalysisFailure(format!(
                "API请求失败 (状态码: {}): {}",
                status, error_text
            )));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| NotebookError::AnalysisFailure(format!("响应解析失败: {}", e)))
    }
}
