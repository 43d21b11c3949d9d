use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

pub const API_KEY_ENV: &str = "NOTEBOOK_API_KEY";

// 配置文件结构；每一节都有默认值，缺少配置文件时离线命令仍可使用
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub processing: ProcessingConfig,
    pub database: DatabaseConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            api_key: String::new(),
            base_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            model: "google/gemini-2.5-flash".to_string(),
            max_tokens: 8000,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProcessingConfig {
    pub concurrent_requests: usize,
    pub request_delay_ms: u64,
    /// 分析失败默认不自动重试，由用户重新发起
    pub max_retries: u32,
    pub request_timeout_seconds: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        ProcessingConfig {
            concurrent_requests: 2,
            request_delay_ms: 500,
            max_retries: 0,
            request_timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub db_file: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            db_file: "mistake_notebook.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub export_dir: String,
    pub app_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            export_dir: ".".to_string(),
            app_name: "mistake_notebook".to_string(),
        }
    }
}

impl Config {
    /// 读取配置文件；文件不存在时使用默认配置，环境变量中的 API 密钥优先
    pub fn load_from(path: &Path) -> Result<Config> {
        let mut config = if path.exists() {
            let config_content = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("配置文件 {} 无法读取: {}", path.display(), e))?;
            Self::parse(&config_content)?
        } else {
            tracing::debug!("配置文件 {} 不存在，使用默认配置", path.display());
            Config::default()
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.api.api_key = key.trim().to_string();
            }
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Config> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("配置文件解析失败: {}", e))
    }
}
