use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::api::{ApiClient, ChatRequest, RequestMessage};
use crate::config::Config;
use crate::database::RecordStore;
use crate::error::Result;
use crate::image;
use crate::models::*;
use crate::normalizer;
use crate::query::{self, RecordQuery};

/// 远程分析服务：输入图片和科目，返回模型的原始文本
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(&self, image: &str, subject: Subject, hint: Option<&str>) -> Result<String>;
}

const SYSTEM_PROMPT: &str = "你是一位经验丰富的中学教师，擅长分析学生的错题并给出结构化的诊断。只输出 JSON，不要输出其他内容。";

fn build_prompt(subject: Subject, hint: Option<&str>) -> String {
    let hint = hint
        .map(|h| format!("\n学生补充说明：{}\n", h.trim()))
        .unwrap_or_default();
    format!(
        r#"
这是一张{subject}错题的照片。图片中可能包含多道小题，请逐题分析，每道小题输出一个对象。
{hint}
请用以下JSON数组格式返回结果：
[
  {{
    "questionText": "完整还原的题目",
    "comparison": {{
      "studentAnswer": "学生的作答",
      "standardAnswer": "正确答案",
      "gapAnalysis": "两者之间的差距分析"
    }},
    "isCorrect": false,
    "solution": "分步骤的详细解答",
    "errorRoot": {{
      "category": "Careless | FormulaError | ConceptConfused | LogicGap | KnowledgeBlind | TimePressure",
      "detailedReason": "具体错因"
    }},
    "knowledgeMap": {{
      "primaryPoint": "核心知识点",
      "relatedPoints": ["相关知识点"]
    }},
    "logicEngine": {{
      "mermaidCode": "flowchart TD 格式的解题思路图",
      "difficulty": 3,
      "examinerIntent": "命题意图"
    }},
    "masteryLevel": "掌握程度建议",
    "variationQuestion": "一道同类型的变式练习题",
    "tags": ["标签"],
    "title": "简短标题"
  }}
]

要求：
1. difficulty 为 1-5 的整数
2. mermaidCode 不要包含 ``` 围栏
3. 只返回JSON数组
"#,
        subject = subject.display_name(),
        hint = hint,
    )
}

/// 通过 OpenAI 兼容接口调用多模态模型
pub struct RemoteAnalyzer {
    api_client: ApiClient,
}

impl RemoteAnalyzer {
    pub fn new(config: Config) -> Result<Self> {
        Ok(RemoteAnalyzer {
            api_client: ApiClient::new(config)?,
        })
    }
}

#[async_trait]
impl AnalysisProvider for RemoteAnalyzer {
    async fn analyze(&self, image: &str, subject: Subject, hint: Option<&str>) -> Result<String> {
        let api = &self.api_client.config().api;
        let request = ChatRequest {
            model: api.model.clone(),
            messages: vec![
                RequestMessage::system(SYSTEM_PROMPT),
                RequestMessage::user_with_image(build_prompt(subject, hint), image),
            ],
            max_tokens: api.max_tokens,
            temperature: api.temperature,
        };

        let response = self.api_client.make_request_with_retry(&request).await?;
        Ok(response.first_content()?.to_string())
    }
}

/// 错题本：持有唯一的存储实例和分析服务
pub struct Notebook<S, P> {
    store: S,
    provider: P,
    pub config: Config,
}

impl<S: RecordStore, P: AnalysisProvider> Notebook<S, P> {
    pub fn new(store: S, provider: P, config: Config) -> Self {
        Notebook { store, provider, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// 拍照录入：分析、规范化，每道小题保存为一条记录
    pub async fn capture(&self, image: &str, subject: Subject, hint: Option<&str>) -> Result<Vec<i64>> {
        let records = self.analyze_image(image, subject, hint).await?;
        self.store.save_batch(&records).await
    }

    async fn analyze_image(&self, image: &str, subject: Subject, hint: Option<&str>) -> Result<Vec<QuestionRecord>> {
        let raw = self.provider.analyze(image, subject, hint).await?;
        let analyses = normalizer::normalize_payload(&raw)?;
        info!("📝 识别出 {} 道小题", analyses.len());

        let created_at = chrono::Utc::now().timestamp_millis();
        Ok(analyses
            .into_iter()
            .map(|normalized| QuestionRecord::from_normalized(subject, image.to_string(), normalized, created_at))
            .collect())
    }

    /// 批量录入多张图片：并发分析，顺序写入
    pub async fn capture_files(&self, paths: &[PathBuf], subject: Subject, hint: Option<&str>) -> Result<CaptureSummary> {
        let concurrency = self.config.processing.concurrent_requests.max(1);

        // 单个文件的失败只记录原因，不影响其他文件
        let analyzed: Vec<(PathBuf, std::result::Result<Vec<QuestionRecord>, String>)> =
            stream::iter(paths.iter().cloned())
                .map(|path| async move {
                    info!("🔍 分析图片: {}", path.display());
                    let result = match image::encode_file(&path) {
                        Ok(data_uri) => self.analyze_image(&data_uri, subject, hint).await.map_err(|e| e.to_string()),
                        Err(e) => Err(format!("图片读取失败: {}", e)),
                    };
                    (path, result)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let mut summary = CaptureSummary::default();
        for (path, result) in analyzed {
            let name = display_name(&path);
            match result {
                // 写入失败直接中止，分析阶段的失败记录下来继续
                Ok(records) => {
                    let ids = self.store.save_batch(&records).await?;
                    info!("💾 {} 保存了 {} 条错题", name, ids.len());
                    summary.saved.push((name, ids));
                }
                Err(e) => {
                    warn!("❌ {} 分析失败: {}", name, e);
                    summary.failed.push((name, e));
                }
            }
        }
        Ok(summary)
    }

    /// 按条件浏览，结果按时间倒序
    pub async fn list(&self, query: &RecordQuery) -> Result<Vec<QuestionRecord>> {
        let records = match query.subject {
            Some(subject) => self.store.get_by_subject(subject).await?,
            None => self.store.get_all().await?,
        };
        Ok(query::apply(query, records))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
