use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// 科目：固定的四个
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    #[serde(alias = "语文")]
    Chinese,
    #[serde(alias = "数学")]
    Math,
    #[serde(alias = "英语")]
    English,
    #[serde(alias = "物理")]
    Physics,
}

impl Subject {
    pub const ALL: [Subject; 4] = [Subject::Chinese, Subject::Math, Subject::English, Subject::Physics];

    /// 存储和导出使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Chinese => "Chinese",
            Subject::Math => "Math",
            Subject::English => "English",
            Subject::Physics => "Physics",
        }
    }

    /// 中文名，用于提示词和展示
    pub fn display_name(&self) -> &'static str {
        match self {
            Subject::Chinese => "语文",
            Subject::Math => "数学",
            Subject::English => "英语",
            Subject::Physics => "物理",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Subject::ALL
            .into_iter()
            .find(|subject| subject.as_str().eq_ignore_ascii_case(s) || subject.display_name() == s)
            .ok_or_else(|| format!("未知科目: {}", s))
    }
}

// 错因分类；模型自创的分类一律归入 Uncategorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum ErrorCategory {
    Careless,
    FormulaError,
    ConceptConfused,
    LogicGap,
    KnowledgeBlind,
    TimePressure,
    #[default]
    Uncategorized,
}

impl ErrorCategory {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace(['_', '-', ' '], "").as_str() {
            "careless" => ErrorCategory::Careless,
            "formulaerror" => ErrorCategory::FormulaError,
            "conceptconfused" => ErrorCategory::ConceptConfused,
            "logicgap" => ErrorCategory::LogicGap,
            "knowledgeblind" => ErrorCategory::KnowledgeBlind,
            "timepressure" => ErrorCategory::TimePressure,
            _ => ErrorCategory::Uncategorized,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Careless => "粗心大意",
            ErrorCategory::FormulaError => "公式错误",
            ErrorCategory::ConceptConfused => "概念混淆",
            ErrorCategory::LogicGap => "逻辑断层",
            ErrorCategory::KnowledgeBlind => "知识盲区",
            ErrorCategory::TimePressure => "时间压力",
            ErrorCategory::Uncategorized => "未分类",
        }
    }
}

impl From<String> for ErrorCategory {
    fn from(s: String) -> Self {
        ErrorCategory::parse(&s)
    }
}

pub const STANDARD_ANSWER_FALLBACK: &str = "见解析";
pub const PRIMARY_POINT_FALLBACK: &str = "未分类";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub student_answer: String,
    pub standard_answer: String,
    pub gap_analysis: String,
}

impl Default for Comparison {
    fn default() -> Self {
        Comparison {
            student_answer: String::new(),
            standard_answer: STANDARD_ANSWER_FALLBACK.to_string(),
            gap_analysis: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRoot {
    pub category: ErrorCategory,
    pub detailed_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeMap {
    pub primary_point: String,
    pub related_points: Vec<String>,
}

impl Default for KnowledgeMap {
    fn default() -> Self {
        KnowledgeMap {
            primary_point: PRIMARY_POINT_FALLBACK.to_string(),
            related_points: Vec::new(),
        }
    }
}

pub const DEFAULT_DIFFICULTY: u8 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicEngine {
    pub mermaid_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excalidraw_json: Option<String>,
    pub difficulty: u8,
    pub examiner_intent: String,
}

impl Default for LogicEngine {
    fn default() -> Self {
        LogicEngine {
            mermaid_code: String::new(),
            excalidraw_json: None,
            difficulty: DEFAULT_DIFFICULTY,
            examiner_intent: String::new(),
        }
    }
}

/// 规范形态的 AI 分析结果，所有嵌套字段都一定存在
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub question_text: String,
    pub comparison: Comparison,
    pub is_correct: bool,
    pub solution: String,
    pub error_root: ErrorRoot,
    pub knowledge_map: KnowledgeMap,
    pub logic_engine: LogicEngine,
    pub mastery_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation_question: Option<String>,
    pub tags: Vec<String>,
    pub title: String,
}

/// 一条错题记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub subject: Subject,
    pub title: String,
    pub tags: Vec<String>,
    pub image: String,
    pub analysis: Analysis,
    pub created_at: i64,
}

impl QuestionRecord {
    /// 由一条规范化后的分析构造待保存的记录（尚无 id）
    pub fn from_normalized(subject: Subject, image: String, normalized: NormalizedAnalysis, created_at: i64) -> Self {
        QuestionRecord {
            id: None,
            subject,
            title: normalized.title,
            tags: normalized.analysis.tags.clone(),
            image,
            analysis: normalized.analysis,
            created_at,
        }
    }

    /// 对比两条记录时忽略 id
    pub fn same_content(&self, other: &QuestionRecord) -> bool {
        self.subject == other.subject
            && self.title == other.title
            && self.tags == other.tags
            && self.image == other.image
            && self.analysis == other.analysis
            && self.created_at == other.created_at
    }
}

/// normalizer 的输出：规范分析 + 推导出的记录标题
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAnalysis {
    pub analysis: Analysis,
    pub title: String,
}

// 导入时被跳过的条目
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEntry {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub imported: Vec<i64>,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Default)]
pub struct CaptureSummary {
    pub saved: Vec<(String, Vec<i64>)>,
    pub failed: Vec<(String, String)>,
}
