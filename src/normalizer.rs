//! AI 分析结果的校验与规范化
//!
//! 模型输出的形态并不可靠：可能是数组也可能是单个对象，可能缺少嵌套字段，
//! 也可能是早期版本的扁平结构（`studentAnswer`、`knowledgePoints` 等）。
//! 这里把所有形态统一转成 [`Analysis`]，下游的存储和渲染不再做任何兜底。

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{NotebookError, Result};
use crate::models::*;

pub use crate::models::{PRIMARY_POINT_FALLBACK, STANDARD_ANSWER_FALLBACK};
pub const TITLE_FALLBACK: &str = "未命名错题";

// 出现任意一个才算可用的候选分析
const RECOGNIZED_KEYS: &[&str] = &[
    "questionText",
    "comparison",
    "studentAnswer",
    "standardAnswer",
    "gapAnalysis",
    "isCorrect",
    "solution",
    "errorRoot",
    "errorAnalysis",
    "knowledgeMap",
    "knowledgePoints",
    "logicEngine",
    "mermaidCode",
    "examinerIntent",
    "difficulty",
    "masteryLevel",
    "variationQuestion",
    "tags",
    "title",
];

// 有些模型会把数组包在一个对象里返回
const WRAPPER_KEYS: &[&str] = &["questions", "results"];

const NESTED_SECTIONS: &[&str] = &["comparison", "errorRoot", "knowledgeMap", "logicEngine"];

/// 一个尚未规范化的候选分析
#[derive(Debug, Clone, Copy)]
pub enum Candidate<'a> {
    /// 至少带有一个嵌套分区（comparison / knowledgeMap / ...）
    Canonical(&'a Map<String, Value>),
    /// 早期的扁平结构
    Legacy(&'a Map<String, Value>),
}

impl<'a> Candidate<'a> {
    pub fn classify(value: &'a Value) -> Option<Self> {
        let obj = value.as_object()?;
        if !RECOGNIZED_KEYS.iter().any(|key| obj.get(*key).is_some_and(|v| !v.is_null())) {
            return None;
        }
        let has_nested = NESTED_SECTIONS
            .iter()
            .any(|section| obj.get(*section).is_some_and(Value::is_object));
        Some(if has_nested { Candidate::Canonical(obj) } else { Candidate::Legacy(obj) })
    }

    fn fields(&self) -> &'a Map<String, Value> {
        match *self {
            Candidate::Canonical(obj) | Candidate::Legacy(obj) => obj,
        }
    }

    fn flat(&self, key: &str) -> Option<&'a Value> {
        self.fields().get(key).filter(|v| !v.is_null())
    }

    fn nested(&self, section: &str, key: &str) -> Option<&'a Value> {
        match *self {
            Candidate::Canonical(obj) => obj
                .get(section)
                .and_then(Value::as_object)
                .and_then(|s| s.get(key))
                .filter(|v| !v.is_null()),
            Candidate::Legacy(_) => None,
        }
    }

    /// 先取嵌套字段，再取扁平字段
    fn text(&self, section: &str, key: &str) -> Option<String> {
        self.nested(section, key)
            .and_then(as_text)
            .or_else(|| self.flat(key).and_then(as_text))
    }
}

/// 解析模型返回的原始文本，得到规范化后的分析列表
pub fn normalize_payload(raw: &str) -> Result<Vec<NormalizedAnalysis>> {
    let value = parse_json_text(raw)?;
    normalize_value(&value)
}

/// 已解析为 JSON 的负载；没有可用候选时返回 `EmptyAnalysis`
pub fn normalize_value(value: &Value) -> Result<Vec<NormalizedAnalysis>> {
    let results: Vec<NormalizedAnalysis> = candidates(value)
        .into_iter()
        .map(normalize_candidate)
        .collect();

    if results.is_empty() {
        debug!("负载中没有可用的候选分析");
        return Err(NotebookError::EmptyAnalysis);
    }
    Ok(results)
}

/// 单个对象的规范化，不可用时返回 None
pub fn normalize_object(value: &Value) -> Option<NormalizedAnalysis> {
    Candidate::classify(value).map(normalize_candidate)
}

fn candidates(value: &Value) -> Vec<Candidate<'_>> {
    match value {
        Value::Array(items) => items.iter().filter_map(Candidate::classify).collect(),
        Value::Object(obj) => {
            if let Some(candidate) = Candidate::classify(value) {
                return vec![candidate];
            }
            WRAPPER_KEYS
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_array))
                .map(|items| items.iter().filter_map(Candidate::classify).collect())
                .unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

pub fn normalize_candidate(candidate: Candidate<'_>) -> NormalizedAnalysis {
    let tags = candidate.flat("tags").and_then(as_string_list).unwrap_or_default();
    let legacy_points = candidate.flat("knowledgePoints").and_then(as_string_list);

    let comparison = Comparison {
        student_answer: candidate.text("comparison", "studentAnswer").unwrap_or_default(),
        standard_answer: candidate
            .text("comparison", "standardAnswer")
            .unwrap_or_else(|| STANDARD_ANSWER_FALLBACK.to_string()),
        gap_analysis: candidate.text("comparison", "gapAnalysis").unwrap_or_default(),
    };

    let knowledge_map = KnowledgeMap {
        primary_point: candidate
            .nested("knowledgeMap", "primaryPoint")
            .and_then(as_text)
            .or_else(|| legacy_points.as_ref().and_then(|points| points.first().cloned()))
            .unwrap_or_else(|| PRIMARY_POINT_FALLBACK.to_string()),
        related_points: candidate
            .nested("knowledgeMap", "relatedPoints")
            .and_then(as_string_list)
            .or_else(|| legacy_points.as_ref().map(|points| points.iter().skip(1).cloned().collect()))
            .unwrap_or_default(),
    };

    let logic_engine = LogicEngine {
        mermaid_code: candidate
            .text("logicEngine", "mermaidCode")
            .map(|code| sanitize_mermaid(&code))
            .unwrap_or_default(),
        excalidraw_json: candidate
            .nested("logicEngine", "excalidrawJson")
            .or_else(|| candidate.flat("excalidrawJson"))
            .and_then(as_json_text),
        difficulty: candidate
            .nested("logicEngine", "difficulty")
            .or_else(|| candidate.flat("difficulty"))
            .and_then(as_number)
            .map(clamp_difficulty)
            .unwrap_or(DEFAULT_DIFFICULTY),
        examiner_intent: candidate.text("logicEngine", "examinerIntent").unwrap_or_default(),
    };

    let error_root = match candidate.flat("errorRoot") {
        Some(Value::Object(root)) => ErrorRoot {
            category: root
                .get("category")
                .and_then(as_text)
                .map(|c| ErrorCategory::parse(&c))
                .unwrap_or_default(),
            detailed_reason: root
                .get("detailedReason")
                .and_then(as_text)
                .or_else(|| candidate.flat("errorAnalysis").and_then(as_text))
                .unwrap_or_default(),
        },
        // 类型不对的 errorRoot 当作错因说明处理
        Some(other) => ErrorRoot {
            category: ErrorCategory::Uncategorized,
            detailed_reason: as_text(other).unwrap_or_default(),
        },
        None => ErrorRoot {
            category: ErrorCategory::Uncategorized,
            detailed_reason: candidate.flat("errorAnalysis").and_then(as_text).unwrap_or_default(),
        },
    };

    let raw_title = candidate.flat("title").and_then(as_text).unwrap_or_default();
    let title = derive_title(&knowledge_map.primary_point, &tags, &raw_title);

    let analysis = Analysis {
        question_text: candidate.flat("questionText").and_then(as_text).unwrap_or_default(),
        comparison,
        is_correct: candidate.flat("isCorrect").and_then(as_bool).unwrap_or(false),
        solution: candidate.flat("solution").and_then(as_text).unwrap_or_default(),
        error_root,
        knowledge_map,
        logic_engine,
        mastery_level: candidate.flat("masteryLevel").and_then(as_text).unwrap_or_default(),
        variation_question: candidate
            .flat("variationQuestion")
            .and_then(as_text)
            .filter(|q| !q.trim().is_empty()),
        tags,
        title: raw_title,
    };

    NormalizedAnalysis { analysis, title }
}

/// 标题优先用知识点概括错误类型，其次才是标签和原始标题
pub fn derive_title(primary_point: &str, tags: &[String], raw_title: &str) -> String {
    let point = primary_point.trim();
    if !point.is_empty() && point != PRIMARY_POINT_FALLBACK {
        return point.to_string();
    }
    if let Some(tag) = tags.iter().map(|t| t.trim()).find(|t| !t.is_empty()) {
        return tag.to_string();
    }
    if !raw_title.trim().is_empty() {
        return raw_title.trim().to_string();
    }
    TITLE_FALLBACK.to_string()
}

/// 去掉 mermaid 代码外层的 ``` 围栏
pub fn sanitize_mermaid(code: &str) -> String {
    strip_code_fence(code).trim().to_string()
}

// 围栏后常见的语言标记
const FENCE_LANGUAGES: [&str; 4] = ["mermaid", "json", "text", "markdown"];

// 首尾的围栏各自独立剥离，缺了哪一边都可以
fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = match rest.find('\n') {
            // 第一行剩余部分是语言标记
            Some(i) => &rest[i + 1..],
            None => strip_inline_language(rest),
        };
    }
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

// 单行围栏 ```mermaid graph TD``` 中的语言标记
fn strip_inline_language(rest: &str) -> &str {
    let rest = rest.trim_start();
    let tag_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let tag = rest[..tag_end].trim_end_matches('`');
    if FENCE_LANGUAGES.iter().any(|lang| tag.eq_ignore_ascii_case(lang)) {
        &rest[tag_end..]
    } else {
        rest
    }
}

/// 从模型文本中取出 JSON：先剥代码围栏，再退而取最外层的括号区间
pub fn parse_json_text(raw: &str) -> Result<Value> {
    let unfenced = strip_code_fence(raw);
    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        return Ok(value);
    }

    let start = unfenced.find(['[', '{']);
    if let Some(start) = start {
        let close = if unfenced[start..].starts_with('[') { ']' } else { '}' };
        if let Some(end) = unfenced.rfind(close).filter(|end| *end > start) {
            if let Ok(value) = serde_json::from_str::<Value>(&unfenced[start..=end]) {
                return Ok(value);
            }
        }
    }

    let preview: String = raw.chars().take(120).collect();
    Err(NotebookError::MalformedPayload(format!("无法解析为 JSON: {}", preview)))
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_json_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(_) | Value::Array(_) => Some(value.to_string()),
        _ => None,
    }
}

fn as_string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter(|item| !item.is_boolean())
                .filter_map(as_text)
                .filter(|s| !s.trim().is_empty())
                .collect(),
        ),
        Value::String(s) if !s.trim().is_empty() => Some(vec![s.clone()]),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn clamp_difficulty(raw: f64) -> u8 {
    if raw.is_nan() {
        return DEFAULT_DIFFICULTY;
    }
    raw.round().clamp(1.0, 5.0) as u8
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "正确" | "对" => Some(true),
            "false" | "no" | "错误" | "错" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canonical_payload() -> Value {
        json!({
            "questionText": "求 sin²x + cos²x 的值",
            "comparison": {
                "studentAnswer": "2",
                "standardAnswer": "1",
                "gapAnalysis": "混淆了平方和恒等式"
            },
            "isCorrect": false,
            "solution": "由恒等式可得 1",
            "errorRoot": { "category": "ConceptConfused", "detailedReason": "恒等式记忆错误" },
            "knowledgeMap": { "primaryPoint": "同角三角函数关系", "relatedPoints": ["诱导公式"] },
            "logicEngine": {
                "mermaidCode": "```mermaid\nflowchart TD\nA-->B\n```",
                "difficulty": 2,
                "examinerIntent": "考查基本恒等式"
            },
            "masteryLevel": "需要巩固",
            "variationQuestion": "求 1 - sin²x",
            "tags": ["三角函数"],
            "title": "恒等式"
        })
    }

    #[test]
    fn canonical_object_is_a_single_candidate() {
        let results = normalize_value(&canonical_payload()).unwrap();
        assert_eq!(results.len(), 1);
        let NormalizedAnalysis { analysis, title } = &results[0];
        assert_eq!(title, "同角三角函数关系");
        assert_eq!(analysis.comparison.standard_answer, "1");
        assert_eq!(analysis.error_root.category, ErrorCategory::ConceptConfused);
        assert_eq!(analysis.logic_engine.mermaid_code, "flowchart TD\nA-->B");
        assert_eq!(analysis.logic_engine.difficulty, 2);
        assert_eq!(analysis.variation_question.as_deref(), Some("求 1 - sin²x"));
        assert_eq!(analysis.title, "恒等式");
    }

    #[test]
    fn legacy_shape_is_upgraded() {
        let legacy = json!({
            "questionText": "三角形 ABC 中求边 c",
            "studentAnswer": "5",
            "knowledgePoints": ["Trig identities", "Law of cosines"],
            "examinerIntent": "余弦定理的应用",
            "difficulty": 9,
            "errorAnalysis": "把正弦定理当成余弦定理"
        });
        let candidate = Candidate::classify(&legacy).unwrap();
        assert!(matches!(candidate, Candidate::Legacy(_)));

        let NormalizedAnalysis { analysis, title } = normalize_candidate(candidate);
        assert_eq!(analysis.comparison.student_answer, "5");
        assert_eq!(analysis.comparison.standard_answer, STANDARD_ANSWER_FALLBACK);
        assert_eq!(analysis.knowledge_map.primary_point, "Trig identities");
        assert_eq!(analysis.knowledge_map.related_points, vec!["Law of cosines".to_string()]);
        assert_eq!(analysis.logic_engine.examiner_intent, "余弦定理的应用");
        assert_eq!(analysis.logic_engine.difficulty, 5);
        assert_eq!(analysis.error_root.category, ErrorCategory::Uncategorized);
        assert_eq!(analysis.error_root.detailed_reason, "把正弦定理当成余弦定理");
        assert_eq!(title, "Trig identities");
    }

    #[test]
    fn minimal_candidate_gets_every_default() {
        let results = normalize_value(&json!([{ "solution": "略" }])).unwrap();
        let NormalizedAnalysis { analysis, title } = &results[0];
        assert_eq!(analysis.question_text, "");
        assert_eq!(analysis.comparison.student_answer, "");
        assert_eq!(analysis.comparison.standard_answer, STANDARD_ANSWER_FALLBACK);
        assert_eq!(analysis.knowledge_map.primary_point, PRIMARY_POINT_FALLBACK);
        assert!(analysis.knowledge_map.related_points.is_empty());
        assert_eq!(analysis.logic_engine.difficulty, DEFAULT_DIFFICULTY);
        assert_eq!(analysis.logic_engine.mermaid_code, "");
        assert_eq!(analysis.error_root.category, ErrorCategory::Uncategorized);
        assert!(analysis.tags.is_empty());
        assert!(analysis.variation_question.is_none());
        assert_eq!(title, TITLE_FALLBACK);

        // 所有规范字段都会被序列化出来
        let serialized = serde_json::to_value(analysis).unwrap();
        for key in ["questionText", "comparison", "isCorrect", "solution", "errorRoot", "knowledgeMap", "logicEngine", "masteryLevel", "tags", "title"] {
            assert!(serialized.get(key).is_some(), "missing {key}");
        }
        assert!(serialized["logicEngine"].get("examinerIntent").is_some());
    }

    #[test]
    fn title_falls_back_through_tags_then_raw_title() {
        let with_tag = normalize_object(&json!({ "tags": ["", "函数"], "title": "第3题" })).unwrap();
        assert_eq!(with_tag.title, "函数");

        let with_title = normalize_object(&json!({ "title": "第3题" })).unwrap();
        assert_eq!(with_title.title, "第3题");
    }

    #[test]
    fn wrong_types_are_repaired() {
        let results = normalize_value(&json!({
            "comparison": { "studentAnswer": 42, "standardAnswer": null },
            "knowledgeMap": "not an object",
            "logicEngine": { "difficulty": "4", "excalidrawJson": { "elements": [] } },
            "errorRoot": "计算失误",
            "isCorrect": "false",
            "tags": ["几何", 3, null, { "x": 1 }]
        }))
        .unwrap();
        let analysis = &results[0].analysis;
        assert_eq!(analysis.comparison.student_answer, "42");
        assert_eq!(analysis.comparison.standard_answer, STANDARD_ANSWER_FALLBACK);
        assert_eq!(analysis.knowledge_map.primary_point, PRIMARY_POINT_FALLBACK);
        assert_eq!(analysis.logic_engine.difficulty, 4);
        assert_eq!(analysis.logic_engine.excalidraw_json.as_deref(), Some("{\"elements\":[]}"));
        assert_eq!(analysis.error_root.detailed_reason, "计算失误");
        assert!(!analysis.is_correct);
        assert_eq!(analysis.tags, vec!["几何".to_string(), "3".to_string()]);
    }

    #[test]
    fn array_order_is_preserved_and_junk_elements_dropped() {
        let results = normalize_value(&json!([
            { "questionText": "第一题" },
            42,
            {},
            { "questionText": "第二题" }
        ]))
        .unwrap();
        let texts: Vec<_> = results.iter().map(|r| r.analysis.question_text.as_str()).collect();
        assert_eq!(texts, vec!["第一题", "第二题"]);
    }

    #[test]
    fn empty_payloads_signal_empty_analysis() {
        for raw in ["[]", "null", "{}", "\"just text\""] {
            match normalize_payload(raw) {
                Err(NotebookError::EmptyAnalysis) => {}
                other => panic!("{raw}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn unparseable_text_is_malformed() {
        match normalize_payload("抱歉，我无法识别这张图片") {
            Err(NotebookError::MalformedPayload(_)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn json_is_extracted_from_fences_and_prose() {
        let fenced = "```json\n[{\"questionText\": \"a\"}]\n```";
        assert_eq!(normalize_payload(fenced).unwrap().len(), 1);

        let prose = "分析结果如下：\n{\"questionText\": \"b\", \"tags\": [\"x\"]}\n希望对你有帮助";
        assert_eq!(normalize_payload(prose).unwrap()[0].analysis.question_text, "b");

        let wrapped = "{\"questions\": [{\"questionText\": \"c\"}, {\"questionText\": \"d\"}]}";
        assert_eq!(normalize_payload(wrapped).unwrap().len(), 2);
    }

    #[test]
    fn mermaid_sanitizing() {
        assert_eq!(sanitize_mermaid("```mermaid\nflowchart TD\nA-->B\n```"), "flowchart TD\nA-->B");
        assert_eq!(sanitize_mermaid("  graph LR\nA-->B  \n"), "graph LR\nA-->B");
        assert_eq!(sanitize_mermaid("```\ngraph LR\n```"), "graph LR");
        assert_eq!(sanitize_mermaid(""), "");
        assert_eq!(sanitize_mermaid("flowchart TD\nA-->B\n```"), "flowchart TD\nA-->B");
        assert_eq!(sanitize_mermaid("```mermaid graph TD```"), "graph TD");
        assert_eq!(sanitize_mermaid("```graph TD; A-->B```"), "graph TD; A-->B");
        assert_eq!(sanitize_mermaid("```mermaid```"), "");
    }

    #[test]
    fn normalizing_canonical_output_is_stable() {
        let first = normalize_value(&canonical_payload()).unwrap().remove(0);
        let reserialized = serde_json::to_value(&first.analysis).unwrap();
        let second = normalize_object(&reserialized).unwrap();
        assert_eq!(first.analysis, second.analysis);
    }
}
