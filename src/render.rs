//! 错题详情的 Markdown 渲染
//!
//! 输入总是规范化后的记录，所以每一节都无条件输出。

use std::fmt::Write;

use crate::models::QuestionRecord;

pub fn render_markdown(record: &QuestionRecord) -> String {
    let analysis = &record.analysis;
    let mut out = String::new();

    // 写入 String 不会失败
    let _ = writeln!(out, "# {}", record.title);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "科目：{} ｜ 记录时间：{}",
        record.subject.display_name(),
        format_timestamp(record.created_at)
    );
    if !record.tags.is_empty() {
        let _ = writeln!(out, "标签：{}", record.tags.join("、"));
    }

    section(&mut out, "题目", &analysis.question_text);

    let _ = writeln!(out, "\n## 答案对比\n");
    let verdict = if analysis.is_correct { "✅ 正确" } else { "❌ 错误" };
    let _ = writeln!(out, "- 判定：{}", verdict);
    let _ = writeln!(out, "- 我的答案：{}", analysis.comparison.student_answer);
    let _ = writeln!(out, "- 标准答案：{}", analysis.comparison.standard_answer);
    let _ = writeln!(out, "- 差距分析：{}", analysis.comparison.gap_analysis);

    let _ = writeln!(out, "\n## 错因\n");
    let _ = writeln!(out, "**{}**：{}", analysis.error_root.category.label(), analysis.error_root.detailed_reason);

    let _ = writeln!(out, "\n## 知识点\n");
    let _ = writeln!(out, "- 核心：{}", analysis.knowledge_map.primary_point);
    for point in &analysis.knowledge_map.related_points {
        let _ = writeln!(out, "- 相关：{}", point);
    }

    section(&mut out, "解题步骤", &analysis.solution);

    let engine = &analysis.logic_engine;
    let _ = writeln!(out, "\n## 思路图\n");
    if engine.mermaid_code.is_empty() {
        let _ = writeln!(out, "（无）");
    } else {
        let _ = writeln!(out, "```mermaid\n{}\n```", engine.mermaid_code);
    }

    let _ = writeln!(out, "\n## 命题分析\n");
    let _ = writeln!(out, "- 难度：{}", "★".repeat(engine.difficulty as usize));
    let _ = writeln!(out, "- 命题意图：{}", engine.examiner_intent);
    let _ = writeln!(out, "- 掌握建议：{}", analysis.mastery_level);

    if let Some(variation) = &analysis.variation_question {
        section(&mut out, "变式练习", variation);
    }

    out
}

fn section(out: &mut String, heading: &str, body: &str) {
    let _ = writeln!(out, "\n## {}\n", heading);
    let _ = writeln!(out, "{}", body);
}

fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}
