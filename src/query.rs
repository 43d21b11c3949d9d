use crate::models::{QuestionRecord, Subject};

/// 浏览条件；科目由存储的索引过滤，其余条件在内存中过滤
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub subject: Option<Subject>,
    pub tag: Option<String>,
    pub search: Option<String>,
}

impl RecordQuery {
    pub fn matches(&self, record: &QuestionRecord) -> bool {
        if self.subject.is_some_and(|s| s != record.subject) {
            return false;
        }
        if let Some(tag) = self.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            if !record.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return matches_search(record, &term.to_lowercase());
        }
        true
    }
}

// 标题、题干、标签、知识点，不区分大小写
fn matches_search(record: &QuestionRecord, term: &str) -> bool {
    let knowledge = &record.analysis.knowledge_map;
    std::iter::once(record.title.as_str())
        .chain(std::iter::once(record.analysis.question_text.as_str()))
        .chain(record.tags.iter().map(String::as_str))
        .chain(std::iter::once(knowledge.primary_point.as_str()))
        .chain(knowledge.related_points.iter().map(String::as_str))
        .any(|field| field.to_lowercase().contains(term))
}

/// 最新的在前；时间相同时 id 大的在前
pub fn sort_newest_first(records: &mut [QuestionRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

pub fn apply(query: &RecordQuery, records: Vec<QuestionRecord>) -> Vec<QuestionRecord> {
    let mut matched: Vec<QuestionRecord> = records.into_iter().filter(|r| query.matches(r)).collect();
    sort_newest_first(&mut matched);
    matched
}
