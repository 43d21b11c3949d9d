//! 备份导出与导入
//!
//! 导出文件是带版本号的 JSON 信封；导入同时接受信封和旧版的纯数组。
//! 导入时丢弃原 id，逐条作为新记录插入，格式不对的条目跳过并报告。

use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::database::RecordStore;
use crate::error::{NotebookError, Result};
use crate::models::*;
use crate::normalizer;

pub const BACKUP_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFile {
    pub app: String,
    pub version: u32,
    pub exported_at: String,
    pub records: Vec<QuestionRecord>,
}

/// `<app>_backup_<YYYY-MM-DD>.json`
pub fn backup_file_name(app_name: &str, date: NaiveDate) -> String {
    format!("{}_backup_{}.json", app_name, date.format("%Y-%m-%d"))
}

/// 把整个存储序列化为备份文本，按 id 升序
pub async fn export_json<S: RecordStore + ?Sized>(store: &S, app_name: &str) -> Result<String> {
    let mut records = store.get_all().await?;
    records.sort_by_key(|r| r.id);

    let backup = BackupFile {
        app: app_name.to_string(),
        version: BACKUP_VERSION,
        exported_at: Utc::now().to_rfc3339(),
        records,
    };
    Ok(serde_json::to_string_pretty(&backup)?)
}

pub async fn export_to_dir<S: RecordStore + ?Sized>(store: &S, dir: &Path, app_name: &str) -> Result<PathBuf> {
    let text = export_json(store, app_name).await?;
    std::fs::create_dir_all(dir)?;
    let path = dir.join(backup_file_name(app_name, Local::now().date_naive()));
    std::fs::write(&path, text)?;
    info!("✅ 备份已导出：{}", path.display());
    Ok(path)
}

/// 解析备份文本，返回待导入的条目
pub fn parse_backup(text: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| NotebookError::MalformedPayload(format!("备份文件无法解析: {}", e)))?;

    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => {
            let version = obj.get("version").and_then(Value::as_u64).unwrap_or(1);
            if version > BACKUP_VERSION as u64 {
                return Err(NotebookError::MalformedPayload(format!(
                    "不支持的备份版本 {}（当前支持 {}）",
                    version, BACKUP_VERSION
                )));
            }
            match obj.remove("records") {
                Some(Value::Array(items)) => Ok(items),
                _ => Err(NotebookError::MalformedPayload("备份文件缺少 records 数组".to_string())),
            }
        }
        _ => Err(NotebookError::MalformedPayload("备份文件不是记录数组".to_string())),
    }
}

/// 把一个导入条目转成待保存的记录；失败时返回跳过原因
pub fn record_from_value(value: &Value, now: i64) -> std::result::Result<QuestionRecord, String> {
    let obj = value.as_object().ok_or("条目不是对象")?;

    let subject = obj
        .get("subject")
        .and_then(Value::as_str)
        .ok_or("缺少科目")?
        .parse::<Subject>()?;

    let image = obj
        .get("image")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or("缺少图片")?
        .to_string();

    let normalized = obj
        .get("analysis")
        .and_then(normalizer::normalize_object)
        .ok_or("缺少分析内容")?;

    let created_at = obj
        .get("createdAt")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)).or_else(|| v.as_str()?.trim().parse().ok()))
        .unwrap_or(now);

    let tags = match obj.get("tags").and_then(Value::as_array) {
        Some(items) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        None => normalized.analysis.tags.clone(),
    };

    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or(normalized.title);

    Ok(QuestionRecord {
        id: None,
        subject,
        title,
        tags,
        image,
        analysis: normalized.analysis,
        created_at,
    })
}

/// 导入备份文本：合法条目按原顺序插入，其余跳过
pub async fn import_json<S: RecordStore + ?Sized>(store: &S, text: &str) -> Result<ImportReport> {
    let items = parse_backup(text)?;
    let now = Utc::now().timestamp_millis();

    let mut report = ImportReport::default();
    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match record_from_value(item, now) {
            Ok(record) => records.push(record),
            Err(reason) => {
                warn!("⚠️ 跳过第 {} 条：{}", index + 1, reason);
                report.skipped.push(SkippedEntry { index, reason });
            }
        }
    }

    report.imported = store.import_many(&records).await?;
    info!(
        "📥 导入完成：成功 {} 条，跳过 {} 条",
        report.imported.len(),
        report.skipped.len()
    );
    Ok(report)
}

pub async fn import_file<S: RecordStore + ?Sized>(store: &S, path: &Path) -> Result<ImportReport> {
    let text = std::fs::read_to_string(path)?;
    import_json(store, &text).await
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: i64,
    subject: &'a str,
    title: &'a str,
    tags: String,
    category: &'a str,
    primary_point: &'a str,
    is_correct: bool,
    difficulty: u8,
    created_at: String,
}

/// 导出 CSV 摘要，便于在表格软件中复盘
pub fn export_csv(records: &[QuestionRecord], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        let analysis = &record.analysis;
        writer.serialize(CsvRow {
            id: record.id.unwrap_or_default(),
            subject: record.subject.display_name(),
            title: &record.title,
            tags: record.tags.join("|"),
            category: analysis.error_root.category.label(),
            primary_point: &analysis.knowledge_map.primary_point,
            is_correct: analysis.is_correct,
            difficulty: analysis.logic_engine.difficulty,
            created_at: chrono::DateTime::<Utc>::from_timestamp_millis(record.created_at)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        })?;
    }
    writer.flush()?;
    info!("✅ CSV 摘要已生成：{}", path.display());
    Ok(())
}
