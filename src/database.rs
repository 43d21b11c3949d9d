use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{NotebookError, Result};
use crate::models::*;
use crate::normalizer;

/// 错题记录的存储接口
///
/// 应用内只持有一个实例，显式传给需要它的组件。
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 保存一条新记录，返回新分配的 id（记录自带的 id 会被忽略）
    async fn save(&self, record: &QuestionRecord) -> Result<i64>;

    /// 所有记录，不保证顺序
    async fn get_all(&self) -> Result<Vec<QuestionRecord>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<QuestionRecord>>;

    /// 按科目查询，走 subject 索引
    async fn get_by_subject(&self, subject: Subject) -> Result<Vec<QuestionRecord>>;

    /// 删除不存在的 id 不算错误
    async fn delete_by_id(&self, id: i64) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    /// 在一个事务里按输入顺序插入多条新记录；任何一条失败则全部不写入
    async fn save_batch(&self, records: &[QuestionRecord]) -> Result<Vec<i64>>;

    /// 导入备份中的记录，语义同 `save_batch`
    async fn import_many(&self, records: &[QuestionRecord]) -> Result<Vec<i64>>;
}

// 数据库中的一行
#[derive(Debug, sqlx::FromRow)]
struct QuestionRow {
    id: i64,
    subject: String,
    title: String,
    tags: String,
    image: String,
    analysis: String,
    created_at: i64,
}

impl QuestionRow {
    fn into_record(self) -> Result<QuestionRecord> {
        let subject = Subject::from_str(&self.subject)
            .map_err(|e| NotebookError::StorageFault(format!("记录 {} 数据损坏: {}", self.id, e)))?;
        let tags: Vec<String> = serde_json::from_str(&self.tags)
            .map_err(|e| NotebookError::StorageFault(format!("记录 {} 的标签数据损坏: {}", self.id, e)))?;
        let analysis = decode_analysis(self.id, &self.analysis)?;

        Ok(QuestionRecord {
            id: Some(self.id),
            subject,
            title: self.title,
            tags,
            image: self.image,
            analysis,
            created_at: self.created_at,
        })
    }
}

// 旧版本写入的分析可能不是规范形态，读出时再走一次规范化
fn decode_analysis(id: i64, raw: &str) -> Result<Analysis> {
    if let Ok(analysis) = serde_json::from_str::<Analysis>(raw) {
        return Ok(analysis);
    }
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| NotebookError::StorageFault(format!("记录 {} 的分析数据损坏: {}", id, e)))?;
    debug!("记录 {} 的分析为旧格式，读取时升级", id);
    // 无可用字段时与规范化的默认值一致
    Ok(normalizer::normalize_object(&value)
        .map(|n| n.analysis)
        .unwrap_or_default())
}

const SELECT_COLUMNS: &str = "SELECT id, subject, title, tags, image, analysis, created_at FROM questions";

/// 基于 SQLite 的记录存储
pub struct SqliteRecordStore {
    pool: SqlitePool,
    // 单写者：所有写操作串行执行
    write_lock: Mutex<()>,
}

impl SqliteRecordStore {
    pub async fn new(config: &Config) -> Result<Self> {
        let db_path = std::env::current_dir()?.join(&config.database.db_file);
        Self::open(&db_path).await
    }

    pub async fn open(db_path: &Path) -> Result<Self> {
        info!("💾 连接数据库: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = SqliteRecordStore {
            pool,
            write_lock: Mutex::new(()),
        };
        store.initialize_tables().await?;
        Ok(store)
    }

    async fn initialize_tables(&self) -> Result<()> {
        // AUTOINCREMENT 保证删除后的 id 不会被复用
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS questions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject TEXT NOT NULL,
                title TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                image TEXT NOT NULL,
                analysis TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_questions_subject ON questions(subject)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert(conn: &mut SqliteConnection, record: &QuestionRecord) -> Result<i64> {
        let tags = serde_json::to_string(&record.tags)?;
        let analysis = serde_json::to_string(&record.analysis)?;

        let result = sqlx::query(
            "INSERT INTO questions (subject, title, tags, image, analysis, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(record.subject.as_str())
        .bind(&record.title)
        .bind(&tags)
        .bind(&record.image)
        .bind(&analysis)
        .bind(record.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    // 调用方需持有写锁
    async fn insert_all(&self, records: &[QuestionRecord]) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            ids.push(Self::insert(&mut *tx, record).await?);
        }
        tx.commit().await?;
        Ok(ids)
    }

    fn decode_rows(rows: Vec<QuestionRow>) -> Result<Vec<QuestionRecord>> {
        rows.into_iter().map(QuestionRow::into_record).collect()
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn save(&self, record: &QuestionRecord) -> Result<i64> {
        let _guard = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        let id = Self::insert(&mut *conn, record).await?;
        debug!("  ➕ 新增错题: {} ({}) -> id {}", record.title, record.subject, id);
        Ok(id)
    }

    async fn get_all(&self) -> Result<Vec<QuestionRecord>> {
        let rows = sqlx::query_as::<_, QuestionRow>(SELECT_COLUMNS)
            .fetch_all(&self.pool)
            .await?;
        Self::decode_rows(rows)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<QuestionRecord>> {
        let row = sqlx::query_as::<_, QuestionRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(QuestionRow::into_record).transpose()
    }

    async fn get_by_subject(&self, subject: Subject) -> Result<Vec<QuestionRecord>> {
        let rows = sqlx::query_as::<_, QuestionRow>(&format!("{} WHERE subject = ?", SELECT_COLUMNS))
            .bind(subject.as_str())
            .fetch_all(&self.pool)
            .await?;
        Self::decode_rows(rows)
    }

    async fn delete_by_id(&self, id: i64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM questions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            debug!("删除的错题 id {} 不存在，忽略", id);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM questions").execute(&self.pool).await?;
        info!("🗑️ 已清空 {} 条错题", result.rows_affected());
        Ok(())
    }

    async fn save_batch(&self, records: &[QuestionRecord]) -> Result<Vec<i64>> {
        let _guard = self.write_lock.lock().await;
        let ids = self.insert_all(records).await?;
        debug!("  ➕ 新增 {} 条错题", ids.len());
        Ok(ids)
    }

    async fn import_many(&self, records: &[QuestionRecord]) -> Result<Vec<i64>> {
        let _guard = self.write_lock.lock().await;
        let ids = self.insert_all(records).await?;
        info!("📥 导入 {} 条错题", ids.len());
        Ok(ids)
    }
}
