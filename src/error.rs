use thiserror::Error;

/// 错题本各层统一的错误类型
///
/// 字段级别的问题由 normalizer 就地修复，不会出现在这里；
/// 只有结构性失败才会向上传播。
#[derive(Debug, Error)]
pub enum NotebookError {
    /// 存储介质故障（不可用、空间不足、索引或行数据损坏）
    #[error("存储失败: {0}")]
    StorageFault(String),

    /// 顶层数据（导入文件、AI 响应）无法解析为结构化数据
    #[error("数据格式错误: {0}")]
    MalformedPayload(String),

    /// AI 没有返回任何可用的题目分析
    #[error("AI 未识别出可用的题目，请重试或补充提示")]
    EmptyAnalysis,

    /// 远程分析服务本身失败（网络、配额、超时）
    #[error("AI 分析失败: {0}")]
    AnalysisFailure(String),
}

pub type Result<T> = std::result::Result<T, NotebookError>;

impl From<sqlx::Error> for NotebookError {
    fn from(e: sqlx::Error) -> Self {
        NotebookError::StorageFault(e.to_string())
    }
}

impl From<std::io::Error> for NotebookError {
    fn from(e: std::io::Error) -> Self {
        NotebookError::StorageFault(e.to_string())
    }
}

impl From<csv::Error> for NotebookError {
    fn from(e: csv::Error) -> Self {
        NotebookError::StorageFault(e.to_string())
    }
}

// 只在写入路径上出现：序列化自有类型失败视为存储故障
impl From<serde_json::Error> for NotebookError {
    fn from(e: serde_json::Error) -> Self {
        NotebookError::StorageFault(format!("序列化失败: {}", e))
    }
}

impl NotebookError {
    /// 是否属于“提示用户重试”的软性错误
    pub fn is_advisory(&self) -> bool {
        matches!(self, NotebookError::EmptyAnalysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_analysis_is_advisory() {
        assert!(NotebookError::EmptyAnalysis.is_advisory());
        assert!(!NotebookError::MalformedPayload("x".into()).is_advisory());
    }

    #[test]
    fn io_errors_become_storage_faults() {
        let err: NotebookError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        match err {
            NotebookError::StorageFault(msg) => assert!(msg.contains("disk full")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
