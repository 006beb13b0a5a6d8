// ==========================================
// 绝缘工器具试验报告系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，把导入/仓储/报告引擎的错误
//       转换为面向用户的错误消息
// 约束: 涉及批次时，错误消息必须带批次标识
// ==========================================

use crate::domain::BatchKey;
use crate::engine::error::{RenderError, ReportError};
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 导入导出错误
    // ==========================================
    #[error("文件导入失败: {0}")]
    ImportError(String),

    // ==========================================
    // 报告生成错误
    // ==========================================
    #[error("数据列缺失: {0}")]
    SchemaError(String),

    #[error("模板不存在: {0}")]
    TemplateNotFound(String),

    #[error("批次为空: {0}")]
    EmptyBatch(String),

    #[error("报告渲染失败: {0}")]
    RenderError(String),

    #[error("文件读写失败: {0}")]
    IoError(String),

    #[error("批次不存在: {0}")]
    BatchNotFound(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("未选择任何行")]
    NoSelection,

    #[error("数据库错误: {0}")]
    DatabaseError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 带批次标识转换报告引擎错误
    pub fn for_batch(key: &BatchKey, err: ReportError) -> Self {
        let batch = key.display_name();
        match ApiError::from(err) {
            ApiError::TemplateNotFound(msg) => {
                ApiError::TemplateNotFound(format!("[{}] {}", batch, msg))
            }
            ApiError::SchemaError(msg) => ApiError::SchemaError(format!("[{}] {}", batch, msg)),
            ApiError::RenderError(msg) => ApiError::RenderError(format!("[{}] {}", batch, msg)),
            ApiError::IoError(msg) => ApiError::IoError(format!("[{}] {}", batch, msg)),
            other => other,
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::TableNotFound { table } => {
                ApiError::NotFound(format!("数据表 {} 不存在，请先导入数据", table))
            }
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::NoSelection => ApiError::NoSelection,
            RepositoryError::UnknownColumn(column) => {
                ApiError::InvalidInput(format!("列 {} 不存在", column))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseError(format!("事务失败，未保存的修改已保留: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::ValidationError(msg) => ApiError::InvalidInput(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Other(err) => ApiError::Other(err),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

// ==========================================
// 从 ReportError 转换（不带批次标识）
// ==========================================
impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::Schema { .. } => ApiError::SchemaError(err.to_string()),
            ReportError::TemplateNotFound { .. } => ApiError::TemplateNotFound(err.to_string()),
            ReportError::EmptyBatch { key } => ApiError::EmptyBatch(key),
            ReportError::Render(e) => ApiError::from(e),
            ReportError::Io { .. } | ReportError::OutputConflict { .. } => {
                ApiError::IoError(err.to_string())
            }
        }
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        ApiError::RenderError(err.to_string())
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_batch_context_in_message() {
        let key = BatchKey::new("甲公司", "绝缘手套", "2024-05-01");
        let err = ApiError::for_batch(
            &key,
            ReportError::TemplateNotFound {
                sample_name: "绝缘手套".to_string(),
                path: PathBuf::from("templates/绝缘手套.docx"),
            },
        );
        assert!(matches!(err, ApiError::TemplateNotFound(_)));
        assert!(err.to_string().contains("甲公司_绝缘手套_2024-05-01"));
    }

    #[test]
    fn test_repository_conversion() {
        assert!(matches!(
            ApiError::from(RepositoryError::NoSelection),
            ApiError::NoSelection
        ));
        assert!(matches!(
            ApiError::from(RepositoryError::TableNotFound {
                table: "tools".to_string()
            }),
            ApiError::NotFound(_)
        ));
    }

    #[test]
    fn test_sqlite_failure_is_database_error() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(19),
            Some("UNIQUE constraint failed: tools.x".to_string()),
        );
        let api = ApiError::from(RepositoryError::from(err));
        assert!(matches!(api, ApiError::DatabaseError(_)));
        assert!(api.to_string().contains("UNIQUE constraint failed"));
    }

    #[test]
    fn test_output_conflict_is_io_error() {
        let key = BatchKey::new("甲", "绝缘手套", "2024-05-01");
        let err = ApiError::for_batch(
            &key,
            ReportError::OutputConflict {
                path: PathBuf::from("reports/甲_绝缘手套_2024-05-01试验报告.docx"),
                first: "甲_绝缘手套_2024-05-01".to_string(),
                second: "甲_绝缘手套_2024-05-01".to_string(),
            },
        );
        assert!(matches!(err, ApiError::IoError(_)));
    }

    #[test]
    fn test_empty_batch_keeps_key() {
        let err = ApiError::from(ReportError::EmptyBatch {
            key: "甲_绝缘手套_2024-05-01".to_string(),
        });
        assert_eq!(err.to_string(), "批次为空: 甲_绝缘手套_2024-05-01");
    }
}
