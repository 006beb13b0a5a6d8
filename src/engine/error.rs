// ==========================================
// 绝缘工器具试验报告系统 - 报告引擎错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use std::path::PathBuf;
use thiserror::Error;

/// 模板渲染错误（渲染器自身的失败）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("模板读取失败 ({}): {message}", .path.display())]
    TemplateRead { path: PathBuf, message: String },

    #[error("模板文件损坏 ({}): {message}", .path.display())]
    CorruptTemplate { path: PathBuf, message: String },

    #[error("模板字段缺失: {field}")]
    MissingField { field: String },

    #[error("渲染失败: {0}")]
    Engine(String),
}

impl From<zip::result::ZipError> for RenderError {
    fn from(err: zip::result::ZipError) -> Self {
        RenderError::Engine(err.to_string())
    }
}

/// 报告引擎错误类型
#[derive(Error, Debug)]
pub enum ReportError {
    /// 批次划分时缺少必需列
    #[error("缺少必需列 (第 {row} 行): {}", .missing.join("、"))]
    Schema { missing: Vec<String>, row: usize },

    #[error("模板文件 {} 不存在", .path.display())]
    TemplateNotFound { sample_name: String, path: PathBuf },

    #[error("批次 {key} 没有任何记录")]
    EmptyBatch { key: String },

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("文件写入失败 ({}): {message}", .path.display())]
    Io { path: PathBuf, message: String },

    /// 同一次批量生成中，两个不同批次的报告文件名相同
    #[error("报告文件 {} 已由批次 {first} 生成，批次 {second} 未写入", .path.display())]
    OutputConflict {
        path: PathBuf,
        first: String,
        second: String,
    },
}

/// Result 类型别名
pub type ReportResult<T> = Result<T, ReportError>;
