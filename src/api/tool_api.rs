// ==========================================
// 绝缘工器具数据API
// ==========================================
// 职责: 导入/导出、表格预览、行编辑与保存/撤销
// 约束: 编辑先进入待提交变更，save_changes 才落库
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::{CellValue, ToolTable};
use crate::importer::{export_table, UniversalFileParser};
use crate::repository::{CommitSummary, RowRef, ToolRecordRepository, ViewRow};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// 导入结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    /// 源文件路径
    pub source: String,
    pub row_count: usize,
    pub columns: Vec<String>,
    /// 导入耗时（毫秒）
    pub elapsed_ms: u64,
}

/// 绝缘工器具数据API
pub struct ToolApi {
    repo: Arc<ToolRecordRepository>,
    parser: UniversalFileParser,
}

impl ToolApi {
    pub fn new(repo: Arc<ToolRecordRepository>) -> Self {
        Self {
            repo,
            parser: UniversalFileParser,
        }
    }

    /// 导入表格文件，整表替换现有数据
    ///
    /// 解析失败时数据库保持不变。
    #[instrument(skip(self, file_path), fields(file = %file_path.as_ref().display()))]
    pub fn import_file<P: AsRef<Path>>(&self, file_path: P) -> ApiResult<ImportSummary> {
        let start = Instant::now();
        let file_path = file_path.as_ref();

        let table = self.parser.parse(file_path)?;
        let row_count = self.repo.load_replace(&table)?;

        let summary = ImportSummary {
            source: file_path.display().to_string(),
            row_count,
            columns: table.columns,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            rows = summary.row_count,
            columns = summary.columns.len(),
            elapsed_ms = summary.elapsed_ms,
            "数据导入完成"
        );
        Ok(summary)
    }

    /// 导出已提交的数据（.xlsx / .csv）
    pub fn export_file<P: AsRef<Path>>(&self, file_path: P) -> ApiResult<usize> {
        let table = self.repo.read_all()?;
        export_table(&table, file_path.as_ref())?;
        info!(
            rows = table.row_count(),
            file = %file_path.as_ref().display(),
            "数据导出完成"
        );
        Ok(table.row_count())
    }

    pub fn table_exists(&self) -> ApiResult<bool> {
        Ok(self.repo.exists()?)
    }

    /// 读取已提交的全部数据
    pub fn read_table(&self) -> ApiResult<ToolTable> {
        Ok(self.repo.read_all()?)
    }

    /// 读取包含待提交变更的视图
    pub fn read_view(&self) -> ApiResult<Vec<ViewRow>> {
        Ok(self.repo.read_view()?)
    }

    pub fn column_names(&self) -> ApiResult<Vec<String>> {
        Ok(self.repo.column_names()?)
    }

    pub fn add_row(&self) -> ApiResult<RowRef> {
        Ok(self.repo.insert_blank_row()?)
    }

    pub fn delete_row(&self, row_ref: Option<RowRef>) -> ApiResult<()> {
        Ok(self.repo.delete_row(row_ref)?)
    }

    pub fn update_cell(&self, row_ref: RowRef, column: &str, value: CellValue) -> ApiResult<()> {
        if column.trim().is_empty() {
            return Err(ApiError::InvalidInput("列名不能为空".to_string()));
        }
        Ok(self.repo.update_cell(row_ref, column, value)?)
    }

    pub fn has_unsaved_changes(&self) -> ApiResult<bool> {
        Ok(self.repo.has_pending()?)
    }

    /// 保存全部待提交变更（单事务）
    pub fn save_changes(&self) -> ApiResult<CommitSummary> {
        let summary = self.repo.commit()?;
        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            "修改已保存"
        );
        Ok(summary)
    }

    /// 撤销全部待提交变更
    pub fn revert_changes(&self) -> ApiResult<()> {
        self.repo.discard_pending()?;
        info!("未保存的修改已撤销");
        Ok(())
    }
}
