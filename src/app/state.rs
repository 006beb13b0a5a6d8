// ==========================================
// 绝缘工器具试验报告系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// 约束: 全部组件共享同一个数据库连接，不使用全局变量
// ==========================================

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::api::{ReportApi, ToolApi};
use crate::config::config_manager::ConfigManager;
use crate::db::open_sqlite_connection;
use crate::engine::{DocxTemplateRenderer, TemplateRenderer};
use crate::repository::ToolRecordRepository;

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "INSULATING_TOOL_REPORT_DB_PATH";

/// 数据库文件名
const DB_FILE_NAME: &str = "my_database.db";

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 试验记录仓储
    pub tool_repo: Arc<ToolRecordRepository>,

    /// 配置管理器
    pub config: Arc<ConfigManager>,

    /// 数据API
    pub tool_api: Arc<ToolApi>,

    /// 报告API
    pub report_api: Arc<ReportApi>,
}

impl AppState {
    /// 创建新的AppState实例（使用 docx 模板渲染器）
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_renderer(db_path, Arc::new(DocxTemplateRenderer::new()))
    }

    /// 指定模板渲染器创建AppState
    pub fn with_renderer(
        db_path: String,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        let tool_repo = Arc::new(ToolRecordRepository::from_connection(conn.clone()));
        let config = Arc::new(
            ConfigManager::from_connection(conn)
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        let tool_api = Arc::new(ToolApi::new(tool_repo.clone()));
        let report_api = Arc::new(ReportApi::new(
            tool_repo.clone(),
            config.clone(),
            renderer,
        ));

        tracing::info!("AppState初始化完成");
        Ok(Self {
            db_path,
            tool_repo,
            config,
            tool_api,
            report_api,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 INSULATING_TOOL_REPORT_DB_PATH
/// → 用户数据目录/insulating-tool-report/my_database.db
/// → ./my_database.db
pub fn get_default_db_path() -> String {
    // 允许通过环境变量显式指定 DB 路径（便于调试/测试）
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from(".").join(DB_FILE_NAME);

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("insulating-tool-report");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join(DB_FILE_NAME);
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_app_state_shares_one_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db").to_string_lossy().to_string();
        let state = AppState::new(db_path.clone()).unwrap();

        assert_eq!(state.db_path, db_path);
        assert!(!state.tool_api.table_exists().unwrap());
        state.config.set_value("report.output_dir", "out").unwrap();

        // 同一文件重新打开可见配置
        let reopened = AppState::new(db_path).unwrap();
        assert_eq!(
            reopened.config.load_report_settings().unwrap().output_dir,
            PathBuf::from("out")
        );
    }
}
