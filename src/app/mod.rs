// ==========================================
// 绝缘工器具试验报告系统 - 应用层
// ==========================================
// 职责: 组装共享连接、仓储、配置与 API，供宿主程序使用
// ==========================================

pub mod refresh;
pub mod state;

// 重导出
pub use refresh::{RefreshReport, RefreshRegistry, Refreshable};
pub use state::{get_default_db_path, AppState, DB_PATH_ENV};
