// ==========================================
// 绝缘工器具试验报告系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供宿主程序（命令行）调用
// ==========================================

pub mod error;
pub mod report_api;
pub mod tool_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use report_api::ReportApi;
pub use tool_api::{ImportSummary, ToolApi};
