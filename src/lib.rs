// ==========================================
// 绝缘工器具试验报告系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 功能: 表格数据导入 → 本地数据库 → 按批次生成 Word 试验报告
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 记录、单元格值、批次
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 批次划分与报告生成
pub mod engine;

// 导入导出层 - 外部表格文件
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 共享状态与视图刷新
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{Batch, BatchKey, BatchSummary, CellValue, Record, ToolTable};

// 引擎
pub use engine::{
    BatchPartitioner, BulkGenerationSummary, DocxTemplateRenderer, RenderContext, ReportBinder,
    ReportGenerator, TemplateRenderer,
};

// 仓储
pub use repository::{RowRef, ToolRecordRepository};

// API
pub use api::{ApiError, ApiResult, ReportApi, ToolApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "绝缘工器具试验报告系统";
