// ==========================================
// 绝缘工器具试验报告系统 - 报告引擎层
// ==========================================
// 流程: 记录 → 批次划分 → 模板定位 → 上下文绑定 → 渲染 → 保存
// ==========================================
// 职责: 实现批次与报告规则,不拼 SQL
// 红线: Engine 只读记录,不访问待提交变更
// ==========================================

pub mod binder;
pub mod error;
pub mod list_literal;
pub mod partitioner;
pub mod renderer;
pub mod report_generator;

// 重导出核心引擎
pub use binder::{save_document, ListColumns, RenderContext, ReportBinder, ROWS_KEY};
pub use error::{RenderError, ReportError, ReportResult};
pub use list_literal::{parse_list_literal, try_parse_list};
pub use partitioner::{batch_key_of, BatchPartitioner};
pub use renderer::{DocxTemplateRenderer, TemplateRenderer};
pub use report_generator::{
    BatchFailure, BulkGenerationSummary, GeneratedReport, GenerationProgress, ReportGenerator,
    ReportStage,
};
