// ==========================================
// 绝缘工器具试验报告系统 - 领域层
// ==========================================
// 职责: 单元格值、试验记录、试验批次
// ==========================================

pub mod batch;
pub mod cell;
pub mod record;

pub use batch::{Batch, BatchKey, BatchSummary, REPORT_NAME_SUFFIX};
pub use cell::{CellValue, DATE_FORMAT};
pub use record::{columns, Record, ToolTable};
