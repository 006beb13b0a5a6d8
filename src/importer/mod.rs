// ==========================================
// 绝缘工器具试验报告系统 - 导入导出层
// ==========================================
// 职责: 外部表格文件 ↔ ToolTable
// 支持: Excel, CSV
// ==========================================

pub mod error;
pub mod exporter;
pub mod file_parser;

pub use error::{ImportError, ImportResult};
pub use exporter::export_table;
pub use file_parser::{normalize_headers, CsvParser, ExcelParser, FileParser, UniversalFileParser};
