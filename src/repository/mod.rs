// ==========================================
// 绝缘工器具试验报告系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 值一律参数化绑定；动态列名经 quote_ident 转义
// ==========================================

pub mod error;
pub mod tool_record_repo;

pub use error::{RepositoryError, RepositoryResult};
pub use tool_record_repo::{
    CommitSummary, RowRef, ToolRecordRepository, ViewRow, DEFAULT_TABLE_NAME,
};
