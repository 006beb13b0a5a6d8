// ==========================================
// 绝缘工器具试验报告系统 - 试验批次
// ==========================================
// 批次 = (委托单位, 样品名称, 接收日期) 相同的所有记录，对应一份报告
// ==========================================

use crate::domain::cell::CellValue;
use crate::domain::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 报告文件名后缀
pub const REPORT_NAME_SUFFIX: &str = "试验报告";

// ==========================================
// BatchKey - 批次键
// ==========================================
/// 批次标识；相等性为三个字段的精确比较
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchKey {
    pub client: CellValue,
    pub sample_name: CellValue,
    pub receive_date: CellValue,
}

impl BatchKey {
    pub fn new(
        client: impl Into<CellValue>,
        sample_name: impl Into<CellValue>,
        receive_date: impl Into<CellValue>,
    ) -> Self {
        Self {
            client: client.into(),
            sample_name: sample_name.into(),
            receive_date: receive_date.into(),
        }
    }

    /// 批次显示名: `<委托单位>_<样品名称>_<接收日期>`
    pub fn display_name(&self) -> String {
        format!("{}_{}_{}", self.client, self.sample_name, self.receive_date)
    }

    /// 报告文件名: `<委托单位>_<样品名称>_<接收日期>试验报告.<ext>`
    ///
    /// 路径分隔符及 Windows 文件名保留字符替换为 `_`，保证文件落在输出目录内。
    pub fn report_file_name(&self, ext: &str) -> String {
        let stem: String = format!("{}{}", self.display_name(), REPORT_NAME_SUFFIX)
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        format!("{}.{}", stem, ext.trim_start_matches('.'))
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.client, self.sample_name, self.receive_date
        )
    }
}

// ==========================================
// Batch - 试验批次
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub key: BatchKey,
    /// 按分组前的原始顺序排列
    pub rows: Vec<Record>,
}

impl Batch {
    pub fn new(key: BatchKey, rows: Vec<Record>) -> Self {
        Self { key, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 批次列表条目（供下拉框/命令行列表使用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub key: BatchKey,
    pub display_name: String,
    pub row_count: usize,
}

impl From<&Batch> for BatchSummary {
    fn from(batch: &Batch) -> Self {
        Self {
            key: batch.key.clone(),
            display_name: batch.key.display_name(),
            row_count: batch.len(),
        }
    }
}
