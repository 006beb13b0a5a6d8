// ==========================================
// 绝缘工器具试验报告系统 - 试验记录
// ==========================================
// 职责: 动态列的行记录与带列序的数据表
// 说明: 列由导入文件决定，只有批次键三列是结构性必需列
// ==========================================

use crate::domain::cell::CellValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// 列名常量
// ==========================================
pub mod columns {
    /// 委托单位（批次键）
    pub const CLIENT: &str = "委托单位";
    /// 样品名称（批次键，同时作为模板键）
    pub const SAMPLE_NAME: &str = "样品名称";
    /// 接收日期（批次键）
    pub const RECEIVE_DATE: &str = "接收日期";
    /// 报告中合成的序号列（1 起始）
    pub const SEQUENCE: &str = "序号";

    /// 批次键的三列，顺序即键的顺序
    pub const BATCH_KEY_COLUMNS: [&str; 3] = [CLIENT, SAMPLE_NAME, RECEIVE_DATE];

    /// 存储层内部行号列，不出现在记录中，导入表头与之重名时会被改名
    pub const ROW_ID: &str = "__row_id";
}

// ==========================================
// Record - 一行试验记录
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, CellValue>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按列名创建全空记录
    pub fn blank<S: AsRef<str>>(columns: &[S]) -> Self {
        columns
            .iter()
            .map(|c| (c.as_ref().to_string(), CellValue::Empty))
            .collect()
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.0.get(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: CellValue) -> Option<CellValue> {
        self.0.insert(column.into(), value)
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CellValue)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut CellValue)> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 所有单元格均为空（导入时跳过此类行）
    pub fn is_blank(&self) -> bool {
        self.0.values().all(CellValue::is_empty)
    }
}

impl FromIterator<(String, CellValue)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, CellValue)>>(iter: T) -> Self {
        Record(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, CellValue); N]> for Record {
    fn from(cells: [(&str, CellValue); N]) -> Self {
        cells
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

impl IntoIterator for Record {
    type Item = (String, CellValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, CellValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ==========================================
// ToolTable - 带列序的数据表
// ==========================================
/// 一次导入或一次全表读取的结果
///
/// `columns` 保留表头顺序（导出、预览使用），每条记录的列集合与 `columns` 一致。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolTable {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl ToolTable {
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 补齐缺失列为空值，去掉 `columns` 之外的列，使所有记录列集合一致
    pub fn normalized(mut self) -> Self {
        for row in &mut self.rows {
            let mut uniform = Record::new();
            for column in &self.columns {
                let value = row.get(column).cloned().unwrap_or_default();
                uniform.insert(column.clone(), value);
            }
            *row = uniform;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_record() {
        let record = Record::blank(&["委托单位", "样品名称"]);
        assert_eq!(record.len(), 2);
        assert!(record.is_blank());
        assert_eq!(record.get("委托单位"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_normalized_makes_uniform_columns() {
        let table = ToolTable::new(
            vec!["a".to_string(), "b".to_string()],
            vec![
                Record::from([("a", CellValue::text("1"))]),
                Record::from([
                    ("a", CellValue::text("2")),
                    ("b", CellValue::text("x")),
                    ("c", CellValue::text("extra")),
                ]),
            ],
        )
        .normalized();

        for row in &table.rows {
            assert_eq!(row.columns().collect::<Vec<_>>(), vec!["a", "b"]);
        }
        assert_eq!(table.rows[0].get("b"), Some(&CellValue::Empty));
    }
}
