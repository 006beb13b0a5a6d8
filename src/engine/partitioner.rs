// ==========================================
// 绝缘工器具试验报告系统 - 批次划分
// ==========================================
// 规则: 委托单位 + 样品名称 + 接收日期 完全相同的记录为一个试验批次
// 顺序: 批次按首次出现顺序排列（稳定分组，不排序），批次内保持原行序
// ==========================================

use crate::domain::{columns, Batch, BatchKey, Record};
use crate::engine::error::{ReportError, ReportResult};
use std::collections::HashMap;
use tracing::debug;

/// 批次划分器（无状态）
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchPartitioner;

impl BatchPartitioner {
    pub fn new() -> Self {
        Self
    }

    /// 将记录划分为试验批次
    ///
    /// # 返回
    /// - Ok(Vec<Batch>): 按首次出现顺序排列的批次；空输入返回空列表
    /// - Err(Schema): 某行缺少必需列（报告全部缺失列及首个出错行号）
    pub fn partition<I>(&self, rows: I) -> ReportResult<Vec<Batch>>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut batches: Vec<Batch> = Vec::new();
        let mut index: HashMap<BatchKey, usize> = HashMap::new();

        for (idx, record) in rows.into_iter().enumerate() {
            let key = batch_key_of(&record, idx + 1)?;
            match index.get(&key) {
                Some(&pos) => batches[pos].rows.push(record),
                None => {
                    index.insert(key.clone(), batches.len());
                    batches.push(Batch::new(key, vec![record]));
                }
            }
        }

        debug!(batches = batches.len(), "批次划分完成");
        Ok(batches)
    }
}

/// 取一行的批次键
///
/// `row_number` 为 1 起始的行号，仅用于错误信息。
pub fn batch_key_of(record: &Record, row_number: usize) -> ReportResult<BatchKey> {
    let missing: Vec<String> = columns::BATCH_KEY_COLUMNS
        .iter()
        .filter(|c| !record.contains_column(c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ReportError::Schema {
            missing,
            row: row_number,
        });
    }

    let cell = |c: &str| record.get(c).cloned().unwrap_or_default();
    Ok(BatchKey {
        client: cell(columns::CLIENT),
        sample_name: cell(columns::SAMPLE_NAME),
        receive_date: cell(columns::RECEIVE_DATE),
    })
}
