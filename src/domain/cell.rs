// ==========================================
// 绝缘工器具试验报告系统 - 单元格值
// ==========================================
// 职责: 动态列数据的值类型（文本/数值/日期/列表）
// 约束: 相等性为精确比较，不做任何规范化
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// 日期的存储与展示格式
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ==========================================
// CellValue - 单元格值
// ==========================================
/// 一个单元格的值
///
/// `List` 仅由列表字面量解析产生（见 `engine::list_literal`），
/// 导入与存储层只会产生前四种。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    List(Vec<CellValue>),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// 整数值（数值且无小数部分）
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 => {
                Some(*n as i64)
            }
            _ => None,
        }
    }

    /// 转换为模板渲染上下文使用的 JSON 值
    ///
    /// - Empty → null
    /// - 整数值 → JSON 整数（避免 "1.0" 出现在报告中）
    /// - 非有限数值 → null
    /// - 日期 → "YYYY-MM-DD"
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            CellValue::Empty => Value::Null,
            CellValue::Text(s) => Value::String(s.clone()),
            CellValue::Number(n) => match self.as_integer() {
                Some(i) => Value::from(i),
                None => serde_json::Number::from_f64(*n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            },
            CellValue::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
            CellValue::List(items) => Value::Array(items.iter().map(CellValue::to_json).collect()),
        }
    }

    /// 列表的字面量文本（写回存储/导出时使用）
    fn write_literal(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => write!(f, "None"),
            CellValue::Text(s) => {
                write!(f, "'")?;
                for ch in s.chars() {
                    match ch {
                        '\'' => write!(f, "\\'")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        _ => write!(f, "{}", ch)?,
                    }
                }
                write!(f, "'")
            }
            CellValue::Date(d) => write!(f, "'{}'", d.format(DATE_FORMAT)),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Number(n) => match self.as_integer() {
                Some(i) => write!(f, "{}", i),
                None => write!(f, "{}", n),
            },
            CellValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            CellValue::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    item.write_literal(f)?;
                }
                write!(f, "]")
            }
        }
    }
}

// 数值按位比较：批次键要求精确匹配，NaN 也需要能作为分组键
impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CellValue::Empty, CellValue::Empty) => true,
            (CellValue::Text(a), CellValue::Text(b)) => a == b,
            (CellValue::Number(a), CellValue::Number(b)) => a.to_bits() == b.to_bits(),
            (CellValue::Date(a), CellValue::Date(b)) => a == b,
            (CellValue::List(a), CellValue::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for CellValue {}

impl Hash for CellValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::Empty => {}
            CellValue::Text(s) => s.hash(state),
            CellValue::Number(n) => n.to_bits().hash(state),
            CellValue::Date(d) => d.hash(state),
            CellValue::List(items) => items.hash(state),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(d: NaiveDate) -> Self {
        CellValue::Date(d)
    }
}
