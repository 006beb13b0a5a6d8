// ==========================================
// 绝缘工器具试验报告系统 - 文件解析器实现
// ==========================================
// 支持: Excel (.xlsx/.xlsm/.xls/.ods) / CSV (.csv)
// 输出: 带列序的 ToolTable，单元格保留类型（数值/日期/文本）
// ==========================================

use crate::domain::{columns, CellValue, Record, ToolTable, DATE_FORMAT};
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Data, DataType, Reader};
use chrono::Timelike;
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

// ==========================================
// FileParser Trait
// ==========================================
/// 文件解析接口：读取第一个工作表，表头行给出列名
pub trait FileParser: Send + Sync {
    fn parse_table(&self, file_path: &Path) -> ImportResult<ToolTable>;
}

/// 取小写扩展名
fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

/// 规范化表头
///
/// - 去除首尾空白（以及 UTF-8 BOM）
/// - 空表头命名为 `Unnamed: <列序号>`
/// - 重复表头依次追加 `.1`、`.2` …
/// - 与内部行号列重名时同样追加后缀
pub fn normalize_headers<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(columns::ROW_ID.to_string());

    let mut headers = Vec::new();
    for (idx, h) in raw.into_iter().enumerate() {
        let trimmed = h.as_ref().trim_start_matches('\u{feff}').trim();
        let base = if trimmed.is_empty() {
            format!("Unnamed: {}", idx)
        } else {
            trimmed.to_string()
        };

        let mut name = base.clone();
        let mut suffix = 1;
        while seen.contains(&name) {
            name = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        if name != base {
            warn!(column = %base, renamed = %name, "表头重复，已重命名");
        }
        seen.insert(name.clone());
        headers.push(name);
    }
    headers
}

/// 按表头组装一行；跳过全空行，超出表头的单元格忽略
fn assemble_row(headers: &[String], cells: impl Iterator<Item = CellValue>) -> Option<Record> {
    let mut record = Record::blank(headers);
    for (header, value) in headers.iter().zip(cells) {
        record.insert(header.clone(), value);
    }
    if record.is_blank() {
        None
    } else {
        Some(record)
    }
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_table(&self, file_path: &Path) -> ImportResult<ToolTable> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let file = File::open(file_path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let headers = normalize_headers(reader.headers()?.iter());
        if headers.is_empty() {
            return Err(ImportError::EmptySheet(file_path.display().to_string()));
        }

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let cells = record.iter().map(|raw| {
                let value = raw.trim();
                if value.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::text(value)
                }
            });
            if let Some(row) = assemble_row(&headers, cells) {
                rows.push(row);
            }
        }

        debug!(columns = headers.len(), rows = rows.len(), "CSV 解析完成");
        Ok(ToolTable::new(headers, rows))
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

/// Excel 单元格 → CellValue
///
/// 零点的日期时间视为日期；带时分秒的保留为文本，避免丢失信息。
fn convert_excel_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                CellValue::Empty
            } else {
                CellValue::text(trimmed)
            }
        }
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::text(if *b { "True" } else { "False" }),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
            Some(dt) if dt.time().num_seconds_from_midnight() == 0 => CellValue::Date(dt.date()),
            Some(dt) => CellValue::text(dt.format(&format!("{} %H:%M:%S", DATE_FORMAT)).to_string()),
            None => CellValue::text(cell.to_string()),
        },
        Data::DurationIso(s) => CellValue::text(s.clone()),
    }
}

impl FileParser for ExcelParser {
    fn parse_table(&self, file_path: &Path) -> ImportResult<ToolTable> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if !matches!(ext.as_str(), "xlsx" | "xlsm" | "xls" | "ods") {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut workbook = open_workbook_auto(file_path)?;

        // 读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;

        let range = workbook.worksheet_range(&sheet_name)?;

        // 提取表头（第一行）
        let mut sheet_rows = range.rows();
        let header_row = sheet_rows
            .next()
            .ok_or_else(|| ImportError::EmptySheet(sheet_name.clone()))?;
        let headers = normalize_headers(header_row.iter().map(|cell| cell.to_string()));

        let mut rows = Vec::new();
        for data_row in sheet_rows {
            if let Some(row) = assemble_row(&headers, data_row.iter().map(convert_excel_cell)) {
                rows.push(row);
            }
        }

        debug!(
            sheet = %sheet_name,
            columns = headers.len(),
            rows = rows.len(),
            "Excel 解析完成"
        );
        Ok(ToolTable::new(headers, rows))
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl UniversalFileParser {
    pub fn parse<P: AsRef<Path>>(&self, file_path: P) -> ImportResult<ToolTable> {
        self.parse_table(file_path.as_ref())
    }
}

impl FileParser for UniversalFileParser {
    fn parse_table(&self, file_path: &Path) -> ImportResult<ToolTable> {
        match extension_of(file_path).as_str() {
            "csv" => CsvParser.parse_table(file_path),
            "xlsx" | "xlsm" | "xls" | "ods" => ExcelParser.parse_table(file_path),
            other => {
                ensure_exists(file_path)?;
                Err(ImportError::UnsupportedFormat(other.to_string()))
            }
        }
    }
}
