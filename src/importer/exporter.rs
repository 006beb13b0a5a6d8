// ==========================================
// 绝缘工器具试验报告系统 - 数据导出
// ==========================================
// 职责: 将当前数据表写出为 .xlsx / .csv
// ==========================================

use crate::domain::{CellValue, ToolTable};
use crate::importer::error::{ImportError, ImportResult};
use rust_xlsxwriter::{Format, Workbook};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// 导出工作表名
pub const EXPORT_SHEET_NAME: &str = "tools";

/// 按扩展名导出数据表
pub fn export_table<P: AsRef<Path>>(table: &ToolTable, file_path: P) -> ImportResult<()> {
    let path = file_path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ImportError::FileWriteError(format!("{}: {}", parent.display(), e)))?;
    }

    match ext.as_str() {
        "xlsx" => export_xlsx(table, path)?,
        "csv" => export_csv(table, path)?,
        other => return Err(ImportError::UnsupportedFormat(other.to_string())),
    }

    info!(
        path = %path.display(),
        rows = table.row_count(),
        columns = table.columns.len(),
        "数据导出完成"
    );
    Ok(())
}

fn export_xlsx(table: &ToolTable, path: &Path) -> ImportResult<()> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(EXPORT_SHEET_NAME)?;

    for (col_idx, column) in table.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col_index(col_idx)?, column, &header_format)?;
    }

    for (row_idx, record) in table.rows.iter().enumerate() {
        let row = u32::try_from(row_idx + 1)
            .map_err(|_| ImportError::XlsxWriteError(format!("行数超出范围: {}", row_idx + 1)))?;
        for (col_idx, column) in table.columns.iter().enumerate() {
            let col = col_index(col_idx)?;
            match record.get(column) {
                None | Some(CellValue::Empty) => {}
                Some(CellValue::Number(n)) => {
                    worksheet.write_number(row, col, *n)?;
                }
                Some(CellValue::Date(d)) => {
                    worksheet.write_datetime_with_format(row, col, d, &date_format)?;
                }
                Some(other) => {
                    worksheet.write_string(row, col, other.to_string())?;
                }
            }
        }
    }

    workbook
        .save(path)
        .map_err(|e| ImportError::FileWriteError(format!("{}: {}", path.display(), e)))?;
    Ok(())
}

fn col_index(idx: usize) -> ImportResult<u16> {
    u16::try_from(idx).map_err(|_| ImportError::XlsxWriteError(format!("列数超出范围: {}", idx)))
}

fn export_csv(table: &ToolTable, path: &Path) -> ImportResult<()> {
    let write_err = |e: std::io::Error| ImportError::FileWriteError(format!("{}: {}", path.display(), e));

    let mut file = std::fs::File::create(path).map_err(write_err)?;
    // UTF-8 BOM：Excel 直接打开时中文不乱码
    file.write_all(b"\xEF\xBB\xBF").map_err(write_err)?;

    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(&table.columns)
        .map_err(|e| ImportError::FileWriteError(e.to_string()))?;
    for record in &table.rows {
        let fields: Vec<String> = table
            .columns
            .iter()
            .map(|c| record.get(c).map(|v| v.to_string()).unwrap_or_default())
            .collect();
        writer
            .write_record(&fields)
            .map_err(|e| ImportError::FileWriteError(e.to_string()))?;
    }
    writer.flush().map_err(write_err)?;
    Ok(())
}
