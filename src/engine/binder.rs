// ==========================================
// 绝缘工器具试验报告系统 - 报告数据绑定
// ==========================================
// 职责:
// - 按样品名称定位模板: <模板目录>/<样品名称>.<扩展名>
// - 将一个批次展开为模板渲染上下文
//   rows: 每行一项，附加 1 起始的 序号 列，列表字面量单元格解析为列表
//   顶层: 第一行的全部字段（表头类字段如委托单位、样品名称）
// ==========================================

use crate::domain::{columns, Batch, BatchKey};
use crate::engine::error::{ReportError, ReportResult};
use crate::engine::list_literal::try_parse_list;
use crate::engine::renderer::TemplateRenderer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 上下文中行列表的键名
pub const ROWS_KEY: &str = "rows";

// ==========================================
// ListColumns - 列表解析范围
// ==========================================
/// 哪些列尝试做列表字面量解析
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListColumns {
    #[default]
    All,
    Only(Vec<String>),
}

impl ListColumns {
    /// 空列表表示全部列
    pub fn from_names(names: Vec<String>) -> Self {
        if names.is_empty() {
            ListColumns::All
        } else {
            ListColumns::Only(names)
        }
    }

    pub fn includes(&self, column: &str) -> bool {
        match self {
            ListColumns::All => true,
            ListColumns::Only(names) => names.iter().any(|n| n == column),
        }
    }
}

// ==========================================
// RenderContext - 渲染上下文
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderContext(Map<String, Value>);

impl RenderContext {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// 行列表
    pub fn rows(&self) -> &[Value] {
        self.0
            .get(ROWS_KEY)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for RenderContext {
    fn from(map: Map<String, Value>) -> Self {
        RenderContext(map)
    }
}

// ==========================================
// ReportBinder - 报告数据绑定器
// ==========================================
#[derive(Debug, Clone)]
pub struct ReportBinder {
    templates_dir: PathBuf,
    template_ext: String,
    list_columns: ListColumns,
}

impl ReportBinder {
    pub fn new(templates_dir: impl Into<PathBuf>, template_ext: impl Into<String>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
            template_ext: template_ext.into().trim_start_matches('.').to_string(),
            list_columns: ListColumns::All,
        }
    }

    pub fn with_list_columns(mut self, list_columns: ListColumns) -> Self {
        self.list_columns = list_columns;
        self
    }

    pub fn template_ext(&self) -> &str {
        &self.template_ext
    }

    /// 按样品名称定位模板
    ///
    /// 直接拼接路径，不做模糊匹配，也没有兜底模板。
    /// 含路径分隔符的样品名称视为模板不存在，查找不会离开模板目录。
    pub fn resolve_template(&self, sample_name: &str) -> ReportResult<PathBuf> {
        let path = self
            .templates_dir
            .join(format!("{}.{}", sample_name, self.template_ext));
        let escapes = sample_name.chars().any(|c| c == '/' || c == '\\');
        if escapes || !path.is_file() {
            return Err(ReportError::TemplateNotFound {
                sample_name: sample_name.to_string(),
                path,
            });
        }
        Ok(path)
    }

    /// 按批次键的样品名称定位模板
    pub fn resolve_template_for(&self, key: &BatchKey) -> ReportResult<PathBuf> {
        self.resolve_template(&key.sample_name.to_string())
    }

    /// 将批次展开为渲染上下文
    ///
    /// 列表字面量解析失败的单元格保留原值，不会使绑定失败。
    pub fn bind(&self, batch: &Batch) -> ReportResult<RenderContext> {
        if batch.rows.is_empty() {
            return Err(ReportError::EmptyBatch {
                key: batch.key.display_name(),
            });
        }

        let bound_rows: Vec<Map<String, Value>> = batch
            .rows
            .iter()
            .enumerate()
            .map(|(idx, record)| {
                let mut row = Map::new();
                for (column, value) in record.iter() {
                    let value = if self.list_columns.includes(column) {
                        try_parse_list(value.clone())
                    } else {
                        value.clone()
                    };
                    row.insert(column.clone(), value.to_json());
                }
                row.insert(columns::SEQUENCE.to_string(), Value::from(idx as u64 + 1));
                row
            })
            .collect();

        let mut context = bound_rows[0].clone();
        if context.contains_key(ROWS_KEY) {
            warn!(
                batch = %batch.key.display_name(),
                "数据列名与保留键 rows 冲突，顶层 rows 使用行列表"
            );
        }
        context.insert(
            ROWS_KEY.to_string(),
            Value::Array(bound_rows.into_iter().map(Value::Object).collect()),
        );

        debug!(
            batch = %batch.key.display_name(),
            rows = batch.len(),
            "渲染上下文已生成"
        );
        Ok(RenderContext(context))
    }

    /// 渲染模板（不落盘）
    pub fn render(
        &self,
        renderer: &dyn TemplateRenderer,
        context: &RenderContext,
        template_path: &Path,
    ) -> ReportResult<Vec<u8>> {
        Ok(renderer.render(template_path, context)?)
    }

    /// 渲染并保存
    pub fn render_and_save(
        &self,
        renderer: &dyn TemplateRenderer,
        context: &RenderContext,
        template_path: &Path,
        output_path: &Path,
    ) -> ReportResult<()> {
        let document = self.render(renderer, context, template_path)?;
        save_document(&document, output_path)
    }
}

/// 保存生成的文档，输出目录不存在时自动创建
pub fn save_document(document: &[u8], output_path: &Path) -> ReportResult<()> {
    let io_err = |path: &Path, e: std::io::Error| ReportError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    if let Some(dir) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    std::fs::write(output_path, document).map_err(|e| io_err(output_path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CellValue, Record};
    use serde_json::json;
    use tempfile::tempdir;

    fn batch_of(n: usize) -> Batch {
        let key = BatchKey::new("甲公司", "绝缘手套", "2024-05-01");
        let rows = (0..n)
            .map(|i| {
                Record::from([
                    (columns::CLIENT, CellValue::text("甲公司")),
                    (columns::SAMPLE_NAME, CellValue::text("绝缘手套")),
                    (columns::RECEIVE_DATE, CellValue::text("2024-05-01")),
                    ("样品编号", CellValue::text(format!("S{}", i + 1))),
                    ("泄漏电流", CellValue::text("[1.1, 1.2]")),
                    ("备注", CellValue::text("[未完成")),
                ])
            })
            .collect();
        Batch::new(key, rows)
    }

    #[test]
    fn test_bind_sequence_numbers() {
        let binder = ReportBinder::new("templates", "docx");
        let context = binder.bind(&batch_of(3)).unwrap();

        let seq: Vec<_> = context.rows().iter().map(|r| r["序号"].clone()).collect();
        assert_eq!(seq, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(context.rows()[2]["样品编号"], json!("S3"));
    }

    #[test]
    fn test_bind_top_level_from_first_row() {
        let binder = ReportBinder::new("templates", "docx");
        let context = binder.bind(&batch_of(2)).unwrap();

        assert_eq!(context.get("委托单位"), Some(&json!("甲公司")));
        assert_eq!(context.get("样品编号"), Some(&json!("S1")));
        assert_eq!(context.get("序号"), Some(&json!(1)));
    }

    #[test]
    fn test_bind_parses_list_literals_best_effort() {
        let binder = ReportBinder::new("templates", "docx");
        let context = binder.bind(&batch_of(1)).unwrap();

        assert_eq!(context.rows()[0]["泄漏电流"], json!([1.1, 1.2]));
        assert_eq!(context.rows()[0]["备注"], json!("[未完成"));
    }

    #[test]
    fn test_bind_respects_list_column_selection() {
        let binder = ReportBinder::new("templates", "docx")
            .with_list_columns(ListColumns::Only(vec!["备注".to_string()]));
        let context = binder.bind(&batch_of(1)).unwrap();
        assert_eq!(context.rows()[0]["泄漏电流"], json!("[1.1, 1.2]"));
    }

    #[test]
    fn test_bind_empty_batch() {
        let binder = ReportBinder::new("templates", "docx");
        let empty = Batch::new(BatchKey::new("甲", "绝缘手套", "2024-05-01"), vec![]);
        assert!(matches!(
            binder.bind(&empty),
            Err(ReportError::EmptyBatch { .. })
        ));
    }

    #[test]
    fn test_resolve_template() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("绝缘手套.docx"), b"stub").unwrap();
        let binder = ReportBinder::new(dir.path(), ".docx");

        assert_eq!(
            binder.resolve_template("绝缘手套").unwrap(),
            dir.path().join("绝缘手套.docx")
        );
        assert!(matches!(
            binder.resolve_template("绝缘杆"),
            Err(ReportError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_template_stays_in_directory() {
        let dir = tempdir().unwrap();
        let templates = dir.path().join("templates");
        std::fs::create_dir_all(templates.join("子目录")).unwrap();
        std::fs::write(dir.path().join("outside.docx"), b"stub").unwrap();
        std::fs::write(templates.join("子目录").join("绝缘杆.docx"), b"stub").unwrap();
        let binder = ReportBinder::new(&templates, "docx");

        for name in ["../outside", "子目录/绝缘杆", "子目录\\绝缘杆"] {
            assert!(matches!(
                binder.resolve_template(name),
                Err(ReportError::TemplateNotFound { .. })
            ));
        }
    }

    #[test]
    fn test_save_document_unwritable_path() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file.txt");
        std::fs::write(&blocker, b"x").unwrap();

        let err = save_document(b"content", &blocker.join("out.docx")).unwrap_err();
        assert!(matches!(err, ReportError::Io { .. }));
    }

    struct FailingRenderer;

    impl TemplateRenderer for FailingRenderer {
        fn render(
            &self,
            _template_path: &Path,
            _context: &RenderContext,
        ) -> Result<Vec<u8>, crate::engine::error::RenderError> {
            Err(crate::engine::error::RenderError::Engine("boom".to_string()))
        }
    }

    #[test]
    fn test_render_and_save_maps_render_failure() {
        let dir = tempdir().unwrap();
        let binder = ReportBinder::new(dir.path(), "docx");
        let context = binder.bind(&batch_of(1)).unwrap();
        let out = dir.path().join("out.docx");

        let err = binder
            .render_and_save(&FailingRenderer, &context, Path::new("t.docx"), &out)
            .unwrap_err();
        assert!(matches!(err, ReportError::Render(_)));
        assert!(!out.exists());
    }

    #[test]
    fn test_save_document_creates_directory() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("reports").join("a.docx");
        save_document(b"content", &out).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"content");
    }
}
