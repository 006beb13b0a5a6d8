// ==========================================
// 绝缘工器具试验报告系统 - 报告模板渲染
// ==========================================
// 模板: .docx（zip 包）
// 渲染部件: word/document.xml、word/header*.xml、word/footer*.xml
// 其他部件原样复制
//
// 占位符语法:
// - {{ 委托单位 }}            顶层字段
// - {{ 泄漏电流[0] }}         列表下标
// - {{ a.b }}                 嵌套字段
// - {{ row.样品编号 }}        表格行占位符: 所在 <w:tr> 按 rows 逐行复制
//
// 限制: Word 把一个占位符拆到多个 run 时无法识别
// ==========================================

use crate::engine::binder::RenderContext;
use crate::engine::error::RenderError;
use regex::Regex;
use serde_json::Value;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// 文档主体部件
const DOCUMENT_PART: &str = "word/document.xml";

/// 行占位符前缀
const ROW_PREFIX: &str = "row";

// ==========================================
// TemplateRenderer Trait
// ==========================================
/// 模板渲染器
///
/// 输入模板路径与渲染上下文，输出生成文档的字节内容。
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template_path: &Path, context: &RenderContext)
        -> Result<Vec<u8>, RenderError>;
}

// ==========================================
// DocxTemplateRenderer
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxTemplateRenderer;

impl DocxTemplateRenderer {
    pub fn new() -> Self {
        Self
    }

    /// 渲染内存中的模板
    pub fn render_bytes(
        &self,
        template: &[u8],
        context: &RenderContext,
        template_path: &Path,
    ) -> Result<Vec<u8>, RenderError> {
        let corrupt = |message: String| RenderError::CorruptTemplate {
            path: template_path.to_path_buf(),
            message,
        };

        let mut archive =
            ZipArchive::new(Cursor::new(template)).map_err(|e| corrupt(e.to_string()))?;
        if archive.index_for_name(DOCUMENT_PART).is_none() {
            return Err(corrupt(format!("缺少 {}", DOCUMENT_PART)));
        }

        let root = Value::Object(context.as_map().clone());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| corrupt(e.to_string()))?;
            let name = entry.name().to_string();

            if entry.is_dir() {
                writer.add_directory(name, options)?;
                continue;
            }

            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(|e| corrupt(e.to_string()))?;

            let content = if is_rendered_part(&name) {
                let xml = String::from_utf8(content)
                    .map_err(|e| corrupt(format!("{}: {}", name, e)))?;
                debug!(part = %name, "渲染模板部件");
                render_xml(&xml, &root)?.into_bytes()
            } else {
                content
            };

            writer.start_file(name, options)?;
            writer
                .write_all(&content)
                .map_err(|e| RenderError::Engine(e.to_string()))?;
        }

        Ok(writer.finish()?.into_inner())
    }
}

impl TemplateRenderer for DocxTemplateRenderer {
    fn render(
        &self,
        template_path: &Path,
        context: &RenderContext,
    ) -> Result<Vec<u8>, RenderError> {
        let template = std::fs::read(template_path).map_err(|e| RenderError::TemplateRead {
            path: template_path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.render_bytes(&template, context, template_path)
    }
}

fn is_rendered_part(name: &str) -> bool {
    if name == DOCUMENT_PART {
        return true;
    }
    match name.strip_prefix("word/") {
        Some(rest) => {
            (rest.starts_with("header") || rest.starts_with("footer"))
                && rest.ends_with(".xml")
                && !rest.contains('/')
        }
        None => false,
    }
}

// ==========================================
// 占位符替换
// ==========================================

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("Hardcode regex pattern"))
}

fn table_row_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<w:tr[ >].*?</w:tr>").expect("Hardcode regex pattern"))
}

/// 渲染一个 XML 部件
///
/// 含行占位符的表格行按 rows 逐行复制，其余文本替换顶层占位符。
/// 每段文本只替换一次，替换结果中的 `{{ }}` 不会被再次解析。
pub fn render_xml(xml: &str, root: &Value) -> Result<String, RenderError> {
    let rows: &[Value] = root
        .get("rows")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut out = String::with_capacity(xml.len());
    let mut last = 0;
    for m in table_row_regex().find_iter(xml) {
        out.push_str(&substitute(&xml[last..m.start()], root, None)?);
        let row_xml = m.as_str();
        if has_row_placeholder(row_xml) {
            for row in rows {
                out.push_str(&substitute(row_xml, root, Some(row))?);
            }
        } else {
            out.push_str(&substitute(row_xml, root, None)?);
        }
        last = m.end();
    }
    out.push_str(&substitute(&xml[last..], root, None)?);
    Ok(out)
}

fn has_row_placeholder(xml: &str) -> bool {
    placeholder_regex()
        .captures_iter(xml)
        .any(|caps| row_relative(&caps[1]).is_some())
}

/// `row.x` / `row[0]` 返回 row 之后的路径
fn row_relative(expr: &str) -> Option<&str> {
    let rest = expr.strip_prefix(ROW_PREFIX)?;
    if let Some(path) = rest.strip_prefix('.') {
        Some(path)
    } else if rest.starts_with('[') {
        Some(rest)
    } else {
        None
    }
}

fn substitute(text: &str, root: &Value, row: Option<&Value>) -> Result<String, RenderError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in placeholder_regex().captures_iter(text) {
        let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let expr = expr.as_str();

        let value = match (row_relative(expr), row) {
            (Some(path), Some(row)) => lookup(row, path),
            _ => lookup(root, expr),
        };
        let value = value.ok_or_else(|| RenderError::MissingField {
            field: expr.to_string(),
        })?;

        out.push_str(&text[last..whole.start()]);
        out.push_str(&xml_escape(&display_value(value)));
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// 解析字段路径
///
/// 优先按完整键名查找，列名本身可能含有 `.` 或 `[`。
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(direct) = value.get(path) {
        return Some(direct);
    }

    let mut current = value;
    for segment in path.split('.') {
        let segment = segment.trim();
        let (name, mut indices) = match segment.find('[') {
            Some(pos) => (&segment[..pos], &segment[pos..]),
            None => (segment, ""),
        };
        if !name.is_empty() {
            current = current.get(name)?;
        } else if indices.is_empty() {
            return None;
        }
        while let Some(rest) = indices.strip_prefix('[') {
            let end = rest.find(']')?;
            let idx: usize = rest[..end].trim().parse().ok()?;
            current = current.get(idx)?;
            indices = &rest[end + 1..];
        }
        if !indices.is_empty() {
            return None;
        }
    }
    Some(current)
}

/// 值的文本形式
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < 9e15 => format!("{}", f as i64),
                    Some(f) => f.to_string(),
                    None => n.to_string(),
                }
            }
        }
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
