// ==========================================
// 绝缘工器具试验报告系统 - 列表字面量解析
// ==========================================
// 一个单元格里可能存放多次测量值，例如 "[1.2, 1.3]" 或 "['合格', '合格']"
// 解析成功则替换为列表；任何失败都原样返回，不产生错误
// ==========================================

use crate::domain::CellValue;

/// 嵌套深度上限
const MAX_DEPTH: usize = 32;

/// 尝试把文本单元格解析为列表，失败时原样返回
pub fn try_parse_list(value: CellValue) -> CellValue {
    let parsed = match &value {
        CellValue::Text(s) => parse_list_literal(s),
        _ => None,
    };
    match parsed {
        Some(items) => CellValue::List(items),
        None => value,
    }
}

/// 解析列表字面量
///
/// 支持: 数值、单/双引号字符串、嵌套列表、None/null（→ Empty）、
/// True/False、末尾多余逗号。整段文本必须恰好是一个列表。
pub fn parse_list_literal(text: &str) -> Option<Vec<CellValue>> {
    let trimmed = text.trim();
    if !trimmed.starts_with('[') {
        return None;
    }

    let mut parser = LiteralParser {
        chars: trimmed.chars().collect(),
        pos: 0,
    };
    let items = parser.parse_list(0)?;
    parser.skip_ws();
    if parser.pos != parser.chars.len() {
        return None;
    }
    Some(items)
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
}

impl LiteralParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_list(&mut self, depth: usize) -> Option<Vec<CellValue>> {
        if depth > MAX_DEPTH || self.bump()? != '[' {
            return None;
        }

        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek()? == ']' {
                self.pos += 1;
                return Some(items);
            }

            items.push(self.parse_value(depth)?);

            self.skip_ws();
            match self.bump()? {
                ',' => continue,
                ']' => return Some(items),
                _ => return None,
            }
        }
    }

    fn parse_value(&mut self, depth: usize) -> Option<CellValue> {
        match self.peek()? {
            '[' => self.parse_list(depth + 1).map(CellValue::List),
            '\'' | '"' => self.parse_string().map(CellValue::Text),
            c if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.parse_number(),
            c if c.is_ascii_alphabetic() => self.parse_keyword(),
            _ => None,
        }
    }

    fn parse_string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                '\\' => {
                    let escaped = match self.bump()? {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        c @ ('\\' | '\'' | '"') => c,
                        _ => return None,
                    };
                    out.push(escaped);
                }
                c if c == quote => return Some(out),
                c => out.push(c),
            }
        }
    }

    fn parse_number(&mut self) -> Option<CellValue> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_')
        ) {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if !raw.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }
        let n = raw.parse::<f64>().ok()?;
        n.is_finite().then_some(CellValue::Number(n))
    }

    fn parse_keyword(&mut self) -> Option<CellValue> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "None" | "null" => Some(CellValue::Empty),
            "True" | "true" => Some(CellValue::text("True")),
            "False" | "false" => Some(CellValue::text("False")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers() {
        let v = try_parse_list(CellValue::text("[1.2, 3, -0.5, 1e3]"));
        assert_eq!(
            v,
            CellValue::List(vec![
                CellValue::Number(1.2),
                CellValue::Number(3.0),
                CellValue::Number(-0.5),
                CellValue::Number(1000.0),
            ])
        );
    }

    #[test]
    fn test_parse_strings_and_nested() {
        let v = try_parse_list(CellValue::text(" ['合格', \"不合格\", [1, None], True,] "));
        assert_eq!(
            v,
            CellValue::List(vec![
                CellValue::text("合格"),
                CellValue::text("不合格"),
                CellValue::List(vec![CellValue::Number(1.0), CellValue::Empty]),
                CellValue::text("True"),
            ])
        );
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(try_parse_list(CellValue::text("[]")), CellValue::List(vec![]));
    }

    #[test]
    fn test_invalid_literal_returned_unchanged() {
        for raw in [
            "[1, 2",
            "[1 2]",
            "[abc]",
            "[1], 2",
            "['unterminated]",
            "1, 2",
            "绝缘手套",
            "[,]",
        ] {
            let original = CellValue::text(raw);
            assert_eq!(try_parse_list(original.clone()), original, "input: {}", raw);
        }
    }

    #[test]
    fn test_non_text_untouched() {
        assert_eq!(try_parse_list(CellValue::Number(2.0)), CellValue::Number(2.0));
        assert_eq!(try_parse_list(CellValue::Empty), CellValue::Empty);
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}{}", "[".repeat(100), "]".repeat(100));
        assert_eq!(try_parse_list(CellValue::text(deep.clone())), CellValue::text(deep));
    }
}
