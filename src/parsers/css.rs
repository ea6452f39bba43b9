//! 内联样式解析模块
//!
//! 没有布局引擎可用，元素的可见性与字体样式只能从 `style` 属性推断。
//! 本模块使用cssparser对声明列表做分词，得到 `属性名 -> 值` 的列表，
//! 并提供把声明重新拼回 `style` 属性的辅助函数。

use cssparser::{Parser, ParserInput, Token};

/// 单条样式声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleDeclaration {
    /// 小写的属性名
    pub name: String,
    /// 原始值文本（去掉首尾空白与 `!important`）
    pub value: String,
    pub important: bool,
}

/// 解析 `style` 属性中的声明列表
///
/// 无法识别的片段会被跳过到下一个分号，不会中断整体解析。
pub fn parse_inline_style(style: &str) -> Vec<StyleDeclaration> {
    let mut input = ParserInput::new(style);
    let mut parser = Parser::new(&mut input);
    let mut declarations = Vec::new();

    loop {
        let name = match parser.next() {
            Ok(Token::Ident(name)) => Some(name.to_ascii_lowercase()),
            Ok(Token::Semicolon) => continue,
            Ok(_) => None,
            Err(_) => break,
        };

        let Some(name) = name else {
            if !skip_declaration(&mut parser) {
                break;
            }
            continue;
        };

        let has_colon = matches!(parser.next(), Ok(Token::Colon));
        if !has_colon {
            if !skip_declaration(&mut parser) {
                break;
            }
            continue;
        }

        let start = parser.position();
        let (end, at_end) = loop {
            let before = parser.position();
            match parser.next() {
                Ok(Token::Semicolon) => break (before, false),
                Ok(_) => {}
                Err(_) => break (parser.position(), true),
            }
        };

        let raw = parser.slice(start..end).trim();
        let (value, important) = match raw.to_ascii_lowercase().rfind("!important") {
            Some(idx) => (raw[..idx].trim(), true),
            None => (raw, false),
        };

        if !value.is_empty() {
            declarations.push(StyleDeclaration {
                name,
                value: value.to_string(),
                important,
            });
        }

        if at_end {
            break;
        }
    }

    declarations
}

/// 跳过当前声明直到分号；返回 `false` 表示已到达输入末尾
fn skip_declaration(parser: &mut Parser) -> bool {
    loop {
        match parser.next() {
            Ok(Token::Semicolon) => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
}

/// 读取某个属性的最终值（后出现的声明覆盖先出现的，`!important` 优先）
pub fn style_property(style: &str, property: &str) -> Option<String> {
    let declarations = parse_inline_style(style);
    let matching = declarations.iter().filter(|d| d.name == property);

    matching
        .clone()
        .filter(|d| d.important)
        .last()
        .or_else(|| matching.last())
        .map(|d| d.value.to_ascii_lowercase())
}

/// 根据内联样式判断元素是否不可见
pub fn is_hidden_by_style(style: &str) -> bool {
    if style_property(style, "display").as_deref() == Some("none") {
        return true;
    }

    if matches!(
        style_property(style, "visibility").as_deref(),
        Some("hidden") | Some("collapse")
    ) {
        return true;
    }

    match style_property(style, "opacity") {
        Some(opacity) => opacity
            .trim_end_matches('%')
            .parse::<f32>()
            .map(|v| v == 0.0)
            .unwrap_or(false),
        None => false,
    }
}

/// 把声明列表拼成 `style` 属性值
pub fn compose_inline_style(declarations: &[(&str, String)]) -> String {
    declarations
        .iter()
        .map(|(name, value)| format!("{}: {};", name, value))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_declarations() {
        let declarations = parse_inline_style("font-size: 14px; FONT-WEIGHT:bold");
        assert_eq!(declarations.len(), 2);
        assert_eq!(declarations[0].name, "font-size");
        assert_eq!(declarations[0].value, "14px");
        assert_eq!(declarations[1].name, "font-weight");
        assert_eq!(declarations[1].value, "bold");
    }

    #[test]
    fn test_functions_and_important() {
        let declarations =
            parse_inline_style("color: rgb(1, 2, 3) !important; font-family: \"A B\", serif;");
        assert_eq!(declarations[0].value, "rgb(1, 2, 3)");
        assert!(declarations[0].important);
        assert_eq!(declarations[1].value, "\"A B\", serif");
    }

    #[test]
    fn test_garbage_is_skipped() {
        let declarations = parse_inline_style("12px; ; display none; opacity: 0");
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].name, "opacity");
    }

    #[test]
    fn test_hidden_detection() {
        assert!(is_hidden_by_style("display: none"));
        assert!(is_hidden_by_style("color: red; visibility: hidden"));
        assert!(is_hidden_by_style("opacity: 0.0"));
        assert!(!is_hidden_by_style("opacity: 0.5"));
        assert!(!is_hidden_by_style("display: none; display: block"));
        assert!(is_hidden_by_style("display: none !important; display: block"));
        assert!(!is_hidden_by_style(""));
    }

    #[test]
    fn test_compose() {
        let style = compose_inline_style(&[("font-size", "12px".to_string()), ("color", "red".to_string())]);
        assert_eq!(style, "font-size: 12px; color: red;");
    }
}
