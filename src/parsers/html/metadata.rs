use markup5ever_rcdom::Handle;

use super::dom::{find_nodes, get_child_node_by_name, get_node_attr};

/// 获取页面声明的语言
///
/// 依次查找 `<html lang>`、`<html xml:lang>` 和
/// `<meta http-equiv="content-language">`，返回小写的主语言子标签（如 `zh-CN` → `zh`）。
pub fn get_page_language(document: &Handle) -> Option<String> {
    if let Some(html_node) = get_child_node_by_name(document, "html") {
        for attr_name in ["lang", "xml:lang"] {
            if let Some(lang) = get_node_attr(&html_node, attr_name).and_then(|v| primary_subtag(&v)) {
                return Some(lang);
            }
        }
    }

    for meta_node in find_nodes(document, &["html", "head", "meta"]) {
        if get_node_attr(&meta_node, "http-equiv")
            .unwrap_or_default()
            .eq_ignore_ascii_case("content-language")
        {
            if let Some(lang) = get_node_attr(&meta_node, "content").and_then(|v| primary_subtag(&v)) {
                return Some(lang);
            }
        }
    }

    None
}

/// 提取语言标签的主子标签
fn primary_subtag(tag: &str) -> Option<String> {
    let primary = tag
        .split(',')
        .next()?
        .trim()
        .split(['-', '_'])
        .next()?
        .to_ascii_lowercase();

    if primary.is_empty() || !primary.chars().all(|c| c.is_ascii_alphabetic()) {
        None
    } else {
        Some(primary)
    }
}
