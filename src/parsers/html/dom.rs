use std::cell::RefCell;
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{format_tendril, StrTendril, TendrilSink};
use html5ever::tree_builder::create_element;
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

use super::utils::WHITESPACES;

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> std::io::Result<RcDom> {
    let s = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => encoding.decode(data).0.to_string(),
        None => String::from_utf8_lossy(data).to_string(),
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
}

/// 查找指定路径的DOM节点
pub fn find_nodes(node: &Handle, node_names: &[&str]) -> Vec<Handle> {
    let Some((&node_name, rest)) = node_names.split_first() else {
        return Vec::new();
    };

    let mut found_nodes = Vec::new();
    let matches = get_node_name(node) == Some(node_name);

    if matches && rest.is_empty() {
        found_nodes.push(node.clone());
    }

    if matches && !rest.is_empty() {
        for child_node in node.children.borrow().iter() {
            found_nodes.append(&mut find_nodes(child_node, rest));
        }
    } else {
        for child_node in node.children.borrow().iter() {
            found_nodes.append(&mut find_nodes(child_node, node_names));
        }
    }

    found_nodes
}

/// 根据名称获取子节点
pub fn get_child_node_by_name(parent: &Handle, node_name: &str) -> Option<Handle> {
    let children = parent.children.borrow();
    children
        .iter()
        .find(|child| get_node_name(child) == Some(node_name))
        .cloned()
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 判断节点是否带有某个属性
pub fn has_node_attr(node: &Handle, attr_name: &str) -> bool {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .any(|attr| &*attr.name.local == attr_name),
        _ => false,
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取父节点
///
/// `Node::parent` 是 `Cell`，读取时需要先取出再放回，否则会把节点从树上摘掉。
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|node| node.upgrade());
    child.parent.set(weak);
    parent
}

/// 节点是否仍挂在文档树上
pub fn is_attached(node: &Handle) -> bool {
    let mut current = node.clone();
    loop {
        if let NodeData::Document = current.data {
            return true;
        }
        match get_parent_node(&current) {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}

/// 设置节点属性，`attr_value` 为 `None` 时删除属性
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();

        match attr_value {
            Some(value) => {
                if let Some(existing) = attrs_mut
                    .iter_mut()
                    .find(|attr| &*attr.name.local == attr_name)
                {
                    existing.value.clear();
                    existing.value.push_slice(value.as_str());
                } else {
                    attrs_mut.push(Attribute {
                        name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                        value: format_tendril!("{}", value),
                    });
                }
            }
            None => attrs_mut.retain(|attr| &*attr.name.local != attr_name),
        }
    }
}

/// 获取元素的直接文本子节点（不含后代元素中的文本）
pub fn direct_text_nodes(node: &Handle) -> Vec<Handle> {
    node.children
        .borrow()
        .iter()
        .filter(|child| matches!(child.data, NodeData::Text { .. }))
        .cloned()
        .collect()
}

/// 读取文本节点内容
pub fn text_node_contents(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// 覆盖文本节点内容
pub fn set_text_node_contents(node: &Handle, text: &str) {
    if let NodeData::Text { contents } = &node.data {
        *contents.borrow_mut() = StrTendril::from_slice(text);
    }
}

/// 获取元素的直接文本，空白折叠后去除首尾空白
pub fn direct_text(node: &Handle) -> String {
    let mut raw = String::new();
    for text_node in direct_text_nodes(node) {
        if let Some(contents) = text_node_contents(&text_node) {
            raw.push_str(&contents);
            raw.push(' ');
        }
    }
    collapse_whitespace(&raw)
}

/// 折叠连续空白
pub fn collapse_whitespace(text: &str) -> String {
    text.split(WHITESPACES).filter(|word| !word.is_empty()).collect::<Vec<_>>().join(" ")
}

/// 创建游离的元素节点
pub fn create_detached_element(tag: &str, attributes: &[(&str, String)]) -> Handle {
    let sink = RcDom::default();
    let attrs = attributes
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*name)),
            value: format_tendril!("{}", value),
        })
        .collect();

    create_element(
        &sink,
        QualName::new(None, ns!(html), LocalName::from(tag)),
        attrs,
    )
}

/// 创建游离的文本节点
pub fn create_text_node(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    })
}

/// 追加子节点
pub fn append_child(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// 在 `reference` 之后插入兄弟节点，`reference` 已脱离文档时返回 `false`
pub fn insert_after(reference: &Handle, new_node: Handle) -> bool {
    let Some(parent) = get_parent_node(reference) else {
        return false;
    };

    let mut children = parent.children.borrow_mut();
    let Some(position) = children.iter().position(|child| Rc::ptr_eq(child, reference)) else {
        return false;
    };

    new_node.parent.set(Some(Rc::downgrade(&parent)));
    children.insert(position + 1, new_node);
    true
}

/// 将节点从父节点中移除
pub fn remove_node(node: &Handle) -> bool {
    let Some(parent) = get_parent_node(node) else {
        return false;
    };

    let mut children = parent.children.borrow_mut();
    let before = children.len();
    children.retain(|child| !Rc::ptr_eq(child, node));
    node.parent.set(None);
    children.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> RcDom {
        html_to_dom(html.as_bytes(), "utf-8").unwrap()
    }

    #[test]
    fn test_direct_text_ignores_descendants() {
        let dom = parse("<p>Hello <b>bold</b>   world</p>");
        let p = find_nodes(&dom.document, &["html", "body", "p"]).remove(0);
        assert_eq!(direct_text(&p), "Hello world");
    }

    #[test]
    fn test_set_and_remove_attr() {
        let dom = parse("<p id=\"x\">Text</p>");
        let p = find_nodes(&dom.document, &["html", "body", "p"]).remove(0);

        set_node_attr(&p, "data-a", Some("1".to_string()));
        assert_eq!(get_node_attr(&p, "data-a").as_deref(), Some("1"));

        set_node_attr(&p, "data-a", Some("2".to_string()));
        assert_eq!(get_node_attr(&p, "data-a").as_deref(), Some("2"));

        set_node_attr(&p, "data-a", None);
        assert!(!has_node_attr(&p, "data-a"));
        assert_eq!(get_node_attr(&p, "id").as_deref(), Some("x"));
    }

    #[test]
    fn test_parent_lookup_is_non_destructive() {
        let dom = parse("<div><p>Text</p></div>");
        let p = find_nodes(&dom.document, &["html", "body", "div", "p"]).remove(0);

        assert!(get_parent_node(&p).is_some());
        assert!(get_parent_node(&p).is_some());
        assert!(is_attached(&p));
    }

    #[test]
    fn test_insert_after_and_remove() {
        let dom = parse("<div><p>One</p><p>Two</p></div>");
        let div = find_nodes(&dom.document, &["html", "body", "div"]).remove(0);
        let first = div.children.borrow()[0].clone();

        let sibling = create_detached_element("span", &[("class", "extra".to_string())]);
        append_child(&sibling, create_text_node("Inserted"));
        assert!(insert_after(&first, sibling.clone()));

        assert_eq!(div.children.borrow().len(), 3);
        assert!(Rc::ptr_eq(&div.children.borrow()[1], &sibling));

        assert!(remove_node(&sibling));
        assert_eq!(div.children.borrow().len(), 2);
        assert!(!is_attached(&sibling));
        assert!(!insert_after(&sibling, create_text_node("orphan")));
    }
}
