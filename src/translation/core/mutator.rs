//! DOM 修改器
//!
//! 把译文写到页面上，并且能够精确撤销。
//! - 追加模式：在原元素之后插入带 `xplaino-translation` class 的兄弟节点
//! - 替换模式：先保存直接文本节点的内容，再用译文覆盖
//!
//! 原元素本身从不被创建或删除，只改动它的属性、直接文本和相邻节点。

use markup5ever_rcdom::Handle;

use super::session::{DisplayMode, ElementStatus, TranslatableElement, ViewMode};
use crate::parsers::css::{compose_inline_style, style_property};
use crate::parsers::html::{
    append_child, create_detached_element, create_text_node, direct_text_nodes, get_node_attr,
    get_parent_node, insert_after, is_attached, remove_node, set_node_attr,
    set_text_node_contents, split_tokens, text_node_contents,
};
use crate::translation::config::constants;
use crate::translation::error::{TranslationError, TranslationResult};

/// 从原元素复制到译文节点的字体属性
const COPIED_FONT_PROPERTIES: &[&str] = &["font-size", "font-weight", "font-style"];

#[derive(Debug, Clone)]
pub struct DomMutator {
    accent_color: String,
}

impl Default for DomMutator {
    fn default() -> Self {
        Self::new(constants::DEFAULT_ACCENT_COLOR)
    }
}

impl DomMutator {
    pub fn new(accent_color: &str) -> Self {
        Self {
            accent_color: accent_color.to_string(),
        }
    }

    /// 把元素的译文写入页面
    pub fn apply(
        &self,
        element: &mut TranslatableElement,
        mode: DisplayMode,
        view: ViewMode,
    ) -> TranslationResult<()> {
        let Some(translated) = element.translated_text.clone().filter(|t| !t.is_empty()) else {
            return Err(TranslationError::InvalidInput(format!(
                "元素 {} 没有译文",
                element.index
            )));
        };

        if !is_attached(&element.node) {
            return Err(TranslationError::DetachedNode(format!(
                "<{}> #{}",
                element.tag, element.index
            )));
        }

        match mode {
            DisplayMode::Append => self.apply_append(element, &translated, view),
            DisplayMode::Replace => self.apply_replace(element, &translated, view),
        }

        set_node_attr(&element.node, constants::ATTR_TRANSLATED, Some("true".to_string()));
        element.status = ElementStatus::Applied;
        Ok(())
    }

    fn apply_append(&self, element: &mut TranslatableElement, translated: &str, view: ViewMode) {
        let existing = element
            .sibling
            .clone()
            .filter(is_attached)
            .or_else(|| find_translation_sibling(&element.node));

        if let Some(sibling) = existing {
            element.sibling = Some(sibling);
            return;
        }

        let tag = if constants::INLINE_ELEMENTS.contains(&element.tag.as_str()) {
            "span"
        } else {
            "div"
        };

        let mut attrs = vec![
            ("class", constants::TRANSLATION_CLASS.to_string()),
            ("style", self.sibling_style(&element.node, tag)),
        ];
        if view == ViewMode::Original {
            attrs.push(("hidden", String::new()));
        }

        let sibling = create_detached_element(tag, &attrs);
        append_child(&sibling, create_text_node(translated));

        if insert_after(&element.node, sibling.clone()) {
            element.sibling = Some(sibling);
        }
    }

    fn apply_replace(&self, element: &mut TranslatableElement, translated: &str, view: ViewMode) {
        if element.text_snapshot.is_empty() {
            element.text_snapshot = direct_text_nodes(&element.node)
                .into_iter()
                .map(|node| {
                    let contents = text_node_contents(&node).unwrap_or_default();
                    (node, contents)
                })
                .collect();

            if element.text_snapshot.is_empty() {
                let node = create_text_node("");
                append_child(&element.node, node.clone());
                element.text_snapshot.push((node, String::new()));
            }

            set_node_attr(
                &element.node,
                constants::ATTR_ORIGINAL,
                Some(element.original_text.clone()),
            );
        }

        match view {
            ViewMode::Translated => write_translation(element, translated),
            ViewMode::Original => restore_snapshot(element),
        }
    }

    /// 译文节点样式：沿用原元素的字体设置，左侧加强调色边框
    fn sibling_style(&self, original: &Handle, tag: &str) -> String {
        let inline = get_node_attr(original, "style").unwrap_or_default();

        let mut declarations: Vec<(&str, String)> = COPIED_FONT_PROPERTIES
            .iter()
            .filter_map(|prop| style_property(&inline, prop).map(|value| (*prop, value)))
            .collect();

        declarations.push(("border-left", format!("3px solid {}", self.accent_color)));
        declarations.push(("padding-left", "8px".to_string()));
        if tag == "div" {
            declarations.push(("margin-top", "4px".to_string()));
        } else {
            declarations.push(("margin-left", "4px".to_string()));
        }

        compose_inline_style(&declarations)
    }

    /// 切换单个元素显示原文或译文
    pub fn show(
        &self,
        element: &TranslatableElement,
        mode: DisplayMode,
        view: ViewMode,
    ) -> TranslationResult<()> {
        if element.status != ElementStatus::Applied {
            return Ok(());
        }
        let Some(translated) = element.translated_text.as_deref() else {
            return Ok(());
        };

        if !is_attached(&element.node) {
            return Err(TranslationError::DetachedNode(format!(
                "<{}> #{}",
                element.tag, element.index
            )));
        }

        match mode {
            DisplayMode::Append => {
                if let Some(sibling) = &element.sibling {
                    let hidden = (view == ViewMode::Original).then(String::new);
                    set_node_attr(sibling, "hidden", hidden);
                }
            }
            DisplayMode::Replace => match view {
                ViewMode::Translated => write_translation(element, translated),
                ViewMode::Original => restore_snapshot(element),
            },
        }

        Ok(())
    }

    /// 对所有已写入的元素切换视图，返回跳过的元素数
    pub fn toggle_view(
        &self,
        elements: &mut [TranslatableElement],
        mode: DisplayMode,
        view: ViewMode,
    ) -> usize {
        let mut skipped = 0;
        for element in elements.iter_mut().filter(|e| e.is_translated()) {
            if let Err(e) = self.show(element, mode, view) {
                tracing::warn!("切换视图时跳过元素: {}", e);
                element.status = ElementStatus::Failed;
                skipped += 1;
            }
        }
        skipped
    }

    /// 撤销对单个元素的全部修改
    pub fn restore(&self, element: &mut TranslatableElement) {
        if let Some(sibling) = element.sibling.take() {
            remove_node(&sibling);
        }

        if !element.text_snapshot.is_empty() {
            restore_snapshot(element);
            element.text_snapshot.clear();
        }

        set_node_attr(&element.node, constants::ATTR_ORIGINAL, None);
        set_node_attr(&element.node, constants::ATTR_TRANSLATED, None);
        element.status = ElementStatus::Pending;
    }

    /// 撤销会话内的所有修改
    pub fn clear(&self, elements: &mut [TranslatableElement]) {
        for element in elements.iter_mut() {
            self.restore(element);
        }
    }

    /// 清除文档中残留的标记和译文节点，返回移除的节点数
    pub fn purge_markers(&self, root: &Handle) -> usize {
        let mut removed = 0;
        purge_recursive(root, &mut removed);
        removed
    }
}

fn write_translation(element: &TranslatableElement, translated: &str) {
    for (position, (node, _)) in element.text_snapshot.iter().enumerate() {
        let text = if position == 0 { translated } else { "" };
        set_text_node_contents(node, text);
    }
}

fn restore_snapshot(element: &TranslatableElement) {
    for (node, original) in &element.text_snapshot {
        set_text_node_contents(node, original);
    }
}

fn is_translation_node(node: &Handle) -> bool {
    get_node_attr(node, "class")
        .is_some_and(|class| split_tokens(&class).any(|t| t == constants::TRANSLATION_CLASS))
}

/// 紧随元素之后（跳过空白文本）的译文节点
fn find_translation_sibling(node: &Handle) -> Option<Handle> {
    let parent = get_parent_node(node)?;
    let children = parent.children.borrow();
    let position = children.iter().position(|child| std::rc::Rc::ptr_eq(child, node))?;

    children[position + 1..]
        .iter()
        .find(|child| {
            text_node_contents(child).map_or(true, |text| !text.trim().is_empty())
        })
        .filter(|child| is_translation_node(child))
        .cloned()
}

fn purge_recursive(node: &Handle, removed: &mut usize) {
    let children: Vec<Handle> = node.children.borrow().iter().cloned().collect();
    for child in children {
        if is_translation_node(&child) {
            remove_node(&child);
            *removed += 1;
            continue;
        }
        purge_recursive(&child, removed);
    }

    set_node_attr(node, constants::ATTR_TRANSLATED, None);
    set_node_attr(node, constants::ATTR_ORIGINAL, None);
}
