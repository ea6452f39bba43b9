//! 可翻译元素提取器
//!
//! 按文档顺序遍历 `<body>`，找出承载直接文本的元素。
//! 导航、广告、本引擎插入的节点以及不可见元素连同子树一起跳过；
//! 含有可翻译后代的容器本身不入选，避免同一段文字被计入两次。

use markup5ever_rcdom::{Handle, NodeData};

use super::filters::{RejectReason, TextFilter};
use crate::parsers::css::is_hidden_by_style;
use crate::parsers::html::{direct_text, find_nodes, get_node_attr, has_node_attr, split_tokens};
use crate::translation::config::constants;
use crate::translation::core::session::TranslatableElement;

/// 提取器配置
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// 单次提取的元素上限，超出部分直接截断
    pub max_elements: usize,
    pub skip_elements: Vec<String>,
    pub translatable_elements: Vec<String>,
    pub container_elements: Vec<String>,
    pub ad_markers: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            max_elements: constants::DEFAULT_MAX_ELEMENTS,
            skip_elements: owned(constants::SKIP_ELEMENTS),
            translatable_elements: owned(constants::TRANSLATABLE_ELEMENTS),
            container_elements: owned(constants::CONTAINER_ELEMENTS),
            ad_markers: owned(constants::AD_MARKERS),
        }
    }
}

impl ExtractorConfig {
    pub fn with_max_elements(max_elements: usize) -> Self {
        Self {
            max_elements,
            ..Self::default()
        }
    }
}

/// 提取统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub elements_visited: usize,
    /// 连同子树一起跳过的元素
    pub subtrees_pruned: usize,
    pub containers_skipped: usize,
    pub already_marked: usize,
    pub texts_rejected: usize,
    pub extracted: usize,
    pub truncated: bool,
}

/// 可翻译元素提取器
pub struct TextExtractor {
    config: ExtractorConfig,
    filter: TextFilter,
    stats: ExtractionStats,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

impl TextExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            filter: TextFilter::new(),
            stats: ExtractionStats::default(),
        }
    }

    /// 提取可翻译元素，只读不改动文档
    pub fn extract(&mut self, document: &Handle) -> Vec<TranslatableElement> {
        self.stats = ExtractionStats::default();
        let mut elements = Vec::new();

        let root = find_nodes(document, &["html", "body"])
            .into_iter()
            .next()
            .unwrap_or_else(|| document.clone());

        for child in root.children.borrow().iter() {
            if !self.walk(child, &mut elements) {
                break;
            }
        }

        self.stats.extracted = elements.len();
        tracing::debug!(
            "提取完成: 访问 {} 个元素, 剪枝 {}, 跳过容器 {}, 已标记 {}, 拒绝文本 {}, 提取 {}{}",
            self.stats.elements_visited,
            self.stats.subtrees_pruned,
            self.stats.containers_skipped,
            self.stats.already_marked,
            self.stats.texts_rejected,
            self.stats.extracted,
            if self.stats.truncated { " (已截断)" } else { "" }
        );

        elements
    }

    pub fn stats(&self) -> &ExtractionStats {
        &self.stats
    }

    /// 深度优先遍历；返回 `false` 表示达到上限需要停止
    fn walk(&mut self, node: &Handle, elements: &mut Vec<TranslatableElement>) -> bool {
        let tag = match &node.data {
            NodeData::Element { name, .. } => name.local.to_string(),
            _ => return true,
        };

        self.stats.elements_visited += 1;

        if self.should_prune(node, &tag) {
            self.stats.subtrees_pruned += 1;
            return true;
        }

        if self.is_translatable_tag(&tag) {
            if is_marked(node) {
                self.stats.already_marked += 1;
            } else if self.is_container(&tag) && self.has_translatable_descendant(node) {
                self.stats.containers_skipped += 1;
            } else {
                let text = direct_text(node);
                match self.filter.check(&text) {
                    Ok(()) => {
                        if elements.len() >= self.config.max_elements {
                            self.stats.truncated = true;
                            return false;
                        }
                        let index = elements.len();
                        elements.push(TranslatableElement::new(index, node.clone(), &tag, text));
                    }
                    Err(RejectReason::NoWords) if text.is_empty() => {}
                    Err(_) => self.stats.texts_rejected += 1,
                }
            }
        }

        for child in node.children.borrow().iter() {
            if !self.walk(child, elements) {
                return false;
            }
        }

        true
    }

    /// 整棵子树都不参与翻译
    fn should_prune(&self, node: &Handle, tag: &str) -> bool {
        if self.config.skip_elements.iter().any(|t| t == tag) {
            return true;
        }

        is_injected(node) || self.is_navigation_or_ad(node, tag) || is_invisible(node)
    }

    fn is_navigation_or_ad(&self, node: &Handle, tag: &str) -> bool {
        if tag == "nav" {
            return true;
        }

        if get_node_attr(node, "role").is_some_and(|role| role.eq_ignore_ascii_case("navigation"))
        {
            return true;
        }

        let is_marker = |token: &str| {
            self.config
                .ad_markers
                .iter()
                .any(|marker| marker.eq_ignore_ascii_case(token))
        };

        let class_hit = get_node_attr(node, "class")
            .is_some_and(|class| split_tokens(&class).any(is_marker));
        let id_hit = get_node_attr(node, "id").is_some_and(|id| is_marker(id.trim()));

        class_hit || id_hit
    }

    fn is_translatable_tag(&self, tag: &str) -> bool {
        self.config.translatable_elements.iter().any(|t| t == tag)
    }

    fn is_container(&self, tag: &str) -> bool {
        self.config.container_elements.iter().any(|t| t == tag)
    }

    fn has_translatable_descendant(&self, node: &Handle) -> bool {
        node.children.borrow().iter().any(|child| match &child.data {
            NodeData::Element { name, .. } => {
                let tag = name.local.as_ref();
                if self.config.skip_elements.iter().any(|t| t == tag) {
                    return false;
                }
                self.is_translatable_tag(tag) || self.has_translatable_descendant(child)
            }
            _ => false,
        })
    }
}

/// 本引擎插入的节点（保留前缀的 id 或 class）
fn is_injected(node: &Handle) -> bool {
    let prefix = constants::RESERVED_PREFIX;

    if get_node_attr(node, "id").is_some_and(|id| id.trim().starts_with(prefix)) {
        return true;
    }

    get_node_attr(node, "class")
        .is_some_and(|class| split_tokens(&class).any(|token| token.starts_with(prefix)))
}

/// 没有布局信息时，只能依据属性和内联样式判断可见性
fn is_invisible(node: &Handle) -> bool {
    if has_node_attr(node, "hidden") {
        return true;
    }

    if get_node_attr(node, "aria-hidden").is_some_and(|value| value.trim() != "false") {
        return true;
    }

    get_node_attr(node, "style").is_some_and(|style| is_hidden_by_style(&style))
}

fn is_marked(node: &Handle) -> bool {
    has_node_attr(node, constants::ATTR_TRANSLATED) || has_node_attr(node, constants::ATTR_ORIGINAL)
}
