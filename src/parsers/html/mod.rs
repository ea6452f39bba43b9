//! HTML解析和处理模块
//!
//! - `utils`: 基础工具函数和常量
//! - `dom`: 基础DOM读写操作（属性、直接文本、节点插入与移除）
//! - `metadata`: 文档元数据处理（页面语言）
//! - `serializer`: 序列化功能

pub mod dom;
pub mod metadata;
pub mod serializer;
pub mod utils;

pub use dom::{
    append_child, collapse_whitespace, create_detached_element, create_text_node, direct_text,
    direct_text_nodes, find_nodes, get_child_node_by_name, get_node_attr, get_node_name,
    get_parent_node, has_node_attr, html_to_dom, insert_after, is_attached, remove_node,
    set_node_attr, set_text_node_contents, text_node_contents,
};
pub use metadata::get_page_language;
pub use serializer::serialize_document;
pub use utils::{split_tokens, WHITESPACES};
