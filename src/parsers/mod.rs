//! # 解析器模块
//!
//! - `html` - HTML文档解析、DOM读写、元数据处理、序列化
//! - `css` - 内联样式声明解析

pub mod css;
pub mod html;

pub use css::{compose_inline_style, is_hidden_by_style, parse_inline_style, style_property};
pub use html::{get_page_language, html_to_dom, serialize_document};
