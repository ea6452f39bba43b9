//! # Xplaino
//!
//! 页面内翻译引擎：按视口提取可翻译元素，经本地引擎或流式网络服务翻译，
//! 以可撤销的方式写回页面。
//!
//! ## 模块组织
//!
//! - `env` - 类型化环境变量
//! - `parsers` - HTML 与内联样式的读写
//! - `translation` - 提取、调度、服务层和 DOM 修改

pub mod env;
pub mod parsers;
pub mod translation;

pub use parsers::*;
