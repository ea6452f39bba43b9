//! 翻译管道模块
//!
//! 提取、过滤、视口调度和批次处理

pub mod batch;
pub mod extractor;
pub mod filters;
pub mod scheduler;

// 重新导出主要类型
pub use batch::{BatchTranslator, PassOutcome};
pub use extractor::{ExtractionStats, ExtractorConfig, TextExtractor};
pub use filters::{RejectReason, TextFilter};
pub use scheduler::{
    ElementBounds, EstimatedLayout, FixedLayout, LayoutProvider, Viewport, ViewportScheduler,
};
