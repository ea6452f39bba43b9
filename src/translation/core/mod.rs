//! 翻译系统核心模块
//!
//! - **会话** (`session.rs`): 可翻译元素、显示模式、会话状态
//! - **修改器** (`mutator.rs`): 写入译文、切换视图、撤销修改
//! - **管理器** (`manager.rs`): 串联提取、调度、服务层与修改器的状态机
//!
//! ## 模块依赖关系
//!
//! ```text
//! TranslationManager (manager.rs)
//!     ├── TextExtractor (pipeline/extractor.rs)
//!     ├── ViewportScheduler (pipeline/scheduler.rs)
//!     ├── BatchTranslator (pipeline/batch.rs)
//!     │       └── ProviderTier (providers/mod.rs)
//!     └── DomMutator (mutator.rs)
//! ```

pub mod manager;
pub mod mutator;
pub mod session;

pub use manager::{SessionEvent, TranslationManager};
pub use mutator::DomMutator;
pub use session::{
    DisplayMode, ElementStatus, SessionState, TranslatableElement, TranslationSession, ViewMode,
};
