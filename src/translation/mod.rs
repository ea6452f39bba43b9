//! 页面内翻译
//!
//! 采用清晰的模块化架构：
//! - **config**: 配置管理
//! - **core**: 会话、DOM 修改和翻译管理器
//! - **error**: 错误处理
//! - **pipeline**: 文本提取、视口调度、批次处理
//! - **providers**: 本地引擎、跨上下文桥接与流式网络服务
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use std::sync::Arc;
//!
//! use tokio::sync::watch;
//! use xplaino::translation::{
//!     DisplayMode, EngineConfig, EstimatedLayout, NetworkTranslator, ProviderTier,
//!     StaticCredentials, TextExtractor, TranslationManager, Viewport,
//! };
//!
//! # async fn example(document: markup5ever_rcdom::Handle) -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default_with_lang("es", None);
//! let remote = NetworkTranslator::from_config(&config, Arc::new(StaticCredentials::new(None)))?;
//! let provider = Arc::new(ProviderTier::network_only(Arc::new(remote), (&config).into()));
//!
//! let elements = TextExtractor::default().extract(&document);
//! let layout = Rc::new(EstimatedLayout::from_elements(&elements));
//! let (_viewport_tx, viewport_rx) = watch::channel(Viewport::new(0.0, 800.0));
//!
//! let manager = TranslationManager::new(document, provider, layout, viewport_rx, config);
//! manager.translate_page("es", DisplayMode::Append)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod providers;

pub use config::{constants, ConfigManager, EngineConfig};
pub use core::{
    DisplayMode, DomMutator, ElementStatus, SessionEvent, SessionState, TranslatableElement,
    TranslationManager, TranslationSession, ViewMode,
};
pub use error::{TranslationError, TranslationResult};
pub use pipeline::{
    BatchTranslator, ElementBounds, EstimatedLayout, ExtractorConfig, FixedLayout,
    LayoutProvider, PassOutcome, TextExtractor, TextFilter, Viewport, ViewportScheduler,
};
pub use providers::{
    Availability, BridgeClient, BridgeHost, BridgeLocalEngine, CredentialProvider, LocalEngine,
    LocalTranslator, NetworkTranslator, ProviderTier, RemoteTranslator, StaticCredentials,
    TierConfig, TranslationEvent, TranslationItem, TranslationRequest,
};
