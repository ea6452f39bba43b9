//! 翻译配置管理模块
//!
//! 支持配置文件、环境变量和默认值三层来源

pub mod manager;

pub use manager::{ConfigManager, EngineConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 批次与调度
    pub const DEFAULT_BATCH_SIZE: usize = 15;
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
    pub const DEFAULT_PRELOAD_MARGIN_PX: u32 = 300;

    // 超时
    pub const DEFAULT_LOCAL_TIMEOUT: Duration = Duration::from_secs(15);
    pub const DEFAULT_BRIDGE_HANDSHAKE: Duration = Duration::from_secs(5);
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    // 提取
    pub const DEFAULT_MAX_ELEMENTS: usize = 2000;
    pub const MIN_TEXT_CHARS: usize = 3;

    /// 语言检测样本：前若干条文本，总长度上限
    pub const DETECTION_SAMPLE_ITEMS: usize = 5;
    pub const DETECTION_SAMPLE_CHARS: usize = 1000;

    // 默认语言与服务地址
    pub const DEFAULT_SOURCE_LANGUAGE: &str = "en";
    pub const DEFAULT_TARGET_LANGUAGE: &str = "es";
    pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/translate/stream";

    // 页面标记
    pub const ATTR_TRANSLATED: &str = "data-xplaino-translated";
    pub const ATTR_ORIGINAL: &str = "data-xplaino-original";
    pub const TRANSLATION_CLASS: &str = "xplaino-translation";
    pub const RESERVED_PREFIX: &str = "xplaino-";
    pub const DEFAULT_ACCENT_COLOR: &str = "#4f46e5";

    /// 不渲染文本的元素，整棵子树跳过
    pub const SKIP_ELEMENTS: &[&str] = &[
        "script", "style", "noscript", "template", "svg", "math", "canvas", "video", "audio",
        "iframe", "object", "embed", "img", "picture", "source", "track", "map", "area", "input",
        "textarea", "select", "button", "code", "pre", "head", "meta", "link", "base", "br", "hr",
        "wbr",
    ];

    /// 可承载译文的元素
    pub const TRANSLATABLE_ELEMENTS: &[&str] = &[
        "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "dt", "dd", "td", "th", "caption",
        "blockquote", "figcaption", "summary", "label", "a", "span", "div", "section", "article",
        "aside", "header", "footer", "main",
    ];

    /// 容器元素：存在可翻译后代时自身不入选
    pub const CONTAINER_ELEMENTS: &[&str] = &["div", "section", "article", "span"];

    /// 译文兄弟节点使用 `span` 的行内元素
    pub const INLINE_ELEMENTS: &[&str] = &["span", "label", "a"];

    /// 广告相关的 class/id 标记
    pub const AD_MARKERS: &[&str] = &[
        "ad", "ads", "advert", "advertisement", "sponsored", "banner-ad",
    ];

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "xplaino.toml",
        ".xplaino.toml",
        "xplaino.json",
        "~/.config/xplaino/config.toml",
        "/etc/xplaino/config.toml",
    ];
}
