//! 配置管理器
//!
//! 文件配置、环境变量和默认值的合并与校验

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::translation::core::session::DisplayMode;
use crate::translation::error::{TranslationError, TranslationResult};

/// 翻译引擎配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    // 服务
    pub api_url: String,
    pub request_timeout_secs: u64,

    // 语言与显示
    pub target_language: String,
    pub default_source_language: String,
    pub display_mode: DisplayMode,
    pub accent_color: String,

    // 调度与批次
    pub batch_size: usize,
    pub debounce_ms: u64,
    pub preload_margin_px: u32,
    pub max_elements: usize,

    // 本地引擎
    pub local_timeout_secs: u64,
    pub bridge_handshake_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_url: constants::DEFAULT_API_URL.to_string(),
            request_timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT.as_secs(),

            target_language: constants::DEFAULT_TARGET_LANGUAGE.to_string(),
            default_source_language: constants::DEFAULT_SOURCE_LANGUAGE.to_string(),
            display_mode: DisplayMode::Append,
            accent_color: constants::DEFAULT_ACCENT_COLOR.to_string(),

            batch_size: constants::DEFAULT_BATCH_SIZE,
            debounce_ms: constants::DEFAULT_DEBOUNCE.as_millis() as u64,
            preload_margin_px: constants::DEFAULT_PRELOAD_MARGIN_PX,
            max_elements: constants::DEFAULT_MAX_ELEMENTS,

            local_timeout_secs: constants::DEFAULT_LOCAL_TIMEOUT.as_secs(),
            bridge_handshake_secs: constants::DEFAULT_BRIDGE_HANDSHAKE.as_secs(),
        }
    }
}

impl EngineConfig {
    /// 创建带指定语言的默认配置
    pub fn default_with_lang(target_language: &str, api_url: Option<&str>) -> Self {
        let mut config = Self {
            target_language: target_language.to_lowercase(),
            ..Self::default()
        };
        if let Some(url) = api_url {
            config.api_url = url.to_string();
        }
        config
    }

    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        if self.batch_size == 0 {
            return Err(TranslationError::ConfigError("批次大小不能为0".to_string()));
        }

        if self.debounce_ms == 0 {
            return Err(TranslationError::ConfigError("去抖窗口不能为0".to_string()));
        }

        if self.max_elements == 0 {
            return Err(TranslationError::ConfigError("元素上限不能为0".to_string()));
        }

        if self.local_timeout_secs == 0 || self.bridge_handshake_secs == 0 {
            return Err(TranslationError::ConfigError("超时时间必须大于0".to_string()));
        }

        if self.target_language.trim().is_empty() {
            return Err(TranslationError::ConfigError("目标语言不能为空".to_string()));
        }

        let parsed = url::Url::parse(&self.api_url).map_err(|e| {
            TranslationError::ConfigError(format!("API地址无效 '{}': {}", self.api_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TranslationError::ConfigError(format!(
                "API地址必须使用 http 或 https: {}",
                self.api_url
            )));
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{translation, EnvVar};

        if let Ok(api_url) = translation::ApiUrl::get() {
            self.api_url = api_url;
            tracing::info!("环境变量覆盖 API URL: {}", self.api_url);
        }

        if let Ok(target_language) = translation::TargetLang::get() {
            self.target_language = target_language;
        }

        if let Ok(source_language) = translation::DefaultSourceLang::get() {
            self.default_source_language = source_language;
        }

        if let Ok(mode) = translation::DisplayMode::get() {
            match mode.parse::<DisplayMode>() {
                Ok(mode) => self.display_mode = mode,
                Err(e) => tracing::warn!("忽略环境变量中的显示模式: {}", e),
            }
        }

        if translation::BatchSize::is_set() {
            if let Ok(batch_size) = translation::BatchSize::get() {
                self.batch_size = batch_size;
            }
        }

        if translation::DebounceMs::is_set() {
            if let Ok(debounce) = translation::DebounceMs::get() {
                self.debounce_ms = debounce;
            }
        }

        if translation::PreloadMarginPx::is_set() {
            if let Ok(margin) = translation::PreloadMarginPx::get() {
                self.preload_margin_px = margin;
            }
        }

        if translation::LocalTimeout::is_set() {
            if let Ok(timeout) = translation::LocalTimeout::get() {
                self.local_timeout_secs = timeout.as_secs();
            }
        }

        if translation::BridgeHandshakeTimeout::is_set() {
            if let Ok(timeout) = translation::BridgeHandshakeTimeout::get() {
                self.bridge_handshake_secs = timeout.as_secs();
            }
        }

        if translation::MaxElements::is_set() {
            if let Ok(max_elements) = translation::MaxElements::get() {
                self.max_elements = max_elements;
            }
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn local_timeout(&self) -> Duration {
        Duration::from_secs(self.local_timeout_secs)
    }

    pub fn bridge_handshake(&self) -> Duration {
        Duration::from_secs(self.bridge_handshake_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: EngineConfig,
}

impl ConfigManager {
    /// 按默认搜索路径加载配置
    pub fn new() -> TranslationResult<Self> {
        let mut config = Self::load_config()?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 从指定文件加载配置
    pub fn from_file(path: &str) -> TranslationResult<Self> {
        Self::load_dotenv();
        let expanded = shellexpand::tilde(path);
        let mut config = Self::load_from_file(&expanded)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    pub fn get_config(&self) -> &EngineConfig {
        &self.config
    }

    /// 以当前配置为基础，替换目标语言和服务地址
    pub fn config_for(&self, target_language: &str, api_url: Option<&str>) -> EngineConfig {
        let mut config = self.config.clone();
        config.target_language = target_language.to_lowercase();
        if let Some(url) = api_url {
            config.api_url = url.to_string();
        }
        config
    }

    fn load_config() -> TranslationResult<EngineConfig> {
        Self::load_dotenv();

        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(&expanded_path);
            }
        }

        tracing::debug!("未找到配置文件，使用默认配置");
        Ok(EngineConfig::default())
    }

    fn load_from_file(path: &str) -> TranslationResult<EngineConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranslationError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .map_err(|e| TranslationError::ConfigError(format!("解析JSON配置失败: {}", e)))
        } else {
            toml::from_str(&content)
                .map_err(|e| TranslationError::ConfigError(format!("解析TOML配置失败: {}", e)))
        }
    }

    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: &str) -> TranslationResult<()> {
        let config = EngineConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| TranslationError::ConfigError(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| TranslationError::ConfigError(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}
