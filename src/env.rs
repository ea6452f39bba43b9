//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问，所有变量使用 `XPLAINO_` 前缀。

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    /// 变量是否被显式设置
    fn is_set() -> bool {
        env::var(Self::NAME).is_ok()
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "XPLAINO_LOG_LEVEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }

    /// 禁用颜色输出
    pub struct NoColor;
    impl EnvVar<bool> for NoColor {
        const NAME: &'static str = "NO_COLOR";
        const DEFAULT: Option<bool> = Some(false);
        const DESCRIPTION: &'static str = "Disable colored output when set to any value";

        fn parse(value: &str) -> EnvResult<bool> {
            Ok(!value.is_empty())
        }
    }
}

/// 翻译相关环境变量
pub mod translation {
    use super::*;

    /// 目标语言
    pub struct TargetLang;
    impl EnvVar<String> for TargetLang {
        const NAME: &'static str = "XPLAINO_TARGET_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Target language for translation (ISO 639-1 code)";

        fn parse(value: &str) -> EnvResult<String> {
            parse_language_code(value, Self::NAME)
        }
    }

    /// 无法从页面和检测得到源语言时使用的默认源语言
    pub struct DefaultSourceLang;
    impl EnvVar<String> for DefaultSourceLang {
        const NAME: &'static str = "XPLAINO_DEFAULT_SOURCE_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Fallback source language (ISO 639-1 code)";

        fn parse(value: &str) -> EnvResult<String> {
            parse_language_code(value, Self::NAME)
        }
    }

    /// 流式翻译服务地址
    pub struct ApiUrl;
    impl EnvVar<String> for ApiUrl {
        const NAME: &'static str = "XPLAINO_API_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Streaming translation service endpoint URL";

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(url.to_string())
            } else {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "API URL must start with http:// or https://".to_string(),
                })
            }
        }
    }

    /// 访问令牌
    pub struct AccessToken;
    impl EnvVar<String> for AccessToken {
        const NAME: &'static str = "XPLAINO_ACCESS_TOKEN";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Bearer credential for the translation service";

        fn parse(value: &str) -> EnvResult<String> {
            let token = value.trim();
            if token.is_empty() {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Token must not be empty".to_string(),
                })
            } else {
                Ok(token.to_string())
            }
        }
    }

    /// 显示模式
    pub struct DisplayMode;
    impl EnvVar<String> for DisplayMode {
        const NAME: &'static str = "XPLAINO_DISPLAY_MODE";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Display mode: append or replace";

        fn parse(value: &str) -> EnvResult<String> {
            match value.trim().to_lowercase().as_str() {
                mode @ ("append" | "replace") => Ok(mode.to_string()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!("Invalid display mode '{}'. Use: append, replace", value),
                }),
            }
        }
    }

    /// 每批条目数
    pub struct BatchSize;
    impl EnvVar<usize> for BatchSize {
        const NAME: &'static str = "XPLAINO_BATCH_SIZE";
        const DEFAULT: Option<usize> = Some(15);
        const DESCRIPTION: &'static str = "Number of elements per translation request";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 200)
        }
    }

    /// 可见性事件去抖窗口
    pub struct DebounceMs;
    impl EnvVar<u64> for DebounceMs {
        const NAME: &'static str = "XPLAINO_DEBOUNCE_MS";
        const DEFAULT: Option<u64> = Some(100);
        const DESCRIPTION: &'static str = "Debounce window for visibility bursts in milliseconds";

        fn parse(value: &str) -> EnvResult<u64> {
            parse_positive_usize(value, Self::NAME, 1, 10_000).map(|v| v as u64)
        }
    }

    /// 视口预加载边距
    pub struct PreloadMarginPx;
    impl EnvVar<u32> for PreloadMarginPx {
        const NAME: &'static str = "XPLAINO_PRELOAD_MARGIN_PX";
        const DEFAULT: Option<u32> = Some(300);
        const DESCRIPTION: &'static str = "Distance outside the viewport treated as visible";

        fn parse(value: &str) -> EnvResult<u32> {
            parse_positive_usize(value, Self::NAME, 0, 10_000).map(|v| v as u32)
        }
    }

    /// 本地引擎整批超时
    pub struct LocalTimeout;
    impl EnvVar<Duration> for LocalTimeout {
        const NAME: &'static str = "XPLAINO_LOCAL_TIMEOUT";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(15));
        const DESCRIPTION: &'static str = "Local engine timeout per batch in seconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_seconds(value, Self::NAME, 300)
        }
    }

    /// 桥接握手超时
    pub struct BridgeHandshakeTimeout;
    impl EnvVar<Duration> for BridgeHandshakeTimeout {
        const NAME: &'static str = "XPLAINO_BRIDGE_HANDSHAKE_TIMEOUT";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(5));
        const DESCRIPTION: &'static str = "Bridge ready handshake timeout in seconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_seconds(value, Self::NAME, 60)
        }
    }

    /// 单次提取的元素上限
    pub struct MaxElements;
    impl EnvVar<usize> for MaxElements {
        const NAME: &'static str = "XPLAINO_MAX_ELEMENTS";
        const DEFAULT: Option<usize> = Some(2000);
        const DESCRIPTION: &'static str = "Maximum number of elements extracted per page";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 100_000)
        }
    }
}

/// 辅助函数
fn parse_language_code(value: &str, var_name: &str) -> EnvResult<String> {
    let lang = value.trim().to_lowercase();
    if lang.len() == 2 && lang.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(lang)
    } else {
        Err(EnvError {
            variable: var_name.to_string(),
            message: "Language code must be 2 letters (ISO 639-1)".to_string(),
        })
    }
}

fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

fn parse_seconds(value: &str, var_name: &str, max: u64) -> EnvResult<Duration> {
    let seconds: u64 = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid number of seconds".to_string(),
    })?;

    if seconds == 0 || seconds > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Timeout must be between 1 and {} seconds", max),
        });
    }

    Ok(Duration::from_secs(seconds))
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let mut docs = String::new();
    docs.push_str("# Environment Variables\n\n");

    let entries: &[(&str, &str)] = &[
        (core::LogLevel::NAME, core::LogLevel::DESCRIPTION),
        (core::NoColor::NAME, core::NoColor::DESCRIPTION),
        (translation::TargetLang::NAME, translation::TargetLang::DESCRIPTION),
        (translation::DefaultSourceLang::NAME, translation::DefaultSourceLang::DESCRIPTION),
        (translation::ApiUrl::NAME, translation::ApiUrl::DESCRIPTION),
        (translation::AccessToken::NAME, translation::AccessToken::DESCRIPTION),
        (translation::DisplayMode::NAME, translation::DisplayMode::DESCRIPTION),
        (translation::BatchSize::NAME, translation::BatchSize::DESCRIPTION),
        (translation::DebounceMs::NAME, translation::DebounceMs::DESCRIPTION),
        (translation::PreloadMarginPx::NAME, translation::PreloadMarginPx::DESCRIPTION),
        (translation::LocalTimeout::NAME, translation::LocalTimeout::DESCRIPTION),
        (
            translation::BridgeHandshakeTimeout::NAME,
            translation::BridgeHandshakeTimeout::DESCRIPTION,
        ),
        (translation::MaxElements::NAME, translation::MaxElements::DESCRIPTION),
    ];

    for (name, description) in entries {
        docs.push_str(&format!("- `{}`: {}\n", name, description));
    }

    docs
}
