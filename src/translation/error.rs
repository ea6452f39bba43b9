//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。
//!
//! 并非所有错误都会让用户看到：本地引擎不可用或超时只会触发降级到网络服务，
//! 取消属于正常结束路径，认证失败单独作为"需要登录"信号上报。

use std::fmt;

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 网络错误
    #[error("网络错误: {0}")]
    NetworkError(String),

    /// 事件流读取或解析错误
    #[error("事件流错误: {0}")]
    StreamError(String),

    /// 翻译服务返回的错误帧
    #[error("翻译服务错误 [{code}]: {message}")]
    ServiceError { code: String, message: String },

    /// 凭证失效且刷新后仍被拒绝
    #[error("需要重新登录")]
    AuthenticationRequired,

    /// 超时错误
    #[error("操作超时: {0}")]
    TimeoutError(String),

    /// 本地翻译引擎错误
    #[error("本地翻译引擎错误: {0}")]
    LocalEngineError(String),

    /// 跨上下文桥接错误
    #[error("桥接通道错误: {0}")]
    BridgeError(String),

    /// 节点已脱离文档
    #[error("节点已脱离文档: {0}")]
    DetachedNode(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 操作被取消
    #[error("操作已取消")]
    Cancelled,

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 对外上报使用的错误码
    pub fn error_code(&self) -> String {
        match self {
            TranslationError::ServiceError { code, .. } => code.clone(),
            TranslationError::ConfigError(_) => "CONFIG_ERROR".to_string(),
            TranslationError::NetworkError(_) => "NETWORK_ERROR".to_string(),
            TranslationError::StreamError(_) => "STREAM_ERROR".to_string(),
            TranslationError::AuthenticationRequired => "LOGIN_REQUIRED".to_string(),
            TranslationError::TimeoutError(_) => "TIMEOUT".to_string(),
            TranslationError::LocalEngineError(_) => "LOCAL_ENGINE_ERROR".to_string(),
            TranslationError::BridgeError(_) => "BRIDGE_ERROR".to_string(),
            TranslationError::DetachedNode(_) => "DETACHED_NODE".to_string(),
            TranslationError::SerializationError(_) => "SERIALIZATION_ERROR".to_string(),
            TranslationError::InvalidInput(_) => "INVALID_INPUT".to_string(),
            TranslationError::Cancelled => "CANCELLED".to_string(),
            TranslationError::InternalError(_) => "INTERNAL_ERROR".to_string(),
        }
    }

    /// 错误描述（不含错误码）
    pub fn message(&self) -> String {
        match self {
            TranslationError::ServiceError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::Cancelled => ErrorSeverity::Info,
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
            TranslationError::LocalEngineError(_) => ErrorSeverity::Warning,
            TranslationError::BridgeError(_) => ErrorSeverity::Warning,
            TranslationError::TimeoutError(_) => ErrorSeverity::Warning,
            TranslationError::DetachedNode(_) => ErrorSeverity::Warning,
            TranslationError::AuthenticationRequired => ErrorSeverity::Warning,
            TranslationError::NetworkError(_) => ErrorSeverity::Error,
            TranslationError::StreamError(_) => ErrorSeverity::Error,
            TranslationError::ServiceError { .. } => ErrorSeverity::Error,
            TranslationError::SerializationError(_) => ErrorSeverity::Error,
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(self, context: T) -> Self {
        let new_msg = format!("{} (上下文: {})", self.message(), context);

        match self {
            TranslationError::ConfigError(_) => TranslationError::ConfigError(new_msg),
            TranslationError::NetworkError(_) => TranslationError::NetworkError(new_msg),
            TranslationError::StreamError(_) => TranslationError::StreamError(new_msg),
            TranslationError::ServiceError { code, .. } => TranslationError::ServiceError {
                code,
                message: new_msg,
            },
            TranslationError::TimeoutError(_) => TranslationError::TimeoutError(new_msg),
            TranslationError::LocalEngineError(_) => TranslationError::LocalEngineError(new_msg),
            TranslationError::BridgeError(_) => TranslationError::BridgeError(new_msg),
            TranslationError::DetachedNode(_) => TranslationError::DetachedNode(new_msg),
            TranslationError::SerializationError(_) => {
                TranslationError::SerializationError(new_msg)
            }
            TranslationError::InvalidInput(_) => TranslationError::InvalidInput(new_msg),
            TranslationError::InternalError(_) => TranslationError::InternalError(new_msg),
            other @ (TranslationError::AuthenticationRequired | TranslationError::Cancelled) => {
                other
            }
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TranslationError::TimeoutError(format!("请求超时: {}", error))
        } else {
            TranslationError::NetworkError(error.to_string())
        }
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误
    pub fn log_error(error: &TranslationError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!("翻译错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("翻译严重错误: {}", error),
        }
    }

    /// 创建配置错误
    pub fn config_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::ConfigError(msg.to_string())
    }

    /// 创建桥接错误
    pub fn bridge_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::BridgeError(msg.to_string())
    }
}
