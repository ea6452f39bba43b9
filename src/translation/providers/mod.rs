//! 翻译服务层
//!
//! 两级策略：
//! - **local**: 设备端翻译引擎，按语言对查询可用性，可以经由 `bridge` 跨上下文调用
//! - **network**: 流式网络翻译服务，本地不可用、语言对不支持或超时时使用
//!
//! 无论由哪一级完成，调用方拿到的都是同一种事件流：若干 `Progress`，
//! 然后恰好一个终止事件。

pub mod bridge;
pub mod local;
pub mod network;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use bridge::{
    BridgeClient, BridgeEndpoint, BridgeHost, BridgeLocalEngine, BridgeMessage, BridgeTransport,
    InProcessTransport,
};
pub use local::{Availability, LocalEngine, LocalTranslator, TranslatorCache};
pub use network::{CredentialProvider, NetworkTranslator, StaticCredentials};

use crate::translation::config::{constants, EngineConfig};
use crate::translation::error::TranslationError;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 单条待翻译文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationItem {
    pub id: String,
    pub text: String,
}

/// 一批翻译请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub items: Vec<TranslationItem>,
    /// 页面声明的源语言
    pub source_language: Option<String>,
    pub target_language: String,
}

impl TranslationRequest {
    pub fn new(items: Vec<TranslationItem>, target_language: &str) -> Self {
        Self {
            items,
            source_language: None,
            target_language: target_language.to_string(),
        }
    }

    pub fn with_source_language(mut self, source_language: Option<String>) -> Self {
        self.source_language = source_language;
        self
    }
}

/// 翻译事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationEvent {
    Progress { id: String, translated_text: String },
    Completed { results: HashMap<String, String> },
    Failed { code: String, message: String },
    LoginRequired,
    Cancelled,
}

impl TranslationEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TranslationEvent::Progress { .. })
    }

    pub fn failed(error: &TranslationError) -> Self {
        TranslationEvent::Failed {
            code: error.error_code(),
            message: error.message(),
        }
    }
}

/// 流式翻译服务（第二级）
///
/// 实现必须先发送零个或多个 `Progress`，再发送恰好一个终止事件。
#[async_trait]
pub trait RemoteTranslator: Send + Sync {
    async fn translate_stream(
        &self,
        request: TranslationRequest,
        events: mpsc::Sender<TranslationEvent>,
        cancel: CancellationToken,
    );
}

/// 服务层参数
#[derive(Debug, Clone)]
pub struct TierConfig {
    pub local_timeout: Duration,
    pub default_source_language: String,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            local_timeout: constants::DEFAULT_LOCAL_TIMEOUT,
            default_source_language: constants::DEFAULT_SOURCE_LANGUAGE.to_string(),
        }
    }
}

impl From<&EngineConfig> for TierConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            local_timeout: config.local_timeout(),
            default_source_language: config.default_source_language.clone(),
        }
    }
}

/// 本地尝试的结果
enum LocalOutcome {
    Done,
    Cancelled,
    Fallback(String),
}

/// 两级翻译服务
pub struct ProviderTier {
    local: Option<Arc<dyn LocalEngine>>,
    remote: Arc<dyn RemoteTranslator>,
    cache: TranslatorCache,
    config: TierConfig,
}

impl ProviderTier {
    pub fn new(
        local: Option<Arc<dyn LocalEngine>>,
        remote: Arc<dyn RemoteTranslator>,
        config: TierConfig,
    ) -> Self {
        Self {
            local,
            remote,
            cache: TranslatorCache::new(),
            config,
        }
    }

    /// 只使用网络服务
    pub fn network_only(remote: Arc<dyn RemoteTranslator>, config: TierConfig) -> Self {
        Self::new(None, remote, config)
    }

    pub fn translator_cache(&self) -> &TranslatorCache {
        &self.cache
    }

    /// 清空本地翻译器缓存
    pub async fn reset(&self) {
        self.cache.reset().await;
    }

    /// 翻译一批文本，通过返回的通道流式获取结果
    pub fn translate_with_fallback(
        self: &Arc<Self>,
        request: TranslationRequest,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<TranslationEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let tier = Arc::clone(self);

        tokio::spawn(async move {
            tier.run(request, tx, cancel).await;
        });

        rx
    }

    async fn run(
        &self,
        request: TranslationRequest,
        tx: mpsc::Sender<TranslationEvent>,
        cancel: CancellationToken,
    ) {
        if cancel.is_cancelled() {
            let _ = tx.send(TranslationEvent::Cancelled).await;
            return;
        }

        let mut results: HashMap<String, String> = HashMap::new();

        if request.items.is_empty() {
            let _ = tx.send(TranslationEvent::Completed { results }).await;
            return;
        }

        if let Some(engine) = &self.local {
            let attempt = self.try_local(engine.as_ref(), &request, &tx, &cancel, &mut results);
            let outcome = match tokio::time::timeout(self.config.local_timeout, attempt).await {
                Ok(outcome) => outcome,
                Err(_) => LocalOutcome::Fallback(format!(
                    "本地翻译超过 {:?} 未完成",
                    self.config.local_timeout
                )),
            };

            match outcome {
                LocalOutcome::Done => {
                    let missing = request.items.len().saturating_sub(results.len());
                    if missing > 0 {
                        tracing::warn!("本地翻译缺少 {} 条结果，交给网络服务补齐", missing);
                    }
                }
                LocalOutcome::Cancelled => {
                    let _ = tx.send(TranslationEvent::Cancelled).await;
                    return;
                }
                LocalOutcome::Fallback(reason) => {
                    tracing::warn!(
                        "本地翻译不可用，改用网络服务 ({} 条已完成): {}",
                        results.len(),
                        reason
                    );
                }
            }
        }

        self.run_remote(request, results, tx, cancel).await;
    }

    /// 第一级：本地引擎
    async fn try_local(
        &self,
        engine: &dyn LocalEngine,
        request: &TranslationRequest,
        tx: &mpsc::Sender<TranslationEvent>,
        cancel: &CancellationToken,
        results: &mut HashMap<String, String>,
    ) -> LocalOutcome {
        let target = request.target_language.to_lowercase();
        let source = self.resolve_source_language(engine, request).await;

        if source == target {
            return LocalOutcome::Fallback(format!("源语言与目标语言相同: {}", source));
        }

        match engine.check_availability(&source, &target).await {
            Ok(Availability::Unavailable) => {
                return LocalOutcome::Fallback(format!("语言对 {}-{} 不受支持", source, target));
            }
            Ok(availability) => {
                tracing::debug!("本地引擎 {}-{}: {:?}", source, target, availability);
            }
            Err(e) => return LocalOutcome::Fallback(e.to_string()),
        }

        let translator = match self.cache.get_or_create(engine, &source, &target).await {
            Ok(translator) => translator,
            Err(e) => return LocalOutcome::Fallback(e.to_string()),
        };

        let texts: Vec<String> = request.items.iter().map(|item| item.text.clone()).collect();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let batch = translator.translate_batch(&texts, progress_tx);
        tokio::pin!(batch);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return LocalOutcome::Cancelled,
                Some((index, text)) = progress_rx.recv() => {
                    record_result(request, index, text, results, tx).await;
                }
                outcome = &mut batch => {
                    while let Ok((index, text)) = progress_rx.try_recv() {
                        record_result(request, index, text, results, tx).await;
                    }
                    return match outcome {
                        Ok(all) => {
                            for (index, text) in all.into_iter().enumerate() {
                                record_result(request, index, text, results, tx).await;
                            }
                            LocalOutcome::Done
                        }
                        Err(e) => LocalOutcome::Fallback(e.to_string()),
                    };
                }
            }
        }
    }

    /// 页面声明 → 本地检测 → 默认值
    async fn resolve_source_language(
        &self,
        engine: &dyn LocalEngine,
        request: &TranslationRequest,
    ) -> String {
        if let Some(lang) = request.source_language.as_deref().filter(|l| !l.is_empty()) {
            return lang.to_lowercase();
        }

        let sample = detection_sample(&request.items);
        match engine.detect_language(&sample).await {
            Ok(Some(lang)) if !lang.is_empty() => lang.to_lowercase(),
            Ok(_) => self.config.default_source_language.clone(),
            Err(e) => {
                tracing::debug!("语言检测失败，使用默认源语言: {}", e);
                self.config.default_source_language.clone()
            }
        }
    }

    /// 第二级：网络服务，只发送本地尚未完成的条目
    async fn run_remote(
        &self,
        request: TranslationRequest,
        mut results: HashMap<String, String>,
        tx: mpsc::Sender<TranslationEvent>,
        cancel: CancellationToken,
    ) {
        let remaining: Vec<TranslationItem> = request
            .items
            .iter()
            .filter(|item| !results.contains_key(&item.id))
            .cloned()
            .collect();

        if remaining.is_empty() {
            let _ = tx.send(TranslationEvent::Completed { results }).await;
            return;
        }

        let sub_request = TranslationRequest {
            items: remaining,
            ..request
        };

        let (inner_tx, mut inner_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let remote = self.remote.translate_stream(sub_request, inner_tx, cancel);

        let forward = async {
            let mut terminated = false;
            while let Some(event) = inner_rx.recv().await {
                if terminated {
                    continue;
                }
                match event {
                    TranslationEvent::Progress { id, translated_text } => {
                        if results.contains_key(&id) {
                            continue;
                        }
                        results.insert(id.clone(), translated_text.clone());
                        let _ = tx
                            .send(TranslationEvent::Progress { id, translated_text })
                            .await;
                    }
                    TranslationEvent::Completed { results: streamed } => {
                        for (id, text) in streamed {
                            results.entry(id).or_insert(text);
                        }
                        let _ = tx
                            .send(TranslationEvent::Completed {
                                results: std::mem::take(&mut results),
                            })
                            .await;
                        terminated = true;
                    }
                    terminal => {
                        let _ = tx.send(terminal).await;
                        terminated = true;
                    }
                }
            }

            if !terminated {
                let _ = tx
                    .send(TranslationEvent::Failed {
                        code: "STREAM_ERROR".to_string(),
                        message: "翻译服务未发送结束事件".to_string(),
                    })
                    .await;
            }
        };

        tokio::join!(remote, forward);
    }
}

/// 记录一条本地结果；同一 id 只上报一次
async fn record_result(
    request: &TranslationRequest,
    index: usize,
    text: String,
    results: &mut HashMap<String, String>,
    tx: &mpsc::Sender<TranslationEvent>,
) {
    let Some(item) = request.items.get(index) else {
        return;
    };
    if text.is_empty() || results.contains_key(&item.id) {
        return;
    }

    results.insert(item.id.clone(), text.clone());
    let _ = tx
        .send(TranslationEvent::Progress {
            id: item.id.clone(),
            translated_text: text,
        })
        .await;
}

/// 语言检测样本
fn detection_sample(items: &[TranslationItem]) -> String {
    let joined = items
        .iter()
        .take(constants::DETECTION_SAMPLE_ITEMS)
        .map(|item| item.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    joined.chars().take(constants::DETECTION_SAMPLE_CHARS).collect()
}
