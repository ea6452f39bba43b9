//! 跨上下文桥接
//!
//! 本地翻译能力不在当前执行上下文时，所有调用都通过桥接代理到另一端。
//! 请求带单调递增的 id，响应按 id 回到登记的等待方；
//! 首次调用前需要等到对端发出 `READY`。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch, OnceCell, RwLock};
use tokio::task::JoinHandle;

use super::local::{Availability, LocalEngine, LocalTranslator, TranslatorCache};
use crate::translation::config::EngineConfig;
use crate::translation::error::{helpers::bridge_error, TranslationError, TranslationResult};

/// 桥接消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeMessage {
    Ready,
    #[serde(rename_all = "camelCase")]
    CheckAvailability {
        id: u64,
        source_language: String,
        target_language: String,
    },
    AvailabilityResult {
        id: u64,
        availability: Availability,
    },
    DetectLanguage {
        id: u64,
        text: String,
    },
    DetectResult {
        id: u64,
        lang: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Translate {
        id: u64,
        texts: Vec<String>,
        source_language: String,
        target_language: String,
    },
    TranslateResult {
        id: u64,
        results: Vec<String>,
    },
    /// 单条完成通知，不需要应答
    #[serde(rename_all = "camelCase")]
    Progress {
        id: u64,
        index: usize,
        translated_text: String,
    },
    Error {
        id: u64,
        error: String,
    },
}

impl BridgeMessage {
    /// 应答类消息对应的请求 id
    fn response_id(&self) -> Option<u64> {
        match self {
            BridgeMessage::AvailabilityResult { id, .. }
            | BridgeMessage::DetectResult { id, .. }
            | BridgeMessage::TranslateResult { id, .. }
            | BridgeMessage::Error { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// 消息发送通道
#[async_trait]
pub trait BridgeTransport: Send + Sync {
    async fn post(&self, message: BridgeMessage) -> TranslationResult<()>;
}

/// 进程内传输，两端各持一个
#[derive(Clone)]
pub struct InProcessTransport {
    outgoing: mpsc::UnboundedSender<String>,
}

/// 桥接的一端：发送通道与接收队列
pub struct BridgeEndpoint {
    pub transport: Arc<InProcessTransport>,
    pub incoming: mpsc::UnboundedReceiver<BridgeMessage>,
}

impl InProcessTransport {
    /// 创建一对互联的端点
    pub fn pair() -> (BridgeEndpoint, BridgeEndpoint) {
        let (a_raw_tx, a_raw_rx) = mpsc::unbounded_channel::<String>();
        let (b_raw_tx, b_raw_rx) = mpsc::unbounded_channel::<String>();

        let a = BridgeEndpoint {
            transport: Arc::new(InProcessTransport { outgoing: a_raw_tx }),
            incoming: decode_stream(b_raw_rx),
        };
        let b = BridgeEndpoint {
            transport: Arc::new(InProcessTransport { outgoing: b_raw_tx }),
            incoming: decode_stream(a_raw_rx),
        };

        (a, b)
    }
}

#[async_trait]
impl BridgeTransport for InProcessTransport {
    async fn post(&self, message: BridgeMessage) -> TranslationResult<()> {
        // 走一遍 JSON，与真实的跨上下文通道保持同样的约束
        let raw = serde_json::to_string(&message)?;
        self.outgoing
            .send(raw)
            .map_err(|_| bridge_error("对端已关闭"))
    }
}

/// 把原始 JSON 队列解码成消息队列，无法解析的消息丢弃
fn decode_stream(
    mut raw: mpsc::UnboundedReceiver<String>,
) -> mpsc::UnboundedReceiver<BridgeMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(text) = raw.recv().await {
            match serde_json::from_str::<BridgeMessage>(&text) {
                Ok(message) => {
                    if tx.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::debug!("忽略无法解析的桥接消息: {}", e),
            }
        }
    });
    rx
}

type PendingRequests = HashMap<u64, oneshot::Sender<BridgeMessage>>;
type ProgressSinks = HashMap<u64, mpsc::UnboundedSender<(usize, String)>>;

/// 桥接调用方
pub struct BridgeClient {
    transport: Arc<dyn BridgeTransport>,
    request_id: AtomicU64,
    pending_requests: Arc<RwLock<PendingRequests>>,
    progress_sinks: Arc<RwLock<ProgressSinks>>,
    ready: watch::Receiver<bool>,
    listener: JoinHandle<()>,
}

impl BridgeClient {
    /// 创建客户端并启动监听任务
    pub fn new(
        transport: Arc<dyn BridgeTransport>,
        incoming: mpsc::UnboundedReceiver<BridgeMessage>,
    ) -> Arc<Self> {
        let pending_requests = Arc::new(RwLock::new(PendingRequests::new()));
        let progress_sinks = Arc::new(RwLock::new(ProgressSinks::new()));
        let (ready_tx, ready_rx) = watch::channel(false);

        let listener = tokio::spawn(Self::listen(
            incoming,
            Arc::clone(&pending_requests),
            Arc::clone(&progress_sinks),
            ready_tx,
        ));

        Arc::new(Self {
            transport,
            request_id: AtomicU64::new(1),
            pending_requests,
            progress_sinks,
            ready: ready_rx,
            listener,
        })
    }

    async fn listen(
        mut incoming: mpsc::UnboundedReceiver<BridgeMessage>,
        pending_requests: Arc<RwLock<PendingRequests>>,
        progress_sinks: Arc<RwLock<ProgressSinks>>,
        ready: watch::Sender<bool>,
    ) {
        while let Some(message) = incoming.recv().await {
            match message {
                BridgeMessage::Ready => {
                    tracing::debug!("桥接对端已就绪");
                    let _ = ready.send(true);
                }
                BridgeMessage::Progress {
                    id,
                    index,
                    translated_text,
                } => {
                    if let Some(sink) = progress_sinks.read().await.get(&id) {
                        let _ = sink.send((index, translated_text));
                    }
                }
                message => match message.response_id() {
                    Some(id) => {
                        if let Some(sender) = pending_requests.write().await.remove(&id) {
                            let _ = sender.send(message);
                        } else {
                            tracing::debug!("收到未登记请求的应答: {}", id);
                        }
                    }
                    None => tracing::debug!("客户端忽略请求类消息: {:?}", message),
                },
            }
        }

        // 对端关闭：放弃所有等待中的请求
        pending_requests.write().await.clear();
        progress_sinks.write().await.clear();
    }

    /// 等待 `READY` 握手，超时返回 `false`
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut ready = self.ready.clone();
        let handshake = async move { ready.wait_for(|is_ready| *is_ready).await.is_ok() };
        matches!(tokio::time::timeout(timeout, handshake).await, Ok(true))
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    fn guard(&self, id: u64) -> RequestGuard {
        RequestGuard {
            id,
            pending_requests: Arc::clone(&self.pending_requests),
            progress_sinks: Arc::clone(&self.progress_sinks),
        }
    }

    /// 发送请求并等待同 id 的应答
    ///
    /// 调用方在等待中途放弃（超时或取消）时，登记项随 future 一起移除。
    async fn request(&self, id: u64, message: BridgeMessage) -> TranslationResult<BridgeMessage> {
        let _guard = self.guard(id);
        let (tx, rx) = oneshot::channel();
        self.pending_requests.write().await.insert(id, tx);

        self.transport.post(message).await?;

        match rx.await {
            Ok(BridgeMessage::Error { error, .. }) => Err(TranslationError::LocalEngineError(error)),
            Ok(response) => Ok(response),
            Err(_) => Err(bridge_error("桥接已关闭，请求未得到应答")),
        }
    }

    pub async fn check_availability(
        &self,
        source: &str,
        target: &str,
    ) -> TranslationResult<Availability> {
        let id = self.next_id();
        let response = self
            .request(
                id,
                BridgeMessage::CheckAvailability {
                    id,
                    source_language: source.to_string(),
                    target_language: target.to_string(),
                },
            )
            .await?;

        match response {
            BridgeMessage::AvailabilityResult { availability, .. } => Ok(availability),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn detect_language(&self, text: &str) -> TranslationResult<Option<String>> {
        let id = self.next_id();
        let response = self
            .request(
                id,
                BridgeMessage::DetectLanguage {
                    id,
                    text: text.to_string(),
                },
            )
            .await?;

        match response {
            BridgeMessage::DetectResult { lang, .. } => Ok(lang),
            other => Err(unexpected(&other)),
        }
    }

    /// 批量翻译；对端的 `PROGRESS` 通知转发到 `progress`
    pub async fn translate(
        &self,
        texts: &[String],
        source: &str,
        target: &str,
        progress: mpsc::UnboundedSender<(usize, String)>,
    ) -> TranslationResult<Vec<String>> {
        let id = self.next_id();
        let _guard = self.guard(id);
        self.progress_sinks.write().await.insert(id, progress);

        let response = self
            .request(
                id,
                BridgeMessage::Translate {
                    id,
                    texts: texts.to_vec(),
                    source_language: source.to_string(),
                    target_language: target.to_string(),
                },
            )
            .await;

        match response? {
            BridgeMessage::TranslateResult { results, .. } => Ok(results),
            other => Err(unexpected(&other)),
        }
    }

    /// 当前等待应答的请求数
    pub async fn pending_count(&self) -> usize {
        self.pending_requests.read().await.len()
    }

    /// 当前登记的进度通道数
    pub async fn progress_sink_count(&self) -> usize {
        self.progress_sinks.read().await.len()
    }
}

/// 请求结束时移除 id 对应的应答等待方和进度通道
struct RequestGuard {
    id: u64,
    pending_requests: Arc<RwLock<PendingRequests>>,
    progress_sinks: Arc<RwLock<ProgressSinks>>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let id = self.id;
        if let (Ok(mut pending), Ok(mut sinks)) =
            (self.pending_requests.try_write(), self.progress_sinks.try_write())
        {
            pending.remove(&id);
            sinks.remove(&id);
            return;
        }

        // 锁被占用时交给后台任务
        let pending_requests = Arc::clone(&self.pending_requests);
        let progress_sinks = Arc::clone(&self.progress_sinks);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                pending_requests.write().await.remove(&id);
                progress_sinks.write().await.remove(&id);
            });
        }
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

fn unexpected(message: &BridgeMessage) -> TranslationError {
    bridge_error(format!("意外的应答类型: {:?}", message))
}

/// 经由桥接访问的本地引擎
pub struct BridgeLocalEngine {
    client: Arc<BridgeClient>,
    handshake_timeout: Duration,
    /// 第一次握手的结果，失败后不再重复等待
    handshake: OnceCell<bool>,
}

impl BridgeLocalEngine {
    pub fn new(client: Arc<BridgeClient>, handshake_timeout: Duration) -> Self {
        Self {
            client,
            handshake_timeout,
            handshake: OnceCell::new(),
        }
    }

    pub fn from_config(client: Arc<BridgeClient>, config: &EngineConfig) -> Self {
        Self::new(client, config.bridge_handshake())
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    async fn ensure_ready(&self) -> TranslationResult<()> {
        let handshake_ok = *self
            .handshake
            .get_or_init(|| self.client.wait_ready(self.handshake_timeout))
            .await;

        // 对端晚于握手超时才就绪时仍然可用
        if handshake_ok || self.client.is_ready() {
            Ok(())
        } else {
            Err(bridge_error(format!(
                "{:?} 内未完成就绪握手",
                self.handshake_timeout
            )))
        }
    }
}

#[async_trait]
impl LocalEngine for BridgeLocalEngine {
    async fn check_availability(
        &self,
        source: &str,
        target: &str,
    ) -> TranslationResult<Availability> {
        if let Err(e) = self.ensure_ready().await {
            tracing::warn!("桥接不可用，视为本地引擎不可用: {}", e);
            return Ok(Availability::Unavailable);
        }
        self.client.check_availability(source, target).await
    }

    async fn detect_language(&self, sample: &str) -> TranslationResult<Option<String>> {
        self.ensure_ready().await?;
        self.client.detect_language(sample).await
    }

    async fn create_translator(
        &self,
        source: &str,
        target: &str,
    ) -> TranslationResult<Arc<dyn LocalTranslator>> {
        self.ensure_ready().await?;
        Ok(Arc::new(BridgeTranslator {
            client: Arc::clone(&self.client),
            source: source.to_string(),
            target: target.to_string(),
        }))
    }
}

/// 对端翻译器的代理
struct BridgeTranslator {
    client: Arc<BridgeClient>,
    source: String,
    target: String,
}

#[async_trait]
impl LocalTranslator for BridgeTranslator {
    async fn translate(&self, text: &str) -> TranslationResult<String> {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut results = self
            .client
            .translate(&[text.to_string()], &self.source, &self.target, tx)
            .await?;
        results
            .pop()
            .ok_or_else(|| bridge_error("翻译应答为空"))
    }

    async fn translate_batch(
        &self,
        texts: &[String],
        progress: mpsc::UnboundedSender<(usize, String)>,
    ) -> TranslationResult<Vec<String>> {
        self.client
            .translate(texts, &self.source, &self.target, progress)
            .await
    }
}

/// 桥接服务端：在本地能力所在的上下文中响应请求
pub struct BridgeHost {
    engine: Arc<dyn LocalEngine>,
    transport: Arc<dyn BridgeTransport>,
    translators: Arc<TranslatorCache>,
}

impl BridgeHost {
    pub fn new(engine: Arc<dyn LocalEngine>, transport: Arc<dyn BridgeTransport>) -> Self {
        Self {
            engine,
            transport,
            translators: Arc::new(TranslatorCache::new()),
        }
    }

    /// 在后台任务中运行
    pub fn spawn(self, incoming: mpsc::UnboundedReceiver<BridgeMessage>) -> JoinHandle<()> {
        tokio::spawn(self.serve(incoming))
    }

    /// 发出 `READY` 后处理请求，直到对端关闭
    pub async fn serve(self, mut incoming: mpsc::UnboundedReceiver<BridgeMessage>) {
        if let Err(e) = self.transport.post(BridgeMessage::Ready).await {
            tracing::warn!("发送就绪消息失败: {}", e);
            return;
        }

        while let Some(message) = incoming.recv().await {
            let engine = Arc::clone(&self.engine);
            let transport = Arc::clone(&self.transport);
            let translators = Arc::clone(&self.translators);

            tokio::spawn(async move {
                if let Some(reply) =
                    Self::handle(engine.as_ref(), transport.as_ref(), &translators, message).await
                {
                    if let Err(e) = transport.post(reply).await {
                        tracing::debug!("发送桥接应答失败: {}", e);
                    }
                }
            });
        }
    }

    async fn handle(
        engine: &dyn LocalEngine,
        transport: &dyn BridgeTransport,
        translators: &TranslatorCache,
        message: BridgeMessage,
    ) -> Option<BridgeMessage> {
        let reply = match message {
            BridgeMessage::CheckAvailability {
                id,
                source_language,
                target_language,
            } => engine
                .check_availability(&source_language, &target_language)
                .await
                .map(|availability| BridgeMessage::AvailabilityResult { id, availability })
                .unwrap_or_else(|e| error_reply(id, e)),

            BridgeMessage::DetectLanguage { id, text } => engine
                .detect_language(&text)
                .await
                .map(|lang| BridgeMessage::DetectResult { id, lang })
                .unwrap_or_else(|e| error_reply(id, e)),

            BridgeMessage::Translate {
                id,
                texts,
                source_language,
                target_language,
            } => {
                let translator = match translators
                    .get_or_create(engine, &source_language, &target_language)
                    .await
                {
                    Ok(translator) => translator,
                    Err(e) => return Some(error_reply(id, e)),
                };

                let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<(usize, String)>();
                let forward = async {
                    while let Some((index, translated_text)) = progress_rx.recv().await {
                        let _ = transport
                            .post(BridgeMessage::Progress {
                                id,
                                index,
                                translated_text,
                            })
                            .await;
                    }
                };

                let (result, _) = tokio::join!(translator.translate_batch(&texts, progress_tx), forward);

                result
                    .map(|results| BridgeMessage::TranslateResult { id, results })
                    .unwrap_or_else(|e| error_reply(id, e))
            }

            other => {
                tracing::debug!("服务端忽略消息: {:?}", other);
                return None;
            }
        };

        Some(reply)
    }
}

fn error_reply(id: u64, error: TranslationError) -> BridgeMessage {
    BridgeMessage::Error {
        id,
        error: error.message(),
    }
}
