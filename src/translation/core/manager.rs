//! 翻译管理器
//!
//! 串联提取、视口调度、批次翻译和 DOM 修改，维护会话状态机：
//!
//! ```text
//! idle → translating → { fully-translated | partially-translated }
//! ```
//!
//! 停止后不会自动恢复，只能重新调用 `translate_page`。
//! DOM 句柄是 `Rc`，所有方法都必须在 `tokio::task::LocalSet` 中调用。

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use markup5ever_rcdom::Handle;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::mutator::DomMutator;
use super::session::{DisplayMode, SessionState, TranslationSession, ViewMode};
use crate::parsers::html::get_page_language;
use crate::translation::config::EngineConfig;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::batch::{BatchTranslator, PassOutcome};
use crate::translation::pipeline::extractor::{ExtractorConfig, TextExtractor};
use crate::translation::pipeline::scheduler::{LayoutProvider, Viewport, ViewportScheduler};
use crate::translation::providers::ProviderTier;

const EVENT_CAPACITY: usize = 256;

/// 会话事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    Progress { translated: usize, total: usize },
    Error { code: String, message: String },
    LoginRequired,
}

struct ManagerInner {
    document: Handle,
    provider: Arc<ProviderTier>,
    layout: Rc<dyn LayoutProvider>,
    viewport: watch::Receiver<Viewport>,
    config: EngineConfig,
    mutator: DomMutator,
    batch: BatchTranslator,

    session: RefCell<TranslationSession>,
    scheduler: RefCell<ViewportScheduler>,
    cancel: RefCell<CancellationToken>,
    driver: RefCell<Option<JoinHandle<()>>>,
    driver_running: Cell<bool>,
    active_waves: Cell<usize>,

    events: broadcast::Sender<SessionEvent>,
    settled: Notify,
}

/// 翻译管理器
#[derive(Clone)]
pub struct TranslationManager {
    inner: Rc<ManagerInner>,
}

impl TranslationManager {
    pub fn new(
        document: Handle,
        provider: Arc<ProviderTier>,
        layout: Rc<dyn LayoutProvider>,
        viewport: watch::Receiver<Viewport>,
        config: EngineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut scheduler = ViewportScheduler::new(config.preload_margin_px);
        scheduler.disconnect();

        let inner = ManagerInner {
            document,
            provider,
            layout,
            viewport,
            mutator: DomMutator::new(&config.accent_color),
            batch: BatchTranslator::new(config.batch_size),
            config,

            session: RefCell::new(TranslationSession::default()),
            scheduler: RefCell::new(scheduler),
            cancel: RefCell::new(CancellationToken::new()),
            driver: RefCell::new(None),
            driver_running: Cell::new(false),
            active_waves: Cell::new(0),

            events,
            settled: Notify::new(),
        };

        Self {
            inner: Rc::new(inner),
        }
    }

    /// 开始翻译页面，返回提取到的元素数
    ///
    /// 已有会话时先完整清理再重新开始。
    pub fn translate_page(
        &self,
        target_language: &str,
        mode: DisplayMode,
    ) -> TranslationResult<usize> {
        let target_language = target_language.trim().to_lowercase();
        if target_language.is_empty() {
            return Err(TranslationError::InvalidInput("目标语言不能为空".to_string()));
        }

        let inner = &self.inner;
        let restarting = {
            let session = inner.session.borrow();
            !session.elements.is_empty() || session.state != SessionState::Idle
        };
        if restarting {
            tracing::info!("重新开始翻译，清理上一个会话");
            self.clear_translations();
        }

        let elements = TextExtractor::new(ExtractorConfig::with_max_elements(
            inner.config.max_elements,
        ))
        .extract(&inner.document);
        let count = elements.len();
        let source_language = get_page_language(&inner.document);

        tracing::info!(
            "开始翻译: {} 个元素, {} -> {}, 模式 {:?}",
            count,
            source_language.as_deref().unwrap_or("auto"),
            target_language,
            mode
        );

        *inner.session.borrow_mut() =
            TranslationSession::new(elements, mode, &target_language, source_language);

        if count == 0 {
            inner.set_state(SessionState::Idle);
            return Ok(0);
        }

        let cancel = CancellationToken::new();
        *inner.cancel.borrow_mut() = cancel.clone();

        let mut scheduler = ViewportScheduler::new(inner.config.preload_margin_px);
        scheduler.observe(0..count);
        *inner.scheduler.borrow_mut() = scheduler;

        inner.set_state(SessionState::Translating);

        inner.driver_running.set(true);
        let handle = tokio::task::spawn_local(drive(Rc::clone(inner), cancel));
        *inner.driver.borrow_mut() = Some(handle);

        Ok(count)
    }

    /// 停止翻译：取消进行中的请求并断开观察
    pub fn stop_translation(&self) {
        let inner = &self.inner;
        inner.cancel.borrow().cancel();
        inner.stop_driver();
        inner.scheduler.borrow_mut().disconnect();
        inner.session.borrow_mut().pending.clear();

        let state = inner.session.borrow().state;
        if state == SessionState::Translating {
            let settled = inner.session.borrow().settled_state();
            tracing::info!(
                "翻译已停止，已完成 {} 个元素",
                inner.session.borrow().translated_count()
            );
            inner.set_state(settled);
        }
        inner.settled.notify_waiters();
    }

    /// 切换原文/译文显示，不改变会话状态
    pub fn toggle_view(&self, view: ViewMode) {
        let mut session = self.inner.session.borrow_mut();
        session.view_mode = view;
        let mode = session.mode;
        let skipped = self
            .inner
            .mutator
            .toggle_view(&mut session.elements, mode, view);
        tracing::debug!("切换视图为 {:?}，跳过 {} 个元素", view, skipped);
    }

    /// 撤销全部修改并回到 idle
    pub fn clear_translations(&self) {
        let inner = &self.inner;
        inner.cancel.borrow().cancel();
        inner.stop_driver();
        inner.scheduler.borrow_mut().disconnect();

        {
            let mut session = inner.session.borrow_mut();
            inner.mutator.clear(&mut session.elements);
            session.elements.clear();
            session.pending.clear();
            session.view_mode = ViewMode::Translated;
        }

        let stray = inner.mutator.purge_markers(&inner.document);
        if stray > 0 {
            tracing::debug!("清理残留译文节点 {} 个", stray);
        }

        inner.set_state(SessionState::Idle);
        inner.settled.notify_waiters();
    }

    pub fn state(&self) -> SessionState {
        self.inner.session.borrow().state
    }

    pub fn view_mode(&self) -> ViewMode {
        self.inner.session.borrow().view_mode
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.inner.session.borrow().mode
    }

    pub fn translated_count(&self) -> usize {
        self.inner.session.borrow().translated_count()
    }

    pub fn element_count(&self) -> usize {
        self.inner.session.borrow().elements.len()
    }

    /// 调度器是否仍在观察视口
    pub fn is_observing(&self) -> bool {
        self.inner.scheduler.borrow().is_connected()
    }

    /// 当前会话的快照
    pub fn session(&self) -> TranslationSession {
        self.inner.session.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// 等待调度任务结束且没有进行中的批次
    ///
    /// 视口通道保持打开时，只有全部翻译完成、停止或清理后才会返回。
    pub async fn wait_until_settled(&self) {
        loop {
            let notified = self.inner.settled.notified();
            if !self.inner.is_busy() {
                return;
            }
            notified.await;
        }
    }
}

impl ManagerInner {
    fn set_state(&self, state: SessionState) {
        let previous = {
            let mut session = self.session.borrow_mut();
            std::mem::replace(&mut session.state, state)
        };

        if previous != state {
            tracing::info!("会话状态: {} -> {}", previous, state);
            let _ = self.events.send(SessionEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn is_busy(&self) -> bool {
        self.driver_running.get() || self.active_waves.get() > 0
    }

    fn stop_driver(&self) {
        if let Some(handle) = self.driver.borrow_mut().take() {
            handle.abort();
        }
        self.driver_running.set(false);
    }

    /// 处理一次视口变化，返回新增的待翻译数
    fn observe_viewport(&self, viewport: Viewport) -> usize {
        let mut session = self.session.borrow_mut();
        let mut scheduler = self.scheduler.borrow_mut();
        let added = scheduler.on_viewport(viewport, &session.elements, self.layout.as_ref());
        if added > 0 {
            session.pending = scheduler.pending().clone();
        }
        added
    }

    /// 取出待翻译集合，作为独立任务发出一波翻译
    fn launch_wave(self: &Rc<Self>, cancel: &CancellationToken) {
        let indices = self.scheduler.borrow_mut().take_pending();
        self.session.borrow_mut().pending.clear();
        if indices.is_empty() || cancel.is_cancelled() {
            return;
        }

        tracing::debug!("发出翻译波次: {} 个元素", indices.len());
        self.active_waves.set(self.active_waves.get() + 1);
        self.set_state(SessionState::Translating);

        let inner = Rc::clone(self);
        let cancel = cancel.clone();
        tokio::task::spawn_local(async move {
            inner.run_wave(indices, cancel).await;
        });
    }

    async fn run_wave(self: Rc<Self>, indices: Vec<usize>, cancel: CancellationToken) {
        let outcome = self
            .batch
            .run_pass(
                indices,
                &self.session,
                &self.provider,
                &self.mutator,
                &cancel,
                |session| {
                    self.emit(SessionEvent::Progress {
                        translated: session.translated_count(),
                        total: session.elements.len(),
                    });
                },
            )
            .await;

        self.active_waves.set(self.active_waves.get().saturating_sub(1));

        if cancel.is_cancelled() {
            self.settled.notify_waiters();
            return;
        }

        match outcome {
            PassOutcome::Completed | PassOutcome::Cancelled => {}
            PassOutcome::Failed { code, message } => {
                tracing::error!("翻译批次失败 [{}]: {}", code, message);
                self.emit(SessionEvent::Error { code, message });
                let settled = self.session.borrow().settled_state();
                self.set_state(settled);
            }
            PassOutcome::LoginRequired => {
                tracing::warn!("翻译服务要求重新登录");
                self.emit(SessionEvent::LoginRequired);
                let settled = self.session.borrow().settled_state();
                self.set_state(settled);
            }
        }

        self.check_completion();
        self.settled.notify_waiters();
    }

    /// 全部完成时断开观察；调度结束且无进行中批次时落定状态
    fn check_completion(&self) {
        if self.session.borrow().is_fully_translated() {
            self.stop_driver();
            self.scheduler.borrow_mut().disconnect();
            self.set_state(SessionState::FullyTranslated);
            return;
        }

        let state = self.session.borrow().state;
        if state == SessionState::Translating && !self.is_busy() {
            let settled = self.session.borrow().settled_state();
            self.set_state(settled);
        }
    }
}

/// 调度任务：监听视口变化，去抖后发出翻译波次
async fn drive(inner: Rc<ManagerInner>, cancel: CancellationToken) {
    let debounce = inner.config.debounce();
    let mut viewport = inner.viewport.clone();
    let mut deadline: Option<Instant> = None;
    let mut viewport_open = true;

    let initial = *viewport.borrow_and_update();
    if inner.observe_viewport(initial) > 0 {
        deadline = Some(Instant::now() + debounce);
    }

    loop {
        if !inner.scheduler.borrow().is_connected() {
            break;
        }
        if !viewport_open && deadline.is_none() {
            break;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                inner.launch_wave(&cancel);
            }
            changed = viewport.changed(), if viewport_open => match changed {
                Ok(()) => {
                    let current = *viewport.borrow_and_update();
                    if inner.observe_viewport(current) > 0 {
                        deadline = Some(Instant::now() + debounce);
                    }
                }
                Err(_) => {
                    tracing::debug!("视口通道已关闭，处理完剩余元素后停止调度");
                    viewport_open = false;
                }
            },
        }
    }

    inner.driver_running.set(false);
    inner.driver.borrow_mut().take();
    if !cancel.is_cancelled() {
        inner.check_completion();
    }
    inner.settled.notify_waiters();
}
