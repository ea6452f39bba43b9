// 集成测试公共模块
//
// 提供测试页面、模拟的本地引擎和脚本化的远程翻译服务

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use markup5ever_rcdom::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use xplaino::parsers::{html_to_dom, serialize_document};
use xplaino::translation::{
    Availability, EngineConfig, FixedLayout, LocalEngine, LocalTranslator, ProviderTier,
    RemoteTranslator, TierConfig, TranslationError, TranslationEvent, TranslationManager,
    TranslationRequest, TranslationResult, Viewport,
};

/// HTML 测试辅助
pub struct HtmlTestHelper;

impl HtmlTestHelper {
    pub fn parse(html: &str) -> Handle {
        html_to_dom(html.as_bytes(), "utf-8")
            .expect("test HTML should parse")
            .document
    }

    pub fn serialize(document: &Handle) -> String {
        let bytes = serialize_document(document, "utf-8").expect("serialization should succeed");
        String::from_utf8(bytes).expect("serialized HTML should be UTF-8")
    }

    /// `count` 个段落，文本为 `Paragraph number {i} of the story`
    pub fn paragraphs(count: usize) -> String {
        let body: String = (0..count)
            .map(|i| format!("<p>Paragraph number {} of the story</p>", i))
            .collect();
        format!("<html lang=\"en\"><head><title>Story</title></head><body>{}</body></html>", body)
    }

    pub fn paragraph_text(index: usize) -> String {
        format!("Paragraph number {} of the story", index)
    }

    /// 带导航、脚本、隐藏元素和容器的文章页面
    pub fn article_page() -> String {
        r#"<html lang="en">
<head><title>News</title><script>var tracking = "Hello world";</script></head>
<body>
  <nav><a href="/">Home page link</a></nav>
  <header><h1>Morning headlines today</h1></header>
  <div class="ad banner-ad"><p>Buy our sponsored product</p></div>
  <article>
    <div>
      <p>The first paragraph of the article.</p>
      <p>The second paragraph of the article.</p>
    </div>
    <p hidden>Hidden paragraph text</p>
    <p style="display: none">Invisible paragraph text</p>
    <pre>fn main() { println!("code"); }</pre>
    <div id="xplaino-toolbar"><span>Injected toolbar label</span></div>
  </article>
  <footer><p>Contact us anytime</p></footer>
</body>
</html>"#
            .to_string()
    }
}

/// 本地译文格式
pub fn local_translation(target: &str, text: &str) -> String {
    format!("[local-{}] {}", target, text)
}

/// 远程译文格式
pub fn remote_translation(target: &str, text: &str) -> String {
    format!("[remote-{}] {}", target, text)
}

/// 模拟的本地引擎
pub struct MockLocalEngine {
    pub availability: Availability,
    pub detected: Option<String>,
    pub item_delay: Duration,
    /// 翻译到第 n 条时报错
    pub fail_after: Option<usize>,
    /// 第 n 条返回空译文
    pub blank_at: Option<usize>,
    pub translators_created: AtomicUsize,
    pub availability_checks: Mutex<Vec<(String, String)>>,
    pub translated_texts: Arc<Mutex<Vec<String>>>,
}

impl MockLocalEngine {
    pub fn new(availability: Availability) -> Self {
        Self {
            availability,
            detected: None,
            item_delay: Duration::ZERO,
            fail_after: None,
            blank_at: None,
            translators_created: AtomicUsize::new(0),
            availability_checks: Mutex::new(Vec::new()),
            translated_texts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn available() -> Self {
        Self::new(Availability::Available)
    }

    pub fn unavailable() -> Self {
        Self::new(Availability::Unavailable)
    }

    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = delay;
        self
    }

    pub fn with_detected(mut self, lang: &str) -> Self {
        self.detected = Some(lang.to_string());
        self
    }

    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    pub fn blank_at(mut self, call: usize) -> Self {
        self.blank_at = Some(call);
        self
    }

    pub fn translated_texts(&self) -> Vec<String> {
        self.translated_texts.lock().unwrap().clone()
    }

    pub fn availability_checks(&self) -> Vec<(String, String)> {
        self.availability_checks.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalEngine for MockLocalEngine {
    async fn check_availability(
        &self,
        source: &str,
        target: &str,
    ) -> TranslationResult<Availability> {
        self.availability_checks
            .lock()
            .unwrap()
            .push((source.to_string(), target.to_string()));
        Ok(self.availability)
    }

    async fn detect_language(&self, _sample: &str) -> TranslationResult<Option<String>> {
        Ok(self.detected.clone())
    }

    async fn create_translator(
        &self,
        _source: &str,
        target: &str,
    ) -> TranslationResult<Arc<dyn LocalTranslator>> {
        self.translators_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockLocalTranslator {
            target: target.to_string(),
            delay: self.item_delay,
            fail_after: self.fail_after,
            blank_at: self.blank_at,
            calls: AtomicUsize::new(0),
            log: Arc::clone(&self.translated_texts),
        }))
    }
}

struct MockLocalTranslator {
    target: String,
    delay: Duration,
    fail_after: Option<usize>,
    blank_at: Option<usize>,
    calls: AtomicUsize,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl LocalTranslator for MockLocalTranslator {
    async fn translate(&self, text: &str) -> TranslationResult<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| call >= limit) {
            return Err(TranslationError::LocalEngineError("model crashed".to_string()));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.log.lock().unwrap().push(text.to_string());
        if self.blank_at == Some(call) {
            return Ok(String::new());
        }
        Ok(local_translation(&self.target, text))
    }
}

/// 脚本化的远程翻译服务
pub struct ScriptedRemote {
    item_delay: Duration,
    reversed: bool,
    failure: Option<(String, String)>,
    login_required: bool,
    /// 发出这么多条后直接关闭，不发送终止事件
    drop_after: Option<usize>,
    dictionary: HashMap<String, String>,
    /// 这些 id 既不发进度也不出现在完成结果里
    omitted: Vec<String>,
    requests: Mutex<Vec<TranslationRequest>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self {
            item_delay: Duration::ZERO,
            reversed: false,
            failure: None,
            login_required: false,
            drop_after: None,
            dictionary: HashMap::new(),
            omitted: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = delay;
        self
    }

    /// 倒序返回结果
    pub fn reversed(mut self) -> Self {
        self.reversed = true;
        self
    }

    pub fn failing(mut self, code: &str, message: &str) -> Self {
        self.failure = Some((code.to_string(), message.to_string()));
        self
    }

    pub fn login_required(mut self) -> Self {
        self.login_required = true;
        self
    }

    pub fn dropping_after(mut self, count: usize) -> Self {
        self.drop_after = Some(count);
        self
    }

    /// 固定某条文本的译文
    pub fn with_translation(mut self, text: &str, translated: &str) -> Self {
        self.dictionary.insert(text.to_string(), translated.to_string());
        self
    }

    pub fn omitting(mut self, id: &str) -> Self {
        self.omitted.push(id.to_string());
        self
    }

    pub fn requests(&self) -> Vec<TranslationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requested_ids(&self) -> Vec<String> {
        self.requests()
            .iter()
            .flat_map(|request| request.items.iter().map(|item| item.id.clone()))
            .collect()
    }
}

#[async_trait]
impl RemoteTranslator for ScriptedRemote {
    async fn translate_stream(
        &self,
        request: TranslationRequest,
        events: mpsc::Sender<TranslationEvent>,
        cancel: CancellationToken,
    ) {
        self.requests.lock().unwrap().push(request.clone());

        if self.login_required {
            let _ = events.send(TranslationEvent::LoginRequired).await;
            return;
        }
        if let Some((code, message)) = &self.failure {
            let _ = events
                .send(TranslationEvent::Failed {
                    code: code.clone(),
                    message: message.clone(),
                })
                .await;
            return;
        }

        let mut items: Vec<_> = request
            .items
            .iter()
            .filter(|item| !self.omitted.contains(&item.id))
            .cloned()
            .collect();
        if self.reversed {
            items.reverse();
        }

        let mut results = HashMap::new();
        for (sent, item) in items.into_iter().enumerate() {
            if self.drop_after.is_some_and(|limit| sent >= limit) {
                return;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = events.send(TranslationEvent::Cancelled).await;
                    return;
                }
                _ = tokio::time::sleep(self.item_delay) => {}
            }

            let translated = self
                .dictionary
                .get(&item.text)
                .cloned()
                .unwrap_or_else(|| remote_translation(&request.target_language, &item.text));
            results.insert(item.id.clone(), translated.clone());
            let _ = events
                .send(TranslationEvent::Progress {
                    id: item.id,
                    translated_text: translated,
                })
                .await;
        }

        let _ = events.send(TranslationEvent::Completed { results }).await;
    }
}

/// 收集一次翻译的全部事件
pub async fn collect_events(mut rx: mpsc::Receiver<TranslationEvent>) -> Vec<TranslationEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

pub fn tier(local: Arc<dyn LocalEngine>, remote: Arc<dyn RemoteTranslator>) -> Arc<ProviderTier> {
    Arc::new(ProviderTier::new(Some(local), remote, TierConfig::default()))
}

pub fn network_tier(remote: Arc<dyn RemoteTranslator>) -> Arc<ProviderTier> {
    Arc::new(ProviderTier::network_only(remote, TierConfig::default()))
}

/// 管理器测试环境
pub struct ManagerHarness {
    pub document: Handle,
    pub manager: TranslationManager,
    pub viewport: watch::Sender<Viewport>,
}

impl ManagerHarness {
    /// 所有元素等高排列，视口从顶部开始
    pub fn new(
        html: &str,
        provider: Arc<ProviderTier>,
        element_height: f64,
        viewport_height: f64,
        config: EngineConfig,
    ) -> Self {
        let document = HtmlTestHelper::parse(html);
        let layout = Rc::new(FixedLayout::stacked(config.max_elements, element_height));
        let (viewport, viewport_rx) = watch::channel(Viewport::new(0.0, viewport_height));
        let manager =
            TranslationManager::new(document.clone(), provider, layout, viewport_rx, config);

        Self {
            document,
            manager,
            viewport,
        }
    }

    pub fn scroll_to(&self, scroll_top: f64) {
        let height = self.viewport.borrow().height;
        let _ = self.viewport.send(Viewport::new(scroll_top, height));
    }

    pub fn html(&self) -> String {
        HtmlTestHelper::serialize(&self.document)
    }
}

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default_with_lang("es", None);
    config.preload_margin_px = 0;
    config.max_elements = 200;
    config
}
