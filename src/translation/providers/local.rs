//! 设备端翻译引擎接口

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::translation::error::TranslationResult;

/// 语言对可用性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    /// 能力存在，但需要先下载模型
    Downloadable,
    Unavailable,
}

/// 本地翻译能力
#[async_trait]
pub trait LocalEngine: Send + Sync {
    async fn check_availability(&self, source: &str, target: &str)
        -> TranslationResult<Availability>;

    /// 检测样本文本的语言，无法判断时返回 `None`
    async fn detect_language(&self, sample: &str) -> TranslationResult<Option<String>>;

    async fn create_translator(
        &self,
        source: &str,
        target: &str,
    ) -> TranslationResult<Arc<dyn LocalTranslator>>;
}

/// 某个语言对的翻译器实例
#[async_trait]
pub trait LocalTranslator: Send + Sync {
    async fn translate(&self, text: &str) -> TranslationResult<String>;

    /// 逐条翻译，每完成一条就通过 `progress` 上报 `(下标, 译文)`
    async fn translate_batch(
        &self,
        texts: &[String],
        progress: mpsc::UnboundedSender<(usize, String)>,
    ) -> TranslationResult<Vec<String>> {
        let mut results = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            let translated = self.translate(text).await?;
            let _ = progress.send((index, translated.clone()));
            results.push(translated);
        }
        Ok(results)
    }
}

type TranslatorMap = HashMap<(String, String), Arc<dyn LocalTranslator>>;

/// 按语言对缓存翻译器，重复请求复用已下载的模型
#[derive(Default)]
pub struct TranslatorCache {
    translators: Mutex<TranslatorMap>,
}

impl TranslatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出缓存的翻译器，不存在时创建
    ///
    /// 创建期间持有锁，同一语言对只会初始化一次。
    pub async fn get_or_create(
        &self,
        engine: &dyn LocalEngine,
        source: &str,
        target: &str,
    ) -> TranslationResult<Arc<dyn LocalTranslator>> {
        let key = (source.to_string(), target.to_string());
        let mut translators = self.translators.lock().await;

        if let Some(translator) = translators.get(&key) {
            return Ok(Arc::clone(translator));
        }

        tracing::debug!("创建本地翻译器: {}-{}", source, target);
        let translator = engine.create_translator(source, target).await?;
        translators.insert(key, Arc::clone(&translator));
        Ok(translator)
    }

    pub async fn len(&self) -> usize {
        self.translators.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn reset(&self) {
        self.translators.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Upper;

    #[async_trait]
    impl LocalTranslator for Upper {
        async fn translate(&self, text: &str) -> TranslationResult<String> {
            Ok(text.to_uppercase())
        }
    }

    #[derive(Default)]
    struct CountingEngine {
        created: AtomicUsize,
    }

    #[async_trait]
    impl LocalEngine for CountingEngine {
        async fn check_availability(&self, _: &str, _: &str) -> TranslationResult<Availability> {
            Ok(Availability::Available)
        }

        async fn detect_language(&self, _: &str) -> TranslationResult<Option<String>> {
            Ok(None)
        }

        async fn create_translator(
            &self,
            _: &str,
            _: &str,
        ) -> TranslationResult<Arc<dyn LocalTranslator>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Upper))
        }
    }

    #[tokio::test]
    async fn test_cache_reuses_translator_per_pair() {
        let engine = CountingEngine::default();
        let cache = TranslatorCache::new();

        cache.get_or_create(&engine, "en", "es").await.unwrap();
        cache.get_or_create(&engine, "en", "es").await.unwrap();
        cache.get_or_create(&engine, "en", "fr").await.unwrap();
        assert_eq!(engine.created.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 2);

        cache.reset().await;
        assert!(cache.is_empty().await);
        cache.get_or_create(&engine, "en", "es").await.unwrap();
        assert_eq!(engine.created.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_default_batch_reports_progress_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let texts = vec!["one".to_string(), "two".to_string()];

        let results = Upper.translate_batch(&texts, tx).await.unwrap();
        assert_eq!(results, vec!["ONE", "TWO"]);
        assert_eq!(rx.recv().await, Some((0, "ONE".to_string())));
        assert_eq!(rx.recv().await, Some((1, "TWO".to_string())));
    }

    #[test]
    fn test_availability_wire_names() {
        assert_eq!(
            serde_json::to_string(&Availability::Downloadable).unwrap(),
            "\"downloadable\""
        );
    }
}
