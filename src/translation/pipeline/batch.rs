//! 批次翻译
//!
//! 把一波待翻译元素切成固定大小的批次，按顺序逐批交给服务层，
//! 每收到一条译文就立即写入页面。

use std::cell::RefCell;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::translation::config::constants;
use crate::translation::core::mutator::DomMutator;
use crate::translation::core::session::{ElementStatus, TranslationSession};
use crate::translation::error::helpers::log_error;
use crate::translation::providers::{
    ProviderTier, TranslationEvent, TranslationItem, TranslationRequest,
};

/// 一次翻译的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed,
    Cancelled,
    Failed { code: String, message: String },
    LoginRequired,
}

/// 批次翻译器
#[derive(Debug, Clone)]
pub struct BatchTranslator {
    batch_size: usize,
}

impl Default for BatchTranslator {
    fn default() -> Self {
        Self::new(constants::DEFAULT_BATCH_SIZE)
    }
}

impl BatchTranslator {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 按批次大小切分
    pub fn split(&self, indices: &[usize]) -> Vec<Vec<usize>> {
        indices
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// 顺序处理所有批次
    ///
    /// 每写入一条译文后调用 `on_applied`。取消后到达的事件一律丢弃。
    pub async fn run_pass<F>(
        &self,
        indices: Vec<usize>,
        session: &RefCell<TranslationSession>,
        provider: &Arc<ProviderTier>,
        mutator: &DomMutator,
        cancel: &CancellationToken,
        mut on_applied: F,
    ) -> PassOutcome
    where
        F: FnMut(&TranslationSession),
    {
        let chunks = self.split(&indices);
        let total_chunks = chunks.len();

        for (chunk_no, chunk) in chunks.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return PassOutcome::Cancelled;
            }

            let Some(request) = build_request(&session.borrow(), &chunk) else {
                continue;
            };

            tracing::debug!(
                "发送批次 {}/{}: {} 条",
                chunk_no + 1,
                total_chunks,
                request.items.len()
            );

            let mut events = provider.translate_with_fallback(request, cancel.clone());

            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return PassOutcome::Cancelled,
                    event = events.recv() => event,
                };

                if cancel.is_cancelled() {
                    return PassOutcome::Cancelled;
                }

                match event {
                    Some(TranslationEvent::Progress {
                        id,
                        translated_text,
                    }) => {
                        if apply_result(session, mutator, &id, translated_text) {
                            on_applied(&session.borrow());
                        }
                    }
                    Some(TranslationEvent::Completed { results }) => {
                        let mut ids: Vec<String> = results.keys().cloned().collect();
                        ids.sort_by_key(|id| id.parse::<usize>().unwrap_or(usize::MAX));
                        for id in ids {
                            if let Some(text) = results.get(&id) {
                                if apply_result(session, mutator, &id, text.clone()) {
                                    on_applied(&session.borrow());
                                }
                            }
                        }

                        let missing = missing_in_chunk(&session.borrow(), &chunk);
                        if !missing.is_empty() {
                            tracing::warn!("批次完成但缺少结果: {:?}", missing);
                            return PassOutcome::Failed {
                                code: "INCOMPLETE_RESULT".to_string(),
                                message: format!("{} 个元素没有收到译文", missing.len()),
                            };
                        }
                        break;
                    }
                    Some(TranslationEvent::Failed { code, message }) => {
                        return PassOutcome::Failed { code, message };
                    }
                    Some(TranslationEvent::LoginRequired) => return PassOutcome::LoginRequired,
                    Some(TranslationEvent::Cancelled) => return PassOutcome::Cancelled,
                    None => {
                        return PassOutcome::Failed {
                            code: "STREAM_ERROR".to_string(),
                            message: "翻译事件流意外关闭".to_string(),
                        };
                    }
                }
            }
        }

        PassOutcome::Completed
    }
}

/// 批次中仍未翻译的元素
fn missing_in_chunk(session: &TranslationSession, chunk: &[usize]) -> Vec<usize> {
    chunk
        .iter()
        .copied()
        .filter(|&index| {
            session
                .elements
                .get(index)
                .is_some_and(|element| !element.is_translated())
        })
        .collect()
}

/// 为尚未翻译的元素构造请求
fn build_request(session: &TranslationSession, chunk: &[usize]) -> Option<TranslationRequest> {
    let items: Vec<TranslationItem> = chunk
        .iter()
        .filter_map(|&index| session.elements.get(index))
        .filter(|element| !element.is_translated())
        .map(|element| TranslationItem {
            id: element.id(),
            text: element.original_text.clone(),
        })
        .collect();

    if items.is_empty() {
        return None;
    }

    Some(
        TranslationRequest::new(items, &session.target_language)
            .with_source_language(session.source_language.clone()),
    )
}

/// 记录并写入一条译文；返回是否产生了新译文
fn apply_result(
    session: &RefCell<TranslationSession>,
    mutator: &DomMutator,
    id: &str,
    translated_text: String,
) -> bool {
    let mut session = session.borrow_mut();
    let mode = session.mode;
    let view = session.view_mode;

    let Some(element) = session.element_by_id_mut(id) else {
        tracing::debug!("忽略未知 id 的译文: {}", id);
        return false;
    };

    if !element.set_translation(translated_text) {
        return false;
    }

    if let Err(e) = mutator.apply(element, mode, view) {
        log_error(&e.with_context(format!("跳过元素 {}", id)));
        element.status = ElementStatus::Failed;
    }

    true
}
