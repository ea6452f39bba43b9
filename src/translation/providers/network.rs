//! 流式网络翻译服务
//!
//! 一次请求发送整批文本，响应是 SSE 事件流：每个 `data:` 帧对应一条译文，
//! `[DONE]` 表示结束，`{error_code, error_message}` 帧表示服务端错误。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use super::{RemoteTranslator, TranslationEvent, TranslationItem, TranslationRequest};
use crate::translation::config::EngineConfig;
use crate::translation::error::{helpers::config_error, TranslationError, TranslationResult};

const DONE_SENTINEL: &str = "[DONE]";

/// 访问凭证来源
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Option<String>;

    /// 刷新凭证，返回新的令牌
    async fn refresh_access_token(&self) -> TranslationResult<String>;
}

/// 固定令牌，不支持刷新
#[derive(Debug, Default)]
pub struct StaticCredentials {
    token: RwLock<Option<String>>,
}

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn access_token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    async fn refresh_access_token(&self) -> TranslationResult<String> {
        Err(TranslationError::AuthenticationRequired)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamRequestBody<'a> {
    target_language_code: String,
    texts: &'a [TranslationItem],
}

/// SSE 数据帧
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamFrame {
    Error {
        error_code: String,
        #[serde(default)]
        error_message: String,
    },
    Item {
        id: serde_json::Value,
        #[serde(rename = "translatedText", alias = "translated_text")]
        translated_text: String,
    },
}

/// 单行解析结果
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Item { id: String, translated_text: String },
    Error { code: String, message: String },
    Done,
    Ignore,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Ignore;
    };
    let data = data.trim();

    if data == DONE_SENTINEL {
        return SseLine::Done;
    }
    if data.is_empty() {
        return SseLine::Ignore;
    }

    match serde_json::from_str::<StreamFrame>(data) {
        Ok(StreamFrame::Error {
            error_code,
            error_message,
        }) => SseLine::Error {
            code: error_code,
            message: error_message,
        },
        Ok(StreamFrame::Item {
            id,
            translated_text,
        }) => {
            let id = match id {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            SseLine::Item {
                id,
                translated_text,
            }
        }
        Err(e) => {
            tracing::debug!("忽略无法解析的事件帧: {} ({})", data, e);
            SseLine::Ignore
        }
    }
}

/// 网络翻译服务客户端
pub struct NetworkTranslator {
    client: Client,
    api_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl NetworkTranslator {
    pub fn new(
        api_url: &str,
        credentials: Arc<dyn CredentialProvider>,
        request_timeout: Duration,
    ) -> TranslationResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| config_error(format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            credentials,
        })
    }

    pub fn from_config(
        config: &EngineConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> TranslationResult<Self> {
        Self::new(&config.api_url, credentials, config.request_timeout())
    }

    async fn send(
        &self,
        body: &StreamRequestBody<'_>,
        token: Option<String>,
    ) -> TranslationResult<reqwest::Response> {
        let mut builder = self
            .client
            .post(&self.api_url)
            .header(ACCEPT, "text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .json(body);

        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        Ok(builder.send().await?)
    }

    /// 发起请求；401 时刷新凭证并重试一次
    async fn connect(
        &self,
        request: &TranslationRequest,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, TranslationEvent> {
        let body = StreamRequestBody {
            target_language_code: request.target_language.to_uppercase(),
            texts: &request.items,
        };

        let mut token = self.credentials.access_token().await;
        let mut refreshed = false;

        loop {
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TranslationEvent::Cancelled),
                response = self.send(&body, token.clone()) => response,
            };

            let response = response.map_err(|e| TranslationEvent::failed(&e))?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                if refreshed {
                    tracing::warn!("刷新凭证后仍被拒绝，需要重新登录");
                    return Err(TranslationEvent::LoginRequired);
                }

                match self.credentials.refresh_access_token().await {
                    Ok(new_token) => {
                        tracing::info!("访问凭证已过期，刷新后重试");
                        token = Some(new_token);
                        refreshed = true;
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("刷新凭证失败: {}", e);
                        return Err(TranslationEvent::LoginRequired);
                    }
                }
            }

            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(TranslationEvent::Failed {
                    code: format!("HTTP_{}", status.as_u16()),
                    message: if message.is_empty() {
                        status.to_string()
                    } else {
                        message
                    },
                });
            }

            return Ok(response);
        }
    }

    /// 逐块读取事件流，跨块拼接未结束的行
    async fn consume_stream(
        &self,
        response: reqwest::Response,
        events: &mpsc::Sender<TranslationEvent>,
        cancel: &CancellationToken,
    ) -> TranslationEvent {
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut results: HashMap<String, String> = HashMap::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return TranslationEvent::Cancelled,
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    buffer.extend_from_slice(&bytes);
                    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&line);
                        if let Some(terminal) =
                            handle_line(line.trim_end(), &mut results, events).await
                        {
                            return terminal;
                        }
                    }
                }
                Some(Err(e)) => {
                    return TranslationEvent::failed(&TranslationError::StreamError(e.to_string()));
                }
                None => break,
            }
        }

        // 残留的最后一行可能就是结束标记
        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer).to_string();
            if let Some(terminal) = handle_line(line.trim_end(), &mut results, events).await {
                return terminal;
            }
        }
        tracing::warn!("事件流在结束标记前关闭，已收到 {} 条", results.len());
        TranslationEvent::failed(&TranslationError::StreamError(format!(
            "事件流在结束标记前关闭，已收到 {} 条",
            results.len()
        )))
    }
}

/// 处理一行；遇到终止帧时返回终止事件
async fn handle_line(
    line: &str,
    results: &mut HashMap<String, String>,
    events: &mpsc::Sender<TranslationEvent>,
) -> Option<TranslationEvent> {
    match parse_sse_line(line) {
        SseLine::Item {
            id,
            translated_text,
        } => {
            results.insert(id.clone(), translated_text.clone());
            let _ = events
                .send(TranslationEvent::Progress {
                    id,
                    translated_text,
                })
                .await;
            None
        }
        SseLine::Error { code, message } => Some(TranslationEvent::Failed { code, message }),
        SseLine::Done => Some(TranslationEvent::Completed {
            results: std::mem::take(results),
        }),
        SseLine::Ignore => None,
    }
}

#[async_trait]
impl RemoteTranslator for NetworkTranslator {
    async fn translate_stream(
        &self,
        request: TranslationRequest,
        events: mpsc::Sender<TranslationEvent>,
        cancel: CancellationToken,
    ) {
        tracing::debug!(
            "网络翻译: {} 条 -> {}",
            request.items.len(),
            request.target_language
        );

        let terminal = match self.connect(&request, &cancel).await {
            Ok(response) => self.consume_stream(response, &events, &cancel).await,
            Err(terminal) => terminal,
        };

        let _ = events.send(terminal).await;
    }
}
