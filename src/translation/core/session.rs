//! 翻译会话数据模型
//!
//! 每个可翻译元素都有显式的状态记录；页面上的标记属性只是这份状态的输出。

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use markup5ever_rcdom::Handle;
use serde::{Deserialize, Serialize};

/// 显示模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// 在原文后追加译文
    #[default]
    Append,
    /// 用译文替换原文
    Replace,
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "append" => Ok(DisplayMode::Append),
            "replace" => Ok(DisplayMode::Replace),
            other => Err(format!("未知的显示模式: {}", other)),
        }
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    #[default]
    Idle,
    Translating,
    PartiallyTranslated,
    FullyTranslated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Translating => "translating",
            SessionState::PartiallyTranslated => "partially-translated",
            SessionState::FullyTranslated => "fully-translated",
        };
        f.write_str(name)
    }
}

/// 当前展示原文还是译文
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Original,
    #[default]
    Translated,
}

/// 单个元素的处理进度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElementStatus {
    #[default]
    Pending,
    /// 已拿到译文，尚未写入页面
    Translated,
    /// 译文已写入页面
    Applied,
    /// 写入失败（节点已脱离文档等）
    Failed,
}

/// 可翻译元素
#[derive(Debug, Clone)]
pub struct TranslatableElement {
    /// 提取顺序中的下标，同时作为请求条目的 id
    pub index: usize,
    pub node: Handle,
    pub tag: String,
    pub original_text: String,
    pub translated_text: Option<String>,
    pub status: ElementStatus,
    /// 替换模式下直接文本节点的原始内容
    pub text_snapshot: Vec<(Handle, String)>,
    /// 追加模式下插入的译文节点
    pub sibling: Option<Handle>,
}

impl TranslatableElement {
    pub fn new(index: usize, node: Handle, tag: &str, original_text: String) -> Self {
        Self {
            index,
            node,
            tag: tag.to_string(),
            original_text,
            translated_text: None,
            status: ElementStatus::Pending,
            text_snapshot: Vec::new(),
            sibling: None,
        }
    }

    /// 请求条目 id
    pub fn id(&self) -> String {
        self.index.to_string()
    }

    /// 是否已有非空译文
    pub fn is_translated(&self) -> bool {
        self.translated_text
            .as_deref()
            .is_some_and(|text| !text.is_empty())
    }

    /// 记录译文；每个元素只接受第一次非空结果
    pub fn set_translation(&mut self, text: String) -> bool {
        if self.is_translated() || text.is_empty() {
            return false;
        }
        self.translated_text = Some(text);
        self.status = ElementStatus::Translated;
        true
    }
}

/// 翻译会话
#[derive(Debug, Clone, Default)]
pub struct TranslationSession {
    pub elements: Vec<TranslatableElement>,
    pub mode: DisplayMode,
    pub state: SessionState,
    pub view_mode: ViewMode,
    pub target_language: String,
    /// 页面声明的语言
    pub source_language: Option<String>,
    /// 已进入视口、尚未发送的元素下标
    pub pending: BTreeSet<usize>,
}

impl TranslationSession {
    pub fn new(
        elements: Vec<TranslatableElement>,
        mode: DisplayMode,
        target_language: &str,
        source_language: Option<String>,
    ) -> Self {
        Self {
            elements,
            mode,
            state: SessionState::Idle,
            view_mode: ViewMode::Translated,
            target_language: target_language.to_string(),
            source_language,
            pending: BTreeSet::new(),
        }
    }

    pub fn translated_count(&self) -> usize {
        self.elements.iter().filter(|e| e.is_translated()).count()
    }

    pub fn is_fully_translated(&self) -> bool {
        !self.elements.is_empty() && self.elements.iter().all(|e| e.is_translated())
    }

    /// 通过请求 id 定位元素
    pub fn element_by_id_mut(&mut self, id: &str) -> Option<&mut TranslatableElement> {
        let index: usize = id.parse().ok()?;
        self.elements.get_mut(index)
    }

    /// 停止或失败后的落点状态
    pub fn settled_state(&self) -> SessionState {
        if self.is_fully_translated() {
            SessionState::FullyTranslated
        } else if self.translated_count() > 0 {
            SessionState::PartiallyTranslated
        } else {
            SessionState::Idle
        }
    }
}
