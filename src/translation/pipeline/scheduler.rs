//! 视口调度器
//!
//! 元素进入视口（含预加载边距）时才排队翻译。每个元素只观察一次，
//! 首次相交后即移出观察集合；连续的可见性事件在去抖窗口结束后合并为一波。

use std::collections::{BTreeSet, HashMap};

use markup5ever_rcdom::Handle;

use crate::translation::config::constants;
use crate::translation::core::session::TranslatableElement;

/// 元素在页面中的纵向范围
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementBounds {
    pub top: f64,
    pub bottom: f64,
}

impl ElementBounds {
    pub fn new(top: f64, height: f64) -> Self {
        Self {
            top,
            bottom: top + height,
        }
    }
}

/// 当前滚动位置
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_top: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(scroll_top: f64, height: f64) -> Self {
        Self { scroll_top, height }
    }

    /// 扩展边距后是否与元素相交
    pub fn intersects(&self, bounds: &ElementBounds, margin: f64) -> bool {
        let top = self.scroll_top - margin;
        let bottom = self.scroll_top + self.height + margin;
        bounds.bottom >= top && bounds.top <= bottom
    }
}

/// 元素布局来源
pub trait LayoutProvider {
    /// 返回 `None` 表示元素当前没有布局（不会被视为可见）
    fn bounds(&self, index: usize, node: &Handle) -> Option<ElementBounds>;
}

/// 显式给定的布局
#[derive(Debug, Clone, Default)]
pub struct FixedLayout {
    bounds: HashMap<usize, ElementBounds>,
}

impl FixedLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(mut self, index: usize, bounds: ElementBounds) -> Self {
        self.bounds.insert(index, bounds);
        self
    }

    /// 等高元素依次排列
    pub fn stacked(count: usize, height: f64) -> Self {
        let bounds = (0..count)
            .map(|i| (i, ElementBounds::new(i as f64 * height, height)))
            .collect();
        Self { bounds }
    }
}

impl LayoutProvider for FixedLayout {
    fn bounds(&self, index: usize, _node: &Handle) -> Option<ElementBounds> {
        self.bounds.get(&index).copied()
    }
}

/// 估算布局：按文档顺序堆叠，行高乘以折行数
#[derive(Debug, Clone)]
pub struct EstimatedLayout {
    bounds: Vec<ElementBounds>,
    total_height: f64,
}

impl EstimatedLayout {
    pub const LINE_HEIGHT: f64 = 24.0;
    pub const CHARS_PER_LINE: usize = 80;
    pub const BLOCK_GAP: f64 = 16.0;

    pub fn from_elements(elements: &[TranslatableElement]) -> Self {
        let mut top = 0.0;
        let mut bounds = Vec::with_capacity(elements.len());

        for element in elements {
            let chars = element.original_text.chars().count().max(1);
            let lines = chars.div_ceil(Self::CHARS_PER_LINE);
            let height = lines as f64 * Self::LINE_HEIGHT;
            bounds.push(ElementBounds::new(top, height));
            top += height + Self::BLOCK_GAP;
        }

        Self {
            bounds,
            total_height: top,
        }
    }

    pub fn total_height(&self) -> f64 {
        self.total_height
    }
}

impl LayoutProvider for EstimatedLayout {
    fn bounds(&self, index: usize, _node: &Handle) -> Option<ElementBounds> {
        self.bounds.get(index).copied()
    }
}

/// 视口调度状态
#[derive(Debug, Clone)]
pub struct ViewportScheduler {
    observed: BTreeSet<usize>,
    pending: BTreeSet<usize>,
    preload_margin: f64,
    connected: bool,
}

impl Default for ViewportScheduler {
    fn default() -> Self {
        Self::new(constants::DEFAULT_PRELOAD_MARGIN_PX)
    }
}

impl ViewportScheduler {
    pub fn new(preload_margin_px: u32) -> Self {
        Self {
            observed: BTreeSet::new(),
            pending: BTreeSet::new(),
            preload_margin: f64::from(preload_margin_px),
            connected: true,
        }
    }

    /// 开始观察这些元素
    pub fn observe(&mut self, indices: impl IntoIterator<Item = usize>) {
        if self.connected {
            self.observed.extend(indices);
        }
    }

    /// 处理一次视口变化，返回新加入待翻译集合的元素数
    pub fn on_viewport(
        &mut self,
        viewport: Viewport,
        elements: &[TranslatableElement],
        layout: &dyn LayoutProvider,
    ) -> usize {
        if !self.connected {
            return 0;
        }

        let visible: Vec<usize> = self
            .observed
            .iter()
            .copied()
            .filter(|&index| {
                elements
                    .get(index)
                    .and_then(|element| layout.bounds(index, &element.node))
                    .is_some_and(|bounds| viewport.intersects(&bounds, self.preload_margin))
            })
            .collect();

        let mut added = 0;
        for index in visible {
            self.observed.remove(&index);
            let translated = elements.get(index).is_some_and(|e| e.is_translated());
            if !translated && self.pending.insert(index) {
                added += 1;
            }
        }

        added
    }

    /// 取出并清空待翻译集合
    pub fn take_pending(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    pub fn pending(&self) -> &BTreeSet<usize> {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn observed_count(&self) -> usize {
        self.observed.len()
    }

    /// 停止观察，丢弃所有状态
    pub fn disconnect(&mut self) {
        self.connected = false;
        self.observed.clear();
        self.pending.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::create_detached_element;

    fn elements(count: usize) -> Vec<TranslatableElement> {
        (0..count)
            .map(|i| {
                TranslatableElement::new(
                    i,
                    create_detached_element("p", &[]),
                    "p",
                    format!("Paragraph {}", i),
                )
            })
            .collect()
    }

    #[test]
    fn test_preload_margin() {
        let viewport = Viewport::new(1000.0, 500.0);
        assert!(viewport.intersects(&ElementBounds::new(1700.0, 50.0), 300.0));
        assert!(!viewport.intersects(&ElementBounds::new(1850.0, 50.0), 300.0));
        assert!(viewport.intersects(&ElementBounds::new(650.0, 100.0), 300.0));
        assert!(!viewport.intersects(&ElementBounds::new(500.0, 100.0), 300.0));
    }

    #[test]
    fn test_observation_is_one_shot() {
        let els = elements(10);
        let layout = FixedLayout::stacked(10, 100.0);
        let mut scheduler = ViewportScheduler::new(0);
        scheduler.observe(0..10);

        let added = scheduler.on_viewport(Viewport::new(0.0, 250.0), &els, &layout);
        assert_eq!(added, 3);
        assert_eq!(scheduler.take_pending(), vec![0, 1, 2]);

        // 回滚到同一位置不会再次排队
        assert_eq!(scheduler.on_viewport(Viewport::new(0.0, 250.0), &els, &layout), 0);
        assert!(!scheduler.has_pending());
        assert_eq!(scheduler.observed_count(), 7);
    }

    #[test]
    fn test_translated_elements_are_not_queued() {
        let mut els = elements(3);
        els[1].set_translation("Hecho".to_string());
        let layout = FixedLayout::stacked(3, 100.0);
        let mut scheduler = ViewportScheduler::new(300);
        scheduler.observe(0..3);

        assert_eq!(scheduler.on_viewport(Viewport::new(0.0, 100.0), &els, &layout), 2);
        assert_eq!(scheduler.take_pending(), vec![0, 2]);
    }

    #[test]
    fn test_disconnect_stops_everything() {
        let els = elements(3);
        let layout = FixedLayout::stacked(3, 100.0);
        let mut scheduler = ViewportScheduler::new(300);
        scheduler.observe(0..3);
        scheduler.disconnect();

        assert!(!scheduler.is_connected());
        assert_eq!(scheduler.on_viewport(Viewport::new(0.0, 100.0), &els, &layout), 0);
        assert!(scheduler.take_pending().is_empty());
    }

    #[test]
    fn test_estimated_layout_stacks_in_order() {
        let mut els = elements(2);
        els[0].original_text = "x".repeat(200);
        let layout = EstimatedLayout::from_elements(&els);

        let first = layout.bounds(0, &els[0].node).unwrap();
        let second = layout.bounds(1, &els[1].node).unwrap();
        assert_eq!(first.top, 0.0);
        assert_eq!(first.bottom, 3.0 * EstimatedLayout::LINE_HEIGHT);
        assert_eq!(second.top, first.bottom + EstimatedLayout::BLOCK_GAP);
        assert!(layout.bounds(2, &els[0].node).is_none());
    }
}
