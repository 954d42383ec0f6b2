//! 流水线进度回调
//!
//! 核心流程不直接输出进度，而是在各阶段边界通知观察者。

use crate::classify::{Classification, PageStats};
use crate::marks::Word;
use std::path::Path;

/// 阶段边界回调，所有方法默认不做任何事
pub trait PipelineObserver {
    fn page_classified(&mut self, _page: usize, _class: Classification, _stats: &PageStats) {}

    fn page_stripped(&mut self, _page: usize, _blocks: usize) {}

    fn page_ocr(&mut self, _page: usize, _words: &[Word]) {}

    fn term_matched(&mut self, _page: usize, _term: &str, _count: usize) {}

    fn page_redacted(&mut self, _page: usize, _marks: usize) {}

    fn finished(&mut self, _total: usize) {}

    fn saved(&mut self, _path: &Path) {}
}

/// 不输出任何内容
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// 通过 `log` 输出进度
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl PipelineObserver for LogObserver {
    fn page_classified(&mut self, page: usize, class: Classification, stats: &PageStats) {
        log::info!(
            "[Pipeline] 页面 {} 分类为 {} (text_len={}, coverage={:.3})",
            page + 1,
            class,
            stats.text_len,
            stats.image_coverage
        );
    }

    fn page_stripped(&mut self, page: usize, blocks: usize) {
        log::info!("[Pipeline] 页面 {} 已清除 {} 个文本块", page + 1, blocks);
    }

    fn page_ocr(&mut self, page: usize, words: &[Word]) {
        log::info!("[Pipeline] 页面 {} OCR 识别 {} 个单词", page + 1, words.len());
    }

    fn term_matched(&mut self, page: usize, term: &str, count: usize) {
        log::info!("[Pipeline] 页面 {}: '{}' 命中 {} 处", page + 1, term, count);
    }

    fn page_redacted(&mut self, page: usize, marks: usize) {
        log::debug!("[Pipeline] 页面 {} 提交 {} 个标记", page + 1, marks);
    }

    fn finished(&mut self, total: usize) {
        log::info!("[Pipeline] 共脱敏 {} 处", total);
    }

    fn saved(&mut self, path: &Path) {
        log::info!("[Pipeline] 已保存到 {}", path.display());
    }
}
