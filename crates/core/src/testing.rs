//! 单元测试用的内存文档与 OCR 引擎

use crate::classify::{Classification, PageStats};
use crate::document::{ImagePlacement, ImagePolicy, PdfBackend, SaveOptions};
use crate::geometry::Rect;
use crate::marks::{RedactionMark, Word};
use crate::observer::PipelineObserver;
use crate::ocr::{OcrDetection, OcrEngine};
use crate::{RedactError, Result};
use image::DynamicImage;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;

const CHAR_WIDTH: f32 = 5.0;
const LINE_TOP: f32 = 100.0;
const LINE_BOTTOM: f32 = 112.0;
const LEFT_MARGIN: f32 = 10.0;
/// 已删除的字符
const REMOVED: char = '\0';

pub fn detection(text: &str, left: f32, top: f32, width: f32, height: f32) -> OcrDetection {
    OcrDetection {
        text: text.to_string(),
        left,
        top,
        width,
        height,
        confidence: 90.0,
    }
}

/// 单页内容：一行原生文字 + 图片 + 回写的不可见单词
#[derive(Debug, Clone)]
pub struct FakePage {
    pub bounds: Rect,
    pub chars: Vec<char>,
    pub images: Vec<ImagePlacement>,
    pub hidden: Vec<Word>,
}

impl FakePage {
    pub fn native(text: &str) -> Self {
        Self {
            bounds: Rect::new(0.0, 0.0, 612.0, 792.0),
            chars: text.chars().collect(),
            images: Vec::new(),
            hidden: Vec::new(),
        }
    }

    /// 整页图片，没有文字层
    pub fn scanned() -> Self {
        let bounds = Rect::new(0.0, 0.0, 612.0, 792.0);
        Self {
            bounds,
            chars: Vec::new(),
            images: vec![ImagePlacement {
                name: "Im0".into(),
                rect: Some(bounds),
            }],
            hidden: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.chars = text.chars().collect();
        self
    }

    fn char_rect(index: usize) -> Rect {
        let x0 = LEFT_MARGIN + index as f32 * CHAR_WIDTH;
        Rect::new(x0, LINE_TOP, x0 + CHAR_WIDTH, LINE_BOTTOM)
    }

    fn visible_text(&self) -> String {
        self.chars.iter().filter(|c| **c != REMOVED).collect()
    }

    fn search(&self, needle: &str) -> Vec<Rect> {
        let needle: Vec<char> = needle.to_lowercase().chars().collect();
        if needle.is_empty() {
            return Vec::new();
        }
        let hay: Vec<char> = self
            .chars
            .iter()
            .map(|c| c.to_lowercase().next().unwrap_or(*c))
            .collect();

        let mut hits = Vec::new();
        let mut i = 0;
        while i + needle.len() <= hay.len() {
            if hay[i..i + needle.len()] == needle[..] {
                let rect = (i + 1..i + needle.len())
                    .fold(Self::char_rect(i), |acc, j| acc.union(&Self::char_rect(j)));
                hits.push(rect);
                i += needle.len();
            } else {
                i += 1;
            }
        }

        let lowered = needle.iter().collect::<String>();
        for word in &self.hidden {
            let count = word.text.to_lowercase().matches(lowered.as_str()).count();
            hits.extend(std::iter::repeat(word.rect).take(count));
        }
        hits
    }
}

/// 后端调用记录，测试可在后端被消耗后继续读取
#[derive(Debug, Default)]
pub struct Journal {
    pub applied: Vec<(usize, Vec<RedactionMark>, ImagePolicy)>,
    pub inserted: Vec<(usize, String, Rect, f32)>,
    pub renders: Vec<(usize, f32)>,
    pub saved: Option<PathBuf>,
}

pub struct FakeBackend {
    pub pages: Vec<FakePage>,
    pub fail_images: bool,
    journal: Rc<RefCell<Journal>>,
}

impl FakeBackend {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            pages,
            fail_images: false,
            journal: Rc::default(),
        }
    }

    pub fn journal(&self) -> Rc<RefCell<Journal>> {
        self.journal.clone()
    }

    fn page(&self, page: usize) -> Result<&FakePage> {
        self.pages
            .get(page)
            .ok_or_else(|| RedactError::Pdf(format!("page {} out of range", page)))
    }

    fn page_mut(&mut self, page: usize) -> Result<&mut FakePage> {
        self.pages
            .get_mut(page)
            .ok_or_else(|| RedactError::Pdf(format!("page {} out of range", page)))
    }
}

impl PdfBackend for FakeBackend {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_bounds(&self, page: usize) -> Result<Rect> {
        Ok(self.page(page)?.bounds)
    }

    fn page_text(&mut self, page: usize) -> Result<String> {
        let page = self.page(page)?;
        let mut text = page.visible_text();
        for word in &page.hidden {
            text.push(' ');
            text.push_str(&word.text);
        }
        Ok(text)
    }

    fn image_placements(&mut self, page: usize) -> Result<Vec<ImagePlacement>> {
        if self.fail_images {
            return Err(RedactError::Pdf("broken XObject".into()));
        }
        Ok(self.page(page)?.images.clone())
    }

    fn text_blocks(&mut self, page: usize) -> Result<Vec<Rect>> {
        let page = self.page(page)?;
        let block = page
            .chars
            .iter()
            .enumerate()
            .filter(|(_, c)| **c != REMOVED)
            .map(|(i, _)| FakePage::char_rect(i))
            .reduce(|acc, r| acc.union(&r));
        Ok(block.into_iter().collect())
    }

    fn render_page(&mut self, page: usize, scale: f32) -> Result<DynamicImage> {
        let bounds = self.page(page)?.bounds;
        self.journal.borrow_mut().renders.push((page, scale));
        Ok(DynamicImage::new_luma8(
            (bounds.width() * scale) as u32,
            (bounds.height() * scale) as u32,
        ))
    }

    fn search_text(&mut self, page: usize, needle: &str) -> Result<Vec<Rect>> {
        Ok(self.page(page)?.search(needle))
    }

    fn apply_redactions(
        &mut self,
        page: usize,
        marks: &[RedactionMark],
        images: ImagePolicy,
    ) -> Result<()> {
        self.journal
            .borrow_mut()
            .applied
            .push((page, marks.to_vec(), images));

        let target = self.page_mut(page)?;
        let inside = |rect: &Rect| {
            let (cx, cy) = rect.center();
            marks.iter().any(|m| m.rect.contains_point(cx, cy))
        };
        for i in 0..target.chars.len() {
            if inside(&FakePage::char_rect(i)) {
                target.chars[i] = REMOVED;
            }
        }
        target.hidden.retain(|w| !inside(&w.rect));
        Ok(())
    }

    fn insert_invisible_text(
        &mut self,
        page: usize,
        text: &str,
        rect: &Rect,
        font_size: f32,
    ) -> Result<()> {
        self.journal
            .borrow_mut()
            .inserted
            .push((page, text.to_string(), *rect, font_size));
        self.page_mut(page)?.hidden.push(Word::new(text, *rect));
        Ok(())
    }

    fn save(&mut self, path: &Path, _options: &SaveOptions) -> Result<()> {
        self.journal.borrow_mut().saved = Some(path.to_path_buf());
        Ok(())
    }
}

/// 按调用顺序依次返回预设结果
pub struct ScriptedOcr {
    script: VecDeque<Vec<OcrDetection>>,
    calls: usize,
    pub fail: bool,
}

impl ScriptedOcr {
    pub fn new(script: Vec<Vec<OcrDetection>>) -> Self {
        Self {
            script: script.into(),
            calls: 0,
            fail: false,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl OcrEngine for ScriptedOcr {
    fn recognize(&mut self, _image: &DynamicImage) -> Result<Vec<OcrDetection>> {
        self.calls += 1;
        if self.fail {
            return Err(RedactError::Ocr("engine crashed".into()));
        }
        Ok(self.script.pop_front().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub classified: Vec<(usize, Classification)>,
    pub stripped: Vec<usize>,
    pub matches: Vec<(usize, String, usize)>,
    pub finished: Option<usize>,
    pub saved: Option<PathBuf>,
}

impl PipelineObserver for RecordingObserver {
    fn page_classified(&mut self, page: usize, class: Classification, _stats: &PageStats) {
        self.classified.push((page, class));
    }

    fn page_stripped(&mut self, page: usize, _blocks: usize) {
        self.stripped.push(page);
    }

    fn term_matched(&mut self, page: usize, term: &str, count: usize) {
        self.matches.push((page, term.to_string(), count));
    }

    fn finished(&mut self, total: usize) {
        self.finished = Some(total);
    }

    fn saved(&mut self, path: &Path) {
        self.saved = Some(path.to_path_buf());
    }
}
