//! 脱敏标记与页面级标记缓冲

use crate::document::{ImagePolicy, PdfBackend};
use crate::geometry::Rect;
use crate::Result;
use serde::{Deserialize, Serialize};

/// RGB 填充色，分量范围 0-1
pub type Rgb = [f32; 3];

pub const BLACK: Rgb = [0.0, 0.0, 0.0];

/// 单词及其在页面中的边界
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub rect: Rect,
}

impl Word {
    pub fn new(text: impl Into<String>, rect: Rect) -> Self {
        Self {
            text: text.into(),
            rect,
        }
    }
}

/// 脱敏标记
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RedactionMark {
    pub rect: Rect,
    /// `None` 表示纯移除，不绘制色块
    pub fill: Option<Rgb>,
}

impl RedactionMark {
    /// 只移除内容，不留覆盖块
    pub fn removal(rect: Rect) -> Self {
        Self { rect, fill: None }
    }

    /// 移除内容并绘制黑框
    pub fn black(rect: Rect) -> Self {
        Self {
            rect,
            fill: Some(BLACK),
        }
    }
}

/// 单页的标记缓冲
///
/// `commit` 消耗缓冲本身，标记不会存活到提交之后。
#[derive(Debug)]
pub struct MarkBuffer {
    page: usize,
    marks: Vec<RedactionMark>,
}

impl MarkBuffer {
    pub fn new(page: usize) -> Self {
        Self {
            page,
            marks: Vec::new(),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn push(&mut self, mark: RedactionMark) {
        self.marks.push(mark);
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// 通过一次后端调用提交全部标记，返回提交的标记数
    pub fn commit<B: PdfBackend + ?Sized>(self, backend: &mut B, images: ImagePolicy) -> Result<usize> {
        let count = self.marks.len();
        backend.apply_redactions(self.page, &self.marks, images)?;
        Ok(count)
    }
}
