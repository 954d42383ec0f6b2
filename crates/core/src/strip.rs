//! 清除扫描页上残留的文字层
//!
//! 扫描页上可能已有不可靠的旧 OCR 文字，重新识别前先整块移除，
//! 图片内容保持不变。

use crate::document::{ImagePolicy, PdfBackend};
use crate::marks::{MarkBuffer, RedactionMark};
use crate::pipeline::{PageState, StageContext};
use crate::Result;

/// 移除指定页面上的全部文本块；页面列表为空时什么也不做
pub fn strip_text<B: PdfBackend + ?Sized>(
    backend: &mut B,
    pages: &[usize],
    ctx: &mut StageContext<'_>,
) -> Result<()> {
    for &page in pages {
        ctx.checkpoint()?;

        let blocks = backend.text_blocks(page)?;
        let mut buffer = MarkBuffer::new(page);
        for rect in blocks {
            buffer.push(RedactionMark::removal(rect));
        }
        let removed = buffer.commit(backend, ImagePolicy::Preserve)?;

        log::debug!("[Strip] 页面 {} 移除 {} 个文本块", page, removed);
        ctx.advance(page, PageState::Stripped);
        ctx.observer().page_stripped(page, removed);
    }
    Ok(())
}
