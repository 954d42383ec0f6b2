//! 扫描页 OCR：渲染、识别，并把识别结果作为不可见文字写回页面

use crate::document::PdfBackend;
use crate::geometry::{pixel_box_to_page, render_scale};
use crate::marks::Word;
use crate::ocr::{OcrDetection, OcrEngine};
use crate::pipeline::{PageState, StageContext};
use crate::{RedactError, Result};
use std::collections::BTreeMap;

/// 默认渲染分辨率
pub const DEFAULT_DPI: u32 = 300;

/// 插入文字的字号 = 单词框高度 × 该比例
const FONT_SIZE_RATIO: f32 = 0.8;

/// 页码 → 该页 OCR 单词（页面坐标），只包含扫描页
pub type OcrIndex = BTreeMap<usize, Vec<Word>>;

/// 对扫描页做 OCR
///
/// 每个非空单词都会以不可见文字写回对应位置，使输出文件可搜索；
/// 同时返回单词索引供匹配阶段使用。OCR 失败直接返回错误。
pub fn extract_ocr_words<B, O>(
    backend: &mut B,
    pages: &[usize],
    dpi: u32,
    ocr: &mut O,
    ctx: &mut StageContext<'_>,
) -> Result<OcrIndex>
where
    B: PdfBackend + ?Sized,
    O: OcrEngine + ?Sized,
{
    let mut index = OcrIndex::new();
    if pages.is_empty() {
        return Ok(index);
    }
    if dpi == 0 {
        return Err(RedactError::Input("dpi must be greater than zero".into()));
    }

    let scale = render_scale(dpi);
    for &page in pages {
        ctx.checkpoint()?;

        let image = backend.render_page(page, scale)?;
        log::info!(
            "[OCR] 页面 {} 渲染完成 {}x{}，使用 {} 识别",
            page,
            image.width(),
            image.height(),
            ocr.name()
        );
        let detections = ocr.recognize(&image)?;
        let words = write_back(backend, page, &detections, dpi)?;
        log::info!(
            "[OCR] 页面 {}: {} 个检测结果，写回 {} 个单词",
            page,
            detections.len(),
            words.len()
        );

        ctx.advance(page, PageState::Ocred);
        ctx.observer().page_ocr(page, &words);
        index.insert(page, words);
    }

    Ok(index)
}

fn write_back<B: PdfBackend + ?Sized>(
    backend: &mut B,
    page: usize,
    detections: &[OcrDetection],
    dpi: u32,
) -> Result<Vec<Word>> {
    let mut words = Vec::with_capacity(detections.len());
    for det in detections {
        let text = det.text.trim();
        if text.is_empty() {
            continue;
        }
        let rect = pixel_box_to_page(det.left, det.top, det.width, det.height, dpi);
        backend.insert_invisible_text(page, text, &rect, rect.height() * FONT_SIZE_RATIO)?;
        words.push(Word::new(text, rect));
    }
    Ok(words)
}
