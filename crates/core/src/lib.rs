//! 脱敏任务的核心流程
//!
//! 流水线先把每一页判定为原生页或扫描页，清理扫描页的旧文字层并做 OCR，
//! 随后对每个词语脱敏并保存结果。PDF 访问与 OCR 分别通过
//! [`PdfBackend`] 和 [`OcrEngine`] trait 接入。

pub mod classify;
pub mod document;
pub mod extract;
pub mod geometry;
pub mod marks;
pub mod matcher;
pub mod observer;
pub mod ocr;
pub mod persist;
pub mod pipeline;
pub mod strip;
pub mod terms;
pub mod verify;

#[cfg(test)]
mod testing;

pub use classify::{classify, classify_page, Classification, PageStats};
pub use document::{ImagePlacement, ImagePolicy, PdfBackend, SaveOptions};
pub use extract::{extract_ocr_words, OcrIndex, DEFAULT_DPI};
pub use geometry::{page_rect_to_pixels, pixel_box_to_page, Rect};
pub use marks::{MarkBuffer, RedactionMark, Word};
pub use matcher::{match_words, redact};
pub use observer::{LogObserver, NoopObserver, PipelineObserver};
pub use ocr::{OcrDetection, OcrEngine};
pub use persist::{finalize, output_path_for, REDACTED_SUFFIX};
pub use pipeline::{
    redact_pdf, CancelFlag, PageState, Pipeline, PipelineOptions, RedactReport, StageContext,
};
pub use strip::strip_text;
pub use terms::TermSet;
pub use verify::{verify_output, VerifyResult};

pub type Result<T> = std::result::Result<T, RedactError>;

#[derive(Debug, thiserror::Error)]
pub enum RedactError {
    #[error("invalid input: {0}")]
    Input(String),
    #[error("pdf backend error: {0}")]
    Pdf(String),
    #[error("ocr backend error: {0}")]
    Ocr(String),
    #[error("operation cancelled by user")]
    Interrupted,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
