//! Tesseract OCR 集成
//!
//! 通过 tesseract 命令行识别渲染后的扫描页，输出单词级像素框。

mod error;
mod tesseract;

pub use error::OcrError;
pub use tesseract::{get_tesseract_version, parse_tesseract_tsv, TesseractConfig, TesseractEngine};
