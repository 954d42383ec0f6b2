//! OCR 错误类型

use redactor_core::RedactError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("tesseract 不可用: {0}")]
    Unavailable(String),

    #[error("tesseract 执行失败: {0}")]
    Command(String),

    #[error("图像处理失败: {0}")]
    ImageProcess(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl From<OcrError> for RedactError {
    fn from(e: OcrError) -> Self {
        RedactError::Ocr(e.to_string())
    }
}
