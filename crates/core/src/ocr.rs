//! OCR 引擎 trait 定义

use crate::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// OCR 识别出的单词（像素坐标）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrDetection {
    pub text: String,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    /// 置信度（0-100）
    pub confidence: f32,
}

/// OCR 引擎统一 trait
///
/// 返回的结果允许包含空白文本，由调用方过滤。
pub trait OcrEngine {
    /// 识别图片中的单词
    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<OcrDetection>>;

    /// 引擎名称，用于日志
    fn name(&self) -> &str {
        "ocr"
    }
}

impl<T: OcrEngine + ?Sized> OcrEngine for &mut T {
    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<OcrDetection>> {
        (**self).recognize(image)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
