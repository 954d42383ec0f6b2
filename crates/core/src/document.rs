//! 统一 PDF 后端接口定义
//!
//! 流水线只通过 `PdfBackend` 访问文档。所有坐标均为页面坐标
//! （点，左上角原点，y 向下），后端负责与 PDF 用户空间互相转换。

use crate::geometry::Rect;
use crate::marks::RedactionMark;
use crate::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 页面中一次图片放置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePlacement {
    /// XObject 资源名
    pub name: String,
    /// 放置区域；无法解析时为 `None`，按零面积处理
    pub rect: Option<Rect>,
}

/// 应用脱敏标记时对图片的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImagePolicy {
    /// 保留图片内容不变
    #[default]
    Preserve,
    /// 移除与标记区域相交的图片放置
    RemoveOverlapping,
}

/// 保存选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOptions {
    /// 清理不再被引用的对象（旧内容流必须被清掉，否则原文仍在文件中）
    pub garbage_collect: bool,
    /// 压缩流
    pub compress: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            garbage_collect: true,
            compress: true,
        }
    }
}

/// PDF 后端
///
/// 文档句柄在整个流水线期间被独占持有，drop 即释放。
pub trait PdfBackend {
    /// 页数
    fn page_count(&self) -> usize;

    /// 页面边界（页面坐标，左上角为原点）
    fn page_bounds(&self, page: usize) -> Result<Rect>;

    /// 提取页面纯文本
    fn page_text(&mut self, page: usize) -> Result<String>;

    /// 枚举页面中的图片及其放置区域
    fn image_placements(&mut self, page: usize) -> Result<Vec<ImagePlacement>>;

    /// 页面中每个文本块的边界
    fn text_blocks(&mut self, page: usize) -> Result<Vec<Rect>>;

    /// 按倍率渲染页面（scale = dpi / 72）
    fn render_page(&mut self, page: usize, scale: f32) -> Result<DynamicImage>;

    /// 大小写不敏感的字面量搜索，返回每处命中的边界
    fn search_text(&mut self, page: usize, needle: &str) -> Result<Vec<Rect>>;

    /// 一次性提交页面的全部标记：标记区域内的文字被永久移除，
    /// 带填充色的标记再绘制色块
    fn apply_redactions(
        &mut self,
        page: usize,
        marks: &[RedactionMark],
        images: ImagePolicy,
    ) -> Result<()>;

    /// 以不可见（不渲染）方式插入一段文字，起点为 `rect` 左上角
    fn insert_invisible_text(
        &mut self,
        page: usize,
        text: &str,
        rect: &Rect,
        font_size: f32,
    ) -> Result<()>;

    /// 序列化整个文档到 `path`
    fn save(&mut self, path: &Path, options: &SaveOptions) -> Result<()>;
}
