//! 页面坐标系与像素坐标系之间的转换
//!
//! 页面坐标：PDF 点（1/72 英寸），原点在页面左上角，y 轴向下。
//! 像素坐标：按 `dpi / 72` 倍率渲染后的图片坐标，原点同样在左上角。

use serde::{Deserialize, Serialize};

/// PDF 原生分辨率
pub const PDF_DPI: f32 = 72.0;

/// 页面坐标系中的矩形
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    /// 两个矩形在垂直方向上是否处于同一行
    pub fn same_line(&self, other: &Rect) -> bool {
        let (_, cy) = self.center();
        let (_, other_cy) = other.center();
        (other.y0 <= cy && cy <= other.y1) || (self.y0 <= other_cy && other_cy <= self.y1)
    }
}

/// 渲染倍率：页面坐标 × scale = 像素坐标
pub fn render_scale(dpi: u32) -> f32 {
    dpi as f32 / PDF_DPI
}

/// 将 OCR 输出的像素框（left, top, width, height）转换回页面坐标
///
/// 四条边都按 `pixel * 72 / dpi` 换算，是渲染倍率的精确逆变换。
pub fn pixel_box_to_page(left: f32, top: f32, width: f32, height: f32, dpi: u32) -> Rect {
    let dpi = dpi as f32;
    Rect::new(
        left * PDF_DPI / dpi,
        top * PDF_DPI / dpi,
        (left + width) * PDF_DPI / dpi,
        (top + height) * PDF_DPI / dpi,
    )
}

/// 页面坐标 → 像素坐标（渲染时的正向变换）
pub fn page_rect_to_pixels(rect: &Rect, dpi: u32) -> Rect {
    let scale = render_scale(dpi);
    Rect::new(
        rect.x0 * scale,
        rect.y0 * scale,
        rect.x1 * scale,
        rect.y1 * scale,
    )
}
