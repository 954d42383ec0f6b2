//! 页面分类：原生文字页 / 扫描页

use crate::document::{ImagePlacement, PdfBackend};
use crate::geometry::Rect;
use crate::Result;
use serde::{Deserialize, Serialize};

/// 文字足够多时视为原生文字页
const NATIVE_TEXT_LEN: usize = 100;
/// 文字足够少时视为扫描页
const SPARSE_TEXT_LEN: usize = 50;
const LOW_IMAGE_COVERAGE: f64 = 0.5;
const HIGH_IMAGE_COVERAGE: f64 = 0.8;

/// 页面分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// 文字以矢量文本形式存储
    Native,
    /// 内容主要是图片，需要 OCR
    Scanned,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Native => write!(f, "native"),
            Classification::Scanned => write!(f, "scanned"),
        }
    }
}

/// 分类依据
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageStats {
    /// 去除首尾空白后的文字长度（字符数）
    pub text_len: usize,
    /// 图片面积之和 / 页面面积
    pub image_coverage: f64,
}

/// 按固定顺序判定页面类型
pub fn classify(stats: &PageStats) -> Classification {
    let PageStats {
        text_len,
        image_coverage,
    } = *stats;

    if text_len > NATIVE_TEXT_LEN && image_coverage < LOW_IMAGE_COVERAGE {
        Classification::Native
    } else if text_len < SPARSE_TEXT_LEN && image_coverage > HIGH_IMAGE_COVERAGE {
        Classification::Scanned
    } else if image_coverage > HIGH_IMAGE_COVERAGE {
        Classification::Scanned
    } else if text_len > SPARSE_TEXT_LEN {
        Classification::Native
    } else {
        // 无法判断时按扫描页处理：宁可多做 OCR，也不漏掉可脱敏的文字
        Classification::Scanned
    }
}

/// 计算图片覆盖率；页面面积为 0 时覆盖率为 0
///
/// 无法解析放置区域的图片按零面积累加。
pub fn image_coverage(page: &Rect, images: &[ImagePlacement]) -> f64 {
    let page_area = page.area() as f64;
    if page_area <= 0.0 {
        return 0.0;
    }

    let covered: f64 = images
        .iter()
        .map(|image| match &image.rect {
            Some(rect) => rect.area() as f64,
            None => {
                log::debug!("[Classify] 图片 {} 放置区域未知，按 0 计", image.name);
                0.0
            }
        })
        .sum();

    covered / page_area
}

/// 收集页面的分类依据
pub fn page_stats<B: PdfBackend + ?Sized>(backend: &mut B, page: usize) -> Result<PageStats> {
    let text = backend.page_text(page)?;
    let text_len = text.trim().chars().count();

    let bounds = backend.page_bounds(page)?;
    let images = match backend.image_placements(page) {
        Ok(images) => images,
        Err(e) => {
            log::warn!("[Classify] 页面 {} 图片枚举失败: {}，按无图片处理", page, e);
            Vec::new()
        }
    };

    Ok(PageStats {
        text_len,
        image_coverage: image_coverage(&bounds, &images),
    })
}

/// 对单页分类
pub fn classify_page<B: PdfBackend + ?Sized>(
    backend: &mut B,
    page: usize,
) -> Result<(Classification, PageStats)> {
    let stats = page_stats(backend, page)?;
    let class = classify(&stats);
    log::info!(
        "[Classify] 页面 {}: text_len={}, coverage={:.3} -> {}",
        page,
        stats.text_len,
        stats.image_coverage,
        class
    );
    Ok((class, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, FakePage};
    use Classification::{Native as N, Scanned as S};

    fn stats(text_len: usize, image_coverage: f64) -> PageStats {
        PageStats {
            text_len,
            image_coverage,
        }
    }

    #[test]
    fn test_boundary_grid() {
        let lens = [49, 50, 51, 99, 100, 101];
        let table: [(f64, [Classification; 6]); 6] = [
            (0.49, [S, S, N, N, N, N]),
            (0.5, [S, S, N, N, N, N]),
            (0.51, [S, S, N, N, N, N]),
            (0.79, [S, S, N, N, N, N]),
            (0.8, [S, S, N, N, N, N]),
            (0.81, [S, S, S, S, S, S]),
        ];

        for (coverage, expected) in table {
            for (len, want) in lens.iter().zip(expected) {
                assert_eq!(
                    classify(&stats(*len, coverage)),
                    want,
                    "text_len={} coverage={}",
                    len,
                    coverage
                );
            }
        }
    }

    #[test]
    fn test_long_text_low_coverage_is_native() {
        assert_eq!(classify(&stats(5000, 0.0)), N);
        assert_eq!(classify(&stats(101, 0.499)), N);
    }

    #[test]
    fn test_ambiguous_defaults_to_scanned() {
        assert_eq!(classify(&stats(0, 0.0)), S);
        assert_eq!(classify(&stats(50, 0.3)), S);
    }

    #[test]
    fn test_coverage_ignores_unknown_placements() {
        let page = Rect::new(0.0, 0.0, 100.0, 100.0);
        let images = vec![
            ImagePlacement {
                name: "Im0".into(),
                rect: Some(Rect::new(0.0, 0.0, 100.0, 50.0)),
            },
            ImagePlacement {
                name: "Im1".into(),
                rect: None,
            },
        ];
        assert!((image_coverage(&page, &images) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_area_page_has_zero_coverage() {
        let images = vec![ImagePlacement {
            name: "Im0".into(),
            rect: Some(Rect::new(0.0, 0.0, 10.0, 10.0)),
        }];
        assert_eq!(image_coverage(&Rect::default(), &images), 0.0);
    }

    #[test]
    fn test_classify_page_from_backend() {
        let mut backend = FakeBackend::new(vec![
            FakePage::native("   short   "),
            FakePage::scanned(),
        ]);
        let (class, stats) = classify_page(&mut backend, 0).unwrap();
        assert_eq!(stats.text_len, 5);
        assert_eq!(class, S);

        let (class, stats) = classify_page(&mut backend, 1).unwrap();
        assert_eq!(class, S);
        assert!((stats.image_coverage - 1.0).abs() < 1e-6);
    }
}
