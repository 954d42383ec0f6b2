//! 页面渲染
//!
//! 使用 pdfium-render 把页面渲染为位图，供 OCR 识别。

use crate::error::{PdfError, Result};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};

/// 获取 pdfium 库的搜索路径
fn get_pdfium_search_paths(configured: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. 显式配置的目录
    if let Some(dir) = configured {
        paths.push(dir.to_path_buf());
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            // 2. 可执行文件同级的 libs 目录
            paths.push(exe_dir.join("libs"));
            // 3. 可执行文件同级目录
            paths.push(exe_dir.to_path_buf());
        }
    }

    // 4. 当前目录
    paths.push(PathBuf::from("libs"));
    paths.push(PathBuf::from("./"));

    paths
}

/// 尝试绑定 pdfium 库，最后退回系统库
fn bind_pdfium(configured: Option<&Path>) -> Result<Pdfium> {
    for path in &get_pdfium_search_paths(configured) {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(path);
        log::debug!("[Pdfium] 尝试加载 pdfium: {:?}", lib_path);

        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            log::info!("[Pdfium] 成功从 {:?} 加载 pdfium", path);
            return Ok(Pdfium::new(bindings));
        }
    }

    log::debug!("[Pdfium] 尝试加载系统 pdfium 库");
    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| PdfError::Unavailable(e.to_string()))
}

/// 持有 pdfium 绑定的渲染器
pub struct Renderer {
    pdfium: Pdfium,
}

impl Renderer {
    pub fn bind(configured: Option<&Path>) -> Result<Self> {
        Ok(Self {
            pdfium: bind_pdfium(configured)?,
        })
    }

    /// 按目标像素尺寸渲染 `bytes` 中的第 `page` 页（从 0 开始）
    pub fn render(
        &self,
        bytes: &[u8],
        page: usize,
        target_width: i32,
        target_height: i32,
    ) -> Result<DynamicImage> {
        let index = u16::try_from(page).map_err(|_| PdfError::PageOutOfRange(page))?;
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| PdfError::Pdfium(format!("加载 PDF 失败: {}", e)))?;
        let pdf_page = document
            .pages()
            .get(index)
            .map_err(|e| PdfError::Pdfium(format!("获取页面 {} 失败: {}", page, e)))?;

        log::info!(
            "[Pdfium] 页面 {}: {}x{} pt -> {}x{} px",
            page,
            pdf_page.width().value,
            pdf_page.height().value,
            target_width,
            target_height
        );

        let config = PdfRenderConfig::new()
            .set_target_width(target_width.max(1))
            .set_target_height(target_height.max(1));
        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|e| PdfError::Pdfium(format!("渲染页面失败: {}", e)))?;

        Ok(bitmap.as_image())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_path_searched_first() {
        let paths = get_pdfium_search_paths(Some(Path::new("/opt/pdfium/lib")));
        assert_eq!(paths[0], PathBuf::from("/opt/pdfium/lib"));
        assert_eq!(paths.last(), Some(&PathBuf::from("./")));
    }
}
