//! 基于 lopdf 的 PDF 后端
//!
//! 文字提取、搜索与脱敏都直接在内容流上完成（见 [`content`] 与 [`redact`]），
//! 字符码经 [`font`] 解码；pdfium 只负责把页面渲染成位图供 OCR 使用。

pub mod content;
pub mod error;
pub mod font;
pub mod metadata;
pub mod redact;
pub mod render;
pub mod text_layer;
pub mod utils;

pub use error::{PdfError, Result};

use content::{walk, PageLayout, PageResources};
use image::DynamicImage;
use lopdf::content::Operation;
use lopdf::{Document, ObjectId};
use redactor_core::{ImagePlacement, ImagePolicy, PdfBackend, Rect, RedactionMark, SaveOptions};
use render::Renderer;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use utils::PageGeometry;

/// 打开文档时的选项
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// 优先搜索的 pdfium 库目录
    pub pdfium_path: Option<PathBuf>,
    /// 不加载 pdfium（无法渲染页面）
    pub disable_pdfium: bool,
}

/// 一个打开的 PDF 文档
pub struct PdfDocument {
    doc: Document,
    page_ids: Vec<ObjectId>,
    /// 尚未写入内容流的不可见文字
    pending_text: BTreeMap<usize, Vec<Operation>>,
    /// 已登记 OCR 字体的页面
    font_pages: BTreeSet<usize>,
    ocr_font: Option<ObjectId>,
    options: OpenOptions,
    /// 首次渲染时绑定
    renderer: Option<Renderer>,
    /// 渲染用的序列化快照，任何修改后失效
    snapshot: Option<Vec<u8>>,
    /// 被复制过的原表单，保存前检查是否仍被绘制
    detached_forms: BTreeSet<ObjectId>,
}

impl PdfDocument {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &OpenOptions::default())
    }

    pub fn open_with(path: &Path, options: &OpenOptions) -> Result<Self> {
        log::info!("[PDF] 打开文档: {:?}", path);
        let doc = Document::load(path).map_err(|e| PdfError::Load(format!("{:?}: {}", path, e)))?;
        if doc.is_encrypted() {
            return Err(PdfError::Load(format!("{:?}: 不支持加密文档", path)));
        }

        Ok(Self::with_options(doc, options.clone()))
    }

    /// 包装内存中的文档（不加载 pdfium）
    pub fn from_document(doc: Document) -> Self {
        let options = OpenOptions {
            disable_pdfium: true,
            ..Default::default()
        };
        Self::with_options(doc, options)
    }

    fn with_options(doc: Document, options: OpenOptions) -> Self {
        let page_ids = doc.get_pages().into_values().collect();
        Self {
            doc,
            page_ids,
            pending_text: BTreeMap::new(),
            font_pages: BTreeSet::new(),
            ocr_font: None,
            options,
            renderer: None,
            snapshot: None,
            detached_forms: BTreeSet::new(),
        }
    }

    /// 只有扫描页需要渲染，原生文档不会加载 pdfium
    fn renderer(&mut self) -> Result<&Renderer> {
        if self.options.disable_pdfium {
            return Err(PdfError::Unavailable("已禁用 pdfium，无法渲染页面".to_string()));
        }
        if self.renderer.is_none() {
            let renderer = Renderer::bind(self.options.pdfium_path.as_deref())?;
            log::info!("[Pdfium] 渲染器已就绪");
            self.renderer = Some(renderer);
        }
        self.renderer
            .as_ref()
            .ok_or_else(|| PdfError::Unavailable("pdfium 未绑定".to_string()))
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    fn page_id(&self, page: usize) -> Result<ObjectId> {
        self.page_ids
            .get(page)
            .copied()
            .ok_or(PdfError::PageOutOfRange(page))
    }

    /// 把缓存的不可见文字写入页面内容流
    fn flush(&mut self, page: usize) -> Result<()> {
        let Some(extra) = self.pending_text.remove(&page) else {
            return Ok(());
        };
        let page_id = self.page_id(page)?;
        let mut operations = utils::decode_page_operations(&self.doc, page_id)?;
        log::debug!("[OCR] 页面 {} 写入 {} 条文字层操作", page, extra.len());
        operations.extend(extra);
        utils::set_page_operations(&mut self.doc, page_id, operations)
    }

    fn flush_all(&mut self) -> Result<()> {
        let pages: Vec<usize> = self.pending_text.keys().copied().collect();
        for page in pages {
            self.flush(page)?;
        }
        Ok(())
    }

    /// 解析页面：操作序列、字形布局和几何信息
    fn layout(&mut self, page: usize) -> Result<(Vec<Operation>, PageLayout, PageGeometry)> {
        self.flush(page)?;
        let page_id = self.page_id(page)?;
        let geometry = PageGeometry::load(&self.doc, page_id);
        let resources = PageResources::load(&self.doc, page_id);
        let operations = utils::decode_page_operations(&self.doc, page_id)?;
        let layout = walk(&operations, &geometry, &resources);
        Ok((operations, layout, geometry))
    }

    fn refresh_snapshot(&mut self) -> Result<()> {
        if self.snapshot.is_none() {
            self.flush_all()?;
            let mut bytes = Vec::new();
            self.doc.save_to(&mut bytes)?;
            self.snapshot = Some(bytes);
        }
        Ok(())
    }

    fn ocr_font(&mut self, page: usize) -> Result<()> {
        let font_id = match self.ocr_font {
            Some(id) => id,
            None => {
                let id = self.doc.add_object(text_layer::font_dictionary());
                self.ocr_font = Some(id);
                id
            }
        };
        if self.font_pages.insert(page) {
            let page_id = self.page_id(page)?;
            text_layer::install_font(&mut self.doc, page_id, font_id)?;
        }
        Ok(())
    }

    /// 原表单可能仍挂在共享的资源字典上，已无页面绘制时清空其内容
    fn scrub_detached_forms(&mut self) -> Result<()> {
        if self.detached_forms.is_empty() {
            return Ok(());
        }
        let mut drawn = BTreeSet::new();
        for page in 0..self.page_ids.len() {
            let (_, layout, _) = self.layout(page)?;
            drawn.extend(layout.forms.into_iter().map(|f| f.id));
        }
        let detached = std::mem::take(&mut self.detached_forms);
        for id in detached.difference(&drawn) {
            log::debug!("[Form] 清空不再绘制的原表单 {:?}", id);
            utils::set_form_operations(&mut self.doc, *id, Vec::new())?;
        }
        Ok(())
    }

    fn save_document(&mut self, path: &Path, options: &SaveOptions) -> Result<()> {
        self.flush_all()?;
        self.scrub_detached_forms()?;
        metadata::set_redaction_metadata(&mut self.doc)?;

        if options.garbage_collect {
            let pruned = self.doc.prune_objects();
            log::info!("[Save] 清理了 {} 个未引用对象", pruned.len());
            self.doc.renumber_objects();
        }
        if options.compress {
            self.doc.compress();
        }

        // 先写临时文件再改名，失败时不会留下半个输出文件
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        self.doc.save_to(&mut tmp)?;
        tmp.persist(path).map_err(|e| PdfError::Io(e.error))?;

        // 对象编号可能已变化
        self.page_ids = self.doc.get_pages().into_values().collect();
        self.ocr_font = None;
        self.font_pages.clear();
        self.snapshot = None;
        log::info!("[Save] 已保存: {:?}", path);
        Ok(())
    }
}

impl PdfBackend for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page_bounds(&self, page: usize) -> redactor_core::Result<Rect> {
        let page_id = self.page_id(page)?;
        Ok(PageGeometry::load(&self.doc, page_id).bounds())
    }

    fn page_text(&mut self, page: usize) -> redactor_core::Result<String> {
        let (_, layout, _) = self.layout(page)?;
        Ok(layout.text())
    }

    fn image_placements(&mut self, page: usize) -> redactor_core::Result<Vec<ImagePlacement>> {
        let (_, layout, _) = self.layout(page)?;
        Ok(layout
            .images
            .into_iter()
            .map(|draw| ImagePlacement {
                name: String::from_utf8_lossy(&draw.name).into_owned(),
                rect: draw.rect,
            })
            .collect())
    }

    fn text_blocks(&mut self, page: usize) -> redactor_core::Result<Vec<Rect>> {
        let (_, layout, _) = self.layout(page)?;
        Ok(layout.text_blocks())
    }

    fn render_page(&mut self, page: usize, scale: f32) -> redactor_core::Result<DynamicImage> {
        let page_id = self.page_id(page)?;
        let geometry = PageGeometry::load(&self.doc, page_id);
        let width = (geometry.width() * scale).round() as i32;
        let height = (geometry.height() * scale).round() as i32;

        self.renderer()?;
        self.refresh_snapshot()?;
        match (&self.renderer, &self.snapshot) {
            (Some(renderer), Some(bytes)) => Ok(renderer.render(bytes, page, width, height)?),
            _ => Err(PdfError::Unavailable("渲染快照不可用".to_string()).into()),
        }
    }

    fn search_text(&mut self, page: usize, needle: &str) -> redactor_core::Result<Vec<Rect>> {
        let (_, layout, _) = self.layout(page)?;
        Ok(layout.search(needle))
    }

    fn apply_redactions(
        &mut self,
        page: usize,
        marks: &[RedactionMark],
        images: ImagePolicy,
    ) -> redactor_core::Result<()> {
        if marks.is_empty() {
            return Ok(());
        }
        let (operations, layout, geometry) = self.layout(page)?;
        let rewrite = redact::apply_marks(operations, &layout, marks, images, &geometry);
        log::info!(
            "[Redact] 页面 {}: {} 个标记，删除 {} 个字形，移除 {} 处图片，改写 {} 个表单",
            page + 1,
            marks.len(),
            rewrite.glyphs_removed,
            rewrite.images_removed,
            rewrite.forms.len()
        );

        let page_id = self.page_id(page)?;
        // 表单可能被其他页面共用，先复制出本页专属的副本再改写
        for form in rewrite.forms {
            let detached = utils::detach_form(&mut self.doc, page_id, &form.path)?;
            utils::set_form_operations(&mut self.doc, detached.copy, form.operations)?;
            self.detached_forms.extend(detached.originals);
        }
        utils::set_page_operations(&mut self.doc, page_id, rewrite.operations)?;
        self.snapshot = None;
        Ok(())
    }

    fn insert_invisible_text(
        &mut self,
        page: usize,
        text: &str,
        rect: &Rect,
        font_size: f32,
    ) -> redactor_core::Result<()> {
        let page_id = self.page_id(page)?;
        let geometry = PageGeometry::load(&self.doc, page_id);
        let operations = text_layer::invisible_text_ops(text, rect, font_size, &geometry);
        if operations.is_empty() {
            return Ok(());
        }
        self.ocr_font(page)?;
        self.pending_text.entry(page).or_default().extend(operations);
        self.snapshot = None;
        Ok(())
    }

    fn save(&mut self, path: &Path, options: &SaveOptions) -> redactor_core::Result<()> {
        Ok(self.save_document(path, options)?)
    }
}
