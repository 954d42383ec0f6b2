//! 内容流分析
//!
//! 逐条解释页面操作符，跟踪图形状态与文字状态，得到每个字形在页面坐标中的
//! 位置，以及每次图片绘制的放置区域。表单 XObject 按其 /Matrix 与资源递归展开。
//! 文字提取、搜索与脱敏都以这里的字形定位为准。

use crate::utils::{
    get_number, get_stream_content, inherited, matrix_operands, multiply, resolve, resolve_dict,
    Matrix, PageGeometry, IDENTITY,
};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use redactor_core::Rect;
use std::collections::HashMap;

pub use crate::font::FontMetrics;

/// 字形框相对基线的上下沿（以字号为单位）
const ASCENT: f32 = 0.8;
const DESCENT: f32 = -0.2;
/// 同一行两个字形之间超过该间距（以字号为单位）视为词间空格
const WORD_GAP: f32 = 0.15;
/// 表单嵌套的最大深度
const MAX_FORM_DEPTH: usize = 8;

/// 页面上可被 `Do` 绘制的对象
#[derive(Debug)]
pub enum XObjectKind {
    Image,
    Form(Box<FormXObject>),
    Other,
}

/// 已解析的表单 XObject
#[derive(Debug)]
pub struct FormXObject {
    pub id: ObjectId,
    pub matrix: Matrix,
    pub operations: Vec<Operation>,
    /// 表单没有自己的 /Resources 时沿用调用方的资源
    pub resources: Option<PageResources>,
}

/// 页面资源中与分析相关的部分
#[derive(Debug, Default)]
pub struct PageResources {
    pub fonts: HashMap<Vec<u8>, FontMetrics>,
    pub xobjects: HashMap<Vec<u8>, XObjectKind>,
}

impl PageResources {
    pub fn load(doc: &Document, page_id: ObjectId) -> Self {
        match inherited(doc, page_id, b"Resources").and_then(|o| o.as_dict().ok()) {
            Some(dict) => Self::from_dict(doc, dict, 0),
            None => Self::default(),
        }
    }

    fn from_dict(doc: &Document, dict: &Dictionary, depth: usize) -> Self {
        let mut resources = Self::default();

        if let Some(fonts) = dict.get(b"Font").ok().and_then(|o| resolve_dict(doc, o)) {
            for (name, font) in fonts.iter() {
                let metrics = match resolve_dict(doc, font) {
                    Some(font) => FontMetrics::load(doc, font),
                    None => FontMetrics::estimated(),
                };
                resources.fonts.insert(name.clone(), metrics);
            }
        }

        if let Some(xobjects) = dict.get(b"XObject").ok().and_then(|o| resolve_dict(doc, o)) {
            for (name, obj) in xobjects.iter() {
                let kind = match resolve(doc, obj) {
                    Some(Object::Stream(stream)) => match stream.dict.get(b"Subtype") {
                        Ok(Object::Name(n)) if n == b"Image" => XObjectKind::Image,
                        // 只有间接引用的表单才能在脱敏时改写
                        Ok(Object::Name(n)) if n == b"Form" => match obj {
                            Object::Reference(id) if depth < MAX_FORM_DEPTH => {
                                XObjectKind::Form(Box::new(FormXObject::load(doc, *id, stream, depth)))
                            }
                            _ => {
                                log::debug!("[Content] 跳过表单 /{}", String::from_utf8_lossy(name));
                                XObjectKind::Other
                            }
                        },
                        _ => XObjectKind::Other,
                    },
                    _ => XObjectKind::Other,
                };
                resources.xobjects.insert(name.clone(), kind);
            }
        }

        resources
    }
}

impl FormXObject {
    fn load(doc: &Document, id: ObjectId, stream: &Stream, depth: usize) -> Self {
        let dict = &stream.dict;
        let operations = match Content::decode(&get_stream_content(stream)) {
            Ok(content) => content.operations,
            Err(e) => {
                log::warn!("[Content] 表单 {:?} 内容解析失败: {}", id, e);
                Vec::new()
            }
        };
        let matrix = match dict.get(b"Matrix").ok().and_then(|o| resolve(doc, o)) {
            Some(Object::Array(values)) if values.len() == 6 => {
                let mut m = IDENTITY;
                for (slot, value) in m.iter_mut().zip(values) {
                    *slot = resolve(doc, value).and_then(get_number).unwrap_or(*slot);
                }
                m
            }
            _ => IDENTITY,
        };
        let resources = dict
            .get(b"Resources")
            .ok()
            .and_then(|o| resolve_dict(doc, o))
            .map(|d| PageResources::from_dict(doc, d, depth + 1));

        Self {
            id,
            matrix,
            operations,
            resources,
        }
    }
}

/// 字形或图片所在的内容流
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    Page,
    /// [`PageLayout::forms`] 中的下标
    Form(usize),
}

/// 页面上绘制过的一个表单
#[derive(Debug, Clone)]
pub struct FormUse {
    pub id: ObjectId,
    /// 从页面资源出发逐层经过的 XObject 名
    pub path: Vec<Vec<u8>>,
    pub operations: Vec<Operation>,
}

/// 一个字形
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub source: Source,
    /// 所在操作符在其内容流中的下标
    pub op_index: usize,
    /// 所在字符串在 TJ 数组中的下标（Tj / ' / " 为 0）
    pub element: usize,
    pub byte_offset: usize,
    pub byte_len: usize,
    /// 解码后的文本，无法还原时为空
    pub text: String,
    /// 删除该字形时用于保持后续字形位置的 TJ 调整量
    pub kern: f32,
    /// 页面坐标
    pub rect: Rect,
    /// 页面坐标下的字号
    pub em: f32,
    /// 所在 BT/ET 文本对象的序号
    pub block: usize,
}

/// 一次图片绘制
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDraw {
    pub source: Source,
    pub op_index: usize,
    pub name: Vec<u8>,
    /// 无法解析时为 None
    pub rect: Option<Rect>,
}

#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub glyphs: Vec<Glyph>,
    pub images: Vec<ImageDraw>,
    pub forms: Vec<FormUse>,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Option<Vec<u8>>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    /// Tz / 100
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

struct Walker<'a> {
    geometry: &'a PageGeometry,
    resources: &'a PageResources,
    source: Source,
    path: Vec<Vec<u8>>,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    in_text: bool,
    block: usize,
    layout: PageLayout,
}

/// 分析页面操作序列
pub fn walk(
    operations: &[Operation],
    geometry: &PageGeometry,
    resources: &PageResources,
) -> PageLayout {
    let mut walker = Walker {
        geometry,
        resources,
        source: Source::Page,
        path: Vec::new(),
        state: GraphicsState::default(),
        stack: Vec::new(),
        text_matrix: IDENTITY,
        line_matrix: IDENTITY,
        in_text: false,
        block: 0,
        layout: PageLayout::default(),
    };
    for (index, op) in operations.iter().enumerate() {
        walker.step(index, op);
    }
    walker.layout
}

fn number(op: &Operation, i: usize) -> Option<f32> {
    op.operands.get(i).and_then(get_number)
}

impl<'a> Walker<'a> {
    fn step(&mut self, index: usize, op: &Operation) {
        match op.operator.as_str() {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(saved) = self.stack.pop() {
                    self.state = saved;
                }
            }
            "cm" => {
                if let Some(m) = matrix_operands(op) {
                    self.state.ctm = multiply(&m, &self.state.ctm);
                }
            }
            "BT" => {
                self.in_text = true;
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "ET" => {
                self.in_text = false;
                self.block += 1;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = op.operands.first() {
                    self.state.font = Some(name.clone());
                }
                if let Some(size) = number(op, 1) {
                    self.state.font_size = size;
                }
            }
            "Tc" => {
                if let Some(v) = number(op, 0) {
                    self.state.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = number(op, 0) {
                    self.state.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some(v) = number(op, 0) {
                    self.state.horizontal_scale = v / 100.0;
                }
            }
            "TL" => {
                if let Some(v) = number(op, 0) {
                    self.state.leading = v;
                }
            }
            "Ts" => {
                if let Some(v) = number(op, 0) {
                    self.state.rise = v;
                }
            }
            "Tm" => {
                if let Some(m) = matrix_operands(op) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (number(op, 0), number(op, 1)) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (number(op, 0), number(op, 1)) {
                    self.state.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "T*" => self.next_line(),
            "Tj" if self.in_text => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    self.show(index, 0, bytes);
                }
            }
            "'" if self.in_text => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    self.show(index, 0, bytes);
                }
            }
            "\"" if self.in_text => {
                if let (Some(aw), Some(ac)) = (number(op, 0), number(op, 1)) {
                    self.state.word_spacing = aw;
                    self.state.char_spacing = ac;
                }
                self.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                    self.show(index, 0, bytes);
                }
            }
            "TJ" if self.in_text => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    for (element, item) in items.iter().enumerate() {
                        match item {
                            Object::String(bytes, _) => self.show(index, element, bytes),
                            other => {
                                if let Some(n) = get_number(other) {
                                    let scale = self.state.font_size * self.state.horizontal_scale;
                                    self.advance(-n / 1000.0 * scale);
                                }
                            }
                        }
                    }
                }
            }
            "Do" => {
                if let Some(Object::Name(name)) = op.operands.first() {
                    self.draw_xobject(index, name);
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        let translate = [1.0, 0.0, 0.0, 1.0, tx, ty];
        self.line_matrix = multiply(&translate, &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.state.leading);
    }

    fn advance(&mut self, tx: f32) {
        let translate = [1.0, 0.0, 0.0, 1.0, tx, 0.0];
        self.text_matrix = multiply(&translate, &self.text_matrix);
    }

    fn show(&mut self, op_index: usize, element: usize, bytes: &[u8]) {
        let resources = self.resources;
        let geometry = self.geometry;
        let estimated = FontMetrics::estimated();
        let metrics = self
            .state
            .font
            .as_ref()
            .and_then(|name| resources.fonts.get(name))
            .unwrap_or(&estimated);

        let fs = self.state.font_size;
        let th = self.state.horizontal_scale;
        let code_len = metrics.code_len();

        let mut offset = 0;
        while offset < bytes.len() {
            let len = code_len.min(bytes.len() - offset);
            let code = bytes[offset..offset + len]
                .iter()
                .fold(0u32, |acc, b| (acc << 8) | *b as u32);
            let w0 = metrics.width(code);

            let is_space = len == 1 && code == 32;
            let word_spacing = if is_space { self.state.word_spacing } else { 0.0 };
            let spacing = self.state.char_spacing + word_spacing;
            let glyph_width = w0 / 1000.0 * fs;
            let tx = (glyph_width + spacing) * th;

            let render = multiply(&self.text_matrix, &self.state.ctm);
            let rise = self.state.rise;
            let rect = geometry.quad_to_page(
                &render,
                0.0,
                rise + DESCENT * fs.abs(),
                glyph_width * th,
                rise + ASCENT * fs.abs(),
            );

            let em = fs.abs() * (render[2] * render[2] + render[3] * render[3]).sqrt();
            let kern = if fs != 0.0 {
                -(w0 + spacing * 1000.0 / fs)
            } else {
                -w0
            };

            self.layout.glyphs.push(Glyph {
                source: self.source,
                op_index,
                element,
                byte_offset: offset,
                byte_len: len,
                text: metrics.decode(code),
                kern,
                rect,
                em,
                block: self.block,
            });

            self.advance(tx);
            offset += len;
        }
    }

    fn draw_xobject(&mut self, op_index: usize, name: &[u8]) {
        let resources: &'a PageResources = self.resources;
        let rect = match resources.xobjects.get(name) {
            Some(XObjectKind::Image) => {
                Some(self.geometry.quad_to_page(&self.state.ctm, 0.0, 0.0, 1.0, 1.0))
            }
            Some(XObjectKind::Form(form)) => {
                self.draw_form(name, form);
                return;
            }
            Some(XObjectKind::Other) => return,
            None => {
                log::debug!("[Content] 无法解析 XObject /{}", String::from_utf8_lossy(name));
                None
            }
        };
        self.layout.images.push(ImageDraw {
            source: self.source,
            op_index,
            name: name.to_vec(),
            rect,
        });
    }

    /// 表单内容在独立的图形状态中执行，结束后恢复调用方的状态
    fn draw_form(&mut self, name: &[u8], form: &'a FormXObject) {
        let mut path = self.path.clone();
        path.push(name.to_vec());
        let index = match self.layout.forms.iter().position(|f| f.path == path) {
            Some(index) => index,
            None => {
                self.layout.forms.push(FormUse {
                    id: form.id,
                    path: path.clone(),
                    operations: form.operations.clone(),
                });
                self.layout.forms.len() - 1
            }
        };

        let saved_state = self.state.clone();
        let saved_depth = self.stack.len();
        let saved_text = (self.text_matrix, self.line_matrix, self.in_text);
        let saved_source = std::mem::replace(&mut self.source, Source::Form(index));
        let saved_path = std::mem::replace(&mut self.path, path);
        let saved_resources = self.resources;

        if let Some(own) = &form.resources {
            self.resources = own;
        }
        self.state.ctm = multiply(&form.matrix, &self.state.ctm);
        self.in_text = false;
        for (op_index, op) in form.operations.iter().enumerate() {
            self.step(op_index, op);
        }

        self.resources = saved_resources;
        self.path = saved_path;
        self.source = saved_source;
        (self.text_matrix, self.line_matrix, self.in_text) = saved_text;
        self.stack.truncate(saved_depth);
        self.state = saved_state;
    }
}

impl PageLayout {
    /// 每个文本对象的外接框
    pub fn text_blocks(&self) -> Vec<Rect> {
        let mut blocks: Vec<(usize, Rect)> = Vec::new();
        for glyph in &self.glyphs {
            match blocks.last_mut() {
                Some((block, rect)) if *block == glyph.block => *rect = rect.union(&glyph.rect),
                _ => blocks.push((glyph.block, glyph.rect)),
            }
        }
        blocks.into_iter().map(|(_, rect)| rect).collect()
    }

    /// 按阅读顺序拼接字形，返回文本以及每个字符对应的字形下标
    fn text_with_index(&self) -> (Vec<char>, Vec<Option<usize>>) {
        let mut chars = Vec::with_capacity(self.glyphs.len());
        let mut index = Vec::with_capacity(self.glyphs.len());
        let mut prev: Option<&Glyph> = None;

        for (i, glyph) in self.glyphs.iter().enumerate() {
            // 无法还原的字形不计入文本
            if glyph.text.is_empty() {
                continue;
            }
            if let Some(p) = prev {
                if !p.rect.same_line(&glyph.rect) {
                    chars.push('\n');
                    index.push(None);
                } else if glyph.rect.x0 - p.rect.x1 > WORD_GAP * p.em
                    && !p.text.ends_with(' ')
                    && !glyph.text.starts_with(' ')
                {
                    chars.push(' ');
                    index.push(None);
                }
            }
            for c in glyph.text.chars() {
                chars.push(c);
                index.push(Some(i));
            }
            prev = Some(glyph);
        }
        (chars, index)
    }

    pub fn text(&self) -> String {
        self.text_with_index().0.into_iter().collect()
    }

    /// 大小写不敏感的字面量搜索；跨行的命中每行返回一个框
    pub fn search(&self, needle: &str) -> Vec<Rect> {
        let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
        if needle.is_empty() {
            return Vec::new();
        }
        let (chars, index) = self.text_with_index();
        let hay: Vec<char> = chars
            .iter()
            .map(|c| c.to_lowercase().next().unwrap_or(*c))
            .collect();

        let mut hits = Vec::new();
        let mut i = 0;
        while i + needle.len() <= hay.len() {
            if hay[i..i + needle.len()] != needle[..] {
                i += 1;
                continue;
            }
            let mut segment: Option<Rect> = None;
            for glyph in index[i..i + needle.len()].iter().flatten().map(|g| &self.glyphs[*g]) {
                segment = match segment {
                    Some(rect) if rect.same_line(&glyph.rect) => Some(rect.union(&glyph.rect)),
                    Some(rect) => {
                        hits.push(rect);
                        Some(glyph.rect)
                    }
                    None => Some(glyph.rect),
                };
            }
            hits.extend(segment);
            i += needle.len();
        }
        hits
    }
}
