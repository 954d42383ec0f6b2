use crate::error::{PdfError, Result};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use redactor_core::Rect;

/// 仿射矩阵 [a b c d e f]
pub type Matrix = [f32; 6];

pub const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// 先应用 `m` 再应用 `n`
pub fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

pub fn transform(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

/// 从 Object 获取数值
pub fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// 读取六个数值操作数（cm / Tm）
pub fn matrix_operands(op: &Operation) -> Option<Matrix> {
    if op.operands.len() < 6 {
        return None;
    }
    let mut m = IDENTITY;
    for (slot, obj) in m.iter_mut().zip(&op.operands) {
        *slot = get_number(obj)?;
    }
    Some(m)
}

/// 解一层间接引用
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, obj).and_then(|o| o.as_dict().ok())
}

/// 沿 Parent 链查找可继承的页面属性
pub fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_object(page_id).ok()?.as_dict().ok()?;
    // 页面树深度有限，防止循环引用
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return resolve(doc, value);
        }
        let parent = current.get(b"Parent").ok()?;
        current = resolve_dict(doc, parent)?;
    }
    None
}

/// 从数组对象中提取边界框坐标，并规范为 (llx, lly, urx, ury)
fn extract_box_values(doc: &Document, arr: &[Object]) -> Option<(f32, f32, f32, f32)> {
    let values: Vec<f32> = arr
        .iter()
        .filter_map(|o| resolve(doc, o).and_then(get_number))
        .collect();
    if values.len() == 4 {
        Some((
            values[0].min(values[2]),
            values[1].min(values[3]),
            values[0].max(values[2]),
            values[1].max(values[3]),
        ))
    } else {
        None
    }
}

fn page_box(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<(f32, f32, f32, f32)> {
    match inherited(doc, page_id, key)? {
        Object::Array(arr) => extract_box_values(doc, arr),
        _ => None,
    }
}

/// 页面几何信息：可见区域与旋转角度
///
/// 负责 PDF 用户空间（左下角原点，y 向上，未旋转）与页面坐标
/// （左上角原点，y 向下，按显示方向旋转后）之间的互相转换。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub llx: f32,
    pub lly: f32,
    pub urx: f32,
    pub ury: f32,
    /// 0 / 90 / 180 / 270
    pub rotation: i32,
}

impl PageGeometry {
    pub fn new(llx: f32, lly: f32, urx: f32, ury: f32, rotation: i32) -> Self {
        let rotation = rotation.rem_euclid(360);
        let rotation = if rotation % 90 == 0 { rotation } else { 0 };
        Self {
            llx,
            lly,
            urx,
            ury,
            rotation,
        }
    }

    /// CropBox 优先，其次 MediaBox，都没有时使用 Letter 尺寸
    pub fn load(doc: &Document, page_id: ObjectId) -> Self {
        let raw_box = page_box(doc, page_id, b"CropBox").or_else(|| page_box(doc, page_id, b"MediaBox"));
        let (llx, lly, urx, ury) = raw_box.unwrap_or_else(|| {
            log::warn!("[MediaBox] 页面 {:?} 缺少页面框，使用默认 Letter 尺寸", page_id);
            (0.0, 0.0, 612.0, 792.0)
        });

        let rotation = inherited(doc, page_id, b"Rotate")
            .and_then(get_number)
            .map(|r| r as i32)
            .unwrap_or(0);

        Self::new(llx, lly, urx, ury, rotation)
    }

    fn swapped(&self) -> bool {
        self.rotation == 90 || self.rotation == 270
    }

    /// 显示宽度
    pub fn width(&self) -> f32 {
        if self.swapped() {
            self.ury - self.lly
        } else {
            self.urx - self.llx
        }
    }

    /// 显示高度
    pub fn height(&self) -> f32 {
        if self.swapped() {
            self.urx - self.llx
        } else {
            self.ury - self.lly
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width(), self.height())
    }

    /// 用户空间 → 页面坐标
    pub fn to_page(&self, x: f32, y: f32) -> (f32, f32) {
        match self.rotation {
            90 => (y - self.lly, x - self.llx),
            180 => (self.urx - x, y - self.lly),
            270 => (self.ury - y, self.urx - x),
            _ => (x - self.llx, self.ury - y),
        }
    }

    /// 页面坐标 → 用户空间
    pub fn to_user(&self, px: f32, py: f32) -> (f32, f32) {
        match self.rotation {
            90 => (py + self.llx, px + self.lly),
            180 => (self.urx - px, py + self.lly),
            270 => (self.urx - py, self.ury - px),
            _ => (px + self.llx, self.ury - py),
        }
    }

    /// 用户空间中经过 `m` 变换的矩形区域，取其在页面坐标中的外接框
    pub fn quad_to_page(&self, m: &Matrix, x0: f32, y0: f32, x1: f32, y1: f32) -> Rect {
        let corners = [(x0, y0), (x1, y0), (x0, y1), (x1, y1)].map(|(x, y)| {
            let (ux, uy) = transform(m, x, y);
            self.to_page(ux, uy)
        });
        bounding(&corners)
    }

    /// 用户空间矩形 → 页面坐标
    pub fn user_rect_to_page(&self, x0: f32, y0: f32, x1: f32, y1: f32) -> Rect {
        self.quad_to_page(&IDENTITY, x0, y0, x1, y1)
    }

    /// 页面坐标矩形 → 用户空间 (x, y, w, h)，用于 `re` 操作符
    pub fn rect_to_user(&self, rect: &Rect) -> (f32, f32, f32, f32) {
        let corners = [
            self.to_user(rect.x0, rect.y0),
            self.to_user(rect.x1, rect.y1),
        ];
        let r = bounding(&corners);
        (r.x0, r.y0, r.width(), r.height())
    }
}

fn bounding(points: &[(f32, f32)]) -> Rect {
    let mut r = Rect::new(f32::MAX, f32::MAX, f32::MIN, f32::MIN);
    for &(x, y) in points {
        r.x0 = r.x0.min(x);
        r.y0 = r.y0.min(y);
        r.x1 = r.x1.max(x);
        r.y1 = r.y1.max(y);
    }
    r
}

/// 获取流内容（支持压缩和未压缩的流）
pub fn get_stream_content(stream: &Stream) -> Vec<u8> {
    match stream.decompressed_content() {
        Ok(data) => data,
        Err(_) => stream.content.clone(),
    }
}

/// 获取页面的内容流数据，多个流按顺序拼接；没有 Contents 的页面返回空内容
pub fn get_page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>> {
    let page = doc.get_object(page_id)?.as_dict()?;

    let contents = match page.get(b"Contents") {
        Ok(contents) => contents,
        Err(_) => return Ok(Vec::new()),
    };

    match resolve(doc, contents) {
        Some(Object::Stream(stream)) => Ok(get_stream_content(stream)),
        Some(Object::Array(arr)) => {
            let mut all_content = Vec::new();
            for item in arr {
                if let Some(Object::Stream(stream)) = resolve(doc, item) {
                    all_content.extend(get_stream_content(stream));
                    all_content.push(b'\n');
                }
            }
            Ok(all_content)
        }
        _ => Ok(Vec::new()),
    }
}

pub fn decode_page_operations(doc: &Document, page_id: ObjectId) -> Result<Vec<Operation>> {
    let data = get_page_content(doc, page_id)?;
    if data.is_empty() {
        return Ok(Vec::new());
    }
    Ok(Content::decode(&data)?.operations)
}

/// 用新的内容流替换页面内容；旧流不再被引用，保存时会被清理
pub fn set_page_operations(doc: &mut Document, page_id: ObjectId, operations: Vec<Operation>) -> Result<()> {
    let data = Content { operations }.encode()?;
    let stream_id = doc.add_object(Stream::new(Dictionary::new(), data));
    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Contents", Object::Reference(stream_id));
    Ok(())
}

/// 资源字典的持有者
#[derive(Debug, Clone, Copy)]
enum Holder {
    Page(ObjectId),
    Form(ObjectId),
}

fn set_resources(doc: &mut Document, holder: Holder, resources: Dictionary) -> Result<()> {
    match holder {
        Holder::Page(id) => doc.get_object_mut(id)?.as_dict_mut()?.set("Resources", resources),
        Holder::Form(id) => doc.get_object_mut(id)?.as_stream_mut()?.dict.set("Resources", resources),
    }
    Ok(())
}

/// [`detach_form`] 的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detached {
    /// 路径末端表单的页面专属副本
    pub copy: ObjectId,
    /// 途经的原表单
    pub originals: Vec<ObjectId>,
}

/// 沿资源路径逐层复制表单
///
/// 途经的每个资源字典都以内联副本写回持有者，其他页面与其他绘制位置
/// 仍引用原表单，不受改写影响。原表单若不再被引用，保存时会被清理。
pub fn detach_form(doc: &mut Document, page_id: ObjectId, path: &[Vec<u8>]) -> Result<Detached> {
    let mut holder = Holder::Page(page_id);
    let mut resources = inherited(doc, page_id, b"Resources")
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    let mut originals = Vec::with_capacity(path.len());

    for name in path {
        let display = String::from_utf8_lossy(name).into_owned();
        let mut xobjects = resources
            .get(b"XObject")
            .ok()
            .and_then(|o| resolve_dict(doc, o))
            .cloned()
            .ok_or_else(|| PdfError::Malformed(format!("表单 /{} 缺少 XObject 资源", display)))?;
        let source_id = xobjects
            .get(name)
            .and_then(Object::as_reference)
            .map_err(|_| PdfError::Malformed(format!("表单 /{} 不是间接对象", display)))?;

        let form = doc.get_object(source_id)?.as_stream()?.clone();
        // 没有自己资源的表单沿用持有者的资源
        let next = form
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|o| resolve_dict(doc, o))
            .cloned()
            .unwrap_or_else(|| resources.clone());
        let copy_id = doc.add_object(form);
        log::debug!("[Form] 复制表单 /{} {:?} -> {:?}", display, source_id, copy_id);

        xobjects.set(name.clone(), Object::Reference(copy_id));
        resources.set("XObject", Object::Dictionary(xobjects));
        set_resources(doc, holder, resources)?;

        holder = Holder::Form(copy_id);
        resources = next;
        originals.push(source_id);
    }

    match holder {
        Holder::Form(copy) => Ok(Detached { copy, originals }),
        Holder::Page(_) => Err(PdfError::Malformed("空的表单路径".to_string())),
    }
}

/// 替换表单的内容流
pub fn set_form_operations(doc: &mut Document, form_id: ObjectId, operations: Vec<Operation>) -> Result<()> {
    let data = Content { operations }.encode()?;
    doc.get_object_mut(form_id)?.as_stream_mut()?.set_plain_content(data);
    Ok(())
}
