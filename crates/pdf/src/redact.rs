//! 按标记改写内容流
//!
//! 字形中心落在任一标记内即从其所在的内容流（页面或表单）中删除，原位置用 TJ 调整量补齐，
//! 后续字形位置不变。带填充色的标记再在最上层绘制色块。

use crate::content::{Glyph, PageLayout, Source};
use crate::utils::PageGeometry;
use lopdf::content::Operation;
use lopdf::{Object, StringFormat};
use redactor_core::{ImagePolicy, RedactionMark};
use std::collections::{BTreeMap, BTreeSet};

/// 改写后的表单内容
#[derive(Debug)]
pub struct FormRewrite {
    /// 从页面资源出发的 XObject 名路径
    pub path: Vec<Vec<u8>>,
    pub operations: Vec<Operation>,
}

/// 改写结果
#[derive(Debug, Default)]
pub struct Rewrite {
    pub operations: Vec<Operation>,
    pub forms: Vec<FormRewrite>,
    pub glyphs_removed: usize,
    pub images_removed: usize,
}

type Doomed<'g> = BTreeMap<(Source, usize), Vec<&'g Glyph>>;

/// 对页面操作序列应用全部标记；命中表单内容时一并改写表单
pub fn apply_marks(
    operations: Vec<Operation>,
    layout: &PageLayout,
    marks: &[RedactionMark],
    images: ImagePolicy,
    geometry: &PageGeometry,
) -> Rewrite {
    let mut doomed: Doomed = BTreeMap::new();
    let mut glyphs_removed = 0;
    for glyph in &layout.glyphs {
        let (cx, cy) = glyph.rect.center();
        if !marks.iter().any(|m| m.rect.contains_point(cx, cy)) {
            continue;
        }
        // 同一表单被多次绘制时，同一个字形只计一次
        let list = doomed.entry((glyph.source, glyph.op_index)).or_default();
        if !list
            .iter()
            .any(|g| g.element == glyph.element && g.byte_offset == glyph.byte_offset)
        {
            list.push(glyph);
            glyphs_removed += 1;
        }
    }

    let dropped_images: BTreeSet<(Source, usize)> = match images {
        ImagePolicy::Preserve => BTreeSet::new(),
        ImagePolicy::RemoveOverlapping => layout
            .images
            .iter()
            .filter(|draw| {
                draw.rect
                    .map(|r| marks.iter().any(|m| m.rect.intersects(&r)))
                    .unwrap_or(false)
            })
            .map(|draw| (draw.source, draw.op_index))
            .collect(),
    };

    let mut rewritten = Vec::with_capacity(operations.len() + 4 + marks.len() * 2);
    rewritten.push(Operation::new("q", vec![]));
    rewrite_stream(operations, Source::Page, &doomed, &dropped_images, &mut rewritten);
    rewritten.push(Operation::new("Q", vec![]));

    append_fills(&mut rewritten, marks, geometry);

    let forms = layout
        .forms
        .iter()
        .enumerate()
        .filter(|(index, _)| {
            let source = Source::Form(*index);
            doomed.keys().any(|(s, _)| *s == source)
                || dropped_images.iter().any(|(s, _)| *s == source)
        })
        .map(|(index, form)| {
            let mut operations = Vec::with_capacity(form.operations.len());
            rewrite_stream(
                form.operations.clone(),
                Source::Form(index),
                &doomed,
                &dropped_images,
                &mut operations,
            );
            FormRewrite {
                path: form.path.clone(),
                operations,
            }
        })
        .collect();

    Rewrite {
        operations: rewritten,
        forms,
        glyphs_removed,
        images_removed: dropped_images.len(),
    }
}

/// 改写一个内容流中的文字显示与图片绘制
fn rewrite_stream(
    operations: Vec<Operation>,
    source: Source,
    doomed: &Doomed,
    dropped_images: &BTreeSet<(Source, usize)>,
    out: &mut Vec<Operation>,
) {
    for (index, op) in operations.into_iter().enumerate() {
        if dropped_images.contains(&(source, index)) {
            log::info!("[Redact] 移除与标记重叠的图片绘制 {:?} #{}", source, index);
            continue;
        }
        match doomed.get(&(source, index)) {
            Some(glyphs) => rewrite_show(op, glyphs, out),
            None => out.push(op),
        }
    }
}

/// 把文字显示操作改写为不含被删字形的 TJ
fn rewrite_show(op: Operation, glyphs: &[&Glyph], out: &mut Vec<Operation>) {
    let elements: Vec<Object> = match op.operator.as_str() {
        "TJ" => match op.operands.into_iter().next() {
            Some(Object::Array(items)) => items,
            _ => return,
        },
        "Tj" | "'" => op.operands.into_iter().take(1).collect(),
        "\"" => {
            let mut operands = op.operands.into_iter();
            let aw = operands.next();
            let ac = operands.next();
            if let Some(aw) = aw {
                out.push(Operation::new("Tw", vec![aw]));
            }
            if let Some(ac) = ac {
                out.push(Operation::new("Tc", vec![ac]));
            }
            out.push(Operation::new("T*", vec![]));
            operands.take(1).collect()
        }
        _ => {
            out.push(op);
            return;
        }
    };
    if op.operator == "'" {
        out.push(Operation::new("T*", vec![]));
    }

    let mut array = Vec::with_capacity(elements.len() + glyphs.len());
    for (element, item) in elements.into_iter().enumerate() {
        match item {
            Object::String(bytes, format) => {
                let removed: Vec<&&Glyph> =
                    glyphs.iter().filter(|g| g.element == element).collect();
                if removed.is_empty() {
                    array.push(Object::String(bytes, format));
                } else {
                    log::debug!(
                        "[Redact] 删除 {} 个字形: {:?}",
                        removed.len(),
                        String::from_utf8_lossy(&bytes)
                    );
                    split_string(&bytes, format, &removed, &mut array);
                }
            }
            other => array.push(other),
        }
    }
    out.push(Operation::new("TJ", vec![Object::Array(array)]));
}

/// 拆分字符串：保留的字节原样输出，被删字形替换为等宽的调整量
fn split_string(bytes: &[u8], format: StringFormat, removed: &[&&Glyph], array: &mut Vec<Object>) {
    let mut kept = Vec::with_capacity(bytes.len());
    let mut pending_kern = 0.0f32;
    let mut offset = 0;

    while offset < bytes.len() {
        match removed.iter().find(|g| g.byte_offset == offset) {
            Some(glyph) => {
                if !kept.is_empty() {
                    array.push(Object::String(std::mem::take(&mut kept), format));
                }
                pending_kern += glyph.kern;
                offset += glyph.byte_len.max(1);
            }
            None => {
                if pending_kern != 0.0 {
                    array.push(Object::Real(pending_kern));
                    pending_kern = 0.0;
                }
                kept.push(bytes[offset]);
                offset += 1;
            }
        }
    }

    if !kept.is_empty() {
        array.push(Object::String(kept, format));
    }
    if pending_kern != 0.0 {
        array.push(Object::Real(pending_kern));
    }
}

/// 在最上层为带填充色的标记绘制色块
fn append_fills(out: &mut Vec<Operation>, marks: &[RedactionMark], geometry: &PageGeometry) {
    let filled: Vec<&RedactionMark> = marks.iter().filter(|m| m.fill.is_some()).collect();
    if filled.is_empty() {
        return;
    }

    out.push(Operation::new("q", vec![]));
    for mark in filled {
        let Some([r, g, b]) = mark.fill else {
            continue;
        };
        let (x, y, w, h) = geometry.rect_to_user(&mark.rect);
        log::debug!("[BlackOverlay] 绘制色块: x={}, y={}, w={}, h={}", x, y, w, h);
        out.push(Operation::new(
            "rg",
            vec![Object::Real(r), Object::Real(g), Object::Real(b)],
        ));
        out.push(Operation::new(
            "re",
            vec![
                Object::Real(x),
                Object::Real(y),
                Object::Real(w),
                Object::Real(h),
            ],
        ));
        out.push(Operation::new("f", vec![]));
    }
    out.push(Operation::new("Q", vec![]));
}
