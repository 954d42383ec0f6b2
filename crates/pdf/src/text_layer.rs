//! OCR 文字层：把识别结果以不可见文字（`3 Tr`）写回页面

use crate::error::Result;
use crate::utils::{inherited, PageGeometry};
use lopdf::content::Operation;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, StringFormat};
use redactor_core::Rect;

/// 页面资源中的字体名
pub const OCR_FONT_NAME: &[u8] = b"ROcr";

const FIRST_CHAR: i64 = 32;
const LAST_CHAR: i64 = 255;
/// 所有字符统一字宽，配合 Tz 拉伸到 OCR 单词框宽度
const GLYPH_WIDTH: i64 = 500;
/// 基线位于框顶向下 0.8 倍字号处
const BASELINE_RATIO: f32 = 0.8;

/// Helvetica，显式给出 /Widths
pub fn font_dictionary() -> Dictionary {
    let count = (LAST_CHAR - FIRST_CHAR + 1) as usize;
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
        "FirstChar" => FIRST_CHAR,
        "LastChar" => LAST_CHAR,
        "Widths" => vec![Object::Integer(GLYPH_WIDTH); count],
    }
}

/// 页面自身 Resources 字典的位置
enum ResourcesSlot {
    Indirect(ObjectId),
    Inline,
}

fn resources_slot(doc: &mut Document, page_id: ObjectId) -> Result<ResourcesSlot> {
    let existing = match doc.get_object(page_id)?.as_dict()?.get(b"Resources") {
        Ok(Object::Reference(id)) => Some(ResourcesSlot::Indirect(*id)),
        Ok(Object::Dictionary(_)) => Some(ResourcesSlot::Inline),
        _ => None,
    };
    if let Some(slot) = existing {
        return Ok(slot);
    }

    // 继承的资源复制一份到页面上，修改不影响其他页面
    let copied = inherited(doc, page_id, b"Resources")
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Resources", Object::Dictionary(copied));
    Ok(ResourcesSlot::Inline)
}

fn resources_mut<'a>(
    doc: &'a mut Document,
    page_id: ObjectId,
    slot: &ResourcesSlot,
) -> Result<&'a mut Dictionary> {
    let dict = match slot {
        ResourcesSlot::Indirect(id) => doc.get_object_mut(*id)?.as_dict_mut()?,
        ResourcesSlot::Inline => doc
            .get_object_mut(page_id)?
            .as_dict_mut()?
            .get_mut(b"Resources")?
            .as_dict_mut()?,
    };
    Ok(dict)
}

/// 在页面资源中登记 OCR 字体
pub fn install_font(doc: &mut Document, page_id: ObjectId, font_id: ObjectId) -> Result<()> {
    let slot = resources_slot(doc, page_id)?;
    let font_entry = resources_mut(doc, page_id, &slot)?
        .get(b"Font")
        .ok()
        .cloned();

    match font_entry {
        Some(Object::Reference(fonts_id)) => {
            doc.get_object_mut(fonts_id)?
                .as_dict_mut()?
                .set(OCR_FONT_NAME.to_vec(), Object::Reference(font_id));
        }
        Some(Object::Dictionary(_)) => {
            resources_mut(doc, page_id, &slot)?
                .get_mut(b"Font")?
                .as_dict_mut()?
                .set(OCR_FONT_NAME.to_vec(), Object::Reference(font_id));
        }
        _ => {
            let mut fonts = Dictionary::new();
            fonts.set(OCR_FONT_NAME.to_vec(), Object::Reference(font_id));
            resources_mut(doc, page_id, &slot)?.set("Font", Object::Dictionary(fonts));
        }
    }
    Ok(())
}

/// WinAnsi 范围外的字符写成 '?'
fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            code @ 0x20..=0x7e | code @ 0xa0..=0xff => code as u8,
            _ => b'?',
        })
        .collect()
}

/// 生成不可见文字的操作序列，文字从 `rect` 左上角开始并横向铺满整个框
pub fn invisible_text_ops(
    text: &str,
    rect: &Rect,
    font_size: f32,
    geometry: &PageGeometry,
) -> Vec<Operation> {
    let bytes = encode_text(text);
    if bytes.is_empty() || font_size <= 0.0 {
        return Vec::new();
    }

    let natural_width = bytes.len() as f32 * GLYPH_WIDTH as f32 / 1000.0 * font_size;
    let scale = if rect.width() > 0.0 {
        100.0 * rect.width() / natural_width
    } else {
        100.0
    };

    // 文字方向跟随页面显示方向
    let baseline = rect.y0 + BASELINE_RATIO * font_size;
    let (ox, oy) = geometry.to_user(rect.x0, baseline);
    let (rx, ry) = geometry.to_user(rect.x0 + 1.0, baseline);
    let (ux, uy) = geometry.to_user(rect.x0, baseline - 1.0);
    let text_matrix = [rx - ox, ry - oy, ux - ox, uy - oy, ox, oy];

    vec![
        Operation::new("q", vec![]),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(OCR_FONT_NAME.to_vec()), Object::Real(font_size)],
        ),
        Operation::new("Tr", vec![Object::Integer(3)]),
        Operation::new("Tz", vec![Object::Real(scale)]),
        Operation::new("Tm", text_matrix.iter().map(|v| Object::Real(*v)).collect()),
        Operation::new("Tj", vec![Object::String(bytes, StringFormat::Literal)]),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{walk, FontMetrics, PageResources};

    fn resources() -> PageResources {
        let mut resources = PageResources::default();
        resources.fonts.insert(
            OCR_FONT_NAME.to_vec(),
            FontMetrics::uniform(FIRST_CHAR as u32, 224, GLYPH_WIDTH as f32),
        );
        resources
    }

    #[test]
    fn test_text_spans_box() {
        for rotation in [0, 90, 180, 270] {
            let geometry = PageGeometry::new(0.0, 0.0, 612.0, 792.0, rotation);
            let rect = Rect::new(100.0, 200.0, 180.0, 220.0);
            let ops = invisible_text_ops("Jane", &rect, 16.0, &geometry);
            let layout = walk(&ops, &geometry, &resources());

            let hit = layout.search("jane");
            assert_eq!(hit.len(), 1, "rotation {}", rotation);
            assert!((hit[0].x0 - 100.0).abs() < 0.01, "rotation {}: {:?}", rotation, hit[0]);
            assert!((hit[0].x1 - 180.0).abs() < 0.01, "rotation {}: {:?}", rotation, hit[0]);
            assert!((hit[0].y0 - 200.0).abs() < 0.01, "rotation {}: {:?}", rotation, hit[0]);
        }
    }

    #[test]
    fn test_render_mode_invisible() {
        let geometry = PageGeometry::new(0.0, 0.0, 612.0, 792.0, 0);
        let ops = invisible_text_ops("x", &Rect::new(0.0, 0.0, 10.0, 10.0), 8.0, &geometry);
        let tr = ops.iter().find(|o| o.operator == "Tr").map(|o| o.operands.clone());
        assert_eq!(tr, Some(vec![Object::Integer(3)]));
    }

    #[test]
    fn test_non_latin_replaced() {
        assert_eq!(encode_text("Zoë 日本"), b"Zo\xeb ??".to_vec());
        let geometry = PageGeometry::new(0.0, 0.0, 612.0, 792.0, 0);
        assert!(invisible_text_ops("", &Rect::new(0.0, 0.0, 1.0, 1.0), 8.0, &geometry).is_empty());
    }
}
