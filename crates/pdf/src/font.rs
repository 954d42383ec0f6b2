//! 字体度量与字符码解码
//!
//! 字符码到 Unicode 的映射优先交给 lopdf（ToUnicode CMap 与标准单字节编码），
//! 这里补上 lopdf 尚未处理的 `/Differences` 与 CID 字宽（`/W`、`/DW`）。

use crate::utils::{get_number, resolve, resolve_dict};
use lopdf::{dictionary, Dictionary, Document, Encoding, Object};
use std::borrow::Cow;
use std::collections::HashMap;

/// 没有 /Widths 时的估算字宽（千分之一 em）
pub const ESTIMATED_WIDTH: f32 = 550.0;
/// CID 字体没有 /DW 时的字宽
const CID_DEFAULT_WIDTH: f32 = 1000.0;
/// `/W` 中单个区间允许展开的最大字符数
const MAX_CID_RANGE: u32 = 0xffff;

/// 单字节字符码 → 文本
type CodeTable = Vec<Option<String>>;

/// 字符码的解码方式
#[derive(Debug)]
enum CodeMap {
    Table(CodeTable),
    /// ToUnicode CMap，按双字节查询
    Unicode(Encoding<'static>),
    /// UCS-2 编码的预定义 CMap，字符码即码点
    Ucs2,
    Unmapped,
}

impl CodeMap {
    fn latin1() -> Self {
        CodeMap::Table(
            (0u32..256)
                .map(|code| {
                    char::from_u32(code)
                        .filter(|c| !c.is_control())
                        .map(String::from)
                })
                .collect(),
        )
    }

    fn decode(&self, code: u32) -> String {
        let text = match self {
            CodeMap::Table(table) => table
                .get(code as usize)
                .and_then(|entry| entry.clone())
                .unwrap_or_default(),
            CodeMap::Unicode(encoding) => {
                // 单字节字体的 CMap 同样以双字节查询
                let bytes = [(code >> 8) as u8, code as u8];
                Document::decode_text(encoding, &bytes).unwrap_or_default()
            }
            CodeMap::Ucs2 => char::from_u32(code).map(String::from).unwrap_or_default(),
            CodeMap::Unmapped => String::new(),
        };
        if text.contains('\u{FFFD}') {
            text.replace('\u{FFFD}', "")
        } else {
            text
        }
    }
}

/// 字体度量与编码
#[derive(Debug)]
pub struct FontMetrics {
    first_char: u32,
    widths: Vec<f32>,
    missing_width: f32,
    /// Type0 字体每个字符码占两个字节
    two_byte: bool,
    cid_widths: HashMap<u32, f32>,
    /// `/W` 中 `first last width` 形式的区间
    cid_ranges: Vec<(u32, u32, f32)>,
    codes: CodeMap,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self::estimated()
    }
}

impl FontMetrics {
    pub fn estimated() -> Self {
        Self {
            first_char: 0,
            widths: Vec::new(),
            missing_width: ESTIMATED_WIDTH,
            two_byte: false,
            cid_widths: HashMap::new(),
            cid_ranges: Vec::new(),
            codes: CodeMap::latin1(),
        }
    }

    pub fn uniform(first_char: u32, count: usize, width: f32) -> Self {
        Self {
            first_char,
            widths: vec![width; count],
            missing_width: width,
            ..Self::estimated()
        }
    }

    pub fn load(doc: &Document, font: &Dictionary) -> Self {
        // lopdf 只接受 /Type /Font 的字典
        let font: Cow<'_, Dictionary> = if font.type_is(b"Font") {
            Cow::Borrowed(font)
        } else {
            let mut typed = font.clone();
            typed.set("Type", "Font");
            Cow::Owned(typed)
        };

        let is_type0 = matches!(font.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Type0");
        let codes = load_code_map(doc, &font, is_type0);
        if is_type0 {
            return Self::load_cid(doc, &font, codes);
        }

        let first_char = font
            .get(b"FirstChar")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(get_number)
            .map(|n| n.max(0.0) as u32)
            .unwrap_or(0);
        let widths: Vec<f32> = match font.get(b"Widths").ok().and_then(|o| resolve(doc, o)) {
            Some(Object::Array(arr)) => arr
                .iter()
                .map(|o| resolve(doc, o).and_then(get_number).unwrap_or(0.0))
                .collect(),
            _ => Vec::new(),
        };
        let missing_width = font
            .get(b"FontDescriptor")
            .ok()
            .and_then(|o| resolve_dict(doc, o))
            .and_then(|d| d.get(b"MissingWidth").ok())
            .and_then(get_number)
            .filter(|w| *w > 0.0)
            .unwrap_or(ESTIMATED_WIDTH);

        Self {
            first_char,
            widths,
            missing_width,
            codes,
            ..Self::estimated()
        }
    }

    /// Type0 字体的字宽取自第一个后代字体
    fn load_cid(doc: &Document, font: &Dictionary, codes: CodeMap) -> Self {
        let descendant = font
            .get(b"DescendantFonts")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_array().ok())
            .and_then(|arr| arr.first())
            .and_then(|o| resolve_dict(doc, o));

        let mut metrics = Self {
            missing_width: CID_DEFAULT_WIDTH,
            two_byte: true,
            codes,
            ..Self::estimated()
        };
        let Some(descendant) = descendant else {
            return metrics;
        };

        if let Some(dw) = descendant
            .get(b"DW")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(get_number)
        {
            metrics.missing_width = dw;
        }

        let Some(Object::Array(w)) = descendant.get(b"W").ok().and_then(|o| resolve(doc, o)) else {
            return metrics;
        };
        let number = |o: &Object| resolve(doc, o).and_then(get_number);
        let mut i = 0;
        while i < w.len() {
            let Some(first) = number(&w[i]).map(|n| n.max(0.0) as u32) else {
                break;
            };
            match w.get(i + 1).and_then(|o| resolve(doc, o)) {
                Some(Object::Array(list)) => {
                    for (k, width) in list.iter().enumerate() {
                        if let Some(width) = number(width) {
                            metrics.cid_widths.insert(first + k as u32, width);
                        }
                    }
                    i += 2;
                }
                Some(last) => {
                    let last = get_number(last).map(|n| n.max(0.0) as u32);
                    let width = w.get(i + 2).and_then(number);
                    if let (Some(last), Some(width)) = (last, width) {
                        if last >= first && last - first <= MAX_CID_RANGE {
                            metrics.cid_ranges.push((first, last, width));
                        }
                    }
                    i += 3;
                }
                None => break,
            }
        }
        metrics
    }

    pub fn width(&self, code: u32) -> f32 {
        if self.two_byte {
            // Identity 编码下字符码即 CID
            return self
                .cid_widths
                .get(&code)
                .copied()
                .or_else(|| {
                    self.cid_ranges
                        .iter()
                        .find(|(first, last, _)| (*first..=*last).contains(&code))
                        .map(|(_, _, width)| *width)
                })
                .unwrap_or(self.missing_width);
        }
        code.checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .filter(|w| *w > 0.0)
            .unwrap_or(self.missing_width)
    }

    pub fn code_len(&self) -> usize {
        if self.two_byte {
            2
        } else {
            1
        }
    }

    /// 字符码对应的文本；无法还原时为空
    pub fn decode(&self, code: u32) -> String {
        self.codes.decode(code)
    }
}

fn load_code_map(doc: &Document, font: &Dictionary, two_byte: bool) -> CodeMap {
    match font.get_font_encoding(doc) {
        Ok(Encoding::UnicodeMapEncoding(cmap)) => CodeMap::Unicode(Encoding::UnicodeMapEncoding(cmap)),
        Ok(Encoding::SimpleEncoding(name)) if two_byte && is_ucs2(name) => CodeMap::Ucs2,
        Ok(encoding @ Encoding::OneByteEncoding(_)) if !two_byte => {
            // 编码字典的 /BaseEncoding 会被 lopdf 忽略
            let mut table = base_encoding_name(doc, font)
                .and_then(|name| named_table(doc, &name))
                .unwrap_or_else(|| table_from(&encoding));
            apply_differences(doc, font, &mut table);
            CodeMap::Table(table)
        }
        Ok(other) => {
            log::debug!("[Font] 未支持的编码 {:?}", other);
            fallback(doc, font, two_byte)
        }
        Err(e) => {
            log::debug!("[Font] 读取编码失败: {}", e);
            fallback(doc, font, two_byte)
        }
    }
}

/// lopdf 无法给出编码时：双字节字体放弃还原，单字节字体按基础编码加 /Differences
fn fallback(doc: &Document, font: &Dictionary, two_byte: bool) -> CodeMap {
    if two_byte {
        return CodeMap::Unmapped;
    }
    let base = base_encoding_name(doc, font).unwrap_or_else(|| b"StandardEncoding".to_vec());
    match named_table(doc, &base) {
        Some(mut table) => {
            apply_differences(doc, font, &mut table);
            CodeMap::Table(table)
        }
        None => CodeMap::latin1(),
    }
}

fn is_ucs2(name: &str) -> bool {
    name.starts_with("Uni") && (name.contains("UCS2") || name.contains("UTF16"))
}

fn base_encoding_name(doc: &Document, font: &Dictionary) -> Option<Vec<u8>> {
    let encoding = font.get(b"Encoding").ok().and_then(|o| resolve_dict(doc, o))?;
    match encoding.get(b"BaseEncoding") {
        Ok(Object::Name(name)) => Some(name.clone()),
        _ => None,
    }
}

/// 通过 lopdf 取得具名单字节编码表
fn named_table(doc: &Document, name: &[u8]) -> Option<CodeTable> {
    let named = dictionary! {
        "Type" => "Font",
        "Encoding" => Object::Name(name.to_vec()),
    };
    match named.get_font_encoding(doc) {
        Ok(encoding @ Encoding::OneByteEncoding(_)) => Some(table_from(&encoding)),
        _ => None,
    }
}

fn table_from(encoding: &Encoding) -> CodeTable {
    (0u8..=255)
        .map(|byte| {
            Document::decode_text(encoding, &[byte])
                .ok()
                .filter(|text| !text.is_empty())
        })
        .collect()
}

fn apply_differences(doc: &Document, font: &Dictionary, table: &mut CodeTable) {
    let Some(encoding) = font.get(b"Encoding").ok().and_then(|o| resolve_dict(doc, o)) else {
        return;
    };
    let Some(Object::Array(differences)) = encoding
        .get(b"Differences")
        .ok()
        .and_then(|o| resolve(doc, o))
    else {
        return;
    };

    let mut code: usize = 0;
    for item in differences {
        match item {
            Object::Integer(n) => code = (*n).clamp(0, 255) as usize,
            Object::Name(name) => {
                if let Some(slot) = table.get_mut(code) {
                    *slot = glyph_name_text(name);
                }
                code += 1;
            }
            _ => {}
        }
    }
}

/// 常见字形名（小写字母、大写字母按名称本身处理）
const GLYPH_NAMES: &[(&str, &str)] = &[
    ("space", " "),
    ("exclam", "!"),
    ("quotedbl", "\""),
    ("numbersign", "#"),
    ("dollar", "$"),
    ("percent", "%"),
    ("ampersand", "&"),
    ("quotesingle", "'"),
    ("parenleft", "("),
    ("parenright", ")"),
    ("asterisk", "*"),
    ("plus", "+"),
    ("comma", ","),
    ("hyphen", "-"),
    ("period", "."),
    ("slash", "/"),
    ("zero", "0"),
    ("one", "1"),
    ("two", "2"),
    ("three", "3"),
    ("four", "4"),
    ("five", "5"),
    ("six", "6"),
    ("seven", "7"),
    ("eight", "8"),
    ("nine", "9"),
    ("colon", ":"),
    ("semicolon", ";"),
    ("less", "<"),
    ("equal", "="),
    ("greater", ">"),
    ("question", "?"),
    ("at", "@"),
    ("bracketleft", "["),
    ("backslash", "\\"),
    ("bracketright", "]"),
    ("asciicircum", "^"),
    ("underscore", "_"),
    ("grave", "`"),
    ("braceleft", "{"),
    ("bar", "|"),
    ("braceright", "}"),
    ("asciitilde", "~"),
    ("quoteleft", "\u{2018}"),
    ("quoteright", "\u{2019}"),
    ("quotedblleft", "\u{201C}"),
    ("quotedblright", "\u{201D}"),
    ("quotesinglbase", "\u{201A}"),
    ("quotedblbase", "\u{201E}"),
    ("endash", "\u{2013}"),
    ("emdash", "\u{2014}"),
    ("bullet", "\u{2022}"),
    ("ellipsis", "\u{2026}"),
    ("minus", "\u{2212}"),
    ("periodcentered", "\u{00B7}"),
    ("nbspace", "\u{00A0}"),
    ("section", "\u{00A7}"),
    ("paragraph", "\u{00B6}"),
    ("degree", "\u{00B0}"),
    ("copyright", "\u{00A9}"),
    ("registered", "\u{00AE}"),
    ("trademark", "\u{2122}"),
    ("sterling", "\u{00A3}"),
    ("yen", "\u{00A5}"),
    ("Euro", "\u{20AC}"),
    ("fi", "fi"),
    ("fl", "fl"),
    ("ff", "ff"),
    ("ffi", "ffi"),
    ("ffl", "ffl"),
    ("germandbls", "\u{00DF}"),
    ("agrave", "\u{00E0}"),
    ("aacute", "\u{00E1}"),
    ("acircumflex", "\u{00E2}"),
    ("atilde", "\u{00E3}"),
    ("adieresis", "\u{00E4}"),
    ("aring", "\u{00E5}"),
    ("ae", "\u{00E6}"),
    ("ccedilla", "\u{00E7}"),
    ("egrave", "\u{00E8}"),
    ("eacute", "\u{00E9}"),
    ("ecircumflex", "\u{00EA}"),
    ("edieresis", "\u{00EB}"),
    ("igrave", "\u{00EC}"),
    ("iacute", "\u{00ED}"),
    ("icircumflex", "\u{00EE}"),
    ("idieresis", "\u{00EF}"),
    ("ntilde", "\u{00F1}"),
    ("ograve", "\u{00F2}"),
    ("oacute", "\u{00F3}"),
    ("ocircumflex", "\u{00F4}"),
    ("otilde", "\u{00F5}"),
    ("odieresis", "\u{00F6}"),
    ("oslash", "\u{00F8}"),
    ("ugrave", "\u{00F9}"),
    ("uacute", "\u{00FA}"),
    ("ucircumflex", "\u{00FB}"),
    ("udieresis", "\u{00FC}"),
    ("yacute", "\u{00FD}"),
    ("ydieresis", "\u{00FF}"),
];

/// 按字形名还原文本：`uniXXXX`、`uXXXX`、单字符名、常见名称表，
/// 连字按 `_` 拆分，`.` 之后的变体后缀忽略
fn glyph_name_text(name: &[u8]) -> Option<String> {
    let name = std::str::from_utf8(name).ok()?;
    let base = name.split('.').next().unwrap_or(name);
    if base.is_empty() {
        return None;
    }
    base.split('_').map(glyph_component).collect()
}

fn glyph_component(name: &str) -> Option<String> {
    let is_hex = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit());

    if let Some(hex) = name.strip_prefix("uni") {
        if is_hex(hex) && hex.len() % 4 == 0 {
            let units: Option<Vec<u16>> = (0..hex.len())
                .step_by(4)
                .map(|i| u16::from_str_radix(&hex[i..i + 4], 16).ok())
                .collect();
            return String::from_utf16(&units?).ok();
        }
    }
    if let Some(hex) = name.strip_prefix('u') {
        if is_hex(hex) && (4..=6).contains(&hex.len()) {
            return u32::from_str_radix(hex, 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from);
        }
    }

    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(c.to_string());
    }

    if let Some((_, text)) = GLYPH_NAMES.iter().find(|(n, _)| *n == name) {
        return Some(text.to_string());
    }

    // 大写重音字母：Eacute → É
    let lower = name.to_lowercase();
    if name.starts_with(|c: char| c.is_ascii_uppercase()) {
        if let Some((_, text)) = GLYPH_NAMES.iter().find(|(n, _)| *n == lower) {
            return Some(text.to_uppercase());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Stream;

    #[test]
    fn test_win_ansi_encoding() {
        let doc = Document::with_version("1.5");
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "Encoding" => "WinAnsiEncoding",
        };
        let metrics = FontMetrics::load(&doc, &font);
        assert_eq!(metrics.decode(b'J' as u32), "J");
        assert_eq!(metrics.decode(0x93), "\u{201C}");
        assert_eq!(metrics.code_len(), 1);
    }

    #[test]
    fn test_differences_over_base_encoding() {
        let doc = Document::with_version("1.5");
        let font = dictionary! {
            "Subtype" => "Type1",
            "Encoding" => dictionary! {
                "Type" => "Encoding",
                "BaseEncoding" => "WinAnsiEncoding",
                "Differences" => vec![
                    65.into(),
                    Object::Name(b"J".to_vec()),
                    Object::Name(b"o".to_vec()),
                    Object::Name(b"h".to_vec()),
                    Object::Name(b"n".to_vec()),
                    200.into(),
                    Object::Name(b"uni00E9".to_vec()),
                    Object::Name(b"f_i".to_vec()),
                    Object::Name(b"Eacute".to_vec()),
                    Object::Name(b"a.sc".to_vec()),
                ],
            },
        };
        let metrics = FontMetrics::load(&doc, &font);
        let text: String = [65u32, 66, 67, 68].iter().map(|c| metrics.decode(*c)).collect();
        assert_eq!(text, "John");
        assert_eq!(metrics.decode(200), "é");
        assert_eq!(metrics.decode(201), "fi");
        assert_eq!(metrics.decode(202), "É");
        assert_eq!(metrics.decode(203), "a");
        // 未被覆盖的字符码沿用基础编码
        assert_eq!(metrics.decode(0x93), "\u{201C}");
    }

    #[test]
    fn test_type0_to_unicode_and_cid_widths() {
        let mut doc = Document::with_version("1.5");
        let cmap = "/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo
<< /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
2 beginbfchar
<0003> <004A>
<0004> <006F>
endbfchar
endcmap
CMapName currentdict /CMap defineresource pop
end
end";
        let to_unicode = doc.add_object(Stream::new(dictionary! {}, cmap.as_bytes().to_vec()));
        let descendant = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => "Arial",
            "DW" => 800,
            "W" => vec![
                Object::Integer(3),
                Object::Array(vec![Object::Integer(600), Object::Integer(550)]),
                Object::Integer(10),
                Object::Integer(20),
                Object::Integer(400),
            ],
        });
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "Arial",
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(descendant)],
            "ToUnicode" => to_unicode,
        };

        let metrics = FontMetrics::load(&doc, &font);
        assert_eq!(metrics.code_len(), 2);
        assert_eq!(metrics.decode(3), "J");
        assert_eq!(metrics.decode(4), "o");
        assert_eq!(metrics.decode(99), "");
        assert_eq!(metrics.width(3), 600.0);
        assert_eq!(metrics.width(4), 550.0);
        assert_eq!(metrics.width(15), 400.0);
        assert_eq!(metrics.width(42), 800.0);
    }

    #[test]
    fn test_type0_without_to_unicode_is_unmapped() {
        let doc = Document::with_version("1.5");
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "Encoding" => "Identity-H",
        };
        let metrics = FontMetrics::load(&doc, &font);
        assert_eq!(metrics.decode(0x004A), "");
        assert_eq!(metrics.width(0x004A), 1000.0);
    }

    #[test]
    fn test_glyph_names() {
        assert_eq!(glyph_name_text(b"space").as_deref(), Some(" "));
        assert_eq!(glyph_name_text(b"u1F600").as_deref(), Some("\u{1F600}"));
        assert_eq!(glyph_name_text(b"underscore").as_deref(), Some("_"));
        assert_eq!(glyph_name_text(b"g123"), None);
    }
}
