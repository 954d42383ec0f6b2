//! 输出文档的 Info 元信息

use crate::error::Result;
use chrono::{DateTime, Local, Offset, TimeZone};
use lopdf::{Dictionary, Document, Object, StringFormat};

pub const TOOL_NAME: &str = "redactor";

fn literal(value: &str) -> Object {
    Object::String(value.as_bytes().to_vec(), StringFormat::Literal)
}

/// PDF 日期格式 D:YYYYMMDDHHmmSS+HH'mm'
pub fn pdf_date<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let offset = time.offset().fix().local_minus_utc();
    let sign = if offset < 0 { '-' } else { '+' };
    let minutes = offset.abs() / 60;
    format!(
        "D:{}{}{:02}'{:02}'",
        time.format("%Y%m%d%H%M%S"),
        sign,
        minutes / 60,
        minutes % 60
    )
}

/// 在 Info 字典中写入工具标识和处理时间
pub fn set_redaction_metadata(doc: &mut Document) -> Result<()> {
    let info_id = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => *id,
        _ => {
            let new_id = doc.add_object(Object::Dictionary(Dictionary::new()));
            doc.trailer.set("Info", Object::Reference(new_id));
            new_id
        }
    };

    let date = pdf_date(&Local::now());
    let producer = format!("{} v{}", TOOL_NAME, env!("CARGO_PKG_VERSION"));

    let info = doc.get_object_mut(info_id)?.as_dict_mut()?;
    info.set("Producer", literal(&producer));
    info.set("Creator", literal(TOOL_NAME));
    info.set("ModDate", literal(&date));
    info.set("Redacted", literal("true"));
    info.set("RedactedBy", literal(&producer));
    info.set("RedactedAt", literal(&date));

    log::info!("[Metadata] 已设置脱敏元信息: Producer={}, ModDate={}", producer, date);
    Ok(())
}
