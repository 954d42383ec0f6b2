//! 输出校验：在脱敏后的文档中重新搜索全部词条

use crate::document::PdfBackend;
use crate::terms::TermSet;
use crate::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub ok: bool,
    pub warnings: Vec<String>,
}

/// 任何词条仍能被搜到都记为一条警告
pub fn verify_output<B: PdfBackend + ?Sized>(backend: &mut B, terms: &TermSet) -> Result<VerifyResult> {
    let mut warnings = Vec::new();

    for page in 0..backend.page_count() {
        for term in terms.iter() {
            let hits = backend.search_text(page, term)?;
            if !hits.is_empty() {
                log::warn!("[Verify] 页面 {} 仍可搜索到 '{}' ({} 处)", page, term, hits.len());
                warnings.push(format!(
                    "page {}: '{}' still found {} time(s)",
                    page + 1,
                    term,
                    hits.len()
                ));
            }
        }
    }

    Ok(VerifyResult {
        ok: warnings.is_empty(),
        warnings,
    })
}
