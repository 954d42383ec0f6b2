//! 输出路径推导与保存

use crate::document::{PdfBackend, SaveOptions};
use crate::Result;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// 输出文件名后缀
pub const REDACTED_SUFFIX: &str = "_redacted";

/// `dir/name.pdf` → `dir/name_redacted.pdf`
pub fn output_path_for(input: &Path) -> PathBuf {
    let mut name = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    name.push(REDACTED_SUFFIX);
    if let Some(ext) = input.extension() {
        name.push(".");
        name.push(ext);
    }
    input.with_file_name(name)
}

/// 保存文档并释放后端，返回输出路径
pub fn finalize<B: PdfBackend>(mut backend: B, output: &Path, options: &SaveOptions) -> Result<PathBuf> {
    log::info!("[Save] 写入 {}", output.display());
    backend.save(output, options)?;
    drop(backend);
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, FakePage};

    #[test]
    fn test_output_path_for() {
        assert_eq!(
            output_path_for(Path::new("/data/in/report.pdf")),
            PathBuf::from("/data/in/report_redacted.pdf")
        );
        assert_eq!(
            output_path_for(Path::new("report.pdf")),
            PathBuf::from("report_redacted.pdf")
        );
        assert_eq!(
            output_path_for(Path::new("archive.v2.pdf")),
            PathBuf::from("archive.v2_redacted.pdf")
        );
        assert_eq!(
            output_path_for(Path::new("/tmp/noext")),
            PathBuf::from("/tmp/noext_redacted")
        );
    }

    #[test]
    fn test_finalize_saves_to_output() {
        let backend = FakeBackend::new(vec![FakePage::native("x")]);
        let journal = backend.journal();
        let out = finalize(
            backend,
            Path::new("/tmp/a_redacted.pdf"),
            &SaveOptions::default(),
        )
        .unwrap();
        assert_eq!(out, PathBuf::from("/tmp/a_redacted.pdf"));
        assert_eq!(journal.borrow().saved.as_deref(), Some(out.as_path()));
    }
}
