//! 面向用户的进度输出

use redactor_core::{Classification, PageStats, PipelineObserver, Word};
use std::io::{self, Stdout, Write};
use std::path::Path;

/// 把流水线进度写到标准输出
pub struct ConsoleObserver<W: Write = Stdout> {
    out: W,
}

impl ConsoleObserver<Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsoleObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    // 输出失败（例如管道已关闭）不影响脱敏本身
    fn line(&mut self, text: std::fmt::Arguments<'_>) {
        let _ = writeln!(self.out, "{}", text);
    }
}

impl<W: Write> PipelineObserver for ConsoleObserver<W> {
    fn page_classified(&mut self, page: usize, class: Classification, _stats: &PageStats) {
        if class == Classification::Scanned {
            self.line(format_args!("Page {}: scanned page, running OCR", page + 1));
        }
    }

    fn page_ocr(&mut self, page: usize, words: &[Word]) {
        self.line(format_args!(
            "Page {}: OCR recognized {} word(s)",
            page + 1,
            words.len()
        ));
    }

    fn term_matched(&mut self, page: usize, term: &str, count: usize) {
        self.line(format_args!(
            "Page {}: Found {} instance(s) of '{}'",
            page + 1,
            count,
            term
        ));
    }

    fn finished(&mut self, total: usize) {
        self.line(format_args!("\nApplied {} redaction(s) total.", total));
    }

    fn saved(&mut self, path: &Path) {
        self.line(format_args!("Redacted PDF saved to: {}", path.display()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_lines() {
        let mut observer = ConsoleObserver::new(Vec::new());
        let stats = PageStats {
            text_len: 0,
            image_coverage: 1.0,
        };
        observer.page_classified(0, Classification::Native, &stats);
        observer.page_classified(1, Classification::Scanned, &stats);
        observer.term_matched(0, "John Doe", 2);
        observer.finished(2);
        observer.saved(Path::new("/tmp/report_redacted.pdf"));

        let text = String::from_utf8(observer.into_inner()).unwrap();
        assert_eq!(
            text,
            "Page 2: scanned page, running OCR\n\
             Page 1: Found 2 instance(s) of 'John Doe'\n\
             \nApplied 2 redaction(s) total.\n\
             Redacted PDF saved to: /tmp/report_redacted.pdf\n"
        );
    }
}
