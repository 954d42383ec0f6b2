//! 脱敏流水线
//!
//! 分类 → 清除扫描页文字层 → OCR 并回写不可见文字 → 匹配并提交标记 → 保存。
//! 原生文字页跳过第二、三阶段。

use crate::classify::{classify_page, Classification};
use crate::document::{PdfBackend, SaveOptions};
use crate::extract::{extract_ocr_words, DEFAULT_DPI};
use crate::matcher::redact;
use crate::observer::PipelineObserver;
use crate::ocr::OcrEngine;
use crate::persist::{finalize, output_path_for};
use crate::strip::strip_text;
use crate::terms::TermSet;
use crate::{RedactError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 单页状态，只能前进不能回退
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    Unclassified,
    Classified,
    Stripped,
    Ocred,
    Marked,
    Applied,
}

/// 取消标志，在每页开始前检查
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RedactError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// 各阶段共享的运行上下文
pub struct StageContext<'a> {
    observer: &'a mut dyn PipelineObserver,
    cancel: CancelFlag,
    states: Vec<PageState>,
}

impl<'a> StageContext<'a> {
    pub fn new(observer: &'a mut dyn PipelineObserver) -> Self {
        Self {
            observer,
            cancel: CancelFlag::default(),
            states: Vec::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn observer(&mut self) -> &mut dyn PipelineObserver {
        &mut *self.observer
    }

    /// 页面粒度的取消检查点
    pub fn checkpoint(&self) -> Result<()> {
        self.cancel.check()
    }

    pub fn state(&self, page: usize) -> PageState {
        self.states
            .get(page)
            .copied()
            .unwrap_or(PageState::Unclassified)
    }

    pub fn states(&self) -> &[PageState] {
        &self.states
    }

    /// 推进页面状态；回退或原地踏步会被忽略并返回 false
    pub fn advance(&mut self, page: usize, next: PageState) -> bool {
        if page >= self.states.len() {
            self.states.resize(page + 1, PageState::Unclassified);
        }
        let current = self.states[page];
        if next <= current {
            log::warn!(
                "[Pipeline] 页面 {} 不能从 {:?} 回到 {:?}",
                page,
                current,
                next
            );
            return false;
        }
        self.states[page] = next;
        true
    }
}

/// 流水线选项
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// OCR 渲染分辨率
    pub dpi: u32,
    pub save: SaveOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            save: SaveOptions::default(),
        }
    }
}

/// 一次运行的结果
#[derive(Debug, Clone, Serialize)]
pub struct RedactReport {
    pub output_path: PathBuf,
    pub total_redactions: usize,
    pub classifications: Vec<Classification>,
}

impl RedactReport {
    pub fn scanned_pages(&self) -> Vec<usize> {
        self.classifications
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == Classification::Scanned)
            .map(|(i, _)| i)
            .collect()
    }
}

/// 脱敏流水线
pub struct Pipeline<'a, O> {
    ocr: O,
    observer: &'a mut dyn PipelineObserver,
    options: PipelineOptions,
    cancel: CancelFlag,
}

impl<'a, O: OcrEngine> Pipeline<'a, O> {
    pub fn new(ocr: O, observer: &'a mut dyn PipelineObserver) -> Self {
        Self {
            ocr,
            observer,
            options: PipelineOptions::default(),
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// 运行完整流水线
    ///
    /// 没有词条时不打开文档，直接返回 `None`。输出文件只在全部页面
    /// 处理完毕后才写入。
    pub fn run<B, F>(&mut self, input: &Path, terms: &TermSet, open: F) -> Result<Option<RedactReport>>
    where
        B: PdfBackend,
        F: FnOnce(&Path) -> Result<B>,
    {
        if terms.is_empty() {
            log::info!("[Pipeline] 没有待脱敏词条，跳过");
            return Ok(None);
        }
        self.cancel.check()?;

        let output_path = output_path_for(input);
        log::info!("[Pipeline] 打开 PDF: {}", input.display());
        let mut backend = open(input)?;

        let mut ctx = StageContext::new(&mut *self.observer).with_cancel(self.cancel.clone());

        let classifications = classify_pages(&mut backend, &mut ctx)?;
        let scanned: Vec<usize> = classifications
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == Classification::Scanned)
            .map(|(i, _)| i)
            .collect();
        log::info!(
            "[Pipeline] 共 {} 页，其中扫描页 {:?}",
            classifications.len(),
            scanned
        );

        strip_text(&mut backend, &scanned, &mut ctx)?;
        let ocr_index = extract_ocr_words(
            &mut backend,
            &scanned,
            self.options.dpi,
            &mut self.ocr,
            &mut ctx,
        )?;
        let total_redactions = redact(&mut backend, &ocr_index, terms, &mut ctx)?;
        ctx.observer().finished(total_redactions);

        ctx.checkpoint()?;
        let output_path = finalize(backend, &output_path, &self.options.save)?;
        ctx.observer().saved(&output_path);

        Ok(Some(RedactReport {
            output_path,
            total_redactions,
            classifications,
        }))
    }
}

fn classify_pages<B: PdfBackend + ?Sized>(
    backend: &mut B,
    ctx: &mut StageContext<'_>,
) -> Result<Vec<Classification>> {
    let page_count = backend.page_count();
    let mut classifications = Vec::with_capacity(page_count);

    for page in 0..page_count {
        ctx.checkpoint()?;
        let (class, stats) = classify_page(backend, page)?;
        ctx.advance(page, PageState::Classified);
        ctx.observer().page_classified(page, class, &stats);
        classifications.push(class);
    }

    Ok(classifications)
}

/// 便捷入口：使用默认选项运行流水线，返回输出路径
pub fn redact_pdf<B, O, F>(
    input: &Path,
    terms: &TermSet,
    open: F,
    ocr: O,
    observer: &mut dyn PipelineObserver,
) -> Result<Option<PathBuf>>
where
    B: PdfBackend,
    O: OcrEngine,
    F: FnOnce(&Path) -> Result<B>,
{
    let report = Pipeline::new(ocr, observer).run(input, terms, open)?;
    Ok(report.map(|r| r.output_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::observer::NoopObserver;
    use crate::testing::{detection, FakeBackend, FakePage, RecordingObserver, ScriptedOcr};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn two_page_document() -> FakeBackend {
        FakeBackend::new(vec![
            FakePage::native(
                "Contact John Doe at 555-1234 regarding the quarterly compliance review.",
            ),
            FakePage::scanned(),
        ])
    }

    fn confidential_scan() -> Vec<crate::OcrDetection> {
        vec![
            detection("Confidential:", 300.0, 300.0, 400.0, 60.0),
            detection("Jane", 720.0, 300.0, 150.0, 60.0),
            detection("Roe", 890.0, 300.0, 120.0, 60.0),
            detection("   ", 1100.0, 300.0, 40.0, 60.0),
        ]
    }

    #[test]
    fn test_end_to_end_native_and_scanned() {
        let backend = Rc::new(RefCell::new(None));
        let mut ocr = ScriptedOcr::new(vec![confidential_scan()]);
        let mut observer = RecordingObserver::default();
        let terms = TermSet::new(["John Doe", "Jane Roe"]);

        let report = {
            let slot = backend.clone();
            Pipeline::new(&mut ocr, &mut observer)
                .run(Path::new("/tmp/case/report.pdf"), &terms, move |_| {
                    let doc = two_page_document();
                    *slot.borrow_mut() = Some(doc.journal());
                    Ok(doc)
                })
                .unwrap()
                .unwrap()
        };

        assert_eq!(
            report.classifications,
            vec![Classification::Native, Classification::Scanned]
        );
        assert_eq!(report.scanned_pages(), vec![1]);
        assert_eq!(report.total_redactions, 2);
        assert_eq!(
            report.output_path,
            PathBuf::from("/tmp/case/report_redacted.pdf")
        );
        assert_eq!(ocr.calls(), 1);

        let journal = backend.borrow().clone().unwrap();
        let journal = journal.borrow();
        assert_eq!(journal.saved.as_deref(), Some(Path::new("/tmp/case/report_redacted.pdf")));
        // 空白检测结果不会被回写
        assert_eq!(journal.inserted.len(), 3);
        assert!(journal.renders.iter().all(|(page, _)| *page == 1));

        assert_eq!(
            observer.matches,
            vec![(0, "John Doe".to_string(), 1), (1, "Jane Roe".to_string(), 1)]
        );
        assert_eq!(observer.finished, Some(2));
        assert_eq!(observer.stripped, vec![1]);
    }

    #[test]
    fn test_no_terms_never_opens_document() {
        let mut ocr = ScriptedOcr::new(vec![]);
        let mut observer = NoopObserver;
        let result = Pipeline::new(&mut ocr, &mut observer)
            .run(
                Path::new("in.pdf"),
                &TermSet::new(["", "  "]),
                |_: &Path| -> Result<FakeBackend> {
                    panic!("backend must not be opened without terms")
                },
            )
            .unwrap();
        assert!(result.is_none());
        assert_eq!(ocr.calls(), 0);
    }

    #[test]
    fn test_cancel_before_start() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut ocr = ScriptedOcr::new(vec![]);
        let mut observer = NoopObserver;
        let err = Pipeline::new(&mut ocr, &mut observer)
            .with_cancel_flag(cancel)
            .run(Path::new("in.pdf"), &TermSet::new(["x"]), |_| {
                Ok(two_page_document())
            })
            .unwrap_err();
        assert!(matches!(err, RedactError::Interrupted));
    }

    #[test]
    fn test_cancel_mid_run_writes_nothing() {
        struct CancelOnOcr {
            cancel: CancelFlag,
            saw_ocr: bool,
        }
        impl PipelineObserver for CancelOnOcr {
            fn page_ocr(&mut self, _page: usize, _words: &[crate::Word]) {
                self.saw_ocr = true;
                self.cancel.cancel();
            }
        }

        let cancel = CancelFlag::new();
        let mut observer = CancelOnOcr {
            cancel: cancel.clone(),
            saw_ocr: false,
        };
        let mut ocr = ScriptedOcr::new(vec![confidential_scan()]);
        let journal = Rc::new(RefCell::new(None));
        let slot = journal.clone();

        let err = Pipeline::new(&mut ocr, &mut observer)
            .with_cancel_flag(cancel)
            .run(Path::new("in.pdf"), &TermSet::new(["Jane"]), move |_| {
                let doc = two_page_document();
                *slot.borrow_mut() = Some(doc.journal());
                Ok(doc)
            })
            .unwrap_err();

        assert!(matches!(err, RedactError::Interrupted));
        assert!(observer.saw_ocr);
        let journal = journal.borrow().clone().unwrap();
        assert!(journal.borrow().saved.is_none());
    }

    #[test]
    fn test_page_states_only_move_forward() {
        let mut observer = NoopObserver;
        let mut ctx = StageContext::new(&mut observer);
        assert!(ctx.advance(0, PageState::Classified));
        assert!(ctx.advance(0, PageState::Marked));
        assert!(!ctx.advance(0, PageState::Stripped));
        assert!(ctx.advance(0, PageState::Applied));
        assert!(!ctx.advance(0, PageState::Applied));
        assert_eq!(ctx.state(0), PageState::Applied);
        assert_eq!(ctx.state(7), PageState::Unclassified);
    }

    #[test]
    fn test_every_page_reaches_applied() {
        let mut backend = two_page_document();
        let mut ocr = ScriptedOcr::new(vec![confidential_scan()]);
        let mut observer = NoopObserver;
        let mut ctx = StageContext::new(&mut observer);

        let classes = classify_pages(&mut backend, &mut ctx).unwrap();
        assert_eq!(classes.len(), 2);
        strip_text(&mut backend, &[1], &mut ctx).unwrap();
        let index = extract_ocr_words(&mut backend, &[1], 300, &mut ocr, &mut ctx).unwrap();
        redact(&mut backend, &index, &TermSet::new(["nothing"]), &mut ctx).unwrap();

        assert_eq!(ctx.states(), &[PageState::Applied, PageState::Applied]);
    }

    #[test]
    fn test_redact_pdf_returns_output_path() {
        let mut observer = NoopObserver;
        let out = redact_pdf(
            Path::new("scan.PDF"),
            &TermSet::new(["Doe"]),
            |_| Ok(two_page_document()),
            ScriptedOcr::new(vec![vec![detection("Doe", 10.0, 10.0, 50.0, 20.0)]]),
            &mut observer,
        )
        .unwrap();
        assert_eq!(out, Some(PathBuf::from("scan_redacted.PDF")));
    }

    #[test]
    fn test_scanned_page_marks_stay_inside_page() {
        let mut backend = two_page_document();
        let mut ocr = ScriptedOcr::new(vec![confidential_scan()]);
        let mut observer = NoopObserver;
        let mut ctx = StageContext::new(&mut observer);

        let index = extract_ocr_words(&mut backend, &[1], 300, &mut ocr, &mut ctx).unwrap();
        let bounds = backend.page_bounds(1).unwrap();
        for word in &index[&1] {
            assert!(bounds.contains_point(word.rect.x0, word.rect.y0));
            assert!(bounds.contains_point(word.rect.x1, word.rect.y1));
        }
        assert_eq!(
            index[&1][1].rect,
            Rect::new(172.8, 72.0, 208.8, 86.4)
        );
    }
}
