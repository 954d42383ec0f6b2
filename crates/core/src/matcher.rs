//! 词条匹配与标记提交
//!
//! 扫描页在 OCR 单词上做子串匹配，其余页面交给后端的文字搜索。
//! 每页的全部标记在最后一次性提交。

use crate::document::{ImagePolicy, PdfBackend};
use crate::extract::OcrIndex;
use crate::geometry::Rect;
use crate::marks::{MarkBuffer, RedactionMark, Word};
use crate::pipeline::{PageState, StageContext};
use crate::terms::TermSet;
use crate::Result;

/// 在所有页面上脱敏全部词条，返回提交的标记总数
pub fn redact<B: PdfBackend + ?Sized>(
    backend: &mut B,
    ocr_index: &OcrIndex,
    terms: &TermSet,
    ctx: &mut StageContext<'_>,
) -> Result<usize> {
    let mut total = 0;

    for page in 0..backend.page_count() {
        ctx.checkpoint()?;

        let words = ocr_index.get(&page);
        let mut buffer = MarkBuffer::new(page);
        for term in terms.iter() {
            let hits = match words {
                Some(words) => match_words(words, term),
                None => backend.search_text(page, term)?,
            };
            if !hits.is_empty() {
                ctx.observer().term_matched(page, term, hits.len());
            }
            for rect in hits {
                buffer.push(RedactionMark::black(rect));
            }
        }
        ctx.advance(page, PageState::Marked);

        // 没有命中也要提交：页面状态统一推进到 Applied
        let committed = buffer.commit(backend, ImagePolicy::Preserve)?;
        ctx.advance(page, PageState::Applied);
        ctx.observer().page_redacted(page, committed);
        total += committed;
    }

    log::info!("[Redact] 共提交 {} 个标记", total);
    Ok(total)
}

/// 在 OCR 单词中查找词条（大小写不敏感的子串匹配）
///
/// 多词词条额外匹配同一行上连续的若干单词，命中区域为这些单词的外接框。
pub fn match_words(words: &[Word], term: &str) -> Vec<Rect> {
    let needle = term.to_lowercase();
    if needle.trim().is_empty() {
        return Vec::new();
    }
    let lowered: Vec<String> = words.iter().map(|w| w.text.to_lowercase()).collect();

    let mut hits: Vec<Rect> = words
        .iter()
        .zip(&lowered)
        .filter(|(_, text)| text.contains(&needle))
        .map(|(word, _)| word.rect)
        .collect();

    let tokens: Vec<&str> = needle.split_whitespace().collect();
    if tokens.len() > 1 {
        hits.extend(match_phrase(words, &lowered, &tokens));
    }
    hits
}

fn match_phrase(words: &[Word], lowered: &[String], tokens: &[&str]) -> Vec<Rect> {
    let span = tokens.len();
    let phrase = tokens.join(" ");
    let mut hits = Vec::new();

    if words.len() < span {
        return hits;
    }
    for start in 0..=words.len() - span {
        let window = &words[start..start + span];
        let texts = &lowered[start..start + span];

        if !window.windows(2).all(|pair| pair[0].rect.same_line(&pair[1].rect)) {
            continue;
        }
        // 单个单词已经命中的情况由逐词匹配处理
        if texts.iter().any(|t| t.contains(&phrase)) {
            continue;
        }
        if texts.join(" ").contains(&phrase) {
            let rect = window[1..]
                .iter()
                .fold(window[0].rect, |acc, w| acc.union(&w.rect));
            hits.push(rect);
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::testing::{FakeBackend, FakePage, RecordingObserver};

    fn word(text: &str, x: f32, y: f32) -> Word {
        Word::new(text, Rect::from_xywh(x, y, 40.0, 12.0))
    }

    #[test]
    fn test_substring_match_on_ocr_words() {
        let words = vec![word("Johnson", 10.0, 10.0), word("Smith", 60.0, 10.0)];
        assert_eq!(match_words(&words, "son").len(), 1);
        assert_eq!(match_words(&words, "SMITH").len(), 1);
        assert!(match_words(&words, "xyz").is_empty());
    }

    #[test]
    fn test_phrase_spans_adjacent_words() {
        let words = vec![
            word("Confidential:", 0.0, 10.0),
            word("Jane", 60.0, 10.0),
            word("Roe", 110.0, 10.0),
        ];
        let hits = match_words(&words, "jane roe");
        assert_eq!(hits, vec![Rect::new(60.0, 10.0, 150.0, 22.0)]);
    }

    #[test]
    fn test_phrase_not_matched_across_lines() {
        let words = vec![word("Jane", 60.0, 10.0), word("Roe", 10.0, 40.0)];
        assert!(match_words(&words, "Jane Roe").is_empty());
    }

    #[test]
    fn test_phrase_inside_single_word_counted_once() {
        let words = vec![word("Jane Roe", 0.0, 10.0), word("Roe", 60.0, 10.0)];
        assert_eq!(match_words(&words, "jane roe").len(), 1);
    }

    #[test]
    fn test_native_page_marks_every_occurrence() {
        let mut backend = FakeBackend::new(vec![FakePage::native(
            "secret plans, SECRET codes and more Secret things",
        )]);
        let journal = backend.journal();
        let mut observer = RecordingObserver::default();
        let mut ctx = StageContext::new(&mut observer);

        let total = redact(
            &mut backend,
            &OcrIndex::new(),
            &TermSet::new(["secret"]),
            &mut ctx,
        )
        .unwrap();

        assert_eq!(total, 3);
        assert!(backend.search_text(0, "secret").unwrap().is_empty());
        let journal = journal.borrow();
        assert_eq!(journal.applied.len(), 1);
        assert!(journal.applied[0].1.iter().all(|m| m.fill.is_some()));
        drop(ctx);
        assert_eq!(observer.matches, vec![(0, "secret".to_string(), 3)]);
    }

    #[test]
    fn test_scanned_page_uses_ocr_index_not_search() {
        let mut backend = FakeBackend::new(vec![FakePage::scanned().with_text("Johnson")]);
        let mut index = OcrIndex::new();
        index.insert(0, vec![word("Smith", 10.0, 10.0)]);
        let mut observer = NoopObserver;
        let mut ctx = StageContext::new(&mut observer);

        // 文字层中的 Johnson 不会被匹配，OCR 单词才是依据
        let total = redact(&mut backend, &index, &TermSet::new(["son"]), &mut ctx).unwrap();
        assert_eq!(total, 0);

        let total = redact(&mut backend, &index, &TermSet::new(["mit"]), &mut ctx).unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_duplicate_terms_count_separately() {
        let mut backend = FakeBackend::new(vec![FakePage::native("one secret here")]);
        let mut observer = NoopObserver;
        let mut ctx = StageContext::new(&mut observer);

        let total = redact(
            &mut backend,
            &OcrIndex::new(),
            &TermSet::new(["secret", "secret"]),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_pages_without_hits_still_committed() {
        let mut backend = FakeBackend::new(vec![FakePage::native("a"), FakePage::native("b")]);
        let journal = backend.journal();
        let mut observer = NoopObserver;
        let mut ctx = StageContext::new(&mut observer);

        let total = redact(&mut backend, &OcrIndex::new(), &TermSet::new(["zzz"]), &mut ctx)
            .unwrap();

        assert_eq!(total, 0);
        assert_eq!(journal.borrow().applied.len(), 2);
        assert_eq!(ctx.states(), &[PageState::Applied, PageState::Applied]);
    }
}
