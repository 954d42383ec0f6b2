//! 待脱敏词条

use serde::{Deserialize, Serialize};

/// 词条集合
///
/// 构造时去除首尾空白并丢弃空词条；重复词条保留，
/// 重复的词条会各自计数。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermSet {
    terms: Vec<String>,
}

impl TermSet {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        Self { terms }
    }

    /// 每行一个词条
    pub fn from_lines(text: &str) -> Self {
        Self::new(text.lines())
    }

    /// 合并另一组词条
    pub fn extend(&mut self, other: TermSet) {
        self.terms.extend(other.terms);
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }
}
