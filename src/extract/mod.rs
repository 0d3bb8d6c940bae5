//! DOM 评论提取 (DOM Comment Extractor)
//!
//! 收敛后对页面快照做一次性解析。各字段的提取写成有序的候选策略链，
//! 依次尝试直到某一策略给出结果；新增兜底规则只需往链上追加函数。

pub mod text;

use indexmap::IndexMap;
use scraper::ElementRef;

use crate::core::model::CapturedComment;

/// 单字段提取策略
pub type Probe<T> = fn(ElementRef<'_>) -> Option<T>;

/// 依次尝试策略链，返回第一个结果
pub fn first_match<T>(el: ElementRef<'_>, chain: &[Probe<T>]) -> Option<T> {
    chain.iter().find_map(|probe| probe(el))
}

/// 去重评论簿
///
/// 以 `(author, content)` 为键，保留首次出现的条目与顺序。
#[derive(Debug, Default)]
pub struct CommentBook {
    entries: IndexMap<(String, String), CapturedComment>,
    limit: Option<usize>,
}

impl CommentBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            entries: IndexMap::new(),
            limit,
        }
    }

    /// 追加一条评论；重复或已满时返回 `false`
    pub fn insert(&mut self, comment: CapturedComment) -> bool {
        if self.is_full() {
            return false;
        }
        let key = comment.dedup_key();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, comment);
        true
    }

    /// 批量追加，返回新增条数
    pub fn extend(&mut self, comments: impl IntoIterator<Item = CapturedComment>) -> usize {
        comments.into_iter().filter_map(|c| self.insert(c).then_some(())).count()
    }

    pub fn is_full(&self) -> bool {
        self.limit.is_some_and(|l| self.entries.len() >= l)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<CapturedComment> {
        self.entries.into_values().collect()
    }
}
