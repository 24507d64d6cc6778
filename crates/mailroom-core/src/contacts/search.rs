//! Case and diacritic insensitive matching.

use std::cmp::Ordering;

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Caller-supplied ordering of search results.
pub type Comparator<'a, T> = &'a (dyn Fn(&T, &T) -> Ordering + Send + Sync);

/// Lowercases `value` and strips its diacritics.
pub(crate) fn fold(value: &str) -> String {
    value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// A folded query matched against any number of fields.
#[derive(Debug, Clone)]
pub(crate) struct Matcher {
    needle: String,
}

impl Matcher {
    pub(crate) fn new(query: &str) -> Self {
        Self {
            needle: fold(query.trim()),
        }
    }

    pub(crate) fn matches<'a>(&self, fields: impl IntoIterator<Item = &'a str>) -> bool {
        self.needle.is_empty() || fields.into_iter().any(|field| fold(field).contains(&self.needle))
    }
}

/// Collects matches up to `limit`.
///
/// Without a comparator collection stops at the limit. With one, every match
/// is kept, sorted, then truncated so the limit applies to the sorted order.
pub(crate) struct Collector<'a, T> {
    limit: usize,
    comparator: Option<Comparator<'a, T>>,
    items: Vec<T>,
}

impl<'a, T> Collector<'a, T> {
    pub(crate) const fn new(limit: usize, comparator: Option<Comparator<'a, T>>) -> Self {
        Self {
            limit,
            comparator,
            items: Vec::new(),
        }
    }

    /// Adds `item`; returns false once no more items are wanted.
    pub(crate) fn push(&mut self, item: T) -> bool {
        self.items.push(item);
        self.comparator.is_some() || self.items.len() < self.limit
    }

    pub(crate) fn is_full(&self) -> bool {
        self.comparator.is_none() && self.items.len() >= self.limit
    }

    pub(crate) fn finish(mut self) -> Vec<T> {
        if let Some(comparator) = self.comparator {
            self.items.sort_by(|a, b| comparator(a, b));
        }
        self.items.truncate(self.limit);
        self.items
    }
}
