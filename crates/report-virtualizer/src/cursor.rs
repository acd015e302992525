#![forbid(unsafe_code)]

use crate::cache::ColumnCache;
use crate::error::{VirtualizerError, VirtualizerResult};
use crate::iter::{ColumnIter, ValueIterator};
use crate::store::ColumnStore;
use crate::value::Value;

/// A dataset that can be traversed any number of times, the contract sorting, grouping and
/// fill passes consume.
pub trait RewindableDataset {
    /// Rewind to before the first row.
    fn move_first(&mut self);

    /// Advance one row; `false` once the dataset is exhausted (and on every call after).
    fn next(&mut self) -> bool;

    /// The current row's value for `column`.
    fn get_value(&self, column: &str) -> VirtualizerResult<Value>;
}

/// An independently positioned view over a closed [`ColumnCache`].
///
/// Cursors borrow the cache and own only their position and per-column iterators, so any
/// number of them can run side by side (including from different threads).
#[derive(Clone, Debug)]
pub struct ReplayCursor<'a> {
    cache: &'a ColumnCache,
    columns: &'a [ColumnStore],
    iters: Vec<ColumnIter<'a>>,
    /// Number of rows consumed so far; `0` means before the first row.
    consumed: usize,
}

impl<'a> ReplayCursor<'a> {
    pub(crate) fn new(cache: &'a ColumnCache, columns: &'a [ColumnStore]) -> Self {
        Self {
            cache,
            columns,
            iters: columns.iter().map(ColumnStore::iterator).collect(),
            consumed: 0,
        }
    }

    pub fn row_count(&self) -> usize {
        self.cache.row_count()
    }

    pub fn column_names(&self) -> &'a [String] {
        self.cache.column_names()
    }

    /// The current row index, or `None` before the first row and after exhaustion.
    pub fn position(&self) -> Option<usize> {
        match self.consumed {
            0 => None,
            n if n > self.row_count() => None,
            n => Some(n - 1),
        }
    }

    /// The current row's value for the column at `index` (in [`ColumnCache::column_names`]
    /// order).
    pub fn get_value_at(&self, index: usize) -> VirtualizerResult<Value> {
        let iter = self
            .iters
            .get(index)
            .ok_or(VirtualizerError::ColumnIndexOutOfRange {
                index,
                columns: self.iters.len(),
            })?;
        iter.get()
    }
}

impl RewindableDataset for ReplayCursor<'_> {
    fn move_first(&mut self) {
        self.iters = self.columns.iter().map(ColumnStore::iterator).collect();
        self.consumed = 0;
    }

    fn next(&mut self) -> bool {
        if self.consumed > self.row_count() {
            return false;
        }
        for iter in &mut self.iters {
            iter.advance();
        }
        self.consumed += 1;
        self.consumed <= self.row_count()
    }

    fn get_value(&self, column: &str) -> VirtualizerResult<Value> {
        let idx = self
            .cache
            .column_index(column)
            .ok_or_else(|| VirtualizerError::UnknownColumn(column.to_owned()))?;
        self.iters[idx].get()
    }
}
