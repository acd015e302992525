#![forbid(unsafe_code)]

use crate::store::{ColumnEncoding, ColumnStore};
use crate::value::Value;

/// Per-column summary computed when a cache is closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnStats {
    pub encoding: ColumnEncoding,
    pub nullable: bool,
    pub row_count: usize,
    pub null_count: usize,
    /// Exact distinct non-null count; `None` for encodings that do not know it
    /// (raw and affine arrays).
    pub distinct_count: Option<usize>,
    pub heap_size_bytes: usize,
}

impl ColumnStats {
    pub(crate) fn collect(store: &ColumnStore) -> Self {
        Self {
            encoding: store.encoding(),
            nullable: store.is_nullable(),
            row_count: store.size(),
            null_count: store.null_count(),
            distinct_count: distinct_count(store),
            heap_size_bytes: store.heap_size_bytes(),
        }
    }
}

fn distinct_count(store: &ColumnStore) -> Option<usize> {
    match store {
        ColumnStore::Nullable { inner, .. } => distinct_count(inner),
        ColumnStore::Constant {
            value: Value::Null, ..
        } => Some(0),
        ColumnStore::Constant { .. } => Some(1),
        ColumnStore::Dictionary(d) => Some(d.table().len()),
        ColumnStore::Raw(values) if values.is_empty() => Some(0),
        ColumnStore::Raw(_) | ColumnStore::Affine(_) => None,
    }
}
