#![forbid(unsafe_code)]

pub type VirtualizerResult<T> = Result<T, VirtualizerError>;

/// Errors surfaced by the cache, its builders and cursors.
///
/// Every variant signals a contract violation by the caller (or a corrupt persisted cache);
/// none of them is transient, so retrying the same call never helps.
#[derive(Debug, thiserror::Error)]
pub enum VirtualizerError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("row {row} has no value for column {column}")]
    MissingColumn { column: String, row: usize },

    #[error("column index {index} out of range for {columns} columns")]
    ColumnIndexOutOfRange { index: usize, columns: usize },

    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("row length mismatch: expected {expected} values, got {actual}")]
    RowLengthMismatch { expected: usize, actual: usize },

    #[error("column builder is frozen")]
    BuilderFrozen,

    #[error("cache is closed for recording")]
    CacheClosed,

    #[error("cache is still recording; close it before replaying")]
    CacheNotClosed,

    #[error("value iterator is not positioned on a row")]
    IteratorNotPositioned,

    #[error("corrupt cache data: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("source error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// An affine fit would not reconstruct inside the original numeric range.
///
/// Only ever used to demote the affine candidate of a column builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct EncodingOverflow;
