//! Column value cache for multi-pass report filling.
//!
//! A report fill needs several passes over the same rows (sorting, group boundaries,
//! crosstab buckets, the fill itself) while the underlying source can only be read once. This
//! crate focuses on:
//! - Recording a single forward pass, one value per column per row ([`ColumnCache`]).
//! - Per-column encoding picked at freeze time: constant, affine, dictionary or raw, with a
//!   null overlay ([`ColumnStore`]).
//! - Cheap, independent replay cursors with bit-exact fidelity ([`ReplayCursor`]).
//! - An optional binary layout for keeping a recorded cache across runs.

#![forbid(unsafe_code)]

mod bitmap;
mod builder;
mod cache;
mod cursor;
mod error;
mod iter;
mod options;
mod packed;
mod persist;
mod source;
mod stats;
mod store;
mod value;

pub use crate::bitmap::NullBitmap;
pub use crate::builder::ColumnBuilder;
pub use crate::cache::ColumnCache;
pub use crate::cursor::{ReplayCursor, RewindableDataset};
pub use crate::error::{VirtualizerError, VirtualizerResult};
pub use crate::iter::{ColumnIter, ValueIterator};
pub use crate::options::CacheOptions;
pub use crate::packed::{PackedCodes, PackedInts};
pub use crate::source::{record_source, ForwardOnlySource, VecSource, VecSourceError};
pub use crate::stats::ColumnStats;
pub use crate::store::{AffineStore, ColumnEncoding, ColumnStore, DictionaryStore};
pub use crate::value::{Value, ValueKind};
