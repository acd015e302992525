#![forbid(unsafe_code)]

//! The recording driver: pulls a forward-only source exactly once into a [`ColumnCache`].

use crate::cache::ColumnCache;
use crate::error::{VirtualizerError, VirtualizerResult};
use crate::options::CacheOptions;
use crate::value::Value;

/// A data producer that can be traversed once, in order, with no rewind.
pub trait ForwardOnlySource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Field names, in the order the cache should list its columns.
    fn field_names(&self) -> Vec<String>;

    /// Move to the next row; `false` once the source is exhausted.
    fn advance(&mut self) -> Result<bool, Self::Error>;

    /// The current row's value for `name`.
    fn field_value(&self, name: &str) -> Result<Value, Self::Error>;
}

/// Record every remaining row of `source` and return the closed cache.
pub fn record_source<S: ForwardOnlySource>(
    source: &mut S,
    options: CacheOptions,
) -> VirtualizerResult<ColumnCache> {
    let names = source.field_names();
    let mut cache = ColumnCache::open(names.iter().cloned(), options)?;

    let mut row = Vec::with_capacity(names.len());
    while source.advance().map_err(source_error)? {
        row.clear();
        for name in &names {
            row.push(source.field_value(name).map_err(source_error)?);
        }
        cache.record_values(&row)?;
    }

    cache.close()?;
    log::debug!(
        "recorded {} rows x {} columns from source",
        cache.row_count(),
        cache.column_count()
    );
    Ok(cache)
}

fn source_error<E: std::error::Error + Send + Sync + 'static>(err: E) -> VirtualizerError {
    VirtualizerError::Source(Box::new(err))
}

#[derive(Debug, thiserror::Error)]
pub enum VecSourceError {
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("source is not positioned on a row")]
    NotPositioned,
}

/// An in-memory, forward-only row source.
#[derive(Clone, Debug)]
pub struct VecSource {
    names: Vec<String>,
    rows: Vec<Vec<Value>>,
    /// Rows consumed so far; the current row is `consumed - 1`.
    consumed: usize,
}

impl VecSource {
    /// Every row must hold one value per name, in name order.
    pub fn new<S: Into<String>>(
        names: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            rows,
            consumed: 0,
        }
    }
}

impl ForwardOnlySource for VecSource {
    type Error = VecSourceError;

    fn field_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn advance(&mut self) -> Result<bool, Self::Error> {
        if self.consumed <= self.rows.len() {
            self.consumed += 1;
        }
        Ok(self.consumed <= self.rows.len())
    }

    fn field_value(&self, name: &str) -> Result<Value, Self::Error> {
        let row = self
            .consumed
            .checked_sub(1)
            .and_then(|idx| self.rows.get(idx))
            .ok_or(VecSourceError::NotPositioned)?;
        let col = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| VecSourceError::UnknownField(name.to_owned()))?;
        Ok(row.get(col).cloned().unwrap_or_default())
    }
}
