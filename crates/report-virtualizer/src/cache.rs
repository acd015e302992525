#![forbid(unsafe_code)]

use crate::builder::ColumnBuilder;
use crate::cursor::ReplayCursor;
use crate::error::{VirtualizerError, VirtualizerResult};
use crate::options::CacheOptions;
use crate::stats::ColumnStats;
use crate::store::ColumnStore;
use crate::value::Value;
use std::collections::HashMap;

#[derive(Clone, Debug)]
enum CacheState {
    Recording(Vec<ColumnBuilder>),
    Closed {
        columns: Vec<ColumnStore>,
        stats: Vec<ColumnStats>,
    },
}

/// Records one forward pass over a data source and replays it any number of times.
///
/// A cache is opened with its column names, fed one row at a time by a single recording
/// driver, then closed. Closing freezes every column into its cheapest encoding; from then on
/// the cache is immutable and hands out independent [`ReplayCursor`]s.
#[derive(Clone, Debug)]
pub struct ColumnCache {
    names: Vec<String>,
    index: HashMap<String, usize>,
    rows: usize,
    state: CacheState,
}

impl ColumnCache {
    pub fn open<I, S>(column_names: I, options: CacheOptions) -> VirtualizerResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = column_names.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            if index.insert(name.clone(), idx).is_some() {
                return Err(VirtualizerError::DuplicateColumn(name.clone()));
            }
        }

        let builders = names
            .iter()
            .map(|name| ColumnBuilder::new(name.as_str(), options))
            .collect();

        Ok(Self {
            names,
            index,
            rows: 0,
            state: CacheState::Recording(builders),
        })
    }

    pub(crate) fn from_frozen(
        names: Vec<String>,
        columns: Vec<ColumnStore>,
        rows: usize,
    ) -> VirtualizerResult<Self> {
        let mut index = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            if index.insert(name.clone(), idx).is_some() {
                return Err(VirtualizerError::DuplicateColumn(name.clone()));
            }
        }
        let stats = columns.iter().map(ColumnStats::collect).collect();
        Ok(Self {
            names,
            index,
            rows,
            state: CacheState::Closed { columns, stats },
        })
    }

    /// Record one row given as `(column, value)` pairs, in any order.
    ///
    /// The row is validated as a whole before any column sees it: on error nothing is
    /// recorded and the row count is unchanged.
    pub fn record_row<I, K>(&mut self, row: I) -> VirtualizerResult<()>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let CacheState::Recording(builders) = &mut self.state else {
            return Err(VirtualizerError::CacheClosed);
        };

        let mut slots: Vec<Option<Value>> = vec![None; builders.len()];
        for (name, value) in row {
            let name = name.as_ref();
            let idx = *self
                .index
                .get(name)
                .ok_or_else(|| VirtualizerError::UnknownColumn(name.to_owned()))?;
            if slots[idx].replace(value).is_some() {
                return Err(VirtualizerError::DuplicateColumn(name.to_owned()));
            }
        }

        if let Some(missing) = slots.iter().position(Option::is_none) {
            return Err(VirtualizerError::MissingColumn {
                column: self.names[missing].clone(),
                row: self.rows,
            });
        }

        for (builder, value) in builders.iter_mut().zip(slots) {
            builder.append(value.unwrap_or_default())?;
        }
        self.rows += 1;
        Ok(())
    }

    /// Record one row given positionally, in column order.
    pub fn record_values(&mut self, row: &[Value]) -> VirtualizerResult<()> {
        let CacheState::Recording(builders) = &mut self.state else {
            return Err(VirtualizerError::CacheClosed);
        };
        if row.len() != builders.len() {
            return Err(VirtualizerError::RowLengthMismatch {
                expected: builders.len(),
                actual: row.len(),
            });
        }

        for (builder, value) in builders.iter_mut().zip(row) {
            builder.append(value.clone())?;
        }
        self.rows += 1;
        Ok(())
    }

    /// Freeze every column. Recording is over once this returns.
    pub fn close(&mut self) -> VirtualizerResult<()> {
        let CacheState::Recording(builders) = &mut self.state else {
            return Err(VirtualizerError::CacheClosed);
        };

        let mut columns = Vec::with_capacity(builders.len());
        for builder in builders.iter_mut() {
            let store = builder.freeze()?;
            debug_assert_eq!(store.size(), self.rows, "ragged column {}", builder.name());
            columns.push(store);
        }
        let stats: Vec<ColumnStats> = columns.iter().map(ColumnStats::collect).collect();

        log::debug!(
            "closed cache: {} columns x {} rows, {} heap bytes",
            columns.len(),
            self.rows,
            stats.iter().map(|s| s.heap_size_bytes).sum::<usize>()
        );

        self.state = CacheState::Closed { columns, stats };
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, CacheState::Closed { .. })
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.names.len()
    }

    /// Column names in the order they were opened.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn frozen_columns(&self) -> VirtualizerResult<&[ColumnStore]> {
        match &self.state {
            CacheState::Closed { columns, .. } => Ok(columns),
            CacheState::Recording(_) => Err(VirtualizerError::CacheNotClosed),
        }
    }

    pub fn column(&self, name: &str) -> VirtualizerResult<&ColumnStore> {
        let columns = self.frozen_columns()?;
        let idx = self
            .column_index(name)
            .ok_or_else(|| VirtualizerError::UnknownColumn(name.to_owned()))?;
        Ok(&columns[idx])
    }

    pub fn stats(&self, name: &str) -> VirtualizerResult<&ColumnStats> {
        let CacheState::Closed { stats, .. } = &self.state else {
            return Err(VirtualizerError::CacheNotClosed);
        };
        let idx = self
            .column_index(name)
            .ok_or_else(|| VirtualizerError::UnknownColumn(name.to_owned()))?;
        Ok(&stats[idx])
    }

    /// Heap bytes held by the frozen columns (zero while recording).
    pub fn heap_size_bytes(&self) -> usize {
        match &self.state {
            CacheState::Closed { stats, .. } => stats.iter().map(|s| s.heap_size_bytes).sum(),
            CacheState::Recording(_) => 0,
        }
    }

    /// A new cursor positioned before the first row.
    pub fn new_cursor(&self) -> VirtualizerResult<ReplayCursor<'_>> {
        let columns = self.frozen_columns()?;
        Ok(ReplayCursor::new(self, columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ColumnEncoding;
    use pretty_assertions::assert_eq;

    fn open(names: &[&str]) -> ColumnCache {
        ColumnCache::open(names.iter().copied(), CacheOptions::default()).unwrap()
    }

    #[test]
    fn duplicate_names_rejected_on_open() {
        let err = ColumnCache::open(["a", "b", "a"], CacheOptions::default()).unwrap_err();
        assert!(matches!(err, VirtualizerError::DuplicateColumn(name) if name == "a"));
    }

    #[test]
    fn unknown_column_leaves_state_untouched() {
        let mut cache = open(&["id"]);
        cache.record_row([("id", Value::Integer(1))]).unwrap();
        let err = cache
            .record_row([("id", Value::Integer(2)), ("bogus", Value::Integer(3))])
            .unwrap_err();
        assert!(matches!(err, VirtualizerError::UnknownColumn(name) if name == "bogus"));
        assert_eq!(cache.row_count(), 1);

        cache.close().unwrap();
        let values: Vec<Value> = cache.column("id").unwrap().iterator().collect();
        assert_eq!(values, vec![Value::Integer(1)]);
    }

    #[test]
    fn missing_and_duplicate_fields_rejected() {
        let mut cache = open(&["a", "b"]);
        let err = cache.record_row([("a", Value::Null)]).unwrap_err();
        assert!(
            matches!(err, VirtualizerError::MissingColumn { column, row: 0 } if column == "b")
        );
        let err = cache
            .record_row([("a", Value::Null), ("a", Value::Null), ("b", Value::Null)])
            .unwrap_err();
        assert!(matches!(err, VirtualizerError::DuplicateColumn(_)));
        assert_eq!(cache.row_count(), 0);
    }

    #[test]
    fn positional_rows_checked_for_length() {
        let mut cache = open(&["a", "b"]);
        let err = cache.record_values(&[Value::Integer(1)]).unwrap_err();
        assert!(matches!(
            err,
            VirtualizerError::RowLengthMismatch {
                expected: 2,
                actual: 1
            }
        ));
        cache
            .record_values(&[Value::Integer(1), Value::string("x")])
            .unwrap();
        assert_eq!(cache.row_count(), 1);
    }

    #[test]
    fn state_machine_misuse() {
        let mut cache = open(&["a"]);
        assert!(matches!(
            cache.new_cursor(),
            Err(VirtualizerError::CacheNotClosed)
        ));
        assert!(matches!(
            cache.column("a"),
            Err(VirtualizerError::CacheNotClosed)
        ));
        cache.close().unwrap();
        assert!(matches!(cache.close(), Err(VirtualizerError::CacheClosed)));
        assert!(matches!(
            cache.record_row([("a", Value::Null)]),
            Err(VirtualizerError::CacheClosed)
        ));
        assert!(matches!(
            cache.record_values(&[Value::Null]),
            Err(VirtualizerError::CacheClosed)
        ));
    }

    #[test]
    fn stats_reflect_chosen_encoding() {
        let mut cache = open(&["status", "id"]);
        for i in 0..3 {
            cache
                .record_row([("status", Value::from("OK")), ("id", Value::Integer(i))])
                .unwrap();
        }
        cache.close().unwrap();

        let status = cache.stats("status").unwrap();
        assert_eq!(status.encoding, ColumnEncoding::Constant);
        assert_eq!(status.distinct_count, Some(1));
        assert_eq!(status.row_count, 3);

        let id = cache.stats("id").unwrap();
        assert_eq!(id.encoding, ColumnEncoding::Affine);
        assert_eq!(id.distinct_count, None);
        assert!(cache.heap_size_bytes() >= id.heap_size_bytes);
    }

    #[test]
    fn closed_cache_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ColumnCache>();
        assert_send_sync::<ReplayCursor<'static>>();
    }
}
