#![forbid(unsafe_code)]

use crate::error::{VirtualizerError, VirtualizerResult};
use crate::store::ColumnStore;
use crate::value::Value;

/// A forward cursor over one column's decoded values.
///
/// A fresh iterator sits before the first value: call [`ValueIterator::advance`] before the
/// first [`ValueIterator::get`].
pub trait ValueIterator {
    /// The value at the current position, without moving.
    fn get(&self) -> VirtualizerResult<Value>;

    /// Move one position forward; returns whether a value is now available.
    fn advance(&mut self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Position {
    BeforeFirst,
    At(usize),
    Exhausted,
}

/// [`ValueIterator`] over a frozen [`ColumnStore`]. Any number may be live per store.
#[derive(Clone, Debug)]
pub struct ColumnIter<'a> {
    store: &'a ColumnStore,
    len: usize,
    pos: Position,
}

impl<'a> ColumnIter<'a> {
    pub(crate) fn new(store: &'a ColumnStore) -> Self {
        Self {
            store,
            len: store.size(),
            pos: Position::BeforeFirst,
        }
    }
}

impl ValueIterator for ColumnIter<'_> {
    fn get(&self) -> VirtualizerResult<Value> {
        match self.pos {
            Position::At(idx) => Ok(self.store.value_at(idx)),
            Position::BeforeFirst | Position::Exhausted => {
                Err(VirtualizerError::IteratorNotPositioned)
            }
        }
    }

    fn advance(&mut self) -> bool {
        let next = match self.pos {
            Position::BeforeFirst => 0,
            Position::At(idx) => idx + 1,
            Position::Exhausted => return false,
        };
        if next < self.len {
            self.pos = Position::At(next);
            true
        } else {
            self.pos = Position::Exhausted;
            false
        }
    }
}

impl Iterator for ColumnIter<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if self.advance() {
            self.get().ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_requires_position() {
        let store = ColumnStore::Raw(vec![Value::Integer(7)]);
        let mut it = store.iterator();
        assert!(matches!(
            it.get(),
            Err(VirtualizerError::IteratorNotPositioned)
        ));
        assert!(it.advance());
        assert_eq!(it.get().unwrap(), Value::Integer(7));
        assert!(!it.advance());
        assert!(matches!(
            it.get(),
            Err(VirtualizerError::IteratorNotPositioned)
        ));
        assert!(!it.advance());
    }

    #[test]
    fn iterators_are_independent() {
        let store = ColumnStore::Constant {
            value: Value::Boolean(true),
            rows: 3,
        };
        let mut a = store.iterator();
        a.advance();
        a.advance();
        let b: Vec<Value> = store.iterator().collect();
        assert_eq!(b.len(), 3);
        assert_eq!(a.get().unwrap(), Value::Boolean(true));
    }
}
