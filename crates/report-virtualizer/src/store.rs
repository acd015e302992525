#![forbid(unsafe_code)]

//! Frozen, read-only column encodings.

use crate::bitmap::NullBitmap;
use crate::iter::ColumnIter;
use crate::packed::{PackedCodes, PackedInts};
use crate::value::{Value, ValueKind};

/// The physical encoding a column froze into (ignoring the null overlay).
///
/// The discriminants double as the persisted variant tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnEncoding {
    Raw = 0,
    Affine = 1,
    Dictionary = 2,
    Constant = 3,
}

impl ColumnEncoding {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Raw),
            1 => Some(Self::Affine),
            2 => Some(Self::Dictionary),
            3 => Some(Self::Constant),
            _ => None,
        }
    }
}

/// `value[i] = raw[i] * factor + offset`, in the column's ordinal domain.
#[derive(Clone, Debug, PartialEq)]
pub struct AffineStore {
    pub(crate) kind: ValueKind,
    pub(crate) factor: i64,
    pub(crate) offset: i64,
    pub(crate) raw: PackedInts,
}

impl AffineStore {
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn factor(&self) -> i64 {
        self.factor
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn raw(&self) -> &PackedInts {
        &self.raw
    }

    fn decode(&self, index: usize) -> i64 {
        // Exact modulo 2^64; the builder only accepts fits whose true result is in range, so
        // the wrapped result equals the original value.
        self.raw
            .get(index)
            .wrapping_mul(self.factor)
            .wrapping_add(self.offset)
    }
}

/// `value[i] = table[codes[i]]`.
#[derive(Clone, Debug, PartialEq)]
pub struct DictionaryStore {
    pub(crate) table: Vec<Value>,
    pub(crate) codes: PackedCodes,
}

impl DictionaryStore {
    pub fn table(&self) -> &[Value] {
        &self.table
    }

    pub fn codes(&self) -> &PackedCodes {
        &self.codes
    }
}

/// One column's recorded values, immutable after freeze.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnStore {
    Raw(Vec<Value>),
    Affine(AffineStore),
    Dictionary(DictionaryStore),
    Constant { value: Value, rows: usize },
    /// Null flags over a store that still spans every row; positions flagged null hold an
    /// arbitrary placeholder in `inner`.
    Nullable {
        nulls: NullBitmap,
        inner: Box<ColumnStore>,
    },
}

impl ColumnStore {
    pub fn size(&self) -> usize {
        match self {
            ColumnStore::Raw(values) => values.len(),
            ColumnStore::Affine(a) => a.raw.len(),
            ColumnStore::Dictionary(d) => d.codes.len(),
            ColumnStore::Constant { rows, .. } => *rows,
            ColumnStore::Nullable { nulls, .. } => nulls.len(),
        }
    }

    /// A fresh iterator positioned before the first row.
    pub fn iterator(&self) -> ColumnIter<'_> {
        ColumnIter::new(self)
    }

    pub fn encoding(&self) -> ColumnEncoding {
        match self {
            ColumnStore::Raw(_) => ColumnEncoding::Raw,
            ColumnStore::Affine(_) => ColumnEncoding::Affine,
            ColumnStore::Dictionary(_) => ColumnEncoding::Dictionary,
            ColumnStore::Constant { .. } => ColumnEncoding::Constant,
            ColumnStore::Nullable { inner, .. } => inner.encoding(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, ColumnStore::Nullable { .. })
    }

    pub fn null_count(&self) -> usize {
        match self {
            ColumnStore::Nullable { nulls, .. } => nulls.null_count(),
            ColumnStore::Constant {
                value: Value::Null,
                rows,
            } => *rows,
            ColumnStore::Raw(values) => values.iter().filter(|v| v.is_null()).count(),
            _ => 0,
        }
    }

    /// Decoded value at `index`. Callers keep `index < self.size()`.
    pub(crate) fn value_at(&self, index: usize) -> Value {
        match self {
            ColumnStore::Raw(values) => values[index].clone(),
            ColumnStore::Affine(a) => a.kind.from_ordinal(a.decode(index)),
            ColumnStore::Dictionary(d) => d.table[d.codes.get(index)].clone(),
            ColumnStore::Constant { value, .. } => value.clone(),
            ColumnStore::Nullable { nulls, inner } => {
                if nulls.is_null(index) {
                    Value::Null
                } else {
                    inner.value_at(index)
                }
            }
        }
    }

    pub fn heap_size_bytes(&self) -> usize {
        let value_size = std::mem::size_of::<Value>();
        match self {
            ColumnStore::Raw(values) => values
                .iter()
                .map(|v| value_size + v.heap_size_bytes())
                .sum(),
            ColumnStore::Affine(a) => a.raw.heap_size_bytes(),
            ColumnStore::Dictionary(d) => {
                let table: usize = d
                    .table
                    .iter()
                    .map(|v| value_size + v.heap_size_bytes())
                    .sum();
                table + d.codes.heap_size_bytes()
            }
            ColumnStore::Constant { value, .. } => value.heap_size_bytes(),
            ColumnStore::Nullable { nulls, inner } => {
                nulls.heap_size_bytes() + inner.heap_size_bytes()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affine_decodes_through_wrapping_intermediate() {
        // (i64::MAX - i64::MIN) / 3 fits in i64 but times 3 does not.
        let raw = (i64::MAX as i128 - i64::MIN as i128) / 3;
        let store = ColumnStore::Affine(AffineStore {
            kind: ValueKind::Integer,
            factor: 3,
            offset: i64::MIN,
            raw: PackedInts::pack(&[0, raw as i64]),
        });
        assert_eq!(store.value_at(0), Value::Integer(i64::MIN));
        assert_eq!(store.value_at(1), Value::Integer(i64::MAX));
    }

    #[test]
    fn nullable_masks_placeholder() {
        let mut nulls = NullBitmap::new();
        nulls.push(true);
        nulls.push(false);
        let store = ColumnStore::Nullable {
            nulls,
            inner: Box::new(ColumnStore::Constant {
                value: Value::string("x"),
                rows: 2,
            }),
        };
        assert_eq!(store.size(), 2);
        assert_eq!(store.encoding(), ColumnEncoding::Constant);
        assert_eq!(store.null_count(), 1);
        assert_eq!(store.value_at(0), Value::Null);
        assert_eq!(store.value_at(1), Value::string("x"));
    }
}
