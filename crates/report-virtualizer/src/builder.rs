#![forbid(unsafe_code)]

//! Single-pass column builder: records values once, narrows the set of encodings that still
//! fit, and materializes the cheapest survivor on freeze.

use crate::bitmap::NullBitmap;
use crate::error::{EncodingOverflow, VirtualizerError, VirtualizerResult};
use crate::options::CacheOptions;
use crate::packed::{PackedCodes, PackedInts};
use crate::store::{AffineStore, ColumnStore, DictionaryStore};
use crate::value::{Value, ValueKind};
use std::collections::HashMap;

#[derive(Clone, Debug)]
enum ConstantCandidate {
    Eliminated,
    Open(Option<Value>),
}

#[derive(Clone, Copy, Debug)]
enum AffineCandidate {
    Eliminated,
    Empty,
    /// Every non-null value so far equals `offset`.
    Seeded { kind: ValueKind, offset: i64 },
    Fitted {
        kind: ValueKind,
        offset: i64,
        factor: i64,
    },
}

#[derive(Clone, Debug, Default)]
struct DictionaryCandidate {
    table: Vec<Value>,
    codes: HashMap<Value, u32>,
}

/// `raw` such that `raw * factor + offset == v`, if one exists.
fn raw_for(offset: i64, factor: i64, v: i64) -> Result<Option<i64>, EncodingOverflow> {
    let diff = v as i128 - offset as i128;
    let factor = factor as i128;
    if diff % factor != 0 {
        return Ok(None);
    }
    i64::try_from(diff / factor)
        .map(Some)
        .map_err(|_| EncodingOverflow)
}

impl AffineCandidate {
    fn admit(self, value: &Value) -> Result<Self, EncodingOverflow> {
        let (Some(kind), Some(v)) = (value.kind(), value.as_ordinal()) else {
            return Ok(Self::Eliminated);
        };

        Ok(match self {
            Self::Eliminated => Self::Eliminated,
            Self::Empty => Self::Seeded { kind, offset: v },
            Self::Seeded { kind: k, .. } | Self::Fitted { kind: k, .. } if k != kind => {
                Self::Eliminated
            }
            Self::Seeded { offset, .. } if v == offset => self,
            Self::Seeded { kind, offset } => {
                let factor =
                    i64::try_from(v as i128 - offset as i128).map_err(|_| EncodingOverflow)?;
                Self::Fitted {
                    kind,
                    offset,
                    factor,
                }
            }
            Self::Fitted { offset, factor, .. } => match raw_for(offset, factor, v)? {
                Some(_) => self,
                None => Self::Eliminated,
            },
        })
    }

    fn is_open(self) -> bool {
        !matches!(self, Self::Eliminated)
    }
}

/// Accumulates one column during the recording pass.
///
/// `Open -> Frozen` is one-way: once [`ColumnBuilder::freeze`] has run, further appends fail
/// with [`VirtualizerError::BuilderFrozen`].
#[derive(Clone, Debug)]
pub struct ColumnBuilder {
    name: String,
    options: CacheOptions,
    frozen: bool,
    values: Vec<Value>,
    nulls: NullBitmap,
    constant: ConstantCandidate,
    affine: AffineCandidate,
    dictionary: Option<DictionaryCandidate>,
}

impl ColumnBuilder {
    pub fn new(name: impl Into<String>, options: CacheOptions) -> Self {
        Self {
            name: name.into(),
            options,
            frozen: false,
            values: Vec::new(),
            nulls: NullBitmap::new(),
            constant: ConstantCandidate::Open(None),
            affine: if options.affine {
                AffineCandidate::Empty
            } else {
                AffineCandidate::Eliminated
            },
            dictionary: Some(DictionaryCandidate::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn append(&mut self, value: Value) -> VirtualizerResult<()> {
        if self.frozen {
            return Err(VirtualizerError::BuilderFrozen);
        }

        let is_null = value.is_null();
        self.nulls.push(is_null);
        if !is_null {
            self.test_candidates(&value);
        }
        self.values.push(value);
        Ok(())
    }

    fn test_candidates(&mut self, value: &Value) {
        let second_value = match &mut self.constant {
            ConstantCandidate::Open(seen @ None) => {
                *seen = Some(value.clone());
                false
            }
            ConstantCandidate::Open(Some(first)) => *first != *value,
            ConstantCandidate::Eliminated => false,
        };
        if second_value {
            log::trace!("column {}: constant candidate eliminated", self.name);
            self.constant = ConstantCandidate::Eliminated;
        }

        if self.affine.is_open() {
            self.affine = match self.affine.admit(value) {
                Ok(next) => next,
                Err(EncodingOverflow) => AffineCandidate::Eliminated,
            };
            if !self.affine.is_open() {
                log::trace!("column {}: affine candidate eliminated", self.name);
            }
        }

        if let Some(dict) = &mut self.dictionary {
            if !dict.codes.contains_key(value) {
                let code = dict.table.len() as u32;
                dict.table.push(value.clone());
                dict.codes.insert(value.clone(), code);
            }
            // Only the entry cap is checked while recording: the distinct count only grows, so
            // the outcome does not depend on row order. The ratio test waits for freeze.
            if dict.table.len() > self.options.dictionary_max_entries {
                log::trace!(
                    "column {}: dictionary candidate eliminated at {} distinct values",
                    self.name,
                    dict.table.len()
                );
                self.dictionary = None;
            }
        }
    }

    /// Materialize the cheapest surviving encoding (`Constant > Affine > Dictionary > Raw`),
    /// wrapped in a null overlay when the column mixes nulls and values.
    pub fn freeze(&mut self) -> VirtualizerResult<ColumnStore> {
        if self.frozen {
            return Err(VirtualizerError::BuilderFrozen);
        }
        self.frozen = true;

        let values = std::mem::take(&mut self.values);
        let nulls = std::mem::take(&mut self.nulls);
        let constant = std::mem::replace(&mut self.constant, ConstantCandidate::Eliminated);
        let affine = std::mem::replace(&mut self.affine, AffineCandidate::Eliminated);
        let dictionary = self.dictionary.take();
        let rows = values.len();

        if rows == 0 {
            return Ok(ColumnStore::Raw(values));
        }
        if nulls.null_count() == rows {
            log::debug!("column {}: all {rows} rows null, frozen as constant", self.name);
            return Ok(ColumnStore::Constant {
                value: Value::Null,
                rows,
            });
        }

        let store = if let ConstantCandidate::Open(Some(value)) = constant {
            ColumnStore::Constant { value, rows }
        } else if let Some(affine) = materialize_affine(affine, &values) {
            ColumnStore::Affine(affine)
        } else if let Some(dict) =
            dictionary.filter(|d| self.options.dictionary_fits(d.table.len(), rows))
        {
            let codes: Vec<u32> = values
                .iter()
                .map(|v| dict.codes.get(v).copied().unwrap_or(0))
                .collect();
            ColumnStore::Dictionary(DictionaryStore {
                codes: PackedCodes::pack(&codes, dict.table.len()),
                table: dict.table,
            })
        } else {
            ColumnStore::Raw(values)
        };

        log::debug!(
            "column {}: frozen as {:?} over {rows} rows ({} nulls)",
            self.name,
            store.encoding(),
            nulls.null_count()
        );

        if nulls.null_count() > 0 {
            return Ok(ColumnStore::Nullable {
                nulls,
                inner: Box::new(store),
            });
        }
        Ok(store)
    }
}

fn materialize_affine(candidate: AffineCandidate, values: &[Value]) -> Option<AffineStore> {
    let (kind, offset, factor) = match candidate {
        AffineCandidate::Fitted {
            kind,
            offset,
            factor,
        } => (kind, offset, factor),
        // A column still `Seeded` holds a single distinct value and freezes as a constant.
        AffineCandidate::Seeded { .. } | AffineCandidate::Empty | AffineCandidate::Eliminated => {
            return None
        }
    };

    let mut raw = Vec::with_capacity(values.len());
    for value in values {
        let r = match value.as_ordinal() {
            // Every non-null value was admitted against this fit while recording.
            Some(v) => raw_for(offset, factor, v).ok().flatten()?,
            None => 0,
        };
        raw.push(r);
    }

    Some(AffineStore {
        kind,
        factor,
        offset,
        raw: PackedInts::pack(&raw),
    })
}
