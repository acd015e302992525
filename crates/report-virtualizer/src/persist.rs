#![forbid(unsafe_code)]

//! Binary layout for closed caches.
//!
//! All integers are little-endian.
//!
//! ```text
//! cache   := "RVC1" rows:u32 columns:u32 column*
//! column  := name:str tag:u8 has_nulls:u8 rows:u32 [bitmap: ceil(rows/8) bytes] payload
//! payload := Raw:        value{rows}
//!          | Affine:     kind:u8 factor:i64 offset:i64 raw:i64{rows}
//!          | Dictionary: entries:u32 value{entries} code{rows}   (code is 1, 2 or 4 bytes)
//!          | Constant:   value
//! value   := 0 | 1 u8 | 2 i64 | 3 f64 | 4 str | 5 i64
//! str     := len:u32 utf8
//! ```

use crate::bitmap::NullBitmap;
use crate::cache::ColumnCache;
use crate::error::{VirtualizerError, VirtualizerResult};
use crate::packed::{PackedCodes, PackedInts};
use crate::store::{AffineStore, ColumnEncoding, ColumnStore, DictionaryStore};
use crate::value::{Value, ValueKind};
use std::io::{Read, Write};
use std::sync::Arc;

const MAGIC: &[u8; 4] = b"RVC1";

const VALUE_NULL: u8 = 0;
const VALUE_BOOLEAN: u8 = 1;
const VALUE_INTEGER: u8 = 2;
const VALUE_NUMBER: u8 = 3;
const VALUE_STRING: u8 = 4;
const VALUE_DATETIME: u8 = 5;

const AFFINE_INTEGER: u8 = 0;
const AFFINE_DATETIME: u8 = 1;

fn corrupt(msg: impl Into<String>) -> VirtualizerError {
    VirtualizerError::Corrupt(msg.into())
}

fn len_u32(len: usize, what: &str) -> VirtualizerResult<u32> {
    u32::try_from(len).map_err(|_| corrupt(format!("{what} {len} exceeds u32")))
}

impl ColumnCache {
    /// Serialize a closed cache.
    pub fn write_to<W: Write>(&self, writer: W) -> VirtualizerResult<()> {
        let columns = self.frozen_columns()?;
        let mut w = Writer { inner: writer };

        w.bytes(MAGIC)?;
        w.u32(len_u32(self.row_count(), "row count")?)?;
        w.u32(len_u32(columns.len(), "column count")?)?;
        for (name, store) in self.column_names().iter().zip(columns) {
            w.str(name)?;
            w.column(store)?;
        }

        log::debug!(
            "wrote cache: {} columns x {} rows",
            columns.len(),
            self.row_count()
        );
        Ok(())
    }

    /// Load a cache written by [`ColumnCache::write_to`]. The result is already closed.
    pub fn read_from<R: Read>(reader: R) -> VirtualizerResult<Self> {
        let mut r = Reader { inner: reader };

        let mut magic = [0u8; 4];
        r.exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(corrupt("bad magic"));
        }

        let rows = r.u32()? as usize;
        let count = r.u32()? as usize;
        let mut names = Vec::new();
        let mut columns = Vec::new();
        for _ in 0..count {
            let name = r.str()?;
            let store = r.column()?;
            if store.size() != rows {
                return Err(corrupt(format!(
                    "column {name} has {} rows, expected {rows}",
                    store.size()
                )));
            }
            names.push(name);
            columns.push(store);
        }

        log::debug!("read cache: {count} columns x {rows} rows");
        ColumnCache::from_frozen(names, columns, rows)
    }
}

struct Writer<W> {
    inner: W,
}

impl<W: Write> Writer<W> {
    fn bytes(&mut self, b: &[u8]) -> VirtualizerResult<()> {
        self.inner.write_all(b)?;
        Ok(())
    }

    fn u8(&mut self, v: u8) -> VirtualizerResult<()> {
        self.bytes(&[v])
    }

    fn u32(&mut self, v: u32) -> VirtualizerResult<()> {
        self.bytes(&v.to_le_bytes())
    }

    fn i64(&mut self, v: i64) -> VirtualizerResult<()> {
        self.bytes(&v.to_le_bytes())
    }

    fn str(&mut self, s: &str) -> VirtualizerResult<()> {
        self.u32(len_u32(s.len(), "string length")?)?;
        self.bytes(s.as_bytes())
    }

    fn value(&mut self, value: &Value) -> VirtualizerResult<()> {
        match value {
            Value::Null => self.u8(VALUE_NULL),
            Value::Boolean(v) => {
                self.u8(VALUE_BOOLEAN)?;
                self.u8(*v as u8)
            }
            Value::Integer(v) => {
                self.u8(VALUE_INTEGER)?;
                self.i64(*v)
            }
            Value::Number(v) => {
                self.u8(VALUE_NUMBER)?;
                self.bytes(&v.to_bits().to_le_bytes())
            }
            Value::String(s) => {
                self.u8(VALUE_STRING)?;
                self.str(s)
            }
            Value::DateTime(v) => {
                self.u8(VALUE_DATETIME)?;
                self.i64(*v)
            }
        }
    }

    fn column(&mut self, store: &ColumnStore) -> VirtualizerResult<()> {
        let (nulls, inner) = match store {
            ColumnStore::Nullable { nulls, inner } => (Some(nulls), inner.as_ref()),
            other => (None, other),
        };

        self.u8(inner.encoding().tag())?;
        self.u8(nulls.is_some() as u8)?;
        self.u32(len_u32(store.size(), "row count")?)?;
        if let Some(nulls) = nulls {
            self.bytes(&nulls.to_bytes())?;
        }

        match inner {
            ColumnStore::Raw(values) => {
                for v in values {
                    self.value(v)?;
                }
            }
            ColumnStore::Affine(a) => {
                self.u8(match a.kind {
                    ValueKind::DateTime => AFFINE_DATETIME,
                    _ => AFFINE_INTEGER,
                })?;
                self.i64(a.factor)?;
                self.i64(a.offset)?;
                for i in 0..a.raw.len() {
                    self.i64(a.raw.get(i))?;
                }
            }
            ColumnStore::Dictionary(d) => {
                self.u32(len_u32(d.table.len(), "dictionary size")?)?;
                for v in &d.table {
                    self.value(v)?;
                }
                let width = PackedCodes::width_for(d.table.len());
                for i in 0..d.codes.len() {
                    let code = d.codes.get(i) as u32;
                    self.bytes(&code.to_le_bytes()[..width])?;
                }
            }
            ColumnStore::Constant { value, .. } => self.value(value)?,
            ColumnStore::Nullable { .. } => return Err(corrupt("nested null overlay")),
        }
        Ok(())
    }
}

struct Reader<R> {
    inner: R,
}

impl<R: Read> Reader<R> {
    fn exact(&mut self, buf: &mut [u8]) -> VirtualizerResult<()> {
        self.inner.read_exact(buf).map_err(|err| {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                corrupt("truncated input")
            } else {
                VirtualizerError::Io(err)
            }
        })
    }

    /// Read `len` bytes without trusting `len` for the up-front allocation.
    fn vec(&mut self, len: usize) -> VirtualizerResult<Vec<u8>> {
        let mut buf = Vec::new();
        (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(corrupt("truncated input"));
        }
        Ok(buf)
    }

    fn u8(&mut self) -> VirtualizerResult<u8> {
        let mut b = [0u8; 1];
        self.exact(&mut b)?;
        Ok(b[0])
    }

    fn u32(&mut self) -> VirtualizerResult<u32> {
        let mut b = [0u8; 4];
        self.exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    fn i64(&mut self) -> VirtualizerResult<i64> {
        let mut b = [0u8; 8];
        self.exact(&mut b)?;
        Ok(i64::from_le_bytes(b))
    }

    fn str(&mut self) -> VirtualizerResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.vec(len)?;
        String::from_utf8(bytes).map_err(|_| corrupt("invalid UTF-8"))
    }

    fn value(&mut self) -> VirtualizerResult<Value> {
        Ok(match self.u8()? {
            VALUE_NULL => Value::Null,
            VALUE_BOOLEAN => match self.u8()? {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                other => return Err(corrupt(format!("invalid boolean byte {other}"))),
            },
            VALUE_INTEGER => Value::Integer(self.i64()?),
            VALUE_NUMBER => Value::Number(f64::from_bits(self.i64()? as u64)),
            VALUE_STRING => Value::String(Arc::from(self.str()?)),
            VALUE_DATETIME => Value::DateTime(self.i64()?),
            other => return Err(corrupt(format!("unknown value tag {other}"))),
        })
    }

    fn column(&mut self) -> VirtualizerResult<ColumnStore> {
        let tag = self.u8()?;
        let encoding =
            ColumnEncoding::from_tag(tag).ok_or_else(|| corrupt(format!("unknown variant {tag}")))?;
        let has_nulls = match self.u8()? {
            0 => false,
            1 => true,
            other => return Err(corrupt(format!("invalid null flag {other}"))),
        };
        let rows = self.u32()? as usize;

        let nulls = if has_nulls {
            let bytes = self.vec((rows + 7) / 8)?;
            let bitmap = NullBitmap::from_bytes(&bytes, rows)
                .ok_or_else(|| corrupt("null bitmap length mismatch"))?;
            Some(bitmap)
        } else {
            None
        };

        let store = match encoding {
            ColumnEncoding::Raw => {
                let mut values = Vec::new();
                for _ in 0..rows {
                    values.push(self.value()?);
                }
                ColumnStore::Raw(values)
            }
            ColumnEncoding::Affine => {
                let kind = match self.u8()? {
                    AFFINE_INTEGER => ValueKind::Integer,
                    AFFINE_DATETIME => ValueKind::DateTime,
                    other => return Err(corrupt(format!("invalid affine kind {other}"))),
                };
                let factor = self.i64()?;
                let offset = self.i64()?;
                let mut raw = Vec::new();
                for _ in 0..rows {
                    raw.push(self.i64()?);
                }
                ColumnStore::Affine(AffineStore {
                    kind,
                    factor,
                    offset,
                    raw: PackedInts::pack(&raw),
                })
            }
            ColumnEncoding::Dictionary => {
                let entries = self.u32()? as usize;
                let mut table = Vec::new();
                for _ in 0..entries {
                    table.push(self.value()?);
                }
                let width = PackedCodes::width_for(entries);
                let mut codes = Vec::new();
                for _ in 0..rows {
                    let mut b = [0u8; 4];
                    self.exact(&mut b[..width])?;
                    let code = u32::from_le_bytes(b);
                    if code as usize >= entries {
                        return Err(corrupt(format!(
                            "dictionary code {code} out of range for {entries} entries"
                        )));
                    }
                    codes.push(code);
                }
                ColumnStore::Dictionary(DictionaryStore {
                    codes: PackedCodes::pack(&codes, entries),
                    table,
                })
            }
            ColumnEncoding::Constant => ColumnStore::Constant {
                value: self.value()?,
                rows,
            },
        };

        Ok(match nulls {
            Some(nulls) => ColumnStore::Nullable {
                nulls,
                inner: Box::new(store),
            },
            None => store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::RewindableDataset;
    use crate::options::CacheOptions;
    use pretty_assertions::assert_eq;

    fn record(name: &str, options: CacheOptions, values: &[Value]) -> ColumnCache {
        let mut cache = ColumnCache::open([name], options).unwrap();
        for v in values {
            cache.record_values(std::slice::from_ref(v)).unwrap();
        }
        cache.close().unwrap();
        cache
    }

    fn reload(cache: &ColumnCache) -> (Vec<u8>, ColumnCache) {
        let mut buf = Vec::new();
        cache.write_to(&mut buf).unwrap();
        let restored = ColumnCache::read_from(buf.as_slice()).unwrap();
        (buf, restored)
    }

    fn replay(cache: &ColumnCache, name: &str) -> Vec<Value> {
        let mut cursor = cache.new_cursor().unwrap();
        let mut out = Vec::new();
        while cursor.next() {
            out.push(cursor.get_value(name).unwrap());
        }
        out
    }

    /// Bytes before the first column's bitmap or payload for a single-column cache.
    fn column_header_len(name: &str) -> usize {
        4 + 4 + 4 + 4 + name.len() + 1 + 1 + 4
    }

    #[test]
    fn affine_column_layout() {
        let mut cache = ColumnCache::open(["id"], CacheOptions::default()).unwrap();
        for v in [100, 102, 104, 106] {
            cache.record_values(&[Value::Integer(v)]).unwrap();
        }
        cache.close().unwrap();

        let mut buf = Vec::new();
        cache.write_to(&mut buf).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(b"RVC1");
        expected.extend_from_slice(&4u32.to_le_bytes());
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(b"id");
        expected.extend_from_slice(&[1, 0]);
        expected.extend_from_slice(&4u32.to_le_bytes());
        expected.push(AFFINE_INTEGER);
        expected.extend_from_slice(&2i64.to_le_bytes());
        expected.extend_from_slice(&100i64.to_le_bytes());
        for raw in 0i64..4 {
            expected.extend_from_slice(&raw.to_le_bytes());
        }
        assert_eq!(buf, expected);
    }

    #[test]
    fn null_bitmap_precedes_payload() {
        let mut cache = ColumnCache::open(["note"], CacheOptions::default()).unwrap();
        for v in [Value::Null, Value::from("a"), Value::Null, Value::from("b")] {
            cache.record_values(&[v]).unwrap();
        }
        cache.close().unwrap();

        let mut buf = Vec::new();
        cache.write_to(&mut buf).unwrap();
        // magic + rows + count + name(4 + 4 bytes) + tag + flag + rows
        let header = 4 + 4 + 4 + 8 + 1 + 1 + 4;
        assert_eq!(buf[header - 6], ColumnEncoding::Raw.tag());
        assert_eq!(buf[header - 5], 1);
        assert_eq!(buf[header], 0b0000_0101);
        assert_eq!(buf[header + 1], VALUE_NULL);

        let restored = ColumnCache::read_from(buf.as_slice()).unwrap();
        assert_eq!(restored.column("note").unwrap(), cache.column("note").unwrap());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            ColumnCache::read_from(&b"NOPE"[..]),
            Err(VirtualizerError::Corrupt(_))
        ));
        assert!(matches!(
            ColumnCache::read_from(&b"RVC1\x01\x00"[..]),
            Err(VirtualizerError::Corrupt(_))
        ));
    }

    #[test]
    fn write_requires_closed_cache() {
        let cache = ColumnCache::open(["a"], CacheOptions::default()).unwrap();
        assert!(matches!(
            cache.write_to(Vec::new()),
            Err(VirtualizerError::CacheNotClosed)
        ));
    }

    #[test]
    fn dictionary_codes_widen_to_two_bytes() {
        let no_affine = CacheOptions {
            affine: false,
            ..CacheOptions::default()
        };
        let values: Vec<Value> = (0..2000).map(|i| Value::Integer(i * 7 % 300)).collect();
        let cache = record("k", no_affine, &values);
        let ColumnStore::Dictionary(dict) = cache.column("k").unwrap() else {
            panic!("expected dictionary encoding");
        };
        assert_eq!(dict.table().len(), 300);

        let (buf, restored) = reload(&cache);
        let codes = column_header_len("k") + 4 + 300 * 9;
        assert_eq!(buf.len(), codes + 2000 * 2);
        // Row 0 holds 0 (code 0), row 1 holds 7 (code 1).
        assert_eq!(&buf[codes..codes + 4], &[0, 0, 1, 0]);

        assert_eq!(restored.column("k").unwrap(), cache.column("k").unwrap());
        assert_eq!(replay(&restored, "k"), values);
    }

    #[test]
    fn dictionary_codes_widen_to_four_bytes() {
        let options = CacheOptions {
            affine: false,
            dictionary_max_entries: 100_000,
            ..CacheOptions::default()
        };
        let rows = 150_000i64;
        let values: Vec<Value> = (0..rows)
            .map(|i| {
                if i % 15 == 0 {
                    Value::Null
                } else {
                    Value::Integer(i % 70_000)
                }
            })
            .collect();
        let cache = record("k", options, &values);
        let store = cache.column("k").unwrap();
        assert!(store.is_nullable());
        let ColumnStore::Nullable { inner, .. } = store else {
            unreachable!()
        };
        let ColumnStore::Dictionary(dict) = inner.as_ref() else {
            panic!("expected dictionary encoding, got {:?}", store.encoding());
        };
        let entries = dict.table().len();
        assert!(entries > 65_536);

        let (buf, restored) = reload(&cache);
        let rows = rows as usize;
        let codes = column_header_len("k") + (rows + 7) / 8 + 4 + entries * 9;
        assert_eq!(buf.len(), codes + rows * 4);
        // Row 0 is a null placeholder, rows 1 and 2 carry the first two table entries.
        assert_eq!(&buf[codes..codes + 12], &[0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]);

        assert_eq!(restored.column("k").unwrap(), store);
        assert_eq!(replay(&restored, "k"), values);
    }

    #[test]
    fn nullable_datetime_affine_keeps_its_kind() {
        let start = 1_700_000_000_000i64;
        let day = 86_400_000i64;
        let values: Vec<Value> = (0..40)
            .map(|i| {
                if i % 4 == 3 {
                    Value::Null
                } else {
                    Value::DateTime(start - i * day)
                }
            })
            .collect();
        let cache = record("ts", CacheOptions::default(), &values);
        let store = cache.column("ts").unwrap();
        assert!(store.is_nullable());
        assert_eq!(store.encoding(), ColumnEncoding::Affine);

        let (buf, restored) = reload(&cache);
        let bitmap = column_header_len("ts");
        assert_eq!(buf[bitmap - 6], ColumnEncoding::Affine.tag());
        assert_eq!(buf[bitmap - 5], 1);
        assert_eq!(&buf[bitmap..bitmap + 5], &[0b1000_1000; 5]);
        let payload = bitmap + 5;
        assert_eq!(buf[payload], AFFINE_DATETIME);
        assert_eq!(&buf[payload + 1..payload + 9], &(-day).to_le_bytes());
        assert_eq!(&buf[payload + 9..payload + 17], &start.to_le_bytes());
        assert_eq!(buf.len(), payload + 17 + 40 * 8);

        assert_eq!(restored.column("ts").unwrap(), store);
        assert_eq!(replay(&restored, "ts"), values);
    }
}
