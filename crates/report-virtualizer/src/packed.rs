#![forbid(unsafe_code)]

//! Width-narrowed integer sequences backing affine raws and dictionary codes.

/// Signed integers stored at the narrowest width that holds all of them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackedInts {
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

impl PackedInts {
    pub fn pack(values: &[i64]) -> Self {
        let (min, max) = values
            .iter()
            .fold((0i64, 0i64), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        if min >= i8::MIN as i64 && max <= i8::MAX as i64 {
            Self::I8(values.iter().map(|&v| v as i8).collect())
        } else if min >= i16::MIN as i64 && max <= i16::MAX as i64 {
            Self::I16(values.iter().map(|&v| v as i16).collect())
        } else if min >= i32::MIN as i64 && max <= i32::MAX as i64 {
            Self::I32(values.iter().map(|&v| v as i32).collect())
        } else {
            Self::I64(values.to_vec())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::I8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> i64 {
        match self {
            Self::I8(v) => v[index] as i64,
            Self::I16(v) => v[index] as i64,
            Self::I32(v) => v[index] as i64,
            Self::I64(v) => v[index],
        }
    }

    pub fn heap_size_bytes(&self) -> usize {
        match self {
            Self::I8(v) => v.len(),
            Self::I16(v) => v.len() * 2,
            Self::I32(v) => v.len() * 4,
            Self::I64(v) => v.len() * 8,
        }
    }
}

/// Dictionary codes, sized by the dictionary length rather than by the codes themselves so
/// the persisted width is derivable from the table size alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackedCodes {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl PackedCodes {
    /// Bytes per code for a dictionary of `entries` distinct values.
    pub fn width_for(entries: usize) -> usize {
        if entries <= 1 << 8 {
            1
        } else if entries <= 1 << 16 {
            2
        } else {
            4
        }
    }

    pub fn pack(codes: &[u32], entries: usize) -> Self {
        match Self::width_for(entries) {
            1 => Self::U8(codes.iter().map(|&c| c as u8).collect()),
            2 => Self::U16(codes.iter().map(|&c| c as u16).collect()),
            _ => Self::U32(codes.to_vec()),
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Self::U8(_) => 1,
            Self::U16(_) => 2,
            Self::U32(_) => 4,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> usize {
        match self {
            Self::U8(v) => v[index] as usize,
            Self::U16(v) => v[index] as usize,
            Self::U32(v) => v[index] as usize,
        }
    }

    pub fn heap_size_bytes(&self) -> usize {
        self.len() * self.width()
    }
}
