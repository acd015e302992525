#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Encoding policy for a [`crate::ColumnCache`].
///
/// None of these knobs affect what a replay observes; they only decide which encoding a
/// column freezes into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Columns with fewer rows than this never freeze into a dictionary.
    pub dictionary_min_rows: usize,
    /// Maximum `distinct / rows` ratio of a dictionary-encoded column, checked on freeze.
    pub dictionary_max_ratio: f64,
    /// Hard cap on the number of distinct values in a dictionary table. Exceeding it while
    /// recording drops the dictionary candidate for good.
    pub dictionary_max_entries: usize,
    /// Allow `Integer` / `DateTime` columns to freeze into an affine array.
    pub affine: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            dictionary_min_rows: 16,
            dictionary_max_ratio: 0.5,
            dictionary_max_entries: 65_536,
            affine: true,
        }
    }
}

impl CacheOptions {
    /// Whether a whole column of `rows` rows with `distinct` values should freeze into a
    /// dictionary.
    pub(crate) fn dictionary_fits(&self, distinct: usize, rows: usize) -> bool {
        rows >= self.dictionary_min_rows
            && distinct <= self.dictionary_max_entries
            && (distinct as f64) <= (rows as f64) * self.dictionary_max_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_columns_never_fit() {
        let opts = CacheOptions::default();
        assert!(!opts.dictionary_fits(1, 15));
        assert!(opts.dictionary_fits(8, 16));
        assert!(!opts.dictionary_fits(9, 16));
    }

    #[test]
    fn entry_cap_always_applies() {
        let opts = CacheOptions {
            dictionary_max_entries: 4,
            ..CacheOptions::default()
        };
        assert!(!opts.dictionary_fits(5, 5));
        assert!(opts.dictionary_fits(4, 1000));
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let opts: CacheOptions =
            serde_json::from_str(r#"{ "dictionary_max_entries": 1024, "affine": false }"#)
                .unwrap();
        assert_eq!(
            opts,
            CacheOptions {
                dictionary_max_entries: 1024,
                affine: false,
                ..CacheOptions::default()
            }
        );

        let json = serde_json::to_string(&CacheOptions::default()).unwrap();
        let back: CacheOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CacheOptions::default());
        let empty: CacheOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, CacheOptions::default());
    }
}
