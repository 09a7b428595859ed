//! Phrase table with maximum-length and per-starter length metadata.
//!
//! [`PhraseTable`] maps phrase keys (`Box<[char]>`) to replacement strings
//! (`Box<str>`) and tracks:
//!
//! - the **global maximum and minimum key length** (`max_len`, `min_len`), and
//! - a **per-starter length mask** (`starter_mask`): bit *n* set for starter `c`
//!   means some key of length *n+1* starts with `c` (bit 63 covers ≥ 64).
//!
//! The mask is runtime-only and rebuilt with
//! [`PhraseTable::populate_starter_indexes`] after deserialization.
//!
//! ```
//! use zhvariant::dictionary_lib::PhraseTable;
//!
//! let table = PhraseTable::build_from_pairs(vec![
//!     ("头发".to_string(), "頭髮".to_string()),
//!     ("发".to_string(), "發".to_string()),
//! ]);
//!
//! assert_eq!(table.max_len, 2);
//! assert_eq!(table.min_len, 1);
//! assert_eq!(table.starter_mask(&'发'), 0b1);
//! assert_eq!(table.starter_mask(&'头'), 0b10);
//! ```

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::utils::length_bit;

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct PhraseTable {
    /// Phrase (as boxed slice of `char`) → replacement string.
    ///
    /// `&[char]` lookups need no allocation in the matching loop.
    #[serde(default)]
    pub map: FxHashMap<Box<[char]>, Box<str>>,

    /// Longest key length in characters.
    #[serde(default)]
    pub max_len: usize,

    /// Shortest key length in characters (0 for an empty table).
    #[serde(default)]
    pub min_len: usize,

    #[serde(skip)]
    starter_mask: FxHashMap<char, u64>,
}

impl PhraseTable {
    /// Builds a table from `(key, value)` pairs and its starter indexes.
    ///
    /// ### Duplicates
    /// First wins. An identical duplicate is ignored silently; a conflicting one
    /// is ignored with a debug-level log line.
    ///
    /// ### Empty keys
    /// Skipped: an empty key could never be matched.
    pub fn build_from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        use std::collections::hash_map::Entry;

        let it = pairs.into_iter();
        let (lower, _) = it.size_hint();

        let mut map: FxHashMap<Box<[char]>, Box<str>> = FxHashMap::default();
        map.reserve(lower);

        let mut global_max = 0usize;
        let mut global_min = usize::MAX;

        for (k, v) in it {
            if k.is_empty() {
                tracing::debug!(value = %v, "empty dictionary key skipped");
                continue;
            }
            let chars: Box<[char]> = k.chars().collect::<Vec<_>>().into_boxed_slice();
            let len = chars.len();
            global_max = global_max.max(len);
            global_min = global_min.min(len);

            match map.entry(chars) {
                Entry::Vacant(e) => {
                    e.insert(v.into_boxed_str());
                }
                Entry::Occupied(e) => {
                    if e.get().as_ref() != v.as_str() {
                        tracing::debug!(
                            key = %k,
                            kept = %e.get(),
                            ignored = %v,
                            "duplicate dictionary key ignored (first wins)"
                        );
                    }
                }
            }
        }

        let mut table = Self {
            map,
            max_len: global_max,
            min_len: if global_min == usize::MAX { 0 } else { global_min },
            starter_mask: FxHashMap::default(),
        };
        table.populate_starter_indexes();
        table
    }

    /// Parses `key<whitespace>value` lines. Blank lines and `#` comments are
    /// skipped; lines without a value are logged and skipped.
    ///
    /// When a line carries several candidate values, the first one is used.
    pub fn from_text(content: &str, source: &str) -> Self {
        let pairs = content.lines().filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(phrase), Some(translation)) => {
                    Some((phrase.to_string(), translation.to_string()))
                }
                _ => {
                    tracing::warn!(source, line, "invalid dictionary line format");
                    None
                }
            }
        });
        Self::build_from_pairs(pairs.collect::<Vec<_>>())
    }

    /// (Re)builds the per-starter length masks from `map`.
    pub fn populate_starter_indexes(&mut self) {
        self.starter_mask.clear();
        for key in self.map.keys() {
            if let Some(&c0) = key.first() {
                *self.starter_mask.entry(c0).or_default() |= length_bit(key.len());
            }
        }
    }

    /// Whether the starter masks reflect `map` (false right after deserializing
    /// a non-empty table).
    #[inline]
    pub fn is_populated(&self) -> bool {
        self.map.is_empty() || !self.starter_mask.is_empty()
    }

    /// Length mask of keys starting with `starter` (0 if none).
    #[inline]
    pub fn starter_mask(&self, starter: &char) -> u64 {
        self.starter_mask.get(starter).copied().unwrap_or(0)
    }

    /// Iterates the starters that begin at least one key, with their masks.
    pub fn starters(&self) -> impl Iterator<Item = (char, u64)> + '_ {
        self.starter_mask.iter().map(|(&c, &m)| (c, m))
    }

    #[inline]
    pub fn get(&self, key: &[char]) -> Option<&str> {
        self.map.get(key).map(|v| v.as_ref())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
