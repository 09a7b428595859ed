use crate::dictionary_lib::PhraseTable;
use rustc_hash::FxHashMap;

/// Union of starter-length masks across the phrase tables of one conversion round.
///
/// Lets the matcher do a single starter check per position no matter how many
/// tables the round probes, and hands out candidate lengths longest first.
///
/// - **BMP** starters (0x0000..=0xFFFF) are stored densely in [`bmp_mask`].
/// - **Astral** starters are sparse in [`astral_mask`].
///
/// # Bit layout
/// bit 0 ⇒ length 1, bit 1 ⇒ length 2, …, bit 63 ⇒ length **≥ 64**.
///
/// Built once per round and shared behind an `Arc`.
#[derive(Default, Debug)]
pub struct StarterUnion {
    /// Dense BMP length bitmasks, indexed by `starter as usize`.
    pub bmp_mask: Vec<u64>, // 0x10000

    /// Sparse length bitmasks for astral starters (`starter > 0xFFFF`).
    pub astral_mask: FxHashMap<char, u64>,

    /// Longest key across the round's tables.
    pub max_len: usize,
}

impl StarterUnion {
    /// Builds the union from the given tables. Each table must have populated
    /// starter indexes (see [`PhraseTable::populate_starter_indexes`]).
    ///
    /// ```
    /// use zhvariant::dictionary_lib::{PhraseTable, StarterUnion};
    ///
    /// let d1 = PhraseTable::build_from_pairs(vec![("你好".to_string(), "您好".to_string())]);
    /// let d2 = PhraseTable::build_from_pairs(vec![("你".to_string(), "妳".to_string())]);
    /// let u = StarterUnion::build(&[&d1, &d2]);
    ///
    /// assert_eq!(u.mask_for('你'), 0b11);
    /// assert_eq!(u.max_len, 2);
    /// ```
    pub fn build(tables: &[&PhraseTable]) -> Self {
        const N: usize = 0x10000;
        let mut bmp_mask = vec![0u64; N];
        let mut astral_mask: FxHashMap<char, u64> = FxHashMap::default();
        let mut max_len = 0usize;

        for table in tables {
            debug_assert!(table.is_populated(), "starter indexes not populated");
            max_len = max_len.max(table.max_len);
            for (c, m) in table.starters() {
                let u = c as u32;
                if u <= 0xFFFF {
                    bmp_mask[u as usize] |= m;
                } else {
                    *astral_mask.entry(c).or_default() |= m;
                }
            }
        }

        Self {
            bmp_mask,
            astral_mask,
            max_len,
        }
    }

    #[inline]
    pub fn mask_for(&self, starter: char) -> u64 {
        let u = starter as u32;
        if u <= 0xFFFF {
            self.bmp_mask.get(u as usize).copied().unwrap_or(0)
        } else {
            self.astral_mask.get(&starter).copied().unwrap_or(0)
        }
    }
}
