use rustc_hash::FxHashMap;

use super::PhraseTable;

/// Single-pass, per-character substitution table.
///
/// A total function over characters: anything without an entry maps to itself.
/// Built from the single-character keys of a [`PhraseTable`]; longer keys have
/// no meaning for a per-character pass and are left out.
#[derive(Debug, Default, Clone)]
pub struct CharTable {
    map: FxHashMap<char, Box<str>>,
}

impl CharTable {
    pub fn from_phrase_table(table: &PhraseTable, name: &str) -> Self {
        let mut map = FxHashMap::default();
        map.reserve(table.len());
        let mut skipped = 0usize;
        for (key, value) in &table.map {
            match key.as_ref() {
                [c] => {
                    map.insert(*c, value.clone());
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::debug!(table = name, skipped, "multi-character keys ignored by char table");
        }
        Self { map }
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (char, String)>,
    {
        Self {
            map: pairs
                .into_iter()
                .map(|(c, s)| (c, s.into_boxed_str()))
                .collect(),
        }
    }

    /// Applies the table once over `text`, appending to `out`.
    pub fn apply_into(&self, text: &str, out: &mut String) {
        out.reserve(text.len());
        for c in text.chars() {
            match self.map.get(&c) {
                Some(rep) => out.push_str(rep),
                None => out.push(c),
            }
        }
    }

    pub fn apply(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        self.apply_into(text, &mut out);
        out
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_chars_pass_through() {
        let table = CharTable::from_pairs([('门', "門".to_string())]);
        assert_eq!(table.apply("开门 ok"), "开門 ok");
    }

    #[test]
    fn keeps_only_single_char_keys() {
        let phrases = PhraseTable::build_from_pairs(vec![
            ("后".to_string(), "後".to_string()),
            ("皇后".to_string(), "皇后".to_string()),
        ]);
        let table = CharTable::from_phrase_table(&phrases, "zh2Hant");
        assert_eq!(table.len(), 1);
        assert_eq!(table.apply("皇后"), "皇後");
    }
}
