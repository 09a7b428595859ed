use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::{Arc, OnceLock};

use super::Converter;
use crate::dictionary_lib::{Dictionary, PhraseTable, StarterUnion};
use crate::error::ConvertError;
use crate::utils::{contains_han, for_each_len_dec};
use crate::variant::{EnabledVariants, Variant};

/// One conversion round: table names (probe order = precedence) plus the
/// union of their starter masks.
struct Round {
    tables: &'static [&'static str],
    union: Arc<StarterUnion>,
}

type Plan = Result<Arc<[Round]>, ConvertError>;

/// Vocabulary-mapping strategy: longest-match-first phrase substitution.
///
/// At each position the candidate lengths present in the round's tables are
/// tried from longest to shortest, so a multi-character phrase always wins
/// over any of its single-character substrings. The descending length order
/// per starter is derived once per round and memoized in a [`StarterUnion`].
pub struct VocabularyConverter {
    dictionary: Arc<Dictionary>,
    plans: [OnceLock<Plan>; Variant::COUNT],
    unions: RwLock<FxHashMap<&'static [&'static str], Arc<StarterUnion>>>,
}

impl VocabularyConverter {
    pub fn new(dictionary: Arc<Dictionary>) -> Self {
        Self {
            dictionary,
            plans: Default::default(),
            unions: RwLock::new(FxHashMap::default()),
        }
    }

    fn plan(&self, variant: Variant) -> &Plan {
        self.plans[variant as usize].get_or_init(|| {
            let rounds = variant.phrase_rounds();
            let missing: Vec<&str> = rounds
                .iter()
                .flat_map(|round| round.iter().copied())
                .filter(|name| !self.dictionary.contains(name))
                .collect();
            if !missing.is_empty() {
                return Err(ConvertError::Unavailable {
                    variant,
                    missing: missing.join(", "),
                });
            }
            let plan: Vec<Round> = rounds
                .iter()
                .map(|&tables| Round {
                    tables,
                    union: self.union_for(tables),
                })
                .collect();
            Ok(plan.into())
        })
    }

    /// Rounds shared between variants (the script round) share one union.
    fn union_for(&self, tables: &'static [&'static str]) -> Arc<StarterUnion> {
        if let Some(union) = self.unions.read().get(tables) {
            return union.clone();
        }
        let refs: Vec<&PhraseTable> = tables
            .iter()
            .filter_map(|name| self.dictionary.table(name))
            .collect();
        // Racing builders derive the same union; last writer wins.
        let union = Arc::new(StarterUnion::build(&refs));
        self.unions.write().insert(tables, union.clone());
        union
    }

    fn convert_round(&self, text: &str, round: &Round) -> String {
        let tables: Vec<&PhraseTable> = round
            .tables
            .iter()
            .filter_map(|name| self.dictionary.table(name))
            .collect();
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        convert_by_union(&chars, &tables, &round.union, &mut out);
        out
    }
}

/// Forward maximum matching over `chars`, appending to `out`.
///
/// Unmatched characters are copied through.
fn convert_by_union(
    chars: &[char],
    tables: &[&PhraseTable],
    union: &StarterUnion,
    out: &mut String,
) {
    let n = chars.len();
    let mut i = 0;
    while i < n {
        let mask = union.mask_for(chars[i]);
        let cap_here = union.max_len.min(n - i);
        let mut matched = 0usize;

        for_each_len_dec(mask, cap_here, |len| {
            let key = &chars[i..i + len];
            for table in tables {
                if let Some(value) = table.get(key) {
                    out.push_str(value);
                    matched = len;
                    return true;
                }
            }
            false
        });

        if matched == 0 {
            out.push(chars[i]);
            i += 1;
        } else {
            i += matched;
        }
    }
}

impl Converter for VocabularyConverter {
    fn convert(&self, text: &str, variant: Variant) -> Result<String, ConvertError> {
        if !contains_han(text) {
            return Ok(text.to_string());
        }
        let plan = self.plan(variant).as_ref().map_err(Clone::clone)?;
        let mut current = text.to_string();
        for round in plan.iter() {
            current = self.convert_round(&current, round);
        }
        Ok(current)
    }

    fn supported_variants(&self) -> EnabledVariants {
        Variant::ALL
            .into_iter()
            .filter(|v| {
                v.phrase_rounds()
                    .iter()
                    .all(|round| round.iter().all(|name| self.dictionary.contains(name)))
            })
            .collect()
    }

    fn is_available(&self) -> bool {
        !self.supported_variants().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s2t_dictionary() -> Arc<Dictionary> {
        Arc::new(
            Dictionary::new()
                .with_pairs("st_phrases", [("头发", "頭髮"), ("理发", "理髮"), ("一发不可收拾", "一發不可收拾")])
                .with_pairs("st_characters", [("头", "頭"), ("发", "發"), ("软", "軟"), ("件", "件")])
                .with_pairs("tw_phrases", [("軟件", "軟體")])
                .with_pairs("tw_variants", [("裏", "裡")]),
        )
    }

    #[test]
    fn longest_match_beats_substrings() {
        let conv = VocabularyConverter::new(s2t_dictionary());
        assert_eq!(conv.convert("头发", Variant::ZhHant).unwrap(), "頭髮");
        assert_eq!(conv.convert("一发不可收拾", Variant::ZhHant).unwrap(), "一發不可收拾");
        assert_eq!(conv.convert("发", Variant::ZhHant).unwrap(), "發");
    }

    #[test]
    fn rounds_run_over_previous_output() {
        let conv = VocabularyConverter::new(s2t_dictionary());
        assert_eq!(conv.convert("软件理发", Variant::ZhTw).unwrap(), "軟體理髮");
    }

    #[test]
    fn non_han_text_skips_lookup() {
        let conv = VocabularyConverter::new(Arc::new(Dictionary::new()));
        // No tables at all, yet ASCII passes through without Unavailable.
        assert_eq!(conv.convert("plain text", Variant::ZhTw).unwrap(), "plain text");
        assert!(conv.convert("中文", Variant::ZhTw).is_err());
        assert!(!conv.is_available());
    }

    #[test]
    fn round_unions_are_shared() {
        let conv = VocabularyConverter::new(s2t_dictionary());
        conv.convert("头发", Variant::ZhHant).unwrap();
        conv.convert("头发", Variant::ZhTw).unwrap();
        // st round + tw_phrases + tw_variants
        assert_eq!(conv.unions.read().len(), 3);
    }
}
