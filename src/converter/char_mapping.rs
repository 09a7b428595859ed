use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::{Arc, OnceLock};

use super::Converter;
use crate::dictionary_lib::{CharTable, Dictionary};
use crate::error::ConvertError;
use crate::variant::{EnabledVariants, Variant};

type Chain = Result<Arc<[Arc<CharTable>]>, ConvertError>;

/// Character-mapping strategy.
///
/// Each variant walks a fixed list of per-character tables (for example
/// `zh2Hant` then `zh2TW`). Tables run strictly one after another over the
/// previous output and are never merged, so a later regional table can
/// override what the script table produced for the same character.
pub struct CharMappingConverter {
    dictionary: Arc<Dictionary>,
    chains: [OnceLock<Chain>; Variant::COUNT],
    tables: RwLock<FxHashMap<&'static str, Arc<CharTable>>>,
}

impl CharMappingConverter {
    pub fn new(dictionary: Arc<Dictionary>) -> Self {
        Self {
            dictionary,
            chains: Default::default(),
            tables: RwLock::new(FxHashMap::default()),
        }
    }

    fn chain(&self, variant: Variant) -> &Chain {
        self.chains[variant as usize].get_or_init(|| {
            let names = variant.char_tables();
            let missing: Vec<&str> = names
                .iter()
                .copied()
                .filter(|name| !self.dictionary.contains(name))
                .collect();
            if !missing.is_empty() {
                return Err(ConvertError::Unavailable {
                    variant,
                    missing: missing.join(", "),
                });
            }
            let chain: Vec<Arc<CharTable>> =
                names.iter().filter_map(|name| self.char_table(name)).collect();
            Ok(chain.into())
        })
    }

    /// Per-table views are shared between variants using the same table.
    fn char_table(&self, name: &'static str) -> Option<Arc<CharTable>> {
        if let Some(table) = self.tables.read().get(name) {
            return Some(table.clone());
        }
        let phrase_table = self.dictionary.table(name)?;
        // Racing builders derive the same table; last writer wins.
        let table = Arc::new(CharTable::from_phrase_table(phrase_table, name));
        self.tables.write().insert(name, table.clone());
        Some(table)
    }
}

impl Converter for CharMappingConverter {
    fn convert(&self, text: &str, variant: Variant) -> Result<String, ConvertError> {
        let chain = self.chain(variant).as_ref().map_err(Clone::clone)?;
        let mut current = text.to_string();
        for table in chain.iter() {
            current = table.apply(&current);
        }
        Ok(current)
    }

    fn supported_variants(&self) -> EnabledVariants {
        Variant::ALL
            .into_iter()
            .filter(|v| v.char_tables().iter().all(|name| self.dictionary.contains(name)))
            .collect()
    }

    fn is_available(&self) -> bool {
        !self.supported_variants().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary() -> Arc<Dictionary> {
        Arc::new(
            Dictionary::new()
                .with_pairs("zh2Hant", [("台", "臺"), ("里", "裡"), ("发", "發")])
                // Regional table overrides the script table for 臺.
                .with_pairs("zh2TW", [("臺", "台")]),
        )
    }

    #[test]
    fn tables_apply_in_sequence() {
        let conv = CharMappingConverter::new(dictionary());
        assert_eq!(conv.convert("台里发", Variant::ZhHant).unwrap(), "臺裡發");
        assert_eq!(conv.convert("台里发", Variant::ZhTw).unwrap(), "台裡發");
    }

    #[test]
    fn missing_tables_make_variant_unavailable() {
        let conv = CharMappingConverter::new(dictionary());
        let err = conv.convert("发", Variant::ZhHk).unwrap_err();
        assert_eq!(
            err,
            ConvertError::Unavailable {
                variant: Variant::ZhHk,
                missing: "zh2HK".to_string()
            }
        );
        let supported = conv.supported_variants();
        assert!(supported.contains(Variant::ZhTw));
        assert!(!supported.contains(Variant::ZhCn));
        assert!(conv.is_available());
    }
}
