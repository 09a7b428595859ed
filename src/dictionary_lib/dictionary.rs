//! Named collection of conversion tables, loaded from external data.
//!
//! The crate ships no dictionary data. A [`Dictionary`] is filled from a
//! directory of plain-text tables ([`Dictionary::from_dir`]), from a
//! Zstd-compressed CBOR bundle ([`Dictionary::load_compressed`]), or
//! programmatically. Converters look tables up by name, following each
//! variant's entry point (see [`crate::variant::Variant::char_tables`] and
//! [`crate::variant::Variant::phrase_rounds`]).

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor};
use std::path::{Path, PathBuf};
use zstd::{decode_all, Decoder, Encoder};

use super::PhraseTable;
use crate::error::DictionaryError;

/// Zstd level used for bundles; bundles are written rarely and read at startup.
const BUNDLE_LEVEL: i32 = 19;

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Dictionary {
    tables: BTreeMap<String, PhraseTable>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a table.
    pub fn insert(&mut self, name: impl Into<String>, table: PhraseTable) {
        self.tables.insert(name.into(), table);
    }

    /// Builder-style [`insert`](Self::insert) from string pairs.
    pub fn with_pairs<K, V>(mut self, name: &str, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let table =
            PhraseTable::build_from_pairs(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self.insert(name, table);
        self
    }

    pub fn table(&self, name: &str) -> Option<&PhraseTable> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Loads every `*.txt` file in `dir` as a table named after its file stem.
    ///
    /// Files are parsed in parallel.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, DictionaryError> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(dir).map_err(|err| {
            DictionaryError::IoError(format!("Failed to read directory {}: {}", dir.display(), err))
        })? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "txt") {
                paths.push(path);
            }
        }

        let loaded: Vec<(String, PhraseTable)> = paths
            .par_iter()
            .map(|path| {
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .ok_or_else(|| {
                        DictionaryError::ParseError(format!("No file name: {}", path.display()))
                    })?;
                let content = fs::read_to_string(path).map_err(|err| {
                    DictionaryError::IoError(format!(
                        "Failed to read file {}: {}",
                        path.display(),
                        err
                    ))
                })?;
                let table = PhraseTable::from_text(&content, &name);
                Ok((name, table))
            })
            .collect::<Result<_, DictionaryError>>()?;

        let dictionary = Self {
            tables: loaded.into_iter().collect(),
        };
        tracing::debug!(
            dir = %dir.display(),
            tables = dictionary.len(),
            "dictionary loaded from text tables"
        );
        Ok(dictionary)
    }

    /// Saves all tables to a Zstd-compressed CBOR bundle.
    pub fn save_compressed<P: AsRef<Path>>(&self, path: P) -> Result<(), DictionaryError> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        let mut encoder = Encoder::new(writer, BUNDLE_LEVEL)?;
        serde_cbor::to_writer(&mut encoder, self)?;
        encoder.finish()?;
        Ok(())
    }

    /// Loads a bundle written by [`save_compressed`](Self::save_compressed).
    pub fn load_compressed<P: AsRef<Path>>(path: P) -> Result<Self, DictionaryError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut decoder = Decoder::new(reader)?;
        let mut dictionary: Dictionary = serde_cbor::from_reader(&mut decoder)?;
        dictionary.populate_starter_indexes();
        Ok(dictionary)
    }

    /// Loads a bundle from memory, e.g. one embedded with `include_bytes!`.
    pub fn from_compressed_bytes(bytes: &[u8]) -> Result<Self, DictionaryError> {
        let decompressed = decode_all(Cursor::new(bytes)).map_err(|err| {
            DictionaryError::IoError(format!("Failed to decompress Zstd: {}", err))
        })?;
        let mut dictionary: Dictionary = serde_cbor::from_slice(&decompressed)
            .map_err(|err| DictionaryError::ParseError(format!("Failed to parse CBOR: {}", err)))?;
        dictionary.populate_starter_indexes();
        Ok(dictionary)
    }

    fn populate_starter_indexes(&mut self) {
        for table in self.tables.values_mut() {
            table.populate_starter_indexes();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_text_tables_by_file_stem() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("st_characters.txt"), "发\t發\n云\t雲\n").unwrap();
        fs::write(dir.path().join("tw_phrases.txt"), "软件\t軟體\n").unwrap();
        fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let dictionary = Dictionary::from_dir(dir.path()).unwrap();
        assert_eq!(dictionary.len(), 2);
        assert_eq!(dictionary.table("st_characters").unwrap().len(), 2);
        assert!(dictionary.contains("tw_phrases"));
        assert!(!dictionary.contains("README"));
    }

    #[test]
    fn missing_directory_is_io_error() {
        let err = Dictionary::from_dir("/definitely/not/here").unwrap_err();
        assert!(matches!(err, DictionaryError::IoError(_)));
    }

    #[test]
    fn compressed_bundle_round_trip_rebuilds_indexes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.zstd");
        let dictionary = Dictionary::new().with_pairs("ts_phrases", [("頭髮", "头发")]);
        dictionary.save_compressed(&path).unwrap();

        let loaded = Dictionary::load_compressed(&path).unwrap();
        let table = loaded.table("ts_phrases").unwrap();
        assert_eq!(table.get(&['頭', '髮']), Some("头发"));
        assert!(table.is_populated());
        assert_eq!(table.starter_mask(&'頭'), 0b10);

        let bytes = fs::read(&path).unwrap();
        let from_bytes = Dictionary::from_compressed_bytes(&bytes).unwrap();
        assert_eq!(from_bytes.len(), 1);
    }
}
