//! Converter strategies behind one [`Converter`] contract.
//!
//! Two engines exist: [`CharMappingConverter`] (chained per-character tables)
//! and [`VocabularyConverter`] (longest-match phrase rounds). Configuration
//! picks one once through [`EngineKind`]; the result is held as an [`Engine`].

mod char_mapping;
mod vocabulary;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use self::char_mapping::CharMappingConverter;
pub use self::vocabulary::VocabularyConverter;
use crate::diagnostics::{self, DiagnosticKind};
use crate::dictionary_lib::Dictionary;
use crate::error::ConvertError;
use crate::variant::{EnabledVariants, Variant};

/// Capability every conversion strategy provides.
pub trait Converter: Send + Sync {
    /// Converts `text` to `variant`. An engine without tables for `variant`
    /// returns [`ConvertError::Unavailable`].
    fn convert(&self, text: &str, variant: Variant) -> Result<String, ConvertError>;

    /// Variants whose tables are all present.
    fn supported_variants(&self) -> EnabledVariants;

    /// Whether the engine can serve at least one variant.
    fn is_available(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    CharMapping,
    #[default]
    Vocabulary,
}

/// The engine selected from configuration.
pub enum Engine {
    CharMapping(CharMappingConverter),
    Vocabulary(VocabularyConverter),
}

impl Engine {
    pub fn new(kind: EngineKind, dictionary: Arc<Dictionary>) -> Self {
        match kind {
            EngineKind::CharMapping => Engine::CharMapping(CharMappingConverter::new(dictionary)),
            EngineKind::Vocabulary => Engine::Vocabulary(VocabularyConverter::new(dictionary)),
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            Engine::CharMapping(_) => EngineKind::CharMapping,
            Engine::Vocabulary(_) => EngineKind::Vocabulary,
        }
    }

    fn inner(&self) -> &dyn Converter {
        match self {
            Engine::CharMapping(c) => c,
            Engine::Vocabulary(v) => v,
        }
    }
}

impl Converter for Engine {
    fn convert(&self, text: &str, variant: Variant) -> Result<String, ConvertError> {
        self.inner().convert(text, variant)
    }

    fn supported_variants(&self) -> EnabledVariants {
        self.inner().supported_variants()
    }

    fn is_available(&self) -> bool {
        self.inner().is_available()
    }
}

/// Converts with `converter`, falling back to the original text when the
/// engine is unavailable for `variant`.
pub fn convert_or_passthrough<C: Converter + ?Sized>(
    converter: &C,
    text: &str,
    variant: Variant,
) -> String {
    match converter.convert(text, variant) {
        Ok(converted) => converted,
        Err(err) => {
            diagnostics::report(DiagnosticKind::Unavailable, &err.to_string());
            text.to_string()
        }
    }
}
