//! Error types for dictionary loading, conversion, cache stores and configuration.
//!
//! None of these ever reach an end user: the pipeline maps every one of them to
//! a pass-through or a cache miss and reports it through [`crate::diagnostics`].

use thiserror::Error;

use crate::variant::Variant;

/// Errors raised while loading, parsing or saving dictionary tables.
#[derive(Debug, Error)]
pub enum DictionaryError {
    /// File access, reading or writing failed.
    #[error("I/O Error: {0}")]
    IoError(String),

    /// CBOR or dictionary text could not be decoded.
    #[error("Parse Error: {0}")]
    ParseError(String),
}

impl From<std::io::Error> for DictionaryError {
    fn from(err: std::io::Error) -> Self {
        DictionaryError::IoError(err.to_string())
    }
}

impl From<serde_cbor::Error> for DictionaryError {
    fn from(err: serde_cbor::Error) -> Self {
        DictionaryError::ParseError(err.to_string())
    }
}

/// Raised by a converter strategy that cannot serve a variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    /// Backing tables for this variant are missing.
    #[error("conversion tables unavailable for {variant}: missing {missing}")]
    Unavailable { variant: Variant, missing: String },
}

/// Failures of the shared cache tier's backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry could not be encoded or decoded: {0}")]
    Codec(#[from] serde_cbor::Error),

    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// Configuration could not be read or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
