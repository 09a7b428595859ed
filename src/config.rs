//! Host-supplied configuration.
//!
//! Every field has a default, so `{}` is a valid configuration document.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_TTL};
use crate::converter::EngineKind;
use crate::error::ConfigError;
use crate::variant::{EnabledVariants, Variant};

pub const COOKIE_PREFIX: &str = "zhvariant";

/// How a variant is carried in URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingStyle {
    /// `?variant=zh-tw`
    #[default]
    Query,
    /// `/path/zh-tw/`
    Suffix,
    /// `/zh-tw/path/`
    Prefix,
}

/// Whether a remembered or detected variant is shown in place or redirected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    #[default]
    Off,
    Display,
    Redirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchConversion {
    #[default]
    Off,
    Always,
    OnlyWhenVariant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
    /// Directory for the file-backed shared tier. No shared tier when unset.
    pub store_dir: Option<PathBuf>,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl_secs: DEFAULT_TTL.as_secs(),
            store_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub enabled: EnabledVariants,
    pub engine: EngineKind,
    pub style: AddressingStyle,
    pub cookie_mode: DetectionMode,
    pub browser_mode: DetectionMode,
    /// Fall back to the first enabled variant of the browser's script family.
    pub family_fallback: bool,
    pub exclude_selectors: Vec<String>,
    /// Protect elements whose `lang` attribute is not Chinese.
    pub exclude_foreign_lang: bool,
    pub search_conversion: SearchConversion,
    pub home_url: String,
    /// Sub-site path segments of a multisite deployment, e.g. `["blog"]`.
    pub subsites: Vec<String>,
    /// Extra codes kept in route alternations, e.g. retired variants.
    pub reserved_route_codes: Vec<String>,
    /// Cookie name suffix. Derived from `home_url` when empty.
    pub cookie_suffix: String,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: [Variant::ZhCn, Variant::ZhTw, Variant::ZhHk]
                .into_iter()
                .collect(),
            engine: EngineKind::default(),
            style: AddressingStyle::default(),
            cookie_mode: DetectionMode::Off,
            browser_mode: DetectionMode::Off,
            family_fallback: true,
            exclude_selectors: Vec::new(),
            exclude_foreign_lang: false,
            search_conversion: SearchConversion::default(),
            home_url: "http://localhost/".to_string(),
            subsites: Vec::new(),
            reserved_route_codes: Vec::new(),
            cookie_suffix: String::new(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.home()?;
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid("cache.capacity must be positive".into()));
        }
        if let Some(code) = self
            .reserved_route_codes
            .iter()
            .find(|c| !is_route_code(c))
        {
            return Err(ConfigError::Invalid(format!(
                "reserved route code {code:?} is not a plain code"
            )));
        }
        if let Some(seg) = self
            .subsites
            .iter()
            .find(|s| s.is_empty() || s.contains('/'))
        {
            return Err(ConfigError::Invalid(format!(
                "subsite {seg:?} must be a single path segment"
            )));
        }
        Ok(())
    }

    pub fn home(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.home_url)
            .map_err(|e| ConfigError::Invalid(format!("home_url {:?}: {e}", self.home_url)))?;
        if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "home_url {:?} must be an http(s) URL",
                self.home_url
            )));
        }
        Ok(url)
    }

    fn cookie_suffix(&self) -> String {
        if !self.cookie_suffix.is_empty() {
            return self.cookie_suffix.clone();
        }
        let hash = blake3::hash(self.home_url.as_bytes());
        hash.to_hex()[..12].to_string()
    }

    /// Cookie remembering the chosen variant or the no-conversion sentinel.
    pub fn variant_cookie_name(&self) -> String {
        format!("{COOKIE_PREFIX}_variant_{}", self.cookie_suffix())
    }

    /// Session cookie set right after a sentinel redirect.
    pub fn redirect_cookie_name(&self) -> String {
        format!("{COOKIE_PREFIX}_redirect_{}", self.cookie_suffix())
    }
}

fn is_route_code(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_json_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn parses_enums_and_nested_cache() {
        let config = Config::from_json_str(
            r#"{
                "enabled": ["zh-tw", "zh-hans"],
                "engine": "char_mapping",
                "style": "prefix",
                "cookie_mode": "redirect",
                "search_conversion": "only_when_variant",
                "cache": { "capacity": 16, "store_dir": "/tmp/zhvariant" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.enabled.len(), 2);
        assert_eq!(config.engine, EngineKind::CharMapping);
        assert_eq!(config.style, AddressingStyle::Prefix);
        assert_eq!(config.cookie_mode, DetectionMode::Redirect);
        assert_eq!(config.search_conversion, SearchConversion::OnlyWhenVariant);
        assert_eq!(config.cache.capacity, 16);
        assert_eq!(config.cache.ttl(), DEFAULT_TTL);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Config::from_json_str(r#"{"home_url": "not a url"}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_json_str(r#"{"cache": {"capacity": 0}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_json_str(r#"{"style": "sideways"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn cookie_names_use_suffix() {
        let mut config = Config {
            cookie_suffix: "site1".into(),
            ..Config::default()
        };
        assert_eq!(config.variant_cookie_name(), "zhvariant_variant_site1");
        assert_eq!(config.redirect_cookie_name(), "zhvariant_redirect_site1");

        config.cookie_suffix.clear();
        assert!(config.variant_cookie_name().starts_with("zhvariant_variant_"));
        assert_eq!(config.variant_cookie_name().len(), "zhvariant_variant_".len() + 12);
    }
}
