//! The fixed universe of Chinese output variants and the enabled subset.
//!
//! A [`Variant`] is configuration data: its code, display name, locale tag,
//! script family and the dictionary tables each conversion engine walks for it
//! never change at runtime. Which variants a site offers is an
//! [`EnabledVariants`] set over that universe.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reserved code requesting the original, unconverted content.
///
/// Never a real variant code.
pub const NO_CONVERSION: &str = "zh";

/// Script family a variant leans to. Used for browser-language family fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Simplified,
    Traditional,
}

/// One supported Chinese-script/regional output form.
///
/// Declaration order is the catalog order: it drives alternation order in
/// compiled routes, family fallback and [`EnabledVariants`] iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variant {
    ZhCn,
    ZhTw,
    ZhHk,
    ZhHans,
    ZhHant,
    ZhSg,
    ZhMo,
    ZhMy,
}

impl Variant {
    pub const COUNT: usize = 8;

    pub const ALL: [Variant; Variant::COUNT] = [
        Variant::ZhCn,
        Variant::ZhTw,
        Variant::ZhHk,
        Variant::ZhHans,
        Variant::ZhHant,
        Variant::ZhSg,
        Variant::ZhMo,
        Variant::ZhMy,
    ];

    /// Lowercase code used in URLs, cookies and route alternations.
    pub const fn code(self) -> &'static str {
        match self {
            Variant::ZhCn => "zh-cn",
            Variant::ZhTw => "zh-tw",
            Variant::ZhHk => "zh-hk",
            Variant::ZhHans => "zh-hans",
            Variant::ZhHant => "zh-hant",
            Variant::ZhSg => "zh-sg",
            Variant::ZhMo => "zh-mo",
            Variant::ZhMy => "zh-my",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Variant::ZhCn => "大陆简体",
            Variant::ZhTw => "台灣正體",
            Variant::ZhHk => "港澳繁體",
            Variant::ZhHans => "简体中文",
            Variant::ZhHant => "繁體中文",
            Variant::ZhSg => "马新简体",
            Variant::ZhMo => "澳門繁體",
            Variant::ZhMy => "马来西亚简体",
        }
    }

    /// BCP-47 tag for `lang`/`hreflang` metadata.
    pub const fn locale_tag(self) -> &'static str {
        match self {
            Variant::ZhCn => "zh-Hans-CN",
            Variant::ZhTw => "zh-Hant-TW",
            Variant::ZhHk => "zh-Hant-HK",
            Variant::ZhHans => "zh-Hans",
            Variant::ZhHant => "zh-Hant",
            Variant::ZhSg => "zh-Hans-SG",
            Variant::ZhMo => "zh-Hant-MO",
            Variant::ZhMy => "zh-Hans-MY",
        }
    }

    pub const fn family(self) -> Family {
        match self {
            Variant::ZhCn | Variant::ZhHans | Variant::ZhSg | Variant::ZhMy => Family::Simplified,
            Variant::ZhTw | Variant::ZhHk | Variant::ZhHant | Variant::ZhMo => Family::Traditional,
        }
    }

    /// Character-mapping entry point: single-char tables applied strictly in order.
    pub const fn char_tables(self) -> &'static [&'static str] {
        match self {
            Variant::ZhHans => &["zh2Hans"],
            Variant::ZhHant => &["zh2Hant"],
            Variant::ZhCn => &["zh2Hans", "zh2CN"],
            Variant::ZhTw => &["zh2Hant", "zh2TW"],
            Variant::ZhHk | Variant::ZhMo => &["zh2Hant", "zh2HK"],
            Variant::ZhSg | Variant::ZhMy => &["zh2Hans", "zh2SG"],
        }
    }

    /// Vocabulary-mapping entry point: rounds of phrase tables.
    ///
    /// Tables inside one round are probed together (earlier table wins on the
    /// same key); rounds run one after another over the previous output.
    pub const fn phrase_rounds(self) -> &'static [&'static [&'static str]] {
        const S2T: &[&str] = &["st_phrases", "st_characters"];
        const T2S: &[&str] = &["ts_phrases", "ts_characters"];
        match self {
            Variant::ZhHans | Variant::ZhCn | Variant::ZhSg | Variant::ZhMy => &[T2S],
            Variant::ZhHant => &[S2T],
            Variant::ZhTw => &[S2T, &["tw_phrases"], &["tw_variants"]],
            Variant::ZhHk | Variant::ZhMo => &[S2T, &["hk_variants"]],
        }
    }

    /// Parses a code case-insensitively, accepting `_` in place of `-`.
    pub fn from_code(code: &str) -> Option<Self> {
        let normalized = code.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL.into_iter().find(|v| v.code() == normalized)
    }

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown variant code: {0}")]
pub struct UnknownVariant(pub String);

impl FromStr for Variant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variant::from_code(s).ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

impl Serialize for Variant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Variant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}

/// Set of variants currently offered, iterated in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EnabledVariants(u16);

impl EnabledVariants {
    pub const fn none() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Variant::ALL.into_iter().collect()
    }

    pub fn insert(&mut self, variant: Variant) {
        self.0 |= variant.bit();
    }

    pub fn remove(&mut self, variant: Variant) {
        self.0 &= !variant.bit();
    }

    pub const fn contains(&self, variant: Variant) -> bool {
        self.0 & variant.bit() != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Variant> + '_ {
        Variant::ALL.into_iter().filter(move |v| self.contains(*v))
    }

    /// Looks up an enabled variant by code; disabled or unknown codes give `None`.
    pub fn lookup(&self, code: &str) -> Option<Variant> {
        Variant::from_code(code).filter(|v| self.contains(*v))
    }

    /// First enabled variant of the given family, in catalog order.
    pub fn first_in_family(&self, family: Family) -> Option<Variant> {
        self.iter().find(|v| v.family() == family)
    }

    /// Codes joined by `|`, ready for a regex alternation group.
    pub fn alternation(&self) -> String {
        self.iter().map(Variant::code).collect::<Vec<_>>().join("|")
    }

    /// Raw bitset, stable across runs. Used as a cache key component.
    pub const fn bits(&self) -> u16 {
        self.0
    }
}

impl FromIterator<Variant> for EnabledVariants {
    fn from_iter<I: IntoIterator<Item = Variant>>(iter: I) -> Self {
        let mut set = EnabledVariants::none();
        for v in iter {
            set.insert(v);
        }
        set
    }
}

impl Serialize for EnabledVariants {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for EnabledVariants {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let variants = Vec::<Variant>::deserialize(deserializer)?;
        Ok(variants.into_iter().collect())
    }
}
