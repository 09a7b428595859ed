use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use std::ops::Range;
use std::str::FromStr;
use thiserror::Error;

use super::{end_marker, protected_ranges, start_marker, START_MARKER};

/// Opening or closing tag. Attribute text is parsed separately.
static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<(/?)([A-Za-z][A-Za-z0-9:-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#).unwrap());

static ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'=/>]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#).unwrap()
});

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const NO_CONVERSION_ATTR: &str = "data-no-conversion";
const NO_CONVERSION_CLASS: &str = "no-conversion";

/// One exclusion selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Tag(String),
    Class(String),
    Id(String),
    TagClass(String, String),
    Attr(String),
    AttrValue(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported selector: {0}")]
pub struct InvalidSelector(pub String);

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
}

impl FromStr for Selector {
    type Err = InvalidSelector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || InvalidSelector(s.to_string());

        if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            return match inner.split_once('=') {
                Some((name, value)) => {
                    let name = name.trim();
                    let value = value.trim();
                    let value = value
                        .strip_prefix('"')
                        .and_then(|v| v.strip_suffix('"'))
                        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                        .unwrap_or(value);
                    if !is_ident(name) {
                        return Err(invalid());
                    }
                    Ok(Selector::AttrValue(name.to_ascii_lowercase(), value.to_string()))
                }
                None if is_ident(inner.trim()) => {
                    Ok(Selector::Attr(inner.trim().to_ascii_lowercase()))
                }
                None => Err(invalid()),
            };
        }
        if let Some(class) = s.strip_prefix('.') {
            return if is_ident(class) {
                Ok(Selector::Class(class.to_string()))
            } else {
                Err(invalid())
            };
        }
        if let Some(id) = s.strip_prefix('#') {
            return if is_ident(id) {
                Ok(Selector::Id(id.to_string()))
            } else {
                Err(invalid())
            };
        }
        match s.split_once('.') {
            Some((tag, class)) if is_ident(tag) && is_ident(class) => {
                Ok(Selector::TagClass(tag.to_ascii_lowercase(), class.to_string()))
            }
            Some(_) => Err(invalid()),
            None if is_ident(s) => Ok(Selector::Tag(s.to_ascii_lowercase())),
            None => Err(invalid()),
        }
    }
}

struct Element<'a> {
    name: String,
    attrs: Vec<(String, &'a str)>,
}

impl<'a> Element<'a> {
    fn parse(name: &str, attr_text: &'a str) -> Self {
        let attrs = ATTR
            .captures_iter(attr_text)
            .filter_map(|caps| {
                let name = caps.get(1)?.as_str().to_ascii_lowercase();
                let value = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .or_else(|| caps.get(4))
                    .map_or("", |m| m.as_str());
                Some((name, value))
            })
            .collect();
        Self {
            name: name.to_ascii_lowercase(),
            attrs,
        }
    }

    fn attr(&self, name: &str) -> Option<&'a str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|v| v.split_ascii_whitespace().any(|c| c == class))
    }

    fn matches(&self, selector: &Selector) -> bool {
        match selector {
            Selector::Tag(tag) => self.name == *tag,
            Selector::Class(class) => self.has_class(class),
            Selector::Id(id) => self.attr("id") == Some(id.as_str()),
            Selector::TagClass(tag, class) => self.name == *tag && self.has_class(class),
            Selector::Attr(name) => self.attr(name).is_some(),
            Selector::AttrValue(name, value) => self.attr(name) == Some(value.as_str()),
        }
    }
}

/// Host-declared regions that must never be converted.
///
/// [`ExclusionRules::apply`] wraps every matching element (start tag through
/// its matching end tag) in a fresh marker pair so the transformer skips it.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    selectors: Vec<Selector>,
    foreign_lang: bool,
}

impl ExclusionRules {
    pub fn new(selectors: Vec<Selector>, foreign_lang: bool) -> Self {
        Self {
            selectors,
            foreign_lang,
        }
    }

    /// Builds rules from selector strings; unsupported selectors are skipped
    /// with a warning.
    pub fn from_config<S: AsRef<str>>(selectors: &[S], foreign_lang: bool) -> Self {
        let selectors = selectors
            .iter()
            .filter_map(|s| match s.as_ref().parse::<Selector>() {
                Ok(sel) => Some(sel),
                Err(err) => {
                    tracing::warn!("{}", err);
                    None
                }
            })
            .collect();
        Self::new(selectors, foreign_lang)
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    fn excludes(&self, element: &Element<'_>) -> bool {
        if element.attr(NO_CONVERSION_ATTR).is_some() || element.has_class(NO_CONVERSION_CLASS) {
            return true;
        }
        if self.foreign_lang {
            if let Some(lang) = element.attr("lang") {
                let lang = lang.trim().to_ascii_lowercase();
                if !lang.is_empty() && !lang.starts_with("zh") {
                    return true;
                }
            }
        }
        self.selectors.iter().any(|sel| element.matches(sel))
    }

    /// Returns `html` with every excluded element wrapped in markers.
    ///
    /// Elements already inside a protected span are left alone. Nonces are
    /// unique within the pass and never reuse a nonce present in the input.
    pub fn apply(&self, html: &str) -> String {
        if !html.contains('<') {
            return html.to_string();
        }
        let existing = protected_ranges(html).unwrap_or_default();
        let regions = self.find_regions(html, &existing);
        if regions.is_empty() {
            return html.to_string();
        }

        let mut nonces = NonceSource::new(html);
        let mut out = String::with_capacity(html.len() + regions.len() * 48);
        let mut pos = 0;
        for region in regions {
            let nonce = nonces.next_nonce();
            out.push_str(&html[pos..region.start]);
            out.push_str(&start_marker(&nonce));
            out.push_str(&html[region.clone()]);
            out.push_str(&end_marker(&nonce));
            pos = region.end;
        }
        out.push_str(&html[pos..]);
        out
    }

    /// Outermost excluded element ranges, in document order.
    fn find_regions(&self, html: &str, existing: &[Range<usize>]) -> Vec<Range<usize>> {
        let tags: Vec<_> = TAG.captures_iter(html).collect();
        let mut regions = Vec::new();
        let mut covered_until = 0usize;

        for (idx, caps) in tags.iter().enumerate() {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() < covered_until || &caps[1] == "/" {
                continue;
            }
            if existing.iter().any(|r| r.contains(&whole.start())) {
                continue;
            }
            let attr_text = caps.get(3).map_or("", |m| m.as_str());
            let element = Element::parse(&caps[2], attr_text);
            if !self.excludes(&element) {
                continue;
            }

            let self_closing = attr_text.trim_end().ends_with('/');
            let end = if self_closing || VOID_ELEMENTS.contains(&element.name.as_str()) {
                Some(whole.end())
            } else {
                matching_close(&tags[idx + 1..], &element.name)
            };
            match end {
                Some(end) if !existing.iter().any(|r| r.start < end && whole.start() < r.end) => {
                    regions.push(whole.start()..end);
                    covered_until = end;
                }
                Some(_) => {
                    tracing::debug!(tag = %element.name, "excluded element overlaps a protected span");
                }
                None => {
                    tracing::debug!(tag = %element.name, "excluded element is never closed");
                }
            }
        }
        regions
    }
}

/// End offset of the close tag balancing an open `name` tag.
fn matching_close(rest: &[regex::Captures<'_>], name: &str) -> Option<usize> {
    let mut depth = 1usize;
    for caps in rest {
        if !caps[2].eq_ignore_ascii_case(name) {
            continue;
        }
        if &caps[1] == "/" {
            depth -= 1;
            if depth == 0 {
                return caps.get(0).map(|m| m.end());
            }
        } else if !caps[3].trim_end().ends_with('/') {
            depth += 1;
        }
    }
    None
}

/// Alphanumeric nonces unique within one pass and absent from the input.
struct NonceSource {
    base: String,
    counter: u32,
    taken: FxHashSet<String>,
}

impl NonceSource {
    fn new(text: &str) -> Self {
        let taken = START_MARKER
            .captures_iter(text)
            .map(|caps| caps[1].to_string())
            .collect();
        let base = blake3::hash(text.as_bytes()).to_hex()[..8].to_string();
        Self {
            base,
            counter: 0,
            taken,
        }
    }

    fn next_nonce(&mut self) -> String {
        loop {
            self.counter += 1;
            let nonce = format!("x{}{}", self.base, self.counter);
            if self.taken.insert(nonce.clone()) {
                return nonce;
            }
        }
    }
}
