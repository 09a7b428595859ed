//! Route derivation per addressing style, and link rewriting.
//!
//! [`compile_routes`] turns the host's base rewrite rules into a table that
//! also accepts a variant code in the URL. The table is a pure function of the
//! base rules, the enabled set, reserved codes and the style, so
//! [`RouteCache`] can memoize it for the life of the process.

mod link;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::{Captures, Regex};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use self::link::{LinkRewriter, QUERY_VAR};
use crate::config::AddressingStyle;
use crate::variant::EnabledVariants;

/// Entry script used for the variant root when no base rule names one.
pub const DEFAULT_ENTRY: &str = "index.php";

const SLASH_END: &str = "/?$";

static TARGET_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$matches\[(\d+)\]|\$(\d+)").unwrap());

/// One rewrite rule: a path pattern and the target it expands to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteRule {
    pub pattern: String,
    pub target: String,
}

impl RouteRule {
    pub fn new(pattern: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            target: target.into(),
        }
    }
}

/// How a target refers to capture groups.
#[derive(Clone, Copy)]
enum RefStyle {
    /// `$1`
    Dollar,
    /// `$matches[1]`
    Matches,
}

impl RefStyle {
    fn of(target: &str) -> Self {
        if target.contains("$matches[") {
            RefStyle::Matches
        } else {
            RefStyle::Dollar
        }
    }

    fn reference(self, group: usize) -> String {
        match self {
            RefStyle::Dollar => format!("${group}"),
            RefStyle::Matches => format!("$matches[{group}]"),
        }
    }
}

fn with_param(target: &str, value: &str) -> String {
    let sep = if target.contains('?') { '&' } else { '?' };
    format!("{target}{sep}{QUERY_VAR}={value}")
}

fn capture_groups(pattern: &str) -> Option<usize> {
    Regex::new(pattern).ok().map(|re| re.captures_len() - 1)
}

fn suffix_rule(rule: &RouteRule, alt: &str) -> Option<RouteRule> {
    let stem = rule.pattern.strip_suffix(SLASH_END)?;
    let groups = capture_groups(&rule.pattern)?;
    let style = RefStyle::of(&rule.target);
    Some(RouteRule {
        pattern: format!("{stem}/({alt}){SLASH_END}"),
        target: with_param(&rule.target, &style.reference(groups + 1)),
    })
}

fn prefix_rule(rule: &RouteRule, alt: &str) -> Option<RouteRule> {
    if !rule.pattern.ends_with(SLASH_END) {
        return None;
    }
    capture_groups(&rule.pattern)?;
    let body = rule.pattern.strip_prefix('^').unwrap_or(&rule.pattern);
    let style = RefStyle::of(&rule.target);
    let shifted = TARGET_REF.replace_all(&rule.target, |caps: &Captures<'_>| {
        match (caps.get(1), caps.get(2)) {
            (Some(n), _) => shift_ref(n.as_str(), RefStyle::Matches),
            (None, Some(n)) => shift_ref(n.as_str(), RefStyle::Dollar),
            (None, None) => caps[0].to_string(),
        }
    });
    Some(RouteRule {
        pattern: format!("^({alt})/{body}"),
        target: with_param(&shifted, &style.reference(1)),
    })
}

fn shift_ref(group: &str, style: RefStyle) -> String {
    match group.parse::<usize>() {
        Ok(n) => style.reference(n + 1),
        Err(_) => style.reference(0),
    }
}

fn root_rule(base: &[RouteRule], alt: &str) -> RouteRule {
    let (entry, style) = match base.first() {
        Some(rule) => {
            let entry = rule.target.split('?').next().unwrap_or(DEFAULT_ENTRY);
            let entry = if entry.is_empty() { DEFAULT_ENTRY } else { entry };
            (entry, RefStyle::of(&rule.target))
        }
        None => (DEFAULT_ENTRY, RefStyle::Dollar),
    };
    RouteRule {
        pattern: format!("^({alt}){SLASH_END}"),
        target: with_param(entry, &style.reference(1)),
    }
}

/// Variant alternation in catalog order, followed by reserved codes not
/// already present.
pub fn alternation(enabled: EnabledVariants, reserved: &[String]) -> String {
    let mut codes: Vec<&str> = enabled.iter().map(|v| v.code()).collect();
    for code in reserved {
        if !codes.contains(&code.as_str()) {
            codes.push(code.as_str());
        }
    }
    codes
        .iter()
        .map(|c| escape_code(c))
        .collect::<Vec<_>>()
        .join("|")
}

/// Like `regex::escape`, but leaves `-` alone so codes stay readable.
fn escape_code(code: &str) -> String {
    code.split('-')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("-")
}

/// Derives the full route table.
///
/// Order: the synthetic variant root, then the derived rules in base order,
/// then the base rules unchanged. Query style derives no rules beyond the root.
pub fn compile_routes(
    base: &[RouteRule],
    enabled: EnabledVariants,
    reserved: &[String],
    style: AddressingStyle,
) -> RouteTable {
    let alt = alternation(enabled, reserved);
    if alt.is_empty() {
        return RouteTable::new(base.to_vec());
    }

    let mut rules = Vec::with_capacity(base.len() * 2 + 1);
    rules.push(root_rule(base, &alt));
    for rule in base {
        let derived = match style {
            AddressingStyle::Query => None,
            AddressingStyle::Suffix => suffix_rule(rule, &alt),
            AddressingStyle::Prefix => prefix_rule(rule, &alt),
        };
        match derived {
            Some(derived) => rules.push(derived),
            None if style != AddressingStyle::Query => {
                tracing::debug!(pattern = %rule.pattern, "no variant route derived");
            }
            None => {}
        }
    }
    rules.extend(base.iter().cloned());
    RouteTable::new(rules)
}

/// A matched route with its target expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub index: usize,
    pub target: String,
}

impl RouteMatch {
    /// Value of the `variant` parameter in the expanded target.
    pub fn variant_code(&self) -> Option<&str> {
        let (_, query) = self.target.split_once('?')?;
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == QUERY_VAR).then_some(value)
        })
    }
}

/// Ordered rewrite rules, evaluated first-match-wins.
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
    compiled: Vec<Option<Regex>>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        let compiled = rules
            .iter()
            .map(|rule| match Regex::new(&rule.pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    tracing::warn!(pattern = %rule.pattern, "invalid route pattern: {}", err);
                    None
                }
            })
            .collect();
        Self { rules, compiled }
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Matches a request path (leading `/` optional) against the table.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch> {
        let path = path.strip_prefix('/').unwrap_or(path);
        self.compiled.iter().enumerate().find_map(|(index, re)| {
            let caps = re.as_ref()?.captures(path)?;
            let target = TARGET_REF
                .replace_all(&self.rules[index].target, |r: &Captures<'_>| {
                    let group = r
                        .get(1)
                        .or_else(|| r.get(2))
                        .and_then(|m| m.as_str().parse::<usize>().ok());
                    group
                        .and_then(|g| caps.get(g))
                        .map_or(String::new(), |m| m.as_str().to_string())
                })
                .into_owned();
            Some(RouteMatch { index, target })
        })
    }
}

impl PartialEq for RouteTable {
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct RouteKey {
    base: [u8; 32],
    enabled: u16,
    style: AddressingStyle,
}

impl RouteKey {
    fn new(base: &[RouteRule], enabled: EnabledVariants, reserved: &[String], style: AddressingStyle) -> Self {
        let mut hasher = blake3::Hasher::new();
        for rule in base {
            for part in [&rule.pattern, &rule.target] {
                hasher.update(&(part.len() as u64).to_le_bytes());
                hasher.update(part.as_bytes());
            }
        }
        hasher.update(b"\0reserved");
        for code in reserved {
            hasher.update(&(code.len() as u64).to_le_bytes());
            hasher.update(code.as_bytes());
        }
        Self {
            base: *hasher.finalize().as_bytes(),
            enabled: enabled.bits(),
            style,
        }
    }
}

/// Memoized compiled tables keyed by their inputs.
///
/// Concurrent misses may compile the same table twice; the results are equal.
#[derive(Default)]
pub struct RouteCache {
    tables: RwLock<FxHashMap<RouteKey, Arc<RouteTable>>>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(
        &self,
        base: &[RouteRule],
        enabled: EnabledVariants,
        reserved: &[String],
        style: AddressingStyle,
    ) -> Arc<RouteTable> {
        let key = RouteKey::new(base, enabled, reserved, style);
        if let Some(table) = self.tables.read().get(&key) {
            return table.clone();
        }
        let table = Arc::new(compile_routes(base, enabled, reserved, style));
        tracing::debug!(rules = table.len(), style = ?style, "compiled route table");
        self.tables.write().entry(key).or_insert(table).clone()
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }

    pub fn clear(&self) {
        self.tables.write().clear();
    }
}
