use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;
use url::{Position, Url};

use crate::config::{AddressingStyle, Config};
use crate::error::ConfigError;
use crate::variant::{EnabledVariants, Variant, NO_CONVERSION};

/// Query parameter carrying the variant code.
pub const QUERY_VAR: &str = "variant";

static ANCHOR_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(<a\s[^>]*?\bhref\s*=\s*)(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

/// A link the rewriter may touch.
struct Target {
    url: Url,
    /// Given as a root-relative path; rendered back without origin.
    relative: bool,
}

/// Path split around the site base (and multisite segment).
struct PathParts {
    head: String,
    segments: Vec<String>,
    trailing_slash: bool,
}

impl PathParts {
    fn render(&self) -> String {
        let mut path = self.head.clone();
        path.push_str(&self.segments.join("/"));
        if !self.segments.is_empty() && self.trailing_slash {
            path.push('/');
        }
        path
    }
}

/// Rewrites same-site links to carry a variant under one addressing style.
#[derive(Debug, Clone)]
pub struct LinkRewriter {
    home: Url,
    base_path: String,
    style: AddressingStyle,
    enabled: EnabledVariants,
    subsites: Vec<String>,
}

impl LinkRewriter {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let home = config.home()?;
        let mut base_path = home.path().to_string();
        if !base_path.ends_with('/') {
            base_path.push('/');
        }
        Ok(Self {
            home,
            base_path,
            style: config.style,
            enabled: config.enabled,
            subsites: config.subsites.clone(),
        })
    }

    pub fn style(&self) -> AddressingStyle {
        self.style
    }

    /// Returns `url` addressed to `variant`.
    ///
    /// Links that already carry `variant`, foreign links, non-http(s) links,
    /// fragment-only links and unparsable input come back unchanged.
    pub fn rewrite_link(&self, url: &str, variant: Variant) -> String {
        let Some(mut target) = self.target(url) else {
            return url.to_string();
        };
        if self.code_in(&target.url).as_deref() == Some(variant.code()) {
            return url.to_string();
        }
        self.strip(&mut target.url);

        let use_query = self.style == AddressingStyle::Query || target.url.query().is_some();
        if use_query {
            target.url.query_pairs_mut().append_pair(QUERY_VAR, variant.code());
        } else if let Some(mut parts) = self.path_parts(target.url.path()) {
            match self.style {
                AddressingStyle::Suffix => parts.segments.push(variant.code().to_string()),
                AddressingStyle::Prefix => parts.segments.insert(0, variant.code().to_string()),
                AddressingStyle::Query => {}
            }
            if parts.segments.len() == 1 {
                parts.trailing_slash = true;
            }
            target.url.set_path(&parts.render());
        }
        self.finish(&target)
    }

    /// Returns `url` without any variant, i.e. the canonical no-conversion URL.
    pub fn strip_variant(&self, url: &str) -> String {
        let Some(mut target) = self.target(url) else {
            return url.to_string();
        };
        if self.code_in(&target.url).is_none() {
            return url.to_string();
        }
        self.strip(&mut target.url);
        self.finish(&target)
    }

    /// `url` addressed to every enabled variant, in catalog order.
    pub fn alternate_urls(&self, url: &str) -> Vec<(Variant, String)> {
        let canonical = self.strip_variant(url);
        self.enabled
            .iter()
            .map(|v| (v, self.rewrite_link(&canonical, v)))
            .collect()
    }

    /// The enabled variant `url` carries, if any.
    pub fn variant_in(&self, url: &str) -> Option<Variant> {
        self.requested_code(url)
            .and_then(|code| self.enabled.lookup(&code))
    }

    /// Raw variant code carried by `url`, including the no-conversion sentinel
    /// and codes that are not enabled.
    pub fn requested_code(&self, url: &str) -> Option<String> {
        let target = self.target(url)?;
        self.code_in(&target.url)
    }

    /// Rewrites the `href` of every anchor in `html`.
    pub fn rewrite_links_in_html<'h>(&self, html: &'h str, variant: Variant) -> Cow<'h, str> {
        ANCHOR_HREF.replace_all(html, |caps: &Captures<'_>| {
            let (quote, raw) = match (caps.get(2), caps.get(3)) {
                (Some(m), _) => ('"', m.as_str()),
                (None, Some(m)) => ('\'', m.as_str()),
                (None, None) => return caps[0].to_string(),
            };
            let decoded = raw.replace("&amp;", "&");
            let rewritten = self.rewrite_link(&decoded, variant);
            let href = if rewritten == decoded {
                raw.to_string()
            } else {
                rewritten.replace('&', "&amp;")
            };
            format!("{}{quote}{href}{quote}", &caps[1])
        })
    }

    fn target(&self, raw: &str) -> Option<Target> {
        let raw = raw.trim();
        let relative = raw.starts_with('/') && !raw.starts_with("//");
        let url = if relative {
            self.home.join(raw).ok()?
        } else {
            let url = Url::parse(raw).ok()?;
            if !matches!(url.scheme(), "http" | "https")
                || url.host_str() != self.home.host_str()
                || url.port_or_known_default() != self.home.port_or_known_default()
            {
                return None;
            }
            url
        };
        self.path_parts(url.path())?;
        Some(Target { url, relative })
    }

    fn finish(&self, target: &Target) -> String {
        if target.relative {
            target.url[Position::BeforePath..].to_string()
        } else {
            target.url.to_string()
        }
    }

    fn path_parts(&self, path: &str) -> Option<PathParts> {
        let rest = if let Some(rest) = path.strip_prefix(self.base_path.as_str()) {
            rest
        } else if format!("{path}/") == self.base_path {
            ""
        } else {
            return None;
        };
        let mut segments: Vec<String> = rest
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let trailing_slash = rest.is_empty() || rest.ends_with('/');

        let mut head = self.base_path.clone();
        if let Some(first) = segments.first() {
            if self.subsites.iter().any(|s| s == first) {
                head.push_str(first);
                head.push('/');
                segments.remove(0);
            }
        }
        Some(PathParts {
            head,
            segments,
            trailing_slash,
        })
    }

    /// Index of the path segment that holds a variant under the current style.
    fn path_code_index(&self, parts: &PathParts) -> Option<usize> {
        let idx = match self.style {
            AddressingStyle::Query => return None,
            AddressingStyle::Suffix => parts.segments.len().checked_sub(1)?,
            AddressingStyle::Prefix => 0,
        };
        let segment = parts.segments.get(idx)?;
        Variant::from_code(segment).map(|_| idx)
    }

    fn code_in(&self, url: &Url) -> Option<String> {
        if let Some((_, value)) = url.query_pairs().find(|(k, _)| k == QUERY_VAR) {
            let value = value.trim().to_ascii_lowercase();
            if value == NO_CONVERSION || Variant::from_code(&value).is_some() {
                return Some(value);
            }
        }
        let parts = self.path_parts(url.path())?;
        let idx = self.path_code_index(&parts)?;
        Some(parts.segments[idx].to_ascii_lowercase())
    }

    fn strip(&self, url: &mut Url) {
        if url.query().is_some() {
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            let kept: Vec<&(String, String)> = pairs.iter().filter(|(k, _)| k != QUERY_VAR).collect();
            // Untouched queries keep their original encoding.
            if kept.len() != pairs.len() {
                if kept.is_empty() {
                    url.set_query(None);
                } else {
                    url.query_pairs_mut()
                        .clear()
                        .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                }
            }
        }
        if let Some(mut parts) = self.path_parts(url.path()) {
            if let Some(idx) = self.path_code_index(&parts) {
                parts.segments.remove(idx);
                url.set_path(&parts.render());
            }
        }
    }
}
