//! Per-request variant resolution.
//!
//! [`Resolver::resolve`] walks the competing signals of one request in a fixed
//! precedence and returns the final [`State`] together with the side effects
//! (cookies, search conversion) the host must apply. Nothing is read from or
//! written to ambient state.

pub mod accept_language;
pub mod agent;

use std::time::Duration;

use crate::config::{Config, DetectionMode, SearchConversion};
use crate::diagnostics::{self, DiagnosticKind};
use crate::error::ConfigError;
use crate::routing::LinkRewriter;
use crate::variant::{EnabledVariants, Variant, NO_CONVERSION};

/// Lifetime of the remembered-variant cookie.
pub const COOKIE_MAX_AGE: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// What the host observed about the incoming request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSignals<'a> {
    /// Full request URL, used to build redirect targets.
    pub url: &'a str,
    /// Variant named by the query parameter or extracted by the route table.
    pub param: Option<&'a str>,
    /// Value of the remembered-variant cookie.
    pub cookie: Option<&'a str>,
    /// Whether the "just redirected" session marker is present.
    pub redirect_marker: bool,
    pub accept_language: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// Never returned by [`Resolver::resolve`]; hosts that track a request
    /// before resolving it start here.
    Undetermined,
    /// `None` serves the original, unconverted content.
    Resolved(Option<Variant>),
    Redirecting(String),
}

/// Which signal decided the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Param,
    Sentinel,
    RedirectMarker,
    Cookie,
    Browser,
    Default,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Param => "param",
            Source::Sentinel => "sentinel",
            Source::RedirectMarker => "redirect_marker",
            Source::Cookie => "cookie",
            Source::Browser => "browser",
            Source::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    SetCookie {
        name: String,
        value: String,
        max_age: Duration,
    },
    /// Session cookie; no max-age.
    SetRedirectMarker { name: String },
    ClearRedirectMarker { name: String },
    /// Search queries should match every variant spelling.
    ConvertSearch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub state: State,
    pub source: Source,
    pub effects: Vec<SideEffect>,
}

impl Resolution {
    /// The variant to convert to, if the request is served here.
    pub fn variant(&self) -> Option<Variant> {
        match self.state {
            State::Resolved(variant) => variant,
            _ => None,
        }
    }

    pub fn redirect(&self) -> Option<&str> {
        match &self.state {
            State::Redirecting(url) => Some(url),
            _ => None,
        }
    }
}

/// A remembered cookie value.
enum Remembered {
    Variant(Variant),
    NoConversion,
}

pub struct Resolver {
    enabled: EnabledVariants,
    cookie_mode: DetectionMode,
    browser_mode: DetectionMode,
    family_fallback: bool,
    search: SearchConversion,
    variant_cookie: String,
    redirect_cookie: String,
    links: LinkRewriter,
}

impl Resolver {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: config.enabled,
            cookie_mode: config.cookie_mode,
            browser_mode: config.browser_mode,
            family_fallback: config.family_fallback,
            search: config.search_conversion,
            variant_cookie: config.variant_cookie_name(),
            redirect_cookie: config.redirect_cookie_name(),
            links: LinkRewriter::new(config)?,
        })
    }

    pub fn resolve(&self, signals: &RequestSignals<'_>) -> Resolution {
        let mut effects = Vec::new();
        let (state, source) = self.decide(signals, &mut effects);

        if let State::Resolved(Some(variant)) = state {
            if self.cookie_mode != DetectionMode::Off && signals.cookie != Some(variant.code()) {
                effects.push(self.set_cookie(variant.code()));
            }
        }
        let wants_search = match self.search {
            SearchConversion::Off => false,
            SearchConversion::Always => true,
            SearchConversion::OnlyWhenVariant => matches!(state, State::Resolved(Some(_))),
        };
        if wants_search {
            effects.push(SideEffect::ConvertSearch);
        }

        tracing::debug!(source = source.as_str(), state = ?state, "resolved request variant");
        Resolution {
            state,
            source,
            effects,
        }
    }

    fn decide(&self, signals: &RequestSignals<'_>, effects: &mut Vec<SideEffect>) -> (State, Source) {
        if let Some(param) = signals.param.map(str::trim).filter(|p| !p.is_empty()) {
            if param.eq_ignore_ascii_case(NO_CONVERSION) {
                let canonical = self.links.strip_variant(signals.url);
                if self.cookie_mode != DetectionMode::Off {
                    effects.push(self.set_cookie(NO_CONVERSION));
                } else {
                    effects.push(SideEffect::SetRedirectMarker {
                        name: self.redirect_cookie.clone(),
                    });
                }
                // Outside the site's address space nothing can be stripped.
                if canonical == signals.url {
                    return (State::Resolved(None), Source::Sentinel);
                }
                return (State::Redirecting(canonical), Source::Sentinel);
            }
            match self.enabled.lookup(param) {
                Some(variant) => return (State::Resolved(Some(variant)), Source::Param),
                None => {
                    diagnostics::report(
                        DiagnosticKind::InvalidVariant,
                        &format!("ignoring variant parameter {param:?}"),
                    );
                }
            }
        }

        if signals.redirect_marker {
            effects.push(SideEffect::ClearRedirectMarker {
                name: self.redirect_cookie.clone(),
            });
            return (State::Resolved(None), Source::RedirectMarker);
        }

        if self.cookie_mode != DetectionMode::Off {
            match signals.cookie.and_then(|c| self.remembered(c)) {
                Some(Remembered::NoConversion) => {
                    return (State::Resolved(None), Source::Cookie);
                }
                Some(Remembered::Variant(variant)) => {
                    let state = self.apply_mode(self.cookie_mode, variant, signals.url);
                    return (state, Source::Cookie);
                }
                None => {}
            }
        }

        if self.browser_mode != DetectionMode::Off && !agent::is_automated(signals.user_agent) {
            let detected = signals
                .accept_language
                .and_then(|h| accept_language::negotiate(h, self.enabled, self.family_fallback));
            if let Some(variant) = detected {
                let state = self.apply_mode(self.browser_mode, variant, signals.url);
                return (state, Source::Browser);
            }
        }

        (State::Resolved(None), Source::Default)
    }

    fn remembered(&self, cookie: &str) -> Option<Remembered> {
        let cookie = cookie.trim();
        if cookie.eq_ignore_ascii_case(NO_CONVERSION) {
            return Some(Remembered::NoConversion);
        }
        let variant = self.enabled.lookup(cookie);
        if variant.is_none() && !cookie.is_empty() {
            diagnostics::report(
                DiagnosticKind::InvalidVariant,
                &format!("ignoring remembered variant {cookie:?}"),
            );
        }
        variant.map(Remembered::Variant)
    }

    fn apply_mode(&self, mode: DetectionMode, variant: Variant, url: &str) -> State {
        if mode == DetectionMode::Redirect {
            let target = self.links.rewrite_link(url, variant);
            // A URL the rewriter cannot address would redirect to itself.
            if target != url {
                return State::Redirecting(target);
            }
        }
        State::Resolved(Some(variant))
    }

    fn set_cookie(&self, value: &str) -> SideEffect {
        SideEffect::SetCookie {
            name: self.variant_cookie.clone(),
            value: value.to_string(),
            max_age: COOKIE_MAX_AGE,
        }
    }
}
