//! On-the-fly Chinese variant conversion for served documents.
//!
//! A [`Pipeline`] resolves the target variant of each request, converts text
//! outside protected zones through a cached conversion engine, and rewrites
//! same-site links and route tables for the enabled variants.
//!
//! ```
//! use std::sync::Arc;
//! use zhvariant::{Config, Dictionary, Pipeline, RequestSignals, Variant};
//!
//! let dictionary = Dictionary::new()
//!     .with_pairs("st_phrases", [("头发", "頭髮")])
//!     .with_pairs("st_characters", [("发", "發")]);
//! let config = Config::from_json_str(r#"{"enabled": ["zh-hant"]}"#).unwrap();
//! let pipeline = Pipeline::new(config, Arc::new(dictionary)).unwrap();
//!
//! let ctx = pipeline.begin_request(&RequestSignals {
//!     url: "http://localhost/?variant=zh-hant",
//!     ..Default::default()
//! });
//! assert_eq!(ctx.variant(), Some(Variant::ZhHant));
//! assert_eq!(pipeline.convert_fragment(&ctx, "头发发"), "頭髮發");
//! ```

pub mod cache;
pub mod config;
pub mod converter;
pub mod diagnostics;
pub mod dictionary_lib;
pub mod error;
pub mod protect;
pub mod resolver;
pub mod routing;
pub mod utils;
pub mod variant;

use std::sync::Arc;

pub use crate::cache::{CacheStats, ConversionCache};
pub use crate::config::{AddressingStyle, Config, DetectionMode, SearchConversion};
pub use crate::converter::{Converter, Engine, EngineKind};
pub use crate::dictionary_lib::Dictionary;
pub use crate::error::{ConfigError, ConvertError, DictionaryError, StoreError};
pub use crate::resolver::{RequestSignals, Resolution, SideEffect, Source, State};
pub use crate::routing::{compile_routes, LinkRewriter, RouteRule, RouteTable};
pub use crate::variant::{EnabledVariants, Variant, NO_CONVERSION};

use crate::cache::FileStore;
use crate::converter::convert_or_passthrough;
use crate::diagnostics::DiagnosticKind;
use crate::protect::ExclusionRules;
use crate::resolver::Resolver;
use crate::routing::RouteCache;

/// Everything decided for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub resolution: Resolution,
    /// The request URL without any variant.
    pub canonical_url: String,
    /// The request URL for every enabled variant, in catalog order.
    pub alternate_urls: Vec<(Variant, String)>,
}

impl RequestContext {
    /// A context that serves original content.
    pub fn passthrough(url: &str) -> Self {
        Self {
            resolution: Resolution {
                state: State::Resolved(None),
                source: Source::Default,
                effects: Vec::new(),
            },
            canonical_url: url.to_string(),
            alternate_urls: Vec::new(),
        }
    }

    pub fn variant(&self) -> Option<Variant> {
        self.resolution.variant()
    }

    pub fn redirect(&self) -> Option<&str> {
        self.resolution.redirect()
    }

    pub fn effects(&self) -> &[SideEffect] {
        &self.resolution.effects
    }
}

pub struct Pipeline {
    config: Config,
    engine: Engine,
    cache: ConversionCache,
    exclusions: ExclusionRules,
    resolver: Resolver,
    links: LinkRewriter,
    routes: RouteCache,
}

impl Pipeline {
    pub fn new(config: Config, dictionary: Arc<Dictionary>) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut cache = ConversionCache::new(config.cache.capacity, config.cache.ttl());
        if let Some(dir) = &config.cache.store_dir {
            match FileStore::open(dir) {
                Ok(store) => cache = cache.with_shared_store(Arc::new(store)),
                Err(err) => {
                    diagnostics::report(DiagnosticKind::CacheUnreachable, &err.to_string());
                }
            }
        }

        let engine = Engine::new(config.engine, dictionary);
        let supported = engine.supported_variants();
        for variant in config.enabled.iter().filter(|v| !supported.contains(*v)) {
            tracing::warn!(variant = %variant, engine = ?config.engine, "enabled variant has no conversion tables");
        }

        Ok(Self {
            exclusions: ExclusionRules::from_config(
                &config.exclude_selectors,
                config.exclude_foreign_lang,
            ),
            resolver: Resolver::new(&config)?,
            links: LinkRewriter::new(&config)?,
            routes: RouteCache::new(),
            engine,
            cache,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn cache(&self) -> &ConversionCache {
        &self.cache
    }

    pub fn links(&self) -> &LinkRewriter {
        &self.links
    }

    /// Resolves the request's variant. A missing `param` is taken from the
    /// request URL.
    pub fn begin_request(&self, signals: &RequestSignals<'_>) -> RequestContext {
        let mut signals = *signals;
        let extracted;
        if signals.param.is_none() {
            extracted = self.links.requested_code(signals.url);
            signals.param = extracted.as_deref();
        }

        RequestContext {
            resolution: self.resolver.resolve(&signals),
            canonical_url: self.links.strip_variant(signals.url),
            alternate_urls: self.links.alternate_urls(signals.url),
        }
    }

    /// Converts `text` to `variant`, skipping protected spans.
    pub fn convert(&self, text: &str, variant: Variant) -> String {
        protect::transform(text, |segment| self.convert_segment(segment, variant))
    }

    fn convert_segment(&self, segment: &str, variant: Variant) -> String {
        self.cache.get_or_insert_with(segment, variant, |s| {
            convert_or_passthrough(&self.engine, s, variant)
        })
    }

    /// Converts a text fragment for the request; unchanged when no variant applies.
    pub fn convert_fragment(&self, ctx: &RequestContext, text: &str) -> String {
        match ctx.variant() {
            Some(variant) => self.convert(text, variant),
            None => text.to_string(),
        }
    }

    /// Converts a full HTML document: excluded elements are protected first,
    /// then same-site anchors are rewritten and text converted outside
    /// protected spans.
    pub fn convert_document(&self, ctx: &RequestContext, html: &str) -> String {
        let Some(variant) = ctx.variant() else {
            return html.to_string();
        };
        let marked = self.exclusions.apply(html);
        protect::transform(&marked, |segment| {
            let linked = self.links.rewrite_links_in_html(segment, variant);
            self.convert_segment(&linked, variant)
        })
    }

    /// The query itself plus its spelling in every enabled variant, without
    /// duplicates.
    pub fn search_terms(&self, query: &str) -> Vec<String> {
        let mut terms = vec![query.to_string()];
        for variant in self.config.enabled.iter() {
            let converted = self.convert_segment(query, variant);
            if !terms.contains(&converted) {
                terms.push(converted);
            }
        }
        terms
    }

    /// Route table for `base` under the configured variants and style.
    pub fn routes(&self, base: &[RouteRule]) -> Arc<RouteTable> {
        self.routes.get_or_compile(
            base,
            self.config.enabled,
            &self.config.reserved_route_codes,
            self.config.style,
        )
    }

    /// Variant code the route table extracts from `path`, if any.
    pub fn route_variant(&self, base: &[RouteRule], path: &str) -> Option<String> {
        let table = self.routes(base);
        let hit = table.match_path(path)?;
        hit.variant_code().map(str::to_string)
    }
}
