#[cfg(test)]
mod tests {
    use zhvariant::routing::RouteCache;
    use zhvariant::{
        compile_routes, AddressingStyle, Config, EnabledVariants, LinkRewriter, RouteRule, Variant,
    };

    const STYLES: [AddressingStyle; 3] = [
        AddressingStyle::Query,
        AddressingStyle::Suffix,
        AddressingStyle::Prefix,
    ];

    fn enabled() -> EnabledVariants {
        [Variant::ZhCn, Variant::ZhTw].into_iter().collect()
    }

    fn rewriter(style: AddressingStyle) -> LinkRewriter {
        let config = Config {
            enabled: enabled(),
            style,
            home_url: "https://example.com/".into(),
            ..Config::default()
        };
        LinkRewriter::new(&config).unwrap()
    }

    #[test]
    fn suffix_scenario_compiles_root_first() {
        let base = vec![RouteRule::new(r"^posts/(\d+)/?$", "index?post=$1")];
        let table = compile_routes(&base, enabled(), &[], AddressingStyle::Suffix);
        assert_eq!(
            table.rules(),
            &[
                RouteRule::new("^(zh-cn|zh-tw)/?$", "index?variant=$1"),
                RouteRule::new(r"^posts/(\d+)/(zh-cn|zh-tw)/?$", "index?post=$1&variant=$2"),
                RouteRule::new(r"^posts/(\d+)/?$", "index?post=$1"),
            ]
        );
    }

    #[test]
    fn compilation_is_deterministic() {
        let base = vec![
            RouteRule::new(r"^posts/(\d+)/?$", "index?post=$1"),
            RouteRule::new(r"^tag/([^/]+)/?$", "index?tag=$1"),
        ];
        for style in STYLES {
            let a = compile_routes(&base, enabled(), &[], style);
            let b = compile_routes(&base, enabled(), &[], style);
            assert_eq!(a, b);
            assert_eq!(a.rules()[0].pattern, "^(zh-cn|zh-tw)/?$");
            // Every base rule survives unchanged at the tail.
            assert_eq!(&a.rules()[a.len() - base.len()..], base.as_slice());
        }
    }

    #[test]
    fn rewritten_links_route_back_to_their_variant() {
        let base = vec![RouteRule::new(r"^posts/(\d+)/?$", "index.php?p=$1")];
        for style in [AddressingStyle::Suffix, AddressingStyle::Prefix] {
            let table = compile_routes(&base, enabled(), &[], style);
            let link = rewriter(style).rewrite_link("https://example.com/posts/7/", Variant::ZhTw);
            let path = link.trim_start_matches("https://example.com");
            let hit = table.match_path(path).unwrap();
            assert_eq!(hit.variant_code(), Some("zh-tw"), "{style:?}: {link}");
            assert!(hit.target.contains("p=7"));
        }
    }

    #[test]
    fn link_rewrite_is_idempotent_for_every_style() {
        let links = [
            "https://example.com/",
            "https://example.com/posts/1/",
            "https://example.com/posts/1",
            "https://example.com/?s=query",
            "/relative/path/",
            "https://example.com/posts/1/?variant=zh-cn",
        ];
        for style in STYLES {
            let r = rewriter(style);
            for link in links {
                for variant in enabled().iter() {
                    let once = r.rewrite_link(link, variant);
                    assert_eq!(r.rewrite_link(&once, variant), once, "{style:?} {link}");
                    assert_eq!(r.variant_in(&once), Some(variant), "{style:?} {link}");
                }
            }
        }
    }

    #[test]
    fn strip_undoes_rewrite() {
        for style in STYLES {
            let r = rewriter(style);
            let canonical = "https://example.com/posts/1/";
            let rewritten = r.rewrite_link(canonical, Variant::ZhCn);
            assert_ne!(rewritten, canonical);
            assert_eq!(r.strip_variant(&rewritten), canonical);
        }
    }

    #[test]
    fn route_cache_shares_tables() {
        let cache = RouteCache::new();
        let base = vec![RouteRule::new(r"^posts/(\d+)/?$", "index?post=$1")];
        let reserved = vec!["zh-sg".to_string()];
        let a = cache.get_or_compile(&base, enabled(), &reserved, AddressingStyle::Prefix);
        let b = cache.get_or_compile(&base, enabled(), &reserved, AddressingStyle::Prefix);
        assert!(std::sync::Arc::ptr_eq(&a, &b));
        assert_eq!(a.rules()[0].pattern, "^(zh-cn|zh-tw|zh-sg)/?$");
        let c = cache.get_or_compile(&base, enabled(), &[], AddressingStyle::Prefix);
        assert!(!std::sync::Arc::ptr_eq(&a, &c));
    }
}
