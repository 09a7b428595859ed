use std::sync::Arc;
use zhvariant::{
    AddressingStyle, Config, DetectionMode, Dictionary, Pipeline, RequestContext,
    RequestSignals, SideEffect, Source, State, Variant,
};

fn dictionary() -> Dictionary {
    Dictionary::new()
        .with_pairs("st_phrases", [("头发", "頭髮"), ("软件", "軟件")])
        .with_pairs("st_characters", [("头", "頭"), ("发", "發"), ("软", "軟"), ("里", "裡")])
        .with_pairs("tw_phrases", [("軟件", "軟體")])
        .with_pairs("tw_variants", [("裡", "裏")])
        .with_pairs("ts_phrases", [("頭髮", "头发")])
        .with_pairs("ts_characters", [("頭", "头"), ("發", "发"), ("髮", "发")])
}

fn pipeline(json: &str) -> Pipeline {
    let config = Config::from_json_str(json).unwrap();
    Pipeline::new(config, Arc::new(dictionary())).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_match_wins() {
        let dict = Dictionary::new()
            .with_pairs("st_phrases", [("AB", "X")])
            .with_pairs("st_characters", [("A", "Y")]);
        let config = Config::from_json_str(r#"{"enabled": ["zh-hant"]}"#).unwrap();
        let pipeline = Pipeline::new(config, Arc::new(dict)).unwrap();
        // Non-Han input skips lookup entirely; use Han-bearing text.
        assert_eq!(pipeline.convert("AB中", Variant::ZhHant), "X中");
    }

    #[test]
    fn regional_rounds_chain() {
        let p = pipeline(r#"{"enabled": ["zh-tw", "zh-hant"]}"#);
        assert_eq!(p.convert("软件里的头发", Variant::ZhTw), "軟體裏的頭髮");
        assert_eq!(p.convert("软件里的头发", Variant::ZhHant), "軟件裡的頭髮");
    }

    #[test]
    fn no_variant_passes_through() {
        let p = pipeline(r#"{"enabled": ["zh-tw"]}"#);
        let ctx = p.begin_request(&RequestSignals {
            url: "http://localhost/posts/1/",
            ..Default::default()
        });
        assert_eq!(ctx.resolution.state, State::Resolved(None));
        assert_eq!(p.convert_fragment(&ctx, "头发"), "头发");
        assert_eq!(p.convert_document(&ctx, "<p>头发</p>"), "<p>头发</p>");
        assert_eq!(
            p.convert_fragment(&RequestContext::passthrough("/"), "头发"),
            "头发"
        );
    }

    #[test]
    fn protected_spans_are_verbatim() {
        let p = pipeline(r#"{"enabled": ["zh-tw"]}"#);
        let text = "头发<!--NC7_START-->头发<!--NCz_START-->发<!--NCz_END--><!--NC7_END-->头发";
        assert_eq!(
            p.convert(text, Variant::ZhTw),
            "頭髮<!--NC7_START-->头发<!--NCz_START-->发<!--NCz_END--><!--NC7_END-->頭髮"
        );
        // Malformed markers: the whole buffer is converted.
        assert_eq!(
            p.convert("头<!--NC1_START-->发", Variant::ZhTw),
            "頭<!--NC1_START-->發"
        );
    }

    #[test]
    fn document_conversion_protects_and_rewrites_links() {
        let p = pipeline(
            r#"{
                "enabled": ["zh-tw", "zh-cn"],
                "style": "suffix",
                "home_url": "https://example.com/",
                "exclude_selectors": ["code"]
            }"#,
        );
        let ctx = p.begin_request(&RequestSignals {
            url: "https://example.com/posts/1/zh-tw/",
            ..Default::default()
        });
        assert_eq!(ctx.variant(), Some(Variant::ZhTw));
        assert_eq!(ctx.canonical_url, "https://example.com/posts/1/");
        assert_eq!(
            ctx.alternate_urls,
            vec![
                (Variant::ZhCn, "https://example.com/posts/1/zh-cn/".to_string()),
                (Variant::ZhTw, "https://example.com/posts/1/zh-tw/".to_string()),
            ]
        );

        let html = r#"<p>头发 <a href="/about/">软件</a></p><code>头发</code><a href="https://other.org/">发</a>"#;
        let out = p.convert_document(&ctx, html);
        assert!(out.contains(r#"<p>頭髮 <a href="/about/zh-tw/">軟體</a></p>"#));
        assert!(out.contains("<code>头发</code>"));
        assert!(out.contains(r#"<a href="https://other.org/">發</a>"#));
    }

    #[test]
    fn param_beats_cookie_and_sets_it() {
        let p = pipeline(
            r#"{"enabled": ["zh-tw", "zh-cn"], "cookie_mode": "display", "cookie_suffix": "s"}"#,
        );
        let ctx = p.begin_request(&RequestSignals {
            url: "http://localhost/?variant=zh-cn",
            cookie: Some("zh-tw"),
            ..Default::default()
        });
        assert_eq!(ctx.variant(), Some(Variant::ZhCn));
        assert_eq!(ctx.resolution.source, Source::Param);
        assert!(matches!(
            ctx.effects(),
            [SideEffect::SetCookie { name, value, .. }] if name == "zhvariant_variant_s" && value == "zh-cn"
        ));
    }

    #[test]
    fn browser_redirect_round_trip() {
        let config = Config {
            enabled: [Variant::ZhTw].into_iter().collect(),
            browser_mode: DetectionMode::Redirect,
            style: AddressingStyle::Prefix,
            home_url: "https://example.com/".into(),
            ..Config::default()
        };
        let p = Pipeline::new(config, Arc::new(dictionary())).unwrap();
        let browser = Some("Mozilla/5.0 (Macintosh) Safari/605.1.15");

        let first = p.begin_request(&RequestSignals {
            url: "https://example.com/about/",
            accept_language: Some("zh-Hant-TW,en;q=0.5"),
            user_agent: browser,
            ..Default::default()
        });
        assert_eq!(first.redirect(), Some("https://example.com/zh-tw/about/"));

        let second = p.begin_request(&RequestSignals {
            url: "https://example.com/zh-tw/about/",
            accept_language: Some("zh-Hant-TW,en;q=0.5"),
            user_agent: browser,
            ..Default::default()
        });
        assert_eq!(second.variant(), Some(Variant::ZhTw));
        assert_eq!(second.canonical_url, "https://example.com/about/");
    }

    #[test]
    fn search_terms_cover_enabled_spellings() {
        let p = pipeline(r#"{"enabled": ["zh-cn", "zh-tw"]}"#);
        assert_eq!(p.search_terms("头发"), vec!["头发".to_string(), "頭髮".to_string()]);
        assert_eq!(p.search_terms("hello"), vec!["hello".to_string()]);
    }

    #[test]
    fn cache_remembers_conversions() {
        let p = pipeline(r#"{"enabled": ["zh-tw"]}"#);
        assert_eq!(p.convert("头发", Variant::ZhTw), "頭髮");
        assert_eq!(p.convert("头发", Variant::ZhTw), "頭髮");
        let stats = p.cache().stats();
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.hits, 1);
        p.cache().clear();
        assert_eq!(p.cache().stats().size, 0);
    }

    #[test]
    fn missing_tables_pass_through() {
        let config = Config::from_json_str(r#"{"enabled": ["zh-hk"], "engine": "char_mapping"}"#)
            .unwrap();
        let p = Pipeline::new(config, Arc::new(Dictionary::new())).unwrap();
        assert_eq!(p.convert("头发", Variant::ZhHk), "头发");
    }

    #[test]
    fn file_backed_cache_is_shared_across_pipelines() {
        let dir = tempfile::tempdir().unwrap();
        let json = format!(
            r#"{{"enabled": ["zh-tw"], "cache": {{"store_dir": {:?}}}}}"#,
            dir.path().to_string_lossy()
        );
        let first = pipeline(&json);
        assert_eq!(first.convert("头发", Variant::ZhTw), "頭髮");

        // An engine without tables can still serve the cached result.
        let config = Config::from_json_str(&json).unwrap();
        let second = Pipeline::new(config, Arc::new(Dictionary::new())).unwrap();
        assert_eq!(second.convert("头发", Variant::ZhTw), "頭髮");
    }
}
