//! `Accept-Language` parsing and negotiation against the enabled variants.

use crate::variant::{EnabledVariants, Family, Variant};

/// Language tags in preference order, lowercased.
///
/// Entries are ordered by q-value, ties keep header order. `q=0`, wildcards
/// and entries with an unparsable q-value are dropped.
pub fn preferences(header: &str) -> Vec<String> {
    let mut ranges: Vec<(String, f32)> = header
        .split(',')
        .filter_map(|item| {
            let mut parts = item.split(';');
            let tag = parts.next()?.trim().to_ascii_lowercase().replace('_', "-");
            if tag.is_empty() || tag == "*" {
                return None;
            }
            let mut q = 1.0f32;
            for param in parts {
                let Some((key, value)) = param.split_once('=') else {
                    continue;
                };
                if key.trim().eq_ignore_ascii_case("q") {
                    q = value.trim().parse().ok().filter(|q: &f32| (0.0..=1.0).contains(q))?;
                }
            }
            (q > 0.0).then_some((tag, q))
        })
        .collect();
    // Stable sort keeps header order among equal weights.
    ranges.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranges.into_iter().map(|(tag, _)| tag).collect()
}

/// Variants a language tag may stand for, most specific first.
///
/// `zh-hant-tw` yields `zh-tw` then `zh-hant`; legacy `zh-chs`/`zh-cht`
/// map to the script variants.
pub fn candidates(tag: &str) -> Vec<Variant> {
    let mut out = Vec::new();
    let mut push = |v: Option<Variant>| {
        if let Some(v) = v {
            if !out.contains(&v) {
                out.push(v);
            }
        }
    };

    push(Variant::from_code(tag));
    let subtags: Vec<&str> = tag.split('-').collect();
    if subtags.first() != Some(&"zh") {
        return out;
    }
    match subtags.as_slice() {
        ["zh", "chs"] => push(Some(Variant::ZhHans)),
        ["zh", "cht"] => push(Some(Variant::ZhHant)),
        ["zh", script @ ("hans" | "hant"), region, ..] => {
            push(Variant::from_code(&format!("zh-{region}")));
            push(Variant::from_code(&format!("zh-{script}")));
        }
        _ => {}
    }
    out
}

/// Script family implied by a Chinese tag. Bare `zh` counts as simplified.
pub fn family_of(tag: &str) -> Option<Family> {
    let mut subtags = tag.split('-');
    if subtags.next() != Some("zh") {
        return None;
    }
    for subtag in subtags {
        match subtag {
            "hant" | "cht" | "tw" | "hk" | "mo" => return Some(Family::Traditional),
            "hans" | "chs" | "cn" | "sg" | "my" => return Some(Family::Simplified),
            _ => {}
        }
    }
    Some(Family::Simplified)
}

/// Picks the enabled variant the header asks for.
///
/// The first preference naming an enabled variant wins. Otherwise, with
/// `family_fallback`, the first Chinese preference whose family has an
/// enabled variant picks the first such variant.
pub fn negotiate(header: &str, enabled: EnabledVariants, family_fallback: bool) -> Option<Variant> {
    let prefs = preferences(header);
    let direct = prefs
        .iter()
        .flat_map(|tag| candidates(tag))
        .find(|v| enabled.contains(*v));
    if direct.is_some() || !family_fallback {
        return direct;
    }
    prefs
        .iter()
        .find_map(|tag| enabled.first_in_family(family_of(tag)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_quality_then_position() {
        let prefs = preferences("en;q=0.5, zh-TW, ja;q=0, zh-CN;q=0.9, fr;q=0.9, *");
        assert_eq!(prefs, vec!["zh-tw", "zh-cn", "fr", "en"]);
        assert!(preferences("zh;q=abc").is_empty());
    }

    #[test]
    fn script_subtags_alias_to_regions() {
        assert_eq!(candidates("zh-hant-tw"), vec![Variant::ZhTw, Variant::ZhHant]);
        assert_eq!(candidates("zh-hans-cn"), vec![Variant::ZhCn, Variant::ZhHans]);
        assert_eq!(candidates("zh-cht"), vec![Variant::ZhHant]);
        assert!(candidates("en-us").is_empty());
    }

    #[test]
    fn negotiates_direct_then_family() {
        let enabled: EnabledVariants = [Variant::ZhCn, Variant::ZhHk].into_iter().collect();
        assert_eq!(negotiate("zh-HK,zh-CN;q=0.8", enabled, true), Some(Variant::ZhHk));
        assert_eq!(negotiate("en, zh-Hans-CN", enabled, false), Some(Variant::ZhCn));
        // zh-tw is not enabled; fall back to first traditional variant.
        assert_eq!(negotiate("zh-TW", enabled, true), Some(Variant::ZhHk));
        assert_eq!(negotiate("zh-TW", enabled, false), None);
        assert_eq!(negotiate("en-US,fr", enabled, true), None);
    }

    #[test]
    fn family_fallback_tries_later_preferences() {
        let hk_only: EnabledVariants = [Variant::ZhHk].into_iter().collect();
        assert_eq!(negotiate("zh-SG, zh-TW", hk_only, true), Some(Variant::ZhHk));
        assert_eq!(negotiate("zh-SG, en", hk_only, true), None);
    }
}
