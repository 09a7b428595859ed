//! Automated-client heuristic.
//!
//! Crawlers must see stable, unredirected URLs, so browser-language detection
//! is skipped for anything that does not look like an interactive browser.

const BOT_MARKERS: &[&str] = &[
    "bot",
    "crawl",
    "spider",
    "slurp",
    "archiver",
    "facebookexternalhit",
    "embedly",
    "preview",
    "headless",
    "lighthouse",
    "curl",
    "wget",
    "python-requests",
    "httpclient",
    "feedfetcher",
];

const BROWSER_MARKERS: &[&str] = &[
    "mozilla", "chrome", "safari", "firefox", "edg", "opera", "msie", "trident",
];

/// Whether `user_agent` belongs to an automated agent.
///
/// Known bot substrings win over browser substrings; a missing or unknown
/// User-Agent counts as automated.
pub fn is_automated(user_agent: Option<&str>) -> bool {
    let Some(ua) = user_agent.map(str::trim).filter(|ua| !ua.is_empty()) else {
        return true;
    };
    let ua = ua.to_ascii_lowercase();
    if BOT_MARKERS.iter().any(|m| ua.contains(m)) {
        return true;
    }
    !BROWSER_MARKERS.iter().any(|m| ua.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_agents() {
        assert!(is_automated(None));
        assert!(is_automated(Some("  ")));
        assert!(is_automated(Some(
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"
        )));
        assert!(is_automated(Some("curl/8.4.0")));
        assert!(is_automated(Some("SomeUnknownClient/1.0")));
        assert!(!is_automated(Some(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36"
        )));
    }
}
