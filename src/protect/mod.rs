//! Protected-zone text transformer.
//!
//! Text between `<!--NC{nonce}_START-->` and the `<!--NC{nonce}_END-->` carrying
//! the same nonce is copied verbatim, markers included. Everything else goes
//! through the caller's conversion function. Marker pairs with other nonces
//! inside a protected span are plain content of that span.

mod exclusion;

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use thiserror::Error;

pub use self::exclusion::{ExclusionRules, Selector};
use crate::diagnostics::{self, DiagnosticKind};
use crate::utils;

const MARKER_OPEN: &str = "<!--NC";

static START_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--NC([A-Za-z0-9]+)_START-->").unwrap());

static END_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--NC([A-Za-z0-9]+)_END-->").unwrap());

pub fn start_marker(nonce: &str) -> String {
    format!("{MARKER_OPEN}{nonce}_START-->")
}

pub fn end_marker(nonce: &str) -> String {
    format!("{MARKER_OPEN}{nonce}_END-->")
}

/// Wraps `content` in a marker pair.
pub fn protect(nonce: &str, content: &str) -> String {
    format!("{}{}{}", start_marker(nonce), content, end_marker(nonce))
}

/// A contiguous piece of a marked-up buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone<'a> {
    /// Outside any protected span; subject to conversion.
    Open(&'a str),
    /// A protected span including its markers.
    Protected(&'a str),
}

/// Why a buffer's markers could not be paired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Malformed {
    #[error("start marker {nonce} at byte {at} has no end marker")]
    Unterminated { nonce: String, at: usize },
    #[error("end marker {nonce} at byte {at} is outside any span")]
    StrayEnd { nonce: String, at: usize },
}

impl Malformed {
    /// The part of `text` starting at the offending marker.
    pub fn tail<'a>(&self, text: &'a str) -> &'a str {
        let (Malformed::Unterminated { at, .. } | Malformed::StrayEnd { at, .. }) = self;
        text.get(*at..).unwrap_or_default()
    }
}

/// Byte ranges of the protected spans in `text`, markers included.
pub(crate) fn protected_ranges(text: &str) -> Result<Vec<Range<usize>>, Malformed> {
    let mut ranges = Vec::new();
    if !text.contains(MARKER_OPEN) {
        return Ok(ranges);
    }

    let mut pos = 0;
    while let Some(caps) = START_MARKER.captures_at(text, pos) {
        let (Some(whole), Some(nonce)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        check_no_stray_end(text, pos..whole.start())?;

        let closing = end_marker(nonce.as_str());
        let Some(offset) = text[whole.end()..].find(&closing) else {
            return Err(Malformed::Unterminated {
                nonce: nonce.as_str().to_string(),
                at: whole.start(),
            });
        };
        let end = whole.end() + offset + closing.len();
        ranges.push(whole.start()..end);
        pos = end;
    }
    check_no_stray_end(text, pos..text.len())?;
    Ok(ranges)
}

fn check_no_stray_end(text: &str, outside: Range<usize>) -> Result<(), Malformed> {
    let start = outside.start;
    match END_MARKER.captures(&text[outside]) {
        Some(caps) => Err(Malformed::StrayEnd {
            nonce: caps[1].to_string(),
            at: start + caps.get(0).map_or(0, |m| m.start()),
        }),
        None => Ok(()),
    }
}

/// Splits `text` into alternating open and protected zones.
pub fn split_zones(text: &str) -> Result<Vec<Zone<'_>>, Malformed> {
    let ranges = protected_ranges(text)?;
    let mut zones = Vec::with_capacity(ranges.len() * 2 + 1);
    let mut pos = 0;
    for range in ranges {
        if range.start > pos {
            zones.push(Zone::Open(&text[pos..range.start]));
        }
        pos = range.end;
        zones.push(Zone::Protected(&text[range]));
    }
    if pos < text.len() || zones.is_empty() {
        zones.push(Zone::Open(&text[pos..]));
    }
    Ok(zones)
}

/// Applies `convert` to every open zone of `text`, copying protected spans
/// verbatim.
///
/// Malformed markers never fail the call: the whole buffer is converted and a
/// rate-limited diagnostic is logged.
///
/// ```
/// use zhvariant::protect::{protect, transform};
///
/// let text = format!("a{}b", protect("X1", "a"));
/// let out = transform(&text, |s| s.to_uppercase());
/// assert_eq!(out, "A<!--NCX1_START-->a<!--NCX1_END-->B");
/// ```
pub fn transform<F>(text: &str, mut convert: F) -> String
where
    F: FnMut(&str) -> String,
{
    if !text.contains(MARKER_OPEN) {
        return convert(text);
    }

    let zones = match split_zones(text) {
        Ok(zones) => zones,
        Err(malformed) => {
            diagnostics::report(
                DiagnosticKind::MalformedMarkers,
                &format!("{} near {:?}", malformed, utils::preview(malformed.tail(text))),
            );
            return convert(text);
        }
    };

    let mut out = String::with_capacity(text.len());
    for zone in zones {
        match zone {
            Zone::Open(segment) => out.push_str(&convert(segment)),
            Zone::Protected(span) => out.push_str(span),
        }
    }
    out
}
