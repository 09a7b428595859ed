//! Rate-limited operational logging for the degraded paths of the pipeline.
//!
//! Every failure mode in this crate has a pass-through fallback, so repeated
//! failures only ever show up here: [`DiagnosticKind::Unavailable`] is logged
//! once per process, every other kind at most once per [`REPORT_INTERVAL`].
//! The most recent message is kept for hosts that poll instead of subscribing
//! to `tracing` output.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const REPORT_INTERVAL: Duration = Duration::from_secs(60);

static LAST_ERROR: Mutex<Option<String>> = Mutex::new(None);

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

static UNAVAILABLE_LOGGED: AtomicBool = AtomicBool::new(false);

// Millisecond timestamps (since EPOCH, offset by one so 0 means "never").
static LAST_REPORTED: [AtomicU64; 4] = [
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A converter's backing tables are missing.
    Unavailable,
    /// The shared cache tier failed; the request proceeded uncached.
    CacheUnreachable,
    /// Marker nonces mismatched or a start marker was unterminated.
    MalformedMarkers,
    /// A request named a variant outside the enabled set.
    InvalidVariant,
}

impl DiagnosticKind {
    fn slot(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::Unavailable => "unavailable",
            DiagnosticKind::CacheUnreachable => "cache_unreachable",
            DiagnosticKind::MalformedMarkers => "malformed_markers",
            DiagnosticKind::InvalidVariant => "invalid_variant",
        }
    }
}

/// Records `message` as the last error and logs it unless this kind was
/// reported recently. Returns whether a log line was emitted.
pub fn report(kind: DiagnosticKind, message: &str) -> bool {
    set_last_error(&format!("{}: {}", kind.as_str(), message));

    if !should_emit(kind) {
        return false;
    }
    match kind {
        DiagnosticKind::InvalidVariant => {
            tracing::debug!(kind = kind.as_str(), "{}", message)
        }
        _ => tracing::warn!(kind = kind.as_str(), "{}", message),
    }
    true
}

fn should_emit(kind: DiagnosticKind) -> bool {
    if kind == DiagnosticKind::Unavailable {
        return UNAVAILABLE_LOGGED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
    }

    let now = EPOCH.elapsed().as_millis() as u64 + 1;
    let slot = &LAST_REPORTED[kind.slot()];
    let last = slot.load(Ordering::Acquire);
    if last != 0 && now.saturating_sub(last) < REPORT_INTERVAL.as_millis() as u64 {
        return false;
    }
    // Losing the race means another thread just logged this kind.
    slot.compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

/// Records the last diagnostic message.
pub fn set_last_error(err_msg: &str) {
    let mut last_error = LAST_ERROR.lock().unwrap_or_else(|e| e.into_inner());
    *last_error = Some(err_msg.to_string());
}

/// Retrieves the last diagnostic message, if any.
pub fn last_error() -> Option<String> {
    let last_error = LAST_ERROR.lock().unwrap_or_else(|e| e.into_inner());
    last_error.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_per_kind() {
        // First report of a kind in this process may or may not have happened in
        // another test; the second back-to-back report never logs.
        report(DiagnosticKind::MalformedMarkers, "first");
        assert!(!report(DiagnosticKind::MalformedMarkers, "second"));
        assert!(last_error().is_some());
    }

    #[test]
    fn unavailable_logs_once() {
        report(DiagnosticKind::Unavailable, "tables missing");
        assert!(!report(DiagnosticKind::Unavailable, "tables missing again"));
    }
}
