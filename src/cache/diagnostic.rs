//! Test-mode cache miss diagnostics.
//!
//! When a test suite expects every call to be served from cache, a miss
//! means the request drifted. To explain the drift we scan every stored
//! request, score it against the incoming one, and diff the best match.
//! The scan is linear in the number of stored requests; that is fine for
//! the small caches test suites ship with, and a known limit beyond that.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use super::fingerprint::canonical_pretty;
use super::store::{CacheStore, Namespace};
use crate::error::Result;
use similar::TextDiff;
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Upper bound on the time spent diffing one candidate.
const COMPARE_TIMEOUT: Duration = Duration::from_millis(250);

/// The stored request that looks most like a missed one.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarRequest {
    pub fingerprint: String,
    /// Canonical JSON of the stored request.
    pub request: String,
    /// 0 (nothing in common) to 100 (identical text).
    pub score: f64,
    /// Unified diff from the stored request to the incoming one.
    pub diff: String,
}

/// Payload of [`AdapterError::CacheMiss`](crate::error::AdapterError::CacheMiss).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheMissDiagnostic {
    pub fingerprint: String,
    /// Canonical JSON of the incoming request.
    pub request: String,
    /// `None` when the store held no candidate requests.
    pub closest: Option<SimilarRequest>,
}

impl fmt::Display for CacheMissDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.closest {
            None => write!(
                f,
                "Cache miss in test mode for request {}: no similar cached requests found (no candidates available)",
                self.fingerprint
            ),
            Some(closest) => write!(
                f,
                "Cache miss in test mode for request {}: closest cached request {} has similarity {:.1}/100\n{}",
                self.fingerprint, closest.fingerprint, closest.score, closest.diff
            ),
        }
    }
}

/// Character-level similarity of two texts, normalised to 0–100.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    let diff = TextDiff::configure()
        .timeout(COMPARE_TIMEOUT)
        .diff_chars(a, b);
    f64::from(diff.ratio()) * 100.0
}

/// Line-oriented unified diff between two serializations.
pub fn unified_diff(cached: &str, incoming: &str) -> String {
    TextDiff::from_lines(cached, incoming)
        .unified_diff()
        .context_radius(3)
        .header("cached", "incoming")
        .to_string()
}

fn pretty_or_raw(text: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => canonical_pretty(&value),
        Err(_) => text.to_string(),
    }
}

/// Scan stored requests for the best match to `incoming`.
///
/// `exclude` (the incoming fingerprint) is skipped so a request saved just
/// before the lookup is never reported as its own closest match. Unreadable
/// entries are logged and skipped. Ties keep the first key in key order.
pub fn closest_match(
    store: &CacheStore,
    incoming: &str,
    exclude: &str,
) -> Result<Option<SimilarRequest>> {
    let mut best: Option<(String, String, f64)> = None;

    for key in store.iter_keys(Namespace::Requests) {
        let key = key?;
        if key == exclude {
            continue;
        }
        let stored = match store.get(Namespace::Requests, &key) {
            Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping unreadable cached request {}: {}", key, e);
                continue;
            }
        };

        let score = similarity(&stored, incoming);
        if best.as_ref().map_or(true, |(_, _, s)| score > *s) {
            best = Some((key, stored, score));
        }
    }

    Ok(best.map(|(fingerprint, request, score)| SimilarRequest {
        diff: unified_diff(&pretty_or_raw(&request), &pretty_or_raw(incoming)),
        fingerprint,
        request,
        score,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fingerprint::canonical_string;
    use serde_json::json;

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("abc", "abc"), 100.0);
        assert_eq!(similarity("", ""), 100.0);
        assert_eq!(similarity("aaaa", "bbbb"), 0.0);
        let partial = similarity("hello world", "hello there");
        assert!(partial > 0.0 && partial < 100.0);
    }

    #[test]
    fn test_unified_diff_marks_changed_lines() {
        let diff = unified_diff("a\nb\nc\n", "a\nB\nc\n");
        assert!(diff.contains("--- cached"));
        assert!(diff.contains("+++ incoming"));
        assert!(diff.contains("-b"));
        assert!(diff.contains("+B"));
    }

    #[test]
    fn test_closest_match_picks_highest_score() {
        let store = CacheStore::in_memory().unwrap();
        let near = canonical_string(&json!({"prompt": "What is 2+2?", "temperature": 0}));
        let far = canonical_string(&json!({"messages": [{"role": "system", "content": "zzz"}]}));
        store.put(Namespace::Requests, "near", near.as_bytes()).unwrap();
        store.put(Namespace::Requests, "far", far.as_bytes()).unwrap();

        let incoming = canonical_string(&json!({"prompt": "What is 2+3?", "temperature": 0}));
        let best = closest_match(&store, &incoming, "self").unwrap().unwrap();

        assert_eq!(best.fingerprint, "near");
        assert!(best.score > 80.0);
        assert!(best.diff.contains("2+2"));
        assert!(best.diff.contains("2+3"));
    }

    #[test]
    fn test_closest_match_excludes_self_and_handles_empty() {
        let store = CacheStore::in_memory().unwrap();
        assert!(closest_match(&store, "{}", "x").unwrap().is_none());

        store.put(Namespace::Requests, "x", b"{}").unwrap();
        assert!(closest_match(&store, "{}", "x").unwrap().is_none());
    }

    #[test]
    fn test_display_without_candidates() {
        let diag = CacheMissDiagnostic {
            fingerprint: "abc".to_string(),
            request: "{}".to_string(),
            closest: None,
        };
        assert!(diag.to_string().contains("no similar cached requests found"));
    }
}
