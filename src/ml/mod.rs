//! Remote model-serving client.
//!
//! Wraps the importance, summarization, embedding, and clustering operations
//! of the ML collaborator behind a circuit breaker with per-operation caches
//! and local fallbacks. Callers never see a hard failure from this module on
//! the feed path; they receive a typed error and degrade.

pub mod breaker;
pub mod cache;
pub mod client;
pub mod types;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use client::{MlClient, MlError};
pub use types::*;

/// Local summary fallback: the first two sentences of the body, trimmed to
/// 240 characters.
pub fn fallback_summary(body: &str) -> String {
    let mut sentences = 0;
    let mut end = body.len();

    for (idx, ch) in body.char_indices() {
        if matches!(ch, '.' | '!' | '?' | '。') {
            sentences += 1;
            if sentences == 2 {
                end = idx + ch.len_utf8();
                break;
            }
        }
    }

    let summary = body[..end].trim();
    if summary.chars().count() <= 240 {
        summary.to_string()
    } else {
        summary.chars().take(239).collect::<String>() + "…"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_summary_takes_two_sentences() {
        let body = "첫 문장이다. 둘째 문장이다. 셋째 문장은 빠진다.";
        assert_eq!(fallback_summary(body), "첫 문장이다. 둘째 문장이다.");
    }

    #[test]
    fn fallback_summary_trims_to_240_chars() {
        let body = "가".repeat(500);
        let summary = fallback_summary(&body);
        assert_eq!(summary.chars().count(), 240);
        assert!(summary.ends_with('…'));
    }

    #[test]
    fn fallback_summary_handles_short_body() {
        assert_eq!(fallback_summary("한 문장뿐."), "한 문장뿐.");
    }
}
