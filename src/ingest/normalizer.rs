//! Content normalization for ingested articles.
//!
//! Strips markup, collapses whitespace, derives the stable dedup key, and
//! applies the content quality heuristics used by the rule scorer.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Timelike, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Maximum cleaned content length in characters, ellipsis included.
const MAX_CONTENT_CHARS: usize = 5000;

/// Content at or below this many characters is considered too short.
const MIN_CONTENT_CHARS: usize = 50;

fn tag_pattern() -> &'static Regex {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"))
}

/// Strip HTML tags, decode common entities, collapse all whitespace runs to
/// single spaces, and truncate to the content limit with a trailing ellipsis.
///
/// Idempotent: cleaning already-clean text returns it unchanged.
pub fn clean(raw: &str) -> String {
    let without_tags = tag_pattern().replace_all(raw, " ");

    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    let mut collapsed = String::with_capacity(decoded.len());
    let mut last_was_space = true;
    for ch in decoded.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                collapsed.push(' ');
                last_was_space = true;
            }
        } else {
            collapsed.push(ch);
            last_was_space = false;
        }
    }
    let collapsed = collapsed.trim_end().to_string();

    if collapsed.chars().count() > MAX_CONTENT_CHARS {
        let mut truncated: String = collapsed.chars().take(MAX_CONTENT_CHARS - 1).collect();
        truncated.push('…');
        truncated
    } else {
        collapsed
    }
}

/// Return the longer of the two cleaned candidate texts.
///
/// The description wins when the content field is absent or empty, which is
/// the common case for feeds that only populate `<description>`.
pub fn extract_best_content(description: Option<&str>, content: Option<&str>) -> String {
    let cleaned_description = description.map(clean).unwrap_or_default();
    let cleaned_content = content.map(clean).unwrap_or_default();

    if cleaned_content.is_empty() {
        return cleaned_description;
    }

    if cleaned_content.chars().count() >= cleaned_description.chars().count() {
        cleaned_content
    } else {
        cleaned_description
    }
}

/// Canonical form of a title used for dedup hashing: cleaned and lowercased.
pub fn canonical_title(title: &str) -> String {
    clean(title).to_lowercase()
}

/// Stable dedup key for an article.
///
/// Hash of canonical(title), source name, and the published timestamp
/// truncated to the minute, so the same story fetched twice within a minute
/// maps to the same key regardless of second-level jitter.
pub fn dedup_key(title: &str, source: &str, published_at: DateTime<Utc>) -> String {
    let truncated = published_at
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(published_at);

    let mut hasher = Sha256::new();
    hasher.update(canonical_title(title).as_bytes());
    hasher.update(b"|");
    hasher.update(source.as_bytes());
    hasher.update(b"|");
    hasher.update(truncated.to_rfc3339().as_bytes());
    hex::encode(hasher.finalize())
}

/// True when the cleaned content carries too little text to score reliably.
pub fn is_content_too_short(text: &str) -> bool {
    text.chars().count() <= MIN_CONTENT_CHARS
}

/// True when the text looks like scraped garbage: mostly punctuation, or a
/// single character trigram repeating five or more times.
pub fn is_content_suspicious(text: &str) -> bool {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.is_empty() {
        return true;
    }

    let punctuation = chars
        .iter()
        .filter(|c| c.is_ascii_punctuation() || matches!(c, '…' | '·' | '※'))
        .count();
    if punctuation as f64 / chars.len() as f64 >= 0.6 {
        return true;
    }

    if chars.len() >= 3 {
        let mut counts: HashMap<&[char], usize> = HashMap::new();
        for window in chars.windows(3) {
            let seen = counts.entry(window).or_insert(0);
            *seen += 1;
            if *seen >= 5 {
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn clean_strips_tags_and_collapses_whitespace() {
        let raw = "<p>삼성전자가  \t 실적을\n발표했다</p><br/>";
        assert_eq!(clean(raw), "삼성전자가 실적을 발표했다");
    }

    #[test]
    fn clean_decodes_common_entities() {
        assert_eq!(clean("A &amp; B &lt;C&gt;"), "A & B <C>");
    }

    #[test]
    fn clean_truncates_with_ellipsis() {
        let raw = "가".repeat(6000);
        let cleaned = clean(&raw);
        assert_eq!(cleaned.chars().count(), MAX_CONTENT_CHARS);
        assert!(cleaned.ends_with('…'));
    }

    #[test]
    fn clean_is_idempotent() {
        for raw in [
            "<div>hello <b>world</b></div>",
            &"긴 본문 ".repeat(2000),
            "  spaced   out\ttext  ",
        ] {
            let once = clean(raw);
            assert_eq!(clean(&once), once);
        }
    }

    #[test]
    fn best_content_prefers_longer_text() {
        let description = Some("짧은 설명");
        let content = Some("<p>훨씬 더 길고 자세한 기사 본문이 여기에 들어간다</p>");
        let best = extract_best_content(description, content);
        assert!(best.starts_with("훨씬"));
    }

    #[test]
    fn best_content_falls_back_to_description() {
        assert_eq!(extract_best_content(Some("설명"), None), "설명");
        assert_eq!(extract_best_content(Some("설명"), Some("")), "설명");
    }

    #[test]
    fn dedup_key_ignores_seconds() {
        let a = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 5).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 59).unwrap();
        assert_eq!(
            dedup_key("삼성전자 실적 발표", "yonhap", a),
            dedup_key("삼성전자 실적 발표", "yonhap", b)
        );
    }

    #[test]
    fn dedup_key_differs_across_sources_and_minutes() {
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();
        let base = dedup_key("삼성전자 실적 발표", "yonhap", t);
        assert_ne!(base, dedup_key("삼성전자 실적 발표", "hankyung", t));
        assert_ne!(
            base,
            dedup_key(
                "삼성전자 실적 발표",
                "yonhap",
                t + chrono::Duration::minutes(1)
            )
        );
    }

    #[test]
    fn dedup_key_is_stable_under_title_formatting() {
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();
        assert_eq!(
            dedup_key("Samsung  Earnings", "yonhap", t),
            dedup_key("samsung earnings", "yonhap", t)
        );
    }

    #[test]
    fn short_content_detection() {
        assert!(is_content_too_short("짧다"));
        assert!(!is_content_too_short(&"본문 ".repeat(30)));
    }

    #[test]
    fn punctuation_heavy_content_is_suspicious() {
        assert!(is_content_suspicious("!!!???...###!!!???...a"));
        assert!(!is_content_suspicious(
            "정상적인 기사 본문은 문장 부호보다 글자가 많다."
        ));
    }

    #[test]
    fn repeated_trigram_is_suspicious() {
        assert!(is_content_suspicious("클릭클릭클릭클릭클릭클릭클릭"));
    }
}
