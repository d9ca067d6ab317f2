//! Issuer code matching for Korean listed companies.
//!
//! Maintains a static registry of 6-digit KRX issuer codes with Korean and
//! English aliases, and scores how strongly an article mentions them.

use std::collections::BTreeSet;

/// One listed issuer: its 6-digit code and the names it appears under.
struct Issuer {
    code: &'static str,
    aliases: &'static [&'static str],
}

/// Registry of the issuers the matcher recognizes.
///
/// Codes are KRX issue codes; aliases cover the spellings that show up in
/// Korean financial feeds.
const ISSUERS: &[Issuer] = &[
    Issuer {
        code: "005930",
        aliases: &["삼성전자", "Samsung Electronics"],
    },
    Issuer {
        code: "000660",
        aliases: &["SK하이닉스", "SK Hynix"],
    },
    Issuer {
        code: "373220",
        aliases: &["LG에너지솔루션", "LG Energy Solution"],
    },
    Issuer {
        code: "035420",
        aliases: &["네이버", "NAVER"],
    },
    Issuer {
        code: "035720",
        aliases: &["카카오", "Kakao"],
    },
    Issuer {
        code: "005380",
        aliases: &["현대차", "현대자동차", "Hyundai Motor"],
    },
    Issuer {
        code: "000270",
        aliases: &["기아", "Kia"],
    },
    Issuer {
        code: "068270",
        aliases: &["셀트리온", "Celltrion"],
    },
    Issuer {
        code: "005490",
        aliases: &["포스코홀딩스", "POSCO홀딩스", "POSCO Holdings"],
    },
    Issuer {
        code: "105560",
        aliases: &["KB금융", "KB Financial"],
    },
    Issuer {
        code: "055550",
        aliases: &["신한지주", "Shinhan Financial"],
    },
    Issuer {
        code: "207940",
        aliases: &["삼성바이오로직스", "Samsung Biologics"],
    },
    Issuer {
        code: "006400",
        aliases: &["삼성SDI", "Samsung SDI"],
    },
    Issuer {
        code: "051910",
        aliases: &["LG화학", "LG Chem"],
    },
    Issuer {
        code: "003670",
        aliases: &["포스코퓨처엠", "POSCO Future M"],
    },
    Issuer {
        code: "012330",
        aliases: &["현대모비스", "Hyundai Mobis"],
    },
    Issuer {
        code: "028260",
        aliases: &["삼성물산", "Samsung C&T"],
    },
    Issuer {
        code: "066570",
        aliases: &["LG전자", "LG Electronics"],
    },
    Issuer {
        code: "096770",
        aliases: &["SK이노베이션", "SK Innovation"],
    },
    Issuer {
        code: "034730",
        aliases: &["SK스퀘어", "SK Square"],
    },
];

/// Matches issuer mentions in article text.
#[derive(Debug, Default)]
pub struct TickerMatcher {}

impl TickerMatcher {
    pub fn new() -> Self {
        Self {}
    }

    /// Return the issuer codes whose literal code or any alias occurs in the
    /// text. Codes are returned sorted for stable persistence.
    pub fn find_tickers(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let mut found = BTreeSet::new();

        for issuer in ISSUERS {
            if lowered.contains(issuer.code) {
                found.insert(issuer.code.to_string());
                continue;
            }
            for alias in issuer.aliases {
                if lowered.contains(&alias.to_lowercase()) {
                    found.insert(issuer.code.to_string());
                    break;
                }
            }
        }

        found.into_iter().collect()
    }

    /// Bounded score in [0, 1] reflecting how strongly the article mentions
    /// listed issuers: occurrence count, number of distinct codes, and
    /// whether the title itself carries a mention.
    pub fn match_strength(&self, title: &str, body: &str) -> f64 {
        let full_text = format!("{} {}", title, body);
        let codes = self.find_tickers(&full_text);
        if codes.is_empty() {
            return 0.0;
        }

        let occurrences = self.count_occurrences(&full_text);
        let title_hit = !self.find_tickers(title).is_empty();

        let mut score = 0.3 + 0.2 * (codes.len().min(3) as f64 - 1.0) / 2.0;
        score += 0.1 * (occurrences.min(5) as f64 - 1.0) / 4.0;
        if title_hit {
            score += 0.3;
        }

        score.clamp(0.0, 1.0)
    }

    fn count_occurrences(&self, text: &str) -> usize {
        let lowered = text.to_lowercase();
        let mut count = 0;

        for issuer in ISSUERS {
            count += lowered.matches(issuer.code).count();
            for alias in issuer.aliases {
                count += lowered.matches(&alias.to_lowercase()).count();
            }
        }

        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_by_korean_alias() {
        let matcher = TickerMatcher::new();
        let codes = matcher.find_tickers("삼성전자가 신제품을 공개했다");
        assert_eq!(codes, vec!["005930".to_string()]);
    }

    #[test]
    fn finds_by_code_and_english_alias() {
        let matcher = TickerMatcher::new();
        let codes = matcher.find_tickers("005930 and SK Hynix both rallied");
        assert_eq!(codes, vec!["000660".to_string(), "005930".to_string()]);
    }

    #[test]
    fn no_match_returns_empty() {
        let matcher = TickerMatcher::new();
        assert!(matcher.find_tickers("코스피 지수가 상승했다").is_empty());
    }

    #[test]
    fn title_hit_strengthens_score() {
        let matcher = TickerMatcher::new();
        let in_title = matcher.match_strength("삼성전자 실적 발표", "본문");
        let in_body = matcher.match_strength("실적 발표", "삼성전자 본문");
        assert!(in_title > in_body);
    }

    #[test]
    fn strength_is_bounded() {
        let matcher = TickerMatcher::new();
        let text = "삼성전자 SK하이닉스 네이버 카카오 현대차 ".repeat(50);
        let strength = matcher.match_strength(&text, &text);
        assert!(strength <= 1.0);
        assert!(strength > 0.5);
    }

    #[test]
    fn strength_zero_without_mentions() {
        let matcher = TickerMatcher::new();
        assert_eq!(matcher.match_strength("제목", "본문"), 0.0);
    }
}
