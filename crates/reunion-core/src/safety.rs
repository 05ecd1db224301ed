//! Keyword blocklist and PII masking.
//!
//! [`check_safety`] is advisory and used to reject viewer input before it
//! reaches a model. [`mask_sensitive`] is applied to every line that is
//! stored or sent back, from viewers and agents alike.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Phrases that cause viewer input to be rejected.
pub const BLOCKED_WORDS: &[&str] = &[
    "去死",
    "自杀",
    "身份证",
    "银行卡",
    "手机号",
    "住址",
    "爆你隐私",
];

/// Replacement for mainland mobile numbers.
pub const PHONE_PLACEHOLDER: &str = "1**********";

/// Replacement for long numeric identifiers (ID cards, bank cards).
pub const ID_PLACEHOLDER: &str = "**************";

/// Replacement for email addresses.
pub const EMAIL_PLACEHOLDER: &str = "***@***";

/// Result of a blocklist check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyVerdict {
    /// Whether any blocked phrase was found.
    pub blocked: bool,
    /// The blocked phrases that matched, in blocklist order.
    pub matched: Vec<&'static str>,
}

/// Check `text` against the blocklist (case-insensitive substring match).
#[must_use]
pub fn check_safety(text: &str) -> SafetyVerdict {
    let lower = text.to_lowercase();
    let matched: Vec<&'static str> = BLOCKED_WORDS
        .iter()
        .copied()
        .filter(|word| lower.contains(&word.to_lowercase()))
        .collect();

    SafetyVerdict {
        blocked: !matched.is_empty(),
        matched,
    }
}

struct MaskPatterns {
    phone: Regex,
    long_id: Regex,
    email: Regex,
}

fn patterns() -> &'static MaskPatterns {
    static PATTERNS: OnceLock<MaskPatterns> = OnceLock::new();
    // Word boundaries are ASCII-only so CJK text directly around a number
    // still counts as a boundary.
    PATTERNS.get_or_init(|| MaskPatterns {
        phone: Regex::new(r"(?-u:\b)1[3-9][0-9]{9}(?-u:\b)").expect("phone pattern compiles"),
        long_id: Regex::new(r"(?-u:\b)[0-9]{15,18}[0-9Xx]?(?-u:\b)")
            .expect("id pattern compiles"),
        email: Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}")
            .expect("email pattern compiles"),
    })
}

/// Mask phone numbers, long numeric ids and email addresses in `text`.
///
/// Masking is idempotent: none of the placeholders match any pattern.
#[must_use]
pub fn mask_sensitive(text: &str) -> String {
    let patterns = patterns();
    let masked = patterns.phone.replace_all(text, PHONE_PLACEHOLDER);
    let masked = patterns.long_id.replace_all(&masked, ID_PLACEHOLDER);
    patterns
        .email
        .replace_all(&masked, EMAIL_PLACEHOLDER)
        .into_owned()
}
