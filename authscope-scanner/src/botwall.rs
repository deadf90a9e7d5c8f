// Anti-bot / CAPTCHA page recognition

use serde::{Deserialize, Serialize};

/// Phrases that only appear on challenge pages served by anti-bot
/// vendors. Trusted at any document size.
const BLOCKING_INDICATORS: &[&str] = &[
    "please verify you are a human",
    "verify you are human",
    "solve this puzzle",
    "press and hold",
    "datadome",
    "perimeterx",
    "cf-challenge",
    "challenge-platform",
    "<title>just a moment...</title>",
    "ray id:",
];

/// Generic CAPTCHA widget markers. Too noisy to trust on a normal-sized
/// page (plenty of sites embed a recaptcha on a contact form), but strong
/// signal when the whole document is nearly empty.
const GENERIC_CAPTCHA_MARKERS: &[&str] = &["recaptcha", "hcaptcha", "captcha-box", "g-recaptcha"];

/// Documents shorter than this are treated as challenge-page sized.
const SMALL_PAGE_THRESHOLD: usize = 3000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockVerdict {
    pub blocked: bool,
    pub evidence: Option<String>,
}

impl BlockVerdict {
    fn clear() -> Self {
        Self {
            blocked: false,
            evidence: None,
        }
    }

    fn blocked_by(indicator: &str) -> Self {
        Self {
            blocked: true,
            evidence: Some(indicator.to_string()),
        }
    }
}

/// Inspect rendered HTML for signs of anti-bot protection. First match
/// wins; the evidence string is the matched phrase.
pub fn inspect(html: &str) -> BlockVerdict {
    let lowered = html.to_lowercase();

    for indicator in BLOCKING_INDICATORS {
        if lowered.contains(indicator) {
            return BlockVerdict::blocked_by(indicator);
        }
    }

    if html.len() < SMALL_PAGE_THRESHOLD {
        for marker in GENERIC_CAPTCHA_MARKERS {
            if lowered.contains(marker) {
                return BlockVerdict::blocked_by(marker);
            }
        }
    }

    BlockVerdict::clear()
}
