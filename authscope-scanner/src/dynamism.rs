// Classifies whether a page needs full browser rendering or whether the
// initial server response is enough to detect auth UI.

use scraper::{Html, Selector};
use serde::Serialize;
use tracing::debug;
use url::Url;

/// Domains whose initial response is disguised as static-looking HTML but
/// always requires script execution to produce the real page.
const ALWAYS_DYNAMIC_DOMAINS: &[&str] = &["instagram.com", "twitter.com", "x.com", "wordpress.com"];

const FRAMEWORK_FINGERPRINTS: &[&[&str]] = &[
    &["react", "reactdom", "__react", "data-reactroot", "data-reactid"],
    &["vue", "v-app", "v-if", "data-v-"],
    &["angular", "ng-app", "ng-controller", "ng-"],
];

const SPA_BUNDLE_PATTERNS: &[&str] = &[
    "webpack",
    "chunk",
    "bundle.js",
    "app.js",
    "main.js",
    "vendor.js",
];

const LOGIN_VOCABULARY: &[&str] = &["login", "sign in", "password", "username"];

const MOUNT_POINT_IDS: &[&str] = &["root", "app", "main", "__next"];

/// A page scoring at least this many independent signals is classified as
/// requiring full rendering. One strong signal alone is not conclusive;
/// libraries shipped defensively produce false positives.
const SCORE_THRESHOLD: u8 = 2;

#[derive(Debug, Clone, Serialize)]
pub struct DynamismVerdict {
    pub requires_rendering: bool,
    /// How many of the six indicators fired.
    pub score: u8,
    pub signals: Vec<&'static str>,
}

/// Score the initial (un-rendered) HTML of `url` for JavaScript-heaviness.
pub fn assess(html: &str, url: &str) -> DynamismVerdict {
    if let Some(domain) = known_dynamic_domain(url) {
        debug!(domain, "known script-driven domain, skipping scoring");
        return DynamismVerdict {
            requires_rendering: true,
            score: SCORE_THRESHOLD,
            signals: vec!["known_dynamic_domain"],
        };
    }

    let document = Html::parse_document(html);
    let lowered = html.to_lowercase();
    let mut signals = Vec::new();

    let script_selector = Selector::parse("script").unwrap();
    let script_count = document.select(&script_selector).count();

    // 1. Minimal document that is mostly script tags.
    if html.len() < 5000 && script_count > 3 {
        signals.push("minimal_content");
    }

    // 2. Excessive script tag count.
    if script_count > 10 {
        signals.push("many_scripts");
    }

    // 3. Front-end framework fingerprints.
    if FRAMEWORK_FINGERPRINTS
        .iter()
        .any(|family| family.iter().any(|f| lowered.contains(f)))
    {
        signals.push("framework_fingerprint");
    }

    // 4. Bundler / SPA filename patterns in script sources.
    let sourced_selector = Selector::parse("script[src]").unwrap();
    let has_bundle_src = document.select(&sourced_selector).any(|script| {
        script
            .value()
            .attr("src")
            .map(|src| {
                let src = src.to_lowercase();
                SPA_BUNDLE_PATTERNS.iter().any(|p| src.contains(p))
            })
            .unwrap_or(false)
    });
    if has_bundle_src {
        signals.push("spa_bundles");
    }

    // 5. Login vocabulary in body text despite zero forms and zero
    //    credential-shaped inputs.
    let form_selector = Selector::parse("form").unwrap();
    let input_selector =
        Selector::parse("input[type=text], input[type=email], input[type=password]").unwrap();
    let has_forms = document.select(&form_selector).next().is_some();
    let has_inputs = document.select(&input_selector).next().is_some();
    if !has_forms && !has_inputs {
        let body_selector = Selector::parse("body").unwrap();
        let body_text = document
            .select(&body_selector)
            .next()
            .map(|body| body.text().collect::<String>().to_lowercase())
            .unwrap_or_default();
        if LOGIN_VOCABULARY.iter().any(|kw| body_text.contains(kw)) {
            signals.push("login_vocabulary_without_forms");
        }
    }

    // 6. A near-empty SPA mount-point container.
    let mount_selector = Selector::parse("div[id]").unwrap();
    let has_empty_mount = document.select(&mount_selector).any(|div| {
        let id = div.value().attr("id").unwrap_or("").to_lowercase();
        if !MOUNT_POINT_IDS.iter().any(|m| id.contains(m)) {
            return false;
        }
        let child_elements = div.children().filter(|c| c.value().is_element()).count();
        child_elements < 5
    });
    if has_empty_mount {
        signals.push("empty_mount_point");
    }

    let score = signals.len() as u8;
    debug!(score, ?signals, "dynamism assessment");

    DynamismVerdict {
        requires_rendering: score >= SCORE_THRESHOLD,
        score,
        signals,
    }
}

fn known_dynamic_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    ALWAYS_DYNAMIC_DOMAINS
        .iter()
        .find(|d| host.contains(*d))
        .map(|_| host)
}
