// Data model for detected auth components and analysis outcomes.

use serde::{Deserialize, Serialize};

/// Upper bound on stored markup per component, to cap payload size.
pub const MAX_FRAGMENT_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    HtmlLoginForm,
    InstagramStyleLogin,
    WordpressStyleLogin,
    AriaLabeledPassword,
    DetectedLoginInputs,
    JsAuthContainer,
    DataAttrAuth,
    ButtonWithInputs,
    DynamicAuthForm,
    NavigatedAuthPage,
}

/// Which heuristic or strategy produced a component. Kept separate from
/// `ComponentKind` because the narrative step reports both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    TraditionalHtml,
    InstagramDetection,
    WordpressDetection,
    AriaLabelDetection,
    InputCombinationDetection,
    JavascriptContainer,
    DataAttributes,
    ButtonContext,
    DynamicInteraction,
    PathNavigation,
}

/// A fragment of markup classified as part of an authentication UI.
/// Immutable once created; overlapping fragments from different
/// heuristics are intentionally not merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedComponent {
    pub kind: ComponentKind,
    pub html_fragment: String,
    pub detection_method: DetectionMethod,
    pub source_url: String,
}

impl DetectedComponent {
    pub fn new(
        kind: ComponentKind,
        html_fragment: &str,
        detection_method: DetectionMethod,
        source_url: &str,
    ) -> Self {
        Self {
            kind,
            html_fragment: truncate_chars(html_fragment, MAX_FRAGMENT_CHARS),
            detection_method,
            source_url: source_url.to_string(),
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Which strategy layer produced the terminal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    Static,
    BrowserRendered,
    DynamicInteraction,
    PathNavigation,
    Blocked,
    Error,
}

/// Terminal result of an analysis request. Callers always receive one of
/// these; collaborator failures are folded into `error`/`narrative`
/// rather than propagated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionOutcome {
    pub url: String,
    pub found: bool,
    pub components: Vec<DetectedComponent>,
    pub narrative: String,
    pub method: AnalysisMethod,
    pub captcha_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionOutcome {
    pub fn found(
        url: String,
        components: Vec<DetectedComponent>,
        narrative: String,
        method: AnalysisMethod,
    ) -> Self {
        Self {
            url,
            found: true,
            components,
            narrative,
            method,
            captcha_detected: false,
            error: None,
        }
    }

    pub fn not_found(url: String, narrative: String, method: AnalysisMethod) -> Self {
        Self {
            url,
            found: false,
            components: Vec::new(),
            narrative,
            method,
            captcha_detected: false,
            error: None,
        }
    }

    pub fn blocked(url: String, narrative: String) -> Self {
        Self {
            url,
            found: false,
            components: Vec::new(),
            narrative,
            method: AnalysisMethod::Blocked,
            captcha_detected: true,
            error: None,
        }
    }

    pub fn failed(url: String, error: String) -> Self {
        Self {
            url,
            found: false,
            components: Vec::new(),
            narrative: format!("Error: {error}"),
            method: AnalysisMethod::Error,
            captcha_detected: false,
            error: Some(error),
        }
    }
}
