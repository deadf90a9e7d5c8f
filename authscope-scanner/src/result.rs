use serde::{Deserialize, Serialize};

/// The outcome of a single render attempt. Produced once and not mutated
/// afterward; callers decide what to do with a blocked page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRenderResult {
    pub url: String,
    pub html: String,
    pub blocked: bool,
    pub block_evidence: Option<String>,
}

impl PageRenderResult {
    pub fn new(url: String, html: String) -> Self {
        Self {
            url,
            html,
            blocked: false,
            block_evidence: None,
        }
    }

    pub fn blocked(url: String, html: String, evidence: String) -> Self {
        Self {
            url,
            html,
            blocked: true,
            block_evidence: Some(evidence),
        }
    }
}
