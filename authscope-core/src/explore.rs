// The detection waterfall: renders a page, runs the heuristic extractor,
// recognizes blocked pages, and - when direct detection fails - explores
// model-suggested navigation paths under strict depth and revisit bounds.

use crate::extract::extract_components;
use crate::model::{
    AnalysisMethod, ComponentKind, DetectedComponent, DetectionMethod, DetectionOutcome,
};
use crate::narrate::{conventional_auth_paths, collect_clickable_elements, page_title, Narrator};
use authscope_scanner::dynamism;
use authscope_scanner::renderer::{PageRenderer, RenderMode};
use futures::future::BoxFuture;
use scraper::Html;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// How many suggested links are recursed into at each level.
const MAX_CANDIDATES_PER_LEVEL: usize = 2;

const DEFAULT_MAX_DEPTH: usize = 2;

const ALREADY_VISITED_NARRATIVE: &str = "URL already visited";

const BLOCKED_NARRATIVE: &str = "**Site Protected by Anti-Bot Service**\n\n\
    This website uses CAPTCHA or anti-bot protection that prevents automated \
    scraping. The login page cannot be accessed programmatically.\n\n\
    **Alternatives:**\n\
    - Use the site's official API if available\n\
    - Manually export HTML from your browser\n\
    - Test with similar sites that don't have bot protection";

const FALLBACK_FOUND_NARRATIVE: &str = "Auth components detected via structural analysis";

/// Per-request cycle prevention. Owned by one top-level request and
/// threaded by reference through the recursion; the visited set only
/// ever grows.
#[derive(Debug)]
struct ExplorationState {
    visited: HashSet<String>,
}

impl ExplorationState {
    fn new() -> Self {
        Self {
            visited: HashSet::new(),
        }
    }

    /// Record `url` as visited. Returns false if it already was.
    fn mark(&mut self, url: &str) -> bool {
        self.visited.insert(url.to_string())
    }

    fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }
}

/// Drives the waterfall for one analysis request at a time. Renderer and
/// narrator are capabilities so tests can swap in deterministic stubs.
pub struct AuthExplorer {
    renderer: Arc<dyn PageRenderer>,
    narrator: Arc<dyn Narrator>,
    max_depth: usize,
}

impl AuthExplorer {
    pub fn new(renderer: Arc<dyn PageRenderer>, narrator: Arc<dyn Narrator>) -> Self {
        Self {
            renderer,
            narrator,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sole entry point. Always returns a well-formed outcome; no
    /// collaborator failure escapes as an error.
    pub async fn analyze(&self, url: &str, interactive: bool) -> DetectionOutcome {
        if let Err(e) = Url::parse(url) {
            return DetectionOutcome::failed(url.to_string(), format!("Invalid URL: {e}"));
        }

        info!(url, interactive, max_depth = self.max_depth, "starting analysis");
        let mut state = ExplorationState::new();
        self.explore(url.to_string(), 0, interactive, &mut state).await
    }

    /// One level of the recursive waterfall. Boxed because async fns
    /// cannot recurse directly.
    fn explore<'a>(
        &'a self,
        url: String,
        depth: usize,
        interactive: bool,
        state: &'a mut ExplorationState,
    ) -> BoxFuture<'a, DetectionOutcome> {
        Box::pin(async move {
            debug!(depth, url, "analyzing");

            // Mark before any recursion can revisit us.
            if !state.mark(&url) {
                debug!(url, "already visited, skipping");
                return DetectionOutcome::not_found(
                    url,
                    ALREADY_VISITED_NARRATIVE.to_string(),
                    AnalysisMethod::Static,
                );
            }

            let browser_first = interactive && self.renderer.supports_browser();
            let mode = if browser_first {
                RenderMode::FullBrowser
            } else {
                RenderMode::StaticFetch
            };
            let mut method = if browser_first {
                AnalysisMethod::BrowserRendered
            } else {
                AnalysisMethod::Static
            };

            let mut page = match self.renderer.render(&url, mode).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(url, error = %e, "render failed");
                    return DetectionOutcome::failed(url, e.to_string());
                }
            };

            if page.blocked {
                info!(url, evidence = ?page.block_evidence, "blocked by anti-bot protection");
                return DetectionOutcome::blocked(url, BLOCKED_NARRATIVE.to_string());
            }

            let mut components = {
                let document = Html::parse_document(&page.html);
                extract_components(&document, &url)
            };

            // Cheap render found nothing: if the page looks script-driven
            // and we have a browser, pay for the expensive render.
            if components.is_empty()
                && mode == RenderMode::StaticFetch
                && self.renderer.supports_browser()
            {
                let verdict = dynamism::assess(&page.html, &url);
                if verdict.requires_rendering {
                    info!(url, score = verdict.score, "page looks script-driven, re-rendering");
                    match self.renderer.render(&url, RenderMode::FullBrowser).await {
                        Ok(rendered) => {
                            if rendered.blocked {
                                return DetectionOutcome::blocked(
                                    url,
                                    BLOCKED_NARRATIVE.to_string(),
                                );
                            }
                            components = {
                                let document = Html::parse_document(&rendered.html);
                                extract_components(&document, &url)
                            };
                            page = rendered;
                            method = AnalysisMethod::BrowserRendered;
                        }
                        Err(e) => warn!(url, error = %e, "browser re-render failed"),
                    }
                }
            }

            if !components.is_empty() {
                info!(url, count = components.len(), "auth components found");
                let narrative = self.found_narrative(&components, &url).await;
                return DetectionOutcome::found(url, components, narrative, method);
            }

            // Interactive leaf strategies: click simulation, then
            // conventional path probing. Both browser-only.
            if interactive && self.renderer.supports_browser() {
                match self.renderer.probe_login_click(&url).await {
                    Ok(Some(fragment)) => {
                        info!(url, "auth form appeared after simulated click");
                        let component = DetectedComponent::new(
                            ComponentKind::DynamicAuthForm,
                            &fragment,
                            DetectionMethod::DynamicInteraction,
                            &url,
                        );
                        let components = vec![component];
                        let narrative = self.found_narrative(&components, &url).await;
                        return DetectionOutcome::found(
                            url,
                            components,
                            narrative,
                            AnalysisMethod::DynamicInteraction,
                        );
                    }
                    Ok(None) => debug!(url, "click simulation found nothing"),
                    Err(e) => warn!(url, error = %e, "click simulation failed"),
                }

                if let Some(outcome) = self.probe_conventional_paths(&url, state).await {
                    return outcome;
                }
            }

            let (title, elements) = {
                let document = Html::parse_document(&page.html);
                (page_title(&document), collect_clickable_elements(&document))
            };

            if depth >= self.max_depth {
                debug!(url, depth, "max depth reached");
                let narrative = self.absence_narrative(&title, &[]).await;
                return DetectionOutcome::not_found(url, narrative, method);
            }

            let suggestions = match self.narrator.suggest_links(&elements, &url).await {
                Ok(links) => links,
                Err(e) => {
                    warn!(url, error = %e, "link suggestion failed");
                    Vec::new()
                }
            };
            debug!(url, ?suggestions, "candidate links");

            let candidates: Vec<String> = suggestions
                .iter()
                .filter(|link| !state.is_visited(link))
                .take(MAX_CANDIDATES_PER_LEVEL)
                .cloned()
                .collect();

            for candidate in candidates {
                info!(from = url, to = candidate, depth = depth + 1, "following suggested link");
                let mut result = self
                    .explore(candidate, depth + 1, interactive, state)
                    .await;
                if result.found {
                    result.narrative =
                        format!("Found via link from {}: {}", url, result.narrative);
                    return result;
                }
            }

            let narrative = self.absence_narrative(&title, &suggestions).await;
            DetectionOutcome::not_found(url, narrative, method)
        })
    }

    /// Probe conventional auth paths directly, rendering each in the
    /// browser and keeping the first page the extractor accepts.
    async fn probe_conventional_paths(
        &self,
        url: &str,
        state: &mut ExplorationState,
    ) -> Option<DetectionOutcome> {
        for probe_url in conventional_auth_paths(url) {
            if state.is_visited(&probe_url) {
                continue;
            }
            state.mark(&probe_url);
            debug!(probe_url, "probing conventional auth path");

            let page = match self.renderer.render(&probe_url, RenderMode::FullBrowser).await {
                Ok(page) => page,
                Err(e) => {
                    debug!(probe_url, error = %e, "probe failed");
                    continue;
                }
            };
            if page.blocked {
                continue;
            }

            let hit = {
                let document = Html::parse_document(&page.html);
                !extract_components(&document, &probe_url).is_empty()
            };
            if hit {
                info!(probe_url, "auth page found via path navigation");
                let component = DetectedComponent::new(
                    ComponentKind::NavigatedAuthPage,
                    &page.html,
                    DetectionMethod::PathNavigation,
                    &probe_url,
                );
                let components = vec![component];
                let narrative = self.found_narrative(&components, &probe_url).await;
                return Some(DetectionOutcome::found(
                    probe_url,
                    components,
                    narrative,
                    AnalysisMethod::PathNavigation,
                ));
            }
        }

        None
    }

    async fn found_narrative(&self, components: &[DetectedComponent], url: &str) -> String {
        match self.narrator.summarize(components, url).await {
            Ok(narrative) => narrative,
            Err(e) => {
                warn!(url, error = %e, "summary narration failed, using fallback");
                FALLBACK_FOUND_NARRATIVE.to_string()
            }
        }
    }

    async fn absence_narrative(&self, title: &str, attempted: &[String]) -> String {
        match self.narrator.explain_absence(title, attempted).await {
            Ok(narrative) => narrative,
            Err(e) => {
                warn!(error = %e, "absence narration failed, using fallback");
                format!(
                    "No auth components found. Checked {} suggested links.",
                    attempted.len()
                )
            }
        }
    }
}
