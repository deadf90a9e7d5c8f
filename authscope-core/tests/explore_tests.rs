use async_trait::async_trait;
use authscope_core::model::{AnalysisMethod, ComponentKind, DetectedComponent};
use authscope_core::narrate::{NarrationError, Narrator};
use authscope_core::AuthExplorer;
use authscope_scanner::botwall;
use authscope_scanner::error::{RenderError, Result as RenderResult};
use authscope_scanner::renderer::{PageRenderer, RenderMode};
use authscope_scanner::result::PageRenderResult;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const LOGIN_PAGE: &str = r#"<html><body>
    <form class="login-form"><input type="text" name="user"><input type="password" name="pass"></form>
</body></html>"#;

const EMPTY_PAGE: &str = r#"<html><head><title>Landing</title></head><body>
    <h1>Welcome</h1><a href="/about">About</a>
</body></html>"#;

/// Deterministic renderer over a fixed URL -> HTML table. Counts render
/// calls so tests can assert the exploration stays bounded.
struct FixtureRenderer {
    static_pages: HashMap<String, String>,
    browser_pages: HashMap<String, String>,
    click_fragment: Option<String>,
    browser: bool,
    render_calls: AtomicUsize,
}

impl FixtureRenderer {
    fn static_only(pages: &[(&str, &str)]) -> Self {
        Self {
            static_pages: pages
                .iter()
                .map(|(u, h)| (u.to_string(), h.to_string()))
                .collect(),
            browser_pages: HashMap::new(),
            click_fragment: None,
            browser: false,
            render_calls: AtomicUsize::new(0),
        }
    }

    fn with_browser(static_pages: &[(&str, &str)], browser_pages: &[(&str, &str)]) -> Self {
        Self {
            static_pages: static_pages
                .iter()
                .map(|(u, h)| (u.to_string(), h.to_string()))
                .collect(),
            browser_pages: browser_pages
                .iter()
                .map(|(u, h)| (u.to_string(), h.to_string()))
                .collect(),
            click_fragment: None,
            browser: true,
            render_calls: AtomicUsize::new(0),
        }
    }

    fn with_click_fragment(mut self, fragment: &str) -> Self {
        self.click_fragment = Some(fragment.to_string());
        self
    }

    fn calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageRenderer for FixtureRenderer {
    async fn render(&self, url: &str, mode: RenderMode) -> RenderResult<PageRenderResult> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        let table = match mode {
            RenderMode::FullBrowser if self.browser => &self.browser_pages,
            _ => &self.static_pages,
        };
        let html = table
            .get(url)
            .cloned()
            .ok_or_else(|| RenderError::Browser(format!("no fixture for {url}")))?;

        let verdict = botwall::inspect(&html);
        if verdict.blocked {
            return Ok(PageRenderResult::blocked(
                url.to_string(),
                html,
                verdict.evidence.unwrap_or_default(),
            ));
        }
        Ok(PageRenderResult::new(url.to_string(), html))
    }

    fn supports_browser(&self) -> bool {
        self.browser
    }

    async fn probe_login_click(&self, _url: &str) -> RenderResult<Option<String>> {
        Ok(self.click_fragment.clone())
    }
}

/// Narrator that replays a fixed suggestion list and canned text.
struct ScriptedNarrator {
    suggestions: Vec<String>,
    suggest_calls: AtomicUsize,
}

impl ScriptedNarrator {
    fn new(suggestions: &[&str]) -> Self {
        Self {
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
            suggest_calls: AtomicUsize::new(0),
        }
    }

    fn silent() -> Self {
        Self::new(&[])
    }
}

#[async_trait]
impl Narrator for ScriptedNarrator {
    async fn summarize(
        &self,
        components: &[DetectedComponent],
        _source_url: &str,
    ) -> Result<String, NarrationError> {
        Ok(format!("scripted summary of {} component(s)", components.len()))
    }

    async fn explain_absence(
        &self,
        page_title: &str,
        attempted_links: &[String],
    ) -> Result<String, NarrationError> {
        Ok(format!(
            "nothing on \"{page_title}\" after {} attempts",
            attempted_links.len()
        ))
    }

    async fn suggest_links(
        &self,
        _page_elements: &[String],
        _base_url: &str,
    ) -> Result<Vec<String>, NarrationError> {
        self.suggest_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.suggestions.clone())
    }
}

/// Narrator whose every call fails, to prove narration errors never
/// escape the controller.
struct FailingNarrator;

#[async_trait]
impl Narrator for FailingNarrator {
    async fn summarize(
        &self,
        _components: &[DetectedComponent],
        _source_url: &str,
    ) -> Result<String, NarrationError> {
        Err(NarrationError::EmptyResponse)
    }

    async fn explain_absence(
        &self,
        _page_title: &str,
        _attempted_links: &[String],
    ) -> Result<String, NarrationError> {
        Err(NarrationError::EmptyResponse)
    }

    async fn suggest_links(
        &self,
        _page_elements: &[String],
        _base_url: &str,
    ) -> Result<Vec<String>, NarrationError> {
        Err(NarrationError::EmptyResponse)
    }
}

#[tokio::test]
async fn login_form_found_on_first_page() {
    let renderer = Arc::new(FixtureRenderer::static_only(&[(
        "https://site.test/",
        LOGIN_PAGE,
    )]));
    let narrator = Arc::new(ScriptedNarrator::silent());
    let explorer = AuthExplorer::new(renderer.clone(), narrator);

    let outcome = explorer.analyze("https://site.test/", false).await;

    assert!(outcome.found);
    assert_eq!(outcome.method, AnalysisMethod::Static);
    assert_eq!(outcome.components.len(), 1);
    assert_eq!(outcome.components[0].kind, ComponentKind::HtmlLoginForm);
    assert!(outcome.narrative.contains("scripted summary"));
    assert_eq!(renderer.calls(), 1);
}

#[tokio::test]
async fn invalid_url_fails_immediately() {
    let renderer = Arc::new(FixtureRenderer::static_only(&[]));
    let narrator = Arc::new(ScriptedNarrator::silent());
    let explorer = AuthExplorer::new(renderer.clone(), narrator);

    let outcome = explorer.analyze("not a url", false).await;

    assert!(!outcome.found);
    assert_eq!(outcome.method, AnalysisMethod::Error);
    assert!(outcome.error.is_some());
    assert_eq!(renderer.calls(), 0);
}

#[tokio::test]
async fn render_failure_becomes_error_outcome() {
    // No fixture registered: every render fails.
    let renderer = Arc::new(FixtureRenderer::static_only(&[]));
    let narrator = Arc::new(ScriptedNarrator::silent());
    let explorer = AuthExplorer::new(renderer, narrator);

    let outcome = explorer.analyze("https://down.test/", false).await;

    assert!(!outcome.found);
    assert_eq!(outcome.method, AnalysisMethod::Error);
    assert!(outcome.error.unwrap().contains("no fixture"));
}

#[tokio::test]
async fn blocked_page_sets_captcha_flag() {
    let challenge = "<html><head><title>Just a moment...</title></head><body></body></html>";
    let renderer = Arc::new(FixtureRenderer::static_only(&[(
        "https://walled.test/",
        challenge,
    )]));
    let narrator = Arc::new(ScriptedNarrator::silent());
    let explorer = AuthExplorer::new(renderer, narrator);

    let outcome = explorer.analyze("https://walled.test/", false).await;

    assert!(!outcome.found);
    assert!(outcome.captcha_detected);
    assert_eq!(outcome.method, AnalysisMethod::Blocked);
    assert!(outcome.narrative.contains("Anti-Bot"));
}

#[tokio::test]
async fn cyclic_suggestion_terminates_after_one_level() {
    // The suggester always points back at the entry URL, which is in the
    // visited set before any recursion happens.
    let renderer = Arc::new(FixtureRenderer::static_only(&[(
        "https://loop.test/",
        EMPTY_PAGE,
    )]));
    let narrator = Arc::new(ScriptedNarrator::new(&["https://loop.test/"]));
    let explorer = AuthExplorer::new(renderer.clone(), narrator.clone());

    let outcome = explorer.analyze("https://loop.test/", false).await;

    assert!(!outcome.found);
    assert_eq!(renderer.calls(), 1, "must not re-render a visited URL");
    assert_eq!(narrator.suggest_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn two_page_cycle_terminates() {
    // A suggests B, B suggests A. Each page renders exactly once.
    let renderer = Arc::new(FixtureRenderer::static_only(&[
        ("https://a.test/", EMPTY_PAGE),
        ("https://b.test/", EMPTY_PAGE),
    ]));
    let narrator = Arc::new(ScriptedNarrator::new(&[
        "https://b.test/",
        "https://a.test/",
    ]));
    let explorer = AuthExplorer::new(renderer.clone(), narrator).with_max_depth(5);

    let outcome = explorer.analyze("https://a.test/", false).await;

    assert!(!outcome.found);
    assert_eq!(renderer.calls(), 2);
}

#[tokio::test]
async fn total_work_is_bounded_by_depth_and_branching() {
    // Every page suggests two fresh URLs; with max_depth 2 the call tree
    // is at most 1 + 2 + 4 = 7 renders.
    let urls: Vec<String> = (0..64).map(|i| format!("https://n{i}.test/")).collect();
    let pages: Vec<(&str, &str)> = urls.iter().map(|u| (u.as_str(), EMPTY_PAGE)).collect();
    let renderer = Arc::new(FixtureRenderer::static_only(&pages));

    struct FanoutNarrator {
        counter: AtomicUsize,
    }

    #[async_trait]
    impl Narrator for FanoutNarrator {
        async fn summarize(
            &self,
            _c: &[DetectedComponent],
            _u: &str,
        ) -> Result<String, NarrationError> {
            Ok("found".into())
        }
        async fn explain_absence(
            &self,
            _t: &str,
            _a: &[String],
        ) -> Result<String, NarrationError> {
            Ok("nothing".into())
        }
        async fn suggest_links(
            &self,
            _e: &[String],
            _b: &str,
        ) -> Result<Vec<String>, NarrationError> {
            let base = self.counter.fetch_add(2, Ordering::SeqCst) + 1;
            Ok(vec![
                format!("https://n{base}.test/"),
                format!("https://n{}.test/", base + 1),
            ])
        }
    }

    let narrator = Arc::new(FanoutNarrator {
        counter: AtomicUsize::new(0),
    });
    let explorer = AuthExplorer::new(renderer.clone(), narrator).with_max_depth(2);

    let outcome = explorer.analyze("https://n0.test/", false).await;

    assert!(!outcome.found);
    assert!(
        renderer.calls() <= 7,
        "render calls {} exceed the 2^0+2^1+2^2 bound",
        renderer.calls()
    );
}

#[tokio::test]
async fn found_via_link_rewrites_narrative() {
    let renderer = Arc::new(FixtureRenderer::static_only(&[
        ("https://home.test/", EMPTY_PAGE),
        ("https://home.test/login", LOGIN_PAGE),
    ]));
    let narrator = Arc::new(ScriptedNarrator::new(&["https://home.test/login"]));
    let explorer = AuthExplorer::new(renderer, narrator);

    let outcome = explorer.analyze("https://home.test/", false).await;

    assert!(outcome.found);
    assert_eq!(outcome.url, "https://home.test/login");
    assert!(
        outcome
            .narrative
            .starts_with("Found via link from https://home.test/:"),
        "narrative was: {}",
        outcome.narrative
    );
    assert_eq!(outcome.components[0].kind, ComponentKind::HtmlLoginForm);
}

#[tokio::test]
async fn max_depth_stops_the_chain() {
    let renderer = Arc::new(FixtureRenderer::static_only(&[
        ("https://d0.test/", EMPTY_PAGE),
        ("https://d1.test/", EMPTY_PAGE),
        ("https://d2.test/", EMPTY_PAGE),
    ]));

    struct ChainNarrator;

    #[async_trait]
    impl Narrator for ChainNarrator {
        async fn summarize(
            &self,
            _c: &[DetectedComponent],
            _u: &str,
        ) -> Result<String, NarrationError> {
            Ok("found".into())
        }
        async fn explain_absence(&self, _t: &str, _a: &[String]) -> Result<String, NarrationError> {
            Ok("nothing".into())
        }
        async fn suggest_links(
            &self,
            _e: &[String],
            base_url: &str,
        ) -> Result<Vec<String>, NarrationError> {
            let next = match base_url {
                "https://d0.test/" => "https://d1.test/",
                "https://d1.test/" => "https://d2.test/",
                _ => return Ok(vec![]),
            };
            Ok(vec![next.to_string()])
        }
    }

    let explorer =
        AuthExplorer::new(renderer.clone(), Arc::new(ChainNarrator)).with_max_depth(1);

    let outcome = explorer.analyze("https://d0.test/", false).await;

    // d0 at depth 0 recurses into d1; d1 is at max depth and must not
    // recurse into d2.
    assert!(!outcome.found);
    assert_eq!(renderer.calls(), 2);
}

#[tokio::test]
async fn dynamism_upgrade_rerenders_spa_shells() {
    let spa_shell = r#"<html><body>
        <p>Please login to continue</p>
        <div id="root"></div>
        <script src="/js/main.chunk.js"></script>
        <script src="/js/vendor.js"></script>
        <script>boot()</script><script>x()</script>
    </body></html>"#;

    let renderer = Arc::new(FixtureRenderer::with_browser(
        &[("https://spa.test/", spa_shell)],
        &[("https://spa.test/", LOGIN_PAGE)],
    ));
    let narrator = Arc::new(ScriptedNarrator::silent());
    let explorer = AuthExplorer::new(renderer.clone(), narrator);

    // Non-interactive: static first, browser only after the classifier
    // votes for it.
    let outcome = explorer.analyze("https://spa.test/", false).await;

    assert!(outcome.found);
    assert_eq!(outcome.method, AnalysisMethod::BrowserRendered);
    assert_eq!(renderer.calls(), 2);
}

#[tokio::test]
async fn static_hit_skips_the_browser() {
    let renderer = Arc::new(FixtureRenderer::with_browser(
        &[("https://cheap.test/", LOGIN_PAGE)],
        &[("https://cheap.test/", LOGIN_PAGE)],
    ));
    let narrator = Arc::new(ScriptedNarrator::silent());
    let explorer = AuthExplorer::new(renderer.clone(), narrator);

    let outcome = explorer.analyze("https://cheap.test/", false).await;

    assert!(outcome.found);
    assert_eq!(outcome.method, AnalysisMethod::Static);
    assert_eq!(renderer.calls(), 1);
}

#[tokio::test]
async fn interactive_click_simulation_produces_dynamic_component() {
    let renderer = Arc::new(
        FixtureRenderer::with_browser(
            &[("https://modal.test/", EMPTY_PAGE)],
            &[("https://modal.test/", EMPTY_PAGE)],
        )
        .with_click_fragment(r#"<form><input type="password" name="pw"></form>"#),
    );
    let narrator = Arc::new(ScriptedNarrator::silent());
    let explorer = AuthExplorer::new(renderer, narrator);

    let outcome = explorer.analyze("https://modal.test/", true).await;

    assert!(outcome.found);
    assert_eq!(outcome.method, AnalysisMethod::DynamicInteraction);
    assert_eq!(outcome.components.len(), 1);
    assert_eq!(outcome.components[0].kind, ComponentKind::DynamicAuthForm);
}

#[tokio::test]
async fn path_probe_finds_conventional_login_page() {
    let renderer = Arc::new(FixtureRenderer::with_browser(
        &[("https://shop.test/", EMPTY_PAGE)],
        &[
            ("https://shop.test/", EMPTY_PAGE),
            ("https://shop.test/login", LOGIN_PAGE),
        ],
    ));
    let narrator = Arc::new(ScriptedNarrator::silent());
    let explorer = AuthExplorer::new(renderer, narrator);

    let outcome = explorer.analyze("https://shop.test/", true).await;

    assert!(outcome.found);
    assert_eq!(outcome.method, AnalysisMethod::PathNavigation);
    assert_eq!(outcome.url, "https://shop.test/login");
    assert_eq!(outcome.components.len(), 1);
    assert_eq!(outcome.components[0].kind, ComponentKind::NavigatedAuthPage);
}

#[tokio::test]
async fn narration_failures_never_escape() {
    let renderer = Arc::new(FixtureRenderer::static_only(&[(
        "https://quiet.test/",
        LOGIN_PAGE,
    )]));
    let explorer = AuthExplorer::new(renderer, Arc::new(FailingNarrator));

    let outcome = explorer.analyze("https://quiet.test/", false).await;

    // Detection still succeeds; the narrative falls back to canned text.
    assert!(outcome.found);
    assert!(!outcome.narrative.is_empty());
    assert!(outcome.error.is_none());

    let renderer = Arc::new(FixtureRenderer::static_only(&[(
        "https://quiet.test/",
        EMPTY_PAGE,
    )]));
    let explorer = AuthExplorer::new(renderer, Arc::new(FailingNarrator));
    let outcome = explorer.analyze("https://quiet.test/", false).await;
    assert!(!outcome.found);
    assert!(!outcome.narrative.is_empty());
}
