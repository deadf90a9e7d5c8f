// Natural-language narration and link suggestion through an external
// language model. The model is a black box behind the `Narrator` trait;
// everything here must degrade gracefully because model output is the
// least trustworthy input in the system.

use crate::model::DetectedComponent;
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Hard cap on suggested navigation links per request.
pub const MAX_SUGGESTED_LINKS: usize = 3;

/// How many clickable elements go into the link-suggestion prompt.
const MAX_PROMPT_ELEMENTS: usize = 15;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2:latest";

#[derive(Error, Debug)]
pub enum NarrationError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model returned an empty response")]
    EmptyResponse,
}

#[async_trait]
pub trait Narrator: Send + Sync {
    /// Describe the auth system behind a non-empty set of components.
    async fn summarize(
        &self,
        components: &[DetectedComponent],
        source_url: &str,
    ) -> Result<String, NarrationError>;

    /// Explain why a page yielded nothing, given its title and the links
    /// that were attempted.
    async fn explain_absence(
        &self,
        page_title: &str,
        attempted_links: &[String],
    ) -> Result<String, NarrationError>;

    /// Suggest up to [`MAX_SUGGESTED_LINKS`] candidate navigation URLs
    /// likely to lead to a login page. Malformed model output degrades to
    /// an empty list, never to an error.
    async fn suggest_links(
        &self,
        page_elements: &[String],
        base_url: &str,
    ) -> Result<Vec<String>, NarrationError>;
}

// ---- Ollama-backed implementation ----

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

pub struct OllamaNarrator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaNarrator {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_OLLAMA_URL, DEFAULT_MODEL)
    }

    pub fn with_endpoint(base_url: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    async fn chat(&self, prompt: String) -> Result<String, NarrationError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;

        let content = response.message.content.trim().to_string();
        if content.is_empty() {
            return Err(NarrationError::EmptyResponse);
        }
        Ok(content)
    }
}

impl Default for OllamaNarrator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Narrator for OllamaNarrator {
    async fn summarize(
        &self,
        components: &[DetectedComponent],
        source_url: &str,
    ) -> Result<String, NarrationError> {
        let sample: String = components
            .iter()
            .take(3)
            .map(|c| {
                let fragment: String = c.html_fragment.chars().take(500).collect();
                format!("[{:?} via {:?}]\n{}\n", c.kind, c.detection_method, fragment)
            })
            .collect();

        let prompt = format!(
            "Authentication components found on {source_url}! Analyze what type of \
             login system this is:\n\n{sample}\nBriefly describe:\n\
             1. Type of authentication (form-based, modal, etc.)\n\
             2. What fields are present\n\
             3. Any special features"
        );

        self.chat(prompt).await
    }

    async fn explain_absence(
        &self,
        page_title: &str,
        attempted_links: &[String],
    ) -> Result<String, NarrationError> {
        let prompt = format!(
            "No authentication components found on page: \"{page_title}\"\n\n\
             Suggested links checked: {attempted_links:?}\n\n\
             Briefly explain:\n\
             1. Why this page might not have login forms\n\
             2. What type of page this appears to be\n\
             3. Whether login might be handled differently (JS, modals, etc.)"
        );

        self.chat(prompt).await
    }

    async fn suggest_links(
        &self,
        page_elements: &[String],
        base_url: &str,
    ) -> Result<Vec<String>, NarrationError> {
        if page_elements.is_empty() {
            // Nothing clickable to reason about; probe the conventional
            // paths instead of wasting a model call.
            debug!("no clickable elements, falling back to conventional auth paths");
            return Ok(conventional_auth_paths(base_url));
        }

        let digest = page_elements
            .iter()
            .take(MAX_PROMPT_ELEMENTS)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Find authentication/login URLs from these page elements:\n\n{digest}\n\n\
             Look for ANY of these patterns:\n\
             - Text: \"Sign In\", \"Sign in\", \"Login\", \"Log In\", \"Account\", \"Your Account\"\n\
             - URLs: \"/signin\", \"/login\", \"/ap/signin\", \"/gp/signin\", \"/auth\", \"/account\"\n\
             - Buttons that might trigger login (even if text doesn't say login)\n\
             - Links to account/profile pages\n\n\
             IMPORTANT: Even if text doesn't explicitly say \"login\", include URLs that \
             could lead to authentication.\n\n\
             Return ONLY JSON array: [\"url1\", \"url2\"]"
        );

        let reply = self.chat(prompt).await?;
        let suggested = parse_suggested_links(&reply);
        if suggested.is_empty() {
            warn!("model reply yielded no usable links");
        }

        Ok(resolve_links(&suggested, base_url))
    }
}

/// Extract a URL list from a model reply. The happy path is a JSON array,
/// possibly with single quotes or surrounded by prose; the salvage path
/// scans for quoted auth-looking strings. Unparseable replies yield an
/// empty list.
fn parse_suggested_links(reply: &str) -> Vec<String> {
    let cleaned = reply.replace('\'', "\"");
    if let (Some(start), Some(end)) = (cleaned.find('['), cleaned.rfind(']'))
        && end > start
        && let Ok(urls) = serde_json::from_str::<Vec<String>>(&cleaned[start..=end])
    {
        return urls;
    }

    quoted_strings(reply)
        .into_iter()
        .filter(|s| {
            let lowered = s.to_lowercase();
            lowered.contains("login") || lowered.contains("signin") || lowered.contains("auth")
        })
        .collect()
}

fn quoted_strings(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    for quote in ['"', '\''] {
        let parts: Vec<&str> = s.split(quote).collect();
        for chunk in parts.iter().skip(1).step_by(2) {
            if !chunk.is_empty() {
                out.push(chunk.to_string());
            }
        }
    }
    out
}

/// Resolve suggestions against the page URL, dropping anything that does
/// not parse, and cap the result.
fn resolve_links(suggestions: &[String], base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };

    suggestions
        .iter()
        .filter_map(|s| base.join(s).ok())
        .map(|u| u.to_string())
        .take(MAX_SUGGESTED_LINKS)
        .collect()
}

/// Conventional auth paths to probe when a page offers nothing clickable.
/// A few big properties use non-obvious paths worth special-casing.
pub fn conventional_auth_paths(base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let host = base.host_str().unwrap_or("").to_lowercase();

    let paths: &[&str] = if host.contains("amazon") {
        &["/ap/signin", "/gp/signin", "/signin"]
    } else if host.contains("twitter") || host.contains("x.com") {
        &["/login", "/i/flow/login"]
    } else if host.contains("facebook") {
        &["/login", "/login.php"]
    } else if host.contains("google") {
        &["/accounts/signin", "/signin"]
    } else {
        &["/login", "/signin", "/auth", "/account/login"]
    };

    paths
        .iter()
        .filter_map(|p| base.join(p).ok())
        .map(|u| u.to_string())
        .take(MAX_SUGGESTED_LINKS)
        .collect()
}

/// Build the clickable-element digest used in the link-suggestion prompt:
/// every link, every typed button/input, and class-suggestive divs.
pub fn collect_clickable_elements(document: &Html) -> Vec<String> {
    let mut elements = Vec::new();

    let link_selector = Selector::parse("a[href]").unwrap();
    for link in document.select(&link_selector) {
        let href = link.value().attr("href").unwrap_or("");
        let class = link.value().attr("class").unwrap_or("");
        let text = link.text().collect::<String>().trim().to_string();
        elements.push(format!("<a href='{href}' class='{class}'>{text}</a>"));
    }

    let typed_selector = Selector::parse("button[type], input[type], div[type]").unwrap();
    for element in document.select(&typed_selector) {
        let tag = element.value().name();
        let typ = element.value().attr("type").unwrap_or("");
        let class = element.value().attr("class").unwrap_or("");
        let text = element.text().collect::<String>().trim().to_string();
        elements.push(format!("<{tag} type='{typ}' class='{class}'>{text}</{tag}>"));
    }

    let div_selector = Selector::parse("div[class]").unwrap();
    for div in document.select(&div_selector) {
        let class = div.value().attr("class").unwrap_or("").to_lowercase();
        let suggestive = ["login", "signin", "auth", "button", "click"]
            .iter()
            .any(|kw| class.contains(kw));
        if suggestive {
            let text: String = div.text().collect::<String>().trim().chars().take(50).collect();
            elements.push(format!("<div class='{class}'>{text}</div>"));
        }
    }

    elements
}

/// Title text of a parsed page, or a placeholder.
pub fn page_title(document: &Html) -> String {
    let selector = Selector::parse("title").unwrap();
    document
        .select(&selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "No title".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComponentKind, DetectionMethod};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_reply(content: &str) -> serde_json::Value {
        serde_json::json!({
            "model": "llama3.2:latest",
            "message": { "role": "assistant", "content": content },
            "done": true
        })
    }

    #[tokio::test]
    async fn summarize_returns_model_content() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
                "Form-based login with username and password fields.",
            )))
            .mount(&mock_server)
            .await;

        let narrator = OllamaNarrator::with_endpoint(&mock_server.uri(), "llama3.2:latest");
        let components = vec![DetectedComponent::new(
            ComponentKind::HtmlLoginForm,
            "<form><input type='password'></form>",
            DetectionMethod::TraditionalHtml,
            "https://example.com/login",
        )];

        let summary = narrator
            .summarize(&components, "https://example.com/login")
            .await
            .unwrap();
        assert!(summary.contains("Form-based login"));
    }

    #[tokio::test]
    async fn suggest_links_parses_clean_json_arrays() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chat_reply(r#"["/login", "/account/signin"]"#)),
            )
            .mount(&mock_server)
            .await;

        let narrator = OllamaNarrator::with_endpoint(&mock_server.uri(), "llama3.2:latest");
        let links = narrator
            .suggest_links(
                &["<a href='/login'>Sign in</a>".to_string()],
                "https://example.com/",
            )
            .await
            .unwrap();

        assert_eq!(
            links,
            vec![
                "https://example.com/login".to_string(),
                "https://example.com/account/signin".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn suggest_links_repairs_single_quotes_and_prose() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
                "Here are the URLs you asked for: ['/login', '/signin'] - good luck!",
            )))
            .mount(&mock_server)
            .await;

        let narrator = OllamaNarrator::with_endpoint(&mock_server.uri(), "llama3.2:latest");
        let links = narrator
            .suggest_links(&["<a href='/login'>login</a>".to_string()], "https://example.com/")
            .await
            .unwrap();

        assert_eq!(links.len(), 2);
        assert_eq!(links[0], "https://example.com/login");
    }

    #[tokio::test]
    async fn suggest_links_salvages_quoted_urls_from_garbage() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
                "I think \"/login\" looks promising, and maybe \"/pricing\" too.",
            )))
            .mount(&mock_server)
            .await;

        let narrator = OllamaNarrator::with_endpoint(&mock_server.uri(), "llama3.2:latest");
        let links = narrator
            .suggest_links(&["<a href='/x'>x</a>".to_string()], "https://example.com/")
            .await
            .unwrap();

        // Only the auth-looking quoted string survives.
        assert_eq!(links, vec!["https://example.com/login".to_string()]);
    }

    #[tokio::test]
    async fn unparseable_reply_degrades_to_empty_not_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chat_reply("I cannot help with that request.")),
            )
            .mount(&mock_server)
            .await;

        let narrator = OllamaNarrator::with_endpoint(&mock_server.uri(), "llama3.2:latest");
        let links = narrator
            .suggest_links(&["<a href='/x'>x</a>".to_string()], "https://example.com/")
            .await
            .unwrap();
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn empty_digest_falls_back_to_conventional_paths() {
        // No mock server needed - the model is never called.
        let narrator = OllamaNarrator::with_endpoint("http://127.0.0.1:1", "llama3.2:latest");
        let links = narrator
            .suggest_links(&[], "https://shop.example.com/")
            .await
            .unwrap();
        assert_eq!(
            links,
            vec![
                "https://shop.example.com/login".to_string(),
                "https://shop.example.com/signin".to_string(),
                "https://shop.example.com/auth".to_string(),
            ]
        );
    }

    #[test]
    fn conventional_paths_are_domain_aware() {
        let amazon = conventional_auth_paths("https://www.amazon.com/");
        assert_eq!(amazon[0], "https://www.amazon.com/ap/signin");

        let twitter = conventional_auth_paths("https://x.com/home");
        assert_eq!(twitter[0], "https://x.com/login");

        let generic = conventional_auth_paths("https://example.org/");
        assert_eq!(generic.len(), MAX_SUGGESTED_LINKS);
    }

    #[test]
    fn clickable_digest_includes_links_and_suggestive_divs() {
        let document = Html::parse_document(
            r#"<html><body>
                <a href="/login" class="nav">Sign in</a>
                <input type="submit" class="go">
                <div class="login-modal-trigger">Open login</div>
                <div class="footer">boring</div>
            </body></html>"#,
        );
        let digest = collect_clickable_elements(&document);
        assert_eq!(digest.len(), 3);
        assert!(digest[0].contains("/login"));
        assert!(digest.iter().any(|e| e.contains("login-modal-trigger")));
    }

    #[test]
    fn page_title_handles_missing_title() {
        let titled = Html::parse_document("<html><head><title> Acme </title></head></html>");
        assert_eq!(page_title(&titled), "Acme");

        let untitled = Html::parse_document("<html><body></body></html>");
        assert_eq!(page_title(&untitled), "No title");
    }
}
