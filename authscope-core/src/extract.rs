// Heuristic extraction of auth UI fragments from a parsed document.
//
// Nine independent structural rules, evaluated in a fixed order. Each rule
// is a pure function returning zero or more components; overlapping
// matches are kept because each detection method carries its own
// diagnostic value for the narrative step. Rule 6 is the single
// recall-boosting fallback and only runs when rules 1-5 produced nothing,
// which is passed in explicitly rather than read from shared state.

use crate::model::{ComponentKind, DetectedComponent, DetectionMethod};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;

const LOGIN_CLASS_MARKERS: &[&str] = &["login", "signin", "auth"];
const CONTAINER_CLASS_MARKERS: &[&str] = &["login", "signin", "auth", "form"];
const TESTID_MARKERS: &[&str] = &["login", "signin", "auth", "password"];
const WORDPRESS_NAME_MARKERS: &[&str] = &["usernameoremail", "user_login", "log"];
const USERNAME_LIKE_NAMES: &[&str] = &[
    "username",
    "email",
    "user",
    "login",
    "usernameoremail",
    "user_login",
    "log",
];

/// Run all heuristics over `document` in evaluation order. Pure function
/// of its input: the same document always yields the same ordered output.
pub fn extract_components(document: &Html, source_url: &str) -> Vec<DetectedComponent> {
    let mut components = Vec::new();

    components.extend(password_input_forms(document, source_url));
    components.extend(login_classed_forms(document, source_url));
    components.extend(username_password_pair(document, source_url));
    components.extend(wordpress_login_fields(document, source_url));
    components.extend(aria_labeled_passwords(document, source_url));

    let found_so_far = components.len();
    components.extend(login_input_combination(document, source_url, found_so_far));

    components.extend(auth_class_containers(document, source_url));
    components.extend(auth_testid_elements(document, source_url));
    components.extend(login_buttons_with_inputs(document, source_url));

    // Overlapping matches from different heuristics are kept on purpose,
    // but byte-identical records (same kind, method and fragment, e.g. a
    // password form that is also login-classed) carry no extra diagnostic
    // value and collapse to the first occurrence.
    let mut seen = HashSet::new();
    components.retain(|c| {
        seen.insert((c.kind, c.detection_method, c.html_fragment.clone()))
    });

    debug!(count = components.len(), url = source_url, "heuristic extraction complete");
    components
}

/// Rule 1: password-type inputs enclosed in a form.
fn password_input_forms(document: &Html, source_url: &str) -> Vec<DetectedComponent> {
    let selector = Selector::parse(r#"input[type="password"]"#).unwrap();
    document
        .select(&selector)
        .filter_map(|input| nearest_ancestor(input, &["form"]))
        .map(|form| {
            DetectedComponent::new(
                ComponentKind::HtmlLoginForm,
                &form.html(),
                DetectionMethod::TraditionalHtml,
                source_url,
            )
        })
        .collect()
}

/// Rule 2: forms whose class attribute reads like a login form.
fn login_classed_forms(document: &Html, source_url: &str) -> Vec<DetectedComponent> {
    let selector = Selector::parse("form[class]").unwrap();
    document
        .select(&selector)
        .filter(|form| {
            form.value()
                .attr("class")
                .is_some_and(|class| contains_any(class, LOGIN_CLASS_MARKERS))
        })
        .map(|form| {
            DetectedComponent::new(
                ComponentKind::HtmlLoginForm,
                &form.html(),
                DetectionMethod::TraditionalHtml,
                source_url,
            )
        })
        .collect()
}

/// Rule 3: inputs named exactly `username` and `password` both present.
/// Anchored at the first username input's enclosing container, first
/// match only, no matter how many username inputs exist.
fn username_password_pair(document: &Html, source_url: &str) -> Vec<DetectedComponent> {
    let username_selector = Selector::parse(r#"input[name="username"]"#).unwrap();
    let password_selector = Selector::parse(r#"input[name="password"]"#).unwrap();

    if document.select(&password_selector).next().is_none() {
        return Vec::new();
    }

    document
        .select(&username_selector)
        .filter_map(|input| nearest_ancestor(input, &["form", "div", "section"]))
        .take(1)
        .map(|container| {
            DetectedComponent::new(
                ComponentKind::InstagramStyleLogin,
                &container.html(),
                DetectionMethod::InstagramDetection,
                source_url,
            )
        })
        .collect()
}

/// Rule 4: WordPress-style field names, confirmed by a password signal in
/// the same container. Stops after the first emission.
fn wordpress_login_fields(document: &Html, source_url: &str) -> Vec<DetectedComponent> {
    let input_selector = Selector::parse("input[name]").unwrap();
    let password_selector = Selector::parse(r#"input[type="password"]"#).unwrap();

    for input in document.select(&input_selector) {
        let name = input.value().attr("name").unwrap_or("");
        if !contains_any(name, WORDPRESS_NAME_MARKERS) {
            continue;
        }
        let Some(container) = nearest_ancestor(input, &["form", "div", "section", "main"]) else {
            continue;
        };
        let has_password_input = container.select(&password_selector).next().is_some();
        if has_password_input || container.html().to_lowercase().contains("password") {
            return vec![DetectedComponent::new(
                ComponentKind::WordpressStyleLogin,
                &container.html(),
                DetectionMethod::WordpressDetection,
                source_url,
            )];
        }
    }

    Vec::new()
}

/// Rule 5: password fields labeled only through `aria-label`, common in
/// React apps that render divs instead of forms.
fn aria_labeled_passwords(document: &Html, source_url: &str) -> Vec<DetectedComponent> {
    let selector = Selector::parse("input[aria-label]").unwrap();
    document
        .select(&selector)
        .filter(|input| {
            input
                .value()
                .attr("aria-label")
                .is_some_and(|label| label.to_lowercase().contains("password"))
        })
        .filter_map(|input| nearest_ancestor(input, &["form", "div", "section"]))
        .map(|container| {
            DetectedComponent::new(
                ComponentKind::AriaLabeledPassword,
                &container.html(),
                DetectionMethod::AriaLabelDetection,
                source_url,
            )
        })
        .collect()
}

/// Rule 6: broadened username-like + password-like input combination.
/// Recall fallback - only runs when the high-precision rules all missed,
/// otherwise it would flood the output with noise.
fn login_input_combination(
    document: &Html,
    source_url: &str,
    found_so_far: usize,
) -> Vec<DetectedComponent> {
    if found_so_far > 0 {
        return Vec::new();
    }

    let input_selector = Selector::parse("input").unwrap();
    let inputs: Vec<ElementRef> = document.select(&input_selector).collect();

    let names: Vec<String> = inputs
        .iter()
        .map(|i| i.value().attr("name").unwrap_or("").to_lowercase())
        .collect();
    let types: Vec<String> = inputs
        .iter()
        .map(|i| i.value().attr("type").unwrap_or("").to_lowercase())
        .collect();

    let has_username = names
        .iter()
        .any(|n| USERNAME_LIKE_NAMES.contains(&n.as_str()));
    let has_password =
        types.iter().any(|t| t == "password") || names.iter().any(|n| n == "password");

    if !has_username || !has_password {
        return Vec::new();
    }

    for (input, name) in inputs.iter().zip(names.iter()) {
        if !matches!(name.as_str(), "username" | "email" | "password") {
            continue;
        }
        if let Some(container) = nearest_ancestor(*input, &["div", "section", "form", "main"]) {
            return vec![DetectedComponent::new(
                ComponentKind::DetectedLoginInputs,
                &container.html(),
                DetectionMethod::InputCombinationDetection,
                source_url,
            )];
        }
    }

    Vec::new()
}

/// Rule 7: containers with auth-suggestive classes holding at least two
/// typed descendants.
fn auth_class_containers(document: &Html, source_url: &str) -> Vec<DetectedComponent> {
    let container_selector =
        Selector::parse("div[class], section[class], main[class]").unwrap();
    let typed_selector = Selector::parse("[type]").unwrap();

    document
        .select(&container_selector)
        .filter(|container| {
            container.value().attr("class").is_some_and(|class| {
                !class.trim().is_empty() && contains_any(class, CONTAINER_CLASS_MARKERS)
            })
        })
        .filter(|container| container.select(&typed_selector).count() >= 2)
        .map(|container| {
            DetectedComponent::new(
                ComponentKind::JsAuthContainer,
                &container.html(),
                DetectionMethod::JavascriptContainer,
                source_url,
            )
        })
        .collect()
}

/// Rule 8: test automation attributes that name auth concepts.
fn auth_testid_elements(document: &Html, source_url: &str) -> Vec<DetectedComponent> {
    let selector = Selector::parse("[data-testid]").unwrap();
    document
        .select(&selector)
        .filter(|element| {
            element
                .value()
                .attr("data-testid")
                .is_some_and(|testid| contains_any(testid, TESTID_MARKERS))
        })
        .filter_map(|element| nearest_ancestor(element, &["div", "section", "form"]))
        .map(|container| {
            DetectedComponent::new(
                ComponentKind::DataAttrAuth,
                &container.html(),
                DetectionMethod::DataAttributes,
                source_url,
            )
        })
        .collect()
}

/// Rule 9: login-labeled buttons whose container also holds a typed
/// element.
fn login_buttons_with_inputs(document: &Html, source_url: &str) -> Vec<DetectedComponent> {
    let selector = Selector::parse("button, div").unwrap();
    let typed_selector = Selector::parse("[type]").unwrap();

    document
        .select(&selector)
        .filter(|element| is_login_label(&own_text(*element)))
        .filter_map(|element| nearest_ancestor(element, &["div", "section", "form"]))
        .filter(|container| container.select(&typed_selector).next().is_some())
        .map(|container| {
            DetectedComponent::new(
                ComponentKind::ButtonWithInputs,
                &container.html(),
                DetectionMethod::ButtonContext,
                source_url,
            )
        })
        .collect()
}

/// Walk up the tree to the closest ancestor whose tag is in `tags`.
fn nearest_ancestor<'a>(element: ElementRef<'a>, tags: &[&str]) -> Option<ElementRef<'a>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| tags.contains(&ancestor.value().name()))
}

fn contains_any(value: &str, markers: &[&str]) -> bool {
    let lowered = value.to_lowercase();
    markers.iter().any(|m| lowered.contains(m))
}

/// Text directly inside the element, excluding descendant elements. A
/// whole-page div mentioning "login" somewhere deep inside must not match
/// as a login button.
fn own_text(element: ElementRef) -> String {
    element
        .children()
        .filter_map(|child| child.value().as_text().map(|t| t.to_string()))
        .collect()
}

fn is_login_label(text: &str) -> bool {
    let squashed: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    squashed.contains("signin") || squashed.contains("login")
}
