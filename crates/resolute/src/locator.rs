//! Locator specifications for finding UI affordances.
//!
//! A logical affordance ("the avatar icon", "the pin button") is described by
//! an ordered candidate list of [`LocatorSpec`]s. Earlier candidates are
//! preferred; several candidates may match the same physical element.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A single way of locating an element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocatorSpec {
    /// CSS selector (e.g., "button.primary")
    Css {
        /// Selector text
        selector: String,
    },
    /// ARIA role plus accessible name
    Role {
        /// Role (e.g., "button")
        role: String,
        /// Accessible name; empty matches any name
        name: String,
    },
    /// Text content selector
    Text {
        /// Text to look for
        text: String,
    },
    /// CSS selector filtered by text content
    CssWithText {
        /// Base CSS selector
        css: String,
        /// Text content to match
        text: String,
    },
    /// Test ID selector (data-testid attribute)
    TestId {
        /// Test id value
        id: String,
    },
}

impl LocatorSpec {
    /// Create a CSS locator
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css {
            selector: selector.into(),
        }
    }

    /// Create a role locator
    #[must_use]
    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: name.into(),
        }
    }

    /// Create a text locator
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a CSS-with-text locator
    #[must_use]
    pub fn css_with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::CssWithText {
            css: css.into(),
            text: text.into(),
        }
    }

    /// Create a test id locator
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId { id: id.into() }
    }

    /// Parse the textual candidate forms used in candidate lists and on the
    /// command line:
    ///
    /// - `role=button[name="Join"]`
    /// - `text=Join`
    /// - `data-testid=avatar`
    /// - `button:has-text("Join")`
    /// - anything else is taken as CSS
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let input = input.trim();

        if let Some(caps) = role_pattern().captures(input) {
            let role = caps.get(1).map_or("", |m| m.as_str());
            let name = caps.get(2).map_or("", |m| m.as_str());
            return Self::role(role, name);
        }
        if let Some(text) = input.strip_prefix("text=") {
            return Self::text(strip_quotes(text));
        }
        if let Some(id) = input.strip_prefix("data-testid=") {
            return Self::test_id(strip_quotes(id));
        }
        if let Some(caps) = has_text_pattern().captures(input) {
            let css = caps.get(1).map_or("", |m| m.as_str());
            let text = caps.get(2).map_or("", |m| m.as_str());
            let css = if css.is_empty() { "*" } else { css };
            return Self::css_with_text(css, text);
        }
        Self::css(input)
    }

    /// Parse a list of candidate strings, preserving order
    #[must_use]
    pub fn parse_all<S: AsRef<str>>(inputs: &[S]) -> Vec<Self> {
        inputs.iter().map(|s| Self::parse(s.as_ref())).collect()
    }

    /// JavaScript expression evaluating to an array of every matching element
    #[must_use]
    pub fn to_collect_query(&self) -> String {
        match self {
            Self::Css { selector } => {
                format!("Array.from(document.querySelectorAll({}))", js_string(selector))
            }
            Self::Text { text } => format!(
                "Array.from(document.querySelectorAll('body *')).filter(el => \
                 Array.from(el.childNodes).some(n => n.nodeType === 3 && n.textContent.includes({})))",
                js_string(text)
            ),
            Self::CssWithText { css, text } => format!(
                "Array.from(document.querySelectorAll({})).filter(el => \
                 (el.innerText || el.textContent || '').includes({}))",
                js_string(css),
                js_string(text)
            ),
            Self::TestId { id } => format!(
                "Array.from(document.querySelectorAll({}))",
                js_string(&test_id_selector(id))
            ),
            Self::Role { role, name } => {
                let implicit = implicit_role_selector(role);
                let name = js_string(name);
                format!(
                    "Array.from(document.querySelectorAll({sel})).filter(el => {{ \
                     const n = (el.getAttribute('aria-label') || el.innerText || el.textContent || '').trim(); \
                     return {name} === '' || n.includes({name}); }})",
                    sel = js_string(&format!("[role=\"{}\"]{implicit}", css_escape(role))),
                )
            }
        }
    }

    /// Plain CSS form, when one exists, for the raw DOM escalation script
    #[must_use]
    pub fn as_raw_css(&self) -> Option<String> {
        match self {
            Self::Css { selector } => Some(selector.clone()),
            Self::TestId { id } => Some(test_id_selector(id)),
            _ => None,
        }
    }
}

/// JSON-encoded string, which is also a valid JavaScript string literal
fn js_string(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

/// Escape a value for a double-quoted CSS attribute string
fn css_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn test_id_selector(id: &str) -> String {
    format!("[data-testid=\"{}\"]", css_escape(id))
}

impl fmt::Display for LocatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css { selector } => write!(f, "{selector}"),
            Self::Role { role, name } if name.is_empty() => write!(f, "role={role}"),
            Self::Role { role, name } => write!(f, "role={role}[name=\"{name}\"]"),
            Self::Text { text } => write!(f, "text={text}"),
            Self::CssWithText { css, text } => write!(f, "{css}:has-text(\"{text}\")"),
            Self::TestId { id } => write!(f, "data-testid={id}"),
        }
    }
}

impl From<&str> for LocatorSpec {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

fn role_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^role=([a-z]+)(?:\[name=["']([^"']*)["']\])?$"#)
            .unwrap_or_else(|e| panic!("invalid role pattern: {e}"))
    })
}

fn has_text_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^(.*?):has-text\(["'](.*)["']\)$"#)
            .unwrap_or_else(|e| panic!("invalid has-text pattern: {e}"))
    })
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'')
}

/// Extra selectors for elements that carry a role implicitly
fn implicit_role_selector(role: &str) -> &'static str {
    match role {
        "button" => ", button, input[type=\"button\"], input[type=\"submit\"]",
        "link" => ", a[href]",
        "textbox" => ", input:not([type]), input[type=\"text\"], input[type=\"email\"], textarea",
        "heading" => ", h1, h2, h3, h4, h5, h6",
        "img" => ", img",
        "checkbox" => ", input[type=\"checkbox\"]",
        "dialog" => ", dialog",
        _ => "",
    }
}
