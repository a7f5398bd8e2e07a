//! Page objects.
//!
//! Each page object composes resolution, action primitives and affordance
//! escalation into single async calls. Calls return `bool` or a small outcome
//! struct; turning `false` into a failure is the scenario layer's job.

mod app_shell;
mod event;
mod payment;

pub use app_shell::{AppShell, AppShellSelectors};
pub use event::{EventPage, EventSelectors, MediaKind};
pub use payment::{CardDetails, PaymentPage, PaymentSelectors};

use crate::action::Actions;
use crate::config::EnvironmentConfig;
use crate::driver::{LoadState, PageDriver};
use crate::locator::LocatorSpec;
use crate::resolve::Resolver;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Everything a page object needs to drive a page
#[derive(Debug, Clone)]
pub struct PageContext {
    /// The page
    pub page: Arc<dyn PageDriver>,
    /// Action primitives
    pub actions: Actions,
    /// Candidate resolver
    pub resolver: Resolver,
    /// Application root, without trailing slash
    pub base_url: String,
    /// Navigation timeout
    pub navigation_timeout: Duration,
}

impl PageContext {
    /// Context with default tuning
    #[must_use]
    pub fn new(page: Arc<dyn PageDriver>, base_url: impl Into<String>) -> Self {
        Self {
            page,
            actions: Actions::default(),
            resolver: Resolver::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            navigation_timeout: Duration::from_secs(30),
        }
    }

    /// Context tuned by a resolved environment
    #[must_use]
    pub fn from_environment(page: Arc<dyn PageDriver>, env: &EnvironmentConfig) -> Self {
        Self {
            page,
            actions: env.actions(),
            resolver: env.resolver(),
            base_url: env.base_url.clone(),
            navigation_timeout: env.timeouts.navigation(),
        }
    }

    /// Override the action primitives
    #[must_use]
    pub fn with_actions(mut self, actions: Actions) -> Self {
        self.actions = actions;
        self
    }

    /// Override the resolver
    #[must_use]
    pub const fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Driver as a trait object reference
    #[must_use]
    pub fn driver(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    /// Absolute URL for an application path
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Navigate to an application path; failures are logged
    pub async fn goto(&self, path: &str) -> bool {
        let url = self.url(path);
        match self
            .page
            .goto(&url, LoadState::DomContentLoaded, self.navigation_timeout)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(%url, error = %e, "navigation failed");
                false
            }
        }
    }

    /// Whether any candidate resolves to a visible element
    pub async fn any_visible(&self, candidates: &[LocatorSpec]) -> bool {
        self.resolver.resolve(self.driver(), candidates).await.is_found()
    }
}

/// A page or component of the application under test
#[async_trait]
pub trait PageObject: Send + Sync {
    /// URL pattern that matches this page (e.g., "/events/:id")
    fn url_pattern(&self) -> &str;

    /// Indicators that the page rendered
    fn ready_indicators(&self) -> &[LocatorSpec];

    /// Context the page drives
    fn context(&self) -> &PageContext;

    /// Page name for logging
    fn page_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Budget for the page to become ready
    fn load_timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Whether the URL matches and a ready indicator is visible
    async fn is_loaded(&self) -> bool {
        let ctx = self.context();
        let url = match ctx.page.current_url().await {
            Ok(url) => url,
            Err(e) => {
                debug!(page = self.page_name(), error = %e, "current url unavailable");
                return false;
            }
        };
        if !UrlMatcher::new(self.url_pattern()).matches(&url) {
            debug!(page = self.page_name(), %url, "url does not match");
            return false;
        }
        ctx.any_visible(self.ready_indicators()).await
    }

    /// Wait for the page to settle, then check it is loaded
    async fn wait_loaded(&self) -> bool {
        let ctx = self.context();
        if let Err(e) = ctx
            .page
            .wait_for_load_state(LoadState::DomContentLoaded, self.load_timeout())
            .await
        {
            debug!(page = self.page_name(), error = %e, "load state wait failed");
        }
        self.is_loaded().await
    }
}

/// URL pattern matcher for page objects.
///
/// Matching ignores scheme, host, query and fragment.
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    pattern: String,
    segments: Vec<UrlSegment>,
}

#[derive(Debug, Clone)]
enum UrlSegment {
    Literal(String),
    Wildcard,
    Parameter(String),
}

impl UrlMatcher {
    /// Create a matcher from a pattern
    ///
    /// Patterns support:
    /// - Literal segments: `/events`
    /// - Wildcards: `/events/*`
    /// - Named parameters: `/events/:id`
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == "*" {
                    UrlSegment::Wildcard
                } else if let Some(name) = s.strip_prefix(':') {
                    UrlSegment::Parameter(name.to_string())
                } else {
                    UrlSegment::Literal(s.to_string())
                }
            })
            .collect();

        Self {
            pattern: pattern.to_string(),
            segments,
        }
    }

    /// Check if a URL or path matches
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        let path_segments = segments_of(url);
        if path_segments.len() != self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(&path_segments)
            .all(|(segment, value)| match segment {
                UrlSegment::Literal(lit) => lit == value,
                UrlSegment::Wildcard | UrlSegment::Parameter(_) => true,
            })
    }

    /// Extract named parameters
    #[must_use]
    pub fn extract_params(&self, url: &str) -> HashMap<String, String> {
        let path_segments = segments_of(url);
        self.segments
            .iter()
            .zip(&path_segments)
            .filter_map(|(segment, value)| match segment {
                UrlSegment::Parameter(name) => Some((name.clone(), (*value).to_string())),
                _ => None,
            })
            .collect()
    }

    /// The original pattern
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Path of `url`, without scheme, host, query or fragment
#[must_use]
pub fn path_of(url: &str) -> &str {
    let rest = url
        .split_once("://")
        .map_or(url, |(_, after)| after.find('/').map_or("", |i| &after[i..]));
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    &rest[..end]
}

fn segments_of(url: &str) -> Vec<&str> {
    path_of(url).split('/').filter(|s| !s.is_empty()).collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockElement, MockPage};

    mod url_matcher_tests {
        use super::*;

        #[test]
        fn test_full_url_match() {
            let m = UrlMatcher::new("/events/:id");
            assert!(m.matches("https://app.test/events/abc123?tab=media#top"));
            assert!(!m.matches("https://app.test/events"));
            assert!(!m.matches("https://app.test/profile/abc"));
        }

        #[test]
        fn test_wildcard_and_params() {
            let m = UrlMatcher::new("/events/:id/*");
            assert!(m.matches("/events/42/media"));
            let params = m.extract_params("https://app.test/events/42/media");
            assert_eq!(params.get("id").map(String::as_str), Some("42"));
        }

        #[test]
        fn test_root_pattern() {
            let m = UrlMatcher::new("/");
            assert!(m.matches("https://app.test"));
            assert!(m.matches("https://app.test/"));
            assert_eq!(m.pattern(), "/");
        }

        #[test]
        fn test_path_of() {
            assert_eq!(path_of("https://app.test/a/b?q=1"), "/a/b");
            assert_eq!(path_of("/a#frag"), "/a");
            assert_eq!(path_of("https://app.test"), "");
        }
    }

    mod page_object_tests {
        use super::*;

        struct Dashboard {
            ctx: PageContext,
            ready: Vec<LocatorSpec>,
        }

        impl PageObject for Dashboard {
            fn url_pattern(&self) -> &str {
                "/dashboard"
            }

            fn ready_indicators(&self) -> &[LocatorSpec] {
                &self.ready
            }

            fn context(&self) -> &PageContext {
                &self.ctx
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_is_loaded_requires_url_and_indicator() {
            let page = MockPage::shared("https://app.test/dashboard");
            page.add_element(MockElement::new("h1.dashboard"));
            let dash = Dashboard {
                ctx: testing::context(&page),
                ready: vec!["h1.dashboard".into()],
            };
            assert!(dash.wait_loaded().await);

            page.hide(&"h1.dashboard".into());
            assert!(!dash.is_loaded().await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_wrong_url_not_loaded() {
            let page = MockPage::shared("https://app.test/settings");
            page.add_element(MockElement::new("h1.dashboard"));
            let dash = Dashboard {
                ctx: testing::context(&page),
                ready: vec!["h1.dashboard".into()],
            };
            assert!(!dash.is_loaded().await);
            assert!(dash.page_name().ends_with("Dashboard"));
        }

        #[tokio::test]
        async fn test_context_goto() {
            let page = MockPage::shared("https://app.test/");
            let ctx = testing::context(&page);
            assert!(ctx.goto("/events/new").await);
            assert_eq!(page.url(), "https://app.test/events/new");
            page.fail_next("goto", 1);
            assert!(!ctx.goto("/x").await);
        }
    }
}
