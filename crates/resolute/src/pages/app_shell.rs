//! Application shell: avatar menu, settings, sign out.

use super::{PageContext, PageObject};
use crate::action::ActionResultExt;
use crate::locator::LocatorSpec;
use crate::resolve::{Activation, Affordance, UrlFallback};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Locators for the application shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppShellSelectors {
    /// Avatar / profile menu trigger
    pub avatar: Vec<LocatorSpec>,
    /// Raw CSS queries for the in-page avatar click
    pub avatar_script_queries: Vec<String>,
    /// Settings route, relative to the base URL
    pub settings_path: String,
    /// Settings entry in the profile menu
    pub settings_entry: Vec<LocatorSpec>,
    /// Visible on the settings page
    pub settings_indicators: Vec<LocatorSpec>,
    /// Sign-out entry
    pub sign_out_entry: Vec<LocatorSpec>,
    /// Visible once signed out
    pub signed_out_indicators: Vec<LocatorSpec>,
    /// Visible while signed in
    pub signed_in_indicators: Vec<LocatorSpec>,
}

impl Default for AppShellSelectors {
    fn default() -> Self {
        Self {
            avatar: LocatorSpec::parse_all(&[
                "[data-testid=user-avatar]",
                "img.avatar",
                "role=button[name=\"Profile\"]",
                "header button:has-text(\"Account\")",
            ]),
            avatar_script_queries: vec![
                "[data-testid=user-avatar]".into(),
                "img[alt*=avatar i]".into(),
                "header img[src*=googleusercontent]".into(),
            ],
            settings_path: "/settings".into(),
            settings_entry: LocatorSpec::parse_all(&[
                "role=menuitem[name=\"Settings\"]",
                "a[href$=\"/settings\"]",
                "text=Settings",
            ]),
            settings_indicators: LocatorSpec::parse_all(&[
                "[data-testid=settings-page]",
                "h1:has-text(\"Settings\")",
            ]),
            sign_out_entry: LocatorSpec::parse_all(&[
                "role=menuitem[name=\"Sign out\"]",
                "button:has-text(\"Log out\")",
                "text=Sign out",
            ]),
            signed_out_indicators: LocatorSpec::parse_all(&[
                "role=button[name=\"Sign in\"]",
                "a:has-text(\"Log in\")",
            ]),
            signed_in_indicators: LocatorSpec::parse_all(&[
                "[data-testid=user-avatar]",
                "img.avatar",
            ]),
        }
    }
}

/// Application shell page object
#[derive(Debug, Clone)]
pub struct AppShell {
    ctx: PageContext,
    selectors: AppShellSelectors,
}

impl AppShell {
    /// Shell with default selectors
    #[must_use]
    pub fn new(ctx: PageContext) -> Self {
        Self {
            ctx,
            selectors: AppShellSelectors::default(),
        }
    }

    /// Override selectors
    #[must_use]
    pub fn with_selectors(mut self, selectors: AppShellSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    /// Selectors in use
    #[must_use]
    pub const fn selectors(&self) -> &AppShellSelectors {
        &self.selectors
    }

    /// The avatar affordance with its full escalation chain
    #[must_use]
    pub fn avatar(&self) -> Affordance {
        Affordance::new("avatar", self.selectors.avatar.clone())
            .with_script_queries(self.selectors.avatar_script_queries.clone())
            .with_url_fallback(UrlFallback::new(
                self.ctx.url(&self.selectors.settings_path),
                self.selectors.settings_indicators.clone(),
            ))
    }

    /// Open the profile menu.
    ///
    /// [`Activation::Navigated`] means the menu could not be opened and the
    /// settings page was reached directly instead.
    pub async fn open_profile_menu(&self) -> Activation {
        match self.ctx.resolver.activate(self.ctx.driver(), &self.avatar()).await {
            Ok(activation) => activation,
            Err(e) => {
                warn!(error = %e, "profile menu activation failed");
                Activation::NotFound
            }
        }
    }

    /// Reach the settings page through the menu, or by navigation
    pub async fn open_settings(&self) -> bool {
        let page = self.ctx.driver();
        match self.open_profile_menu().await {
            Activation::Navigated { .. } => return true,
            Activation::NotFound => {}
            _ => {
                if self
                    .ctx
                    .actions
                    .click_any(page, &self.selectors.settings_entry)
                    .await
                    .passed()
                    && self.ctx.any_visible(&self.selectors.settings_indicators).await
                {
                    info!("settings opened from profile menu");
                    return true;
                }
            }
        }

        let fallback = UrlFallback::new(
            self.ctx.url(&self.selectors.settings_path),
            self.selectors.settings_indicators.clone(),
        );
        self.ctx.resolver.navigate_verified(page, &fallback).await
    }

    /// Sign out through the profile menu
    pub async fn sign_out(&self) -> bool {
        if !self.open_profile_menu().await.succeeded() {
            return false;
        }
        if !self
            .ctx
            .actions
            .click_any(self.ctx.driver(), &self.selectors.sign_out_entry)
            .await
            .passed()
        {
            return false;
        }
        let signed_out = self.ctx.any_visible(&self.selectors.signed_out_indicators).await;
        if signed_out {
            info!("signed out");
        } else {
            warn!("sign-out clicked but no signed-out indicator appeared");
        }
        signed_out
    }

    /// Whether a signed-in indicator is visible
    pub async fn is_signed_in(&self) -> bool {
        self.ctx.any_visible(&self.selectors.signed_in_indicators).await
    }
}

impl PageObject for AppShell {
    fn url_pattern(&self) -> &str {
        "/*"
    }

    fn ready_indicators(&self) -> &[LocatorSpec] {
        &self.selectors.signed_in_indicators
    }

    fn context(&self) -> &PageContext {
        &self.ctx
    }

    fn page_name(&self) -> &str {
        "AppShell"
    }
}
