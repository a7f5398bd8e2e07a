//! Subscription checkout with an optional one-time-passcode step.

use super::{PageContext, PageObject};
use crate::action::ActionResultExt;
use crate::driver::LoadState;
use crate::locator::LocatorSpec;
use crate::otp::OtpSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Card fields typed into the checkout form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    /// Card number
    pub number: String,
    /// Expiry, `MM/YY`
    pub expiry: String,
    /// Security code
    pub cvc: String,
    /// Cardholder name
    pub name: String,
}

impl CardDetails {
    /// Test card that always triggers the passcode challenge
    #[must_use]
    pub fn challenge_test_card() -> Self {
        Self {
            number: "4000 0027 6000 3184".into(),
            expiry: "12/34".into(),
            cvc: "123".into(),
            name: "Test Customer".into(),
        }
    }
}

/// Locators for the checkout flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentSelectors {
    /// Pricing route, relative to the base URL
    pub pricing_path: String,
    /// Card number input
    pub card_number: Vec<LocatorSpec>,
    /// Expiry input
    pub card_expiry: Vec<LocatorSpec>,
    /// Security code input
    pub card_cvc: Vec<LocatorSpec>,
    /// Cardholder name input
    pub card_name: Vec<LocatorSpec>,
    /// Pay / subscribe button
    pub submit: Vec<LocatorSpec>,
    /// Passcode input of the challenge step
    pub otp_input: Vec<LocatorSpec>,
    /// Confirms the passcode
    pub otp_submit: Vec<LocatorSpec>,
    /// Visible after a successful payment
    pub success: Vec<LocatorSpec>,
}

impl Default for PaymentSelectors {
    fn default() -> Self {
        Self {
            pricing_path: "/pricing".into(),
            card_number: LocatorSpec::parse_all(&[
                "input[name=cardnumber]",
                "data-testid=card-number",
            ]),
            card_expiry: LocatorSpec::parse_all(&["input[name=exp-date]", "data-testid=card-expiry"]),
            card_cvc: LocatorSpec::parse_all(&["input[name=cvc]", "data-testid=card-cvc"]),
            card_name: LocatorSpec::parse_all(&["input[name=name]", "data-testid=card-name"]),
            submit: LocatorSpec::parse_all(&[
                "data-testid=pay-button",
                "button:has-text(\"Subscribe\")",
                "button:has-text(\"Pay\")",
            ]),
            otp_input: LocatorSpec::parse_all(&[
                "input[autocomplete=one-time-code]",
                "input[name=otp]",
            ]),
            otp_submit: LocatorSpec::parse_all(&[
                "button:has-text(\"Verify\")",
                "button:has-text(\"Submit\")",
            ]),
            success: LocatorSpec::parse_all(&[
                "data-testid=payment-success",
                "text=Payment successful",
                "text=Thank you for subscribing",
            ]),
        }
    }
}

/// Candidates selecting the plan called `plan`
#[must_use]
pub fn plan_candidates(plan: &str) -> Vec<LocatorSpec> {
    let slug = plan.to_ascii_lowercase().replace(' ', "-");
    vec![
        LocatorSpec::css(format!("[data-plan=\"{slug}\"] button")),
        LocatorSpec::role("button", format!("Choose {plan}")),
        LocatorSpec::css_with_text("button", plan),
    ]
}

/// Checkout page object
#[derive(Debug, Clone)]
pub struct PaymentPage {
    ctx: PageContext,
    selectors: PaymentSelectors,
}

impl PaymentPage {
    /// Checkout with default selectors
    #[must_use]
    pub fn new(ctx: PageContext) -> Self {
        Self {
            ctx,
            selectors: PaymentSelectors::default(),
        }
    }

    /// Override selectors
    #[must_use]
    pub fn with_selectors(mut self, selectors: PaymentSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    /// Open pricing and pick `plan`
    pub async fn choose_plan(&self, plan: &str) -> bool {
        if !self.ctx.goto(&self.selectors.pricing_path).await {
            return false;
        }
        self.ctx
            .actions
            .click_any(self.ctx.driver(), &plan_candidates(plan))
            .await
            .passed()
    }

    /// Type the card fields
    pub async fn fill_card(&self, card: &CardDetails) -> bool {
        let page = self.ctx.driver();
        let actions = &self.ctx.actions;
        let fields = [
            (&self.selectors.card_number, card.number.as_str()),
            (&self.selectors.card_expiry, card.expiry.as_str()),
            (&self.selectors.card_cvc, card.cvc.as_str()),
            (&self.selectors.card_name, card.name.as_str()),
        ];
        for (candidates, value) in fields {
            if !actions.fill_any(page, candidates, value).await.passed() {
                return false;
            }
        }
        true
    }

    /// Press pay
    pub async fn submit(&self) -> bool {
        self.ctx
            .actions
            .click_any(self.ctx.driver(), &self.selectors.submit)
            .await
            .passed()
    }

    /// Answer the passcode challenge, if one is shown.
    ///
    /// No challenge counts as success.
    pub async fn complete_otp(
        &self,
        source: &dyn OtpSource,
        recipient: &str,
        since: DateTime<Utc>,
    ) -> bool {
        if !self.ctx.any_visible(&self.selectors.otp_input).await {
            debug!("no passcode challenge shown");
            return true;
        }

        let code = match source.fetch_code(recipient, since).await {
            Ok(Some(code)) => code,
            Ok(None) => {
                warn!(recipient, "passcode message had no code");
                return false;
            }
            Err(e) => {
                warn!(recipient, error = %e, "passcode retrieval failed");
                return false;
            }
        };

        let page = self.ctx.driver();
        let actions = &self.ctx.actions;
        let done = actions
            .fill_any(page, &self.selectors.otp_input, &code)
            .await
            .passed()
            && actions.click_any(page, &self.selectors.otp_submit).await.passed();
        if done {
            info!(recipient, "passcode submitted");
        }
        done
    }

    /// Whether the success banner shows
    pub async fn confirm_success(&self) -> bool {
        if let Err(e) = self
            .ctx
            .page
            .wait_for_load_state(LoadState::NetworkIdle, self.ctx.navigation_timeout)
            .await
        {
            debug!(error = %e, "network idle wait failed");
        }
        self.ctx.any_visible(&self.selectors.success).await
    }

    /// Choose `plan`, pay with `card`, answer the challenge and confirm
    pub async fn subscribe(
        &self,
        plan: &str,
        card: &CardDetails,
        otp: &dyn OtpSource,
        recipient: &str,
    ) -> bool {
        if !(self.choose_plan(plan).await && self.fill_card(card).await) {
            return false;
        }
        let since = Utc::now();
        let subscribed = self.submit().await
            && self.complete_otp(otp, recipient, since).await
            && self.confirm_success().await;
        if subscribed {
            info!(plan, "subscription completed");
        } else {
            warn!(plan, "subscription did not complete");
        }
        subscribed
    }
}

impl PageObject for PaymentPage {
    fn url_pattern(&self) -> &str {
        &self.selectors.pricing_path
    }

    fn ready_indicators(&self) -> &[LocatorSpec] {
        &self.selectors.card_number
    }

    fn context(&self) -> &PageContext {
        &self.ctx
    }

    fn page_name(&self) -> &str {
        "PaymentPage"
    }
}
