//! Event page: create, join, pin, gift and media posting.

use super::{PageContext, PageObject};
use crate::action::{ActionResultExt, ToggleOutcome};
use crate::locator::LocatorSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Kind of media posted to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image
    Photo,
    /// Video clip
    Video,
}

impl MediaKind {
    /// Guess the kind from a file extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "heic" => Some(Self::Photo),
            "mp4" | "mov" | "webm" | "m4v" => Some(Self::Video),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Photo => write!(f, "photo"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Locators for the event page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSelectors {
    /// Opens the create-event form
    pub create_button: Vec<LocatorSpec>,
    /// Event title input
    pub title_input: Vec<LocatorSpec>,
    /// Submits the create-event form
    pub create_submit: Vec<LocatorSpec>,
    /// Visible on an event once it is open
    pub event_indicators: Vec<LocatorSpec>,
    /// Join-by-code input
    pub join_code_input: Vec<LocatorSpec>,
    /// Join button
    pub join_button: Vec<LocatorSpec>,
    /// Pin toggle
    pub pin_button: LocatorSpec,
    /// Gift button
    pub gift_button: LocatorSpec,
    /// Attribute observed around toggles
    pub toggle_attribute: String,
    /// Hidden file input for media
    pub file_input: LocatorSpec,
    /// Posts uploaded media; empty when upload posts immediately
    pub post_button: Vec<LocatorSpec>,
    /// Visible once a photo is posted
    pub photo_preview: Vec<LocatorSpec>,
    /// Visible once a video is posted
    pub video_preview: Vec<LocatorSpec>,
}

impl Default for EventSelectors {
    fn default() -> Self {
        Self {
            create_button: LocatorSpec::parse_all(&[
                "data-testid=create-event",
                "role=button[name=\"Create event\"]",
                "button:has-text(\"New event\")",
            ]),
            title_input: LocatorSpec::parse_all(&[
                "input[name=title]",
                "data-testid=event-title",
            ]),
            create_submit: LocatorSpec::parse_all(&[
                "button[type=submit]",
                "button:has-text(\"Create\")",
            ]),
            event_indicators: LocatorSpec::parse_all(&[
                "data-testid=event-header",
                "h1.event-title",
            ]),
            join_code_input: LocatorSpec::parse_all(&[
                "input[name=code]",
                "data-testid=join-code",
            ]),
            join_button: LocatorSpec::parse_all(&[
                "#join-event",
                "button:has-text(\"Join\")",
            ]),
            pin_button: LocatorSpec::css("button.pin"),
            gift_button: LocatorSpec::css("button.gift"),
            toggle_attribute: "class".into(),
            file_input: LocatorSpec::css("input[type=file]"),
            post_button: LocatorSpec::parse_all(&[
                "data-testid=post-media",
                "button:has-text(\"Post\")",
            ]),
            photo_preview: LocatorSpec::parse_all(&[
                "data-testid=media-photo",
                "img.media-preview",
            ]),
            video_preview: LocatorSpec::parse_all(&[
                "data-testid=media-video",
                "video.media-preview",
            ]),
        }
    }
}

/// Event page object
#[derive(Debug, Clone)]
pub struct EventPage {
    ctx: PageContext,
    selectors: EventSelectors,
}

impl EventPage {
    /// Event page with default selectors
    #[must_use]
    pub fn new(ctx: PageContext) -> Self {
        Self {
            ctx,
            selectors: EventSelectors::default(),
        }
    }

    /// Override selectors
    #[must_use]
    pub fn with_selectors(mut self, selectors: EventSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    /// Create an event titled `title` and wait for it to open
    pub async fn create_event(&self, title: &str) -> bool {
        let page = self.ctx.driver();
        let actions = &self.ctx.actions;
        let created = actions.click_any(page, &self.selectors.create_button).await.passed()
            && actions
                .fill_any(page, &self.selectors.title_input, title)
                .await
                .passed()
            && actions.click_any(page, &self.selectors.create_submit).await.passed()
            && self.ctx.any_visible(&self.selectors.event_indicators).await;
        if created {
            info!(title, "event created");
        }
        created
    }

    /// Join an event by its code
    pub async fn join_event(&self, code: &str) -> bool {
        let page = self.ctx.driver();
        let actions = &self.ctx.actions;
        let joined = actions
            .fill_any(page, &self.selectors.join_code_input, code)
            .await
            .passed()
            && actions.click_any(page, &self.selectors.join_button).await.passed()
            && self.ctx.any_visible(&self.selectors.event_indicators).await;
        if joined {
            info!(code, "joined event");
        }
        joined
    }

    /// Toggle the pin; a working pin reports `changed`
    pub async fn toggle_pin(&self) -> ToggleOutcome {
        self.ctx
            .actions
            .toggle(
                self.ctx.driver(),
                &self.selectors.pin_button,
                &self.selectors.toggle_attribute,
            )
            .await
    }

    /// Press the gift button; it is expected to leave its state unchanged
    pub async fn press_gift(&self) -> ToggleOutcome {
        let outcome = self
            .ctx
            .actions
            .toggle(
                self.ctx.driver(),
                &self.selectors.gift_button,
                &self.selectors.toggle_attribute,
            )
            .await;
        if outcome.changed {
            warn!(before = ?outcome.before, after = ?outcome.after, "gift button changed state");
        }
        outcome
    }

    /// Post media through the hidden file input and wait for its preview.
    ///
    /// The preview awaited follows the file's extension.
    pub async fn upload(&self, path: &Path) -> bool {
        let Some(kind) = MediaKind::from_path(path) else {
            warn!(path = %path.display(), "not a photo or video extension");
            return false;
        };
        if !path.is_file() {
            warn!(path = %path.display(), "media file does not exist");
            return false;
        }

        let page = self.ctx.driver();
        let actions = &self.ctx.actions;
        let files = [PathBuf::from(path)];
        if !actions
            .upload(page, &self.selectors.file_input, &files)
            .await
            .passed()
        {
            return false;
        }
        if !self.selectors.post_button.is_empty()
            && !actions.click_any(page, &self.selectors.post_button).await.passed()
        {
            return false;
        }

        let preview = match kind {
            MediaKind::Photo => &self.selectors.photo_preview,
            MediaKind::Video => &self.selectors.video_preview,
        };
        let posted = self.ctx.any_visible(preview).await;
        if posted {
            info!(%kind, path = %path.display(), "media posted");
        } else {
            warn!(%kind, "media preview did not appear");
        }
        posted
    }
}

impl PageObject for EventPage {
    fn url_pattern(&self) -> &str {
        "/events/:id"
    }

    fn ready_indicators(&self) -> &[LocatorSpec] {
        &self.selectors.event_indicators
    }

    fn context(&self) -> &PageContext {
        &self.ctx
    }

    fn page_name(&self) -> &str {
        "EventPage"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::{MockEffect, MockElement, MockPage};
    use crate::pages::testing;
    use std::sync::Arc;

    fn event_page(page: &Arc<MockPage>) -> EventPage {
        EventPage::new(testing::context(page))
    }

    mod kind_tests {
        use super::*;

        #[test]
        fn test_from_path() {
            assert_eq!(MediaKind::from_path(Path::new("a/b.JPG")), Some(MediaKind::Photo));
            assert_eq!(MediaKind::from_path(Path::new("clip.mp4")), Some(MediaKind::Video));
            assert_eq!(MediaKind::from_path(Path::new("notes.txt")), None);
            assert_eq!(MediaKind::from_path(Path::new("noext")), None);
        }
    }

    mod create_join_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_create_event() {
            let page = MockPage::shared("https://app.test/events");
            page.add_element(MockElement::new("button").with_text("New event"));
            page.add_element(MockElement::new("input[name=title]").tag("input"));
            page.add_element(
                MockElement::new("button[type=submit]")
                    .on_click(MockEffect::RevealHere("h1.event-title".into())),
            );
            page.add_element(MockElement::new("h1.event-title").hidden());

            assert!(event_page(&page).create_event("Launch party").await);
            assert_eq!(
                page.value_of(&"input[name=title]".into()).as_deref(),
                Some("Launch party")
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_join_resolves_second_candidate() {
            let page = MockPage::shared("https://app.test/events");
            page.add_element(MockElement::new("input[name=code]").tag("input"));
            page.add_element(
                MockElement::new("button")
                    .with_text("Join")
                    .on_click(MockEffect::Navigate("https://app.test/events/abc".into()))
                    .on_click(MockEffect::RevealHere("h1.event-title".into())),
            );
            page.add_element(MockElement::new("h1.event-title").hidden());

            let events = event_page(&page);
            assert!(events.join_event("ABC-123").await);
            assert!(page.was_called("click:button:has-text(\"Join\")"));
            assert!(events.is_loaded().await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_join_without_button() {
            let page = MockPage::shared("https://app.test/events");
            page.add_element(MockElement::new("input[name=code]").tag("input"));
            assert!(!event_page(&page).join_event("ABC-123").await);
        }
    }

    mod toggle_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_pin_reports_change() {
            let page = MockPage::shared("https://app.test/events/abc");
            page.add_element(
                MockElement::new("button.pin")
                    .attr("class", "pin")
                    .on_click(MockEffect::SetAttribute {
                        name: "class".into(),
                        value: "pin-active".into(),
                    }),
            );
            let outcome = event_page(&page).toggle_pin().await;
            assert!(outcome.found);
            assert!(outcome.changed);
            assert_eq!(outcome.before.as_deref(), Some("pin"));
            assert_eq!(outcome.after.as_deref(), Some("pin-active"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_gift_reports_unchanged() {
            let page = MockPage::shared("https://app.test/events/abc");
            page.add_element(MockElement::new("button.gift").attr("class", "gift"));
            let outcome = event_page(&page).press_gift().await;
            assert!(outcome.found);
            assert!(!outcome.changed);
        }
    }

    mod upload_tests {
        use super::*;

        fn media_page() -> Arc<MockPage> {
            let page = MockPage::shared("https://app.test/events/abc");
            page.add_element(MockElement::new("input[type=file]").tag("input").hidden());
            page.add_element(
                MockElement::new("button")
                    .with_text("Post")
                    .on_click(MockEffect::RevealHere("img.media-preview".into())),
            );
            page.add_element(MockElement::new("img.media-preview").hidden());
            page
        }

        #[tokio::test(start_paused = true)]
        async fn test_photo_through_hidden_input() {
            let dir = tempfile::tempdir().unwrap();
            let photo = dir.path().join("beach.jpg");
            std::fs::write(&photo, b"jpeg").unwrap();

            let page = media_page();
            assert!(event_page(&page).upload(&photo).await);
            assert_eq!(
                page.value_of(&"input[type=file]".into()),
                Some(photo.display().to_string())
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_video_preview_missing() {
            let dir = tempfile::tempdir().unwrap();
            let clip = dir.path().join("clip.mp4");
            std::fs::write(&clip, b"mp4").unwrap();

            let page = media_page();
            assert!(!event_page(&page).upload(&clip).await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_extension_selects_video_preview() {
            let dir = tempfile::tempdir().unwrap();
            let clip = dir.path().join("Clip.MOV");
            std::fs::write(&clip, b"mov").unwrap();

            let page = MockPage::shared("https://app.test/events/abc");
            page.add_element(MockElement::new("input[type=file]").tag("input").hidden());
            page.add_element(
                MockElement::new("button")
                    .with_text("Post")
                    .on_click(MockEffect::RevealHere("video.media-preview".into())),
            );
            page.add_element(MockElement::new("video.media-preview").hidden());

            assert!(event_page(&page).upload(&clip).await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_unknown_extension_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let notes = dir.path().join("notes.txt");
            std::fs::write(&notes, b"txt").unwrap();

            let page = media_page();
            assert!(!event_page(&page).upload(&notes).await);
            assert!(!page.was_called("set_input_files"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_missing_file_never_touches_page() {
            let page = media_page();
            assert!(!event_page(&page).upload(Path::new("/nonexistent/x.png")).await);
            assert!(!page.was_called("set_input_files"));
        }
    }
}
