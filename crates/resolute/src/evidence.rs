//! Screenshot and video artifact locations.

use crate::driver::PageDriver;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where artifacts are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDirs {
    /// Root directory; `screenshots/` and `videos/` live under it
    pub root: PathBuf,
}

impl Default for ArtifactDirs {
    fn default() -> Self {
        Self::new(".")
    }
}

impl ArtifactDirs {
    /// Artifacts under `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Screenshot directory
    #[must_use]
    pub fn screenshots(&self) -> PathBuf {
        self.root.join("screenshots")
    }

    /// Video directory
    #[must_use]
    pub fn videos(&self) -> PathBuf {
        self.root.join("videos")
    }

    /// Path of the screenshot called `name`
    #[must_use]
    pub fn screenshot_path(&self, name: &str) -> PathBuf {
        self.screenshots()
            .join(format!("{}.png", sanitize_name(name)))
    }

    /// Take a screenshot called `name`.
    ///
    /// Failures are logged and yield `None`; evidence never fails a flow.
    pub async fn capture(&self, page: &dyn PageDriver, name: &str) -> Option<PathBuf> {
        let path = self.screenshot_path(name);
        if let Err(e) = ensure_parent(&path) {
            warn!(path = %path.display(), error = %e, "cannot create screenshot directory");
            return None;
        }
        match page.screenshot(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "screenshot captured");
                Some(path)
            }
            Err(e) => {
                warn!(screenshot = name, error = %e, "screenshot failed");
                None
            }
        }
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) => fs::create_dir_all(dir),
        None => Ok(()),
    }
}

/// Turn a locator or step name into a safe file stem
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.truncate(100);
    while out.ends_with('-') {
        let _ = out.pop();
    }
    if out.is_empty() {
        out.push_str("unnamed");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPage;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_locator() {
        assert_eq!(sanitize_name("button:has-text(\"Join\")"), "button-has-text-join");
        assert_eq!(sanitize_name("#missing"), "missing");
        assert_eq!(sanitize_name("///"), "unnamed");
    }

    #[test]
    fn test_paths() {
        let dirs = ArtifactDirs::new("/tmp/run");
        assert_eq!(dirs.videos(), PathBuf::from("/tmp/run/videos"));
        assert_eq!(
            dirs.screenshot_path("Pin toggled"),
            PathBuf::from("/tmp/run/screenshots/pin-toggled.png")
        );
    }

    #[tokio::test]
    async fn test_capture_creates_dir_and_calls_engine() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = ArtifactDirs::new(tmp.path());
        let page = MockPage::new("x");
        let path = dirs.capture(&page, "login").await.unwrap();
        assert!(dirs.screenshots().is_dir());
        assert!(page.was_called(&format!("screenshot:{}", path.display())));
    }

    #[tokio::test]
    async fn test_capture_failure_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let page = MockPage::new("x");
        page.fail_next("screenshot", 1);
        assert!(ArtifactDirs::new(tmp.path()).capture(&page, "x").await.is_none());
    }

    proptest! {
        #[test]
        fn prop_sanitized_is_safe(name in ".*") {
            let s = sanitize_name(&name);
            prop_assert!(!s.is_empty());
            prop_assert!(s.len() <= 100);
            prop_assert!(s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
    }
}
