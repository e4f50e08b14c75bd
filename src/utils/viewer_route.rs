use url::Url;

/// Address of the viewer page and the `?src=` convention used to hand it a
/// document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerRoute {
    base: String,
}

impl ViewerRoute {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        // Query and fragment never belong to the route itself
        let base = base
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string();
        Self { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Viewer address that will load `src`.
    pub fn viewer_url_for(&self, src: &str) -> String {
        format!("{}?src={}", self.base, urlencoding::encode(src))
    }

    /// True for the viewer page itself, whatever its parameters. These URLs
    /// must never be classified as a PDF source or we would redirect in a loop.
    pub fn owns(&self, url: &str) -> bool {
        if self.base.is_empty() || !url.starts_with(&self.base) {
            return false;
        }
        matches!(url[self.base.len()..].chars().next(), None | Some('?' | '#'))
    }

    /// Decoded `src` parameter of a viewer URL.
    pub fn source_from(&self, url: &str) -> Option<String> {
        if !self.owns(url) {
            return None;
        }
        Url::parse(url)
            .ok()?
            .query_pairs()
            .find(|(key, _)| key == "src")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    }
}
