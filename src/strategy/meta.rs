//! Homepage meta tag check.

use super::http::{FetchError, PageFetcher};
use super::CheckFailure;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::debug;

/// Checks for `<meta name="rapid-verify" content="<token>">` on the homepage.
pub struct MetaTagCheck {
    fetcher: Arc<dyn PageFetcher>,
    names: Vec<String>,
}

impl MetaTagCheck {
    /// Create a check accepting any of `names` as the tag name.
    #[must_use]
    pub fn new(fetcher: Arc<dyn PageFetcher>, names: Vec<String>) -> Self {
        Self { fetcher, names }
    }

    /// Pass iff a verification meta tag in `<head>` has content exactly
    /// equal to `token`.
    ///
    /// # Errors
    ///
    /// Returns a [`CheckFailure`] for fetch errors, non-2xx responses, a
    /// missing tag or a token mismatch.
    pub async fn check(&self, domain: &str, token: &str) -> Result<(), CheckFailure> {
        let url = format!("https://{domain}/");
        let page = self.fetcher.fetch(&url).await.map_err(|e| match e {
            FetchError::TooLarge(limit) => CheckFailure::BodyTooLarge(limit),
            FetchError::Network(msg) => CheckFailure::HomepageFetch(msg),
        })?;

        if !page.is_success() {
            return Err(CheckFailure::HomepageStatus(page.status));
        }

        let contents = meta_contents(&page.body, &self.names);
        debug!("{} verification meta tag(s) on {url}", contents.len());

        if contents.is_empty() {
            Err(CheckFailure::MetaTagMissing)
        } else if contents.iter().any(|c| c == token) {
            Ok(())
        } else {
            Err(CheckFailure::MetaTagMismatch)
        }
    }
}

/// `content` values of every `<head>` `<meta>` whose `name` is one of `names`.
fn meta_contents(html: &str, names: &[String]) -> Vec<String> {
    let Ok(selector) = Selector::parse("head meta") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    document
        .select(&selector)
        .filter(|el| {
            el.value()
                .attr("name")
                .is_some_and(|name| names.iter().any(|n| n.eq_ignore_ascii_case(name.trim())))
        })
        .filter_map(|el| el.value().attr("content").map(str::to_string))
        .collect()
}
