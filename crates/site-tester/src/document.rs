//! Parsed snapshot of a rendered document.
//!
//! Taken after the load event (and grace wait), so it reflects the DOM as
//! the page's scripts left it, not the markup that was served.

use scraper::{Html, Selector};

use crate::types::{CheckError, SiteTesterResult};

/// The rendered DOM handed to native and selector site predicates.
pub struct Document {
    url: String,
    html: Html,
}

impl Document {
    /// Parse serialized document HTML (typically `documentElement.outerHTML`).
    pub fn parse(url: impl Into<String>, html: &str) -> Self {
        Self {
            url: url.into(),
            html: Html::parse_document(html),
        }
    }

    /// Base location the document was rendered at.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Text of the first `<title>`, trimmed.
    pub fn title(&self) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        self.html
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
    }

    /// Inner HTML of every element matching `css`, in document order.
    pub fn select_inner_html(&self, css: &str) -> SiteTesterResult<Vec<String>> {
        let selector = parse_selector(css)?;
        Ok(self.html.select(&selector).map(|el| el.inner_html()).collect())
    }

    /// Text content of every element matching `css`, in document order.
    pub fn select_text(&self, css: &str) -> SiteTesterResult<Vec<String>> {
        let selector = parse_selector(css)?;
        Ok(self
            .html
            .select(&selector)
            .map(|el| el.text().collect::<String>())
            .collect())
    }

    /// The underlying parsed tree.
    pub fn html(&self) -> &Html {
        &self.html
    }
}

fn parse_selector(css: &str) -> SiteTesterResult<Selector> {
    Selector::parse(css).map_err(|e| CheckError::Selector(format!("{css}: {e:?}")))
}
