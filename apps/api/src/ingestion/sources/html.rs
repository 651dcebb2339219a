//! Shared DOM helpers for the HTML extractors.

use reqwest::Url;
use scraper::{ElementRef, Selector};

use crate::ingestion::extractor::ExtractError;
use crate::text::collapse_whitespace;

pub fn sel(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Listing(format!("invalid selector '{css}': {e:?}")))
}

/// Visible text of an element with whitespace collapsed.
pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Text of the first match of `selector` under `scope`, if non-empty.
pub fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

pub fn first_attr<'a>(scope: ElementRef<'a>, selector: &Selector, attr: &str) -> Option<&'a str> {
    scope
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolves `href` against `base`. Absolute hrefs pass through.
pub fn absolute_url(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(String::from)
}

/// Last non-empty path segment of a URL or path, e.g. the id in `/vacancies/123`.
pub fn last_path_segment(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}
