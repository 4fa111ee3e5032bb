use scraper::{Html, Selector};
use url::Url;

/// Fallback file name when an image URL has no usable path segment.
const DEFAULT_IMAGE_NAME: &str = "image";

/// Article body found on a source page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArticle {
    /// Outer HTML of the first element matching the article selector
    pub content: String,
    /// `src` of the first image inside the body, as written in the page
    pub image_src: Option<String>,
}

/// Extract the article body and its first image reference.
///
/// Returns `None` when no element matches `selector`. An unparsable selector
/// also yields `None`; selectors from [`Config`](crate::config::Config) are
/// validated at load time.
pub fn extract_article(html: &str, selector: &str) -> Option<ExtractedArticle> {
    let body_selector = Selector::parse(selector).ok()?;
    let img_selector = Selector::parse("img[src]").ok()?;

    let document = Html::parse_document(html);
    let body = document.select(&body_selector).next()?;

    let image_src = body
        .select(&img_selector)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty())
        .map(str::to_string);

    Some(ExtractedArticle {
        content: body.html(),
        image_src,
    })
}

/// Resolve an image `src` against the page it was found on.
pub fn resolve_image_url(page_url: &str, src: &str) -> Option<Url> {
    match Url::parse(src) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(page_url).ok()?.join(src).ok(),
        Err(_) => None,
    }
}

/// File name for an image: the last non-empty path segment of its URL.
pub fn image_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_IMAGE_NAME.to_string())
}
