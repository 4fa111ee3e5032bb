use anyhow::Result;
use feed_rs::parser;

/// A `(title, url)` pair taken from one feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub url: String,
}

/// Parsed entries plus the number dropped for lacking a title or link.
#[derive(Debug)]
pub struct ParseResult {
    pub entries: Vec<FeedEntry>,
    pub skipped: usize,
}

/// Parse RSS/Atom/JSON Feed bytes into entries, keeping document order.
pub fn parse_feed(bytes: &[u8]) -> Result<ParseResult> {
    let feed = parser::parse(bytes)?;

    let mut skipped = 0;
    let entries = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry
                .title
                .map(|t| t.content.trim().to_string())
                .filter(|t| !t.is_empty());
            let url = entry
                .links
                .first()
                .map(|l| l.href.trim().to_string())
                .filter(|u| !u.is_empty());

            match (title, url) {
                (Some(title), Some(url)) => Some(FeedEntry { title, url }),
                _ => {
                    skipped += 1;
                    None
                }
            }
        })
        .collect();

    Ok(ParseResult { entries, skipped })
}
