//! Article enrichment: full body markup and lead image scraped from the
//! source page of each tracked item.

mod decode;
mod enricher;
mod extract;

pub use decode::decode_page;
pub use enricher::{enrich_pending, EnrichReport};
pub use extract::{extract_article, image_name, resolve_image_url, ExtractedArticle};
