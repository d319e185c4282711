use serde::{Deserialize, Serialize};

/// A product card found on a catalog page.
///
/// Only produced with a non-empty, absolute `detail_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingReference {
    pub brand: String,
    pub display_name: String,
    pub detail_url: String,
}

/// Price and qualifiers resolved for one size option of a detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeQuote {
    pub size: String,
    /// Raw, locale-formatted price text (e.g. `"₩ 1,234,000"`).
    pub price: String,
    /// Comma-joined qualifiers, possibly empty.
    pub note: String,
    /// Image URLs shared by every size of the listing.
    pub images: Vec<String>,
}

/// The unit handed to a [`crate::traits::ProductSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub brand: String,
    pub name: String,
    pub size: String,
    pub price: String,
    pub note: String,
    /// Detail page the quote was resolved from.
    pub url: String,
    pub images: Vec<String>,
    pub source: String,
}

impl ProductRecord {
    /// Joins one listing with every size quote of its detail page.
    pub fn join(listing: &ListingReference, quotes: Vec<SizeQuote>, source: &str) -> Vec<Self> {
        quotes
            .into_iter()
            .map(|quote| ProductRecord {
                brand: listing.brand.clone(),
                name: listing.display_name.clone(),
                size: quote.size,
                price: quote.price,
                note: quote.note,
                url: listing.detail_url.clone(),
                images: quote.images,
                source: source.to_string(),
            })
            .collect()
    }
}

/// Result of a [`crate::traits::ProductSink::save`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SaveReport {
    pub stored: u64,
}

/// Outcome of a full crawl-and-save run.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub records: Vec<ProductRecord>,
    /// Listings whose detail page failed and was skipped.
    pub failed_listings: usize,
    pub stored: u64,
}

/// Trims and replaces non-breaking spaces with ordinary spaces.
pub fn normalize_text(raw: &str) -> String {
    raw.trim().replace('\u{a0}', " ")
}
