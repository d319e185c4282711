use crate::dom::{attribute_of, text_of};
use crate::error::{AppError, OrSentinel};
use crate::models::ListingReference;
use crate::selectors::SiteSelectors;
use crate::traits::{Document, Scope};

/// Placeholder for a text field whose element is absent.
pub const UNKNOWN: &str = "Unknown";

/// Parses one catalog card into a [`ListingReference`].
///
/// Returns `Ok(None)` for cards without a usable link; missing brand or name
/// become [`UNKNOWN`]. Driver failures are returned so the caller can skip
/// just this card.
pub async fn extract_card<D: Document>(
    doc: &D,
    card: &D::Element,
    selectors: &SiteSelectors,
) -> Result<Option<ListingReference>, AppError> {
    let scope = Scope::Within(card);

    let href = attribute_of(doc, scope, &selectors.card_link, "href")
        .await
        .or_sentinel(String::new())?;
    let Some(detail_url) = selectors.absolute_url(&href) else {
        tracing::debug!("Card has no detail link, skipping");
        return Ok(None);
    };

    let brand = text_of(doc, scope, &selectors.card_brand)
        .await
        .or_sentinel(UNKNOWN.into())?;
    let display_name = text_of(doc, scope, &selectors.card_name)
        .await
        .or_sentinel(UNKNOWN.into())?;

    Ok(Some(ListingReference {
        brand,
        display_name,
        detail_url,
    }))
}
