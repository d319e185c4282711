//! Infinite-scroll pagination.
//!
//! Catalog pages mount more cards as the viewport nears the bottom, with no
//! page count and no "done" signal. [`PaginationEngine`] keeps scrolling in
//! human-sized steps until the document has stalled: the viewport reaches
//! the bottom *and* the height did not grow since the previous step. A
//! single unchanged height reading is not enough, because content may still
//! be queued to mount.

use std::collections::HashSet;

use crate::card::extract_card;
use crate::config::{CrawlConfig, ScrollMode};
use crate::dom::evaluate_number;
use crate::error::AppError;
use crate::models::ListingReference;
use crate::selectors::SiteSelectors;
use crate::timing::Pacer;
use crate::traits::{Document, Scope};

pub const SCROLL_HEIGHT_JS: &str = "document.body.scrollHeight";
pub const VIEWPORT_BOTTOM_JS: &str = "window.scrollY + window.innerHeight";
pub const SCROLL_TO_BOTTOM_JS: &str = "window.scrollTo(0, document.body.scrollHeight)";

pub fn scroll_by_js(px: u64) -> String {
    format!("window.scrollBy(0, {px})")
}

/// How a scroll loop ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSummary {
    pub iterations: u32,
    pub final_height: f64,
    /// False when the loop hit `max_scroll_iterations` instead of stalling.
    pub stalled: bool,
}

/// Reveals every lazily-loaded card on a catalog page.
pub struct PaginationEngine<'a> {
    selectors: &'a SiteSelectors,
    config: &'a CrawlConfig,
    pacer: &'a Pacer,
}

impl<'a> PaginationEngine<'a> {
    pub fn new(selectors: &'a SiteSelectors, config: &'a CrawlConfig, pacer: &'a Pacer) -> Self {
        Self {
            selectors,
            config,
            pacer,
        }
    }

    /// Loads `url`, scrolls until the catalog stops growing and returns the
    /// deduplicated listings.
    ///
    /// Fails with [`AppError::PageLoad`] when no card shows up in time.
    pub async fn collect<D: Document>(
        &self,
        doc: &D,
        url: &str,
    ) -> Result<Vec<ListingReference>, AppError> {
        tracing::info!(%url, "Loading catalog page");
        doc.goto(url).await?;

        match doc
            .wait_for_selector(&self.selectors.product_card, self.config.catalog_timeout)
            .await
        {
            Ok(_) => {}
            Err(AppError::SelectorTimeout { selector, .. }) => {
                return Err(AppError::PageLoad {
                    url: url.to_string(),
                    selector,
                });
            }
            Err(e) => return Err(e),
        }
        doc.wait_for_timeout(self.pacer.delay(self.pacer.config().catalog_settle))
            .await;

        self.switch_language(doc).await;

        let summary = self.scroll_to_end(doc).await?;
        tracing::info!(
            iterations = summary.iterations,
            height = summary.final_height,
            stalled = summary.stalled,
            "Catalog fully scrolled"
        );

        self.extract_cards(doc).await
    }

    /// Scrolls until the stall condition holds (or the iteration cap is hit).
    pub async fn scroll_to_end<D: Document>(&self, doc: &D) -> Result<ScrollSummary, AppError> {
        let mut previous = evaluate_number(doc, SCROLL_HEIGHT_JS).await?;
        let mut iterations = 0;

        while iterations < self.config.max_scroll_iterations {
            iterations += 1;

            match self.config.scroll {
                ScrollMode::Increment { min_px, max_px } => {
                    let step = self.pacer.step(min_px, max_px);
                    doc.evaluate(&scroll_by_js(step)).await?;
                }
                ScrollMode::ToBottom => {
                    doc.evaluate(SCROLL_TO_BOTTOM_JS).await?;
                }
            }
            doc.wait_for_timeout(self.pacer.delay(self.pacer.config().scroll_pause))
                .await;

            let height = evaluate_number(doc, SCROLL_HEIGHT_JS).await?;
            let bottom = evaluate_number(doc, VIEWPORT_BOTTOM_JS).await?;
            tracing::debug!(iterations, height, bottom, previous, "Scrolled");

            if bottom >= height && height == previous {
                return Ok(ScrollSummary {
                    iterations,
                    final_height: height,
                    stalled: true,
                });
            }
            previous = height;
        }

        tracing::warn!(
            iterations,
            height = previous,
            "Catalog kept growing; stopped at the scroll iteration cap"
        );
        Ok(ScrollSummary {
            iterations,
            final_height: previous,
            stalled: false,
        })
    }

    /// Parses every card currently in the document.
    ///
    /// Cards that fail to parse or have no link are skipped; listings are
    /// deduplicated by detail URL, first occurrence wins.
    pub async fn extract_cards<D: Document>(
        &self,
        doc: &D,
    ) -> Result<Vec<ListingReference>, AppError> {
        let cards = doc
            .query_selector_all(Scope::Document, &self.selectors.product_card)
            .await?;

        let mut seen = HashSet::new();
        let mut listings = Vec::with_capacity(cards.len());
        for (index, card) in cards.iter().enumerate() {
            match extract_card(doc, card, self.selectors).await {
                Ok(Some(listing)) => {
                    if seen.insert(listing.detail_url.clone()) {
                        listings.push(listing);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(index, error = %e, "Failed to parse product card, skipping");
                }
            }
        }

        tracing::info!(
            cards = cards.len(),
            listings = listings.len(),
            "Extracted listings"
        );
        Ok(listings)
    }

    /// Switches the storefront language. Best effort: any failure is logged.
    async fn switch_language<D: Document>(&self, doc: &D) {
        let Some(switch) = &self.selectors.language else {
            return;
        };
        if let Err(e) = self.try_switch_language(doc, &switch.toggle, &switch.choice).await {
            tracing::warn!(error = %e, "Language switch failed, continuing");
        }
    }

    async fn try_switch_language<D: Document>(
        &self,
        doc: &D,
        toggle: &str,
        choice: &str,
    ) -> Result<(), AppError> {
        let Some(button) = doc.query_selector(Scope::Document, toggle).await? else {
            tracing::debug!("No language picker on page");
            return Ok(());
        };
        doc.click(&button).await?;
        doc.wait_for_timeout(self.pacer.delay(self.pacer.config().language_open))
            .await;

        if let Some(language) = doc.query_selector(Scope::Document, choice).await? {
            doc.click(&language).await?;
            doc.wait_for_timeout(self.pacer.delay(self.pacer.config().language_apply))
                .await;
            tracing::debug!("Switched storefront language");
        }
        Ok(())
    }
}
