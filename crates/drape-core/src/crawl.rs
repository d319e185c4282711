use crate::config::CrawlConfig;
use crate::error::AppError;
use crate::models::{CrawlReport, ListingReference, ProductRecord, SizeQuote};
use crate::pagination::PaginationEngine;
use crate::resolver::SizeResolver;
use crate::selectors::SiteSelectors;
use crate::timing::Pacer;
use crate::traits::{Document, NullSink, PageSource, ProductSink};

/// Orchestrates a crawl run: paginate → resolve each listing → join → save.
///
/// Generic over the browser and the persistence sink via traits, so the
/// whole flow runs against mocks in tests. Listings are visited strictly one
/// after another on fresh pages; every page is closed whatever the outcome.
pub struct CrawlService<S>
where
    S: ProductSink,
{
    selectors: SiteSelectors,
    config: CrawlConfig,
    pacer: Pacer,
    sink: Option<S>,
}

impl<S> CrawlService<S>
where
    S: ProductSink,
{
    /// Create a new CrawlService without persistence.
    pub fn new(selectors: SiteSelectors, config: CrawlConfig, pacer: Pacer) -> Self {
        Self {
            selectors,
            config,
            pacer,
            sink: None,
        }
    }

    /// Create a new CrawlService that saves each run's batch to `sink`.
    pub fn with_sink(
        selectors: SiteSelectors,
        config: CrawlConfig,
        pacer: Pacer,
        sink: S,
    ) -> Self {
        Self {
            selectors,
            config,
            pacer,
            sink: Some(sink),
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Crawl `catalog_url` and return every record, without persisting.
    ///
    /// Only a catalog that never renders fails the run; a failing detail
    /// page is logged and skipped.
    pub async fn crawl<P: PageSource>(
        &self,
        pages: &P,
        catalog_url: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ProductRecord>, AppError> {
        let (records, _failed) = self.collect(pages, catalog_url, limit).await?;
        Ok(records)
    }

    /// Crawl, then hand the whole batch to the sink in a single call.
    ///
    /// Storage failures are returned as-is and not retried. Callers that must
    /// emit the records before persisting them use [`CrawlService::crawl`]
    /// and call the sink themselves, as the `drape` binary does.
    pub async fn crawl_and_save<P: PageSource>(
        &self,
        pages: &P,
        catalog_url: &str,
        limit: Option<usize>,
    ) -> Result<CrawlReport, AppError> {
        let (records, failed_listings) = self.collect(pages, catalog_url, limit).await?;

        let stored = if let Some(sink) = &self.sink {
            let report = sink.save(&records, &self.config.source).await?;
            tracing::info!(
                stored = report.stored,
                source = %self.config.source,
                "Saved crawl batch"
            );
            report.stored
        } else {
            0
        };

        Ok(CrawlReport {
            records,
            failed_listings,
            stored,
        })
    }

    /// Discovers every listing on a catalog page.
    pub async fn fetch_listings<P: PageSource>(
        &self,
        pages: &P,
        catalog_url: &str,
    ) -> Result<Vec<ListingReference>, AppError> {
        let page = pages.open_page().await?;
        let engine = PaginationEngine::new(&self.selectors, &self.config, &self.pacer);
        let result = engine.collect(&page, catalog_url).await;
        page.close().await;
        result
    }

    /// Resolves the size quotes of one listing on a fresh page.
    pub async fn resolve_listing<P: PageSource>(
        &self,
        pages: &P,
        listing: &ListingReference,
    ) -> Result<Vec<SizeQuote>, AppError> {
        let page = pages.open_page().await?;
        let resolver = SizeResolver::new(&self.selectors, &self.config, &self.pacer);
        let result = resolver.resolve(&page, &listing.detail_url).await;
        page.close().await;
        result
    }

    async fn collect<P: PageSource>(
        &self,
        pages: &P,
        catalog_url: &str,
        limit: Option<usize>,
    ) -> Result<(Vec<ProductRecord>, usize), AppError> {
        let mut listings = self.fetch_listings(pages, catalog_url).await?;
        let found = listings.len();
        if let Some(limit) = limit {
            listings.truncate(limit);
        }
        let total = listings.len();
        tracing::info!(found, crawling = total, "Listings discovered");

        let mut records = Vec::new();
        let mut failed = 0;
        for (i, listing) in listings.iter().enumerate() {
            tracing::info!(
                "[{}/{}] {} - {}",
                i + 1,
                total,
                listing.brand,
                listing.display_name
            );

            match self.resolve_listing(pages, listing).await {
                Ok(quotes) if quotes.is_empty() => {
                    tracing::info!(url = %listing.detail_url, "No size options, nothing to record");
                }
                Ok(quotes) => {
                    records.extend(ProductRecord::join(listing, quotes, &self.config.source));
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        url = %listing.detail_url,
                        error = %e,
                        "Listing failed, continuing with the next one"
                    );
                }
            }

            if i + 1 < total {
                let pause = self.pacer.listing_pause();
                tracing::debug!(pause_ms = %pause.as_millis(), "Pausing before next listing");
                tokio::time::sleep(pause).await;
            }
        }

        tracing::info!(
            records = records.len(),
            listings = total,
            failed,
            "Crawl complete"
        );
        Ok((records, failed))
    }
}

impl CrawlService<NullSink> {
    /// Create a CrawlService whose [`crawl_and_save`](Self::crawl_and_save)
    /// stores nothing.
    pub fn without_sink(selectors: SiteSelectors, config: CrawlConfig, pacer: Pacer) -> Self {
        Self::new(selectors, config, pacer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use std::time::Duration;

    use crate::timing::{DelayRange, TimingConfig};

    fn service_without_sink() -> CrawlService<NullSink> {
        CrawlService::without_sink(
            SiteSelectors::farfetch(),
            CrawlConfig::default(),
            Pacer::seeded(TimingConfig::instant(), 7),
        )
    }

    fn service_with_sink(sink: MockSink) -> CrawlService<MockSink> {
        CrawlService::with_sink(
            SiteSelectors::farfetch(),
            CrawlConfig::default().with_source("farfetch"),
            Pacer::seeded(TimingConfig::instant(), 7),
            sink,
        )
    }

    fn two_size_detail(base: u32) -> PageFixture {
        PageFixture::Detail(DetailFixture::new(vec![
            OptionFixture::new("S", PriceView::standard(&format!("₩ {base},000"))),
            OptionFixture::new("M", PriceView::standard(&format!("₩ {},000", base + 50))),
        ]))
    }

    #[tokio::test]
    async fn end_to_end_two_cards_two_sizes_four_records() {
        let pages = MockPages::new()
            .with_page(CATALOG_URL, catalog_with_listings(2))
            .with_page(&detail_url(1), two_size_detail(100))
            .with_page(&detail_url(2), two_size_detail(300));
        let sink = MockSink::new();
        let svc = service_with_sink(sink.clone());

        let report = svc
            .crawl_and_save(&pages, CATALOG_URL, None)
            .await
            .unwrap();

        assert_eq!(report.records.len(), 4);
        assert_eq!(report.stored, 4);
        assert_eq!(report.failed_listings, 0);

        let saved = sink.saved.lock().unwrap();
        assert_eq!(saved.len(), 1, "sink must be called exactly once");
        let (batch, source) = &saved[0];
        assert_eq!(source, "farfetch");
        assert_eq!(batch, &report.records);
        assert!(batch.iter().all(|r| r.source == "farfetch"));

        let urls: Vec<_> = batch.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                detail_url(1).as_str(),
                detail_url(1).as_str(),
                detail_url(2).as_str(),
                detail_url(2).as_str(),
            ]
        );
        assert!(batch.iter().all(|r| r.url != CATALOG_URL));
        assert_eq!(batch[3].price, "₩ 350,000");
    }

    #[tokio::test]
    async fn records_of_one_listing_share_images() {
        let pages = MockPages::new()
            .with_page(CATALOG_URL, catalog_with_listings(1))
            .with_page(&detail_url(1), two_size_detail(100));
        let svc = service_without_sink();

        let records = svc.crawl(&pages, CATALOG_URL, None).await.unwrap();

        assert_eq!(records.len(), 2);
        assert!(!records[0].images.is_empty());
        assert_eq!(records[0].images, records[1].images);
    }

    #[tokio::test]
    async fn listing_without_size_selector_is_skipped_without_aborting() {
        let pages = MockPages::new()
            .with_page(CATALOG_URL, catalog_with_listings(3))
            .with_page(&detail_url(1), two_size_detail(100))
            .with_page(
                &detail_url(2),
                PageFixture::Detail(DetailFixture::without_size_selector()),
            )
            .with_page(&detail_url(3), two_size_detail(500));
        let svc = service_without_sink();

        let records = svc.crawl(&pages, CATALOG_URL, None).await.unwrap();

        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.url != detail_url(2)));
    }

    #[tokio::test]
    async fn failing_listing_is_isolated() {
        let failing = PageFixture::Detail(DetailFixture::new(vec![
            OptionFixture::new("S", PriceView::standard("₩ 1")),
            OptionFixture {
                click_fails: true,
                ..OptionFixture::new("M", PriceView::standard("₩ 2"))
            },
        ]));
        let pages = MockPages::new()
            .with_page(CATALOG_URL, catalog_with_listings(3))
            .with_page(&detail_url(1), failing)
            .with_page(&detail_url(2), PageFixture::Unreachable)
            .with_page(&detail_url(3), two_size_detail(500));
        let svc = service_with_sink(MockSink::new());

        let report = svc
            .crawl_and_save(&pages, CATALOG_URL, None)
            .await
            .unwrap();

        assert_eq!(report.failed_listings, 2);
        // No partial quotes from the page that failed half-way.
        assert_eq!(report.records.len(), 2);
        assert!(report.records.iter().all(|r| r.url == detail_url(3)));
    }

    #[tokio::test]
    async fn limit_caps_the_number_of_listings_visited() {
        let pages = MockPages::new()
            .with_page(CATALOG_URL, catalog_with_listings(5))
            .with_page(&detail_url(1), two_size_detail(100))
            .with_page(&detail_url(2), two_size_detail(200));
        let svc = service_without_sink();

        let records = svc.crawl(&pages, CATALOG_URL, Some(2)).await.unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(pages.opened(), 3);
    }

    #[tokio::test]
    async fn every_page_is_closed() {
        let pages = MockPages::new()
            .with_page(CATALOG_URL, catalog_with_listings(2))
            .with_page(&detail_url(1), two_size_detail(100))
            .with_page(&detail_url(2), PageFixture::Unreachable);
        let svc = service_without_sink();

        svc.crawl(&pages, CATALOG_URL, None).await.unwrap();

        assert_eq!(pages.opened(), 3);
        assert_eq!(pages.closed(), 3);
    }

    #[tokio::test]
    async fn unusable_catalog_fails_the_run_and_skips_the_sink() {
        let pages = MockPages::new().with_page(
            CATALOG_URL,
            PageFixture::Catalog(CatalogFixture::with_cards(Vec::new())),
        );
        let sink = MockSink::new();
        let svc = service_with_sink(sink.clone());

        let err = svc
            .crawl_and_save(&pages, CATALOG_URL, None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::PageLoad { .. }));
        assert!(sink.saved.lock().unwrap().is_empty());
        assert_eq!(pages.closed(), 1);
    }

    #[tokio::test]
    async fn storage_error_propagates() {
        let pages = MockPages::new()
            .with_page(CATALOG_URL, catalog_with_listings(1))
            .with_page(&detail_url(1), two_size_detail(100));
        let svc = service_with_sink(MockSink::with_save_error(AppError::Storage(
            "connection reset".into(),
        )));

        let err = svc
            .crawl_and_save(&pages, CATALOG_URL, None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Storage(_)));
    }

    #[tokio::test]
    async fn empty_batch_still_reaches_the_sink_once() {
        let pages = MockPages::new()
            .with_page(CATALOG_URL, catalog_with_listings(1))
            .with_page(
                &detail_url(1),
                PageFixture::Detail(DetailFixture::without_size_selector()),
            );
        let sink = MockSink::new();
        let svc = service_with_sink(sink.clone());

        let report = svc
            .crawl_and_save(&pages, CATALOG_URL, None)
            .await
            .unwrap();

        assert!(report.records.is_empty());
        assert_eq!(report.stored, 0);
        assert_eq!(sink.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn without_sink_nothing_is_stored() {
        let pages = MockPages::new()
            .with_page(CATALOG_URL, catalog_with_listings(1))
            .with_page(&detail_url(1), two_size_detail(100));
        let svc = service_without_sink();

        let report = svc
            .crawl_and_save(&pages, CATALOG_URL, None)
            .await
            .unwrap();

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.stored, 0);
    }

    fn paced_service(listing_pause_ms: u64) -> CrawlService<NullSink> {
        let timing = TimingConfig {
            listing_pause: DelayRange::new(listing_pause_ms, listing_pause_ms),
            long_pause_probability: 0.0,
            ..TimingConfig::instant()
        };
        CrawlService::without_sink(
            SiteSelectors::farfetch(),
            CrawlConfig::default(),
            Pacer::seeded(timing, 7),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_between_listings_but_not_after_the_last() {
        let pages = MockPages::new()
            .with_page(CATALOG_URL, catalog_with_listings(3))
            .with_page(&detail_url(1), two_size_detail(100))
            .with_page(&detail_url(2), two_size_detail(200))
            .with_page(&detail_url(3), two_size_detail(300));
        let svc = paced_service(4000);

        let start = tokio::time::Instant::now();
        let records = svc.crawl(&pages, CATALOG_URL, None).await.unwrap();

        assert_eq!(records.len(), 6);
        // Two gaps for three listings.
        assert_eq!(start.elapsed(), Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn single_listing_is_not_followed_by_a_pause() {
        let pages = MockPages::new()
            .with_page(CATALOG_URL, catalog_with_listings(1))
            .with_page(&detail_url(1), two_size_detail(100));
        let svc = paced_service(4000);

        let start = tokio::time::Instant::now();
        svc.crawl(&pages, CATALOG_URL, None).await.unwrap();

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_listing_still_paces_the_next_visit() {
        let pages = MockPages::new()
            .with_page(CATALOG_URL, catalog_with_listings(2))
            .with_page(&detail_url(1), PageFixture::Unreachable)
            .with_page(&detail_url(2), two_size_detail(200));
        let svc = paced_service(3000);

        let start = tokio::time::Instant::now();
        let records = svc.crawl(&pages, CATALOG_URL, None).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }
}
