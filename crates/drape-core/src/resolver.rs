//! Per-size price resolution on a detail page.
//!
//! Price and footnotes are bound to the size currently selected in a
//! dropdown. Selecting an option re-renders them asynchronously with no
//! completion signal, so after each click the displayed price is polled
//! until it differs from the value shown before the click or the attempt
//! budget runs out. An unchanged price after the budget is accepted as
//! final: neighbouring sizes often share a price, and a slow render cannot
//! be told apart from an equal one.
//!
//! Per detail page the resolver moves through
//! `Loading → DropdownClosed → DropdownOpen → OptionSelected(i) → Resolved(i)`,
//! re-opening the dropdown (and re-querying its options) for every `i > 0`.

use std::sync::LazyLock;

use regex::Regex;

use crate::card::UNKNOWN;
use crate::config::CrawlConfig;
use crate::dom::text_of;
use crate::error::{AppError, OrSentinel};
use crate::models::{SizeQuote, normalize_text};
use crate::selectors::SiteSelectors;
use crate::timing::Pacer;
use crate::traits::{Document, Scope};

/// Text made only of currency symbols, digits and separators.
static PRICE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\d₩$€£%,.\-\s]+$").expect("hardcoded regex pattern is valid")
});

/// True for footnotes that merely repeat a price or a discount
/// (`"₩ 1,000"`, `"-10%"`), which must not be reported as notes.
pub fn is_price_token(text: &str) -> bool {
    PRICE_TOKEN.is_match(text)
}

/// Where the resolver is within one detail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Loading,
    DropdownClosed,
    DropdownOpen,
    OptionSelected(usize),
    Resolved(usize),
}

/// Result of polling the displayed price after an option click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Last price read (empty when no price element was shown).
    pub price: String,
    /// Reads performed, `1..=poll_attempts`.
    pub attempts: u32,
    /// Whether the price moved away from the baseline.
    pub changed: bool,
}

/// Resolves every size option of a detail page into a [`SizeQuote`].
pub struct SizeResolver<'a> {
    selectors: &'a SiteSelectors,
    config: &'a CrawlConfig,
    pacer: &'a Pacer,
}

impl<'a> SizeResolver<'a> {
    pub fn new(selectors: &'a SiteSelectors, config: &'a CrawlConfig, pacer: &'a Pacer) -> Self {
        Self {
            selectors,
            config,
            pacer,
        }
    }

    /// Loads `url` and resolves one quote per size option.
    ///
    /// A page without a size selector yields no quotes. Any failure while
    /// handling an option abandons the whole page: either every size is
    /// returned or none is.
    pub async fn resolve<D: Document>(
        &self,
        doc: &D,
        url: &str,
    ) -> Result<Vec<SizeQuote>, AppError> {
        let mut state = ResolverState::Loading;
        let result = self.run(doc, url, &mut state).await;
        if let Err(e) = &result {
            tracing::warn!(%url, ?state, error = %e, "Abandoning detail page");
        }
        result
    }

    async fn run<D: Document>(
        &self,
        doc: &D,
        url: &str,
        state: &mut ResolverState,
    ) -> Result<Vec<SizeQuote>, AppError> {
        doc.goto(url).await?;

        match doc
            .wait_for_selector(&self.selectors.size_selector, self.config.detail_timeout)
            .await
        {
            Ok(_) => {}
            Err(AppError::SelectorTimeout { .. }) => {
                tracing::info!(%url, "No size selector, item is not size-variant");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        }
        doc.wait_for_timeout(self.pacer.delay(self.pacer.config().detail_settle))
            .await;
        *state = ResolverState::DropdownClosed;

        let images = self.collect_images(doc).await?;

        let Some(dropdown) = doc
            .query_selector(Scope::Document, &self.selectors.size_selector)
            .await?
        else {
            tracing::info!(%url, "Size selector disappeared before it could be opened");
            return Ok(Vec::new());
        };
        let mut options = self.open_dropdown(doc, &dropdown).await?;
        *state = ResolverState::DropdownOpen;

        let count = options.len();
        tracing::debug!(%url, options = count, images = images.len(), "Size dropdown opened");

        let mut quotes = Vec::with_capacity(count);
        for index in 0..count {
            if index > 0 {
                // Selecting the previous option closed the list and
                // invalidated every handle into it.
                *state = ResolverState::DropdownClosed;
                let dropdown = doc
                    .query_selector(Scope::Document, &self.selectors.size_selector)
                    .await?
                    .ok_or(AppError::OptionsVanished {
                        index,
                        available: 0,
                    })?;
                options = self.open_dropdown(doc, &dropdown).await?;
                *state = ResolverState::DropdownOpen;
            }

            let option = options.get(index).ok_or(AppError::OptionsVanished {
                index,
                available: options.len(),
            })?;

            *state = ResolverState::OptionSelected(index);
            let quote = self.resolve_option(doc, option, &images).await?;
            tracing::debug!(
                index,
                size = %quote.size,
                price = %quote.price,
                note = %quote.note,
                "Size resolved"
            );
            quotes.push(quote);
            *state = ResolverState::Resolved(index);
        }

        Ok(quotes)
    }

    /// Image URLs on the configured CDN, in document order.
    async fn collect_images<D: Document>(&self, doc: &D) -> Result<Vec<String>, AppError> {
        let elements = doc
            .query_selector_all(Scope::Document, &self.selectors.image)
            .await?;
        let mut images = Vec::new();
        for element in &elements {
            if let Some(src) = doc.get_attribute(element, "src").await? {
                if self.selectors.is_cdn_image(&src) {
                    if let Some(absolute) = self.selectors.absolute_url(&src) {
                        images.push(absolute);
                    }
                }
            }
        }
        Ok(images)
    }

    /// Clicks the dropdown and returns freshly queried option handles.
    async fn open_dropdown<D: Document>(
        &self,
        doc: &D,
        dropdown: &D::Element,
    ) -> Result<Vec<D::Element>, AppError> {
        doc.click(dropdown).await?;
        doc.wait_for_selector(&self.selectors.size_option, self.config.options_timeout)
            .await?;
        doc.wait_for_timeout(self.pacer.delay(self.pacer.config().dropdown_settle))
            .await;
        doc.query_selector_all(Scope::Document, &self.selectors.size_option)
            .await
    }

    async fn resolve_option<D: Document>(
        &self,
        doc: &D,
        option: &D::Element,
        images: &[String],
    ) -> Result<SizeQuote, AppError> {
        let scope = Scope::Within(option);
        let size = text_of(doc, scope, &self.selectors.option_size)
            .await
            .or_sentinel(UNKNOWN.into())?;

        let mut notes = Vec::new();
        let label = text_of(doc, scope, &self.selectors.option_label)
            .await
            .or_sentinel(String::new())?;
        if !label.is_empty() {
            notes.push(label);
        }

        let baseline = self.displayed_price(doc).await?.unwrap_or_default();

        doc.click(option).await?;
        doc.wait_for_timeout(self.pacer.delay(self.pacer.config().option_click))
            .await;

        let outcome = self.poll_price_change(doc, &baseline).await?;
        tracing::debug!(
            attempts = outcome.attempts,
            changed = outcome.changed,
            "Price polling finished"
        );

        let price = self
            .displayed_price(doc)
            .await?
            .unwrap_or_else(|| UNKNOWN.to_string());
        notes.extend(self.footnotes(doc).await?);

        Ok(SizeQuote {
            size,
            price,
            note: notes.join(", "),
            images: images.to_vec(),
        })
    }

    /// Re-reads the displayed price until it differs from `baseline`.
    ///
    /// Stops at the first differing read; otherwise performs
    /// `poll_attempts` reads spaced by `poll_interval` and reports the last
    /// one. Never fails because the price did not change.
    pub async fn poll_price_change<D: Document>(
        &self,
        doc: &D,
        baseline: &str,
    ) -> Result<PollOutcome, AppError> {
        let budget = self.config.poll_attempts.max(1);
        let mut price = String::new();

        for attempt in 1..=budget {
            price = self.displayed_price(doc).await?.unwrap_or_default();
            if price != baseline {
                return Ok(PollOutcome {
                    price,
                    attempts: attempt,
                    changed: true,
                });
            }
            if attempt < budget {
                doc.wait_for_timeout(self.config.poll_interval).await;
            }
        }

        Ok(PollOutcome {
            price,
            attempts: budget,
            changed: false,
        })
    }

    /// Discounted price if shown, else the standard price.
    async fn displayed_price<D: Document>(&self, doc: &D) -> Result<Option<String>, AppError> {
        for selector in [&self.selectors.price_final, &self.selectors.price_standard] {
            if let Some(element) = doc.query_selector(Scope::Document, selector).await? {
                return Ok(Some(normalize_text(&doc.inner_text(&element).await?)));
            }
        }
        Ok(None)
    }

    /// Footnotes next to the price, minus the ones that are only a price.
    async fn footnotes<D: Document>(&self, doc: &D) -> Result<Vec<String>, AppError> {
        let elements = doc
            .query_selector_all(Scope::Document, &self.selectors.price_footnote)
            .await?;
        let mut notes = Vec::new();
        for element in &elements {
            let text = normalize_text(&doc.inner_text(element).await?);
            if !text.is_empty() && !is_price_token(&text) {
                notes.push(text);
            }
        }
        Ok(notes)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testutil::*;
    use crate::timing::TimingConfig;

    async fn resolve(fixture: DetailFixture) -> (MockDocument, Result<Vec<SizeQuote>, AppError>) {
        let url = detail_url(1);
        let doc = MockDocument::with_page(&url, PageFixture::Detail(fixture));
        let (selectors, config, pacer) = engine_parts();
        let resolver = SizeResolver::new(&selectors, &config, &pacer);
        let result = resolver.resolve(&doc, &url).await;
        (doc, result)
    }

    #[test]
    fn price_tokens_are_recognised() {
        assert!(is_price_token("₩ 1,000"));
        assert!(is_price_token("-10%"));
        assert!(is_price_token("$1,299.00"));
        assert!(is_price_token("€ 450"));
        assert!(!is_price_token("Customs included"));
        assert!(!is_price_token("Import duties included"));
        assert!(!is_price_token("Last 1 left"));
    }

    #[tokio::test]
    async fn every_option_becomes_a_quote() {
        let fixture = DetailFixture::new(vec![
            OptionFixture::new("S", PriceView::standard("₩ 1,000,000")),
            OptionFixture::new("M", PriceView::standard("₩ 1,100,000")),
            OptionFixture::new("L", PriceView::standard("₩ 1,200,000")),
        ]);

        let (_doc, result) = resolve(fixture).await;
        let quotes = result.unwrap();

        let sizes: Vec<_> = quotes.iter().map(|q| q.size.as_str()).collect();
        let prices: Vec<_> = quotes.iter().map(|q| q.price.as_str()).collect();
        assert_eq!(sizes, ["S", "M", "L"]);
        assert_eq!(prices, ["₩ 1,000,000", "₩ 1,100,000", "₩ 1,200,000"]);
    }

    #[tokio::test]
    async fn dropdown_is_reopened_and_requeried_for_each_option() {
        let fixture = DetailFixture::new(vec![
            OptionFixture::new("40", PriceView::standard("₩ 1")),
            OptionFixture::new("41", PriceView::standard("₩ 2")),
            OptionFixture::new("42", PriceView::standard("₩ 3")),
        ]);

        let (doc, result) = resolve(fixture).await;
        assert_eq!(result.unwrap().len(), 3);

        let calls = doc.calls();
        let opens = calls.iter().filter(|c| *c == "click SizeSelector").count();
        assert_eq!(opens, 3);
        // The mock rejects handles from a previous opening, so reaching here
        // means each option was clicked through a fresh handle.
        let epochs: Vec<_> = calls
            .iter()
            .filter(|c| c.starts_with("click SizeOption"))
            .cloned()
            .collect();
        assert_eq!(
            epochs,
            [
                "click SizeOption { index: 0, epoch: 1 }",
                "click SizeOption { index: 1, epoch: 2 }",
                "click SizeOption { index: 2, epoch: 3 }",
            ]
        );
    }

    #[tokio::test]
    async fn discounted_price_wins_over_standard() {
        let fixture = DetailFixture::new(vec![
            OptionFixture::new(
                "M",
                PriceView {
                    discounted: Some("₩ 800,000".into()),
                    standard: Some("₩ 1,000,000".into()),
                    footnotes: Vec::new(),
                },
            ),
            OptionFixture::new("L", PriceView::standard("₩ 1,000,000")),
        ]);

        let quotes = resolve(fixture).await.1.unwrap();
        assert_eq!(quotes[0].price, "₩ 800,000");
        assert_eq!(quotes[1].price, "₩ 1,000,000");
    }

    #[tokio::test]
    async fn missing_price_is_unknown() {
        let fixture = DetailFixture::new(vec![OptionFixture::new("XS", PriceView::default())]);

        let quotes = resolve(fixture).await.1.unwrap();
        assert_eq!(quotes[0].price, UNKNOWN);
    }

    #[tokio::test]
    async fn notes_combine_label_and_filtered_footnotes() {
        let view = PriceView::standard("₩\u{a0}1,000,000").with_footnotes(&[
            "₩ 1,000",
            "-10%",
            "Customs included",
            "  ",
        ]);
        let option = OptionFixture {
            label: Some("Last 1 left".into()),
            ..OptionFixture::new("IT\u{a0}50", view)
        };

        let quotes = resolve(DetailFixture::new(vec![option])).await.1.unwrap();
        assert_eq!(quotes[0].note, "Last 1 left, Customs included");
        assert_eq!(quotes[0].size, "IT 50");
        assert_eq!(quotes[0].price, "₩ 1,000,000");
    }

    #[tokio::test]
    async fn missing_size_label_is_unknown() {
        let option = OptionFixture {
            size: None,
            ..OptionFixture::new("", PriceView::standard("₩ 5"))
        };

        let quotes = resolve(DetailFixture::new(vec![option])).await.1.unwrap();
        assert_eq!(quotes[0].size, UNKNOWN);
        assert_eq!(quotes[0].note, "");
    }

    #[tokio::test]
    async fn images_are_collected_once_and_shared() {
        let fixture = DetailFixture::new(vec![
            OptionFixture::new("S", PriceView::standard("₩ 1")),
            OptionFixture::new("M", PriceView::standard("₩ 2")),
        ]);
        let expected_images = fixture
            .images
            .iter()
            .filter(|src| src.contains("farfetch-contents.com"))
            .cloned()
            .collect::<Vec<_>>();

        let (doc, result) = resolve(fixture).await;
        let quotes = result.unwrap();

        assert_eq!(quotes[0].images, expected_images);
        assert_eq!(quotes[1].images, expected_images);
        assert_eq!(doc.query_count(&SiteSelectors::farfetch().image), 1);
    }

    #[tokio::test]
    async fn no_size_selector_yields_no_quotes() {
        let (doc, result) = resolve(DetailFixture::without_size_selector()).await;

        assert!(result.unwrap().is_empty());
        assert!(!doc.calls().iter().any(|c| c.starts_with("click")));
    }

    #[tokio::test]
    async fn failing_option_abandons_the_page() {
        let fixture = DetailFixture::new(vec![
            OptionFixture::new("S", PriceView::standard("₩ 1")),
            OptionFixture {
                click_fails: true,
                ..OptionFixture::new("M", PriceView::standard("₩ 2"))
            },
            OptionFixture::new("L", PriceView::standard("₩ 3")),
        ]);

        let err = resolve(fixture).await.1.unwrap_err();
        assert!(matches!(err, AppError::Browser(_)));
    }

    #[tokio::test]
    async fn polling_stops_as_soon_as_the_price_changes() {
        let url = detail_url(1);
        let fixture = DetailFixture {
            initial: PriceView::standard("₩ 100"),
            ..DetailFixture::new(vec![OptionFixture {
                render_delay: 2,
                ..OptionFixture::new("M", PriceView::standard("₩ 200"))
            }])
        };
        let doc = MockDocument::with_page(&url, PageFixture::Detail(fixture));
        let (selectors, config, pacer) = engine_parts();
        let resolver = SizeResolver::new(&selectors, &config, &pacer);

        doc.goto(&url).await.unwrap();
        doc.select_option(0).unwrap();
        let outcome = resolver.poll_price_change(&doc, "₩ 100").await.unwrap();

        assert_eq!(
            outcome,
            PollOutcome {
                price: "₩ 200".into(),
                attempts: 3,
                changed: true,
            }
        );
        assert_eq!(doc.waits(), vec![config.poll_interval; 2]);
    }

    #[tokio::test]
    async fn polling_reports_last_read_when_price_never_changes() {
        let url = detail_url(1);
        let fixture = DetailFixture {
            initial: PriceView::standard("₩ 100"),
            ..DetailFixture::new(vec![OptionFixture::new(
                "M",
                PriceView::standard("₩ 100"),
            )])
        };
        let doc = MockDocument::with_page(&url, PageFixture::Detail(fixture));
        let (selectors, config, pacer) = engine_parts();
        let resolver = SizeResolver::new(&selectors, &config, &pacer);

        doc.goto(&url).await.unwrap();
        doc.select_option(0).unwrap();
        let outcome = resolver.poll_price_change(&doc, "₩ 100").await.unwrap();

        assert_eq!(outcome.price, "₩ 100");
        assert_eq!(outcome.attempts, config.poll_attempts);
        assert!(!outcome.changed);
        assert_eq!(
            doc.waits(),
            vec![Duration::from_millis(500); config.poll_attempts as usize - 1]
        );
    }

    #[tokio::test]
    async fn slow_render_beyond_budget_keeps_the_stale_price() {
        let fixture = DetailFixture {
            initial: PriceView::standard("₩ 100"),
            ..DetailFixture::new(vec![OptionFixture {
                render_delay: 10,
                ..OptionFixture::new("M", PriceView::standard("₩ 200"))
            }])
        };

        let quotes = resolve(fixture).await.1.unwrap();
        // Ambiguous by construction: a slow render looks like an equal price.
        assert_eq!(quotes[0].price, "₩ 100");
    }

    #[tokio::test]
    async fn detail_waits_follow_the_seeded_pacer() {
        let url = detail_url(1);
        let fixture = DetailFixture::new(vec![OptionFixture::new(
            "M",
            PriceView::standard("₩ 200"),
        )]);
        let doc = MockDocument::with_page(&url, PageFixture::Detail(fixture));
        let selectors = SiteSelectors::farfetch();
        let config = CrawlConfig::default();
        let pacer = Pacer::seeded(TimingConfig::default(), 21);
        let resolver = SizeResolver::new(&selectors, &config, &pacer);

        resolver.resolve(&doc, &url).await.unwrap();

        let replay = Pacer::seeded(TimingConfig::default(), 21);
        let timing = replay.config().clone();
        let expected = vec![
            replay.delay(timing.detail_settle),
            replay.delay(timing.dropdown_settle),
            replay.delay(timing.option_click),
        ];
        // The price changes on the first read, so no poll interval follows.
        assert_eq!(doc.waits(), expected);
    }
}
