//! Test utilities: an in-memory rendered site and mock collaborators.
//!
//! [`MockDocument`] simulates the parts of a live page the engine drives:
//! a catalog whose height grows as it is scrolled, and a detail page whose
//! size dropdown invalidates its option handles on every opening and whose
//! price re-renders a configurable number of reads after a click. Selectors
//! are matched literally against [`SiteSelectors::farfetch`].
//!
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing test
//! assertions on recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::CrawlConfig;
use crate::error::AppError;
use crate::models::{ProductRecord, SaveReport};
use crate::pagination::{SCROLL_HEIGHT_JS, SCROLL_TO_BOTTOM_JS, VIEWPORT_BOTTOM_JS};
use crate::selectors::SiteSelectors;
use crate::timing::{Pacer, TimingConfig};
use crate::traits::{Document, PageSource, ProductSink, Scope};

pub const CATALOG_URL: &str = "https://www.farfetch.com/kr/shopping/men/clothing-2/items.aspx";

pub fn detail_path(n: usize) -> String {
    format!("/kr/shopping/men/item-{n}.aspx")
}

pub fn detail_url(n: usize) -> String {
    format!("https://www.farfetch.com{}", detail_path(n))
}

/// Farfetch selectors, default crawl config and an instant seeded pacer.
pub fn engine_parts() -> (SiteSelectors, CrawlConfig, Pacer) {
    (
        SiteSelectors::farfetch(),
        CrawlConfig::default(),
        Pacer::seeded(TimingConfig::instant(), 7),
    )
}

/// A catalog page with `n` well-formed cards linking to `detail_url(1..=n)`.
pub fn catalog_with_listings(n: usize) -> PageFixture {
    PageFixture::Catalog(CatalogFixture::with_cards(
        (1..=n)
            .map(|k| CardFixture::new(&format!("Brand {k}"), &format!("Item {k}"), &detail_path(k)))
            .collect(),
    ))
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CardFixture {
    pub brand: Option<String>,
    pub name: Option<String>,
    pub href: Option<String>,
    /// Reading the card's text fails with a browser error.
    pub broken: bool,
}

impl CardFixture {
    pub fn new(brand: &str, name: &str, href: &str) -> Self {
        Self {
            brand: Some(brand.to_string()),
            name: Some(name.to_string()),
            href: Some(href.to_string()),
            broken: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogFixture {
    pub cards: Vec<CardFixture>,
    /// Document height after 0, 1, 2, ... scroll steps; the last value repeats.
    pub heights: Vec<f64>,
    pub viewport: f64,
    pub language_switch: bool,
}

impl CatalogFixture {
    pub fn with_cards(cards: Vec<CardFixture>) -> Self {
        Self {
            cards,
            heights: vec![1000.0],
            viewport: 1080.0,
            language_switch: false,
        }
    }

    pub fn with_heights(mut self, heights: Vec<f64>, viewport: f64) -> Self {
        self.heights = heights;
        self.viewport = viewport;
        self
    }
}

/// What the price callout shows for the current selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceView {
    pub discounted: Option<String>,
    pub standard: Option<String>,
    pub footnotes: Vec<String>,
}

impl PriceView {
    pub fn standard(price: &str) -> Self {
        Self {
            standard: Some(price.to_string()),
            ..Self::default()
        }
    }

    pub fn with_footnotes(mut self, footnotes: &[&str]) -> Self {
        self.footnotes = footnotes.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone)]
pub struct OptionFixture {
    pub size: Option<String>,
    pub label: Option<String>,
    /// Price callout once this option's render has landed.
    pub view: PriceView,
    /// Price reads after the click that still show the previous view.
    pub render_delay: u32,
    pub click_fails: bool,
}

impl OptionFixture {
    pub fn new(size: &str, view: PriceView) -> Self {
        Self {
            size: Some(size.to_string()),
            label: None,
            view,
            render_delay: 0,
            click_fails: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetailFixture {
    pub has_selector: bool,
    pub images: Vec<String>,
    /// Price callout before any option is selected.
    pub initial: PriceView,
    pub options: Vec<OptionFixture>,
}

impl DetailFixture {
    pub fn new(options: Vec<OptionFixture>) -> Self {
        Self {
            has_selector: true,
            images: vec![
                "https://cdn-images.farfetch-contents.com/20/12/34/56_front.jpg".into(),
                "https://www.google-analytics.com/collect.gif".into(),
                "https://cdn-images.farfetch-contents.com/20/12/34/56_back.jpg".into(),
            ],
            initial: PriceView::default(),
            options,
        }
    }

    pub fn without_size_selector() -> Self {
        Self {
            has_selector: false,
            ..Self::new(Vec::new())
        }
    }
}

#[derive(Debug, Clone)]
pub enum PageFixture {
    Catalog(CatalogFixture),
    Detail(DetailFixture),
    /// Navigation fails.
    Unreachable,
}

// ---------------------------------------------------------------------------
// MockDocument
// ---------------------------------------------------------------------------

/// Handle into the simulated DOM.
#[derive(Debug, Clone, PartialEq)]
pub enum MockElement {
    Card(usize),
    CardBrand(usize),
    CardName(usize),
    CardLink(usize),
    LanguageToggle,
    LanguageChoice,
    Image(usize),
    SizeSelector,
    SizeOption { index: usize, epoch: u64 },
    OptionSize { index: usize, epoch: u64 },
    OptionLabel { index: usize, epoch: u64 },
    PriceDiscounted,
    PriceStandard,
    Footnote(usize),
}

#[derive(Debug, Default)]
struct PageState {
    loaded: Option<PageFixture>,
    scroll_steps: usize,
    scroll_y: f64,
    language_open: bool,
    dropdown_open: bool,
    /// Bumped on every dropdown opening; older option handles are stale.
    epoch: u64,
    view: PriceView,
    pending: Option<(PriceView, u32)>,
}

impl PageState {
    fn catalog(&self) -> Option<&CatalogFixture> {
        match &self.loaded {
            Some(PageFixture::Catalog(c)) => Some(c),
            _ => None,
        }
    }

    fn detail(&self) -> Option<&DetailFixture> {
        match &self.loaded {
            Some(PageFixture::Detail(d)) => Some(d),
            _ => None,
        }
    }

    fn height(&self) -> f64 {
        self.catalog()
            .and_then(|c| {
                c.heights
                    .get(self.scroll_steps.min(c.heights.len().saturating_sub(1)))
                    .copied()
            })
            .unwrap_or(0.0)
    }

    fn viewport(&self) -> f64 {
        self.catalog().map(|c| c.viewport).unwrap_or(0.0)
    }

    fn scroll(&mut self, px: f64) {
        self.scroll_steps += 1;
        let max_y = (self.height() - self.viewport()).max(0.0);
        self.scroll_y = (self.scroll_y + px).min(max_y);
    }

    /// One price read: lands the pending render once its delay is used up.
    fn tick_price(&mut self) {
        if let Some((view, remaining)) = self.pending.take() {
            if remaining == 0 {
                self.view = view;
            } else {
                self.pending = Some((view, remaining - 1));
            }
        }
    }

    fn check_fresh(&self, epoch: u64) -> Result<(), AppError> {
        if epoch == self.epoch {
            Ok(())
        } else {
            Err(AppError::Browser(format!(
                "stale element handle (epoch {epoch}, current {})",
                self.epoch
            )))
        }
    }

    fn select(&mut self, index: usize) -> Result<(), AppError> {
        let option = self
            .detail()
            .and_then(|d| d.options.get(index))
            .cloned()
            .ok_or_else(|| AppError::Browser(format!("no option {index}")))?;
        if option.click_fails {
            return Err(AppError::Browser("click intercepted by overlay".into()));
        }
        self.dropdown_open = false;
        self.pending = Some((option.view, option.render_delay));
        Ok(())
    }
}

/// A simulated page backed by a shared site map.
#[derive(Clone)]
pub struct MockDocument {
    site: Arc<HashMap<String, PageFixture>>,
    selectors: SiteSelectors,
    state: Arc<Mutex<PageState>>,
    calls: Arc<Mutex<Vec<String>>>,
    queries: Arc<Mutex<Vec<String>>>,
    waits: Arc<Mutex<Vec<Duration>>>,
    closed: Arc<Mutex<bool>>,
}

impl MockDocument {
    fn new(site: Arc<HashMap<String, PageFixture>>) -> Self {
        Self {
            site,
            selectors: SiteSelectors::farfetch(),
            state: Arc::new(Mutex::new(PageState::default())),
            calls: Arc::new(Mutex::new(Vec::new())),
            queries: Arc::new(Mutex::new(Vec::new())),
            waits: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(false)),
        }
    }

    /// A page whose site contains a single URL.
    pub fn with_page(url: &str, fixture: PageFixture) -> Self {
        Self::new(Arc::new(HashMap::from([(url.to_string(), fixture)])))
    }

    /// Navigation, clicks and scroll steps, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Durations passed to `wait_for_timeout`, in call order.
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }

    /// How many times `selector` was queried.
    pub fn query_count(&self, selector: &str) -> usize {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .filter(|q| *q == selector)
            .count()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }

    /// Selects option `index` as if it had been clicked in an open dropdown.
    pub fn select_option(&self, index: usize) -> Result<(), AppError> {
        self.state.lock().unwrap().select(index)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn find(
        &self,
        scope: Scope<'_, MockElement>,
        selector: &str,
    ) -> Result<Vec<MockElement>, AppError> {
        self.queries.lock().unwrap().push(selector.to_string());
        let s = &self.selectors;
        let mut state = self.state.lock().unwrap();

        if let Some(catalog) = state.catalog() {
            let found = match scope {
                Scope::Document if selector == s.product_card => {
                    (0..catalog.cards.len()).map(MockElement::Card).collect()
                }
                Scope::Within(MockElement::Card(i)) => {
                    let card = &catalog.cards[*i];
                    if selector == s.card_brand && card.brand.is_some() {
                        vec![MockElement::CardBrand(*i)]
                    } else if selector == s.card_name && card.name.is_some() {
                        vec![MockElement::CardName(*i)]
                    } else if selector == s.card_link && card.href.is_some() {
                        vec![MockElement::CardLink(*i)]
                    } else {
                        Vec::new()
                    }
                }
                Scope::Document => match &s.language {
                    Some(lang) if catalog.language_switch && selector == lang.toggle => {
                        vec![MockElement::LanguageToggle]
                    }
                    Some(lang) if state.language_open && selector == lang.choice => {
                        vec![MockElement::LanguageChoice]
                    }
                    _ => Vec::new(),
                },
                _ => Vec::new(),
            };
            return Ok(found);
        }

        if selector == s.price_final {
            state.tick_price();
        }
        let Some(detail) = state.detail() else {
            return Ok(Vec::new());
        };

        let found = match scope {
            Scope::Document if selector == s.size_selector => {
                if detail.has_selector {
                    vec![MockElement::SizeSelector]
                } else {
                    Vec::new()
                }
            }
            Scope::Document if selector == s.image => {
                (0..detail.images.len()).map(MockElement::Image).collect()
            }
            Scope::Document if selector == s.size_option => {
                if state.dropdown_open {
                    let epoch = state.epoch;
                    (0..detail.options.len())
                        .map(|index| MockElement::SizeOption { index, epoch })
                        .collect()
                } else {
                    Vec::new()
                }
            }
            Scope::Document if selector == s.price_final => {
                state.view.discounted.iter().map(|_| MockElement::PriceDiscounted).collect()
            }
            Scope::Document if selector == s.price_standard => {
                state.view.standard.iter().map(|_| MockElement::PriceStandard).collect()
            }
            Scope::Document if selector == s.price_footnote => {
                (0..state.view.footnotes.len()).map(MockElement::Footnote).collect()
            }
            Scope::Within(MockElement::SizeOption { index, epoch }) => {
                state.check_fresh(*epoch)?;
                let option = &detail.options[*index];
                let (index, epoch) = (*index, *epoch);
                if selector == s.option_size && option.size.is_some() {
                    vec![MockElement::OptionSize { index, epoch }]
                } else if selector == s.option_label && option.label.is_some() {
                    vec![MockElement::OptionLabel { index, epoch }]
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        };
        Ok(found)
    }
}

impl Document for MockDocument {
    type Element = MockElement;

    async fn goto(&self, url: &str) -> Result<(), AppError> {
        self.record(format!("goto {url}"));
        match self.site.get(url) {
            Some(PageFixture::Unreachable) | None => Err(AppError::Browser(format!(
                "net::ERR_CONNECTION_REFUSED at {url}"
            ))),
            Some(fixture) => {
                let mut state = self.state.lock().unwrap();
                *state = PageState::default();
                if let PageFixture::Detail(detail) = fixture {
                    state.view = detail.initial.clone();
                }
                state.loaded = Some(fixture.clone());
                Ok(())
            }
        }
    }

    async fn query_selector(
        &self,
        scope: Scope<'_, MockElement>,
        selector: &str,
    ) -> Result<Option<MockElement>, AppError> {
        Ok(self.find(scope, selector)?.into_iter().next())
    }

    async fn query_selector_all(
        &self,
        scope: Scope<'_, MockElement>,
        selector: &str,
    ) -> Result<Vec<MockElement>, AppError> {
        self.find(scope, selector)
    }

    async fn inner_text(&self, element: &MockElement) -> Result<String, AppError> {
        let state = self.state.lock().unwrap();
        let text = match element {
            MockElement::CardBrand(i) | MockElement::CardName(i) => {
                let card = state
                    .catalog()
                    .and_then(|c| c.cards.get(*i))
                    .ok_or_else(|| AppError::Browser("detached card".into()))?;
                if card.broken {
                    return Err(AppError::Browser("Node is detached from document".into()));
                }
                let text = if matches!(element, MockElement::CardBrand(_)) {
                    &card.brand
                } else {
                    &card.name
                };
                text.clone().unwrap_or_default()
            }
            MockElement::OptionSize { index, epoch }
            | MockElement::OptionLabel { index, epoch } => {
                state.check_fresh(*epoch)?;
                let option = state
                    .detail()
                    .and_then(|d| d.options.get(*index))
                    .ok_or_else(|| AppError::Browser("detached option".into()))?;
                let text = if matches!(element, MockElement::OptionSize { .. }) {
                    &option.size
                } else {
                    &option.label
                };
                text.clone().unwrap_or_default()
            }
            MockElement::PriceDiscounted => state.view.discounted.clone().unwrap_or_default(),
            MockElement::PriceStandard => state.view.standard.clone().unwrap_or_default(),
            MockElement::Footnote(i) => state.view.footnotes.get(*i).cloned().unwrap_or_default(),
            _ => String::new(),
        };
        Ok(text)
    }

    async fn get_attribute(
        &self,
        element: &MockElement,
        name: &str,
    ) -> Result<Option<String>, AppError> {
        let state = self.state.lock().unwrap();
        let value = match (element, name) {
            (MockElement::CardLink(i), "href") => state
                .catalog()
                .and_then(|c| c.cards.get(*i))
                .and_then(|card| card.href.clone()),
            (MockElement::Image(i), "src") => {
                state.detail().and_then(|d| d.images.get(*i)).cloned()
            }
            _ => None,
        };
        Ok(value)
    }

    async fn click(&self, element: &MockElement) -> Result<(), AppError> {
        self.record(format!("click {element:?}"));
        let mut state = self.state.lock().unwrap();
        match element {
            MockElement::SizeSelector => {
                state.dropdown_open = true;
                state.epoch += 1;
            }
            MockElement::SizeOption { index, epoch } => {
                if !state.dropdown_open {
                    return Err(AppError::Browser("option is not visible".into()));
                }
                state.check_fresh(*epoch)?;
                state.select(*index)?;
            }
            MockElement::LanguageToggle => state.language_open = true,
            MockElement::LanguageChoice => state.language_open = false,
            _ => {}
        }
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, AppError> {
        let mut state = self.state.lock().unwrap();
        if expression == SCROLL_HEIGHT_JS {
            return Ok(serde_json::json!(state.height()));
        }
        if expression == VIEWPORT_BOTTOM_JS {
            return Ok(serde_json::json!(state.scroll_y + state.viewport()));
        }
        if expression == SCROLL_TO_BOTTOM_JS {
            let height = state.height();
            state.scroll(height);
            drop(state);
            self.record("scroll bottom".into());
            return Ok(serde_json::Value::Null);
        }
        if let Some(px) = expression
            .strip_prefix("window.scrollBy(0, ")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|px| px.parse::<f64>().ok())
        {
            state.scroll(px);
            drop(state);
            self.record(format!("scroll {px}"));
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::Value::Null)
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<MockElement, AppError> {
        self.find(Scope::Document, selector)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::SelectorTimeout {
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
    }

    async fn wait_for_timeout(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }

    async fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }
}

// ---------------------------------------------------------------------------
// MockPages
// ---------------------------------------------------------------------------

/// Page source over a fixed site map; keeps every page it opened.
#[derive(Clone, Default)]
pub struct MockPages {
    site: HashMap<String, PageFixture>,
    pub pages: Arc<Mutex<Vec<MockDocument>>>,
}

impl MockPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, fixture: PageFixture) -> Self {
        self.site.insert(url.to_string(), fixture);
        self
    }

    pub fn opened(&self) -> usize {
        self.pages.lock().unwrap().len()
    }

    pub fn closed(&self) -> usize {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.is_closed())
            .count()
    }
}

impl PageSource for MockPages {
    type Page = MockDocument;

    async fn open_page(&self) -> Result<MockDocument, AppError> {
        let page = MockDocument::new(Arc::new(self.site.clone()));
        self.pages.lock().unwrap().push(page.clone());
        Ok(page)
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

/// Recorded save: (records, source).
pub type SavedBatch = (Vec<ProductRecord>, String);

/// Mock sink that records every batch it receives.
#[derive(Clone)]
pub struct MockSink {
    pub saved: Arc<Mutex<Vec<SavedBatch>>>,
    save_error: Arc<Mutex<Option<AppError>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            saved: Arc::new(Mutex::new(Vec::new())),
            save_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Sink that returns an error on save.
    pub fn with_save_error(error: AppError) -> Self {
        Self {
            saved: Arc::new(Mutex::new(Vec::new())),
            save_error: Arc::new(Mutex::new(Some(error))),
        }
    }
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductSink for MockSink {
    async fn save(&self, records: &[ProductRecord], source: &str) -> Result<SaveReport, AppError> {
        let mut err = self.save_error.lock().unwrap();
        if let Some(e) = err.take() {
            return Err(e);
        }
        self.saved
            .lock()
            .unwrap()
            .push((records.to_vec(), source.to_string()));
        Ok(SaveReport {
            stored: records.len() as u64,
        })
    }
}
