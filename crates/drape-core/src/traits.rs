use std::future::Future;
use std::time::Duration;

use crate::error::AppError;
use crate::models::{ProductRecord, SaveReport};

/// Where a selector query is evaluated: the whole document or below one element.
#[derive(Debug)]
pub enum Scope<'a, E> {
    Document,
    Within(&'a E),
}

impl<E> Clone for Scope<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Scope<'_, E> {}

/// Access to one live, rendered page.
///
/// This is the only capability the extraction engine uses to talk to the
/// browser. Every method is a suspension point; element handles are only
/// valid until the next re-render of the part of the page they point into.
pub trait Document: Send + Sync {
    type Element: Send + Sync;

    /// Navigates the page to `url`.
    fn goto(&self, url: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Returns the first element matching `selector`, if any.
    fn query_selector(
        &self,
        scope: Scope<'_, Self::Element>,
        selector: &str,
    ) -> impl Future<Output = Result<Option<Self::Element>, AppError>> + Send;

    /// Returns every element matching `selector`, in document order.
    fn query_selector_all(
        &self,
        scope: Scope<'_, Self::Element>,
        selector: &str,
    ) -> impl Future<Output = Result<Vec<Self::Element>, AppError>> + Send;

    /// Rendered text of an element.
    fn inner_text(
        &self,
        element: &Self::Element,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    fn get_attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    fn click(&self, element: &Self::Element) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Evaluates a script expression and returns its JSON value
    /// (`Null` for `undefined`).
    fn evaluate(
        &self,
        expression: &str,
    ) -> impl Future<Output = Result<serde_json::Value, AppError>> + Send;

    /// Waits up to `timeout` for `selector` to appear.
    ///
    /// Fails with [`AppError::SelectorTimeout`] when it never does.
    fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Element, AppError>> + Send;

    /// Suspends for a fixed duration while the page keeps rendering.
    fn wait_for_timeout(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Closes the page. Best effort; failures are logged by the implementation.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Opens fresh pages on a running browser.
pub trait PageSource: Send + Sync {
    type Page: Document;

    fn open_page(&self) -> impl Future<Output = Result<Self::Page, AppError>> + Send;
}

/// Persists a finished crawl batch.
pub trait ProductSink: Send + Sync + Clone {
    /// Stores every record tagged with `source`.
    ///
    /// An empty batch succeeds with `stored == 0` without touching storage.
    fn save(
        &self,
        records: &[ProductRecord],
        source: &str,
    ) -> impl Future<Output = Result<SaveReport, AppError>> + Send;
}

/// A no-op ProductSink for use when persistence is not needed.
#[derive(Debug, Clone)]
pub struct NullSink;

impl ProductSink for NullSink {
    async fn save(
        &self,
        _records: &[ProductRecord],
        _source: &str,
    ) -> Result<SaveReport, AppError> {
        Ok(SaveReport::default())
    }
}
