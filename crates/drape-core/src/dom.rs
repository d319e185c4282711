//! Small read helpers over [`Document`].

use crate::error::AppError;
use crate::models::normalize_text;
use crate::traits::{Document, Scope};

/// Normalised text of the first match of `selector`.
///
/// Fails with [`AppError::ElementMissing`] when nothing matches; callers
/// recover that with [`crate::error::OrSentinel`].
pub async fn text_of<D: Document>(
    doc: &D,
    scope: Scope<'_, D::Element>,
    selector: &str,
) -> Result<String, AppError> {
    match doc.query_selector(scope, selector).await? {
        Some(element) => Ok(normalize_text(&doc.inner_text(&element).await?)),
        None => Err(AppError::ElementMissing(selector.to_string())),
    }
}

/// Attribute `name` of the first match of `selector`.
///
/// A missing element and a missing attribute both yield `ElementMissing`.
pub async fn attribute_of<D: Document>(
    doc: &D,
    scope: Scope<'_, D::Element>,
    selector: &str,
    name: &str,
) -> Result<String, AppError> {
    let element = doc
        .query_selector(scope, selector)
        .await?
        .ok_or_else(|| AppError::ElementMissing(selector.to_string()))?;
    doc.get_attribute(&element, name)
        .await?
        .ok_or_else(|| AppError::ElementMissing(format!("{selector}[{name}]")))
}

/// Reads a numeric script result (scroll heights, offsets).
pub async fn evaluate_number<D: Document>(doc: &D, expression: &str) -> Result<f64, AppError> {
    let value = doc.evaluate(expression).await?;
    value.as_f64().ok_or_else(|| {
        AppError::Browser(format!(
            "Expected a number from `{expression}`, got {value}"
        ))
    })
}
