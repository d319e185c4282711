use thiserror::Error;

/// Application-wide error types for Drape.
#[derive(Error, Debug)]
pub enum AppError {
    /// A page's required selector never appeared (catalog or detail page unusable).
    #[error("Page load failed for {url}: selector '{selector}' never appeared")]
    PageLoad { url: String, selector: String },

    /// An optional field's element is absent.
    ///
    /// Always recovered locally with a sentinel (see [`OrSentinel`]).
    #[error("Element missing: {0}")]
    ElementMissing(String),

    /// `wait_for_selector` gave up after its timeout.
    #[error("Timed out after {timeout_ms}ms waiting for '{selector}'")]
    SelectorTimeout { selector: String, timeout_ms: u64 },

    /// The size option list shrank between two openings of the dropdown.
    #[error("Size option {index} vanished after re-render ({available} options left)")]
    OptionsVanished { index: usize, available: usize },

    /// The browser driver failed (navigation, CDP call, script evaluation).
    #[error("Browser error: {0}")]
    Browser(String),

    /// Persistence sink failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid or missing configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Recovers [`AppError::ElementMissing`] into a default value.
///
/// Field-level absence never propagates; every other error passes through.
pub trait OrSentinel<T> {
    fn or_sentinel(self, default: T) -> Result<T, AppError>;
}

impl<T> OrSentinel<T> for Result<T, AppError> {
    fn or_sentinel(self, default: T) -> Result<T, AppError> {
        match self {
            Err(AppError::ElementMissing(selector)) => {
                tracing::trace!(%selector, "Optional element absent, using default");
                Ok(default)
            }
            other => other,
        }
    }
}
