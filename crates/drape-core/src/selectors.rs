//! Site-specific markup bindings.
//!
//! The engine is one implementation parameterised by a [`SiteSelectors`]
//! value per site. The default binding targets Farfetch's current markup;
//! other sites (or a re-skinned Farfetch) are described by a JSON file whose
//! missing fields fall back to the defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;

/// Controls used to switch the storefront language before reading cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSwitch {
    /// Opens the language/region picker.
    pub toggle: String,
    /// The language entry to pick.
    pub choice: String,
}

/// Named CSS selectors for one catalog site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSelectors {
    /// Origin used to resolve relative card links and image sources.
    pub base_url: String,

    // Catalog page
    pub product_card: String,
    pub card_brand: String,
    pub card_name: String,
    pub card_link: String,

    // Detail page
    pub size_selector: String,
    pub size_option: String,
    pub option_size: String,
    pub option_label: String,
    /// Discounted price; preferred over `price_standard` when shown.
    pub price_final: String,
    pub price_standard: String,
    pub price_footnote: String,
    pub image: String,
    /// Only images served from this host (or its subdomains) are kept.
    pub image_host: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<LanguageSwitch>,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self::farfetch()
    }
}

impl SiteSelectors {
    /// Bindings for farfetch.com.
    pub fn farfetch() -> Self {
        Self {
            base_url: "https://www.farfetch.com".into(),
            product_card: r#"[data-testid="productCard"]"#.into(),
            card_brand: r#"[data-component="ProductCardBrandName"]"#.into(),
            card_name: r#"[data-component="ProductCardDescription"]"#.into(),
            card_link: "a".into(),
            size_selector: r#"[data-component="SizeSelectorLabel"]"#.into(),
            size_option: r#"[data-component="SizeSelectorOption"]"#.into(),
            option_size: r#"[data-component="SizeSelectorOptionSize"]"#.into(),
            option_label: r#"[data-component="SizeSelectorOptionLabel"]"#.into(),
            price_final: r#"[data-component="PriceCallout"] [data-component="PriceFinal"]"#
                .into(),
            price_standard: r#"[data-component="PriceCallout"] [data-component="Body"]"#.into(),
            price_footnote: r#"[data-component="PriceCallout"] [data-component="Footnote"]"#
                .into(),
            image: r#"[data-component="Img"]"#.into(),
            image_host: "farfetch-contents.com".into(),
            language: Some(LanguageSwitch {
                toggle: r#"[aria-label="Language and region"]"#.into(),
                choice: r#"[data-testid="btn-English (American)"]"#.into(),
            }),
        }
    }

    /// Loads bindings from a JSON file. Absent fields keep their Farfetch default.
    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!(
                "Failed to read selectors file {}: {e}",
                path.display()
            ))
        })?;
        let selectors: Self = serde_json::from_str(&raw)?;
        selectors.validate()?;
        Ok(selectors)
    }

    fn validate(&self) -> Result<(), AppError> {
        Url::parse(&self.base_url)
            .map_err(|e| AppError::Config(format!("Invalid base_url '{}': {e}", self.base_url)))?;
        if self.product_card.trim().is_empty() || self.size_selector.trim().is_empty() {
            return Err(AppError::Config(
                "product_card and size_selector must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Resolves a (possibly relative) link against `base_url`.
    ///
    /// Returns `None` for empty or unparseable links.
    pub fn absolute_url(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        let base = Url::parse(&self.base_url).ok()?;
        base.join(href).ok().map(String::from)
    }

    /// True when `src` points into the configured image CDN.
    pub fn is_cdn_image(&self, src: &str) -> bool {
        let Some(resolved) = self.absolute_url(src) else {
            return false;
        };
        let Ok(url) = Url::parse(&resolved) else {
            return false;
        };
        url.host_str().is_some_and(|host| {
            host == self.image_host || host.ends_with(&format!(".{}", self.image_host))
        })
    }
}
