use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the pagination loop advances the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ScrollMode {
    /// `window.scrollBy` a random distance in `[min_px, max_px]`.
    Increment { min_px: u64, max_px: u64 },
    /// Jump straight to the current document height.
    ToBottom,
}

impl Default for ScrollMode {
    fn default() -> Self {
        ScrollMode::Increment {
            min_px: 300,
            max_px: 700,
        }
    }
}

/// Timeouts, budgets and tags for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Tag stored with every record (e.g. `"farfetch"`).
    pub source: String,
    /// How long a catalog page may take to show its first card.
    pub catalog_timeout: Duration,
    /// How long a detail page may take to show its size selector.
    pub detail_timeout: Duration,
    /// How long the size dropdown may take to list its options.
    pub options_timeout: Duration,
    /// Price reads after each option click.
    pub poll_attempts: u32,
    /// Fixed wait between two price reads.
    pub poll_interval: Duration,
    pub scroll: ScrollMode,
    /// Upper bound on scroll iterations for a single catalog page.
    pub max_scroll_iterations: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            source: "farfetch".into(),
            catalog_timeout: Duration::from_secs(10),
            detail_timeout: Duration::from_secs(10),
            options_timeout: Duration::from_secs(5),
            poll_attempts: 6,
            poll_interval: Duration::from_millis(500),
            scroll: ScrollMode::default(),
            max_scroll_iterations: 200,
        }
    }
}

impl CrawlConfig {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}
