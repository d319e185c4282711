//! Randomised pacing for every page interaction.
//!
//! Each navigation, click, scroll step and inter-listing gap waits for a
//! duration drawn uniformly from a configured range, so the traffic pattern
//! looks like a person browsing rather than a script. The random source is
//! owned by a [`Pacer`] and can be seeded, which makes wait sequences exact
//! and repeatable in tests.
//!
//! # Example
//!
//! ```rust
//! use drape_core::timing::{DelayRange, Pacer, TimingConfig};
//!
//! let pacer = Pacer::seeded(TimingConfig::default(), 7);
//! let wait = pacer.delay(DelayRange::new(800, 1500));
//! assert!(wait.as_millis() >= 800 && wait.as_millis() <= 1500);
//! ```

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Inclusive millisecond bounds for one kind of wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const ZERO: Self = Self::new(0, 0);

    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Bounds in ascending order.
    fn ordered(self) -> (u64, u64) {
        if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        }
    }
}

/// Wait ranges for every paced step of a crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// After the first card appears on a catalog page.
    pub catalog_settle: DelayRange,
    /// After the size selector appears on a detail page.
    pub detail_settle: DelayRange,
    /// After opening the language picker.
    pub language_open: DelayRange,
    /// After choosing a language.
    pub language_apply: DelayRange,
    /// After (re-)opening the size dropdown.
    pub dropdown_settle: DelayRange,
    /// After clicking a size option, before polling the price.
    pub option_click: DelayRange,
    /// Between scroll steps.
    pub scroll_pause: DelayRange,
    /// Usual gap between two detail-page visits.
    pub listing_pause: DelayRange,
    /// Occasional long gap between two detail-page visits.
    pub long_listing_pause: DelayRange,
    /// Probability in `[0, 1]` of taking the long gap.
    pub long_pause_probability: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            catalog_settle: DelayRange::new(2000, 4000),
            detail_settle: DelayRange::new(2500, 5000),
            language_open: DelayRange::new(800, 1500),
            language_apply: DelayRange::new(1500, 2500),
            dropdown_settle: DelayRange::new(800, 1500),
            option_click: DelayRange::new(1000, 2500),
            scroll_pause: DelayRange::new(1000, 2000),
            listing_pause: DelayRange::new(3000, 6000),
            long_listing_pause: DelayRange::new(8000, 15000),
            long_pause_probability: 0.2,
        }
    }
}

impl TimingConfig {
    /// Every wait is zero. For tests and local fixtures.
    pub fn instant() -> Self {
        Self {
            catalog_settle: DelayRange::ZERO,
            detail_settle: DelayRange::ZERO,
            language_open: DelayRange::ZERO,
            language_apply: DelayRange::ZERO,
            dropdown_settle: DelayRange::ZERO,
            option_click: DelayRange::ZERO,
            scroll_pause: DelayRange::ZERO,
            listing_pause: DelayRange::ZERO,
            long_listing_pause: DelayRange::ZERO,
            long_pause_probability: 0.0,
        }
    }
}

/// Draws wait durations and scroll distances from one random source.
///
/// Shared by reference across the engine; the generator sits behind a mutex
/// so the draw order is the call order.
#[derive(Debug)]
pub struct Pacer {
    config: TimingConfig,
    rng: Mutex<StdRng>,
}

impl Pacer {
    /// Pacer seeded from the operating system.
    pub fn new(config: TimingConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Pacer with a fixed seed; identical seeds give identical draw sequences.
    pub fn seeded(config: TimingConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// Uniform duration in `[range.min_ms, range.max_ms]`.
    pub fn delay(&self, range: DelayRange) -> Duration {
        let (min, max) = range.ordered();
        Duration::from_millis(self.uniform(min, max))
    }

    /// Uniform integer in `[min, max]`, used for scroll distances.
    pub fn step(&self, min: u64, max: u64) -> u64 {
        let (min, max) = DelayRange::new(min, max).ordered();
        self.uniform(min, max)
    }

    /// Gap before the next detail-page visit: long with the configured
    /// probability, short otherwise.
    pub fn listing_pause(&self) -> Duration {
        let p = self.config.long_pause_probability.clamp(0.0, 1.0);
        let long = p > 0.0 && self.lock().random_bool(p);
        if long {
            tracing::debug!("Taking a long pause between listings");
            self.delay(self.config.long_listing_pause)
        } else {
            self.delay(self.config.listing_pause)
        }
    }

    fn uniform(&self, min: u64, max: u64) -> u64 {
        if min == max {
            return min;
        }
        self.lock().random_range(min..=max)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(TimingConfig::default())
    }
}
