pub mod card;
pub mod config;
pub mod crawl;
pub mod dom;
pub mod error;
pub mod models;
pub mod pagination;
pub mod resolver;
pub mod selectors;
pub mod testutil;
pub mod timing;
pub mod traits;

pub use config::{CrawlConfig, ScrollMode};
pub use crawl::CrawlService;
pub use error::AppError;
pub use models::{CrawlReport, ListingReference, ProductRecord, SaveReport, SizeQuote};
pub use selectors::SiteSelectors;
pub use timing::{Pacer, TimingConfig};
pub use traits::{Document, NullSink, PageSource, ProductSink, Scope};
