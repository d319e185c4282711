pub mod browser;

pub use browser::{BrowserOptions, ChromePage, ChromeSession, find_chrome_binary, with_session};
