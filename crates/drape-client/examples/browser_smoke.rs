/// Smoke-test for `ChromeSession`.
///
/// Launches a headless Chromium with the default emulation, opens
/// <https://example.com> and checks that the page drivers the engine relies
/// on (navigation, queries, text, script evaluation) work end to end.
///
/// Run with:
///   cargo run -p drape-client --example browser_smoke
use drape_client::{BrowserOptions, ChromePage, with_session};
use drape_core::AppError;
use drape_core::dom::{evaluate_number, text_of};
use drape_core::traits::{Document, PageSource, Scope};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let options = BrowserOptions {
        headless: true,
        ..BrowserOptions::default()
    };
    let (heading, width, links) = with_session(options, async |session| {
        let page = session.open_page().await?;
        let result = probe(&page).await;
        page.close().await;
        result
    })
    .await?;

    assert_eq!(heading, "Example Domain");
    assert_eq!(width, 1920.0, "viewport emulation not applied");
    assert!(links > 0, "expected at least one link");

    println!("OK: heading {heading:?}, {links} link(s)");
    Ok(())
}

async fn probe(page: &ChromePage) -> Result<(String, f64, usize), AppError> {
    page.goto("https://example.com").await?;
    let heading = text_of(page, Scope::Document, "h1").await?;
    let width = evaluate_number(page, "window.innerWidth").await?;
    let links = page.query_selector_all(Scope::Document, "a").await?;
    Ok((heading, width, links.len()))
}
