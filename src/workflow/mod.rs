pub mod import_ctx;
pub mod scrape_flow;

pub use import_ctx::ImportCtx;
pub use scrape_flow::ScrapeFlow;
