use trawler_crawler::CrawlContext;

#[derive(Clone)]
pub struct AppState {
    pub ctx: CrawlContext,
}
