use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::info;

use trawler_adapters::{HttpQueryService, RedisBroker};
use trawler_core::config::Settings;
use trawler_core::ports::Broker;
use trawler_crawler::CrawlContext;
use trawler_db::{PgJobQueue, PgScheduleStore};

mod error;
mod routes;
mod state;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Settings::from_env()?;

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&settings.database_url)
        .await?;

    let broker: Option<Arc<dyn Broker>> = match &settings.redis_url {
        Some(url) => Some(Arc::new(RedisBroker::connect(url).await?)),
        None => {
            info!("no broker configured, messages will be written to the database");
            None
        }
    };

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let ctx = CrawlContext {
        query: Arc::new(HttpQueryService::new(
            http,
            settings.query_api_url.clone(),
            settings.query_username.clone(),
        )),
        store: Arc::new(PgScheduleStore::new(db.clone())),
        broker,
        jobs: Arc::new(PgJobQueue::new(db)),
        cfg: settings.crawl_config(),
    };

    let state = AppState { ctx };

    let app = Router::new()
        .merge(routes::health_router())
        .merge(routes::api_router(state));

    let addr: SocketAddr = settings.api_bind.parse()?;

    info!(%addr, "starting api");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
