use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;

use trawler_adapters::{HttpQueryService, RedisBroker};
use trawler_core::config::Settings;
use trawler_core::ports::Broker;
use trawler_crawler::CrawlContext;
use trawler_db::{PgJobQueue, PgScheduleStore};

mod jobs;
mod scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Settings::from_env()?;

    let db = PgPoolOptions::new()
        .max_connections(5)
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
        jobs: Arc::new(PgJobQueue::new(db.clone())),
        cfg: settings.crawl_config(),
    };

    info!(concurrency = settings.worker_concurrency, "worker starting");

    let mut tasks = tokio::task::JoinSet::new();
    tasks.spawn(scheduler::run(
        db.clone(),
        ctx.jobs.clone(),
        settings.clone(),
    ));
    for _ in 0..settings.worker_concurrency {
        let worker_id = format!("worker_{}", nanoid::nanoid!(8));
        tasks.spawn(jobs::run_worker(
            db.clone(),
            ctx.clone(),
            worker_id,
            settings.clone(),
        ));
    }

    while let Some(joined) = tasks.join_next().await {
        joined??;
    }

    Ok(())
}
