use chrono::Utc;
use holdtrace::datasource::{EastMoneyFeed, StoreQuoteSource};
use holdtrace::orchestration::{Ingestor, Reconciler};
use holdtrace::{config::Config, db::init_db, Repository};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize database and dependencies
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let feed = Arc::new(EastMoneyFeed::new(
        config.kline_api_url.clone(),
        config.holders_api_url.clone(),
    ));

    let as_of = Utc::now();

    // Ingest disclosure snapshots and bars for the configured instruments.
    if config.instruments.is_empty() {
        tracing::info!("No instruments configured; reconciling stored data only");
    } else {
        let ingestor = Ingestor::new(feed.clone(), feed.clone(), repo.clone(), config.clone());
        match ingestor.ingest_all(as_of.date_naive()).await {
            Ok(report) => tracing::info!(
                "Ingested {} new snapshots and {} new bars ({} instruments failed)",
                report.snapshots_new,
                report.bars_new,
                report.instruments_failed
            ),
            Err(e) => {
                eprintln!("Ingestion failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    // Reconcile every stored (instrument, holder) pair.
    let quotes = Arc::new(StoreQuoteSource::new(repo.clone()));
    let reconciler = Reconciler::new(repo, quotes, config);

    // An operator abort stops dispatch of new pairs; in-flight pairs finish.
    let cancel = reconciler.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight pairs");
            cancel.cancel();
        }
    });

    match reconciler.reconcile_all(as_of).await {
        Ok(summary) => {
            tracing::info!(
                "Done: {}/{} pairs written, {} failed, {} skipped",
                summary.pairs_written,
                summary.pairs_total,
                summary.failures.len(),
                summary.pairs_skipped
            );
            if summary.pairs_written == 0 && !summary.failures.is_empty() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Reconciliation failed: {}", e);
            std::process::exit(1);
        }
    }
}
