use anyhow::Result;
use payment_scoring::config::AppConfig;
use payment_scoring::model::predictor::Predictor;
use payment_scoring::repo::scored_transactions_repo::ScoredTransactionsRepo;
use payment_scoring::service::consumer_loop::ConsumerLoop;
use payment_scoring::service::scoring_service::ScoringService;
use payment_scoring::stream::dead_letter::RedisDeadLetterSink;
use payment_scoring::stream::redis_source::RedisStreamSource;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();
    cfg.validate()?;

    let predictor = Arc::new(Predictor::load(&cfg.model_path, &cfg.scaler_path)?);
    tracing::info!(
        model = %cfg.model_path,
        scaler = %cfg.scaler_path,
        features = predictor.n_features(),
        "model artifacts loaded"
    );

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_max_connections)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Arc::new(ScoredTransactionsRepo { pool });
    let redis_client = redis::Client::open(cfg.redis_url.clone())?;
    let source = RedisStreamSource::connect(&redis_client, &cfg).await?;
    let dead_letters = RedisDeadLetterSink::connect(&redis_client, cfg.dead_letter_stream()).await?;

    let service = ScoringService::new(predictor, store, cfg.policy, cfg.batch_size, cfg.store_retry);
    let mut consumer = ConsumerLoop::new(source, dead_letters, service);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    tracing::info!(
        stream = %cfg.stream_key,
        group = %cfg.stream_group,
        consumer = %cfg.consumer_name,
        dead_letter_stream = %cfg.dead_letter_stream(),
        batch_size = cfg.batch_size,
        "payment scoring started"
    );

    let summary = consumer.run(cancel).await?;
    tracing::info!(
        processed = summary.processed,
        dead_lettered = summary.dead_lettered,
        dead_letter_failures = summary.dead_letter_failures,
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        rejected = summary.rejected,
        "shutdown complete"
    );
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, flushing");
    cancel.cancel();
}
