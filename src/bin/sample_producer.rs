use anyhow::Result;
use payment_scoring::config::AppConfig;
use payment_scoring::stream::PAYLOAD_FIELD;
use rand::Rng;
use serde_json::json;
use tracing_subscriber::EnvFilter;

const CUSTOMER_POOL: usize = 200;
const FRAUD_RATIO: f64 = 0.15;

fn transaction(rng: &mut impl Rng) -> (bool, serde_json::Value) {
    let fraud_like = rng.gen_bool(FRAUD_RATIO);
    let (amount_range, feature_range) = if fraud_like {
        (2000.0..10000.0, 0.7..1.0)
    } else {
        (10.0..500.0, 0.1..0.5)
    };

    let amount: f64 = rng.gen_range(amount_range);
    let payload = json!({
        "transaction_id": uuid::Uuid::new_v4().to_string(),
        "customer_id": format!("CUST_{}", rng.gen_range(1..=CUSTOMER_POOL)),
        "amount": (amount * 100.0).round() / 100.0,
        "feature_1": rng.gen_range(feature_range.clone()),
        "feature_2": rng.gen_range(feature_range.clone()),
        "feature_3": rng.gen_range(feature_range),
    });
    (fraud_like, payload)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();
    let count: u64 = std::env::var("PRODUCER_MESSAGES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(50);
    let delay_ms: u64 = std::env::var("PRODUCER_DELAY_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(500);

    let client = redis::Client::open(cfg.redis_url.clone())?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let mut rng = rand::thread_rng();

    for _ in 0..count {
        let (fraud_like, payload) = transaction(&mut rng);
        let raw = serde_json::to_string(&payload)?;
        let id: String = redis::cmd("XADD")
            .arg(&cfg.stream_key)
            .arg("MAXLEN")
            .arg("~")
            .arg(1_000_000)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(&raw)
            .query_async(&mut conn)
            .await?;

        if fraud_like {
            tracing::info!(entry_id = %id, "published fraud-like transaction {}", raw);
        } else {
            tracing::info!(entry_id = %id, "published transaction {}", raw);
        }
        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
    }

    tracing::info!(count, stream = %cfg.stream_key, "finished sending messages");
    Ok(())
}
