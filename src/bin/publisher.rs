use std::env;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde_json::json;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Sample order publisher
// ============================================================================
//
// Publishes one well-formed order to the orders topic, with a fresh
// order_uid per run, for exercising the full ingest path against a local
// broker:
//
//   KAFKA_BROKERS=localhost:9092 cargo run --bin publisher
// ============================================================================

fn env_or(key: &str, fallback: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let brokers = env_or("KAFKA_BROKERS", "localhost:9092");
    let topic = env_or("ORDERS_TOPIC", "orders");

    let order_uid = format!("test-{}", uuid::Uuid::new_v4().simple());
    let order = json!({
        "order_uid": order_uid,
        "track_number": "2222221111111",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": "b563feb7b2b84b6test",
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [{
            "chrt_id": 9934930,
            "track_number": "WBILMTESTTRACK",
            "price": 453,
            "rid": "ab4219087a764ae0btest",
            "name": "Mascaras",
            "sale": 30,
            "size": "0",
            "total_price": 317,
            "nm_id": 2389212,
            "brand": "Vivienne Sabo",
            "status": 202
        }],
        "locale": "en",
        "internal_signature": "",
        "customer_id": "test",
        "delivery_service": "meest",
        "shardkey": "9",
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z",
        "oof_shard": "1"
    });

    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("message.timeout.ms", "5000")
        .create()?;

    let payload = order.to_string();
    producer
        .send(
            FutureRecord::to(&topic).key(&order_uid).payload(&payload),
            Timeout::After(Duration::from_secs(5)),
        )
        .await
        .map_err(|(err, _)| anyhow::anyhow!("Kafka send error: {}", err))?;

    tracing::info!(topic = %topic, order_uid = %order_uid, "✅ Sample order published");
    Ok(())
}
