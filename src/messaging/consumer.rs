use futures_util::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;

use crate::config::Config;
use crate::db::OrderStore;
use crate::ingest::{IngestOutcome, IngestPipeline};

// ============================================================================
// Kafka consumer - the acknowledgment boundary
// ============================================================================
//
// The consumer group id is the durable subscription identity: offsets are
// committed only after the pipeline reports Accepted, so anything short of
// that is redelivered once the group rebalances or the process restarts.
// Rejected and failed messages are left uncommitted; the broker's
// redelivery and retention policy decide their fate, not this loop.
// ============================================================================

/// Build the consumer and process the orders topic until the task is
/// aborted at shutdown.
pub async fn run_consumer<S: OrderStore>(
    config: &Config,
    pipeline: &IngestPipeline<S>,
) -> anyhow::Result<()> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("group.id", &config.consumer_group)
        .set("bootstrap.servers", &config.kafka_brokers)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("session.timeout.ms", "6000")
        .create()?;

    consumer.subscribe(&[&config.orders_topic])?;
    tracing::info!(
        topic = %config.orders_topic,
        group = %config.consumer_group,
        "Subscribed to orders topic"
    );

    let mut stream = consumer.stream();
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(error = %err, "Kafka receive error");
                continue;
            }
        };

        let payload = message.payload().unwrap_or_default();
        match pipeline.handle_message(payload).await {
            Ok(IngestOutcome::Accepted { order_uid, .. }) => {
                // The offset commit is the acknowledgment.
                if let Err(err) = consumer.commit_message(&message, CommitMode::Async) {
                    tracing::error!(
                        error = %err,
                        order_uid = %order_uid,
                        "Failed to commit offset"
                    );
                }
            }
            Ok(IngestOutcome::Rejected(reason)) => {
                tracing::warn!(
                    reason = %reason,
                    offset = message.offset(),
                    "Message rejected, offset left uncommitted"
                );
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    offset = message.offset(),
                    "Store error, message left unacknowledged for redelivery"
                );
            }
        }
    }

    Ok(())
}
