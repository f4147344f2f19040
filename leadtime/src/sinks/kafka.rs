use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, gauge};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use tracing::{debug, error, info};

use crate::config::KafkaConfig;
use crate::sinks::{Emission, EmissionSink, SinkError};

struct KafkaContext;

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        gauge!("leadtime_kafka_callback_queue_depth").set(stats.replyq as f64);
        gauge!("leadtime_kafka_producer_queue_depth").set(stats.msg_cnt as f64);
        gauge!("leadtime_kafka_producer_queue_depth_limit").set(stats.msg_max as f64);
    }
}

#[derive(Clone)]
pub struct KafkaSink {
    producer: FutureProducer<KafkaContext>,
    topic: String,
}

impl KafkaSink {
    pub fn new(config: &KafkaConfig) -> anyhow::Result<KafkaSink> {
        info!("connecting to Kafka brokers at {}...", config.kafka_hosts);

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("linger.ms", config.kafka_producer_linger_ms.to_string())
            .set(
                "message.timeout.ms",
                config.kafka_message_timeout_ms.to_string(),
            )
            .set("compression.codec", &config.kafka_compression_codec)
            .set(
                "queue.buffering.max.kbytes",
                (config.kafka_producer_queue_mib * 1024).to_string(),
            );

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka configuration: {:?}", client_config);
        let producer: FutureProducer<KafkaContext> =
            client_config.create_with_context(KafkaContext)?;

        // Ping the cluster to make sure we can reach brokers, fail after 10 seconds
        drop(producer.client().fetch_metadata(
            Some("__consumer_offsets"),
            Timeout::After(Duration::new(10, 0)),
        )?);
        info!("connected to Kafka brokers");

        Ok(KafkaSink {
            producer,
            topic: config.kafka_topic.clone(),
        })
    }

    async fn kafka_send(&self, emission: Emission) -> Result<DeliveryFuture, SinkError> {
        let payload = serde_json::to_string(&emission).map_err(|e| {
            error!("failed to serialize emission: {}", e);
            SinkError::Serialization(e)
        })?;

        let key = emission.key();

        match self.producer.send_result(FutureRecord {
            topic: self.topic.as_str(),
            payload: Some(&payload),
            partition: None,
            key: Some(&key),
            timestamp: None,
            headers: None,
        }) {
            Ok(ack) => Ok(ack),
            Err((e, _)) => match e.rdkafka_error_code() {
                Some(RDKafkaErrorCode::MessageSizeTooLarge) => {
                    counter!("leadtime_emissions_dropped_total", "cause" => "message_size")
                        .increment(1);
                    Err(SinkError::TooLarge)
                }
                _ => {
                    counter!("leadtime_emissions_dropped_total", "cause" => "produce_error")
                        .increment(1);
                    error!("failed to produce emission: {}", e);
                    Err(SinkError::Retryable)
                }
            },
        }
    }

    async fn process_ack(delivery: DeliveryFuture) -> Result<(), SinkError> {
        match delivery.await {
            Err(_) => {
                // Cancelled due to timeout while retrying
                counter!("leadtime_kafka_produce_errors_total").increment(1);
                error!("failed to produce to Kafka before write timeout");
                Err(SinkError::Retryable)
            }
            Ok(Err((KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge), _))) => {
                // Rejected by broker due to message size
                counter!("leadtime_emissions_dropped_total", "cause" => "message_size")
                    .increment(1);
                Err(SinkError::TooLarge)
            }
            Ok(Err((err, _))) => {
                counter!("leadtime_kafka_produce_errors_total").increment(1);
                error!("failed to produce to Kafka: {}", err);
                Err(SinkError::Retryable)
            }
            Ok(Ok(_)) => {
                counter!("leadtime_emissions_ingested_total").increment(1);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl EmissionSink for KafkaSink {
    async fn emit(&self, emission: Emission) -> Result<(), SinkError> {
        let ack = self.kafka_send(emission).await?;
        Self::process_ack(ack).await
    }
}
