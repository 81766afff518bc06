use crate::error::AuditResult;
use crate::key::PartitionKey;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::trace;

#[cfg(any(feature = "kafka", feature = "kafka-producer"))]
use crate::error::{AuditError, DeliveryStage};
#[cfg(any(feature = "kafka", feature = "kafka-producer"))]
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
#[cfg(any(feature = "kafka", feature = "kafka-producer"))]
use rdkafka::ClientConfig;
#[cfg(any(feature = "kafka", feature = "kafka-producer"))]
use tracing::debug;

pub const SASL_MECHANISM: &str = "SCRAM-SHA-512";

/// One encoded record on its way to the broker. Consumed by exactly one publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryEnvelope {
    pub key: PartitionKey,
    pub payload: Vec<u8>,
    pub topic: String,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn publish(&self, envelope: DeliveryEnvelope) -> AuditResult<()>;
}

/// Sink that drops every envelope. Used when no broker is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn publish(&self, envelope: DeliveryEnvelope) -> AuditResult<()> {
        trace!(topic = %envelope.topic, key = %envelope.key, bytes = envelope.payload.len(), "noop audit sink dropped event");
        Ok(())
    }
}

#[derive(Clone)]
pub struct KafkaSinkConfig {
    pub brokers: Vec<String>,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub security_protocol: String,
    pub message_timeout: Duration,
    pub flush_timeout: Duration,
}

impl fmt::Debug for KafkaSinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaSinkConfig")
            .field("brokers", &self.brokers)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"***")
            .field("security_protocol", &self.security_protocol)
            .field("message_timeout", &self.message_timeout)
            .field("flush_timeout", &self.flush_timeout)
            .finish()
    }
}

/// Publishes each envelope over its own short-lived producer: connect, send, flush,
/// drop. Nothing is held open between audit events.
#[cfg(any(feature = "kafka", feature = "kafka-producer"))]
#[derive(Debug, Clone)]
pub struct KafkaAuditSink {
    config: KafkaSinkConfig,
}

#[cfg(any(feature = "kafka", feature = "kafka-producer"))]
impl KafkaAuditSink {
    pub fn new(config: KafkaSinkConfig) -> Self {
        Self { config }
    }

    fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", self.config.brokers.join(","))
            .set("client.id", &self.config.client_id)
            .set("security.protocol", &self.config.security_protocol)
            .set("sasl.mechanism", SASL_MECHANISM)
            .set("sasl.username", &self.config.username)
            .set("sasl.password", &self.config.password)
            .set("message.timeout.ms", self.config.message_timeout.as_millis().to_string());
        client
    }
}

#[cfg(any(feature = "kafka", feature = "kafka-producer"))]
#[async_trait]
impl AuditSink for KafkaAuditSink {
    async fn publish(&self, envelope: DeliveryEnvelope) -> AuditResult<()> {
        let producer: FutureProducer = self
            .client_config()
            .create()
            .map_err(|e| AuditError::delivery(DeliveryStage::Connect, e))?;

        let record = FutureRecord::to(&envelope.topic)
            .key(&envelope.key.as_bytes()[..])
            .payload(&envelope.payload);
        let (partition, offset) = producer
            .send(record, self.config.message_timeout)
            .await
            .map_err(|(e, _)| AuditError::delivery(DeliveryStage::Send, e))?;

        let flush_timeout = self.config.flush_timeout;
        tokio::task::spawn_blocking(move || producer.flush(flush_timeout))
            .await
            .map_err(|e| AuditError::delivery(DeliveryStage::Disconnect, e))?
            .map_err(|e| AuditError::delivery(DeliveryStage::Disconnect, e))?;

        debug!(topic = %envelope.topic, key = %envelope.key, partition, offset, "audit event delivered");
        Ok(())
    }
}
