pub mod builder;
pub mod config;
pub mod error;
pub mod invocation;
pub mod key;
pub mod model;
pub mod pipeline;
pub mod producer;
pub mod schema;

pub use builder::{EventBuilder, PendingRecord};
pub use config::{AuditConfig, KafkaConfig, RootType, SourceConfig};
pub use error::{AuditError, AuditResult, DeliveryStage};
pub use invocation::{CurrentUser, Invocation, InvocationContext, Outcome, RequestParams, TraceSource};
pub use key::{derive_key, PartitionKey};
pub use model::{field_codes, AuditRecord, EventSource, EventType, FieldEntry};
pub use pipeline::{AuditPipeline, InvocationGuard};
pub use producer::{AuditSink, DeliveryEnvelope, KafkaSinkConfig, NoopAuditSink};
pub use schema::{SchemaCodec, SchemaSource};
// Export the rdkafka-backed sink only when the producer feature (or the kafka umbrella) is enabled.
#[cfg(any(feature = "kafka", feature = "kafka-producer"))]
pub use producer::KafkaAuditSink;
pub use gateway_observability::AuditMetrics;
