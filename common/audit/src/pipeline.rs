use crate::builder::{EventBuilder, PendingRecord};
use crate::config::AuditConfig;
use crate::error::{AuditError, AuditResult};
use crate::invocation::{Invocation, Outcome};
use crate::key::derive_key;
use crate::model::AuditRecord;
use crate::producer::{AuditSink, DeliveryEnvelope};
use crate::schema::SchemaCodec;
use gateway_observability::AuditMetrics;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

/// Two-phase audit entry point for the host.
///
/// `on_invocation_start` runs on the caller's hot path and only matches configuration
/// and captures context. Everything else happens in a detached task spawned by
/// [`InvocationGuard::on_invocation_end`]; its failures are logged and counted, never
/// returned to the caller.
#[derive(Clone)]
pub struct AuditPipeline {
    enabled: bool,
    builder: Arc<EventBuilder>,
    shared: Arc<DeliveryUnit>,
}

struct DeliveryUnit {
    codec: SchemaCodec,
    sink: Arc<dyn AuditSink>,
    topic: String,
    metrics: Arc<AuditMetrics>,
    runtime: Handle,
}

/// Continuation returned for an audited invocation.
#[must_use = "an audited invocation is only delivered once on_invocation_end is called"]
pub struct InvocationGuard {
    pending: PendingRecord,
    shared: Arc<DeliveryUnit>,
}

impl AuditPipeline {
    /// Must be called from within a tokio runtime; delivery tasks are spawned on it.
    pub fn new(config: &AuditConfig, sink: Arc<dyn AuditSink>, metrics: Arc<AuditMetrics>) -> AuditResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| AuditError::Config(format!("audit pipeline requires a tokio runtime: {e}")))?;
        let builder = EventBuilder::new(config.app_name.clone(), config.entity_code.clone(), config.sources.clone());
        if !config.enabled {
            debug!(app = %config.app_name, "audit pipeline disabled");
        }
        Ok(Self {
            enabled: config.enabled,
            builder: Arc::new(builder),
            shared: Arc::new(DeliveryUnit {
                codec: SchemaCodec::new(config.schema_source()),
                sink,
                topic: config.kafka.topic.clone(),
                metrics,
                runtime,
            }),
        })
    }

    /// Pipeline publishing through [`crate::KafkaAuditSink`] with a fresh metrics registry.
    #[cfg(any(feature = "kafka", feature = "kafka-producer"))]
    pub fn from_config(config: &AuditConfig) -> AuditResult<Self> {
        let metrics = AuditMetrics::new().map_err(|e| AuditError::Config(format!("metrics registry: {e}")))?;
        let sink = crate::producer::KafkaAuditSink::new(config.sink_config());
        Self::new(config, Arc::new(sink), Arc::new(metrics))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn metrics(&self) -> &AuditMetrics {
        &self.shared.metrics
    }

    pub fn codec(&self) -> &SchemaCodec {
        &self.shared.codec
    }

    /// Startup schema load. A failure is logged and left for the next delivery to retry.
    pub async fn preload_schema(&self) -> bool {
        match self.shared.codec.schema().await {
            Ok(_) => true,
            Err(err) => {
                warn!(?err, "audit schema could not be loaded at startup; will retry on first delivery");
                false
            }
        }
    }

    /// Open an audit record for `invocation`, or `None` when auditing does not apply.
    pub fn on_invocation_start(&self, invocation: &Invocation) -> Option<InvocationGuard> {
        if !self.enabled {
            return None;
        }
        let Some(pending) = self.builder.open(invocation) else {
            self.shared.metrics.records_skipped.inc();
            trace!(
                source = %invocation.source_name,
                type_name = %invocation.type_name,
                field = %invocation.field_name,
                "field not enrolled for auditing"
            );
            return None;
        };
        self.shared.metrics.records_opened.inc();
        Some(InvocationGuard {
            pending,
            shared: Arc::clone(&self.shared),
        })
    }
}

impl InvocationGuard {
    pub fn record(&self) -> &AuditRecord {
        self.pending.record()
    }

    /// Finalize and ship the record in a detached task. The handle may be dropped.
    pub fn on_invocation_end(self, outcome: Outcome) -> JoinHandle<()> {
        let InvocationGuard { pending, shared } = self;
        let runtime = shared.runtime.clone();
        runtime.spawn(async move {
            let record = pending.finalize(&outcome);
            if let Err(err) = shared.ship(&record).await {
                shared.metrics.record_failure(err.stage_label());
                error!(?err, stage = err.stage_label(), topic = %shared.topic, "audit event emission failed");
            }
        })
    }
}

impl DeliveryUnit {
    async fn ship(&self, record: &AuditRecord) -> AuditResult<()> {
        self.codec.validate(record).await?;
        let payload = self.codec.encode(record).await?;
        let key = derive_key(record)?;
        let envelope = DeliveryEnvelope {
            key,
            payload,
            topic: self.topic.clone(),
        };

        let started = Instant::now();
        let delivered = self.sink.publish(envelope).await;
        self.metrics
            .delivery_duration_seconds
            .observe(started.elapsed().as_secs_f64());
        delivered?;

        self.metrics.events_delivered.inc();
        debug!(key = %key, topic = %self.topic, "audit event shipped");
        Ok(())
    }
}
