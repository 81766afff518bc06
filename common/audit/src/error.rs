use std::fmt;
use thiserror::Error;

pub type AuditResult<T> = Result<T, AuditError>;

/// Step of a single connect/send/disconnect delivery that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStage {
    Connect,
    Send,
    Disconnect,
}

impl fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeliveryStage::Connect => "connect",
            DeliveryStage::Send => "send",
            DeliveryStage::Disconnect => "disconnect",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit schema unavailable: {0}")]
    SchemaUnavailable(String),
    #[error("audit record failed validation: {0}")]
    Validation(String),
    #[error("audit record encoding failed: {0}")]
    Encoding(String),
    #[error("audit record decoding failed: {0}")]
    Decoding(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("kafka {stage} failed: {reason}")]
    Delivery { stage: DeliveryStage, reason: String },
    #[error("invalid audit configuration: {0}")]
    Config(String),
}

impl AuditError {
    pub fn delivery(stage: DeliveryStage, reason: impl fmt::Display) -> Self {
        AuditError::Delivery { stage, reason: reason.to_string() }
    }

    /// Metric label for the pipeline stage this error belongs to.
    pub fn stage_label(&self) -> &'static str {
        match self {
            AuditError::SchemaUnavailable(_) => "schema",
            AuditError::Validation(_) => "validate",
            AuditError::Encoding(_) | AuditError::Decoding(_) => "encode",
            AuditError::Serialization(_) => "serialize",
            AuditError::Delivery { .. } => "deliver",
            AuditError::Config(_) => "config",
        }
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}
