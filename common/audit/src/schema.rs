//! Audit message schema: descriptor loading, record validation and the binary codec.
//!
//! The wire types in [`crate::model`] are generated from `proto/message.proto` at build
//! time. At runtime the same definition is loaded into a [`DescriptorPool`], either from
//! the descriptor set embedded in the crate or by compiling a `.proto` file from disk,
//! and records are checked against it before encoding. Loading happens at most once per
//! successful attempt: a failed load leaves the handle empty and the next use retries.

use crate::error::{AuditError, AuditResult};
use crate::model::{AuditRecord, FILE_DESCRIPTOR_SET};
use prost::Message;
use prost_reflect::{Cardinality, DescriptorPool, DynamicMessage, FieldDescriptor, Kind, MessageDescriptor, ReflectMessage, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Fully qualified name of the record type.
pub const ROOT_TYPE: &str = "message.Message";

/// Loaded descriptor pool and the resolved record type.
#[derive(Debug, Clone)]
pub struct MessageSchema {
    pool: DescriptorPool,
    root: MessageDescriptor,
}

impl MessageSchema {
    pub fn from_pool(pool: DescriptorPool) -> Result<Self, String> {
        let root = pool
            .get_message_by_name(ROOT_TYPE)
            .ok_or_else(|| format!("schema does not declare {ROOT_TYPE}"))?;
        Ok(Self { pool, root })
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    pub fn root(&self) -> &MessageDescriptor {
        &self.root
    }

    /// Check `record` against the record type.
    ///
    /// Returns `None` when the record conforms, otherwise the first violation as
    /// `path: reason`.
    pub fn verify(&self, record: &AuditRecord) -> Option<String> {
        let bytes = record.encode_to_vec();
        match DynamicMessage::decode(self.root.clone(), bytes.as_slice()) {
            Ok(message) => verify_message(&message, "").err(),
            Err(err) => Some(format!("{}: {err}", self.root.full_name())),
        }
    }
}

fn verify_message(message: &DynamicMessage, path: &str) -> Result<(), String> {
    for field in message.descriptor().fields() {
        let field_path = join(path, field.name());
        if !message.has_field(&field) {
            if field.cardinality() == Cardinality::Required {
                return Err(format!("{field_path}: required field missing"));
            }
            continue;
        }
        match &*message.get_field(&field) {
            Value::List(items) => {
                for (idx, item) in items.iter().enumerate() {
                    verify_value(&field, item, &format!("{field_path}[{idx}]"))?;
                }
            }
            value => verify_value(&field, value, &field_path)?,
        }
    }
    Ok(())
}

fn verify_value(field: &FieldDescriptor, value: &Value, path: &str) -> Result<(), String> {
    match (field.kind(), value) {
        (Kind::Message(_), Value::Message(nested)) => verify_message(nested, path),
        (Kind::Enum(descriptor), Value::EnumNumber(number)) if descriptor.get_value(*number).is_none() => Err(
            format!("{path}: enum value expected, {number} is not declared in {}", descriptor.full_name()),
        ),
        _ => Ok(()),
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

/// Where the schema definition is read from.
#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// The descriptor set compiled into the crate from `proto/message.proto`.
    Bundled,
    /// A `.proto` file compiled at load time; imports resolve relative to its directory.
    Path(PathBuf),
}

/// Lazily loaded schema plus the binary codec for [`AuditRecord`].
#[derive(Debug)]
pub struct SchemaCodec {
    source: SchemaSource,
    schema: OnceCell<MessageSchema>,
    loads: AtomicUsize,
}

impl SchemaCodec {
    pub fn new(source: SchemaSource) -> Self {
        Self {
            source,
            schema: OnceCell::new(),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn bundled() -> Self {
        Self::new(SchemaSource::Bundled)
    }

    pub fn is_loaded(&self) -> bool {
        self.schema.initialized()
    }

    /// Number of successful schema loads; at most one for the lifetime of the codec.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Loaded schema, loading it first if no attempt has succeeded yet.
    pub async fn schema(&self) -> AuditResult<&MessageSchema> {
        self.schema.get_or_try_init(|| self.load()).await
    }

    async fn load(&self) -> AuditResult<MessageSchema> {
        let pool = match &self.source {
            SchemaSource::Bundled => DescriptorPool::decode(FILE_DESCRIPTOR_SET)
                .map_err(|e| AuditError::SchemaUnavailable(format!("bundled descriptor set: {e}")))?,
            SchemaSource::Path(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || compile_schema(&path))
                    .await
                    .map_err(|e| AuditError::SchemaUnavailable(format!("schema compilation aborted: {e}")))??
            }
        };
        let schema = MessageSchema::from_pool(pool).map_err(AuditError::SchemaUnavailable)?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        info!(source = ?self.source, root = ROOT_TYPE, "audit schema loaded");
        Ok(schema)
    }

    pub async fn validate(&self, record: &AuditRecord) -> AuditResult<()> {
        let schema = self.schema().await?;
        match schema.verify(record) {
            Some(diagnostic) => Err(AuditError::Validation(diagnostic)),
            None => Ok(()),
        }
    }

    pub async fn encode(&self, record: &AuditRecord) -> AuditResult<Vec<u8>> {
        let schema = self.schema().await?;
        if let Some(diagnostic) = schema.verify(record) {
            return Err(AuditError::Encoding(diagnostic));
        }
        let bytes = record.encode_to_vec();
        debug!(bytes = bytes.len(), "audit record encoded");
        Ok(bytes)
    }

    pub async fn decode(&self, bytes: &[u8]) -> AuditResult<AuditRecord> {
        self.schema().await?;
        AuditRecord::decode(bytes).map_err(|e| AuditError::Decoding(e.to_string()))
    }
}

fn compile_schema(path: &Path) -> AuditResult<DescriptorPool> {
    let unavailable = |reason: String| AuditError::SchemaUnavailable(format!("{}: {reason}", path.display()));
    let file = path
        .file_name()
        .ok_or_else(|| unavailable("not a file path".to_string()))?;
    let include = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut compiler = protox::Compiler::new([include]).map_err(|e| unavailable(e.to_string()))?;
    compiler.open_file(file).map_err(|e| unavailable(e.to_string()))?;
    Ok(compiler.descriptor_pool())
}
