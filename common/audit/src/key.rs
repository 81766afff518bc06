use crate::error::AuditResult;
use crate::model::AuditRecord;
use md5::{Digest, Md5};
use std::fmt;

/// 128-bit content digest used as the Kafka message key.
///
/// Identical records land on the same partition. Collisions are tolerated; the key is
/// a sharding and dedup hint, not an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionKey([u8; 16]);

impl PartitionKey {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// MD5 over the JSON serialization of the record as built (pre-encoding).
pub fn derive_key(record: &AuditRecord) -> AuditResult<PartitionKey> {
    let canonical = serde_json::to_vec(record)?;
    let digest = Md5::digest(&canonical);
    let mut key = [0u8; 16];
    key.copy_from_slice(&digest);
    Ok(PartitionKey(key))
}
