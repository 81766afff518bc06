use crate::error::{AuditError, AuditResult};
use crate::invocation::Invocation;
use crate::model::EventType;
use crate::producer::KafkaSinkConfig;
use crate::schema::SchemaSource;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

static ENV_TEMPLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}").unwrap());

const DEFAULT_SECURITY_PROTOCOL: &str = "sasl_plaintext";
const DEFAULT_MESSAGE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_TOPIC: &str = "audit.events.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RootType {
    Query,
    Mutation,
}

impl RootType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RootType::Query => "Query",
            RootType::Mutation => "Mutation",
        }
    }
}

/// One enrolled field: which resolution to audit, with what event type, and where
/// its external id lives in the call arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub source_name: String,
    pub type_name: RootType,
    pub field_name: String,
    #[serde(default)]
    pub event_type: Option<EventType>,
    #[serde(default)]
    pub external_id: Option<String>,
}

impl SourceConfig {
    pub fn new(source_name: impl Into<String>, type_name: RootType, field_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            type_name,
            field_name: field_name.into(),
            event_type: None,
            external_id: None,
        }
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn with_external_id(mut self, path: impl Into<String>) -> Self {
        self.external_id = Some(path.into());
        self
    }

    pub fn matches(&self, invocation: &Invocation) -> bool {
        self.source_name == invocation.source_name
            && self.type_name.as_str() == invocation.type_name
            && self.field_name == invocation.field_name
    }
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConfig {
    /// Comma-separated `host:port` list.
    pub brokers: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub username: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub password: String,
    pub topic: String,
    #[serde(default = "default_security_protocol")]
    pub security_protocol: String,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
}

impl fmt::Debug for KafkaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaConfig")
            .field("brokers", &self.brokers)
            .field("username", &self.username)
            .field("password", &"***")
            .field("topic", &self.topic)
            .field("security_protocol", &self.security_protocol)
            .field("message_timeout_ms", &self.message_timeout_ms)
            .finish()
    }
}

impl KafkaConfig {
    pub fn broker_list(&self) -> Vec<String> {
        self.brokers
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub enabled: bool,
    pub app_name: String,
    pub entity_code: String,
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub schema_path: Option<PathBuf>,
}

fn default_security_protocol() -> String {
    DEFAULT_SECURITY_PROTOCOL.to_string()
}

fn default_message_timeout_ms() -> u64 {
    DEFAULT_MESSAGE_TIMEOUT_MS
}

fn string_or_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `true`/`false`, their string forms, or numbers (non-zero is on). Null is off.
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_f64().map(|n| n != 0.0).unwrap_or(false)),
        Value::String(s) => parse_flag(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid flag '{s}'"))),
        other => Err(serde::de::Error::custom(format!("invalid flag {other}"))),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Replace `{env.NAME}` placeholders in every string of `value`. Unset variables
/// resolve to an empty string; strings that end up `""` or `"null"` become null.
pub fn resolve_templates<F>(value: &mut Value, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(raw) => {
            let resolved = ENV_TEMPLATE
                .replace_all(raw, |caps: &Captures| lookup(&caps[1]).unwrap_or_default())
                .into_owned();
            *value = match resolved.as_str() {
                "" | "null" => Value::Null,
                _ => Value::String(resolved),
            };
        }
        Value::Array(items) => items.iter_mut().for_each(|item| resolve_templates(item, lookup)),
        Value::Object(map) => map.values_mut().for_each(|item| resolve_templates(item, lookup)),
        _ => {}
    }
}

impl AuditConfig {
    /// Parse a JSON configuration document, resolving `{env.NAME}` templates against
    /// the process environment.
    pub fn from_json_str(raw: &str) -> AuditResult<Self> {
        Self::from_json_str_with(raw, |name| env::var(name).ok())
    }

    pub fn from_json_str_with<F>(raw: &str, lookup: F) -> AuditResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut value: Value =
            serde_json::from_str(raw).map_err(|e| AuditError::Config(format!("malformed configuration: {e}")))?;
        resolve_templates(&mut value, &lookup);
        serde_json::from_value(value).map_err(|e| AuditError::Config(e.to_string()))
    }

    pub fn from_env() -> AuditResult<Self> {
        Self::from_env_with(|name| env::var(name).ok())
    }

    /// Build configuration from `AUDIT_*` / `KAFKA_*` variables.
    ///
    /// Sources come from `AUDIT_SOURCES` (inline JSON array) or `AUDIT_SOURCES_FILE`.
    pub fn from_env_with<F>(lookup: F) -> AuditResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| var(name).ok_or_else(|| AuditError::Config(format!("{name} must be set")));

        let enabled = match var("AUDIT_ENABLED") {
            Some(raw) => parse_flag(&raw).ok_or_else(|| AuditError::Config(format!("AUDIT_ENABLED: invalid flag '{raw}'")))?,
            None => true,
        };
        let message_timeout_ms = var("AUDIT_MESSAGE_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_MESSAGE_TIMEOUT_MS);
        let kafka = KafkaConfig {
            brokers: var("KAFKA_BOOTSTRAP").unwrap_or_else(|| "localhost:9092".to_string()),
            username: var("KAFKA_USERNAME").unwrap_or_default(),
            password: var("KAFKA_PASSWORD").unwrap_or_default(),
            topic: var("AUDIT_TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            security_protocol: var("KAFKA_SECURITY_PROTOCOL").unwrap_or_else(default_security_protocol),
            message_timeout_ms,
        };

        let sources_json = match (var("AUDIT_SOURCES"), var("AUDIT_SOURCES_FILE")) {
            (Some(inline), _) => Some(inline),
            (None, Some(path)) => Some(
                std::fs::read_to_string(&path)
                    .map_err(|e| AuditError::Config(format!("AUDIT_SOURCES_FILE {path}: {e}")))?,
            ),
            (None, None) => None,
        };
        let sources = match sources_json {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| AuditError::Config(format!("AUDIT_SOURCES: {e}")))?,
            None => Vec::new(),
        };

        Ok(Self {
            enabled,
            app_name: required("AUDIT_APP_NAME")?,
            entity_code: required("AUDIT_ENTITY_CODE")?,
            kafka,
            sources,
            schema_path: var("AUDIT_SCHEMA_PATH").map(PathBuf::from),
        })
    }

    pub fn schema_source(&self) -> SchemaSource {
        match &self.schema_path {
            Some(path) => SchemaSource::Path(path.clone()),
            None => SchemaSource::Bundled,
        }
    }

    pub fn sink_config(&self) -> KafkaSinkConfig {
        let message_timeout = Duration::from_millis(self.kafka.message_timeout_ms.max(1));
        KafkaSinkConfig {
            brokers: self.kafka.broker_list(),
            client_id: self.app_name.clone(),
            username: self.kafka.username.clone(),
            password: self.kafka.password.clone(),
            security_protocol: self.kafka.security_protocol.clone(),
            message_timeout,
            flush_timeout: message_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    const RAW: &str = r#"{
        "enabled": "{env.AUDIT_ON}",
        "appName": "{env.APP}",
        "entityCode": "orders",
        "kafka": {
            "brokers": "{env.BROKERS}",
            "username": "svc",
            "password": "{env.KAFKA_PASSWORD}",
            "topic": "audit"
        },
        "sources": [
            {"sourceName": "usersApi", "typeName": "Mutation", "fieldName": "createUser", "eventType": "CREATE", "externalId": "name"},
            {"sourceName": "usersApi", "typeName": "Query", "fieldName": "user", "externalId": "{env.UNSET}"}
        ]
    }"#;

    #[test]
    fn templates_resolve_against_lookup() {
        let lookup = env_of(&[
            ("AUDIT_ON", "true"),
            ("APP", "mesh-gateway"),
            ("BROKERS", "k1:9092, k2:9092,,"),
            ("KAFKA_PASSWORD", "s3cret"),
        ]);
        let config = AuditConfig::from_json_str_with(RAW, lookup).unwrap();
        assert!(config.enabled);
        assert_eq!(config.app_name, "mesh-gateway");
        assert_eq!(config.kafka.password, "s3cret");
        assert_eq!(config.kafka.broker_list(), vec!["k1:9092", "k2:9092"]);
        assert_eq!(config.kafka.security_protocol, "sasl_plaintext");
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].event_type, Some(EventType::Create));
        assert_eq!(config.sources[0].type_name, RootType::Mutation);
        assert_eq!(config.sources[1].external_id, None);
        assert!(matches!(config.schema_source(), SchemaSource::Bundled));
    }

    #[test]
    fn unresolved_enabled_flag_disables() {
        let lookup = env_of(&[("APP", "mesh-gateway"), ("BROKERS", "k1:9092")]);
        let config = AuditConfig::from_json_str_with(RAW, lookup).unwrap();
        assert!(!config.enabled);
    }

    #[test]
    fn sink_config_uses_app_name_as_client_id() {
        let lookup = env_of(&[("APP", "mesh-gateway"), ("BROKERS", "k1:9092,k2:9092"), ("KAFKA_PASSWORD", "pw")]);
        let sink = AuditConfig::from_json_str_with(RAW, lookup).unwrap().sink_config();
        assert_eq!(sink.client_id, "mesh-gateway");
        assert_eq!(sink.brokers.len(), 2);
        assert_eq!(sink.message_timeout, Duration::from_millis(5_000));
        assert!(!format!("{sink:?}").contains("pw\""));
    }

    #[test]
    fn from_env_requires_identity_and_reads_sources() {
        let err = AuditConfig::from_env_with(env_of(&[])).unwrap_err();
        assert!(matches!(err, AuditError::Config(ref m) if m.contains("AUDIT_APP_NAME")), "{err}");

        let config = AuditConfig::from_env_with(env_of(&[
            ("AUDIT_APP_NAME", "mesh-gateway"),
            ("AUDIT_ENTITY_CODE", "orders"),
            ("AUDIT_ENABLED", "false"),
            (
                "AUDIT_SOURCES",
                r#"[{"sourceName":"ordersApi","typeName":"Mutation","fieldName":"cancelOrder","eventType":"REMOVE","externalId":"id"}]"#,
            ),
        ]))
        .unwrap();
        assert!(!config.enabled);
        assert_eq!(config.kafka.brokers, "localhost:9092");
        assert_eq!(config.kafka.topic, "audit.events.v1");
        assert_eq!(config.sources[0].event_type, Some(EventType::Remove));
    }

    #[test]
    fn invalid_enabled_flag_is_a_config_error() {
        let err = AuditConfig::from_env_with(env_of(&[
            ("AUDIT_APP_NAME", "mesh-gateway"),
            ("AUDIT_ENTITY_CODE", "orders"),
            ("AUDIT_ENABLED", "maybe"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AuditError::Config(_)));
    }
}
