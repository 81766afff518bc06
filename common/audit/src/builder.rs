use crate::config::SourceConfig;
use crate::invocation::{Invocation, Outcome, TraceSource};
use crate::model::{field_codes, AuditRecord, Entity, Event, EventSource, EventType, FieldEntry, Request, User};
use serde_json::{json, Number, Value};
use std::sync::Arc;
use std::time::Instant;

/// Builds audit records for invocations of enrolled fields.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    app_name: String,
    entity_code: String,
    sources: Vec<SourceConfig>,
}

/// Record opened before the guarded call ran.
#[derive(Debug)]
pub struct PendingRecord {
    record: AuditRecord,
    started: Instant,
    trace: Option<Arc<dyn TraceSource>>,
}

impl EventBuilder {
    pub fn new(app_name: impl Into<String>, entity_code: impl Into<String>, sources: Vec<SourceConfig>) -> Self {
        Self {
            app_name: app_name.into(),
            entity_code: entity_code.into(),
            sources,
        }
    }

    pub fn source_for(&self, invocation: &Invocation) -> Option<&SourceConfig> {
        self.sources.iter().find(|source| source.matches(invocation))
    }

    /// Open a record for `invocation`, or `None` when the field is not enrolled.
    pub fn open(&self, invocation: &Invocation) -> Option<PendingRecord> {
        let source = self.source_for(invocation)?;
        let context = &invocation.context;

        let user_id = context.user.as_ref().and_then(|user| user.audit_id());
        let args = invocation.effective_args();
        let external_id = source
            .external_id
            .as_deref()
            .and_then(|path| lookup_path(args, path));
        let params = context.params.clone().unwrap_or_default();
        let operation_name = params
            .operation_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "empty".to_string());

        let fields = vec![
            FieldEntry::new(field_codes::APP_CODE, self.app_name.as_str()),
            FieldEntry::new(field_codes::EXTERNAL_ID, external_id_text(external_id)),
            FieldEntry::new(field_codes::SOURCE_NAME, invocation.source_name.as_str()),
            FieldEntry::new(field_codes::TYPE_NAME, invocation.type_name.as_str()),
            FieldEntry::new(field_codes::FIELD_NAME, invocation.field_name.as_str()),
            FieldEntry::new(field_codes::ARGS, args.to_string()),
            FieldEntry::new(field_codes::QUERY, params.query.unwrap_or_default()),
            FieldEntry::new(field_codes::OPERATION_NAME, operation_name),
        ];

        let record = AuditRecord {
            entity: Entity { code: self.entity_code.clone() },
            event: Event {
                source: EventSource::Human as i32,
                r#type: source.event_type.unwrap_or(EventType::Create) as i32,
                user: Some(User { id: user_id }),
                request: Some(Request { id: context.trace_id() }),
                fields,
            },
        };

        Some(PendingRecord {
            record,
            started: Instant::now(),
            trace: context.trace.clone(),
        })
    }
}

impl PendingRecord {
    pub fn record(&self) -> &AuditRecord {
        &self.record
    }

    /// Append the post-call fields and return the complete record.
    pub fn finalize(self, outcome: &Outcome) -> AuditRecord {
        let PendingRecord { mut record, started, trace } = self;
        let latency_ms = started.elapsed().as_millis();
        let event = &mut record.event;

        event.fields.push(FieldEntry::new(field_codes::LATENCY, latency_ms.to_string()));

        let request = event.request.get_or_insert_with(Request::default);
        if request.id.is_none() {
            request.id = trace.as_ref().and_then(|t| t.trace_id());
        }

        event.fields.push(FieldEntry::new(
            field_codes::IS_SUCCESS,
            if outcome.is_success() { "true" } else { "false" },
        ));

        let result = match outcome {
            Outcome::Value(value) if is_falsy(value) => "[]".to_string(),
            Outcome::Value(value) => value.to_string(),
            Outcome::Error(message) => json!({ "error": message }).to_string(),
        };
        event.fields.push(FieldEntry::new(field_codes::RESULT, result));
        record
    }
}

/// `null`, `false`, zero and the empty string carry no result and are recorded as `[]`.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Textual form of the extracted external id. Sequences and objects become JSON text,
/// strings are used as is, absent values become `"null"`.
pub fn external_id_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => number_text(n),
        Some(other) => other.to_string(),
    }
}

/// Integral floats print without a fractional part, so `1.0` reads `1`.
fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
        _ => n.to_string(),
    }
}

/// Resolve a lodash-style path (`a.b[0].c` or `a.b.0.c`) inside `root`.
///
/// A key equal to the whole path wins over path traversal, so `{"a.b": 1}` resolves
/// `"a.b"` directly.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(direct) = root.as_object().and_then(|o| o.get(path)) {
        return Some(direct);
    }
    path.split(|c: char| c == '.' || c == '[' || c == ']')
        .filter(|segment| !segment.is_empty())
        .try_fold(root, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
            _ => None,
        })
}
