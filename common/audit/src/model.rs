/// Codes of the `event.fields` entries, in the order the builder appends them.
pub mod field_codes {
    pub const APP_CODE: &str = "app_code";
    pub const EXTERNAL_ID: &str = "external_id";
    pub const SOURCE_NAME: &str = "source_name";
    pub const TYPE_NAME: &str = "type_name";
    pub const FIELD_NAME: &str = "field_name";
    pub const ARGS: &str = "args";
    pub const QUERY: &str = "query";
    pub const OPERATION_NAME: &str = "operation_name";
    pub const LATENCY: &str = "latency";
    pub const IS_SUCCESS: &str = "is_success";
    pub const RESULT: &str = "result";

    pub const PRE_CALL: [&str; 8] = [
        APP_CODE,
        EXTERNAL_ID,
        SOURCE_NAME,
        TYPE_NAME,
        FIELD_NAME,
        ARGS,
        QUERY,
        OPERATION_NAME,
    ];
    pub const POST_CALL: [&str; 3] = [LATENCY, IS_SUCCESS, RESULT];
}

/// Types generated from `proto/message.proto`.
pub mod wire {
    #![allow(missing_docs)]
    include!(concat!(env!("OUT_DIR"), "/message.rs"));
}

/// Serialized `FileDescriptorSet` of `proto/message.proto`, produced at build time.
pub const FILE_DESCRIPTOR_SET: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/message_descriptor.bin"));

/// Wire form of `message.Message`.
pub use wire::Message as AuditRecord;
pub use wire::Field as FieldEntry;
pub use wire::{Entity, Event, EventSource, EventType, Request, User};

impl FieldEntry {
    pub fn new(code: impl Into<String>, value: impl Into<String>) -> Self {
        Self { code: code.into(), value: value.into() }
    }
}

impl AuditRecord {
    pub fn fields(&self) -> &[FieldEntry] {
        self.event.fields.as_slice()
    }

    /// Value of the first field entry with the given code.
    pub fn field_value(&self, code: &str) -> Option<&str> {
        self.fields().iter().find(|f| f.code == code).map(|f| f.value.as_str())
    }

    pub fn entity_code(&self) -> Option<&str> {
        Some(self.entity.code.as_str())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.event.user.as_ref()?.id.as_deref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.event.request.as_ref()?.id.as_deref()
    }

    pub fn event_type(&self) -> Option<EventType> {
        EventType::try_from(self.event.r#type).ok()
    }

    pub fn event_source(&self) -> Option<EventSource> {
        EventSource::try_from(self.event.source).ok()
    }
}
