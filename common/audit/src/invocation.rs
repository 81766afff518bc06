//! Host-side view of one intercepted field resolution and its outcome.

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Live handle onto the distributed-trace id of an invocation.
///
/// The host may assign the trace id after the invocation has been opened, so the
/// builder reads it again at finalize time when it was absent at open.
pub trait TraceSource: Send + Sync + fmt::Debug {
    fn trace_id(&self) -> Option<String>;
}

impl TraceSource for String {
    fn trace_id(&self) -> Option<String> {
        Some(self.clone()).filter(|s| !s.is_empty())
    }
}

impl TraceSource for OnceLock<String> {
    fn trace_id(&self) -> Option<String> {
        self.get().cloned().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl CurrentUser {
    /// First non-empty of id, email, name.
    pub fn audit_id(&self) -> Option<String> {
        [&self.id, &self.email, &self.name]
            .into_iter()
            .flatten()
            .find(|v| !v.is_empty())
            .cloned()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    pub query: Option<String>,
    pub operation_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub user: Option<CurrentUser>,
    pub trace: Option<Arc<dyn TraceSource>>,
    pub params: Option<RequestParams>,
}

impl InvocationContext {
    pub fn with_user(mut self, user: CurrentUser) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_trace(mut self, trace: Arc<dyn TraceSource>) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn with_params(mut self, params: RequestParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn trace_id(&self) -> Option<String> {
        self.trace.as_ref().and_then(|t| t.trace_id())
    }
}

/// One intercepted field-resolution call. Read-only for the pipeline.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub source_name: String,
    pub type_name: String,
    pub field_name: String,
    pub args: Value,
    /// Arguments resolved from the batch key when the call is a batched key lookup.
    pub key_args: Option<Value>,
    pub context: InvocationContext,
}

impl Invocation {
    pub fn new(
        source_name: impl Into<String>,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        args: Value,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            type_name: type_name.into(),
            field_name: field_name.into(),
            args,
            key_args: None,
            context: InvocationContext::default(),
        }
    }

    pub fn with_key_args(mut self, key_args: Value) -> Self {
        self.key_args = Some(key_args);
        self
    }

    pub fn with_context(mut self, context: InvocationContext) -> Self {
        self.context = context;
        self
    }

    /// Arguments the audit record describes: key-lookup arguments win over raw ones.
    pub fn effective_args(&self) -> &Value {
        self.key_args.as_ref().unwrap_or(&self.args)
    }
}

/// Result of the guarded call, observed once.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value(Value),
    Error(String),
}

impl Outcome {
    pub fn from_result<E: fmt::Display>(result: Result<Value, E>) -> Self {
        match result {
            Ok(value) => Outcome::Value(value),
            Err(err) => Outcome::Error(err.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }
}
