// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::lexer::Span;
use crate::value::{FieldMap, Value};

use core::fmt;
use std::rc::Rc;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Schema misconfiguration. These are programmer errors, not user errors:
/// duplicate type names, type-loader contract violations, invalid interface
/// implementations. They abort schema construction or, when discovered
/// mid-execution, surface as the cause of a field error.
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct InvariantViolation(pub String);

/// An error raised by application code that is safe to show to clients.
/// Resolver errors that are not `UserError` (and not already a
/// `GraphqlError`) get a generic public message instead.
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct UserError(pub String);

impl UserError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// One step of a response path: a field response key or a list index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(Rc<str>),
    Index(usize),
}

impl Serialize for PathSegment {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            PathSegment::Field(name) => serializer.serialize_str(name),
            PathSegment::Index(i) => serializer.serialize_u64(*i as u64),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => f.write_str(name),
            PathSegment::Index(i) => write!(f, "{i}"),
        }
    }
}

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// An error found during the parse or execute phase of a GraphQL request.
/// Carries the spans of the AST nodes responsible and, for execution
/// errors, the response path. When the error wraps an underlying failure
/// the original is retained as `previous` for server-side logging.
#[derive(Debug, Clone)]
pub struct GraphqlError {
    message: String,
    nodes: Vec<Span>,
    path: Vec<PathSegment>,
    previous: Option<Rc<anyhow::Error>>,
    client_safe: bool,
}

impl fmt::Display for GraphqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GraphqlError {}

impl GraphqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            nodes: vec![],
            path: vec![],
            previous: None,
            client_safe: true,
        }
    }

    pub fn with_nodes(mut self, nodes: Vec<Span>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    pub fn with_previous(mut self, previous: anyhow::Error) -> Self {
        self.previous = Some(Rc::new(previous));
        self
    }

    /// Wraps an arbitrary error raised while resolving a field, attaching
    /// the contributing AST nodes and the response path. User errors stay
    /// client-safe; anything else gets a generic public message with the
    /// original kept as `previous`.
    pub fn located(error: anyhow::Error, nodes: Vec<Span>, path: Vec<PathSegment>) -> Self {
        let client_safe = error.is::<UserError>();
        let message = if client_safe {
            error.to_string()
        } else {
            INTERNAL_ERROR_MESSAGE.to_owned()
        };
        Self {
            message: if message.is_empty() {
                "An unknown error occurred.".to_owned()
            } else {
                message
            },
            nodes,
            path,
            previous: Some(Rc::new(error)),
            client_safe,
        }
    }

    /// Fills in nodes and path when the error does not carry them yet.
    pub fn locate(mut self, nodes: Vec<Span>, path: Vec<PathSegment>) -> Self {
        if self.nodes.is_empty() {
            self.nodes = nodes;
        }
        if self.path.is_empty() {
            self.path = path;
        }
        self
    }

    /// The client-safe message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The untranslated message of the wrapped error, when any.
    pub fn debug_message(&self) -> Option<String> {
        self.previous.as_ref().map(|e| e.to_string())
    }

    pub fn is_client_safe(&self) -> bool {
        self.client_safe
    }

    pub fn previous(&self) -> Option<&anyhow::Error> {
        self.previous.as_deref()
    }

    pub fn locations(&self) -> Vec<crate::lexer::SourceLocation> {
        self.nodes.iter().map(|span| span.location()).collect()
    }

    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// Serializable view: `locations` and `path` are omitted when absent,
    /// `debugMessage` only with `debug`.
    pub fn to_value(&self, debug: bool) -> Value {
        let mut map = FieldMap::new();
        map.insert("message".into(), Value::from(self.message.as_str()));

        let locations = self.locations();
        if !locations.is_empty() {
            let locs: Vec<Value> = locations
                .iter()
                .map(|loc| {
                    let mut m = FieldMap::new();
                    m.insert("line".into(), Value::from(loc.line as i64));
                    m.insert("column".into(), Value::from(loc.column as i64));
                    Value::from(m)
                })
                .collect();
            map.insert("locations".into(), Value::from(locs));
        }

        if !self.path.is_empty() {
            let path: Vec<Value> = self
                .path
                .iter()
                .map(|seg| match seg {
                    PathSegment::Field(name) => Value::String(name.clone()),
                    PathSegment::Index(i) => Value::from(*i),
                })
                .collect();
            map.insert("path".into(), Value::from(path));
        }

        if debug {
            if let Some(debug_message) = self.debug_message() {
                if debug_message != self.message {
                    map.insert("debugMessage".into(), Value::from(debug_message));
                }
            }
        }

        Value::from(map)
    }
}

/// The result of executing an operation: a data tree, a list of errors, or
/// both. Partial results are a first-class outcome, not a failure mode.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// `None` means the request failed before execution began and the
    /// serialized result carries no `data` key at all. A `data: null`
    /// caused by NonNull bubbling is `Some(Value::Null)`.
    pub data: Option<Value>,
    pub errors: Vec<GraphqlError>,
}

impl ExecutionResult {
    pub fn new(data: Option<Value>, errors: Vec<GraphqlError>) -> Self {
        Self { data, errors }
    }

    pub fn from_errors(errors: Vec<GraphqlError>) -> Self {
        Self { data: None, errors }
    }

    /// Serializable envelope. The `errors` key is dropped entirely when no
    /// error occurred.
    pub fn to_value(&self, debug: bool) -> Value {
        let mut map = FieldMap::new();
        if !self.errors.is_empty() {
            let errors: Vec<Value> = self.errors.iter().map(|e| e.to_value(debug)).collect();
            map.insert("errors".into(), Value::from(errors));
        }
        if let Some(data) = &self.data {
            map.insert("data".into(), data.clone());
        }
        Value::from(map)
    }

    pub fn to_json_str(&self) -> anyhow::Result<String> {
        self.to_value(false).to_json_str()
    }
}

impl Serialize for ExecutionResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = self.to_value(false);
        let map_value = value.as_object().map_err(serde::ser::Error::custom)?;
        let mut map = serializer.serialize_map(Some(map_value.len()))?;
        for (k, v) in map_value.iter() {
            map.serialize_entry(k.as_ref(), v)?;
        }
        map.end()
    }
}
