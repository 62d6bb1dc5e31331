//! Event and message model
//!
//! The transport delivers [`Event`]s: a category plus a batch of
//! [`Message`]s. A message is a named record whose content is a tree of
//! [`Element`]s. Named fields keep their insertion order; the EMSX schema is
//! positional in places (strategy parameters) so order is never normalised.
//!
//! ```rust
//! use emsx_core::message::{Element, Fields, Message};
//!
//! let mut fields = Fields::new();
//! fields.set("ERROR_CODE", 12);
//! fields.set("ERROR_MESSAGE", "broker rejected");
//! let msg = Message::new("ErrorInfo", fields);
//!
//! assert_eq!(msg.get_element_as_i32("ERROR_CODE").unwrap(), 12);
//! assert_eq!(msg.get_element_as_string("ERROR_MESSAGE").unwrap(), "broker rejected");
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{EmsxError, EmsxResult};

/// Message type names the dispatcher routes on
pub mod names {
    pub const SESSION_CONNECTION_UP: &str = "SessionConnectionUp";
    pub const SESSION_STARTED: &str = "SessionStarted";
    pub const SESSION_STARTUP_FAILURE: &str = "SessionStartupFailure";
    pub const SESSION_TERMINATED: &str = "SessionTerminated";
    pub const SERVICE_OPENED: &str = "ServiceOpened";
    pub const SERVICE_OPEN_FAILURE: &str = "ServiceOpenFailure";
    pub const ERROR_INFO: &str = "ErrorInfo";
    pub const GROUP_ROUTE_EX: &str = "GroupRouteEx";
}

/// Schema name of a message type or element
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Name(String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Name {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Name {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Opaque token linking a request to the events that answer it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Allocate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ uuid={} ]", self.0)
    }
}

/// Event categories delivered by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventType {
    Admin,
    SessionStatus,
    ServiceStatus,
    PartialResponse,
    Response,
    RequestStatus,
    Timeout,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Admin => "ADMIN",
            EventType::SessionStatus => "SESSION_STATUS",
            EventType::ServiceStatus => "SERVICE_STATUS",
            EventType::PartialResponse => "PARTIAL_RESPONSE",
            EventType::Response => "RESPONSE",
            EventType::RequestStatus => "REQUEST_STATUS",
            EventType::Timeout => "TIMEOUT",
        };
        f.write_str(name)
    }
}

/// A value in a message or request tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Element {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Sequence(Fields),
    Array(Vec<Element>),
}

impl Element {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Element::Int32(v) => Some(*v),
            Element::Int64(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Element::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Fields> {
        match self {
            Element::Sequence(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Element]> {
        match self {
            Element::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Number of values: array length, 1 for anything else
    pub fn num_values(&self) -> usize {
        match self {
            Element::Array(values) => values.len(),
            _ => 1,
        }
    }

    /// Value `index` of an array, as a sequence
    pub fn get_value_as_sequence(&self, name: &str, index: usize) -> EmsxResult<&Fields> {
        let values = self
            .as_array()
            .ok_or_else(|| EmsxError::invalid_conversion(name, "array"))?;
        let value = values.get(index).ok_or_else(|| EmsxError::IndexOutOfRange {
            element: name.to_string(),
            index,
            len: values.len(),
        })?;
        value
            .as_sequence()
            .ok_or_else(|| EmsxError::invalid_conversion(name, "sequence"))
    }

    fn fmt_value(&self, f: &mut fmt::Formatter<'_>, name: &Name, depth: usize) -> fmt::Result {
        match self {
            Element::Bool(v) => write!(f, "{}", v),
            Element::Int32(v) => write!(f, "{}", v),
            Element::Int64(v) => write!(f, "{}", v),
            Element::Float64(v) => write!(f, "{}", v),
            Element::String(v) => write!(f, "\"{}\"", v),
            Element::Sequence(fields) => {
                writeln!(f, "{{")?;
                fields.fmt_fields(f, depth + 1)?;
                write!(f, "{}}}", indent(depth))
            }
            Element::Array(values) => {
                writeln!(f, "{{")?;
                for value in values {
                    write!(f, "{}", indent(depth + 1))?;
                    if matches!(value, Element::Sequence(_)) {
                        write!(f, "{} = ", name)?;
                    }
                    value.fmt_value(f, name, depth + 1)?;
                    writeln!(f)?;
                }
                write!(f, "{}}}", indent(depth))
            }
        }
    }
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

impl From<bool> for Element {
    fn from(v: bool) -> Self {
        Element::Bool(v)
    }
}

impl From<i32> for Element {
    fn from(v: i32) -> Self {
        Element::Int32(v)
    }
}

impl From<i64> for Element {
    fn from(v: i64) -> Self {
        Element::Int64(v)
    }
}

impl From<f64> for Element {
    fn from(v: f64) -> Self {
        Element::Float64(v)
    }
}

impl From<&str> for Element {
    fn from(v: &str) -> Self {
        Element::String(v.to_string())
    }
}

impl From<String> for Element {
    fn from(v: String) -> Self {
        Element::String(v)
    }
}

impl From<Fields> for Element {
    fn from(fields: Fields) -> Self {
        Element::Sequence(fields)
    }
}

/// Ordered named fields of a sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Fields(Vec<(Name, Element)>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Name, &Element)> {
        self.0.iter().map(|(name, element)| (name, element))
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Element> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.0.iter_mut().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    pub fn element(&self, name: &str) -> EmsxResult<&Element> {
        self.get(name).ok_or_else(|| EmsxError::not_found(name))
    }

    /// Set a field, replacing its value in place or appending it
    pub fn set(&mut self, name: impl Into<Name>, value: impl Into<Element>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.get_mut(name.as_str()) {
            Some(existing) => *existing = value,
            None => self.0.push((name, value)),
        }
        self
    }

    /// Append to an array field, creating the array on first use
    pub fn append(&mut self, name: impl Into<Name>, value: impl Into<Element>) -> EmsxResult<&mut Self> {
        let name = name.into();
        self.array_mut(&name)?.push(value.into());
        Ok(self)
    }

    /// Append an empty sequence to an array field and return it for filling in
    pub fn append_sequence(&mut self, name: impl Into<Name>) -> EmsxResult<&mut Fields> {
        let name = name.into();
        let values = self.array_mut(&name)?;
        values.push(Element::Sequence(Fields::new()));
        match values.last_mut() {
            Some(Element::Sequence(fields)) => Ok(fields),
            _ => Err(EmsxError::invalid_conversion(name.as_str(), "sequence")),
        }
    }

    /// Nested sequence field, created empty on first use
    pub fn sequence_mut(&mut self, name: impl Into<Name>) -> EmsxResult<&mut Fields> {
        let name = name.into();
        if !self.has(name.as_str()) {
            self.0.push((name.clone(), Element::Sequence(Fields::new())));
        }
        match self.get_mut(name.as_str()) {
            Some(Element::Sequence(fields)) => Ok(fields),
            _ => Err(EmsxError::invalid_conversion(name.as_str(), "sequence")),
        }
    }

    fn array_mut(&mut self, name: &Name) -> EmsxResult<&mut Vec<Element>> {
        if !self.has(name.as_str()) {
            self.0.push((name.clone(), Element::Array(Vec::new())));
        }
        match self.get_mut(name.as_str()) {
            Some(Element::Array(values)) => Ok(values),
            _ => Err(EmsxError::invalid_conversion(name.as_str(), "array")),
        }
    }

    pub fn get_as_i32(&self, name: &str) -> EmsxResult<i32> {
        self.element(name)?
            .as_i32()
            .ok_or_else(|| EmsxError::invalid_conversion(name, "int32"))
    }

    pub fn get_as_string(&self, name: &str) -> EmsxResult<String> {
        match self.element(name)? {
            Element::String(v) => Ok(v.clone()),
            Element::Int32(v) => Ok(v.to_string()),
            Element::Int64(v) => Ok(v.to_string()),
            Element::Float64(v) => Ok(v.to_string()),
            Element::Bool(v) => Ok(v.to_string()),
            _ => Err(EmsxError::invalid_conversion(name, "string")),
        }
    }

    fn fmt_fields(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for (name, element) in &self.0 {
            write!(f, "{}{}", indent(depth), name)?;
            if matches!(element, Element::Array(_)) {
                write!(f, "[]")?;
            }
            write!(f, " = ")?;
            element.fmt_value(f, name, depth)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Render `name = { fields }` the way the vendor SDK prints messages and requests
pub(crate) fn fmt_named(f: &mut fmt::Formatter<'_>, name: &Name, fields: &Fields) -> fmt::Result {
    writeln!(f, "{} = {{", name)?;
    fields.fmt_fields(f, 1)?;
    write!(f, "}}")
}

/// One unit of business content inside an event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    message_type: Name,
    correlation_ids: Vec<CorrelationId>,
    fields: Fields,
}

impl Message {
    pub fn new(message_type: impl Into<Name>, fields: Fields) -> Self {
        Self {
            message_type: message_type.into(),
            correlation_ids: Vec::new(),
            fields,
        }
    }

    /// Message without content, e.g. `SessionStarted`
    pub fn status(message_type: impl Into<Name>) -> Self {
        Self::new(message_type, Fields::new())
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_ids.push(id);
        self
    }

    pub fn message_type(&self) -> &Name {
        &self.message_type
    }

    pub fn correlation_ids(&self) -> &[CorrelationId] {
        &self.correlation_ids
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn has_element(&self, name: &str) -> bool {
        self.fields.has(name)
    }

    pub fn get_element(&self, name: &str) -> EmsxResult<&Element> {
        self.fields.element(name)
    }

    pub fn get_element_as_i32(&self, name: &str) -> EmsxResult<i32> {
        self.fields.get_as_i32(name)
    }

    pub fn get_element_as_string(&self, name: &str) -> EmsxResult<String> {
        self.fields.get_as_string(name)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_named(f, &self.message_type, &self.fields)
    }
}

/// A categorized batch of messages delivered by the transport
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    event_type: EventType,
    messages: Vec<Message>,
    received_at: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, messages: Vec<Message>) -> Self {
        Self {
            event_type,
            messages,
            received_at: Utc::now(),
        }
    }

    pub fn single(event_type: EventType, message: Message) -> Self {
        Self::new(event_type, vec![message])
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}
