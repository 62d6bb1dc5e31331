//! Transport seam
//!
//! Session negotiation, event delivery and wire encoding belong to the
//! transport. This module only describes what the client needs from it:
//!
//! - [`Transport`] creates a [`Session`] bound to an [`EventHandler`]
//! - [`Session`] exposes the asynchronous lifecycle and request operations
//! - [`EventHandler`] is the single entry point events are delivered to
//!
//! # Delivery guarantee
//!
//! A transport delivers events to its handler from one background task, one
//! batch at a time. `process_event` is never called concurrently with itself
//! for the same session, but it does run concurrently with whatever the
//! control task is doing (typically waiting for the operator and then calling
//! [`Session::stop`]).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SessionOptions;
use crate::error::{EmsxError, EmsxResult};
use crate::message::{fmt_named, CorrelationId, Event, Fields, Name};

/// Receives every event a session produces
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event batch. Returns `false` when the batch could not be
    /// processed; the return value is informational and never stops delivery.
    async fn process_event(&self, event: &Event, session: &dyn Session) -> bool;
}

/// One logical connection to the trading API
#[async_trait]
pub trait Session: Send + Sync {
    /// Begin connecting. Returns once the attempt is under way; the outcome
    /// arrives as a `SessionStatus` event.
    async fn start_async(&self) -> EmsxResult<()>;

    /// Tear the session down. Blocks until every queued event has been
    /// delivered and the delivery task has exited.
    async fn stop(&self) -> EmsxResult<()>;

    /// Request that a service be opened. The outcome arrives as a
    /// `ServiceStatus` event carrying the returned id.
    async fn open_service_async(&self, service_name: &str) -> EmsxResult<CorrelationId>;

    /// Handle on a service that has been opened
    fn get_service(&self, service_name: &str) -> EmsxResult<Service>;

    /// Submit a request. The answer arrives as `Response` /
    /// `PartialResponse` events tagged with the returned id.
    async fn send_request(
        &self,
        request: Request,
        correlation_id: Option<CorrelationId>,
    ) -> EmsxResult<CorrelationId>;
}

/// Creates sessions
pub trait Transport: Send + Sync {
    fn create_session(
        &self,
        options: &SessionOptions,
        handler: Arc<dyn EventHandler>,
    ) -> EmsxResult<Arc<dyn Session>>;
}

/// A named capability namespace opened on a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    name: String,
    operations: Vec<Name>,
}

impl Service {
    pub fn new<I, N>(name: impl Into<String>, operations: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Name>,
    {
        Self {
            name: name.into(),
            operations: operations.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_operation(&self, operation: &str) -> bool {
        self.operations.iter().any(|op| op == operation)
    }

    /// Start an empty request for one of this service's operations
    pub fn create_request(&self, operation: &str) -> EmsxResult<Request> {
        if !self.has_operation(operation) {
            return Err(EmsxError::UnknownOperation {
                service: self.name.clone(),
                operation: operation.to_string(),
            });
        }
        Ok(Request {
            service: self.name.clone(),
            operation: Name::from(operation),
            fields: Fields::new(),
        })
    }
}

/// Outbound structured payload. Ownership moves into the session on submit.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    service: String,
    operation: Name,
    fields: Fields,
}

impl Request {
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn operation(&self) -> &Name {
        &self.operation
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }

    /// JSON rendering of the payload for structured logs
    pub fn to_json(&self) -> EmsxResult<String> {
        serde_json::to_string(&self.fields).map_err(|e| EmsxError::invalid_request(e.to_string()))
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_named(f, &self.operation, &self.fields)
    }
}
