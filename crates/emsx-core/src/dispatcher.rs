//! Event dispatcher
//!
//! [`EmsxEventHandler`] is the [`EventHandler`] registered with the session.
//! It keeps no state machine of its own: each batch is routed by its
//! category, and inside a batch each message is routed by its type name.
//!
//! ```text
//! SessionStatus  --SessionStarted-------> open_service_async(service)
//!                --SessionStartupFailure-> abort batch, false
//! ServiceStatus  --ServiceOpened---------> build GroupRouteEx, send_request
//!                --ServiceOpenFailure----> abort batch, false
//! Response       --ErrorInfo-------------> print code / text
//!                --GroupRouteEx----------> print successes, failures, status
//! anything else  -----------------------> print type and content
//! ```
//!
//! Session, service and response batches are processed while holding the
//! dispatch lock, which is also what the controller takes to set the stop
//! flag. The fallback path for other categories does not take the lock.
//! That asymmetry is kept on purpose and covered by a test, since it means an
//! admin event can be printed while the controller is mid-shutdown.
//!
//! Any error raised while a batch is processed is printed to the console and
//! turned into a `false` return; nothing escapes to the delivery task.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use crate::context::{DispatchGuard, SessionContext};
use crate::error::EmsxResult;
use crate::message::{names, CorrelationId, Event, EventType, Name};
use crate::request::GroupRouteRequest;
use crate::response::{ErrorInfo, GroupRouteResult};
use crate::transport::{EventHandler, Session};

/// What is known about a submitted request while its answer is outstanding
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub service: String,
    pub operation: Name,
    pub submitted_at: DateTime<Utc>,
}

/// Routes transport events to the session, service and response handlers
pub struct EmsxEventHandler {
    context: Arc<SessionContext>,
    service_name: String,
    route: GroupRouteRequest,
    requests: DashMap<CorrelationId, RequestContext>,
}

impl std::fmt::Debug for EmsxEventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmsxEventHandler")
            .field("service_name", &self.service_name)
            .field("outstanding_requests", &self.requests.len())
            .finish()
    }
}

impl EmsxEventHandler {
    pub fn new(context: Arc<SessionContext>, service_name: impl Into<String>, route: GroupRouteRequest) -> Self {
        Self {
            context,
            service_name: service_name.into(),
            route,
            requests: DashMap::new(),
        }
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Requests submitted and not yet answered with a final response
    pub fn outstanding_requests(&self) -> Vec<(CorrelationId, RequestContext)> {
        self.requests
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    fn print(&self, text: std::fmt::Arguments<'_>) {
        self.context.console().line(text);
    }

    async fn process_session_event(
        &self,
        guard: &DispatchGuard<'_>,
        event: &Event,
        session: &dyn Session,
    ) -> EmsxResult<bool> {
        self.print(format_args!("Processing SESSION_EVENT"));

        for msg in event.messages() {
            let kind = msg.message_type();
            if kind == names::SESSION_STARTED {
                self.print(format_args!("Session started..."));
                if guard.is_stopped() {
                    debug!("session started after stop was requested");
                }
                let id = session.open_service_async(&self.service_name).await?;
                info!(service = %self.service_name, correlation_id = %id, "opening service");
            } else if kind == names::SESSION_STARTUP_FAILURE {
                self.print(format_args!("Session startup failed"));
                warn!(message = %msg, "session startup failed");
                return Ok(false);
            } else {
                debug!(message_type = %kind, "session status");
            }
        }
        Ok(true)
    }

    async fn process_service_event(
        &self,
        _guard: &DispatchGuard<'_>,
        event: &Event,
        session: &dyn Session,
    ) -> EmsxResult<bool> {
        self.print(format_args!("Processing SERVICE_EVENT"));

        for msg in event.messages() {
            let kind = msg.message_type();
            if kind == names::SERVICE_OPENED {
                self.print(format_args!("Service opened..."));

                let service = session.get_service(&self.service_name)?;
                let request = self.route.to_request(&service)?;
                self.print(format_args!("Request: {}", request));
                if let Ok(json) = request.to_json() {
                    debug!(payload = %json, "group route payload");
                }

                let request_context = RequestContext {
                    service: request.service().to_string(),
                    operation: request.operation().clone(),
                    submitted_at: Utc::now(),
                };
                let id = session.send_request(request, Some(CorrelationId::new())).await?;
                info!(correlation_id = %id, operation = %request_context.operation, "request submitted");
                self.requests.insert(id, request_context);
            } else if kind == names::SERVICE_OPEN_FAILURE {
                self.print(format_args!("Error: Service failed to open"));
                warn!(service = %self.service_name, message = %msg, "service open failed");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn process_response_event(&self, _guard: &DispatchGuard<'_>, event: &Event) -> EmsxResult<bool> {
        self.print(format_args!("Processing RESPONSE_EVENT"));

        for msg in event.messages() {
            for id in msg.correlation_ids() {
                match self.requests.get(id) {
                    Some(request) => debug!(
                        correlation_id = %id,
                        service = %request.service,
                        operation = %request.operation,
                        elapsed_ms = (Utc::now() - request.submitted_at).num_milliseconds(),
                        "response matched"
                    ),
                    None => debug!(correlation_id = %id, "response for unknown request"),
                }
            }

            self.print(format_args!("MESSAGE: {}", msg));

            let kind = msg.message_type();
            if kind == names::ERROR_INFO {
                let info = ErrorInfo::from_message(msg)?;
                self.print(format_args!("ERROR CODE: {}\tERROR MESSAGE: {}", info.code, info.message));
            } else if kind == names::GROUP_ROUTE_EX {
                let result = GroupRouteResult::from_message(msg)?;

                // One buffer so the block reaches the console in one piece
                let console = self.context.console();
                let mut out = console.out();
                for success in &result.successes {
                    let _ = writeln!(out, "Success: {}, {}", success.sequence, success.route_id);
                }
                for failure in &result.failures {
                    let _ = writeln!(
                        out,
                        "Failed: {}, {}: {}",
                        failure.sequence, failure.error_code, failure.error_message
                    );
                }
                let _ = writeln!(out, "MESSAGE:{}", result.message);
            }
        }

        // A final response closes every request it answers
        for msg in event.messages() {
            for id in msg.correlation_ids() {
                self.requests.remove(id);
            }
        }
        Ok(true)
    }

    fn process_misc_events(&self, event: &Event) -> EmsxResult<bool> {
        self.print(format_args!("Processing UNHANDLED event"));

        for msg in event.messages() {
            self.print(format_args!("{}\n{}", msg.message_type(), msg));
        }
        Ok(true)
    }
}

#[async_trait]
impl EventHandler for EmsxEventHandler {
    async fn process_event(&self, event: &Event, session: &dyn Session) -> bool {
        debug!(
            event_type = %event.event_type(),
            messages = event.messages().len(),
            received_at = %event.received_at(),
            "dispatching event"
        );

        let outcome = match event.event_type() {
            EventType::SessionStatus => {
                let guard = self.context.serialize_dispatch().await;
                self.process_session_event(&guard, event, session).await
            }
            EventType::ServiceStatus => {
                let guard = self.context.serialize_dispatch().await;
                self.process_service_event(&guard, event, session).await
            }
            EventType::Response => {
                let guard = self.context.serialize_dispatch().await;
                self.process_response_event(&guard, event).await
            }
            _ => self.process_misc_events(event),
        };

        match outcome {
            Ok(handled) => handled,
            Err(e) => {
                error!(category = e.category(), "error while processing event: {}", e);
                self.print(format_args!("Library Exception !!!{}", e));
                false
            }
        }
    }
}
