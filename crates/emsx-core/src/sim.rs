//! In-process transport
//!
//! [`SimulatedTransport`] stands in for the vendor connection. Each session
//! owns a bounded event queue (`max_event_queue_size`) and one delivery task
//! that feeds queued events to the registered [`EventHandler`] in order.
//! Requests are answered by a [`RequestResponder`]; [`GroupRouteResponder`]
//! routes every order unless told to reject it.
//!
//! The simulator records what the client asked for so tests can check it:
//! [`SimulatedSession::open_service_calls`], [`SimulatedSession::sent_requests`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::{SessionOptions, DEFAULT_SERVICE_NAME};
use crate::error::{EmsxError, EmsxResult};
use crate::message::{names, CorrelationId, Element, Event, EventType, Fields, Message};
use crate::request::{fields, StrategyParams, GROUP_ROUTE_OPERATION};
use crate::response::{ErrorInfo, GroupRouteResult, RouteFailure, RouteSuccess};
use crate::transport::{EventHandler, Request, Service, Session, Transport};

/// Error code for a request missing a mandatory field
pub const ERROR_MISSING_FIELD: i32 = 15;
/// Error code for strategy parameters that do not line up
pub const ERROR_BAD_STRATEGY: i32 = 16;
/// Error code for an operation the simulator does not answer
pub const ERROR_UNSUPPORTED_OPERATION: i32 = 17;

pub const ROUTE_PROCESSED: &str = "Route request processed";

/// Produces the response messages for a submitted request
pub trait RequestResponder: Send + Sync {
    fn respond(&self, request: &Request) -> Vec<Message>;
}

/// Answers `GroupRouteEx` requests
#[derive(Debug)]
pub struct GroupRouteResponder {
    next_route_id: AtomicI32,
    rejections: HashMap<i32, (i32, String)>,
}

impl Default for GroupRouteResponder {
    fn default() -> Self {
        Self {
            next_route_id: AtomicI32::new(1),
            rejections: HashMap::new(),
        }
    }
}

impl GroupRouteResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first_route_id(self, route_id: i32) -> Self {
        self.next_route_id.store(route_id, Ordering::SeqCst);
        self
    }

    /// Fail the route for order `sequence`
    pub fn reject(mut self, sequence: i32, error_code: i32, error_message: impl Into<String>) -> Self {
        self.rejections.insert(sequence, (error_code, error_message.into()));
        self
    }

    fn error(code: i32, message: impl Into<String>) -> Vec<Message> {
        let info = ErrorInfo { code, message: message.into() };
        vec![Message::new(names::ERROR_INFO, info.to_fields())]
    }
}

impl RequestResponder for GroupRouteResponder {
    fn respond(&self, request: &Request) -> Vec<Message> {
        if request.operation() != GROUP_ROUTE_OPERATION {
            return Self::error(
                ERROR_UNSUPPORTED_OPERATION,
                format!("Unsupported operation {}", request.operation()),
            );
        }

        let root = request.fields();
        for name in [fields::EMSX_SEQUENCE, fields::EMSX_AMOUNT_PERCENT, fields::EMSX_BROKER] {
            if !root.has(name) {
                return Self::error(ERROR_MISSING_FIELD, format!("Missing mandatory field {}", name));
            }
        }
        if let Some(strategy) = root.get(fields::EMSX_STRATEGY_PARAMS) {
            if let Err(e) = StrategyParams::from_element(strategy) {
                return Self::error(ERROR_BAD_STRATEGY, e.to_string());
            }
        }

        let sequences: Vec<i32> = root
            .get(fields::EMSX_SEQUENCE)
            .and_then(Element::as_array)
            .map(|values| values.iter().filter_map(Element::as_i32).collect())
            .unwrap_or_default();

        let mut result = GroupRouteResult {
            message: ROUTE_PROCESSED.to_string(),
            ..Default::default()
        };
        for sequence in sequences {
            match self.rejections.get(&sequence) {
                Some((error_code, error_message)) => result.failures.push(RouteFailure {
                    sequence,
                    error_code: *error_code,
                    error_message: error_message.clone(),
                }),
                None => result.successes.push(RouteSuccess {
                    sequence,
                    route_id: self.next_route_id.fetch_add(1, Ordering::SeqCst),
                }),
            }
        }
        vec![Message::new(names::GROUP_ROUTE_EX, result.to_fields())]
    }
}

#[derive(Debug, Clone)]
struct SimBehaviour {
    refuse_start: bool,
    fail_startup: bool,
    services: Vec<Service>,
}

impl Default for SimBehaviour {
    fn default() -> Self {
        Self {
            refuse_start: false,
            fail_startup: false,
            services: vec![Service::new(
                DEFAULT_SERVICE_NAME,
                [GROUP_ROUTE_OPERATION, "RouteEx", "CreateOrderAndRouteEx"],
            )],
        }
    }
}

/// Transport that runs the whole session lifecycle in-process
#[derive(Clone)]
pub struct SimulatedTransport {
    behaviour: SimBehaviour,
    responder: Arc<dyn RequestResponder>,
    sessions: Arc<Mutex<Vec<SimulatedSession>>>,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self {
            behaviour: SimBehaviour::default(),
            responder: Arc::new(GroupRouteResponder::new()),
            sessions: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl fmt::Debug for SimulatedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedTransport")
            .field("behaviour", &self.behaviour)
            .field("sessions", &self.sessions.lock().len())
            .finish()
    }
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responder(mut self, responder: impl RequestResponder + 'static) -> Self {
        self.responder = Arc::new(responder);
        self
    }

    /// `start_async` itself fails, as when the endpoint is unreachable
    pub fn refuse_start(mut self) -> Self {
        self.behaviour.refuse_start = true;
        self
    }

    /// `start_async` succeeds but the session reports `SessionStartupFailure`
    pub fn fail_startup(mut self) -> Self {
        self.behaviour.fail_startup = true;
        self
    }

    pub fn last_session(&self) -> Option<SimulatedSession> {
        self.sessions.lock().last().cloned()
    }
}

impl Transport for SimulatedTransport {
    fn create_session(
        &self,
        options: &SessionOptions,
        handler: Arc<dyn EventHandler>,
    ) -> EmsxResult<Arc<dyn Session>> {
        options.validate()?;

        let (sender, receiver) = mpsc::channel(options.max_event_queue_size);
        let session = SimulatedSession {
            inner: Arc::new(SessionInner {
                options: options.clone(),
                behaviour: self.behaviour.clone(),
                handler,
                responder: self.responder.clone(),
                delivered: AtomicUsize::new(0),
                state: Mutex::new(SimState {
                    sender: Some(sender),
                    receiver: Some(receiver),
                    ..Default::default()
                }),
            }),
        };
        debug!(endpoint = %options.endpoint(), "simulated session created");

        self.sessions.lock().push(session.clone());
        Ok(Arc::new(session))
    }
}

#[derive(Default)]
struct SimState {
    started: bool,
    stopped: bool,
    sender: Option<mpsc::Sender<Event>>,
    receiver: Option<mpsc::Receiver<Event>>,
    delivery: Option<JoinHandle<()>>,
    opened: Vec<Service>,
    open_calls: Vec<String>,
    sent: Vec<(CorrelationId, Request)>,
}

struct SessionInner {
    options: SessionOptions,
    behaviour: SimBehaviour,
    handler: Arc<dyn EventHandler>,
    responder: Arc<dyn RequestResponder>,
    delivered: AtomicUsize,
    state: Mutex<SimState>,
}

/// Session handle. Clones refer to the same session.
#[derive(Clone)]
pub struct SimulatedSession {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for SimulatedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SimulatedSession")
            .field("endpoint", &self.inner.options.endpoint())
            .field("started", &state.started)
            .field("stopped", &state.stopped)
            .finish()
    }
}

impl SimulatedSession {
    /// Queue an event for delivery as if it came from the endpoint
    pub fn inject(&self, event: Event) -> EmsxResult<()> {
        self.enqueue(event)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.state.lock().stopped
    }

    /// Service names passed to `open_service_async`, in call order
    pub fn open_service_calls(&self) -> Vec<String> {
        self.inner.state.lock().open_calls.clone()
    }

    pub fn sent_requests(&self) -> Vec<(CorrelationId, Request)> {
        self.inner.state.lock().sent.clone()
    }

    /// Number of event batches handed to the handler so far
    pub fn events_delivered(&self) -> usize {
        self.inner.delivered.load(Ordering::SeqCst)
    }

    fn enqueue(&self, event: Event) -> EmsxResult<()> {
        let sender = self
            .inner
            .state
            .lock()
            .sender
            .clone()
            .ok_or_else(|| EmsxError::invalid_state("session is stopped"))?;

        sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => EmsxError::QueueFull {
                limit: self.inner.options.max_event_queue_size,
            },
            TrySendError::Closed(_) => EmsxError::invalid_state("event queue is closed"),
        })
    }

    fn ensure_running(&self) -> EmsxResult<()> {
        let state = self.inner.state.lock();
        if state.stopped {
            return Err(EmsxError::invalid_state("session is stopped"));
        }
        if !state.started {
            return Err(EmsxError::invalid_state("session is not started"));
        }
        Ok(())
    }

    fn spawn_delivery(&self, mut receiver: mpsc::Receiver<Event>) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            debug!("event delivery started");
            while let Some(event) = receiver.recv().await {
                let handled = session.inner.handler.process_event(&event, &session).await;
                session.inner.delivered.fetch_add(1, Ordering::SeqCst);
                trace!(event_type = %event.event_type(), handled, "event delivered");
            }
            debug!("event delivery ended");
        })
    }
}

#[async_trait]
impl Session for SimulatedSession {
    async fn start_async(&self) -> EmsxResult<()> {
        let receiver = {
            let mut state = self.inner.state.lock();
            if state.stopped {
                return Err(EmsxError::invalid_state("session is stopped"));
            }
            if state.started {
                return Err(EmsxError::invalid_state("session already started"));
            }
            if self.inner.behaviour.refuse_start {
                return Err(EmsxError::transport(format!(
                    "connection to {} refused",
                    self.inner.options.endpoint()
                )));
            }
            state.started = true;
            state.receiver.take()
        };
        let Some(receiver) = receiver else {
            return Err(EmsxError::invalid_state("event queue already consumed"));
        };

        let delivery = self.spawn_delivery(receiver);
        self.inner.state.lock().delivery = Some(delivery);

        let event = if self.inner.behaviour.fail_startup {
            let mut fields = Fields::new();
            fields
                .sequence_mut("reason")?
                .set("source", "simulator")
                .set("category", "IO_ERROR")
                .set("description", "Connection failed");
            Event::single(
                EventType::SessionStatus,
                Message::new(names::SESSION_STARTUP_FAILURE, fields),
            )
        } else {
            Event::new(
                EventType::SessionStatus,
                vec![
                    Message::status(names::SESSION_CONNECTION_UP),
                    Message::status(names::SESSION_STARTED),
                ],
            )
        };
        self.enqueue(event)?;

        info!(endpoint = %self.inner.options.endpoint(), "session start requested");
        Ok(())
    }

    async fn stop(&self) -> EmsxResult<()> {
        let (sender, delivery) = {
            let mut state = self.inner.state.lock();
            if state.stopped {
                return Ok(());
            }
            state.stopped = true;
            state.receiver = None;
            (state.sender.take(), state.delivery.take())
        };

        // Dropping the last sender closes the queue once it is drained
        if let Some(sender) = sender {
            if delivery.is_some() {
                let terminated = Event::single(
                    EventType::SessionStatus,
                    Message::status(names::SESSION_TERMINATED),
                );
                if sender.try_send(terminated).is_err() {
                    warn!("no room to queue session termination");
                }
            }
        }

        if let Some(delivery) = delivery {
            delivery
                .await
                .map_err(|e| EmsxError::transport(format!("event delivery task failed: {}", e)))?;
        }

        info!(delivered = self.events_delivered(), "session stopped");
        Ok(())
    }

    async fn open_service_async(&self, service_name: &str) -> EmsxResult<CorrelationId> {
        self.ensure_running()?;

        let id = CorrelationId::new();
        let known = self
            .inner
            .behaviour
            .services
            .iter()
            .find(|s| s.name() == service_name)
            .cloned();

        let event = {
            let mut state = self.inner.state.lock();
            state.open_calls.push(service_name.to_string());

            let mut fields = Fields::new();
            fields.set("serviceName", service_name);
            match known {
                Some(service) => {
                    state.opened.push(service);
                    Message::new(names::SERVICE_OPENED, fields)
                }
                None => {
                    fields.set("reason", format!("Service {} not found", service_name));
                    Message::new(names::SERVICE_OPEN_FAILURE, fields)
                }
            }
        };
        self.enqueue(Event::single(EventType::ServiceStatus, event.with_correlation_id(id)))?;
        Ok(id)
    }

    fn get_service(&self, service_name: &str) -> EmsxResult<Service> {
        self.inner
            .state
            .lock()
            .opened
            .iter()
            .find(|s| s.name() == service_name)
            .cloned()
            .ok_or_else(|| EmsxError::ServiceNotOpened {
                service: service_name.to_string(),
            })
    }

    async fn send_request(
        &self,
        request: Request,
        correlation_id: Option<CorrelationId>,
    ) -> EmsxResult<CorrelationId> {
        self.ensure_running()?;
        self.get_service(request.service())?;

        let id = correlation_id.unwrap_or_default();
        let messages: Vec<Message> = self
            .inner
            .responder
            .respond(&request)
            .into_iter()
            .map(|msg| msg.with_correlation_id(id))
            .collect();

        debug!(correlation_id = %id, operation = %request.operation(), "request received");
        self.inner.state.lock().sent.push((id, request));

        if !messages.is_empty() {
            self.enqueue(Event::new(EventType::Response, messages))?;
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::GroupRouteRequest;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Recorder {
        fn types(&self) -> Vec<String> {
            self.events
                .lock()
                .iter()
                .flat_map(|e| e.messages().iter().map(|m| m.message_type().to_string()))
                .collect()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn process_event(&self, event: &Event, _session: &dyn Session) -> bool {
            self.events.lock().push(event.clone());
            true
        }
    }

    fn service() -> Service {
        Service::new(DEFAULT_SERVICE_NAME, [GROUP_ROUTE_OPERATION])
    }

    fn session_on(transport: &SimulatedTransport, options: &SessionOptions) -> (SimulatedSession, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        transport.create_session(options, recorder.clone()).unwrap();
        (transport.last_session().unwrap(), recorder)
    }

    #[tokio::test]
    async fn test_stop_drains_queued_events() {
        let transport = SimulatedTransport::new();
        let (session, recorder) = session_on(&transport, &SessionOptions::default());

        session.start_async().await.unwrap();
        for _ in 0..3 {
            session
                .inject(Event::single(EventType::Admin, Message::status("SlowConsumerWarning")))
                .unwrap();
        }
        session.stop().await.unwrap();

        assert_eq!(session.events_delivered(), 5);
        assert_eq!(
            recorder.types(),
            vec![
                "SessionConnectionUp",
                "SessionStarted",
                "SlowConsumerWarning",
                "SlowConsumerWarning",
                "SlowConsumerWarning",
                "SessionTerminated",
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let transport = SimulatedTransport::new();
        let (session, recorder) = session_on(&transport, &SessionOptions::default());

        session.start_async().await.unwrap();
        session.stop().await.unwrap();
        session.stop().await.unwrap();
        assert_eq!(recorder.types().iter().filter(|t| *t == "SessionTerminated").count(), 1);
        assert!(session.inject(Event::single(EventType::Admin, Message::status("Late"))).is_err());
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let transport = SimulatedTransport::new();
        let (session, _recorder) = session_on(&transport, &SessionOptions::default());

        session.start_async().await.unwrap();
        assert!(matches!(
            session.start_async().await,
            Err(EmsxError::InvalidState { .. })
        ));
        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_start_delivers_nothing() {
        let transport = SimulatedTransport::new().refuse_start();
        let (session, recorder) = session_on(&transport, &SessionOptions::default());

        let err = session.start_async().await.unwrap_err();
        assert_eq!(err.to_string(), "Transport failed: connection to localhost:8194 refused");
        session.stop().await.unwrap();
        assert!(recorder.types().is_empty());
    }

    #[tokio::test]
    async fn test_startup_failure_event() {
        let transport = SimulatedTransport::new().fail_startup();
        let (session, recorder) = session_on(&transport, &SessionOptions::default());

        session.start_async().await.unwrap();
        session.stop().await.unwrap();
        assert_eq!(recorder.types(), vec!["SessionStartupFailure", "SessionTerminated"]);
    }

    #[tokio::test]
    async fn test_queue_bound_enforced() {
        let transport = SimulatedTransport::new();
        let options = SessionOptions::default().with_max_event_queue_size(1);
        let (session, _recorder) = session_on(&transport, &options);

        session
            .inject(Event::single(EventType::Admin, Message::status("First")))
            .unwrap();
        assert_eq!(
            session.inject(Event::single(EventType::Admin, Message::status("Second"))),
            Err(EmsxError::QueueFull { limit: 1 })
        );
    }

    #[tokio::test]
    async fn test_unknown_service_fails_to_open() {
        let transport = SimulatedTransport::new();
        let (session, recorder) = session_on(&transport, &SessionOptions::default());

        session.start_async().await.unwrap();
        session.open_service_async("//blp/unknown").await.unwrap();
        assert!(session.get_service("//blp/unknown").is_err());
        session.stop().await.unwrap();

        assert!(recorder.types().contains(&"ServiceOpenFailure".to_string()));
        assert_eq!(session.open_service_calls(), vec!["//blp/unknown"]);
    }

    #[tokio::test]
    async fn test_request_requires_open_service() {
        let transport = SimulatedTransport::new();
        let (session, _recorder) = session_on(&transport, &SessionOptions::default());
        session.start_async().await.unwrap();

        let request = GroupRouteRequest::scenario().to_request(&service()).unwrap();
        assert!(matches!(
            session.send_request(request.clone(), None).await,
            Err(EmsxError::ServiceNotOpened { .. })
        ));

        session.open_service_async(DEFAULT_SERVICE_NAME).await.unwrap();
        let id = session.send_request(request, None).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), session.stop())
            .await
            .unwrap()
            .unwrap();

        let sent = session.sent_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, id);
    }

    #[test]
    fn test_responder_routes_and_rejects() {
        let responder = GroupRouteResponder::new()
            .first_route_id(101)
            .reject(3734837, 12, "broker rejected");
        let request = GroupRouteRequest::scenario().to_request(&service()).unwrap();

        let messages = responder.respond(&request);
        assert_eq!(messages.len(), 1);
        let result = GroupRouteResult::from_message(&messages[0]).unwrap();
        assert_eq!(
            result.successes,
            vec![
                RouteSuccess { sequence: 3734835, route_id: 101 },
                RouteSuccess { sequence: 3734836, route_id: 102 },
            ]
        );
        assert_eq!(
            result.failures,
            vec![RouteFailure {
                sequence: 3734837,
                error_code: 12,
                error_message: "broker rejected".to_string(),
            }]
        );
        assert_eq!(result.message, ROUTE_PROCESSED);
    }

    #[test]
    fn test_responder_reports_missing_broker() {
        let mut request = GroupRouteRequest::scenario().to_request(&service()).unwrap();
        let mut trimmed = Fields::new();
        for (name, element) in request.fields().iter() {
            if name != fields::EMSX_BROKER {
                trimmed.set(name.clone(), element.clone());
            }
        }
        *request.fields_mut() = trimmed;

        let messages = GroupRouteResponder::new().respond(&request);
        let info = ErrorInfo::from_message(&messages[0]).unwrap();
        assert_eq!(info.code, ERROR_MISSING_FIELD);
        assert_eq!(info.message, "Missing mandatory field EMSX_BROKER");
    }

    #[test]
    fn test_responder_reports_misaligned_strategy() {
        let mut request = GroupRouteRequest::scenario().to_request(&service()).unwrap();
        let strategy = match request.fields_mut().get_mut(fields::EMSX_STRATEGY_PARAMS) {
            Some(Element::Sequence(strategy)) => strategy,
            _ => panic!("strategy params missing"),
        };
        strategy.set(fields::EMSX_STRATEGY_FIELD_INDICATORS, Element::Array(Vec::new()));

        let messages = GroupRouteResponder::new().respond(&request);
        assert_eq!(messages[0].message_type(), names::ERROR_INFO);
        assert_eq!(
            ErrorInfo::from_message(&messages[0]).unwrap().code,
            ERROR_BAD_STRATEGY
        );
    }
}
