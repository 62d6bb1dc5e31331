//! Session controller
//!
//! Owns the session and drives its coarse lifecycle on the control task:
//!
//! 1. print the endpoint and create the session bound to the dispatcher
//! 2. start it asynchronously; everything after that happens on the
//!    delivery task
//! 3. block on one line of input
//! 4. set the stop flag under the dispatch lock, then stop the session,
//!    which returns once every queued event has been delivered
//!
//! If `start_async` fails outright the session is stopped straight away and
//! [`SessionController::run`] returns [`RunOutcome::StartFailed`] without
//! waiting for input. A read error on the input still stops the session
//! before it is returned.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn};

use crate::config::EmsxConfig;
use crate::console::Console;
use crate::context::SessionContext;
use crate::dispatcher::EmsxEventHandler;
use crate::error::EmsxResult;
use crate::request::GroupRouteRequest;
use crate::transport::{EventHandler, Session, Transport};

/// How [`SessionController::run`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The operator released the input gate and the session was stopped
    Completed,
    /// `start_async` failed; the session was torn down without waiting
    StartFailed,
}

pub struct SessionController {
    config: EmsxConfig,
    transport: Arc<dyn Transport>,
    context: Arc<SessionContext>,
    handler: Arc<EmsxEventHandler>,
    session: Option<Arc<dyn Session>>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("config", &self.config)
            .field("handler", &self.handler)
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

impl SessionController {
    pub fn new(config: EmsxConfig, transport: Arc<dyn Transport>, console: Console) -> EmsxResult<Self> {
        config.validate()?;

        let context = Arc::new(SessionContext::new(console));
        let handler = Arc::new(EmsxEventHandler::new(
            context.clone(),
            config.service_name.clone(),
            GroupRouteRequest::scenario(),
        ));

        Ok(Self {
            config,
            transport,
            context,
            handler,
            session: None,
        })
    }

    pub fn config(&self) -> &EmsxConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    pub fn handler(&self) -> &Arc<EmsxEventHandler> {
        &self.handler
    }

    pub fn session(&self) -> Option<&Arc<dyn Session>> {
        self.session.as_ref()
    }

    /// Create and start the session. Returns `Ok(false)` if the start call
    /// failed, after the session has been stopped again.
    pub async fn create_session(&mut self) -> EmsxResult<bool> {
        let endpoint = self.config.session.endpoint();
        self.context
            .console()
            .line(format_args!("Connecting to {}", endpoint));

        let handler: Arc<dyn EventHandler> = self.handler.clone();
        let session = self.transport.create_session(&self.config.session, handler)?;
        self.session = Some(session.clone());

        if let Err(e) = session.start_async().await {
            warn!(error = %e, endpoint = %endpoint, "session failed to start");
            self.context
                .console()
                .line(format_args!("Failed to start session: {}", e));
            self.shutdown().await?;
            return Ok(false);
        }

        info!(endpoint = %endpoint, "session starting");
        Ok(true)
    }

    /// Run the whole lifecycle, using one line of `input` as the quit signal
    pub async fn run<R>(&mut self, input: R) -> EmsxResult<RunOutcome>
    where
        R: AsyncRead + Unpin,
    {
        if !self.create_session().await? {
            return Ok(RunOutcome::StartFailed);
        }

        self.context.console().line("\nPress ENTER to quit");
        let gate = wait_for_enter(input).await;

        // The session is torn down even if the input could not be read
        self.shutdown().await?;
        gate?;
        self.context.console().line("\nExiting...");
        Ok(RunOutcome::Completed)
    }

    /// Set the stop flag, then stop the session and wait for delivery to
    /// drain. A no-op once the session has been released.
    pub async fn shutdown(&mut self) -> EmsxResult<()> {
        self.context.mark_stopped().await;

        let Some(session) = self.session.take() else {
            return Ok(());
        };
        session.stop().await?;

        for (id, request) in self.handler.outstanding_requests() {
            warn!(
                correlation_id = %id,
                service = %request.service,
                operation = %request.operation,
                "session stopped with request unanswered"
            );
        }
        info!("session released");
        Ok(())
    }
}

/// Block until one line (or end of input) is read
pub async fn wait_for_enter<R>(input: R) -> EmsxResult<()>
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    BufReader::new(input).read_line(&mut line).await?;
    Ok(())
}
