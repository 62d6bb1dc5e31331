//! # EMSX-Core
//!
//! Session lifecycle and event dispatch for an EMSX `GroupRouteEx` client.
//!
//! This crate provides:
//! - An event and message model with the vendor's nested rendering
//! - The transport seam (`Transport`, `Session`, `EventHandler`)
//! - The event dispatcher that opens the service, submits one group route
//!   and reports the per-order outcome
//! - A session controller that gates shutdown on operator input
//! - An in-process simulated transport
//!
//! ## Architecture
//!
//! The transport delivers event batches on its own task. The dispatcher
//! serializes session, service and response batches against shutdown with
//! the dispatch lock in [`SessionContext`]; console output goes through a
//! separate console lock so that lines from the two tasks never tear.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use emsx_core::{Console, EmsxConfig, SessionController, SimulatedTransport};
//!
//! # async fn demo() -> emsx_core::EmsxResult<()> {
//! let transport = Arc::new(SimulatedTransport::new());
//! let mut controller = SessionController::new(EmsxConfig::default(), transport, Console::stdout())?;
//! controller.run(tokio::io::stdin()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod console;
pub mod context;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod message;
pub mod request;
pub mod response;
pub mod sim;
pub mod transport;

pub use config::{EmsxConfig, SessionOptions};
pub use console::Console;
pub use context::SessionContext;
pub use controller::{wait_for_enter, RunOutcome, SessionController};
pub use dispatcher::EmsxEventHandler;
pub use error::{EmsxError, EmsxResult};
pub use message::{CorrelationId, Element, Event, EventType, Fields, Message, Name};
pub use request::GroupRouteRequest;
pub use response::{ErrorInfo, GroupRouteResult};
pub use sim::{GroupRouteResponder, SimulatedTransport};
pub use transport::{EventHandler, Request, Service, Session, Transport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
