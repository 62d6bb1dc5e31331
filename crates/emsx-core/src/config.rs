//! Session configuration
//!
//! Connection settings are fixed at construction. [`EmsxConfig::default`]
//! yields the values the group route client runs with:
//!
//! ```rust
//! use emsx_core::config::EmsxConfig;
//!
//! let config = EmsxConfig::default();
//! assert_eq!(config.session.server_host, "localhost");
//! assert_eq!(config.session.server_port, 8194);
//! assert_eq!(config.session.max_event_queue_size, 10_000);
//! assert_eq!(config.service_name, "//blp/emapisvc_beta");
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{EmsxError, EmsxResult};

/// Default API host
pub const DEFAULT_SERVER_HOST: &str = "localhost";
/// Default API port
pub const DEFAULT_SERVER_PORT: u16 = 8194;
/// Upper bound on events queued for delivery before the transport pushes back
pub const DEFAULT_MAX_EVENT_QUEUE_SIZE: usize = 10_000;
/// EMSX order management service
pub const DEFAULT_SERVICE_NAME: &str = "//blp/emapisvc_beta";

/// Options handed to the transport when a session is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub server_host: String,
    pub server_port: u16,
    pub max_event_queue_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_SERVER_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            max_event_queue_size: DEFAULT_MAX_EVENT_QUEUE_SIZE,
        }
    }
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server_host(mut self, host: impl Into<String>) -> Self {
        self.server_host = host.into();
        self
    }

    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }

    pub fn with_max_event_queue_size(mut self, size: usize) -> Self {
        self.max_event_queue_size = size;
        self
    }

    /// `host:port` as printed when connecting
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn validate(&self) -> EmsxResult<()> {
        if self.server_host.is_empty() {
            return Err(EmsxError::invalid_configuration("server_host", "must not be empty"));
        }
        if self.server_port == 0 {
            return Err(EmsxError::invalid_configuration("server_port", "must be non-zero"));
        }
        if self.max_event_queue_size == 0 {
            return Err(EmsxError::invalid_configuration(
                "max_event_queue_size",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Complete client configuration: connection settings plus the service
/// the route request targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmsxConfig {
    pub session: SessionOptions,
    pub service_name: String,
}

impl Default for EmsxConfig {
    fn default() -> Self {
        Self {
            session: SessionOptions::default(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl EmsxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn validate(&self) -> EmsxResult<()> {
        self.session.validate()?;
        if !self.service_name.starts_with("//") {
            return Err(EmsxError::invalid_configuration(
                "service_name",
                format!("'{}' is not of the form //<namespace>/<service>", self.service_name),
            ));
        }
        Ok(())
    }
}
