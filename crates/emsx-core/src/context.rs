//! Shared session context
//!
//! State visible to both the control task and the delivery task. It carries
//! two independent locks so that a slow console never holds up dispatch and
//! dispatch never holds up the console:
//!
//! - the dispatch lock ([`SessionContext::serialize_dispatch`]) serializes
//!   event processing against shutdown and guards the stop flag
//! - the console lock lives inside [`Console`] and is held only while one
//!   buffer is flushed

use dashmap::DashSet;
use tokio::sync::{Mutex, MutexGuard};

use crate::console::Console;
use crate::message::CorrelationId;

/// State guarded by the dispatch lock
#[derive(Debug, Default)]
pub struct DispatchState {
    is_stopped: bool,
}

impl DispatchState {
    pub fn is_stopped(&self) -> bool {
        self.is_stopped
    }

    /// Only reachable through a held [`DispatchGuard`]
    pub fn mark_stopped(&mut self) {
        self.is_stopped = true;
    }
}

/// Proof that the holder has exclusive dispatch rights
pub type DispatchGuard<'a> = MutexGuard<'a, DispatchState>;

/// Process-wide state shared by the controller and the dispatcher
#[derive(Debug)]
pub struct SessionContext {
    console: Console,
    dispatch: Mutex<DispatchState>,
    pending_subscriptions: DashSet<CorrelationId>,
}

impl SessionContext {
    pub fn new(console: Console) -> Self {
        Self {
            console,
            dispatch: Mutex::new(DispatchState::default()),
            pending_subscriptions: DashSet::new(),
        }
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Take the dispatch lock. Held for the whole of a session, service or
    /// response batch, and by the controller while it flips the stop flag.
    pub async fn serialize_dispatch(&self) -> DispatchGuard<'_> {
        self.dispatch.lock().await
    }

    /// Non-blocking variant, `None` while a batch is being processed
    pub fn try_serialize_dispatch(&self) -> Option<DispatchGuard<'_>> {
        self.dispatch.try_lock().ok()
    }

    pub async fn is_stopped(&self) -> bool {
        self.serialize_dispatch().await.is_stopped()
    }

    /// Set the stop flag under the dispatch lock
    pub async fn mark_stopped(&self) {
        self.serialize_dispatch().await.mark_stopped();
    }

    /// Subscriptions awaiting confirmation. The group route flow never
    /// subscribes, so this stays empty unless a caller registers one.
    pub fn pending_subscriptions(&self) -> &DashSet<CorrelationId> {
        &self.pending_subscriptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_flag_starts_clear() {
        let context = SessionContext::new(Console::capture().0);
        assert!(!context.is_stopped().await);
        context.mark_stopped().await;
        assert!(context.is_stopped().await);
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_dispatch() {
        let context = Arc::new(SessionContext::new(Console::capture().0));

        let guard = context.serialize_dispatch().await;
        let stopper = {
            let context = context.clone();
            tokio::spawn(async move { context.mark_stopped().await })
        };

        // The stop cannot land while a batch holds the lock
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!stopper.is_finished());
        assert!(!guard.is_stopped());
        drop(guard);

        stopper.await.unwrap();
        assert!(context.is_stopped().await);
    }

    #[tokio::test]
    async fn test_try_serialize_reports_contention() {
        let context = SessionContext::new(Console::capture().0);
        let guard = context.serialize_dispatch().await;
        assert!(context.try_serialize_dispatch().is_none());
        drop(guard);
        assert!(context.try_serialize_dispatch().is_some());
    }

    #[test]
    fn test_pending_subscriptions_shape() {
        let context = SessionContext::new(Console::capture().0);
        assert!(context.pending_subscriptions().is_empty());
        let id = CorrelationId::new();
        context.pending_subscriptions().insert(id);
        assert!(context.pending_subscriptions().contains(&id));
    }
}
