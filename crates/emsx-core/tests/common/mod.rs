//! Shared harness: runs a controller on its own task with a console capture
//! and a pipe standing in for stdin.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use emsx_core::console::Capture;
use emsx_core::sim::SimulatedSession;
use emsx_core::{
    Console, EmsxConfig, EmsxResult, RunOutcome, SessionContext, SessionController, SimulatedTransport,
};

pub const WAIT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub capture: Capture,
    pub transport: SimulatedTransport,
    pub context: Arc<SessionContext>,
    input: DuplexStream,
    run: JoinHandle<(SessionController, EmsxResult<RunOutcome>)>,
}

impl Harness {
    pub fn start(config: EmsxConfig, transport: SimulatedTransport) -> Self {
        let (console, capture) = Console::capture();
        let mut controller =
            SessionController::new(config, Arc::new(transport.clone()), console).unwrap();
        let context = controller.context().clone();

        let (input, reader) = tokio::io::duplex(16);
        let run = tokio::spawn(async move {
            let outcome = controller.run(reader).await;
            (controller, outcome)
        });

        Self { capture, transport, context, input, run }
    }

    pub fn is_running(&self) -> bool {
        !self.run.is_finished()
    }

    pub async fn session(&self) -> SimulatedSession {
        timeout(WAIT, async {
            loop {
                if let Some(session) = self.transport.last_session() {
                    return session;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session never created")
    }

    /// Wait until a line starting with `prefix` has been printed `count` times
    pub async fn wait_for_lines(&self, prefix: &str, count: usize) {
        let reached = timeout(WAIT, async {
            while self.capture.count_prefixed(prefix) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(reached.is_ok(), "never saw {} x '{}' in:\n{}", count, prefix, self.capture.contents());
    }

    /// Press ENTER and wait for the controller to finish
    pub async fn release(mut self) -> (SessionController, RunOutcome, Capture) {
        self.input.write_all(b"\n").await.unwrap();
        let (controller, outcome) = timeout(WAIT, self.run)
            .await
            .expect("controller did not finish")
            .unwrap();
        (controller, outcome.unwrap(), self.capture)
    }
}
