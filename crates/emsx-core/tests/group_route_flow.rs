//! Group route flow tests
//!
//! Drive the controller against the simulated transport end to end:
//! - session start, service open, one request, mixed route outcome
//! - startup and service failures still reaching the input gate
//! - request-level errors
//! - shutdown with a request still outstanding

mod common;

use common::Harness;
use emsx_core::message::names;
use emsx_core::sim::RequestResponder;
use emsx_core::{
    EmsxConfig, ErrorInfo, GroupRouteResponder, Message, Request, RunOutcome, SimulatedTransport,
};

struct ErrorResponder;

impl RequestResponder for ErrorResponder {
    fn respond(&self, _request: &Request) -> Vec<Message> {
        let info = ErrorInfo { code: 99, message: "Invalid order".to_string() };
        vec![Message::new(names::ERROR_INFO, info.to_fields())]
    }
}

/// Accepts requests and never answers them
struct SilentResponder;

impl RequestResponder for SilentResponder {
    fn respond(&self, _request: &Request) -> Vec<Message> {
        Vec::new()
    }
}

fn mixed_outcome() -> SimulatedTransport {
    SimulatedTransport::new().with_responder(
        GroupRouteResponder::new()
            .first_route_id(101)
            .reject(3734837, 12, "broker rejected"),
    )
}

#[tokio::test]
async fn test_group_route_mixed_outcome() {
    let harness = Harness::start(EmsxConfig::default(), mixed_outcome());
    harness.wait_for_lines("MESSAGE:Route request processed", 1).await;

    let session = harness.session().await;
    let (controller, outcome, capture) = harness.release().await;
    assert_eq!(outcome, RunOutcome::Completed);

    // One open, one request
    assert_eq!(session.open_service_calls(), vec!["//blp/emapisvc_beta"]);
    let sent = session.sent_requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.operation(), "GroupRouteEx");

    // The response carried the same id and closed the request
    assert!(controller.handler().outstanding_requests().is_empty());

    let lines = capture.lines();
    let first = lines.iter().position(|l| l.starts_with("Success:")).unwrap();
    assert_eq!(
        lines[first..first + 4],
        [
            "Success: 3734835, 101",
            "Success: 3734836, 102",
            "Failed: 3734837, 12: broker rejected",
            "MESSAGE:Route request processed",
        ]
    );
    assert_eq!(capture.count_prefixed("Success:"), 2);
    assert_eq!(capture.count_prefixed("Failed:"), 1);
}

#[tokio::test]
async fn test_console_transcript_order() {
    let harness = Harness::start(EmsxConfig::default(), mixed_outcome());
    harness.wait_for_lines("MESSAGE:Route request processed", 1).await;
    let (_controller, _outcome, capture) = harness.release().await;

    let lines = capture.lines();
    let index = |text: &str| {
        lines
            .iter()
            .position(|l| l == text)
            .unwrap_or_else(|| panic!("missing '{}' in:\n{}", text, capture.contents()))
    };

    assert_eq!(lines[0], "Connecting to localhost:8194");
    assert!(index("Session started...") < index("Service opened..."));
    assert!(index("Service opened...") < index("Processing RESPONSE_EVENT"));
    assert!(index("Press ENTER to quit") < index("Exiting..."));
    assert_eq!(lines.last().unwrap(), "Exiting...");

    // Submitted payload is echoed before it is sent
    assert!(index("Request: GroupRouteEx = {") > index("Service opened..."));
    assert_eq!(capture.count_prefixed("    EMSX_BROKER = \"BMTB\""), 1);

    // Started on the way up, terminated on the way down
    assert_eq!(capture.count_prefixed("Processing SESSION_EVENT"), 2);
}

#[tokio::test]
async fn test_startup_failure_still_reaches_input_gate() {
    let harness = Harness::start(EmsxConfig::default(), SimulatedTransport::new().fail_startup());
    harness.wait_for_lines("Session startup failed", 1).await;
    harness.wait_for_lines("Press ENTER to quit", 1).await;

    let session = harness.session().await;
    assert!(harness.is_running());
    assert!(session.open_service_calls().is_empty());

    let (_controller, outcome, capture) = harness.release().await;
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(capture.count_prefixed("Session started..."), 0);
    assert_eq!(capture.lines().last().unwrap(), "Exiting...");
}

#[tokio::test]
async fn test_service_open_failure_sends_nothing() {
    let config = EmsxConfig::default().with_service_name("//blp/emapisvc_missing");
    let harness = Harness::start(config, SimulatedTransport::new());
    harness.wait_for_lines("Error: Service failed to open", 1).await;

    let session = harness.session().await;
    assert!(harness.is_running());
    let (_controller, outcome, capture) = harness.release().await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(session.open_service_calls(), vec!["//blp/emapisvc_missing"]);
    assert!(session.sent_requests().is_empty());
    assert_eq!(capture.count_prefixed("Request:"), 0);
}

#[tokio::test]
async fn test_request_error_is_reported() {
    let harness = Harness::start(
        EmsxConfig::default(),
        SimulatedTransport::new().with_responder(ErrorResponder),
    );
    harness.wait_for_lines("ERROR CODE:", 1).await;
    let (_controller, outcome, capture) = harness.release().await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(capture.count_prefixed("ERROR CODE: 99\tERROR MESSAGE: Invalid order"), 1);
    assert_eq!(capture.count_prefixed("MESSAGE: ErrorInfo = {"), 1);
    assert_eq!(capture.count_prefixed("Success:"), 0);
}

#[tokio::test]
async fn test_shutdown_with_unanswered_request() {
    let harness = Harness::start(
        EmsxConfig::default(),
        SimulatedTransport::new().with_responder(SilentResponder),
    );
    harness.wait_for_lines("Request: GroupRouteEx", 1).await;

    let session = harness.session().await;
    let (controller, outcome, capture) = harness.release().await;

    assert_eq!(outcome, RunOutcome::Completed);
    let outstanding = controller.handler().outstanding_requests();
    assert_eq!(outstanding.len(), 1);
    assert_eq!(outstanding[0].0, session.sent_requests()[0].0);
    assert_eq!(capture.count_prefixed("Processing RESPONSE_EVENT"), 0);
    assert!(session.is_stopped());
}
