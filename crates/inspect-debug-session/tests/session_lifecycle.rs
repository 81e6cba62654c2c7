//! Debug session behaviour against the mock inspector.

use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;

use inspect_debug_core::{Error, LogLevel, PauseReason, ScopeKind, SessionOperation, SessionState};
use inspect_debug_protocol::mock::{
    MockCondition, MockInspector, MockInspectorConfig, MockLauncher, MockScript, MockStep,
};
use inspect_debug_protocol::{LaunchSpec, TransportConfig};
use inspect_debug_session::{DebugSession, SessionEvent, SessionOptions, WaitCondition};

const MAIN: &str = "file:///app/main.js";
const LATE: &str = "file:///app/late.js";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Five statements on lines 1-5 of main.js, stopped at entry.
fn program() -> MockInspectorConfig {
    MockInspectorConfig::default()
        .with_script(MockScript::new("1", MAIN, 0..5))
        .with_program((0..5).map(|line| MockStep::new(MAIN, line, "main")))
        .with_break_on_start(true)
}

fn options() -> SessionOptions {
    SessionOptions::default().with_step_timeout(Duration::from_secs(2))
}

fn short_wait(condition: WaitCondition) -> WaitCondition {
    condition.with_timeout(Duration::from_secs(2))
}

async fn attach(mock: &MockInspector, options: SessionOptions) -> DebugSession {
    DebugSession::attach("app", &mock.endpoint(), options)
        .await
        .unwrap()
}

async fn attach_at_entry(config: MockInspectorConfig) -> (MockInspector, DebugSession) {
    let mock = MockInspector::spawn(config).await.unwrap();
    let session = attach(&mock, options()).await;
    let result = session.wait_for(&short_wait(WaitCondition::for_pause())).await;
    assert!(result.condition_met, "no entry pause");
    (mock, session)
}

async fn next_event(
    rx: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

#[tokio::test]
async fn test_stop_on_entry_pauses_at_first_statement() {
    init_tracing();
    let (_mock, session) = attach_at_entry(program()).await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, SessionState::Paused);
    assert_eq!(snapshot.pause_reason, Some(PauseReason::Entry));
    let location = snapshot.location.unwrap();
    assert_eq!(location.file, "/app/main.js");
    assert_eq!(location.line, 1);
    assert_eq!(snapshot.call_stack.len(), 2);
    assert_eq!(snapshot.call_stack[0].function_name, "main");
}

#[tokio::test]
async fn test_entry_pause_is_resumed_without_stop_on_entry() {
    init_tracing();
    let mock = MockInspector::spawn(program()).await.unwrap();
    let session = attach(&mock, options().with_stop_on_entry(false)).await;

    let result = session
        .wait_for(&short_wait(WaitCondition::for_termination()))
        .await;
    assert!(result.condition_met);
    assert!(mock
        .received_methods()
        .contains(&"Debugger.resume".to_string()));
}

#[tokio::test]
async fn test_breakpoint_hit_then_run_to_completion() -> anyhow::Result<()> {
    init_tracing();
    let (_mock, session) = attach_at_entry(program()).await;

    let bp = session.set_breakpoint("/app/main.js", 3, None).await?;
    assert!(bp.verified);

    session.continue_().await?;

    let result = session.wait_for(&short_wait(WaitCondition::for_pause())).await;
    assert!(result.condition_met);
    let location = result
        .snapshot
        .location
        .ok_or_else(|| anyhow::anyhow!("paused without a location"))?;
    assert_eq!(location.line, 3);
    assert_eq!(
        result.snapshot.pause_reason,
        Some(PauseReason::Breakpoint {
            breakpoints: vec![bp.id]
        })
    );
    assert_eq!(session.list_breakpoints()?[0].hit_count, 1);

    session.continue_().await?;
    let result = session
        .wait_for(&short_wait(WaitCondition::for_termination()))
        .await;
    assert!(result.condition_met);
    Ok(())
}

#[tokio::test]
async fn test_step_over_returns_next_location() {
    init_tracing();
    let (_mock, session) = attach_at_entry(program()).await;
    let mut events = session.subscribe();

    let snapshot = session.step_over().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Paused);
    assert_eq!(snapshot.pause_reason, Some(PauseReason::Step));
    assert_eq!(snapshot.location.unwrap().line, 2);

    let event = next_event(&mut events, |e| matches!(e, SessionEvent::StateChanged { .. })).await;
    assert_eq!(
        event,
        SessionEvent::StateChanged {
            from: SessionState::Paused,
            to: SessionState::Running
        }
    );
    next_event(&mut events, |e| matches!(e, SessionEvent::Resumed)).await;
    let event = next_event(&mut events, |e| matches!(e, SessionEvent::Paused { .. })).await;
    assert!(matches!(
        event,
        SessionEvent::Paused {
            reason: PauseReason::Step,
            ..
        }
    ));

    let snapshot = session.step_into().await.unwrap();
    assert_eq!(snapshot.location.unwrap().line, 3);
    let snapshot = session.step_out().await.unwrap();
    assert_eq!(snapshot.location.unwrap().line, 4);
}

#[tokio::test]
async fn test_step_past_last_statement_terminates() {
    init_tracing();
    let (_mock, session) = attach_at_entry(program()).await;
    session.set_breakpoint("/app/main.js", 5, None).await.unwrap();
    session.continue_().await.unwrap();
    assert!(
        session
            .wait_for(&short_wait(WaitCondition::for_pause()))
            .await
            .condition_met
    );

    let snapshot = session.step_over().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Terminated);
}

#[tokio::test]
async fn test_wrong_state_operations_are_rejected() {
    init_tracing();
    let mock = MockInspector::spawn(program().with_break_on_start(false).with_loop_forever(true))
        .await
        .unwrap();
    let session = attach(&mock, options()).await;
    assert_eq!(session.state(), SessionState::Running);

    let err = session.continue_().await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidState {
            operation: SessionOperation::Continue,
            state: SessionState::Running
        }
    ));
    assert!(matches!(
        session.step_over().await,
        Err(Error::InvalidState { .. })
    ));
    assert!(matches!(
        session.evaluate("1", 0).await,
        Err(Error::InvalidState { .. })
    ));
    assert!(matches!(
        session.get_call_stack(),
        Err(Error::InvalidState { .. })
    ));
    assert_eq!(session.state(), SessionState::Running);
    assert!(!mock
        .received_methods()
        .iter()
        .any(|m| m == "Debugger.resume" || m == "Debugger.stepOver"));

    let snapshot = session.pause().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Paused);
    assert_eq!(snapshot.pause_reason, Some(PauseReason::Pause));

    assert!(matches!(
        session.pause().await,
        Err(Error::InvalidState {
            operation: SessionOperation::Pause,
            state: SessionState::Paused
        })
    ));
}

#[tokio::test]
async fn test_evaluate_and_inspect_variables() {
    init_tracing();
    let config = program()
        .with_evaluation("answer", json!({ "type": "number", "value": 42, "description": "42" }))
        .with_properties(
            "scope:local:0",
            json!([
                { "name": "x", "value": { "type": "number", "value": 1, "description": "1" } },
                { "name": "name", "value": { "type": "string", "value": "bob" } },
            ]),
        );
    let (_mock, session) = attach_at_entry(config).await;

    let result = session.evaluate("answer", 0).await.unwrap();
    assert_eq!(result.value, "42");
    assert_eq!(result.value_type, "number");
    assert!(!result.is_error());

    let result = session.evaluate("missing", 0).await.unwrap();
    assert!(result.is_error());

    let scopes = session.get_scopes(0).unwrap();
    assert_eq!(scopes.len(), 2);
    assert_eq!(scopes[0].kind, ScopeKind::Local);

    let variables = session.get_variables(0, 0).await.unwrap();
    assert_eq!(variables.len(), 2);
    assert_eq!(variables[0].name, "x");
    assert_eq!(variables[0].value, "1");
    assert_eq!(variables[1].value, "\"bob\"");

    assert!(matches!(
        session.get_variables(0, 9).await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        session.evaluate("answer", 9).await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    init_tracing();
    let (_mock, session) = attach_at_entry(program()).await;
    let mut events = session.subscribe();

    session.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Terminated);
    next_event(&mut events, |e| matches!(e, SessionEvent::Terminated)).await;

    session.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Terminated);

    assert!(matches!(
        session.set_breakpoint("/app/main.js", 2, None).await,
        Err(Error::InvalidState { .. })
    ));
    assert!(matches!(
        session.list_breakpoints(),
        Err(Error::InvalidState { .. })
    ));
    assert!(session.snapshot().location.is_none());
}

#[tokio::test]
async fn test_connection_loss_terminates_session() {
    init_tracing();
    let (mock, session) = attach_at_entry(program()).await;

    mock.disconnect();
    let result = session
        .wait_for(&short_wait(WaitCondition::for_termination()))
        .await;
    assert!(result.condition_met);
    assert!(result.snapshot.call_stack.is_empty());
}

#[tokio::test]
async fn test_failing_condition_is_reported() {
    init_tracing();
    let config = program().with_condition(
        "boom()",
        MockCondition::Throws("ReferenceError: boom is not defined".to_string()),
    );
    let (_mock, session) = attach_at_entry(config).await;
    let mut events = session.subscribe();

    let bp = session
        .set_breakpoint("/app/main.js", 3, Some("boom()".to_string()))
        .await
        .unwrap();
    session.continue_().await.unwrap();

    let event = next_event(&mut events, |e| matches!(e, SessionEvent::BreakpointError { .. })).await;
    assert_eq!(
        event,
        SessionEvent::BreakpointError {
            breakpoint: bp.id,
            message: "ReferenceError: boom is not defined".to_string()
        }
    );

    let result = session.wait_for(&short_wait(WaitCondition::for_pause())).await;
    assert_eq!(
        result.snapshot.pause_reason,
        Some(PauseReason::ConditionError {
            breakpoint: bp.id,
            message: "ReferenceError: boom is not defined".to_string()
        })
    );
}

#[tokio::test]
async fn test_false_condition_does_not_pause() {
    init_tracing();
    let config = program().with_condition("x > 5", MockCondition::Value(false));
    let (_mock, session) = attach_at_entry(config).await;

    session
        .set_breakpoint("/app/main.js", 3, Some("x > 5".to_string()))
        .await
        .unwrap();
    session.continue_().await.unwrap();

    let result = session.wait_for(&short_wait(WaitCondition::for_stop())).await;
    assert_eq!(result.snapshot.state, SessionState::Terminated);
}

#[tokio::test]
async fn test_disabled_breakpoint_does_not_pause() {
    init_tracing();
    let (mock, session) = attach_at_entry(program()).await;

    let bp = session
        .set_breakpoint("/app/main.js", 3, None)
        .await
        .unwrap();
    let disabled = session.toggle_breakpoint(bp.id, false).await.unwrap();
    assert!(!disabled.enabled);
    assert_eq!(mock.breakpoint_count(), 0);
    assert_eq!(session.list_breakpoints().unwrap().len(), 1);

    session.continue_().await.unwrap();
    let result = session.wait_for(&short_wait(WaitCondition::for_stop())).await;
    assert_eq!(result.snapshot.state, SessionState::Terminated);
}

#[tokio::test]
async fn test_unreachable_breakpoint_never_pauses() {
    init_tracing();
    let (_mock, session) = attach_at_entry(program()).await;

    let bp = session
        .set_breakpoint("/app/main.js", 42, None)
        .await
        .unwrap();
    assert!(!bp.verified);

    let mut events = session.subscribe();
    session.continue_().await.unwrap();

    let mut transitions = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .expect("session did not terminate");
        match event {
            Ok(SessionEvent::BreakpointVerified(verified)) => {
                panic!("breakpoint {} verified on an unreachable line", verified.id)
            }
            Ok(SessionEvent::StateChanged { to, .. }) => {
                transitions.push(to);
                if to == SessionState::Terminated {
                    break;
                }
            }
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    assert_eq!(session.state(), SessionState::Terminated);
    assert!(!transitions.contains(&SessionState::Paused));
}

#[tokio::test]
async fn test_breakpoint_verified_when_script_loads() {
    init_tracing();
    let config = program()
        .with_script(MockScript::new("2", LATE, [0]).load_after(Duration::from_millis(300)))
        .with_program(
            (0..5)
                .map(|line| MockStep::new(MAIN, line, "main"))
                .chain([MockStep::new(LATE, 0, "late")]),
        );
    let (_mock, session) = attach_at_entry(config).await;
    let mut events = session.subscribe();

    let bp = session
        .set_breakpoint("/app/late.js", 1, None)
        .await
        .unwrap();
    assert!(!bp.verified);

    let event = next_event(&mut events, |e| matches!(e, SessionEvent::BreakpointVerified(_))).await;
    let SessionEvent::BreakpointVerified(verified) = event else {
        unreachable!()
    };
    assert_eq!(verified.id, bp.id);
    assert!(session.list_breakpoints().unwrap()[0].verified);

    session.continue_().await.unwrap();
    let result = session.wait_for(&short_wait(WaitCondition::for_pause())).await;
    assert!(result.condition_met);
    assert_eq!(result.snapshot.location.unwrap().file, "/app/late.js");
}

#[tokio::test]
async fn test_console_output_is_captured() {
    init_tracing();
    let config = program()
        .with_console("log", "hello")
        .with_console("error", "bad thing");
    let (_mock, session) = attach_at_entry(config).await;

    let read = session.read_output(true);
    assert_eq!(read.output, "hello\nbad thing");
    assert_eq!(read.lines[0].level, LogLevel::Stdout);
    assert_eq!(read.lines[1].level, LogLevel::Stderr);

    assert!(session.read_output(true).lines.is_empty());
    assert_eq!(session.read_output(false).lines.len(), 2);
}

#[tokio::test]
async fn test_request_timeout_leaves_state_unchanged() {
    init_tracing();
    let config = program()
        .with_break_on_start(false)
        .with_loop_forever(true)
        .with_silent_method("Debugger.pause");
    let mock = MockInspector::spawn(config).await.unwrap();
    let transport = TransportConfig {
        request_timeout: Duration::from_millis(200),
        ..TransportConfig::default()
    };
    let session = attach(&mock, options().with_transport(transport)).await;

    let err = session.pause().await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert_eq!(session.state(), SessionState::Running);
}

#[tokio::test]
async fn test_profiling() {
    init_tracing();
    let (_mock, session) = attach_at_entry(program()).await;

    session.start_cpu_profile().await.unwrap();
    let profile = session.stop_cpu_profile().await.unwrap();
    assert_eq!(profile.node_count, 2);
    assert_eq!(profile.sample_count, 3);
    assert_eq!(profile.duration_us, 1500);

    let snapshot = session.take_heap_snapshot().await.unwrap();
    assert_eq!(snapshot.chunk_count, 2);
    assert!(snapshot.data.starts_with("{\"snapshot\""));
}

#[tokio::test]
async fn test_launch_waits_for_entry_pause() {
    init_tracing();
    let launcher = MockLauncher::new(program());
    let session = DebugSession::launch("app", &launcher, &LaunchSpec::new("main.js"), options())
        .await
        .unwrap();

    assert_eq!(launcher.launch_count(), 1);
    assert_eq!(session.state(), SessionState::Paused);
    assert_eq!(session.pid(), None);
    assert_eq!(session.info().name, "app");
}

#[tokio::test]
async fn test_attach_to_unreachable_endpoint_fails() {
    init_tracing();
    let transport = TransportConfig {
        connect_timeout: Duration::from_millis(500),
        ..TransportConfig::default()
    };
    let err = DebugSession::attach("nope", "ws://127.0.0.1:1/none", options().with_transport(transport))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
}
