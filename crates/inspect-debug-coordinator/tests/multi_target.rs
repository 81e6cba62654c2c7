//! Multi-target coordination against mock inspectors.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use inspect_debug_core::{LogLevel, SessionState, TargetId};
use inspect_debug_coordinator::{Coordinator, CoordinatorConfig, CoordinatorEvent, LogQuery};
use inspect_debug_protocol::mock::{MockInspector, MockInspectorConfig, MockScript, MockStep};
use inspect_debug_session::{DebugSession, SessionOptions, WaitCondition};

const MAIN: &str = "file:///app/main.js";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn program() -> MockInspectorConfig {
    MockInspectorConfig::default()
        .with_script(MockScript::new("1", MAIN, 0..4))
        .with_program((0..4).map(|line| MockStep::new(MAIN, line, "main")))
        .with_break_on_start(true)
}

fn options() -> SessionOptions {
    SessionOptions::default().with_step_timeout(Duration::from_secs(2))
}

fn wait(condition: WaitCondition) -> WaitCondition {
    condition.with_timeout(Duration::from_secs(2))
}

/// A session attached to a fresh mock and stopped at entry.
async fn paused_target(name: &str, config: MockInspectorConfig) -> (MockInspector, Arc<DebugSession>) {
    let mock = MockInspector::spawn(config).await.unwrap();
    let session = DebugSession::attach(name, &mock.endpoint(), options())
        .await
        .unwrap();
    assert!(session.wait_for(&wait(WaitCondition::for_pause())).await.condition_met);
    (mock, Arc::new(session))
}

/// A session whose connection has been lost.
async fn disconnected_target(name: &str) -> (MockInspector, Arc<DebugSession>) {
    let (mock, session) = paused_target(name, program()).await;
    mock.disconnect();
    assert!(
        session
            .wait_for(&wait(WaitCondition::for_termination()))
            .await
            .condition_met
    );
    (mock, session)
}

fn drain(rx: &mut broadcast::Receiver<CoordinatorEvent>) -> Vec<CoordinatorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn wait_for_logs(
    coordinator: &Coordinator,
    query: &LogQuery,
    pred: impl Fn(&[inspect_debug_core::LogEntry]) -> bool,
) -> Vec<inspect_debug_core::LogEntry> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let logs = coordinator.get_aggregated_logs(query);
        if pred(&logs) {
            return logs;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "log condition not met: {logs:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_global_breakpoint_installs_on_reachable_subset() {
    init_tracing();
    let coordinator = Coordinator::new();
    let (_ma, a) = paused_target("a", program()).await;
    let (_mb, b) = paused_target("b", program()).await;
    let (_mc, c) = disconnected_target("c").await;
    coordinator.add_target("a", "a", a, None).unwrap();
    coordinator.add_target("b", "b", b, None).unwrap();
    coordinator.add_target("c", "c", c, None).unwrap();

    let mut events = coordinator.subscribe();
    let targets: Vec<TargetId> = ["a", "b", "c", "ghost"].into_iter().map(TargetId::from).collect();
    let gbp = coordinator
        .set_global_breakpoint("/app/main.js", 2, &targets, None)
        .await
        .unwrap();

    assert_eq!(gbp.target_ids(), vec![TargetId::from("a"), TargetId::from("b")]);

    let mut failed: Vec<String> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            CoordinatorEvent::BreakpointError {
                breakpoint,
                target_id,
                ..
            } => {
                assert_eq!(breakpoint, gbp.id);
                Some(target_id.to_string())
            }
            _ => None,
        })
        .collect();
    failed.sort();
    assert_eq!(failed, vec!["c", "ghost"]);
    assert_eq!(coordinator.list_global_breakpoints().len(), 1);
}

#[tokio::test]
async fn test_global_breakpoint_pauses_every_target() {
    init_tracing();
    let coordinator = Coordinator::new();
    let (_ma, a) = paused_target("a", program()).await;
    let (_mb, b) = paused_target("b", program()).await;
    coordinator.add_target("a", "a", a.clone(), None).unwrap();
    coordinator.add_target("b", "b", b.clone(), Some(TargetId::from("a"))).unwrap();

    let targets = [TargetId::from("a"), TargetId::from("b")];
    coordinator
        .set_global_breakpoint("/app/main.js", 3, &targets, None)
        .await
        .unwrap();

    let report = coordinator.continue_all().await;
    assert!(report.all_succeeded());
    assert_eq!(report.succeeded.len(), 2);

    for session in [&a, &b] {
        let result = session.wait_for(&wait(WaitCondition::for_pause())).await;
        assert!(result.condition_met);
        assert_eq!(result.snapshot.location.unwrap().line, 3);
    }
}

#[tokio::test]
async fn test_remove_global_breakpoint_skips_missing_targets() {
    init_tracing();
    let coordinator = Coordinator::new();
    let (ma, a) = paused_target("a", program()).await;
    let (_mb, b) = paused_target("b", program()).await;
    coordinator.add_target("a", "a", a, None).unwrap();
    coordinator.add_target("b", "b", b, None).unwrap();

    let targets = [TargetId::from("a"), TargetId::from("b")];
    let gbp = coordinator
        .set_global_breakpoint("/app/main.js", 2, &targets, Some("i > 1".to_string()))
        .await
        .unwrap();
    assert_eq!(ma.breakpoint_count(), 1);

    coordinator.remove_target(&TargetId::from("b")).await.unwrap();
    assert_eq!(
        coordinator.get_global_breakpoint(gbp.id).unwrap().target_ids(),
        vec![TargetId::from("a")]
    );

    coordinator.remove_global_breakpoint(gbp.id).await.unwrap();
    assert_eq!(ma.breakpoint_count(), 0);
    assert!(coordinator.get_global_breakpoint(gbp.id).is_none());
    assert!(coordinator.remove_global_breakpoint(gbp.id).await.is_err());
}

#[tokio::test]
async fn test_fan_out_settles_around_disconnected_target() {
    init_tracing();
    let coordinator = Coordinator::new();
    let (_ma, a) = paused_target("a", program()).await;
    let (_mb, b) = paused_target("b", program()).await;
    let (_mc, c) = disconnected_target("c").await;
    coordinator.add_target("a", "a", a, None).unwrap();
    coordinator.add_target("b", "b", b, None).unwrap();
    coordinator.add_target("c", "c", c, None).unwrap();

    let mut events = coordinator.subscribe();
    let report = coordinator.continue_all().await;
    assert_eq!(report.succeeded, vec![TargetId::from("a"), TargetId::from("b")]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].target_id, TargetId::from("c"));

    let errors: Vec<CoordinatorEvent> = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, CoordinatorEvent::TargetError { .. }))
        .collect();
    assert_eq!(errors.len(), 1);

    let report = coordinator.stop_all().await;
    assert!(report.all_succeeded());
    assert_eq!(report.total(), 3);
    assert!(coordinator
        .get_target_tree()
        .iter()
        .all(|node| node.state == SessionState::Terminated));
}

#[tokio::test]
async fn test_pause_all_stops_running_targets() {
    init_tracing();
    let coordinator = Coordinator::new();
    let busy = program().with_loop_forever(true);
    let mut mocks = Vec::new();
    let mut sessions = Vec::new();
    for name in ["a", "b"] {
        let (mock, session) = paused_target(name, busy.clone()).await;
        coordinator.add_target(name, name, session.clone(), None).unwrap();
        mocks.push(mock);
        sessions.push(session);
    }

    coordinator.continue_all().await;
    let report = coordinator.pause_all().await;
    assert!(report.all_succeeded(), "{report:?}");
    for session in &sessions {
        assert_eq!(session.state(), SessionState::Paused);
    }
}

#[tokio::test]
async fn test_removing_parent_removes_child() {
    init_tracing();
    let coordinator = Coordinator::new();
    let (_ma, a) = paused_target("a", program()).await;
    let (_mb, b) = paused_target("b", program()).await;
    let (_mr, root) = paused_target("other", program()).await;
    coordinator.add_target("a", "parent", a, None).unwrap();
    coordinator.add_target("b", "child", b.clone(), Some(TargetId::from("a"))).unwrap();
    coordinator.add_target("other", "other", root, None).unwrap();

    let tree = coordinator.get_target_tree();
    let order: Vec<&str> = tree.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "other"]);
    assert_eq!(tree[0].children, vec![TargetId::from("b")]);
    assert_eq!(tree[1].parent_id, Some(TargetId::from("a")));

    let removed = coordinator.remove_target(&TargetId::from("a")).await.unwrap();
    assert_eq!(removed, vec![TargetId::from("b"), TargetId::from("a")]);
    assert_eq!(b.state(), SessionState::Terminated);

    let tree = coordinator.get_target_tree();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].id, TargetId::from("other"));
    assert!(tree[0].children.is_empty());
}

#[tokio::test]
async fn test_output_from_every_target_is_aggregated() {
    init_tracing();
    let coordinator = Coordinator::new();
    let mut mocks = Vec::new();
    for name in ["api", "worker"] {
        let config = program()
            .with_console("log", format!("hello from {name}"))
            .with_console("error", format!("warning from {name}"))
            .with_console_delay(Duration::from_millis(200));
        let mock = MockInspector::spawn(config).await.unwrap();
        let session = DebugSession::attach(name, &mock.endpoint(), options())
            .await
            .unwrap();
        coordinator.add_target(name, name, Arc::new(session), None).unwrap();
        mocks.push(mock);
    }

    let stdout = wait_for_logs(
        &coordinator,
        &LogQuery::all().with_level(LogLevel::Stdout),
        |logs| logs.len() == 2,
    )
    .await;
    let mut messages: Vec<&str> = stdout.iter().map(|e| e.message.as_str()).collect();
    messages.sort();
    assert_eq!(messages, vec!["hello from api", "hello from worker"]);

    let worker = wait_for_logs(
        &coordinator,
        &LogQuery::all().for_target("worker").with_level(LogLevel::Stderr),
        |logs| !logs.is_empty(),
    )
    .await;
    assert_eq!(worker[0].message, "warning from worker");
    assert_eq!(worker[0].target_name, "worker");

    let all = coordinator.get_aggregated_logs(&LogQuery::all());
    assert!(all.windows(2).all(|w| w[0].sequence < w[1].sequence));
}

#[tokio::test]
async fn test_termination_is_logged() {
    init_tracing();
    let coordinator = Coordinator::new();
    let (_mock, session) = paused_target("api", program()).await;
    coordinator.add_target("api", "api", session, None).unwrap();

    coordinator.remove_target(&TargetId::from("api")).await.unwrap();
    let logs = coordinator.get_aggregated_logs(&LogQuery::all().for_target("api"));
    assert!(logs.iter().any(|e| e.message == "Session terminated"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_respect_capacity() {
    init_tracing();
    let coordinator = Arc::new(Coordinator::with_config(CoordinatorConfig {
        max_log_entries: 50,
        ..CoordinatorConfig::default()
    }));
    let mut mocks = Vec::new();
    for name in ["a", "b", "c", "d"] {
        let (mock, session) = paused_target(name, program()).await;
        coordinator.add_target(name, name, session, None).unwrap();
        mocks.push(mock);
    }

    let writers: Vec<_> = ["a", "b", "c", "d"]
        .into_iter()
        .map(|name| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let id = TargetId::from(name);
                for i in 0..100 {
                    coordinator
                        .log(&id, LogLevel::Stdout, format!("{name}-{i}"))
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }

    let logs = coordinator.get_aggregated_logs(&LogQuery::all());
    assert_eq!(logs.len(), 50);
    assert_eq!(coordinator.log_len(), 50);
    assert!(logs.windows(2).all(|w| w[1].sequence == w[0].sequence + 1));
    assert!(logs.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    // Each writer's own entries keep their relative order.
    for name in ["a", "b", "c", "d"] {
        let indices: Vec<usize> = logs
            .iter()
            .filter(|e| e.target_id.as_str() == name)
            .filter_map(|e| e.message.rsplit('-').next()?.parse().ok())
            .collect();
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
    }

    assert_eq!(coordinator.close_all().await, 4);
}
