mod common;

use common::{calls, engine, Harness, Script};
use conductor_core::{Mode, Session, SessionEventKind, SessionStatus, TaskStatus, TaskType};
use orchestrator::{
    ActionOutcome, Boundary, DispatchSettings, HookEngine, OrchestratorError, PauseReason,
};
use std::time::Duration;
use uuid::Uuid;

async fn kinds(h: &Harness, session_id: Uuid) -> Vec<SessionEventKind> {
    h.store
        .events()
        .find_by_session(session_id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect()
}

fn count(kinds: &[SessionEventKind], kind: SessionEventKind) -> usize {
    kinds.iter().filter(|k| **k == kind).count()
}

#[tokio::test]
async fn test_autonomous_runs_through_stories_and_pauses_at_epic() {
    let h = Harness::new().await;
    h.epic("e").await;
    h.story("s1", "e").await;
    h.story("s2", "e").await;
    h.task("a", TaskType::Feature, Some("s1")).await;
    h.task("b", TaskType::Feature, Some("s1")).await;
    h.task("c", TaskType::Feature, Some("s2")).await;
    h.depends("b", "a").await;
    h.depends("c", "b").await;

    let orchestrator = h.orchestrator(HookEngine::disabled(), DispatchSettings::default());
    let outcome = orchestrator.start(Mode::Autonomous).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Paused);
    assert_eq!(outcome.ran.len(), 3);
    let pause = outcome.pause.unwrap();
    assert_eq!(
        pause.reason,
        PauseReason::Checkpoint {
            boundary: Boundary::Epic,
            id: "e".to_string()
        }
    );
    assert!(pause.suggested_action.contains("conductor resume"));

    let logged = kinds(&h, outcome.session_id).await;
    assert_eq!(count(&logged, SessionEventKind::TaskCompleted), 0);
    // Two stories logged, the epic boundary logged, then the pause.
    assert_eq!(count(&logged, SessionEventKind::BoundaryReached), 3);
    assert_eq!(logged.last(), Some(&SessionEventKind::CheckpointPaused));

    let stored = h.store.sessions().get(outcome.session_id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Paused);
    assert_eq!(stored.pause_reason.unwrap()["reason"]["kind"], "checkpoint");
}

#[tokio::test]
async fn test_supervised_pauses_after_every_task() {
    let h = Harness::new().await;
    h.task("a", TaskType::Feature, None).await;
    h.task("b", TaskType::Feature, None).await;

    let orchestrator = h.orchestrator(HookEngine::disabled(), DispatchSettings::default());

    let first = orchestrator.start(Mode::Supervised).await.unwrap();
    let pause = first.pause.unwrap();
    assert_eq!(
        pause.reason,
        PauseReason::Checkpoint {
            boundary: Boundary::Task,
            id: "a".to_string()
        }
    );
    assert_eq!(pause.next, vec!["b"]);
    // Standalone isolated tasks leave their worktree for a human decision.
    assert_eq!(pause.pending_dispositions.len(), 1);

    let second = orchestrator.resume().await.unwrap();
    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.ran.len(), 1);
    assert_eq!(second.ran[0].task_id, "b");
    assert_eq!(second.status, SessionStatus::Paused);

    let last = orchestrator.resume().await.unwrap();
    assert_eq!(last.status, SessionStatus::Completed);
    assert!(last.ran.is_empty());

    let logged = kinds(&h, first.session_id).await;
    assert_eq!(count(&logged, SessionEventKind::Resumed), 2);
    assert_eq!(count(&logged, SessionEventKind::CheckpointPaused), 2);
}

#[tokio::test]
async fn test_semi_auto_logs_tasks_and_completes() {
    let h = Harness::new().await;
    h.task("a", TaskType::Chore, None).await;
    h.task("b", TaskType::Chore, None).await;

    let orchestrator = h.orchestrator(HookEngine::disabled(), DispatchSettings::default());
    let outcome = orchestrator.start(Mode::SemiAuto).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.ran.len(), 2);
    assert!(outcome.pause.is_none());
    assert_eq!(outcome.pending_dispositions.len(), 2);

    let logged = kinds(&h, outcome.session_id).await;
    assert_eq!(logged.first(), Some(&SessionEventKind::Started));
    assert_eq!(count(&logged, SessionEventKind::TaskCompleted), 2);
}

#[tokio::test]
async fn test_critical_hook_pauses_autonomous_session() {
    let h = Harness::new().await;
    h.task("a", TaskType::Feature, None).await;
    h.task("b", TaskType::Feature, None).await;
    h.depends("b", "a").await;

    let log = calls();
    let hooks = engine(
        &[
            ("post-task", "warn-only", ActionOutcome::Warning("slow".to_string())),
            (
                "post-task",
                "audit-gate",
                ActionOutcome::Critical("audit found secrets".to_string()),
            ),
        ],
        &log,
    );
    let orchestrator = h.orchestrator(hooks, DispatchSettings::default());
    let outcome = orchestrator.start(Mode::Autonomous).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Paused);
    let pause = outcome.pause.unwrap();
    match &pause.reason {
        PauseReason::HookCritical {
            point,
            action,
            task_id,
            ..
        } => {
            assert_eq!(point, "post-task");
            assert_eq!(action, "audit-gate");
            assert_eq!(task_id.as_deref(), Some("a"));
        }
        other => panic!("unexpected pause reason: {:?}", other),
    }
    assert_eq!(pause.blocked.len(), 1);
    assert_eq!(pause.blocked[0].id, "a");
    assert!(pause.suggested_action.contains("conductor unblock a"));
    assert_eq!(h.store.task("b").await.unwrap().status, TaskStatus::Todo);
}

#[tokio::test]
async fn test_warnings_do_not_pause() {
    let h = Harness::new().await;
    h.task("a", TaskType::Feature, None).await;

    let log = calls();
    let hooks = engine(
        &[("post-task", "nag", ActionOutcome::Warning("consider docs".to_string()))],
        &log,
    );
    let orchestrator = h.orchestrator(hooks, DispatchSettings::default());
    let outcome = orchestrator.start(Mode::Autonomous).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(*log.lock().unwrap(), vec!["nag:a"]);
}

#[tokio::test]
async fn test_blocked_backlog_needs_attention() {
    let h = Harness::new().await;
    h.task("a", TaskType::Feature, None).await;
    h.task("b", TaskType::Feature, None).await;
    h.depends("b", "a").await;
    h.worker.script("a", Script::Fail("cannot reach API".to_string()));

    let orchestrator = h.orchestrator(HookEngine::disabled(), DispatchSettings::default());
    let outcome = orchestrator.start(Mode::Autonomous).await.unwrap();

    let pause = outcome.pause.unwrap();
    assert_eq!(pause.reason, PauseReason::NeedsAttention);
    assert!(pause.next.is_empty());
    assert_eq!(pause.blocked[0].reason.as_deref(), Some("worker failed: cannot reach API"));

    // A human unblocks, the worker now succeeds, and the session finishes.
    h.store.unblock_task("a").await.unwrap();
    h.worker.script("a", Script::Done);
    let resumed = orchestrator.resume().await.unwrap();
    assert_eq!(resumed.status, SessionStatus::Completed);
    assert_eq!(resumed.ran.len(), 2);
}

#[tokio::test]
async fn test_stale_session_is_recovered_on_start() {
    let h = Harness::new().await;
    h.task("a", TaskType::Feature, None).await;

    let stale = h
        .store
        .sessions()
        .create(&Session::new(Mode::Autonomous))
        .await
        .unwrap();
    h.store.start_task("a").await.unwrap();

    let orchestrator = h.orchestrator(HookEngine::disabled(), DispatchSettings::default());
    let outcome = orchestrator.start(Mode::Autonomous).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.ran.len(), 1);
    assert_eq!(
        h.store.sessions().get(stale.id).await.unwrap().status,
        SessionStatus::Stopped
    );

    let events = h.store.events().find_by_session(outcome.session_id).await.unwrap();
    let recovery = events
        .iter()
        .find(|e| e.kind == SessionEventKind::Error)
        .unwrap();
    assert_eq!(recovery.payload["reset_tasks"][0], "a");
    assert_eq!(recovery.payload["previous_session"], stale.id.to_string());
}

#[tokio::test]
async fn test_paused_session_controls() {
    let h = Harness::new().await;
    h.task("a", TaskType::Feature, None).await;
    h.task("b", TaskType::Feature, None).await;

    let orchestrator = h.orchestrator(HookEngine::disabled(), DispatchSettings::default());
    let first = orchestrator.start(Mode::Supervised).await.unwrap();
    assert_eq!(first.status, SessionStatus::Paused);

    assert!(matches!(
        orchestrator.start(Mode::Autonomous).await,
        Err(OrchestratorError::SessionPaused)
    ));

    let changed = orchestrator.set_mode(Mode::Autonomous).await.unwrap();
    assert_eq!(changed.mode, Mode::Autonomous);
    let logged = kinds(&h, first.session_id).await;
    assert_eq!(count(&logged, SessionEventKind::ModeChanged), 1);

    let stopped = orchestrator.stop().await.unwrap();
    assert_eq!(stopped.status, SessionStatus::Stopped);
    assert!(matches!(
        orchestrator.resume().await,
        Err(OrchestratorError::NoSession("resume"))
    ));
    assert_eq!(h.store.task("b").await.unwrap().status, TaskStatus::Todo);
}

#[tokio::test]
async fn test_mode_change_applies_on_resume() {
    let h = Harness::new().await;
    h.task("a", TaskType::Feature, None).await;
    h.task("b", TaskType::Feature, None).await;
    h.task("c", TaskType::Feature, None).await;

    let orchestrator = h.orchestrator(HookEngine::disabled(), DispatchSettings::default());
    let first = orchestrator.start(Mode::Supervised).await.unwrap();
    assert_eq!(first.ran.len(), 1);

    orchestrator.set_mode(Mode::Autonomous).await.unwrap();
    let rest = orchestrator.resume().await.unwrap();
    assert_eq!(rest.status, SessionStatus::Completed);
    assert_eq!(rest.ran.len(), 2);
}

#[tokio::test]
async fn test_critical_pre_session_hook_pauses_before_any_work() {
    let h = Harness::new().await;
    h.task("a", TaskType::Feature, None).await;

    let log = calls();
    let hooks = engine(
        &[(
            "pre-session",
            "verify-clean",
            ActionOutcome::Critical("uncommitted changes".to_string()),
        )],
        &log,
    );
    let orchestrator = h.orchestrator(hooks, DispatchSettings::default());
    let outcome = orchestrator.start(Mode::Autonomous).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Paused);
    assert!(h.worker.executed().is_empty());
    assert_eq!(*log.lock().unwrap(), vec!["verify-clean:-"]);
}

#[tokio::test]
async fn test_stop_during_cycle_lets_worker_finish_and_ends_session() {
    let h = Harness::new().await;
    h.task("a", TaskType::Feature, None).await;
    h.task("b", TaskType::Feature, None).await;
    h.worker.script("a", Script::Sleep(Duration::from_millis(300)));

    let orchestrator = h.orchestrator(HookEngine::disabled(), DispatchSettings::default());
    let (outcome, stopped) = tokio::join!(orchestrator.start(Mode::Supervised), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        orchestrator.stop().await
    });

    assert_eq!(stopped.unwrap().status, SessionStatus::Stopped);
    let outcome = outcome.unwrap();
    assert_eq!(outcome.status, SessionStatus::Stopped);
    assert!(outcome.pause.is_none());

    // The in-flight task finished; nothing new was dispatched.
    assert_eq!(h.worker.executed(), vec!["a"]);
    assert_eq!(h.store.task("a").await.unwrap().status, TaskStatus::Done);
    assert_eq!(h.store.task("b").await.unwrap().status, TaskStatus::Todo);

    let stored = h.store.sessions().get(outcome.session_id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Stopped);
    assert!(matches!(
        orchestrator.resume().await,
        Err(OrchestratorError::NoSession("resume"))
    ));
}

#[tokio::test]
async fn test_stop_handle_ends_autonomous_run_after_in_flight_work() {
    let h = Harness::new().await;
    h.task("a", TaskType::Feature, None).await;
    h.task("b", TaskType::Feature, None).await;
    h.task("c", TaskType::Feature, None).await;
    h.worker.script("a", Script::Sleep(Duration::from_millis(300)));

    let orchestrator = h.orchestrator(HookEngine::disabled(), DispatchSettings::default());
    let handle = orchestrator.stop_handle();
    let (outcome, _) = tokio::join!(orchestrator.start(Mode::Autonomous), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop();
    });

    let outcome = outcome.unwrap();
    assert_eq!(outcome.status, SessionStatus::Stopped);
    assert_eq!(outcome.ran.len(), 1);
    assert!(outcome.ran[0].is_done());
    assert_eq!(h.worker.executed(), vec!["a"]);

    let logged = kinds(&h, outcome.session_id).await;
    assert_eq!(logged.last(), Some(&SessionEventKind::Stopped));
    assert_eq!(count(&logged, SessionEventKind::CheckpointPaused), 0);
}
