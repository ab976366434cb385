//! Terminal output.

use colored::Colorize;
use conductor_core::{Session, SessionEvent, SessionStatus, TaskStatus, Worktree};
use db::Snapshot;
use events::Event;
use orchestrator::{PauseSummary, RunOutcome, TaskOutcome};
use std::path::Path;
use uuid::Uuid;
use vcs::Completion;

fn icon(status: TaskStatus) -> colored::ColoredString {
    match status {
        TaskStatus::Todo => "○".normal(),
        TaskStatus::InProgress => "◑".yellow(),
        TaskStatus::Review => "◕".cyan(),
        TaskStatus::Blocked => "✗".red(),
        TaskStatus::Done => "●".green(),
    }
}

fn ran_line(outcome: &TaskOutcome) {
    let detail = match (&outcome.reason, &outcome.commit) {
        (Some(reason), _) => format!(" ({})", reason),
        (None, Some(commit)) => format!(" @ {}", commit),
        (None, None) => String::new(),
    };
    println!(
        "  {} {} {}{}",
        icon(outcome.status),
        outcome.task_id.bold(),
        outcome.title,
        detail.dimmed()
    );
}

pub fn outcome(outcome: &RunOutcome) {
    println!();
    let status = match outcome.status {
        SessionStatus::Paused => "paused".yellow(),
        SessionStatus::Completed => "completed".green(),
        SessionStatus::Stopped => "stopped".normal(),
        SessionStatus::Running => "running".normal(),
    };
    println!("Session {} {}", outcome.session_id, status.bold());

    if !outcome.ran.is_empty() {
        println!();
        println!("Ran ({}):", outcome.ran.len());
        outcome.ran.iter().for_each(ran_line);
    }

    match &outcome.pause {
        Some(pause) => pause_summary(pause),
        None if !outcome.pending_dispositions.is_empty() => {
            println!();
            println!("Worktrees awaiting a decision:");
            for pending in &outcome.pending_dispositions {
                println!("  {} ({})", pending.worktree, pending.branch);
            }
        }
        None => {}
    }
    println!();
}

fn pause_summary(pause: &PauseSummary) {
    if !pause.next.is_empty() {
        println!();
        println!("Next: {}", pause.next.join(", "));
    }
    if !pause.blocked.is_empty() {
        println!();
        println!("Blocked:");
        for blocked in &pause.blocked {
            println!(
                "  {} {} {}",
                icon(TaskStatus::Blocked),
                blocked.id.bold(),
                blocked.reason.as_deref().unwrap_or("").dimmed()
            );
        }
    }
    if !pause.pending_dispositions.is_empty() {
        println!();
        println!("Worktrees awaiting a decision:");
        for pending in &pause.pending_dispositions {
            match &pending.note {
                Some(note) => println!("  {} ({}): {}", pending.worktree, pending.branch, note),
                None => println!("  {} ({})", pending.worktree, pending.branch),
            }
        }
    }
    println!();
    println!("Suggested: {}", pause.suggested_action.cyan());
}

pub fn status(root: &Path, snapshot: &Snapshot, session: Option<&Session>) {
    println!();
    println!("Path: {}", root.display());
    if let Some(session) = session {
        println!(
            "Session: {} {} ({})",
            session.id,
            session.status.as_str().bold(),
            session.mode.as_str()
        );
        if let Some(action) = session
            .pause_reason
            .as_ref()
            .and_then(|r| r.get("suggested_action"))
            .and_then(|a| a.as_str())
        {
            println!("Suggested: {}", action.cyan());
        }
    }
    println!();

    let live: Vec<_> = snapshot.tasks.iter().filter(|t| !t.archived).collect();
    if live.is_empty() {
        println!("No tasks yet.");
        println!();
        return;
    }

    println!(
        "Tasks: {} todo, {} in progress, {} blocked, {} done",
        snapshot.count_by_status(TaskStatus::Todo),
        snapshot.count_by_status(TaskStatus::InProgress),
        snapshot.count_by_status(TaskStatus::Blocked),
        snapshot.count_by_status(TaskStatus::Done),
    );
    let ready: Vec<&str> = snapshot.ready().iter().map(|t| t.id.as_str()).collect();
    if !ready.is_empty() {
        println!("Ready: {}", ready.join(", "));
    }
    println!();

    for task in live {
        let reason = task
            .blocked_reason
            .as_deref()
            .map(|r| format!(" ({})", r))
            .unwrap_or_default();
        println!(
            "  {} [{}] {} {}{}",
            icon(task.status),
            task.status.as_str(),
            task.id.bold(),
            task.title,
            reason.dimmed()
        );
    }
    println!();
}

pub fn events(session_id: Uuid, events: &[SessionEvent]) {
    println!("Session {}", session_id);
    for event in events {
        println!(
            "{} {:<18} {}",
            event.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            event.kind.as_str(),
            event.payload
        );
    }
}

pub fn worktrees(worktrees: &[Worktree]) {
    if worktrees.is_empty() {
        println!("No worktrees.");
        return;
    }
    for wt in worktrees {
        println!(
            "{} [{}] {} {} {}",
            wt.name.bold(),
            wt.status.as_str(),
            wt.scope.as_str(),
            wt.branch,
            wt.path.display().to_string().dimmed()
        );
    }
}

pub fn completion(name: &str, completion: &Completion) {
    match completion {
        Completion::Merged => println!("Merged {}", name),
        Completion::PullRequest(pr) => println!("Opened pull request #{}: {}", pr.number, pr.url),
        Completion::Kept => println!("Kept {}", name),
        Completion::Discarded => println!("Discarded {}", name),
        Completion::InPlace => println!("{} ran in the main checkout; nothing to do", name),
    }
}

/// One line for a live event, or `None` for events the final summary covers.
fn progress_line(event: &Event) -> Option<String> {
    let line = match event {
        Event::SessionStarted { session_id, mode } => {
            format!("Session {} started ({})", session_id, mode)
        }
        Event::SessionResumed { session_id } => format!("Session {} resumed", session_id),
        Event::CycleStarted { task_ids, .. } => {
            format!("{} {}", "▶".cyan(), task_ids.join(", "))
        }
        Event::WorktreePrepared {
            task_id,
            worktree,
            isolated: true,
        } => format!("  {} in {}", task_id, worktree.dimmed()),
        Event::TaskStatusChanged {
            task_id, to_status, ..
        } if to_status == TaskStatus::Done.as_str() => {
            format!("  {} {}", icon(TaskStatus::Done), task_id)
        }
        Event::TaskBlocked { task_id, reason } => {
            format!("  {} {} {}", icon(TaskStatus::Blocked), task_id, reason.dimmed())
        }
        Event::HookFired {
            point,
            action,
            outcome,
            message,
        } if outcome != "ok" => format!(
            "  {} {}/{} {}",
            "!".yellow(),
            point,
            action,
            message.as_deref().unwrap_or(outcome.as_str())
        ),
        Event::WorktreeCompleted {
            worktree,
            disposition,
        } => format!("  {} {}", worktree, disposition),
        Event::Error { message, .. } => format!("  {} {}", "error:".red(), message),
        _ => return None,
    };
    Some(line)
}

pub fn progress(event: &Event) {
    if let Some(line) = progress_line(event) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_lines() {
        let blocked = progress_line(&Event::TaskBlocked {
            task_id: "t-1".to_string(),
            reason: "timeout".to_string(),
        })
        .unwrap();
        assert!(blocked.contains("t-1") && blocked.contains("timeout"));

        let warned = progress_line(&Event::HookFired {
            point: "post-task".to_string(),
            action: "lint".to_string(),
            outcome: "warning".to_string(),
            message: Some("2 nits".to_string()),
        })
        .unwrap();
        assert!(warned.contains("post-task/lint") && warned.contains("2 nits"));
    }

    #[test]
    fn test_quiet_events_print_nothing() {
        let ok_hook = Event::HookFired {
            point: "pre-task".to_string(),
            action: "sync".to_string(),
            outcome: "ok".to_string(),
            message: None,
        };
        assert!(progress_line(&ok_hook).is_none());

        let started = Event::TaskStatusChanged {
            task_id: "t-1".to_string(),
            from_status: "todo".to_string(),
            to_status: "in_progress".to_string(),
        };
        assert!(progress_line(&started).is_none());
    }
}
