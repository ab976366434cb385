mod project;
mod render;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use conductor_core::{
    Disposition, Epic, EpicPriority, IsolationOverride, Mode, SessionStatus, Story, Task, TaskType,
};
use events::EventBus;
use orchestrator::{Config, DispatchSettings, OrchestratorError, RunOutcome};
use project::Project;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Run a backlog of dependent tasks through AI workers", long_about = None)]
#[command(version)]
struct Cli {
    /// Repository to operate on (defaults to the current directory).
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .conductor/ with a default config and database
    Init,
    /// Set the checkpoint mode (supervised, semi-auto, autonomous)
    Mode { mode: String },
    /// Start a session
    Run {
        #[arg(long)]
        max_parallel: Option<usize>,
        /// always | never
        #[arg(long)]
        isolate: Option<String>,
        /// Overrides session.mode from the config
        #[arg(long)]
        mode: Option<String>,
    },
    /// Continue the paused session
    Resume,
    /// Stop the current session
    Stop,
    Block { id: String, reason: String },
    Unblock { id: String },
    Status,
    /// Show the session log
    Log {
        /// Defaults to the latest session
        #[arg(long)]
        session: Option<Uuid>,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    Story {
        #[command(subcommand)]
        command: StoryCommands,
    },
    Epic {
        #[command(subcommand)]
        command: EpicCommands,
    },
    Dep {
        #[command(subcommand)]
        command: DepCommands,
    },
    /// Archive a task (tasks are never deleted)
    Archive { id: String },
    Worktree {
        #[command(subcommand)]
        command: WorktreeCommands,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    Add {
        title: String,
        #[arg(long = "type", default_value = "feature")]
        task_type: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        story: Option<String>,
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Estimate in minutes
        #[arg(long)]
        estimate: Option<u32>,
        #[arg(long)]
        notes: Option<String>,
        /// Ids of tasks that must be done first
        #[arg(long = "blocked-by")]
        blocked_by: Vec<String>,
    },
}

#[derive(Subcommand)]
enum StoryCommands {
    Add {
        id: String,
        #[arg(long)]
        epic: String,
        title: String,
    },
}

#[derive(Subcommand)]
enum EpicCommands {
    Add {
        id: String,
        title: String,
        /// P0..P3
        #[arg(long, default_value = "P2")]
        priority: String,
    },
}

#[derive(Subcommand)]
enum DepCommands {
    /// `blocked` waits for `blocker`
    Add { blocked: String, blocker: String },
    Rm { blocked: String, blocker: String },
}

#[derive(Subcommand)]
enum WorktreeCommands {
    List,
    /// merge | pull-request | keep | discard
    Complete { name: String, disposition: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Init => init_project(cli.repo).await,
        Commands::Mode { mode } => set_mode(cli.repo, &mode).await,
        Commands::Run {
            max_parallel,
            isolate,
            mode,
        } => run(cli.repo, max_parallel, isolate.as_deref(), mode.as_deref()).await,
        Commands::Resume => resume(cli.repo).await,
        Commands::Stop => stop(cli.repo).await,
        Commands::Block { id, reason } => {
            let project = Project::open(cli.repo).await?;
            let task = project.store.block_task(&id, &reason).await?;
            println!("Blocked {}: {}", task.id, reason);
            Ok(())
        }
        Commands::Unblock { id } => {
            let project = Project::open(cli.repo).await?;
            let task = project.store.unblock_task(&id).await?;
            println!("Unblocked {} ({})", task.id, task.status.as_str());
            Ok(())
        }
        Commands::Status => status(cli.repo).await,
        Commands::Log { session, limit } => log(cli.repo, session, limit).await,
        Commands::Task { command } => task_command(cli.repo, command).await,
        Commands::Story {
            command: StoryCommands::Add { id, epic, title },
        } => {
            let project = Project::open(cli.repo).await?;
            let story = project
                .store
                .create_story(&Story::new(id, epic, title))
                .await?;
            println!("Created story {}", story.id);
            Ok(())
        }
        Commands::Epic {
            command: EpicCommands::Add {
                id,
                title,
                priority,
            },
        } => {
            let priority = EpicPriority::parse(&priority)
                .with_context(|| format!("Unknown epic priority '{}'", priority))?;
            let project = Project::open(cli.repo).await?;
            let epic = project
                .store
                .create_epic(&Epic::new(id, title, priority))
                .await?;
            println!("Created epic {}", epic.id);
            Ok(())
        }
        Commands::Dep { command } => dep_command(cli.repo, command).await,
        Commands::Archive { id } => {
            let project = Project::open(cli.repo).await?;
            let (task, boundaries) = project.store.archive_task(&id).await?;
            println!("Archived {}", task.id);
            if let Some(story) = boundaries.story_completed {
                println!("Story {} is now done", story);
            }
            if let Some(epic) = boundaries.epic_completed {
                println!("Epic {} is now done", epic);
            }
            Ok(())
        }
        Commands::Worktree { command } => worktree_command(cli.repo, command).await,
    }
}

async fn init_project(repo: Option<PathBuf>) -> Result<()> {
    let root = match repo {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let dir = Config::dir(&root);

    if Config::path(&root).exists() {
        println!("Project already initialized at {}", dir.display());
        return Ok(());
    }

    println!("Initializing conductor in {}", root.display());
    Config::default()
        .save(&root)
        .await
        .context("Failed to write configuration")?;
    db::TaskStore::open(&project::database_url(&root))
        .await
        .context("Failed to create task database")?;

    println!();
    println!("Created:");
    println!("  {}/", orchestrator::config::CONDUCTOR_DIR);
    println!("  ├── {}", orchestrator::config::CONFIG_FILE);
    println!("  └── {}", orchestrator::config::DB_FILE);
    println!();
    println!("Next steps:");
    println!("  1. Set worker.command in {}", Config::path(&root).display());
    println!("  2. Add work with 'conductor task add'");
    println!("  3. Start with 'conductor run'");

    Ok(())
}

fn parse_mode(mode: &str) -> Result<Mode> {
    Mode::parse(mode).with_context(|| {
        format!(
            "Unknown mode '{}', expected supervised, semi-auto, or autonomous",
            mode
        )
    })
}

async fn set_mode(repo: Option<PathBuf>, mode: &str) -> Result<()> {
    let mode = parse_mode(mode)?;
    let mut project = Project::open(repo).await?;
    let orchestrator = project.orchestrator_for_control().await?;

    match orchestrator.set_mode(mode).await {
        Ok(session) => {
            println!(
                "Session {} will resume in {} mode",
                session.id,
                session.mode.as_str()
            );
            Ok(())
        }
        Err(OrchestratorError::NoSession(_)) => {
            project.config.session.mode = mode;
            project.config.save(&project.root).await?;
            println!("Default mode set to {}", mode.as_str());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run(
    repo: Option<PathBuf>,
    max_parallel: Option<usize>,
    isolate: Option<&str>,
    mode: Option<&str>,
) -> Result<()> {
    let project = Project::open(repo).await?;

    let mut settings = DispatchSettings::from_config(&project.config);
    if let Some(n) = max_parallel {
        settings.max_parallel = Config::effective_parallelism(n);
    }
    if let Some(isolate) = isolate {
        settings.isolation = Some(
            IsolationOverride::parse(isolate)
                .with_context(|| format!("Unknown --isolate '{}', expected always or never", isolate))?,
        );
    }
    let mode = match mode {
        Some(m) => parse_mode(m)?,
        None => project.config.session.mode,
    };

    let orchestrator = project.orchestrator(settings).await?;
    watch_ctrl_c(orchestrator.stop_handle());

    let progress = Progress::follow(orchestrator.event_bus());
    let result = orchestrator.start(mode).await;
    progress.finish().await;
    let outcome = match result {
        Err(OrchestratorError::SessionPaused) => {
            bail!("A session is paused. Use 'conductor resume' or 'conductor stop'.")
        }
        other => other?,
    };
    report(&outcome);
    Ok(())
}

async fn resume(repo: Option<PathBuf>) -> Result<()> {
    let project = Project::open(repo).await?;
    let settings = DispatchSettings::from_config(&project.config);
    let orchestrator = project.orchestrator(settings).await?;
    watch_ctrl_c(orchestrator.stop_handle());

    let progress = Progress::follow(orchestrator.event_bus());
    let result = orchestrator.resume().await;
    progress.finish().await;
    report(&result?);
    Ok(())
}

async fn stop(repo: Option<PathBuf>) -> Result<()> {
    let project = Project::open(repo).await?;
    let orchestrator = project.orchestrator_for_control().await?;
    let session = orchestrator.stop().await?;
    println!("Session {} {}", session.id, session.status.as_str());
    Ok(())
}

/// Prints live events while a session runs.
struct Progress {
    done: oneshot::Sender<()>,
    printer: JoinHandle<()>,
}

impl Progress {
    fn follow(bus: &EventBus) -> Self {
        let mut rx = bus.subscribe();
        let (done, mut finished) = oneshot::channel::<()>();
        let printer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    received = rx.recv() => match received {
                        Ok(envelope) => render::progress(&envelope.event),
                        Err(RecvError::Lagged(missed)) => {
                            tracing::debug!(missed, "Progress output fell behind");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = &mut finished => {
                        while let Ok(envelope) = rx.try_recv() {
                            render::progress(&envelope.event);
                        }
                        break;
                    }
                }
            }
        });
        Self { done, printer }
    }

    async fn finish(self) {
        let _ = self.done.send(());
        let _ = self.printer.await;
    }
}

/// First Ctrl-C lets in-flight workers finish; no new cycle starts.
fn watch_ctrl_c(handle: orchestrator::StopHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Stopping after in-flight tasks finish...");
            handle.stop();
        }
    });
}

fn report(outcome: &RunOutcome) {
    render::outcome(outcome);
    if outcome.status == SessionStatus::Stopped {
        tracing::info!(session_id = %outcome.session_id, "Session stopped by request");
    }
}

async fn status(repo: Option<PathBuf>) -> Result<()> {
    let project = Project::open(repo).await?;
    let snapshot = project.store.snapshot().await?;
    let session = project.store.sessions().find_latest().await?;
    render::status(&project.root, &snapshot, session.as_ref());
    Ok(())
}

async fn log(repo: Option<PathBuf>, session: Option<Uuid>, limit: Option<usize>) -> Result<()> {
    let project = Project::open(repo).await?;
    let session_id = match session {
        Some(id) => id,
        None => match project.store.sessions().find_latest().await? {
            Some(s) => s.id,
            None => {
                println!("No sessions yet.");
                return Ok(());
            }
        },
    };

    let events = project.store.events().find_by_session(session_id).await?;
    let skip = limit.map_or(0, |n| events.len().saturating_sub(n));
    render::events(session_id, &events[skip..]);
    Ok(())
}

async fn task_command(repo: Option<PathBuf>, command: TaskCommands) -> Result<()> {
    match command {
        TaskCommands::Add {
            title,
            task_type,
            id,
            story,
            priority,
            estimate,
            notes,
            blocked_by,
        } => {
            let task_type = TaskType::parse(&task_type)
                .with_context(|| format!("Unknown task type '{}'", task_type))?;
            let project = Project::open(repo).await?;

            let mut task = Task::new(title, task_type).with_priority(priority);
            if let Some(id) = id {
                task = task.with_id(id);
            }
            if let Some(story) = story {
                task = task.with_story(story);
            }
            if let Some(minutes) = estimate {
                task = task.with_estimate(minutes);
            }
            if let Some(notes) = notes {
                task = task.with_notes(notes);
            }
            task.blocked_by = blocked_by.into_iter().collect();

            let task = project
                .store
                .create_task(&task)
                .await
                .map_err(OrchestratorError::from)?;
            println!("Created {} ({})", task.id, task.task_type.as_str());
            Ok(())
        }
    }
}

async fn dep_command(repo: Option<PathBuf>, command: DepCommands) -> Result<()> {
    let project = Project::open(repo).await?;
    match command {
        DepCommands::Add { blocked, blocker } => {
            project
                .store
                .add_dependency(&blocked, &blocker)
                .await
                .map_err(OrchestratorError::from)?;
            println!("{} now waits for {}", blocked, blocker);
        }
        DepCommands::Rm { blocked, blocker } => {
            project
                .store
                .remove_dependency(&blocked, &blocker)
                .await
                .map_err(OrchestratorError::from)?;
            println!("{} no longer waits for {}", blocked, blocker);
        }
    }
    Ok(())
}

async fn worktree_command(repo: Option<PathBuf>, command: WorktreeCommands) -> Result<()> {
    let project = Project::open(repo).await?;
    let manager = project.worktrees().await?;
    match command {
        WorktreeCommands::List => {
            render::worktrees(&manager.list().await?);
        }
        WorktreeCommands::Complete { name, disposition } => {
            let disposition = Disposition::parse(&disposition).with_context(|| {
                format!(
                    "Unknown disposition '{}', expected merge, pull-request, keep, or discard",
                    disposition
                )
            })?;
            let worktree = manager
                .find(&name)
                .await
                .map_err(OrchestratorError::from)?;
            let completion = manager
                .complete(&worktree, disposition)
                .await
                .map_err(OrchestratorError::from)?;
            render::completion(&name, &completion);
        }
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "conductor=info,orchestrator=info,vcs=info,db=warn,github=info".into()
            }),
        )
        .init();
}
