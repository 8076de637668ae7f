use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mission_common::config::MissionConfig;
use mission_common::{APP_NAME, logging};
use mission_core::{Decision, Priority, TaskStatus, now_epoch_ms, rfc3339_from_ms};
use mission_relay::CliRelay;
use mission_store::{FileStore, NewTask, ResolveOutcome, TaskPatch};
use mission_view::{ApiClient, Tab, ViewState, watch_tab};
use mission_web::AppState;

#[derive(Debug, Parser)]
#[command(name = "mission", about = "Mission control for an external agent CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate local setup and generate default config if missing.
    Doctor,
    /// Serve the dashboard and JSON API.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Kanban task operations.
    Tasks {
        #[command(subcommand)]
        command: TaskCommand,
    },
    /// Approval queue operations.
    Approvals {
        #[command(subcommand)]
        command: ApprovalCommand,
    },
    /// Scheduled jobs owned by the external tool.
    Cron {
        #[command(subcommand)]
        command: CronCommand,
    },
    /// List agent sessions.
    Sessions,
    /// Print the external tool's status report.
    Status,
    /// Start a new agent session.
    Spawn {
        task: String,
        #[arg(long, default_value = "MC Agent")]
        label: String,
    },
    /// Poll one dashboard tab from a running server and print each update.
    Watch {
        #[arg(value_parser = parse_tab)]
        tab: Tab,
        #[arg(long)]
        server: Option<String>,
        /// Print the first result and exit.
        #[arg(long)]
        once: bool,
    },
}

#[derive(Debug, Subcommand)]
enum TaskCommand {
    /// List tasks, optionally for one column.
    List {
        #[arg(long, value_parser = parse_status)]
        status: Option<TaskStatus>,
    },
    /// Create a task in the backlog.
    Add {
        title: String,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<Priority>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        assign: Option<String>,
    },
    /// Move a task to another column.
    Move {
        id: String,
        #[arg(value_parser = parse_status)]
        status: TaskStatus,
    },
}

#[derive(Debug, Subcommand)]
enum ApprovalCommand {
    /// List approvals.
    List {
        #[arg(long)]
        pending: bool,
    },
    /// Approve a pending request.
    Approve { id: String },
    /// Reject a pending request.
    Reject { id: String },
}

#[derive(Debug, Subcommand)]
enum CronCommand {
    /// List scheduled jobs.
    List,
    /// Trigger a job now.
    Run { job_id: String },
}

fn parse_tab(raw: &str) -> Result<Tab, String> {
    Tab::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = Tab::ALL.iter().map(Tab::as_str).collect();
        format!("unknown tab '{raw}' (expected one of: {})", known.join(", "))
    })
}

fn parse_status(raw: &str) -> Result<TaskStatus, String> {
    TaskStatus::parse(raw).ok_or_else(|| format!("unknown status '{raw}'"))
}

fn parse_priority(raw: &str) -> Result<Priority, String> {
    Priority::parse(raw).ok_or_else(|| format!("unknown priority '{raw}'"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Command::Doctor) => doctor(),
        Some(Command::Serve { bind }) => serve(bind),
        Some(Command::Tasks { command }) => tasks(command),
        Some(Command::Approvals { command }) => approvals(command),
        Some(Command::Cron { command }) => cron(command),
        Some(Command::Sessions) => sessions(),
        Some(Command::Status) => status(),
        Some(Command::Spawn { task, label }) => spawn(&task, &label),
        Some(Command::Watch { tab, server, once }) => watch(tab, server, once),
        None => {
            println!("{APP_NAME} CLI ready.");
            println!("Run `mission doctor` to generate and validate local config.");
            Ok(())
        }
    }
}

fn load_initialized_config() -> Result<MissionConfig> {
    let (config, _, _) = MissionConfig::load_or_create()?;
    config.validate_and_prepare()?;
    logging::init(&config.log_level);
    Ok(config)
}

fn open_store(config: &MissionConfig) -> Result<FileStore> {
    Ok(FileStore::open(&config.workspace_dir)?
        .with_demo_seed(config.seed_demo_data)
        .with_history_limit(config.console.history_limit))
}

fn open_relay(config: &MissionConfig) -> Result<CliRelay> {
    CliRelay::from_config(&config.relay).context("invalid relay configuration")
}

fn doctor() -> Result<()> {
    let (config, path, created) = MissionConfig::load_or_create()?;
    config.validate_and_prepare()?;
    logging::init(&config.log_level);

    let relay_status = open_relay(&config)?.status();
    let relay_reachable = relay_status.as_object().is_some_and(|map| !map.is_empty());

    println!("{APP_NAME} doctor: OK");
    println!("config: {}", path.display());
    println!("workspace: {}", config.workspace_dir.display());
    println!("memory: {}", config.memory_dir().display());
    println!("relay_program: {}", config.relay.program);
    println!("relay_reachable: {relay_reachable}");
    println!(
        "external_config: {} (present: {})",
        config.external_config.display(),
        config.external_config.is_file()
    );
    println!("created_config: {created}");
    Ok(())
}

fn serve(bind: Option<String>) -> Result<()> {
    let config = load_initialized_config()?;
    let bind = bind.unwrap_or_else(|| config.bind_addr.clone());
    let state = AppState::from_config(&config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    println!("web_status: starting");
    println!("bind: {bind}");
    println!("workspace: {}", config.workspace_dir.display());
    runtime.block_on(mission_web::serve(&bind, state))
}

fn tasks(command: TaskCommand) -> Result<()> {
    let config = load_initialized_config()?;
    let store = open_store(&config)?;

    match command {
        TaskCommand::List { status } => {
            let tasks = store.list_tasks()?;
            let shown: Vec<_> = tasks
                .iter()
                .filter(|t| status.is_none_or(|s| t.status == s))
                .collect();
            if shown.is_empty() {
                println!("no tasks");
            }
            for task in shown {
                println!(
                    "{} | {} | {} | {}{}",
                    task.id,
                    task.status.as_str(),
                    task.priority.as_str(),
                    task.title,
                    task.assigned_to
                        .as_deref()
                        .map(|who| format!(" (@{who})"))
                        .unwrap_or_default()
                );
            }
        }
        TaskCommand::Add {
            title,
            priority,
            tags,
            assign,
        } => {
            let task = store.create_task(NewTask {
                title,
                status: None,
                priority,
                assigned_to: assign,
                tags,
            })?;
            println!("task_id: {}", task.id);
            println!("status: {}", task.status.as_str());
        }
        TaskCommand::Move { id, status } => {
            let Some(task) = store.update_task(&id, TaskPatch::status(status))? else {
                bail!("task not found: {id}");
            };
            println!("task_id: {}", task.id);
            println!("status: {}", task.status.as_str());
        }
    }
    Ok(())
}

fn approvals(command: ApprovalCommand) -> Result<()> {
    let config = load_initialized_config()?;
    let store = open_store(&config)?;

    let (id, decision) = match command {
        ApprovalCommand::List { pending } => {
            let items = store.list_approvals(pending)?;
            if items.is_empty() {
                println!("no approvals");
            }
            for item in items {
                println!(
                    "{} | {} | {} | {} | {}",
                    item.id,
                    item.status.as_str(),
                    item.kind.as_str(),
                    item.requested_by,
                    item.content.lines().next().unwrap_or_default()
                );
            }
            return Ok(());
        }
        ApprovalCommand::Approve { id } => (id, Decision::Approve),
        ApprovalCommand::Reject { id } => (id, Decision::Reject),
    };

    match store.resolve_approval(&id, decision)? {
        ResolveOutcome::Resolved(item) => {
            println!("approval_id: {}", item.id);
            println!("status: {}", item.status.as_str());
            Ok(())
        }
        ResolveOutcome::NotFound => bail!("approval not found: {id}"),
        ResolveOutcome::AlreadyResolved(item) => {
            bail!("approval {} already {}", item.id, item.status.as_str())
        }
    }
}

fn cron(command: CronCommand) -> Result<()> {
    let config = load_initialized_config()?;
    let relay = open_relay(&config)?;

    match command {
        CronCommand::List => {
            let jobs = relay.cron_jobs();
            if jobs.is_empty() {
                println!("no cron jobs");
            }
            let now = now_epoch_ms();
            for job in jobs {
                let next = job
                    .next_run_ms(now)
                    .and_then(rfc3339_from_ms)
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{} | {} | {} | {} | next: {}",
                    job.id,
                    job.name,
                    if job.enabled { "enabled" } else { "disabled" },
                    job.schedule.describe(),
                    next
                );
            }
        }
        CronCommand::Run { job_id } => {
            relay.run_cron_job(&job_id)?;
            println!("job_id: {job_id}");
            println!("status: triggered");
        }
    }
    Ok(())
}

fn sessions() -> Result<()> {
    let config = load_initialized_config()?;
    let sessions = open_relay(&config)?.sessions();
    if sessions.is_empty() {
        println!("no sessions");
    }
    for session in sessions {
        println!(
            "{} | {} | {} | {} tokens",
            session.display_name.as_deref().unwrap_or(&session.key),
            session.kind,
            session.model.as_deref().unwrap_or("-"),
            session.tokens_used
        );
    }
    Ok(())
}

fn status() -> Result<()> {
    let config = load_initialized_config()?;
    let report = open_relay(&config)?.status();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn spawn(task: &str, label: &str) -> Result<()> {
    let config = load_initialized_config()?;
    let spawned = open_relay(&config)?.spawn_session(task, label)?;
    println!(
        "session_key: {}",
        spawned.session_key.as_deref().unwrap_or("<unknown>")
    );
    println!("agent_id: {}", spawned.agent_id.as_deref().unwrap_or("<unknown>"));
    Ok(())
}

fn watch(tab: Tab, server: Option<String>, once: bool) -> Result<()> {
    let config = load_initialized_config()?;
    let server = server.unwrap_or_else(|| format!("http://{}", config.bind_addr));
    let client = ApiClient::new(&server)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        if once {
            return print_state(tab, &tab.fetch(&client).await);
        }
        let (store, poller) = watch_tab(client, tab, &config.poll);
        let mut updates = store.subscribe();
        println!(
            "watching {} on {server} every {}s",
            tab.as_str(),
            tab.poll_interval(&config.poll).as_secs()
        );
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            print_state(tab, &state)?;
        }
        poller.shutdown().await;
        Ok(())
    })
}

fn print_state(tab: Tab, state: &ViewState<serde_json::Value>) -> Result<()> {
    match state {
        ViewState::Loading => println!("[{}] loading", tab.as_str()),
        ViewState::Empty => println!("[{}] nothing to show", tab.as_str()),
        ViewState::Error(message) => println!("[{}] error: {message}", tab.as_str()),
        ViewState::Ready(data) => println!(
            "[{}]\n{}",
            tab.as_str(),
            serde_json::to_string_pretty(data)?
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_watch_with_tab_name() {
        let cli = Cli::try_parse_from(["mission", "watch", "fleet", "--server", "http://h:1"])
            .expect("parse");
        match cli.command {
            Some(Command::Watch { tab, server, once }) => {
                assert_eq!(tab, Tab::Fleet);
                assert_eq!(server.as_deref(), Some("http://h:1"));
                assert!(!once);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["mission", "watch", "nowhere"]).is_err());
    }

    #[test]
    fn parses_task_move_status() {
        let cli = Cli::try_parse_from(["mission", "tasks", "move", "t1", "in-progress"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Some(Command::Tasks {
                command: TaskCommand::Move {
                    status: TaskStatus::InProgress,
                    ..
                }
            })
        ));
    }

    #[test]
    fn task_add_collects_repeated_tags() {
        let cli = Cli::try_parse_from([
            "mission", "tasks", "add", "Write report", "--tag", "q3", "--tag", "docs",
        ])
        .expect("parse");
        let Some(Command::Tasks {
            command: TaskCommand::Add { title, tags, .. },
        }) = cli.command
        else {
            panic!("expected tasks add");
        };
        assert_eq!(title, "Write report");
        assert_eq!(tags, vec!["q3", "docs"]);
    }
}
