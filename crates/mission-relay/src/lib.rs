use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use mission_common::RelayConfig;
use mission_common::validate::{ValidationError, argument_text, identifier, limits};
use mission_core::{CronJob, Session};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    InvalidArgument(#[from] ValidationError),
    #[error("relay is misconfigured: {0}")]
    Config(String),
    #[error("failed to spawn '{program}': {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{op} timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },
    #[error("{op} exited with status {code:?}: {stderr}")]
    NonZeroExit {
        op: &'static str,
        code: Option<i32>,
        stderr: String,
    },
    #[error("{op} produced unparseable output: {source}")]
    Parse {
        op: &'static str,
        source: serde_json::Error,
    },
}

/// The fixed set of subcommands the relay will ever run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOp {
    CronList,
    CronRun { job_id: String },
    SessionsList,
    SessionsSpawn { task: String, label: String },
    Status,
}

impl RelayOp {
    /// Validates the job id against the identifier allow-pattern.
    pub fn cron_run(job_id: &str) -> Result<Self, RelayError> {
        let job_id = identifier("jobId", job_id)?;
        Ok(Self::CronRun {
            job_id: job_id.to_string(),
        })
    }

    /// Caps both texts and rejects values that would parse as options.
    pub fn spawn(task: &str, label: &str) -> Result<Self, RelayError> {
        Ok(Self::SessionsSpawn {
            task: argument_text("task", task, limits::SPAWN_TASK)?,
            label: argument_text("label", label, limits::SPAWN_LABEL)?,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CronList => "cron.list",
            Self::CronRun { .. } => "cron.run",
            Self::SessionsList => "sessions.list",
            Self::SessionsSpawn { .. } => "sessions.spawn",
            Self::Status => "status",
        }
    }

    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::CronRun { .. } | Self::SessionsSpawn { .. })
    }

    fn args(&self, agent_id: &str) -> Vec<String> {
        let fixed = |parts: &[&str]| parts.iter().map(|p| p.to_string()).collect::<Vec<_>>();
        match self {
            Self::CronList => fixed(&["cron", "list", "--json"]),
            Self::CronRun { job_id } => {
                let mut args = fixed(&["cron", "run"]);
                args.push(job_id.clone());
                args
            }
            Self::SessionsList => fixed(&["sessions", "list", "--json"]),
            Self::SessionsSpawn { task, label } => {
                let mut args = fixed(&["sessions", "spawn"]);
                args.push(task.clone());
                args.push("--label".to_string());
                args.push(label.clone());
                args.push("--agent-id".to_string());
                args.push(agent_id.to_string());
                args.push("--json".to_string());
                args
            }
            Self::Status => fixed(&["status", "--json"]),
        }
    }
}

/// A fully resolved argument vector. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

pub trait CommandRunner: Send + Sync {
    /// `Ok(None)` means the deadline passed, either with the child still
    /// running (it is killed) or with its output pipes still held open.
    fn run(&self, invocation: &Invocation) -> Result<Option<CommandOutput>, io::Error>;
}

/// Runs the external program with `std::process::Command`.
pub struct ProcessRunner;

fn drain(mut source: impl Read + Send + 'static, limit: usize) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut kept = Vec::new();
        let _ = (&mut source).take(limit as u64).read_to_end(&mut kept);
        // Keep reading so the child never blocks on a full pipe.
        let _ = io::copy(&mut source, &mut io::sink());
        let _ = tx.send(kept);
    });
    rx
}

/// Waits for a drained pipe until `deadline`. A grandchild that inherited the
/// pipe can hold it open after the child exits, so this is bounded too.
fn collect(pipe: Option<Receiver<Vec<u8>>>, deadline: Instant) -> Option<Vec<u8>> {
    let Some(rx) = pipe else {
        return Some(Vec::new());
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(bytes) => Some(bytes),
        Err(RecvTimeoutError::Disconnected) => Some(Vec::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<Option<CommandOutput>, io::Error> {
        let deadline = Instant::now() + invocation.timeout;
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().map(|s| drain(s, invocation.max_output_bytes));
        let stderr = child.stderr.take().map(|s| drain(s, 8 * 1024));

        let Some(status) = child.wait_timeout(invocation.timeout)? else {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        };

        let (Some(stdout), Some(stderr)) = (collect(stdout, deadline), collect(stderr, deadline))
        else {
            debug!(program = %invocation.program, "output still held open at deadline");
            return Ok(None);
        };
        Ok(Some(CommandOutput {
            code: status.code(),
            success: status.success(),
            stdout,
            stderr,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnedSession {
    pub session_key: Option<String>,
    pub agent_id: Option<String>,
}

/// Invokes the external agent-management tool for a fixed set of operations.
#[derive(Clone)]
pub struct CliRelay {
    program: String,
    prefix_args: Vec<String>,
    agent_id: String,
    timeout: Duration,
    spawn_timeout: Duration,
    max_output_bytes: usize,
    runner: Arc<dyn CommandRunner>,
}

impl CliRelay {
    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        let (program, prefix_args) = config
            .command_prefix()
            .map_err(|err| RelayError::Config(err.to_string()))?;
        let agent_id = identifier("agent_id", &config.agent_id)?.to_string();
        Ok(Self {
            program,
            prefix_args,
            agent_id,
            timeout: Duration::from_millis(config.timeout_ms),
            spawn_timeout: Duration::from_millis(config.spawn_timeout_ms),
            max_output_bytes: config.max_output_bytes,
            runner: Arc::new(ProcessRunner),
        })
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn invocation(&self, op: &RelayOp) -> Invocation {
        let mut args = self.prefix_args.clone();
        args.extend(op.args(&self.agent_id));
        let timeout = match op {
            RelayOp::SessionsSpawn { .. } => self.spawn_timeout,
            _ => self.timeout,
        };
        Invocation {
            program: self.program.clone(),
            args,
            timeout,
            max_output_bytes: self.max_output_bytes,
        }
    }

    /// Runs `op` and requires a zero exit status.
    pub fn execute(&self, op: &RelayOp) -> Result<CommandOutput, RelayError> {
        let invocation = self.invocation(op);
        debug!(op = op.name(), program = %invocation.program, "relay invocation");
        let output = self
            .runner
            .run(&invocation)
            .map_err(|source| RelayError::Spawn {
                program: invocation.program.clone(),
                source,
            })?
            .ok_or(RelayError::Timeout {
                op: op.name(),
                timeout_ms: invocation.timeout.as_millis() as u64,
            })?;
        if !output.success {
            return Err(RelayError::NonZeroExit {
                op: op.name(),
                code: output.code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    pub fn invoke_json(&self, op: &RelayOp) -> Result<Value, RelayError> {
        let output = self.execute(op)?;
        serde_json::from_slice(&output.stdout).map_err(|source| RelayError::Parse {
            op: op.name(),
            source,
        })
    }

    fn list<T: DeserializeOwned>(&self, op: RelayOp, field: &str) -> Vec<T> {
        match self.invoke_json(&op) {
            Ok(value) => parse_list(value, field),
            Err(err) => {
                warn!(op = op.name(), error = %err, "relay list failed, using empty fallback");
                Vec::new()
            }
        }
    }

    /// Falls back to an empty list on any failure.
    pub fn cron_jobs(&self) -> Vec<CronJob> {
        self.list(RelayOp::CronList, "jobs")
    }

    /// Falls back to an empty list on any failure.
    pub fn sessions(&self) -> Vec<Session> {
        self.list(RelayOp::SessionsList, "sessions")
    }

    /// Falls back to `{}` on any failure.
    pub fn status(&self) -> Value {
        match self.invoke_json(&RelayOp::Status) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "relay status failed, using empty fallback");
                Value::Object(Map::new())
            }
        }
    }

    /// Validates before anything is spawned.
    pub fn run_cron_job(&self, job_id: &str) -> Result<(), RelayError> {
        let op = RelayOp::cron_run(job_id)?;
        self.execute(&op).map(|_| ())
    }

    pub fn spawn_session(&self, task: &str, label: &str) -> Result<SpawnedSession, RelayError> {
        let op = RelayOp::spawn(task, label)?;
        let value = self.invoke_json(&op)?;
        let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
        Ok(SpawnedSession {
            session_key: field("sessionKey"),
            agent_id: field("agentId"),
        })
    }
}

/// Accepts a bare array or an object wrapping the array under `field`;
/// entries that do not decode are skipped.
fn parse_list<T: DeserializeOwned>(value: Value, field: &str) -> Vec<T> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(field) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                debug!(error = %err, "skipping undecodable relay entry");
                None
            }
        })
        .collect()
}
