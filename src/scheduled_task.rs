//! Running commands through the Windows Task Scheduler.
//!
//! Vagrant and VirtualBox must run in the interactive session of a user with
//! the right privileges, which the build agent's service account does not
//! have. Instead of spawning the command directly, [`ScheduledTaskRunner`]
//! registers it as an ad-hoc scheduled task, starts it, polls the scheduler
//! until the task is no longer running, reads its exit code and removes the
//! task again.

use std::fs;
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::command::{Command, quote_windows_arg};
use crate::error::{SnapshotError, error_chain};
use crate::executor::{CommandExecutor, ExecutionResult};

const SCHTASKS: &str = "schtasks";

/// `Last Result` while the task is still running (`0x41301`).
const SCHED_S_TASK_RUNNING: i64 = 267009;
/// `Last Result` before the task has ever run (`0x41303`).
const SCHED_S_TASK_HAS_NOT_RUN: i64 = 267011;

/// Number of log lines attached to a failure.
const LOG_TAIL_LINES: usize = 20;

static INVALID_TASK_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|]+"#).expect("valid regex"));
static NON_WORD_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid regex"));

/// Runs a named command line to completion in `working_dir`.
///
/// Implementations block until the command reaches a terminal state and
/// report any non-success outcome as an error.
pub trait TaskRunner {
    fn run(
        &self,
        task_name: &str,
        command_line: &str,
        working_dir: &Utf8Path,
    ) -> Result<(), SnapshotError>;
}

/// Polling behaviour of a [`ScheduledTaskRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Delay between two status queries.
    pub poll_interval: Duration,
    /// Maximum time to wait for a task; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Account the task runs as; defaults to the current user.
    pub run_as_user: Option<String>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            timeout: Some(Duration::from_secs(4 * 60 * 60)),
            run_as_user: None,
        }
    }
}

/// Scheduler state of a task as reported by `schtasks /Query /FO LIST /V`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskState {
    pub running: bool,
    pub last_result: Option<i64>,
}

impl TaskState {
    /// Returns the exit code once the task has finished.
    pub fn exit_code(&self) -> Option<i64> {
        if self.running {
            return None;
        }
        match self.last_result {
            Some(SCHED_S_TASK_RUNNING) | Some(SCHED_S_TASK_HAS_NOT_RUN) | None => None,
            Some(code) => Some(code),
        }
    }
}

/// Parses the first `Status` and `Last Result` fields of a verbose list query.
pub fn parse_task_state(output: &str) -> Option<TaskState> {
    let mut status = None;
    let mut last_result = None;
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Status" if status.is_none() => status = Some(value.to_string()),
            "Last Result" if last_result.is_none() => last_result = value.parse::<i64>().ok(),
            _ => {}
        }
    }

    let status = status?;
    Some(TaskState {
        running: matches!(status.as_str(), "Running" | "Queued"),
        last_result,
    })
}

/// Makes a task name acceptable to the scheduler.
pub fn sanitize_task_name(task_name: &str) -> String {
    INVALID_TASK_NAME_CHARS
        .replace_all(task_name.trim(), "_")
        .into_owned()
}

/// [`TaskRunner`] backed by `schtasks.exe`.
pub struct ScheduledTaskRunner {
    executor: Arc<dyn CommandExecutor>,
    options: SchedulerOptions,
}

impl ScheduledTaskRunner {
    /// Creates a runner that talks to the scheduler through `executor`.
    ///
    /// The wrapper script and output log of each task are written to the
    /// task's working directory and removed once the task is gone.
    pub fn new(executor: Arc<dyn CommandExecutor>, options: SchedulerOptions) -> Self {
        Self { executor, options }
    }

    fn schtasks(&self, task: &str, args: &[&str]) -> Result<ExecutionResult, SnapshotError> {
        let command = Command::new(SCHTASKS, args.iter().map(|a| a.to_string()).collect());
        command
            .run(self.executor.as_ref(), None)
            .map_err(|e| SnapshotError::Task {
                task: task.to_string(),
                status: error_chain(&e),
            })
    }

    fn write_wrapper(
        &self,
        task: &str,
        working_dir: &Utf8Path,
        wrapper: &Utf8Path,
        log: &Utf8Path,
        command_line: &str,
    ) -> Result<(), SnapshotError> {
        let mut script = [
            "@echo off".to_string(),
            format!("cd /d {}", quote_windows_arg(working_dir.as_str())),
            format!("{} > {} 2>&1", command_line, quote_windows_arg(log.as_str())),
            "exit /b %ERRORLEVEL%".to_string(),
        ]
        .join("\r\n");
        script.push_str("\r\n");
        fs::write(wrapper, script).map_err(|e| SnapshotError::Task {
            task: task.to_string(),
            status: error_chain(&SnapshotError::io(format!("failed to write {}", wrapper), e)),
        })
    }

    fn register(&self, task: &str, wrapper: &Utf8Path) -> Result<(), SnapshotError> {
        let action = quote_windows_arg(wrapper.as_str());
        let mut args = vec![
            "/Create",
            "/TN",
            task,
            "/TR",
            action.as_str(),
            "/SC",
            "ONCE",
            "/ST",
            "00:00",
            "/RL",
            "HIGHEST",
            "/F",
        ];
        if let Some(user) = &self.options.run_as_user {
            args.extend(["/RU", user.as_str(), "/IT"]);
        }
        self.schtasks(task, &args).map(|_| ())
    }

    /// Polls the scheduler until the task finishes and returns its exit code.
    ///
    /// Returns `None` in dry-run mode, where no task was actually created.
    fn wait(&self, task: &str) -> Result<Option<i64>, SnapshotError> {
        let started = Instant::now();
        loop {
            let result = self.schtasks(task, &["/Query", "/TN", task, "/FO", "LIST", "/V"])?;
            if result.is_dry_run() {
                debug!("dry run: assuming scheduled task '{}' completed", task);
                return Ok(None);
            }

            let state = parse_task_state(&result.stdout).ok_or_else(|| SnapshotError::Task {
                task: task.to_string(),
                status: "could not read task status from scheduler output".to_string(),
            })?;
            if let Some(code) = state.exit_code() {
                debug!("scheduled task '{}' finished with exit code {}", task, code);
                return Ok(Some(code));
            }

            if let Some(timeout) = self.options.timeout
                && started.elapsed() >= timeout
            {
                return Err(SnapshotError::Task {
                    task: task.to_string(),
                    status: format!("timed out after {} s", timeout.as_secs()),
                });
            }
            thread::sleep(self.options.poll_interval);
        }
    }

    fn execute(
        &self,
        task: &str,
        working_dir: &Utf8Path,
        wrapper: &Utf8Path,
        log: &Utf8Path,
        command_line: &str,
    ) -> Result<(), SnapshotError> {
        self.write_wrapper(task, working_dir, wrapper, log, command_line)?;
        self.register(task, wrapper)?;

        let outcome = self
            .schtasks(task, &["/Run", "/TN", task])
            .and_then(|_| self.wait(task));
        let tail = read_log(log);

        let delete = self.schtasks(task, &["/Delete", "/TN", task, "/F"]);
        if let Err(e) = &delete {
            warn!("failed to remove scheduled task '{}': {}", task, error_chain(e));
        }

        match outcome? {
            Some(0) | None => Ok(()),
            Some(code) => {
                let mut status = format!("exit code {}", code);
                if !tail.is_empty() {
                    status.push_str("; last output:\n");
                    status.push_str(&tail.join("\n"));
                }
                Err(SnapshotError::Task {
                    task: task.to_string(),
                    status,
                })
            }
        }
    }
}

/// Logs the task's captured output and returns its last lines.
fn read_log(log: &Utf8Path) -> Vec<String> {
    let contents = match fs::read(log) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            debug!("no task log at {}: {}", log, e);
            return Vec::new();
        }
    };

    let lines: Vec<String> = contents
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect();
    for line in &lines {
        info!(stream = "task", "{}", line);
    }
    let skip = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines.into_iter().skip(skip).collect()
}

fn remove_quietly(path: &Utf8Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("failed to remove {}: {}", path, e);
    }
}

impl TaskRunner for ScheduledTaskRunner {
    fn run(
        &self,
        task_name: &str,
        command_line: &str,
        working_dir: &Utf8Path,
    ) -> Result<(), SnapshotError> {
        let task = sanitize_task_name(task_name);
        let stem = NON_WORD_CHARS.replace_all(&task, "-").into_owned();
        let wrapper = working_dir.join(format!("{}.cmd", stem));
        let log = working_dir.join(format!("{}.log", stem));

        info!("running scheduled task '{}': {}", task, command_line);
        let result = self.execute(&task, working_dir, &wrapper, &log, command_line);
        remove_quietly(&wrapper);
        remove_quietly(&log);

        match &result {
            Ok(()) => info!("scheduled task '{}' completed", task),
            Err(e) => debug!("scheduled task '{}' failed: {}", task, error_chain(e)),
        }
        result
    }
}
