//! Process-launcher abstraction for spoon-snapshot.
//!
//! This module provides:
//! - [`CommandSpec`]: Specification for commands to execute
//! - [`ExecutionResult`]: Result of command execution
//! - [`CommandExecutor`]: Trait for command execution strategies
//! - [`RealCommandExecutor`]: Production implementation using `std::process::Command`

mod pipe;
mod real;

use std::process::ExitStatus;

use anyhow::Result;
use camino::Utf8PathBuf;

pub use real::RealCommandExecutor;

/// Formats string arguments into a space-separated, debug-quoted string.
///
/// Used by error messages and dry-run output to consistently format
/// command arguments (e.g., `"import" "svm" "C:\\image.svm"`).
pub(crate) fn format_command_args(args: &[String]) -> String {
    args.iter()
        .map(|a| format!("{:?}", a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Specification for a command to be executed
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The command to execute (e.g., "schtasks")
    pub command: String,
    /// Command arguments
    pub args: Vec<String>,
    /// Working directory (optional, defaults to current directory)
    pub cwd: Option<Utf8PathBuf>,
    /// Environment variables to set (in addition to inherited environment)
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Creates a new CommandSpec with command and args
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Sets the working directory
    #[must_use]
    pub fn with_cwd(mut self, cwd: Utf8PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    /// Adds an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Adds multiple environment variables.
    #[must_use]
    pub fn with_envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(envs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Renders the command and its arguments for log and error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, format_command_args(&self.args))
        }
    }
}

/// Result of command execution
#[derive(Debug, Default)]
pub struct ExecutionResult {
    /// Exit status of the command (None in dry-run mode)
    pub status: Option<ExitStatus>,
    /// Everything the command wrote to stdout, lossily decoded as UTF-8.
    ///
    /// The same lines are also streamed to the log while the command runs.
    pub stdout: String,
}

impl ExecutionResult {
    /// Returns true if the command executed successfully.
    ///
    /// In dry-run mode (status is None), this always returns true.
    pub fn success(&self) -> bool {
        self.status.is_none_or(|s| s.success())
    }

    /// Returns the exit code if available
    pub fn code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    /// Returns true if the command was not actually run.
    pub fn is_dry_run(&self) -> bool {
        self.status.is_none()
    }
}

/// Trait for command execution.
///
/// Implementations must be `Send + Sync` so one executor can be shared by
/// the task runner, the registry check and the import step through
/// `Arc<dyn CommandExecutor>`.
pub trait CommandExecutor: Send + Sync {
    /// Executes a command with the given specification.
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_arguments() {
        let spec = CommandSpec::new("schtasks", vec!["/Run".into(), "/TN".into(), "app - up".into()]);
        assert_eq!(spec.display(), r#"schtasks "/Run" "/TN" "app - up""#);
    }

    #[test]
    fn test_display_without_arguments() {
        let spec = CommandSpec::new("vagrant", Vec::new());
        assert_eq!(spec.display(), "vagrant");
    }

    #[test]
    fn test_builder_methods_accumulate() {
        let spec = CommandSpec::new("turbo", vec!["version".into()])
            .with_cwd(Utf8PathBuf::from("/tmp/work"))
            .with_env("A", "1")
            .with_envs([("B", "2"), ("C", "3")]);
        assert_eq!(spec.cwd.as_deref(), Some(camino::Utf8Path::new("/tmp/work")));
        assert_eq!(spec.env.len(), 3);
        assert_eq!(spec.env[2], ("C".to_string(), "3".to_string()));
    }

    #[test]
    fn test_dry_run_result_is_success() {
        let result = ExecutionResult::default();
        assert!(result.success());
        assert!(result.is_dry_run());
        assert_eq!(result.code(), None);
    }
}
