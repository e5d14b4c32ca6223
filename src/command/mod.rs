//! Immutable descriptions of the external programs a snapshot run invokes.
//!
//! Every concrete command has a builder that checks its required fields and
//! produces a [`Command`]: a program plus a fixed argument list. A `Command`
//! can be executed directly through a [`CommandExecutor`] or rendered as a
//! single Windows command line for scripts and scheduled tasks.

mod args;
pub mod studio;
pub mod turbo;
pub mod vagrant;

use camino::Utf8Path;

pub use args::{CommandArgsBuilder, FlagValueStyle};
pub use studio::{StudioBuildCommand, StudioSnapshotCommand};
pub use turbo::{ImportCommand, InspectCommand};
pub use vagrant::VagrantCommand;

use crate::error::SnapshotError;
use crate::executor::{CommandExecutor, CommandSpec, ExecutionResult};

/// One validated external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: String,
    args: Vec<String>,
}

impl Command {
    pub(crate) fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Converts this command into a launcher specification.
    pub fn to_spec(&self) -> CommandSpec {
        CommandSpec::new(self.program.clone(), self.args.clone())
    }

    /// Renders the program and arguments as one Windows command line.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote_windows_arg)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs the command synchronously and fails on a non-zero exit status.
    pub fn run(
        &self,
        executor: &dyn CommandExecutor,
        cwd: Option<&Utf8Path>,
    ) -> Result<ExecutionResult, SnapshotError> {
        let mut spec = self.to_spec();
        if let Some(cwd) = cwd {
            spec = spec.with_cwd(cwd.to_owned());
        }

        tracing::debug!("running: {}", self.command_line());
        let result = executor.execute(&spec).map_err(|e| match e.downcast::<SnapshotError>() {
            Ok(typed) => typed,
            Err(other) => SnapshotError::Execution {
                command: self.command_line(),
                status: format!("{:#}", other),
            },
        })?;

        if !result.success() {
            let status = match result.code() {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            };
            return Err(SnapshotError::Execution {
                command: self.command_line(),
                status,
            });
        }

        Ok(result)
    }
}

/// Quotes one argument following the Microsoft C runtime parsing rules.
///
/// Arguments without whitespace or quotes are returned unchanged. Otherwise
/// the argument is wrapped in double quotes, embedded quotes are escaped and
/// backslashes that precede a quote (or the closing quote) are doubled.
pub fn quote_windows_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '\n', '"']) {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat_n('\\', backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.extend(std::iter::repeat_n('\\', backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    quoted.extend(std::iter::repeat_n('\\', backslashes * 2));
    quoted.push('"');
    quoted
}

/// Returns a configuration error naming a missing builder field.
pub(crate) fn require<T>(value: Option<T>, field: &str) -> Result<T, SnapshotError> {
    value.ok_or_else(|| SnapshotError::Config(format!("{} must be present", field)))
}
