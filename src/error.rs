//! Domain-specific error types for spoon-snapshot.
//!
//! This module defines `SnapshotError`, a `thiserror`-based enum covering
//! every way a snapshot run can fail. Public API functions return
//! `Result<T, SnapshotError>` so callers can match on the failed stage,
//! while the process-launcher boundary continues to use `anyhow::Result`.
//!
//! `SnapshotError` implements `Into<anyhow::Error>`, so the `?` operator
//! converts it automatically inside the binary.

use std::io;

/// Formats an IO error kind into a human-readable message.
///
/// Provides consistent messages for common IO error kinds (e.g.,
/// "I/O error: not found") instead of the OS-level messages. For other
/// kinds, falls back to the OS-level error message.
pub(crate) fn io_error_kind_message(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "I/O error: not found".to_string(),
        io::ErrorKind::PermissionDenied => "I/O error: permission denied".to_string(),
        io::ErrorKind::IsADirectory => "I/O error: is a directory".to_string(),
        _ => format!("I/O error: {}", err),
    }
}

/// The workflow stage that involves the virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    /// `vagrant up` and everything the VM runs while provisioning.
    Provisioning,
    /// Importing the captured image into the local image registry.
    Import,
    /// `vagrant destroy`.
    Teardown,
}

/// Domain-specific error type for spoon-snapshot.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SnapshotError {
    /// Invalid or missing settings, detected before any VM is created.
    #[error("configuration error: {0}")]
    Config(String),

    /// A directly launched command failed (non-zero exit, spawn failure, etc.).
    #[error("command execution failed: {command}: {status}")]
    Execution {
        /// The command line that was executed.
        command: String,
        /// Exit code or a description of the internal failure.
        status: String,
    },

    /// A command run through the task scheduler failed, timed out, or the
    /// scheduler itself could not register, start, query or remove the task.
    #[error("scheduled task '{task}' failed: {status}")]
    Task {
        /// Scheduler name of the task.
        task: String,
        /// Exit diagnostics, including the tail of the task's log when available.
        status: String,
    },

    /// `vagrant up` failed. Teardown has already been attempted.
    #[error("provisioning failed")]
    Provisioning(#[source] Box<SnapshotError>),

    /// The VM was provisioned but the captured image could not be imported.
    #[error("import failed")]
    Import(#[source] Box<SnapshotError>),

    /// `vagrant destroy` failed.
    ///
    /// When the destroy followed a failed import, that import error is kept
    /// in `superseded` so both failures are reported.
    #[error(
        "teardown failed, the virtual machine may have to be removed from VirtualBox manually{}",
        superseded_suffix(.superseded)
    )]
    Teardown {
        #[source]
        source: Box<SnapshotError>,
        superseded: Option<Box<SnapshotError>>,
    },

    /// An I/O operation failed with contextual information.
    #[error("{context}: {message}")]
    Io {
        /// What was being done when the error occurred, usually including a path.
        context: String,
        /// Message derived from [`io_error_kind_message`].
        message: String,
        #[source]
        source: io::Error,
    },
}

fn superseded_suffix(superseded: &Option<Box<SnapshotError>>) -> String {
    match superseded {
        Some(err) => format!(" (after {})", error_chain(&**err)),
        None => String::new(),
    }
}

/// Renders an error and all of its sources as `a: b: c`.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

impl SnapshotError {
    /// Creates an `Io` variant with the `message` field derived from `source`.
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: io_error_kind_message(&source),
            source,
        }
    }

    /// Returns the VM stage this error belongs to, if any.
    ///
    /// Errors raised before provisioning have no stage. Missing host inputs
    /// are reported as `Config`; an `Io` error without a stage comes from
    /// preparing the working directory or cleaning up.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Provisioning(_) => Some(Stage::Provisioning),
            Self::Import(_) => Some(Stage::Import),
            Self::Teardown { .. } => Some(Stage::Teardown),
            _ => None,
        }
    }
}
