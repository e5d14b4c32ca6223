//! Internal utilities for streaming command output to logs.
//!
//! This module handles reading from stdout/stderr pipes, logging the output
//! in real-time during command execution and keeping a copy of it for the
//! caller.

use std::io::{BufRead, BufReader, Read};

/// Type of output stream for logging purposes.
#[derive(Clone, Copy)]
pub(super) enum StreamType {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Extracts a human-readable message from a thread panic.
pub(super) fn panic_message(err: &(dyn std::any::Any + Send)) -> &str {
    err.downcast_ref::<&str>()
        .copied()
        .or_else(|| err.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic")
}

/// Reads from a pipe, logs each line in real-time and returns everything read.
///
/// - stdout is logged at INFO level, stderr at WARN level, so vagrant and
///   scheduler progress is visible while a long step runs
/// - Binary data uses lossy UTF-8 conversion
/// - I/O errors stop reading but don't fail command execution
///   (command success is determined by exit status)
/// - `None` pipe logs an error and returns an empty string
pub(super) fn read_pipe_to_log<R: Read>(pipe: Option<R>, stream_type: StreamType) -> String {
    let Some(pipe) = pipe else {
        tracing::error!(
            stream = %stream_type,
            "pipe was None (unexpected: Stdio::piped() was set), no output will be captured"
        );
        return String::new();
    };

    let mut reader = BufReader::new(pipe);
    let mut line_buf = Vec::new();
    let mut captured = String::new();

    loop {
        line_buf.clear();
        match reader.read_until(b'\n', &mut line_buf) {
            Ok(0) => break,
            Ok(_) => {
                let content = line_buf.strip_suffix(b"\n").unwrap_or(&line_buf);
                let text = String::from_utf8_lossy(content);
                let trimmed = text.trim_end_matches('\r');
                log_line(trimmed, stream_type);
                captured.push_str(trimmed);
                captured.push('\n');
            }
            Err(e) => {
                tracing::error!(stream = %stream_type, error = %e, "I/O error, stopping read");
                break;
            }
        }
    }

    captured
}

fn log_line(line: &str, stream_type: StreamType) {
    match stream_type {
        StreamType::Stdout => tracing::info!(stream = %stream_type, "{}", line),
        StreamType::Stderr => tracing::warn!(stream = %stream_type, "{}", line),
    }
}
