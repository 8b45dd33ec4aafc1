//! The per-invocation response accumulator.
//!
//! A [`Response`] buffers console output (re-emitting it live unless
//! silenced), carries the structured data payload, and tracks the terminal
//! success/error state. [`Response::finalize`] freezes it into the
//! JSON-serializable [`ResponseSnapshot`] returned from every invocation.

use std::io::Write;

use serde::{Deserialize, Serialize};

use chassis_types::{ChassisError, ErrorRecord};

/// Rendering mode for an invocation's output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Human-oriented streaming output.
    #[default]
    Default,
    /// A single JSON document on stdout after execution.
    Json,
}

impl OutputFormat {
    /// Parse a caller-supplied format string.
    pub fn parse(raw: &str) -> Result<Self, ChassisError> {
        match raw {
            "default" => Ok(OutputFormat::Default),
            "json" => Ok(OutputFormat::Json),
            other => Err(ChassisError::Definition(format!(
                "unknown response format '{other}' (expected 'default' or 'json')"
            ))),
        }
    }
}

/// Which console stream a write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Description of a progress indicator. At most one is active per response.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSpec {
    /// Short label shown while the work is in flight.
    pub label: String,
}

impl ProgressSpec {
    /// Create a progress spec with the given label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// The frozen, wire-serializable form of a [`Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Process-style exit code: 0 on success, 1 on any failure.
    pub exit_code: i32,
    /// Summary message set by the handler or the framework.
    pub message: String,
    /// Structured data payload; `null` when the handler set none.
    pub data: serde_json::Value,
    /// Buffered standard output.
    pub stdout: String,
    /// Buffered standard error.
    pub stderr: String,
    /// The failure record, or `null` on success.
    pub error: Option<ErrorRecord>,
}

/// Accumulates console output, structured data, and the terminal state of
/// one command invocation.
///
/// The processor owns the response it constructs for each `invoke` call;
/// handlers borrow it for the duration of their `process`. Once finalized,
/// further mutations are rejected (logged at warn, otherwise ignored).
#[derive(Debug)]
pub struct Response {
    format: OutputFormat,
    silent: bool,
    stdout: String,
    stderr: String,
    data: Option<serde_json::Value>,
    message: String,
    progress: Option<ProgressSpec>,
    success: bool,
    error: Option<ErrorRecord>,
    exit_code: Option<i32>,
    finalized: bool,
}

impl Response {
    /// Create a fresh response for one invocation.
    pub fn new(format: OutputFormat, silent: bool) -> Self {
        Self {
            format,
            silent,
            stdout: String::new(),
            stderr: String::new(),
            data: None,
            message: String::new(),
            progress: None,
            success: true,
            error: None,
            exit_code: None,
            finalized: false,
        }
    }

    /// Create a response seeded with already-accumulated console output.
    ///
    /// Used between chained handler steps: the seeded content is carried in
    /// the buffers but is not re-emitted live (it already was).
    pub fn seeded(
        format: OutputFormat,
        silent: bool,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        let mut response = Self::new(format, silent);
        response.stdout = stdout.into();
        response.stderr = stderr.into();
        response
    }

    /// The rendering mode this response was constructed with.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Whether live console emission is suppressed.
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Restore the invocation-level silence on a chain step's response
    /// before finalizing it; the step's own live emission (or suppression)
    /// already happened.
    pub(crate) fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Whether the response has been frozen.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// The buffered stdout content so far.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// The buffered stderr content so far.
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// The structured data payload, if one was set.
    pub fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }

    fn reject_if_finalized(&self, operation: &str) -> bool {
        if self.finalized {
            tracing::warn!(operation, "response already finalized; mutation ignored");
        }
        self.finalized
    }

    /// Append text to a console stream, re-emitting it live unless silent.
    ///
    /// Content is appended verbatim; callers supply their own newlines. In
    /// JSON format nothing is emitted live (the buffered content ships in
    /// the final document), matching the ordering guarantee that the JSON
    /// document is never interleaved with stream output.
    pub fn log(&mut self, stream: Stream, text: impl AsRef<str>) {
        if self.reject_if_finalized("log") {
            return;
        }
        let text = text.as_ref();
        match stream {
            Stream::Stdout => self.stdout.push_str(text),
            Stream::Stderr => self.stderr.push_str(text),
        }
        if !self.silent && self.format == OutputFormat::Default {
            match stream {
                Stream::Stdout => {
                    let mut out = std::io::stdout().lock();
                    let _ = out.write_all(text.as_bytes());
                    let _ = out.flush();
                }
                Stream::Stderr => {
                    let mut err = std::io::stderr().lock();
                    let _ = err.write_all(text.as_bytes());
                    let _ = err.flush();
                }
            }
        }
    }

    /// Set the structured data payload.
    pub fn set_data(&mut self, data: serde_json::Value) {
        if self.reject_if_finalized("set_data") {
            return;
        }
        self.data = Some(data);
    }

    /// Set the summary message.
    pub fn set_message(&mut self, message: impl Into<String>) {
        if self.reject_if_finalized("set_message") {
            return;
        }
        self.message = message.into();
    }

    /// Begin a progress indicator. At most one may be active; a second
    /// begin is ignored with a warning.
    pub fn begin_progress(&mut self, spec: ProgressSpec) {
        if self.reject_if_finalized("begin_progress") {
            return;
        }
        if self.progress.is_some() {
            tracing::warn!(label = %spec.label, "progress indicator already active; ignored");
            return;
        }
        if !self.silent && self.format == OutputFormat::Default {
            let mut err = std::io::stderr().lock();
            let _ = write!(err, "{}...", spec.label);
            let _ = err.flush();
        }
        self.progress = Some(spec);
    }

    /// End the active progress indicator.
    pub fn end_progress(&mut self) {
        if self.reject_if_finalized("end_progress") {
            return;
        }
        if self.progress.take().is_none() {
            tracing::warn!("no progress indicator active; end ignored");
            return;
        }
        if !self.silent && self.format == OutputFormat::Default {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, " done");
            let _ = err.flush();
        }
    }

    /// Mark the invocation successful.
    pub fn succeeded(&mut self) {
        if self.reject_if_finalized("succeeded") {
            return;
        }
        self.success = true;
        self.error = None;
    }

    /// Mark the invocation failed without attaching an error record.
    pub fn failed(&mut self) {
        if self.reject_if_finalized("failed") {
            return;
        }
        self.success = false;
    }

    /// Attach a failure record; implies [`Response::failed`].
    pub fn set_error(&mut self, error: ErrorRecord) {
        if self.reject_if_finalized("set_error") {
            return;
        }
        self.success = false;
        self.error = Some(error);
    }

    /// The failure record, if one is attached.
    pub fn error(&self) -> Option<&ErrorRecord> {
        self.error.as_ref()
    }

    /// Whether the response is currently in the failed state.
    pub fn is_failed(&self) -> bool {
        !self.success
    }

    /// Override the exit code recorded in the snapshot.
    pub fn set_exit_code(&mut self, code: i32) {
        if self.reject_if_finalized("set_exit_code") {
            return;
        }
        self.exit_code = Some(code);
    }

    /// Freeze the response and produce its snapshot.
    ///
    /// Exactly one terminal state holds: `success` is true with no error, or
    /// an error record is attached and `success` is false. The exit code
    /// defaults to 0 on success and 1 on failure when not overridden.
    /// Finalizing twice yields the same snapshot.
    pub fn finalize(&mut self) -> ResponseSnapshot {
        if !self.finalized {
            if let Some(progress) = self.progress.take() {
                tracing::warn!(label = %progress.label, "progress still active at finalize");
            }
            if self.error.is_some() {
                self.success = false;
            }
            if self.exit_code.is_none() {
                self.exit_code = Some(if self.success {
                    super::processor::EXIT_SUCCESS
                } else {
                    super::processor::EXIT_FAILURE
                });
            }
            self.finalized = true;
        }
        ResponseSnapshot {
            success: self.success,
            exit_code: self.exit_code.unwrap_or(super::processor::EXIT_FAILURE),
            message: self.message.clone(),
            data: self.data.clone().unwrap_or(serde_json::Value::Null),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            error: self.error.clone(),
        }
    }

    /// Emit the finalized snapshot to stdout as a single JSON document.
    ///
    /// Valid only in JSON format; in default format the call is ignored
    /// with a warning. Silent responses produce no output but still return
    /// the snapshot to the caller.
    pub fn write_json(&mut self) -> ResponseSnapshot {
        let snapshot = self.finalize();
        if self.format != OutputFormat::Json {
            tracing::warn!("write_json called on a default-format response; ignored");
            return snapshot;
        }
        if !self.silent {
            match serde_json::to_string_pretty(&snapshot) {
                Ok(doc) => {
                    let mut out = std::io::stdout().lock();
                    let _ = writeln!(out, "{doc}");
                    let _ = out.flush();
                }
                Err(e) => tracing::warn!(error = %e, "failed to serialize response snapshot"),
            }
        }
        snapshot
    }
}
