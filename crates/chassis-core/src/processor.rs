//! The command processor pipeline.
//!
//! One processor is constructed per resolved command node. `invoke` runs the
//! ordered stages -- pre-check, validate, prepare, execute, finalize -- and
//! always returns a finalized snapshot: every recoverable failure becomes a
//! structured error on the response rather than a propagated error. A single
//! invocation is sequential; constructing multiple processors concurrently
//! is fine, sharing one across parallel invocations is not supported.

use std::sync::Arc;

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use chassis_types::{
    Arguments, ChassisError, CommandNode, ErrorRecord, FailureKind, FailureSubkind, NodeKind,
    PreparationError,
};

use crate::chain;
use crate::handler::{HandlerContext, HandlerFailure, HandlerRegistry};
use crate::help::{DefaultHelpGenerator, HelpGenerator};
use crate::profiles::{ProfileManagerFactory, ProfileMap};
use crate::response::{OutputFormat, Response, ResponseSnapshot, Stream};
use crate::validate::{self, ValidationReport};

/// Exit code recorded on successful invocations.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code recorded on any failed invocation.
pub const EXIT_FAILURE: i32 = 1;

/// Argument key stdin content is bound under when a command reads stdin.
pub const STDIN_ARG: &str = "stdin";

/// Parameters for one `invoke` call, supplied by the argv front-end.
pub struct InvokeParams {
    /// The parsed arguments for this invocation.
    pub arguments: Arguments,
    /// Suppress live console output and JSON emission.
    pub silent: bool,
    /// Requested response format (`"default"` or `"json"`); the processor's
    /// construction-time preference applies when absent.
    pub format: Option<String>,
    /// Cancellation signal observed between pipeline stages and chain steps.
    pub cancellation: Option<CancellationToken>,
}

impl InvokeParams {
    /// Invoke with the given arguments and all defaults.
    pub fn new(arguments: Arguments) -> Self {
        Self {
            arguments,
            silent: false,
            format: None,
            cancellation: None,
        }
    }

    /// Suppress live console output and JSON emission.
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Request a response format by name.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Attach a cancellation signal.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Executes invocations of one command node.
pub struct CommandProcessor {
    node: CommandNode,
    root: CommandNode,
    root_name: String,
    format: OutputFormat,
    profiles: ProfileManagerFactory,
    registry: Arc<HandlerRegistry>,
    help: Arc<dyn HelpGenerator>,
}

impl CommandProcessor {
    /// Construct a processor for one node of the tree.
    ///
    /// `root` is the full definition tree (handlers can inspect it);
    /// `root_name` is the host binary's name, used in help hints. The
    /// profile factory carries the active credential manager. Structural
    /// problems with the node -- a command without exactly one of a handler
    /// or a chain -- are caller setup bugs and fail construction rather
    /// than invocation.
    pub fn new(
        node: CommandNode,
        root: CommandNode,
        root_name: impl Into<String>,
        profiles: ProfileManagerFactory,
        registry: Arc<HandlerRegistry>,
    ) -> Result<Self, ChassisError> {
        if node.kind == NodeKind::Command {
            let has_handler = node.handler.is_some();
            let has_chain = !node.chained_handlers.is_empty();
            if has_handler == has_chain {
                return Err(ChassisError::Definition(format!(
                    "command '{}' must declare exactly one of a handler or a chain",
                    node.name
                )));
            }
        }
        Ok(Self {
            node,
            root,
            root_name: root_name.into(),
            format: OutputFormat::Default,
            profiles,
            registry,
            help: Arc::new(DefaultHelpGenerator),
        })
    }

    /// Set the construction-time format preference.
    #[must_use]
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Replace the help generator.
    #[must_use]
    pub fn with_help(mut self, help: Arc<dyn HelpGenerator>) -> Self {
        self.help = help;
        self
    }

    /// The node this processor executes.
    pub fn node(&self) -> &CommandNode {
        &self.node
    }

    /// Render help for the node into the response.
    pub fn help(&self, response: &mut Response) {
        let text = self.help.render(&self.node, &self.root_name);
        response.log(Stream::Stdout, text);
    }

    /// Validate arguments against the node.
    ///
    /// Returns the validator's report verbatim; rendering failures onto a
    /// response is the caller's job (`invoke` does it for the pipeline).
    pub fn validate(&self, arguments: &Arguments) -> ValidationReport {
        validate::validate(&self.node, arguments)
    }

    /// Run the full pipeline and return the finalized snapshot.
    pub async fn invoke(&self, params: InvokeParams) -> ResponseSnapshot {
        let InvokeParams {
            arguments,
            silent,
            format,
            cancellation,
        } = params;
        let cancellation = cancellation.unwrap_or_default();

        // Stage 1: pre-check parameters.
        let format = match format {
            None => self.format,
            Some(raw) => match OutputFormat::parse(&raw) {
                Ok(parsed) => parsed,
                Err(_) => {
                    let response = Response::new(self.format, silent);
                    let record = ErrorRecord::new(
                        FailureKind::Internal,
                        format!(
                            "unknown response format '{raw}' (expected 'default' or 'json')"
                        ),
                    )
                    .with_subkind(FailureSubkind::BadFormat);
                    return self.fail(response, record);
                }
            },
        };

        let response = Response::new(format, silent);

        if self.node.kind == NodeKind::Group {
            let record = ErrorRecord::new(
                FailureKind::Internal,
                format!(
                    "'{}' is a command group, not an executable command",
                    self.node.name
                ),
            )
            .with_subkind(FailureSubkind::Unknown);
            return self.fail(response, record);
        }

        // Stage 2 constructed the response above; stage 3: validate.
        tracing::debug!(command = %self.node.name, stage = "validate", "pipeline stage");
        if cancellation.is_cancelled() {
            return self.fail(response, cancelled_record());
        }
        match self.validate_stage(&arguments, response) {
            Ok(response) => {
                // Stage 4: prepare.
                tracing::debug!(command = %self.node.name, stage = "prepare", "pipeline stage");
                if cancellation.is_cancelled() {
                    return self.fail(response, cancelled_record());
                }
                self.prepare_and_execute(arguments, response, cancellation)
                    .await
            }
            Err(snapshot) => snapshot,
        }
    }

    /// Stage 3 body: on validation failure (or a validator panic) the
    /// returned `Err` carries the finalized failure snapshot.
    fn validate_stage(
        &self,
        arguments: &Arguments,
        mut response: Response,
    ) -> Result<Response, ResponseSnapshot> {
        let report = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            validate::validate(&self.node, arguments)
        })) {
            Ok(report) => report,
            Err(panic) => {
                let record =
                    ErrorRecord::new(FailureKind::Syntax, "Unexpected syntax validation error")
                        .with_cause(ErrorRecord::new(
                            FailureKind::Internal,
                            panic_message(panic),
                        ));
                return Err(self.fail(response, record));
            }
        };

        if report.valid {
            return Ok(response);
        }

        let mut details = Vec::new();
        for issue in &report.issues {
            response.log(Stream::Stderr, format!("{}\n", issue.message));
            details.push(issue.message.clone());
        }
        let path = if arguments.positional.is_empty() {
            self.node.name.clone()
        } else {
            arguments.positional.join(" ")
        };
        response.log(
            Stream::Stderr,
            format!(
                "Use \"{} {path} --help\" to view command usage.\n",
                self.root_name
            ),
        );
        response.set_message("Command syntax invalid");
        let record = ErrorRecord::new(FailureKind::Syntax, "Command syntax invalid")
            .with_details(details.join("; "));
        Err(self.fail(response, record))
    }

    async fn prepare_and_execute(
        &self,
        mut arguments: Arguments,
        response: Response,
        cancellation: CancellationToken,
    ) -> ResponseSnapshot {
        if self.node.reads_stdin {
            match drain_stdin(&cancellation).await {
                Ok(content) => arguments.set(STDIN_ARG, content),
                Err(record) => return self.fail(response, record),
            }
        }

        let profiles = match self.load_profiles(&arguments).await {
            Ok(map) => map,
            Err(prep) => {
                let mut response = response;
                response.set_message(prep.message.clone());
                return self.fail(response, prep.into_record());
            }
        };

        // Stage 5: execute.
        tracing::debug!(command = %self.node.name, stage = "execute", "pipeline stage");
        if cancellation.is_cancelled() {
            return self.fail(response, cancelled_record());
        }

        if let Some(handler_key) = self.node.handler.clone() {
            let mut response = response;
            match self
                .run_handler(
                    &handler_key,
                    &mut response,
                    &profiles,
                    &arguments,
                    &cancellation,
                    false,
                )
                .await
            {
                Ok(()) => {
                    if !response.is_failed() {
                        response.succeeded();
                    }
                    Self::finish(response)
                }
                Err(record) => self.fail(response, record),
            }
        } else {
            self.run_chain(response, &profiles, &arguments, &cancellation)
                .await
        }
    }

    /// Resolve the profile types the node consumes into a fresh map.
    ///
    /// Required types resolve by the `<type>-profile` selector argument or
    /// the type's default. Optional types resolve the same way but a missing
    /// default is skipped silently.
    async fn load_profiles(&self, arguments: &Arguments) -> Result<ProfileMap, PreparationError> {
        let Some(requirements) = &self.node.profile else {
            return Ok(ProfileMap::default());
        };
        let mut session = self.profiles.session();

        for profile_type in &requirements.required {
            let selector = format!("{profile_type}-profile");
            match arguments.get_str(&selector) {
                Some(name) => {
                    session.load(profile_type, name).await?;
                }
                None => {
                    session.load_default(profile_type).await?;
                }
            }
        }

        for profile_type in &requirements.optional {
            let selector = format!("{profile_type}-profile");
            match arguments.get_str(&selector) {
                Some(name) => {
                    session.load(profile_type, name).await?;
                }
                None => {
                    if let Err(e) = session.load_default(profile_type).await {
                        if e.subkind == FailureSubkind::ProfileMissing {
                            tracing::debug!(
                                profile_type = %profile_type,
                                "optional profile type has no default; skipped"
                            );
                        } else {
                            return Err(e);
                        }
                    }
                }
            }
        }

        Ok(session.into_map())
    }

    /// Instantiate and run one handler, capturing panics.
    async fn run_handler(
        &self,
        key: &str,
        response: &mut Response,
        profiles: &ProfileMap,
        arguments: &Arguments,
        cancellation: &CancellationToken,
        is_chained: bool,
    ) -> Result<(), ErrorRecord> {
        let handler = match self.registry.instantiate(key) {
            Ok(handler) => handler,
            Err(e) => {
                return Err(
                    ErrorRecord::new(FailureKind::Internal, "Handler Instantiation Failed")
                        .with_subkind(FailureSubkind::HandlerInstantiation)
                        .with_details(format!("{key}: {e}")),
                );
            }
        };

        let mut ctx = HandlerContext {
            response,
            profiles,
            arguments,
            definition: &self.node,
            full_definition: &self.root,
            is_chained,
            cancellation: cancellation.clone(),
        };

        let outcome = std::panic::AssertUnwindSafe(handler.process(&mut ctx))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(failure)) => {
                tracing::debug!(handler = key, "handler reported failure");
                Err(failure.into_record())
            }
            Err(panic) => {
                tracing::warn!(handler = key, "handler panicked");
                Err(HandlerFailure::Unhandled {
                    message: panic_message(panic),
                    stack: None,
                }
                .into_record())
            }
        }
    }

    /// Run the declared chain of handler steps.
    ///
    /// Each step gets a fresh response seeded with the cumulative console
    /// output of the steps before it; step N's arguments are linked from the
    /// structured data of steps 0..N-1. The first failing step ends the
    /// chain and its response -- cumulative output included -- is what the
    /// invocation returns. Chain success is the last step's success.
    async fn run_chain(
        &self,
        response: Response,
        profiles: &ProfileMap,
        arguments: &Arguments,
        cancellation: &CancellationToken,
    ) -> ResponseSnapshot {
        let format = response.format();
        let top_silent = response.is_silent();
        let mut acc_stdout = response.stdout().to_string();
        let mut acc_stderr = response.stderr().to_string();
        let mut prior_data: Vec<serde_json::Value> = Vec::new();

        let steps = &self.node.chained_handlers;
        for (index, step) in steps.iter().enumerate() {
            if cancellation.is_cancelled() {
                let seeded = Response::seeded(format, top_silent, acc_stdout, acc_stderr);
                return self.fail(seeded, cancelled_record());
            }

            tracing::debug!(
                command = %self.node.name,
                step = index,
                handler = %step.handler,
                "chain step"
            );
            let step_args = chain::step_arguments(arguments, step, &prior_data);
            let mut step_response = Response::seeded(
                format,
                top_silent || step.silent,
                acc_stdout.clone(),
                acc_stderr.clone(),
            );

            let outcome = self
                .run_handler(
                    &step.handler,
                    &mut step_response,
                    profiles,
                    &step_args,
                    cancellation,
                    true,
                )
                .await;

            match outcome {
                Ok(()) if !step_response.is_failed() => {
                    prior_data.push(
                        step_response
                            .data()
                            .cloned()
                            .unwrap_or(serde_json::Value::Null),
                    );
                    acc_stdout = step_response.stdout().to_string();
                    acc_stderr = step_response.stderr().to_string();
                    if index == steps.len() - 1 {
                        step_response.set_silent(top_silent);
                        step_response.succeeded();
                        return Self::finish(step_response);
                    }
                }
                Ok(()) => {
                    // The handler marked the response failed and returned.
                    step_response.set_silent(top_silent);
                    return Self::finish(step_response);
                }
                Err(record) => {
                    step_response.set_silent(top_silent);
                    return self.fail(step_response, record);
                }
            }
        }

        // Unreachable for validated nodes: a chained command has at least
        // one step. Kept total for safety.
        let mut seeded = Response::seeded(format, top_silent, acc_stdout, acc_stderr);
        seeded.succeeded();
        Self::finish(seeded)
    }

    /// Attach a failure record, render it for default format, and finalize.
    fn fail(&self, mut response: Response, record: ErrorRecord) -> ResponseSnapshot {
        if response.format() == OutputFormat::Default {
            response.log(Stream::Stderr, format!("Error: {}\n", record.message));
            if let Some(details) = &record.additional_details {
                response.log(Stream::Stderr, format!("{details}\n"));
            }
        }
        response.set_error(record);
        Self::finish(response)
    }

    /// Stage 6: finalize, emitting the JSON document when applicable.
    fn finish(mut response: Response) -> ResponseSnapshot {
        if response.format() == OutputFormat::Json {
            response.write_json()
        } else {
            response.finalize()
        }
    }
}

fn cancelled_record() -> ErrorRecord {
    ErrorRecord::new(FailureKind::Internal, "Command invocation cancelled")
        .with_subkind(FailureSubkind::Cancelled)
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Drain stdin into a string, honoring cancellation.
async fn drain_stdin(cancellation: &CancellationToken) -> Result<String, ErrorRecord> {
    use tokio::io::AsyncReadExt;

    let mut buffer = Vec::new();
    let mut stdin = tokio::io::stdin();
    tokio::select! {
        _ = cancellation.cancelled() => Err(cancelled_record()),
        result = stdin.read_to_end(&mut buffer) => match result {
            Ok(_) => Ok(String::from_utf8_lossy(&buffer).into_owned()),
            Err(e) => Err(
                ErrorRecord::new(FailureKind::Preparation, "failed to read stdin")
                    .with_subkind(FailureSubkind::StdinFailed)
                    .with_details(e.to_string()),
            ),
        }
    }
}
