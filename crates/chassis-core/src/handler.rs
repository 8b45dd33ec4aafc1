//! The handler contract and registry.
//!
//! Handlers are host-supplied, late-bound code. Rather than loading modules
//! from the filesystem, hosts register a factory per handler key at startup;
//! the processor instantiates through the registry when a command runs.
//!
//! A handler signals failure by returning a [`HandlerFailure`]; the shape of
//! the failure -- not its Rust type -- determines the error kind recorded on
//! the response.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use chassis_types::{Arguments, ChassisError, CommandNode, ErrorRecord, FailureKind};

use crate::profiles::ProfileMap;
use crate::response::Response;

/// Everything a handler sees for one invocation.
pub struct HandlerContext<'a> {
    /// The response the handler writes console output and data into.
    pub response: &'a mut Response,
    /// Resolved profiles, read-only for the duration of the call.
    pub profiles: &'a ProfileMap,
    /// The invocation's arguments (chain steps see their linked copy).
    pub arguments: &'a Arguments,
    /// The command node being executed.
    pub definition: &'a CommandNode,
    /// The root of the full command tree.
    pub full_definition: &'a CommandNode,
    /// Whether this handler runs as a step of a chain.
    pub is_chained: bool,
    /// Cancellation signal; cooperative handlers should observe it.
    pub cancellation: CancellationToken,
}

/// User-supplied command implementation.
///
/// Completion is signalled by returning: `Ok(())` for success, or a
/// [`HandlerFailure`] describing the failure shape. A handler may also call
/// `ctx.response.failed()` and return `Ok(())` to fail without an error
/// record.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run the command.
    async fn process(&self, ctx: &mut HandlerContext<'_>) -> Result<(), HandlerFailure>;
}

/// The shapes a handler failure can take.
///
/// Each shape maps to exactly one error kind on the response; see
/// [`HandlerFailure::into_record`].
#[derive(Debug)]
pub enum HandlerFailure {
    /// A deliberate, structured failure raised by handler logic.
    Imperative {
        /// Failure message shown to the user.
        message: String,
        /// Supplementary detail text.
        additional_details: Option<String>,
        /// Structured causes the handler chose to attach.
        cause_errors: Option<serde_json::Value>,
    },
    /// An unexpected error that carried a message (and possibly a backtrace).
    Unhandled {
        /// The original error message.
        message: String,
        /// Captured backtrace text, when available.
        stack: Option<String>,
    },
    /// A bare message string.
    Message(String),
    /// A rejection with no payload at all.
    Silent,
    /// Any other value the handler produced.
    Value(serde_json::Value),
}

impl HandlerFailure {
    /// A deliberate failure with a message.
    pub fn imperative(message: impl Into<String>) -> Self {
        HandlerFailure::Imperative {
            message: message.into(),
            additional_details: None,
            cause_errors: None,
        }
    }

    /// Attach detail text to an imperative failure; no-op for other shapes.
    #[must_use]
    pub fn with_details(self, details: impl Into<String>) -> Self {
        match self {
            HandlerFailure::Imperative {
                message,
                cause_errors,
                ..
            } => HandlerFailure::Imperative {
                message,
                additional_details: Some(details.into()),
                cause_errors,
            },
            other => other,
        }
    }

    /// Map the failure shape to the error record attached to the response.
    ///
    /// | shape | kind | message |
    /// |---|---|---|
    /// | Imperative | HandlerImperative | as raised |
    /// | Unhandled | HandlerUnhandled | "Unexpected Command Error: ..." |
    /// | Message | HandlerStringReject | the string |
    /// | Silent | HandlerSilentReject | "Command Failed" |
    /// | Value | HandlerUnhandled | "Unexpected Command Error" + JSON detail |
    pub fn into_record(self) -> ErrorRecord {
        match self {
            HandlerFailure::Imperative {
                message,
                additional_details,
                cause_errors,
            } => {
                let mut record = ErrorRecord::new(FailureKind::HandlerImperative, message);
                record.additional_details = additional_details;
                if let Some(causes) = cause_errors {
                    record.cause_chain = match causes {
                        serde_json::Value::Array(items) => items
                            .into_iter()
                            .map(|item| match serde_json::from_value(item.clone()) {
                                Ok(cause) => cause,
                                Err(_) => ErrorRecord::new(
                                    FailureKind::HandlerImperative,
                                    item.to_string(),
                                ),
                            })
                            .collect(),
                        other => vec![ErrorRecord::new(
                            FailureKind::HandlerImperative,
                            other.to_string(),
                        )],
                    };
                }
                record
            }
            HandlerFailure::Unhandled { message, stack } => {
                let mut record = ErrorRecord::new(
                    FailureKind::HandlerUnhandled,
                    format!("Unexpected Command Error: {message}"),
                );
                record.additional_details = stack;
                record
            }
            HandlerFailure::Message(message) => {
                ErrorRecord::new(FailureKind::HandlerStringReject, message)
            }
            HandlerFailure::Silent => {
                ErrorRecord::new(FailureKind::HandlerSilentReject, "Command Failed")
            }
            HandlerFailure::Value(value) => {
                ErrorRecord::new(FailureKind::HandlerUnhandled, "Unexpected Command Error")
                    .with_details(value.to_string())
            }
        }
    }
}

/// Factory producing a handler instance for each invocation.
pub type HandlerFactory =
    Arc<dyn Fn() -> Result<Arc<dyn CommandHandler>, ChassisError> + Send + Sync>;

/// Name -> factory registry populated by the host at startup.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: BTreeMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a handler key, replacing any prior entry.
    pub fn register<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn CommandHandler>, ChassisError> + Send + Sync + 'static,
    {
        self.factories.insert(key.into(), Arc::new(factory));
    }

    /// Register a shared handler instance under a key.
    pub fn register_instance(&mut self, key: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        self.register(key, move || Ok(Arc::clone(&handler)));
    }

    /// Instantiate the handler registered under a key.
    pub fn instantiate(&self, key: &str) -> Result<Arc<dyn CommandHandler>, ChassisError> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| ChassisError::Registry(format!("no handler registered for '{key}'")))?;
        factory()
    }

    /// Registered handler keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imperative_maps_to_handler_imperative() {
        let record = HandlerFailure::imperative("deploy refused")
            .with_details("target is frozen")
            .into_record();
        assert_eq!(record.kind, FailureKind::HandlerImperative);
        assert_eq!(record.message, "deploy refused");
        assert_eq!(record.additional_details.as_deref(), Some("target is frozen"));
    }

    #[test]
    fn imperative_cause_array_becomes_cause_chain() {
        let failure = HandlerFailure::Imperative {
            message: "outer".into(),
            additional_details: None,
            cause_errors: Some(serde_json::json!([
                {"kind": "Internal", "msg": "inner"}
            ])),
        };
        let record = failure.into_record();
        assert_eq!(record.cause_chain.len(), 1);
        assert_eq!(record.cause_chain[0].message, "inner");
    }

    #[test]
    fn unhandled_prefixes_unexpected_command_error() {
        let failure = HandlerFailure::Unhandled {
            message: "index out of bounds".into(),
            stack: Some("at src/handler.rs:10".into()),
        };
        let record = failure.into_record();
        assert_eq!(record.kind, FailureKind::HandlerUnhandled);
        assert_eq!(record.message, "Unexpected Command Error: index out of bounds");
        assert_eq!(
            record.additional_details.as_deref(),
            Some("at src/handler.rs:10")
        );
    }

    #[test]
    fn message_maps_to_string_reject() {
        let record = HandlerFailure::Message("just no".into()).into_record();
        assert_eq!(record.kind, FailureKind::HandlerStringReject);
        assert_eq!(record.message, "just no");
    }

    #[test]
    fn silent_maps_to_command_failed() {
        let record = HandlerFailure::Silent.into_record();
        assert_eq!(record.kind, FailureKind::HandlerSilentReject);
        assert_eq!(record.message, "Command Failed");
    }

    #[test]
    fn arbitrary_value_maps_to_unhandled_with_json_details() {
        let record = HandlerFailure::Value(serde_json::json!(42)).into_record();
        assert_eq!(record.kind, FailureKind::HandlerUnhandled);
        assert_eq!(record.message, "Unexpected Command Error");
        assert_eq!(record.additional_details.as_deref(), Some("42"));
    }

    #[test]
    fn registry_unknown_key_errors() {
        let registry = HandlerRegistry::new();
        let err = registry.instantiate("ghost").unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn registry_replaces_prior_entry() {
        struct Noop;
        #[async_trait]
        impl CommandHandler for Noop {
            async fn process(&self, _ctx: &mut HandlerContext<'_>) -> Result<(), HandlerFailure> {
                Ok(())
            }
        }

        let mut registry = HandlerRegistry::new();
        registry.register_instance("h", Arc::new(Noop));
        registry.register("h", || {
            Err(ChassisError::Registry("factory broke".into()))
        });
        assert!(registry.instantiate("h").is_err());
        assert_eq!(registry.keys(), vec!["h"]);
    }
}
