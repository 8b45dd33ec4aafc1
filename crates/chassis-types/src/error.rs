//! Failure taxonomy shared across the chassis crates.
//!
//! Two layers: [`ChassisError`] is the typed error returned by library APIs
//! (stores, registries, backends), while [`ErrorRecord`] is the structured,
//! wire-serializable failure attached to a command response. The processor
//! converts the former into the latter; nothing recoverable escapes an
//! invocation as a raw error.

use serde::{Deserialize, Serialize};

/// Errors returned by chassis library APIs.
///
/// Each variant corresponds to a subsystem: the definition tree, the profile
/// store, the credential backend, or the handler registry.
#[derive(Debug, thiserror::Error)]
pub enum ChassisError {
    /// Command definition tree violates a structural invariant.
    #[error("command definition error: {0}")]
    Definition(String),

    /// Profile store read/write failure.
    #[error("profile store error: {0}")]
    ProfileStore(String),

    /// Credential backend failure.
    #[error("credential backend error: {0}")]
    Credential(String),

    /// A secure field value was absent or empty where one is required.
    #[error("missing secure field: {0}")]
    MissingSecureField(String),

    /// Handler registry lookup or instantiation failure.
    #[error("handler registry error: {0}")]
    Registry(String),
}

/// Top-level classification of an invocation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Arguments failed syntactic validation against the command node.
    Syntax,
    /// Profile loading, credential retrieval, or stdin draining failed.
    Preparation,
    /// The handler failed deliberately with a structured error.
    HandlerImperative,
    /// The handler failed with an unrecognized error shape or panicked.
    HandlerUnhandled,
    /// The handler rejected with a bare message string.
    HandlerStringReject,
    /// The handler rejected without any payload.
    HandlerSilentReject,
    /// Framework-level failure: bad parameters, instantiation, cancellation.
    Internal,
}

/// Refinement of [`FailureKind::Preparation`] and [`FailureKind::Internal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureSubkind {
    /// A required profile could not be loaded.
    ProfileMissing,
    /// Profile dependencies form a cycle.
    ProfileCycle,
    /// A profile dependency failed to load.
    DependencyFailed,
    /// A secure field could not be retrieved from the credential backend.
    CredentialMissing,
    /// Draining stdin into the arguments failed.
    StdinFailed,
    /// A secure field value was absent or empty on save.
    MissingSecureField,
    /// The handler referenced by the command could not be instantiated.
    HandlerInstantiation,
    /// The requested response format is not recognized.
    BadFormat,
    /// The invocation was cancelled between pipeline stages.
    Cancelled,
    /// Unclassified framework failure.
    Unknown,
}

/// A structured failure attached to a command response.
///
/// Serializes into the `error` object of the response wire document. The
/// `kind`/`subkind` discriminators are carried alongside the spec-mandated
/// `msg`/`additionalDetails`/`causeErrors`/`stack` fields so machine
/// consumers can branch without parsing messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Top-level failure classification.
    pub kind: FailureKind,
    /// Refinement for Preparation and Internal kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subkind: Option<FailureSubkind>,
    /// Human-readable failure message.
    #[serde(rename = "msg")]
    pub message: String,
    /// Supplementary detail: cycle paths, registry keys, stringified values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_details: Option<String>,
    /// Upstream failures that caused this one, outermost first.
    #[serde(
        rename = "causeErrors",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub cause_chain: Vec<ErrorRecord>,
    /// Captured stack or backtrace text, when the failure shape carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorRecord {
    /// Create a record with a kind and message; refine with the `with_`
    /// methods.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            subkind: None,
            message: message.into(),
            additional_details: None,
            cause_chain: Vec::new(),
            stack: None,
        }
    }

    /// Attach a subkind discriminator.
    #[must_use]
    pub fn with_subkind(mut self, subkind: FailureSubkind) -> Self {
        self.subkind = Some(subkind);
        self
    }

    /// Attach supplementary detail text.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.additional_details = Some(details.into());
        self
    }

    /// Append an upstream cause.
    #[must_use]
    pub fn with_cause(mut self, cause: ErrorRecord) -> Self {
        self.cause_chain.push(cause);
        self
    }

    /// Attach captured stack text.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(details) = &self.additional_details {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

/// A failure raised during the Prepare stage of an invocation.
///
/// Carries the Preparation subkind plus the original message and details so
/// the processor can surface them verbatim on the response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct PreparationError {
    /// Which preparation step failed.
    pub subkind: FailureSubkind,
    /// Human-readable failure message.
    pub message: String,
    /// Supplementary detail (cycle path, account key, I/O error text).
    pub additional_details: Option<String>,
    /// Upstream failures, outermost first.
    pub cause_chain: Vec<ErrorRecord>,
}

impl PreparationError {
    /// Create a preparation error with a subkind and message.
    pub fn new(subkind: FailureSubkind, message: impl Into<String>) -> Self {
        Self {
            subkind,
            message: message.into(),
            additional_details: None,
            cause_chain: Vec::new(),
        }
    }

    /// Attach supplementary detail text.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.additional_details = Some(details.into());
        self
    }

    /// Append an upstream cause.
    #[must_use]
    pub fn with_cause(mut self, cause: ErrorRecord) -> Self {
        self.cause_chain.push(cause);
        self
    }

    /// Convert into the [`ErrorRecord`] attached to the response.
    pub fn into_record(self) -> ErrorRecord {
        ErrorRecord {
            kind: FailureKind::Preparation,
            subkind: Some(self.subkind),
            message: self.message,
            additional_details: self.additional_details,
            cause_chain: self.cause_chain,
            stack: None,
        }
    }
}
