//! Command processor pipeline for the chassis framework.
//!
//! The host hands this crate a resolved [`CommandNode`](chassis_types::CommandNode)
//! and parsed arguments; the [`processor::CommandProcessor`] validates the
//! invocation, loads the profiles the command requires, runs the handler (or
//! chain of handlers), and returns a structured
//! [`response::ResponseSnapshot`].
//!
//! Module map:
//! - [`response`] -- the per-invocation output accumulator and its snapshot
//! - [`validate`] -- pure syntactic validation of arguments against a node
//! - [`profiles`] -- profile store, dependency resolution, per-invocation map
//! - [`credentials`] -- pluggable secret backend and the inert default
//! - [`handler`] -- the handler contract, failure shapes, and the registry
//! - [`chain`] -- argument linking between chained handler steps
//! - [`help`] -- the injected help-generation seam
//! - [`processor`] -- the pipeline that ties the above together

pub mod chain;
pub mod credentials;
pub mod handler;
pub mod help;
pub mod processor;
pub mod profiles;
pub mod response;
pub mod validate;

pub use credentials::{Base64Backend, CredentialBackend, CredentialManager, MemoryCredentialBackend};
pub use handler::{CommandHandler, HandlerContext, HandlerFailure, HandlerRegistry};
pub use help::{DefaultHelpGenerator, HelpGenerator};
pub use processor::{CommandProcessor, InvokeParams, EXIT_FAILURE, EXIT_SUCCESS};
pub use profiles::{
    FileProfileStore, MemoryProfileStore, ProfileManager, ProfileManagerFactory, ProfileMap,
    ProfileSession, ProfileStore,
};
pub use response::{OutputFormat, ProgressSpec, Response, ResponseSnapshot, Stream};
pub use validate::{Issue, IssueReason, IssueSeverity, ValidationReport};
