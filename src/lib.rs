//! Chassis: the core execution engine of a pluggable command-line framework.
//!
//! Hosts contribute a tree of command definitions, register handlers, and
//! hand invocations to a [`CommandProcessor`]; the processor validates
//! syntax, resolves the profiles the command requires, runs the handler (or
//! chain of handlers), and returns a structured [`ResponseSnapshot`].
//!
//! This crate re-exports the public surface of the workspace members:
//! `chassis-types` (the data model) and `chassis-core` (the pipeline).

pub use chassis_types::{
    credential_account, ArgMapping, ArgValue, Arguments, ChainedStep, ChassisError, CommandNode,
    ErrorRecord, FailureKind, FailureSubkind, NodeKind, OptionSpec, PositionalSpec,
    PreparationError, Profile, ProfileRef, ProfileRequirements, ProfileTypeConfig, ValueType,
};

pub use chassis_core::{
    Base64Backend, CommandHandler, CommandProcessor, CredentialBackend, CredentialManager,
    DefaultHelpGenerator, FileProfileStore, HandlerContext, HandlerFailure, HandlerRegistry,
    HelpGenerator, InvokeParams, Issue, IssueReason, IssueSeverity, MemoryCredentialBackend,
    MemoryProfileStore, OutputFormat, ProfileManager, ProfileManagerFactory, ProfileMap,
    ProfileSession, ProfileStore, ProgressSpec, Response, ResponseSnapshot, Stream,
    ValidationReport, EXIT_FAILURE, EXIT_SUCCESS,
};
