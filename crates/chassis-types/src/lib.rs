//! Shared data model for the chassis command framework.
//!
//! Everything here is plain data: the command definition tree contributed by
//! hosts and plugins, the parsed argument values handed to an invocation,
//! the profile bundles handlers consume, and the failure taxonomy the
//! processor reports through. The execution machinery lives in
//! `chassis-core`.

pub mod arguments;
pub mod definition;
pub mod error;
pub mod profile;

pub use arguments::{ArgValue, Arguments};
pub use definition::{
    ArgMapping, ChainedStep, CommandNode, NodeKind, OptionSpec, PositionalSpec,
    ProfileRequirements, ValueType,
};
pub use error::{
    ChassisError, ErrorRecord, FailureKind, FailureSubkind, PreparationError,
};
pub use profile::{credential_account, Profile, ProfileRef, ProfileTypeConfig};
