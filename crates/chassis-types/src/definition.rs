//! The command definition tree.
//!
//! Hosts and plugins contribute a tree of [`CommandNode`]s: group nodes
//! organize, command nodes execute. Nodes are plain serde data so plugin
//! systems can ship them as documents. The tree is read-only during
//! invocation; [`CommandNode::prepare`] produces the post-processed form the
//! processor works against.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ChassisError;

/// Whether a node organizes children or executes a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Organizational node with at least one child and no handler.
    Group,
    /// Executable node with a handler or a chain of handlers.
    Command,
}

/// Declared value type of an option or positional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Free-form string.
    String,
    /// Numeric value (carried as f64).
    Number,
    /// Boolean flag.
    Boolean,
    /// Repeatable/array value.
    Array,
}

impl ValueType {
    /// Name used in help output and validation messages.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Array => "array",
        }
    }
}

/// Declaration of a named option on a command node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionSpec {
    /// Option name as bound by the front-end (no leading dashes).
    pub name: String,
    /// Declared value type.
    pub value_type: ValueType,
    /// Whether the option must be supplied.
    #[serde(default)]
    pub required: bool,
    /// One-line description for help output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Closed set of acceptable rendered values, when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
    /// Options that must not be supplied together with this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts_with: Vec<String>,
    /// Options that must be supplied whenever this one is.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implies: Vec<String>,
    /// Inclusive numeric bounds for Number options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_range: Option<(f64, f64)>,
    /// Minimum element count for Array options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_min: Option<usize>,
    /// Maximum element count for Array options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_max: Option<usize>,
}

impl OptionSpec {
    /// Create an optional option of the given type.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            required: false,
            description: None,
            allowed_values: Vec::new(),
            conflicts_with: Vec::new(),
            implies: Vec::new(),
            numeric_range: None,
            array_min: None,
            array_max: None,
        }
    }

    /// Mark the option required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Attach a help description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Restrict to a closed value set.
    #[must_use]
    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Declare a conflicting option.
    #[must_use]
    pub fn conflicts_with(mut self, other: impl Into<String>) -> Self {
        self.conflicts_with.push(other.into());
        self
    }

    /// Declare an implied option.
    #[must_use]
    pub fn implies(mut self, other: impl Into<String>) -> Self {
        self.implies.push(other.into());
        self
    }

    /// Bound a Number option to an inclusive range.
    #[must_use]
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.numeric_range = Some((min, max));
        self
    }

    /// Bound an Array option's element count.
    #[must_use]
    pub fn with_cardinality(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.array_min = min;
        self.array_max = max;
        self
    }
}

/// Declaration of a positional argument on a command node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionalSpec {
    /// Positional name, used in help and validation messages.
    pub name: String,
    /// Declared value type.
    pub value_type: ValueType,
    /// Whether the positional must be supplied.
    #[serde(default)]
    pub required: bool,
    /// One-line description for help output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PositionalSpec {
    /// Create an optional positional of the given type.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            required: false,
            description: None,
        }
    }

    /// Mark the positional required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// One argument binding pulled from a prior chain step's structured data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgMapping {
    /// Index of the prior step whose data is consulted.
    pub from_step: usize,
    /// Dotted path (fields and numeric indices) into that step's data.
    pub json_path: String,
    /// Argument name the extracted value is bound to.
    pub to_arg: String,
}

/// One step in a chained-handler command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainedStep {
    /// Registry key of the handler to run.
    pub handler: String,
    /// Suppress this step's live console output.
    #[serde(default)]
    pub silent: bool,
    /// Argument bindings computed from prior steps' data.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arg_mappings: Vec<ArgMapping>,
}

impl ChainedStep {
    /// Create a step running the given handler with no mappings.
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            silent: false,
            arg_mappings: Vec::new(),
        }
    }

    /// Suppress the step's live output.
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Add an argument mapping from a prior step.
    #[must_use]
    pub fn mapping(
        mut self,
        from_step: usize,
        json_path: impl Into<String>,
        to_arg: impl Into<String>,
    ) -> Self {
        self.arg_mappings.push(ArgMapping {
            from_step,
            json_path: json_path.into(),
            to_arg: to_arg.into(),
        });
        self
    }
}

/// Profile types a command consumes, by requirement strength.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRequirements {
    /// Types that must resolve for the command to run.
    #[serde(default)]
    pub required: Vec<String>,
    /// Types loaded when available, skipped silently otherwise.
    #[serde(default)]
    pub optional: Vec<String>,
}

/// A node in the command definition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandNode {
    /// Node name, unique among siblings after alias expansion.
    pub name: String,
    /// Group or command.
    pub kind: NodeKind,
    /// One-line description for help output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Alternate names resolving to this node.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub aliases: BTreeSet<String>,
    /// Declared options, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionSpec>,
    /// Declared positionals, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positionals: Vec<PositionalSpec>,
    /// Registry key of the single handler, for non-chained commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    /// Ordered chain of handler steps, for chained commands.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chained_handlers: Vec<ChainedStep>,
    /// Profile types this command consumes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileRequirements>,
    /// Drain stdin into the `stdin` argument before execution.
    #[serde(default)]
    pub reads_stdin: bool,
    /// Child nodes, for groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CommandNode>,
}

impl CommandNode {
    /// Create a group node; add children with [`CommandNode::with_child`].
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Group,
            description: None,
            aliases: BTreeSet::new(),
            options: Vec::new(),
            positionals: Vec::new(),
            handler: None,
            chained_handlers: Vec::new(),
            profile: None,
            reads_stdin: false,
            children: Vec::new(),
        }
    }

    /// Create a command node; set a handler or chain before use.
    pub fn command(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Command,
            ..Self::group(name)
        }
    }

    /// Attach a help description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add an alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    /// Add an option declaration.
    #[must_use]
    pub fn with_option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }

    /// Add a positional declaration.
    #[must_use]
    pub fn with_positional(mut self, positional: PositionalSpec) -> Self {
        self.positionals.push(positional);
        self
    }

    /// Set the single handler registry key.
    #[must_use]
    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    /// Append a chained handler step.
    #[must_use]
    pub fn with_chained(mut self, step: ChainedStep) -> Self {
        self.chained_handlers.push(step);
        self
    }

    /// Set the profile requirements.
    #[must_use]
    pub fn with_profile(mut self, profile: ProfileRequirements) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Drain stdin into the arguments before execution.
    #[must_use]
    pub fn reads_stdin(mut self) -> Self {
        self.reads_stdin = true;
        self
    }

    /// Add a child node.
    #[must_use]
    pub fn with_child(mut self, child: CommandNode) -> Self {
        self.children.push(child);
        self
    }

    /// Resolve a child by name or alias.
    pub fn resolve_child(&self, token: &str) -> Option<&CommandNode> {
        self.children
            .iter()
            .find(|c| c.name == token || c.aliases.contains(token))
    }

    /// Traverse the tree along a path of names/aliases.
    ///
    /// An empty path yields the node itself.
    pub fn find(&self, path: &[&str]) -> Option<&CommandNode> {
        let mut current = self;
        for token in path {
            current = current.resolve_child(token)?;
        }
        Some(current)
    }

    /// Validate the structural invariants of the tree rooted here.
    ///
    /// A command node has a handler or a non-empty chain, never both; group
    /// nodes have at least one child and no handler; sibling names are
    /// unique after alias expansion.
    pub fn validate_tree(&self) -> Result<(), ChassisError> {
        match self.kind {
            NodeKind::Command => {
                let has_handler = self.handler.is_some();
                let has_chain = !self.chained_handlers.is_empty();
                if has_handler == has_chain {
                    return Err(ChassisError::Definition(format!(
                        "command '{}' must declare exactly one of a handler or a chain",
                        self.name
                    )));
                }
            }
            NodeKind::Group => {
                if self.handler.is_some() || !self.chained_handlers.is_empty() {
                    return Err(ChassisError::Definition(format!(
                        "group '{}' must not declare a handler",
                        self.name
                    )));
                }
                if self.children.is_empty() {
                    return Err(ChassisError::Definition(format!(
                        "group '{}' has no children",
                        self.name
                    )));
                }
            }
        }

        let mut seen = BTreeSet::new();
        for child in &self.children {
            for token in std::iter::once(&child.name).chain(child.aliases.iter()) {
                if !seen.insert(token.clone()) {
                    return Err(ChassisError::Definition(format!(
                        "duplicate name or alias '{}' under '{}'",
                        token, self.name
                    )));
                }
            }
        }

        for child in &self.children {
            child.validate_tree()?;
        }
        Ok(())
    }

    /// Produce the prepared tree the processor works against.
    ///
    /// Options declared on group nodes are propagated to every descendant
    /// that does not already declare an option of the same name, so commands
    /// see their full effective option set. Preparation is idempotent:
    /// re-preparing a prepared tree changes nothing.
    pub fn prepare(&self) -> CommandNode {
        let mut prepared = self.clone();
        prepared.propagate_options(&[]);
        prepared
    }

    fn propagate_options(&mut self, inherited: &[OptionSpec]) {
        for option in inherited {
            if !self.options.iter().any(|o| o.name == option.name) {
                self.options.push(option.clone());
            }
        }
        if !self.children.is_empty() {
            let pass_down = self.options.clone();
            for child in &mut self.children {
                child.propagate_options(&pass_down);
            }
        }
    }
}
