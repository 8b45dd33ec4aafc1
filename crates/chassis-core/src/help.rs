//! Help-text generation seam.
//!
//! Rendering style is a host concern; the processor only needs something
//! that turns a command node into text. The default generator produces a
//! plain usage listing.

use chassis_types::{CommandNode, NodeKind};

/// Turns a command node into help text.
pub trait HelpGenerator: Send + Sync {
    /// Render help for a node. `root_name` is the host binary's name, used
    /// in the usage line.
    fn render(&self, node: &CommandNode, root_name: &str) -> String;
}

/// Plain-text help: usage line, description, aliases, positionals, options,
/// and child summaries for groups.
#[derive(Debug, Default)]
pub struct DefaultHelpGenerator;

impl HelpGenerator for DefaultHelpGenerator {
    fn render(&self, node: &CommandNode, root_name: &str) -> String {
        let mut out = String::new();

        if let Some(description) = &node.description {
            out.push_str(description);
            out.push_str("\n\n");
        }

        out.push_str(&format!("Usage: {root_name} {}", node.name));
        for positional in &node.positionals {
            if positional.required {
                out.push_str(&format!(" <{}>", positional.name));
            } else {
                out.push_str(&format!(" [{}]", positional.name));
            }
        }
        if !node.options.is_empty() {
            out.push_str(" [options]");
        }
        out.push('\n');

        if !node.aliases.is_empty() {
            let aliases: Vec<&str> = node.aliases.iter().map(String::as_str).collect();
            out.push_str(&format!("Aliases: {}\n", aliases.join(", ")));
        }

        if !node.positionals.is_empty() {
            out.push_str("\nPositionals:\n");
            for positional in &node.positionals {
                out.push_str(&format!(
                    "  <{}>  {}{}\n",
                    positional.name,
                    positional.value_type.name(),
                    positional
                        .description
                        .as_deref()
                        .map(|d| format!(" -- {d}"))
                        .unwrap_or_default()
                ));
            }
        }

        if !node.options.is_empty() {
            out.push_str("\nOptions:\n");
            for option in &node.options {
                out.push_str(&format!(
                    "  --{} ({}{}){}\n",
                    option.name,
                    option.value_type.name(),
                    if option.required { ", required" } else { "" },
                    option
                        .description
                        .as_deref()
                        .map(|d| format!(" -- {d}"))
                        .unwrap_or_default()
                ));
            }
        }

        if node.kind == NodeKind::Group && !node.children.is_empty() {
            out.push_str("\nCommands:\n");
            for child in &node.children {
                out.push_str(&format!(
                    "  {}  {}\n",
                    child.name,
                    child.description.as_deref().unwrap_or("")
                ));
            }
        }

        out
    }
}
