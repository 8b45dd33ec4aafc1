//! Syntactic validation of parsed arguments against a command node.
//!
//! Validation is total (every violation is reported, not just the first),
//! deterministic, and pure: no I/O, no clock, no environment. The processor
//! renders the resulting issues; this module only produces them.

use chassis_types::{ArgValue, Arguments, CommandNode, OptionSpec, ValueType};

/// How serious an issue is. Warnings do not fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// The invocation cannot proceed.
    Error,
    /// Suspicious but tolerated.
    Warning,
}

/// Why an option or positional was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueReason {
    /// A required option or positional was not supplied.
    Missing,
    /// The supplied value does not match the declared type.
    TypeMismatch,
    /// The value is not in the declared allowed set.
    NotAllowedValue,
    /// Two mutually exclusive options were both supplied.
    Conflict,
    /// An option implied by a supplied option is absent.
    ImpliedMissing,
    /// A numeric value is outside its declared range.
    RangeViolation,
    /// An array has too few or too many elements.
    ArrayCardinality,
    /// An option name not declared on the command was supplied.
    UnknownOption,
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    /// Error or warning.
    pub severity: IssueSeverity,
    /// The option or positional the issue concerns.
    pub subject: String,
    /// Machine-readable reason code.
    pub reason: IssueReason,
    /// Renderable message for console output.
    pub message: String,
}

impl Issue {
    fn error(subject: impl Into<String>, reason: IssueReason, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            subject: subject.into(),
            reason,
            message: message.into(),
        }
    }
}

/// The outcome of validating one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    /// True when no error-severity issues were found.
    pub valid: bool,
    /// All findings, in evaluation order.
    pub issues: Vec<Issue>,
}

/// Option names the framework itself contributes to a node: one
/// `<type>-profile` selector per profile type the command consumes.
pub fn profile_option_names(node: &CommandNode) -> Vec<String> {
    let Some(profile) = &node.profile else {
        return Vec::new();
    };
    profile
        .required
        .iter()
        .chain(profile.optional.iter())
        .map(|t| format!("{t}-profile"))
        .collect()
}

/// Validate arguments against a command node.
pub fn validate(node: &CommandNode, args: &Arguments) -> ValidationReport {
    let mut issues = Vec::new();

    check_unknown_options(node, args, &mut issues);
    check_options(node, args, &mut issues);
    check_positionals(node, args, &mut issues);

    let valid = issues
        .iter()
        .all(|issue| issue.severity != IssueSeverity::Error);
    ValidationReport { valid, issues }
}

fn check_unknown_options(node: &CommandNode, args: &Arguments, issues: &mut Vec<Issue>) {
    // Known names: the node's options, the positionals the front-end binds
    // by name, and the framework's per-type profile selectors.
    let framework_options = profile_option_names(node);
    for name in args.options.keys() {
        let declared = node.options.iter().any(|o| o.name == *name)
            || node.positionals.iter().any(|p| p.name == *name)
            || framework_options.iter().any(|o| o == name);
        if !declared {
            issues.push(Issue::error(
                name.clone(),
                IssueReason::UnknownOption,
                format!("Unknown option --{name}"),
            ));
        }
    }
}

fn check_options(node: &CommandNode, args: &Arguments, issues: &mut Vec<Issue>) {
    // Conflicts are reported once per pair regardless of which side
    // declares them.
    let mut reported_conflicts: Vec<(String, String)> = Vec::new();

    for option in &node.options {
        let value = args.get(&option.name);

        let Some(value) = value else {
            if option.required {
                issues.push(Issue::error(
                    option.name.clone(),
                    IssueReason::Missing,
                    format!(
                        "Missing required option --{} ({})",
                        option.name,
                        option.value_type.name()
                    ),
                ));
            }
            continue;
        };

        check_type(option, value, issues);
        check_allowed_values(option, value, issues);
        check_range(option, value, issues);
        check_cardinality(option, value, issues);

        for other in &option.conflicts_with {
            if args.contains(other) {
                let pair = if option.name < *other {
                    (option.name.clone(), other.clone())
                } else {
                    (other.clone(), option.name.clone())
                };
                if !reported_conflicts.contains(&pair) {
                    issues.push(Issue::error(
                        option.name.clone(),
                        IssueReason::Conflict,
                        format!("--{} conflicts with --{}", pair.0, pair.1),
                    ));
                    reported_conflicts.push(pair);
                }
            }
        }

        for implied in &option.implies {
            if !args.contains(implied) {
                issues.push(Issue::error(
                    implied.clone(),
                    IssueReason::ImpliedMissing,
                    format!("--{} requires --{implied} to also be supplied", option.name),
                ));
            }
        }
    }
}

/// A supplied value matches its declared type if the variant agrees, or if a
/// string parses cleanly into the declared scalar type (the front-end may
/// hand through raw tokens).
fn matches_type(declared: ValueType, value: &ArgValue) -> bool {
    match (declared, value) {
        (ValueType::String, ArgValue::Str(_)) => true,
        (ValueType::Number, ArgValue::Num(_)) => true,
        (ValueType::Number, ArgValue::Str(s)) => s.parse::<f64>().is_ok(),
        (ValueType::Boolean, ArgValue::Bool(_)) => true,
        (ValueType::Boolean, ArgValue::Str(s)) => s == "true" || s == "false",
        (ValueType::Array, ArgValue::Arr(_)) => true,
        _ => false,
    }
}

fn check_type(option: &OptionSpec, value: &ArgValue, issues: &mut Vec<Issue>) {
    if !matches_type(option.value_type, value) {
        issues.push(Issue::error(
            option.name.clone(),
            IssueReason::TypeMismatch,
            format!(
                "--{} expects a {} but received {} value '{}'",
                option.name,
                option.value_type.name(),
                value.type_name(),
                value.render()
            ),
        ));
    }
}

fn check_allowed_values(option: &OptionSpec, value: &ArgValue, issues: &mut Vec<Issue>) {
    if option.allowed_values.is_empty() {
        return;
    }
    let rendered = value.render();
    if !option.allowed_values.contains(&rendered) {
        issues.push(Issue::error(
            option.name.clone(),
            IssueReason::NotAllowedValue,
            format!(
                "--{} value '{}' is not one of: {}",
                option.name,
                rendered,
                option.allowed_values.join(", ")
            ),
        ));
    }
}

fn check_range(option: &OptionSpec, value: &ArgValue, issues: &mut Vec<Issue>) {
    let Some((min, max)) = option.numeric_range else {
        return;
    };
    let number = match value {
        ArgValue::Num(n) => Some(*n),
        ArgValue::Str(s) => s.parse::<f64>().ok(),
        _ => None,
    };
    if let Some(number) = number {
        if number < min || number > max {
            issues.push(Issue::error(
                option.name.clone(),
                IssueReason::RangeViolation,
                format!("--{} value {number} is outside the range {min}..={max}", option.name),
            ));
        }
    }
}

fn check_cardinality(option: &OptionSpec, value: &ArgValue, issues: &mut Vec<Issue>) {
    if option.array_min.is_none() && option.array_max.is_none() {
        return;
    }
    let Some(items) = value.as_arr() else {
        return;
    };
    if let Some(min) = option.array_min {
        if items.len() < min {
            issues.push(Issue::error(
                option.name.clone(),
                IssueReason::ArrayCardinality,
                format!(
                    "--{} requires at least {min} element(s), received {}",
                    option.name,
                    items.len()
                ),
            ));
        }
    }
    if let Some(max) = option.array_max {
        if items.len() > max {
            issues.push(Issue::error(
                option.name.clone(),
                IssueReason::ArrayCardinality,
                format!(
                    "--{} allows at most {max} element(s), received {}",
                    option.name,
                    items.len()
                ),
            ));
        }
    }
}

fn check_positionals(node: &CommandNode, args: &Arguments, issues: &mut Vec<Issue>) {
    // `args.positional` carries the command path as typed; declared
    // positionals arrive bound by name, the same as options.
    for positional in &node.positionals {
        let Some(value) = args.get(&positional.name) else {
            if positional.required {
                issues.push(Issue::error(
                    positional.name.clone(),
                    IssueReason::Missing,
                    format!(
                        "Missing required positional <{}> ({})",
                        positional.name,
                        positional.value_type.name()
                    ),
                ));
            }
            continue;
        };
        if !matches_type(positional.value_type, value) {
            issues.push(Issue::error(
                positional.name.clone(),
                IssueReason::TypeMismatch,
                format!(
                    "<{}> expects a {} but received {} value '{}'",
                    positional.name,
                    positional.value_type.name(),
                    value.type_name(),
                    value.render()
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chassis_types::{OptionSpec, PositionalSpec};

    fn greet_node() -> CommandNode {
        CommandNode::command("greet")
            .with_option(OptionSpec::new("name", ValueType::String).required())
            .with_handler("greet")
    }

    #[test]
    fn missing_required_option_reported() {
        let report = validate(&greet_node(), &Arguments::new());
        assert!(!report.valid);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].reason, IssueReason::Missing);
        assert_eq!(report.issues[0].subject, "name");
        assert!(report.issues[0].message.contains("--name"));
    }

    #[test]
    fn valid_arguments_produce_no_issues() {
        let args = Arguments::new().with_option("name", "Ada");
        let report = validate(&greet_node(), &args);
        assert!(report.valid);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn validation_is_deterministic() {
        let node = greet_node();
        let args = Arguments::new().with_option("unknown", "x");
        let first = validate(&node, &args);
        let second = validate(&node, &args);
        assert_eq!(first, second);
    }

    #[test]
    fn type_mismatch_reported() {
        let node = CommandNode::command("count")
            .with_option(OptionSpec::new("limit", ValueType::Number))
            .with_handler("count");
        let args = Arguments::new().with_option("limit", "not-a-number");
        let report = validate(&node, &args);
        assert!(!report.valid);
        assert_eq!(report.issues[0].reason, IssueReason::TypeMismatch);
    }

    #[test]
    fn numeric_strings_satisfy_number_options() {
        let node = CommandNode::command("count")
            .with_option(OptionSpec::new("limit", ValueType::Number))
            .with_handler("count");
        let args = Arguments::new().with_option("limit", "42");
        assert!(validate(&node, &args).valid);
    }

    #[test]
    fn allowed_values_enforced() {
        let node = CommandNode::command("set")
            .with_option(
                OptionSpec::new("level", ValueType::String)
                    .with_allowed_values(["low", "high"]),
            )
            .with_handler("set");
        let args = Arguments::new().with_option("level", "medium");
        let report = validate(&node, &args);
        assert_eq!(report.issues[0].reason, IssueReason::NotAllowedValue);
        assert!(report.issues[0].message.contains("low, high"));
    }

    #[test]
    fn conflict_reported_once_per_pair() {
        let node = CommandNode::command("fetch")
            .with_option(OptionSpec::new("quiet", ValueType::Boolean).conflicts_with("verbose"))
            .with_option(OptionSpec::new("verbose", ValueType::Boolean).conflicts_with("quiet"))
            .with_handler("fetch");
        let args = Arguments::new()
            .with_option("quiet", true)
            .with_option("verbose", true);
        let report = validate(&node, &args);
        let conflicts: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.reason == IssueReason::Conflict)
            .collect();
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn implied_option_missing_reported() {
        let node = CommandNode::command("push")
            .with_option(OptionSpec::new("tag", ValueType::String).implies("remote"))
            .with_option(OptionSpec::new("remote", ValueType::String))
            .with_handler("push");
        let args = Arguments::new().with_option("tag", "v1");
        let report = validate(&node, &args);
        assert_eq!(report.issues[0].reason, IssueReason::ImpliedMissing);
        assert_eq!(report.issues[0].subject, "remote");
    }

    #[test]
    fn range_violation_reported() {
        let node = CommandNode::command("scale")
            .with_option(OptionSpec::new("workers", ValueType::Number).with_range(1.0, 8.0))
            .with_handler("scale");
        let args = Arguments::new().with_option("workers", 12.0);
        let report = validate(&node, &args);
        assert_eq!(report.issues[0].reason, IssueReason::RangeViolation);
    }

    #[test]
    fn array_cardinality_enforced() {
        let node = CommandNode::command("tag")
            .with_option(
                OptionSpec::new("labels", ValueType::Array).with_cardinality(Some(1), Some(2)),
            )
            .with_handler("tag");

        let empty = Arguments::new().with_option("labels", ArgValue::Arr(vec![]));
        assert_eq!(
            validate(&node, &empty).issues[0].reason,
            IssueReason::ArrayCardinality
        );

        let overfull = Arguments::new().with_option(
            "labels",
            ArgValue::Arr(vec!["a".into(), "b".into(), "c".into()]),
        );
        assert_eq!(
            validate(&node, &overfull).issues[0].reason,
            IssueReason::ArrayCardinality
        );
    }

    #[test]
    fn unknown_option_reported() {
        let args = Arguments::new()
            .with_option("name", "Ada")
            .with_option("shout", true);
        let report = validate(&greet_node(), &args);
        assert!(!report.valid);
        assert_eq!(report.issues[0].reason, IssueReason::UnknownOption);
        assert_eq!(report.issues[0].subject, "shout");
    }

    #[test]
    fn profile_selector_options_are_known() {
        let node = CommandNode::command("deploy")
            .with_profile(chassis_types::ProfileRequirements {
                required: vec!["main".into()],
                optional: vec!["dep".into()],
            })
            .with_handler("deploy");
        let args = Arguments::new()
            .with_option("main-profile", "m1")
            .with_option("dep-profile", "d1");
        assert!(validate(&node, &args).valid);
    }

    #[test]
    fn missing_required_positional_reported() {
        let node = CommandNode::command("read")
            .with_positional(PositionalSpec::new("path", ValueType::String).required())
            .with_handler("read");
        let report = validate(&node, &Arguments::new());
        assert!(!report.valid);
        assert_eq!(report.issues[0].reason, IssueReason::Missing);
        assert!(report.issues[0].message.contains("<path>"));
    }

    #[test]
    fn bound_positional_passes_and_type_checks() {
        let node = CommandNode::command("retry")
            .with_positional(PositionalSpec::new("attempts", ValueType::Number).required())
            .with_handler("retry");

        let good = Arguments::with_positional(["retry"]).with_option("attempts", 3.0);
        assert!(validate(&node, &good).valid);

        let bad = Arguments::with_positional(["retry"]).with_option("attempts", "many");
        let report = validate(&node, &bad);
        assert!(!report.valid);
        assert_eq!(report.issues[0].reason, IssueReason::TypeMismatch);
        assert!(report.issues[0].message.contains("<attempts>"));
    }

    #[test]
    fn node_with_zero_options_accepts_empty_arguments() {
        let node = CommandNode::command("ping").with_handler("ping");
        let report = validate(&node, &Arguments::new());
        assert!(report.valid);
        assert!(report.issues.is_empty());
    }
}
