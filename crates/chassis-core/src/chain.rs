//! Argument linking between chained handler steps.
//!
//! Each step's arguments start as a shallow copy of the top-level invocation
//! arguments; declared mappings then pull values out of prior steps'
//! structured data and bind them by name. The path language is deliberately
//! trivial -- dotted field access and numeric array indices -- anything
//! richer is a handler concern.

use chassis_types::{ArgValue, Arguments, ChainedStep};

/// Evaluate a dotted path against a JSON value.
///
/// Segments name object fields; a segment that parses as an index steps into
/// arrays. An empty path yields the value itself. Missing segments yield
/// `None`.
pub fn eval_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    if path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for segment in path.split('.') {
        match current {
            serde_json::Value::Object(map) => {
                current = map.get(segment)?;
            }
            serde_json::Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                current = items.get(index)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Compute the arguments for one chain step.
///
/// Pure: the result depends only on the top-level arguments, the step's
/// declared mappings, and the prior steps' data. A mapping that references a
/// step at or beyond the current index, or a path that does not resolve,
/// binds `Null`; the receiving handler decides whether that is acceptable
/// input.
pub fn step_arguments(
    base: &Arguments,
    step: &ChainedStep,
    prior_data: &[serde_json::Value],
) -> Arguments {
    let mut arguments = base.clone();
    for mapping in &step.arg_mappings {
        let value = prior_data
            .get(mapping.from_step)
            .and_then(|data| eval_path(data, &mapping.json_path))
            .map(ArgValue::from_json)
            .unwrap_or(ArgValue::Null);
        arguments.set(mapping.to_arg.clone(), value);
    }
    arguments
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eval_path_walks_fields_and_indices() {
        let data = json!({"auth": {"tokens": ["first", "second"]}});
        assert_eq!(eval_path(&data, "auth.tokens.1"), Some(&json!("second")));
        assert_eq!(eval_path(&data, "auth.tokens.9"), None);
        assert_eq!(eval_path(&data, "auth.missing"), None);
        assert_eq!(eval_path(&data, ""), Some(&data));
    }

    #[test]
    fn eval_path_rejects_traversal_into_scalars() {
        let data = json!({"token": "T"});
        assert_eq!(eval_path(&data, "token.inner"), None);
    }

    #[test]
    fn mapping_binds_value_from_prior_step() {
        let base = Arguments::with_positional(["login"]).with_option("user", "ada");
        let step = ChainedStep::new("h2").mapping(0, "token", "auth");
        let prior = vec![json!({"token": "T"})];

        let linked = step_arguments(&base, &step, &prior);
        assert_eq!(linked.get_str("auth"), Some("T"));
        // Top-level bindings are carried through untouched.
        assert_eq!(linked.get_str("user"), Some("ada"));
        assert_eq!(linked.positional, vec!["login".to_string()]);
    }

    #[test]
    fn mapping_replaces_prior_binding() {
        let base = Arguments::new().with_option("auth", "stale");
        let step = ChainedStep::new("h2").mapping(0, "token", "auth");
        let prior = vec![json!({"token": "fresh"})];

        let linked = step_arguments(&base, &step, &prior);
        assert_eq!(linked.get_str("auth"), Some("fresh"));
    }

    #[test]
    fn missing_path_binds_null() {
        let base = Arguments::new();
        let step = ChainedStep::new("h2").mapping(0, "absent.path", "auth");
        let prior = vec![json!({"token": "T"})];

        let linked = step_arguments(&base, &step, &prior);
        assert_eq!(linked.get("auth"), Some(&ArgValue::Null));
    }

    #[test]
    fn out_of_range_step_binds_null() {
        let base = Arguments::new();
        let step = ChainedStep::new("h2").mapping(5, "token", "auth");

        let linked = step_arguments(&base, &step, &[]);
        assert_eq!(linked.get("auth"), Some(&ArgValue::Null));
    }

    #[test]
    fn linking_is_deterministic() {
        let base = Arguments::new().with_option("keep", "k");
        let step = ChainedStep::new("h2")
            .mapping(0, "a", "x")
            .mapping(1, "b.0", "y");
        let prior = vec![json!({"a": 1}), json!({"b": [true]})];

        let first = step_arguments(&base, &step, &prior);
        let second = step_arguments(&base, &step, &prior);
        assert_eq!(first, second);
        assert_eq!(first.get("x"), Some(&ArgValue::Num(1.0)));
        assert_eq!(first.get("y"), Some(&ArgValue::Bool(true)));
    }
}
