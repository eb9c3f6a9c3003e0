//! `${path}` placeholder resolution for step parameters.

use crate::types::Task;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use synapse_core::Params;

/// Path segment naming the most recently completed step.
const PREVIOUS: &str = "previous";

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));

/// Resolves placeholders in every top-level string parameter.
///
/// A parameter that consists of exactly one placeholder receives the resolved
/// JSON value itself; placeholders embedded in longer text are replaced by the
/// value's string form. Unresolvable placeholders are left as written and
/// substituted text is never re-scanned.
pub fn enrich_params(params: &Params, task: &Task) -> Params {
    params
        .iter()
        .map(|(key, value)| {
            let resolved = match value {
                Value::String(s) if s.contains("${") => resolve_string(s, task),
                other => other.clone(),
            };
            (key.clone(), resolved)
        })
        .collect()
}

fn resolve_string(text: &str, task: &Task) -> Value {
    let re = &*PLACEHOLDER;

    if let Some(caps) = re.captures(text) {
        if caps.get(0).is_some_and(|m| m.as_str().len() == text.len()) {
            return match lookup(&caps[1], task) {
                Some(value) => value,
                None => Value::String(text.to_string()),
            };
        }
    }

    let replaced = re.replace_all(text, |caps: &regex::Captures<'_>| {
        match lookup(&caps[1], task) {
            Some(Value::String(s)) => s,
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        }
    });
    Value::String(replaced.into_owned())
}

/// Looks up a dotted path. `null` counts as unresolved.
fn lookup(path: &str, task: &Task) -> Option<Value> {
    let segments: Vec<&str> = path.split('.').map(str::trim).collect();
    let (first, rest) = segments.split_first()?;

    let (mut current, rest) = if *first == PREVIOUS {
        let result = task.last_completed()?.result.as_ref()?;
        // `previous.result` addresses the step's result itself.
        let rest = match rest.split_first() {
            Some((&"result", tail)) => tail,
            _ => rest,
        };
        (result, rest)
    } else {
        let root = task.results.get(*first).or_else(|| task.context.get(*first))?;
        (root, rest)
    };

    for segment in rest {
        current = match current {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    match current {
        Value::Null => None,
        value => Some(value.clone()),
    }
}
