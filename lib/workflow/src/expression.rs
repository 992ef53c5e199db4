//! Parameter expressions.
//!
//! A parameter string may embed `{{ ... }}` expressions evaluated against the
//! current input item. Supported roots are `$json`, `$itemIndex` and
//! `$runIndex`; `$json` accepts `.field`, `[0]` and `["quoted key"]` accessors.
//!
//! A string consisting of a single expression yields the raw JSON value, so
//! `"{{ $json.count }}"` resolves to a number. Anything else interpolates.

use crate::error::ExpressionError;
use crate::item::JsonObject;
use serde_json::Value as JsonValue;

/// What expressions are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionScope<'a> {
    pub json: &'a JsonObject,
    pub item_index: usize,
    pub run_index: usize,
}

/// True when a string contains an expression.
#[must_use]
pub fn is_expression(value: &str) -> bool {
    value.contains("{{")
}

/// Resolves every expression inside a parameter value, recursively.
///
/// # Errors
///
/// Returns an error for unknown variables, malformed accessors or unclosed
/// expressions.
pub fn resolve(value: &JsonValue, scope: &ExpressionScope<'_>) -> Result<JsonValue, ExpressionError> {
    match value {
        JsonValue::String(text) if is_expression(text) => resolve_template(text, scope),
        JsonValue::Array(values) => values
            .iter()
            .map(|value| resolve(value, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),
        JsonValue::Object(map) => map
            .iter()
            .map(|(key, value)| Ok((key.clone(), resolve(value, scope)?)))
            .collect::<Result<JsonObject, ExpressionError>>()
            .map(JsonValue::Object),
        other => Ok(other.clone()),
    }
}

enum Segment<'a> {
    Text(&'a str),
    Expression(&'a str),
}

fn resolve_template(template: &str, scope: &ExpressionScope<'_>) -> Result<JsonValue, ExpressionError> {
    let segments = parse_template(template)?;

    if let [Segment::Expression(expression)] = segments.as_slice() {
        return evaluate(expression, scope);
    }

    let mut output = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => output.push_str(text),
            Segment::Expression(expression) => match evaluate(expression, scope)? {
                JsonValue::Null => {}
                JsonValue::String(text) => output.push_str(&text),
                other => output.push_str(&other.to_string()),
            },
        }
    }
    Ok(JsonValue::String(output))
}

fn parse_template(template: &str) -> Result<Vec<Segment<'_>>, ExpressionError> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            segments.push(Segment::Text(&rest[..start]));
        }
        let after_open = &rest[start + 2..];
        let end = after_open.find("}}").ok_or_else(|| ExpressionError {
            expression: template.to_string(),
            reason: "missing closing '}}'".to_string(),
        })?;
        segments.push(Segment::Expression(&after_open[..end]));
        rest = &after_open[end + 2..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }

    // Surrounding whitespace does not turn a lone expression into a string.
    if segments.len() > 1
        && segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Expression(_)))
            .count()
            == 1
        && segments
            .iter()
            .all(|segment| !matches!(segment, Segment::Text(text) if !text.trim().is_empty()))
    {
        segments.retain(|segment| matches!(segment, Segment::Expression(_)));
    }
    Ok(segments)
}

fn evaluate(expression: &str, scope: &ExpressionScope<'_>) -> Result<JsonValue, ExpressionError> {
    let expr = expression.trim();
    let error = |reason: String| ExpressionError {
        expression: expr.to_string(),
        reason,
    };

    let root_end = expr
        .find(|c: char| c == '.' || c == '[')
        .unwrap_or(expr.len());
    let (root, mut rest) = expr.split_at(root_end);

    let mut current = match root.trim() {
        "$json" => JsonValue::Object(scope.json.clone()),
        "$itemIndex" => JsonValue::from(scope.item_index),
        "$runIndex" => JsonValue::from(scope.run_index),
        other => return Err(error(format!("unknown variable '{other}'"))),
    };

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after
                .find(|c: char| c == '.' || c == '[')
                .unwrap_or(after.len());
            let key = after[..end].trim();
            if key.is_empty() {
                return Err(error("empty property name".to_string()));
            }
            current = current.get(key).cloned().unwrap_or(JsonValue::Null);
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after
                .find(']')
                .ok_or_else(|| error("missing closing ']'".to_string()))?;
            let accessor = after[..end].trim();
            current = match unquote(accessor) {
                Some(key) => current.get(key).cloned().unwrap_or(JsonValue::Null),
                None => {
                    let index: usize = accessor
                        .parse()
                        .map_err(|_| error(format!("invalid index '{accessor}'")))?;
                    current.get(index).cloned().unwrap_or(JsonValue::Null)
                }
            };
            rest = &after[end + 1..];
        } else if rest.trim().is_empty() {
            break;
        } else {
            return Err(error(format!("unexpected '{rest}'")));
        }
    }
    Ok(current)
}

fn unquote(accessor: &str) -> Option<&str> {
    ['"', '\''].into_iter().find_map(|quote| {
        accessor
            .strip_prefix(quote)
            .and_then(|inner| inner.strip_suffix(quote))
    })
}
