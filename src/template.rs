//! `${var}` template substitution over configuration values.
//!
//! String values may reference other entries (`$name` or `${name}`), with
//! `|`-separated fallback alternatives. Each alternative is tried first
//! against the process environment, then against the top-level keys of the
//! map being realized. Resolved values are themselves realized, so chains
//! of references expand fully. `\$` escapes the marker.

use serde_json::Value;

use crate::error::TemplateError;
use crate::state::ConfigMap;

/// Expansion depth bound; a reference cycle errors out instead of
/// overflowing the stack.
const MAX_DEPTH: usize = 64;

/// Realize every value in the map, recursing into arrays and nested
/// objects. The input map is the variable lookup source throughout.
pub fn realize(config: &ConfigMap) -> Result<ConfigMap, TemplateError> {
    let mut result = ConfigMap::with_capacity(config.len());
    for (key, value) in config {
        result.insert(key.clone(), realize_value(value, config, 0)?);
    }
    Ok(result)
}

/// Quote a string so it survives realization literally: every `$` gets a
/// backslash, so any variable reference in it is no longer evaluated.
pub fn escape(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for ch in token.chars() {
        if ch == '$' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn realize_value(value: &Value, lookup: &ConfigMap, depth: usize) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) => Ok(Value::String(realize_str(s, lookup, depth)?)),
        Value::Array(items) => {
            let realized: Result<Vec<_>, _> = items
                .iter()
                .map(|item| realize_value(item, lookup, depth))
                .collect();
            Ok(Value::Array(realized?))
        }
        Value::Object(entries) => {
            let mut realized = serde_json::Map::with_capacity(entries.len());
            for (key, item) in entries {
                realized.insert(key.clone(), realize_value(item, lookup, depth)?);
            }
            Ok(Value::Object(realized))
        }
        other => Ok(other.clone()),
    }
}

fn realize_str(template: &str, lookup: &ConfigMap, depth: usize) -> Result<String, TemplateError> {
    if depth > MAX_DEPTH {
        return Err(TemplateError::RecursionLimit {
            template: template.to_string(),
        });
    }

    let chars: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len());
    let mut in_var = false;
    let mut bracket = false;
    let mut var_name = String::new();

    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if in_var {
            if var_name.is_empty() && !(bracket && ch == '}') {
                if ch == '{' {
                    if bracket {
                        return Err(TemplateError::Syntax {
                            template: template.to_string(),
                            message: "nested '{' in variable".into(),
                        });
                    }
                    bracket = true;
                } else if ch.is_alphabetic() || ch == '_' {
                    var_name.push(ch);
                } else {
                    return Err(TemplateError::Syntax {
                        template: template.to_string(),
                        message: format!("illegal start of variable name at '{}'", ch),
                    });
                }
            } else if (bracket && ch == '}') || !is_var_char(ch) {
                out.push_str(&expand(&var_name, template, lookup, depth)?);
                in_var = false;
                bracket = false;
                var_name.clear();
                if ch != '}' {
                    // keep the terminating char, it belongs to the output
                    continue;
                }
            } else {
                var_name.push(ch);
            }
        } else if ch == '$' {
            if out.ends_with('\\') {
                // escaped marker: drop the backslash, emit a literal '$'
                out.pop();
                out.push('$');
            } else {
                in_var = true;
                var_name.clear();
            }
        } else {
            out.push(ch);
        }
        i += 1;
    }
    if in_var {
        out.push_str(&expand(&var_name, template, lookup, depth)?);
    }
    Ok(out)
}

fn is_var_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '.' || ch == '-' || ch == '|'
}

/// Resolve one variable expression (possibly `|`-separated alternatives) and
/// realize the resolved value in turn.
fn expand(
    expr: &str,
    template: &str,
    lookup: &ConfigMap,
    depth: usize,
) -> Result<String, TemplateError> {
    if expr.is_empty() {
        return Err(TemplateError::Syntax {
            template: template.to_string(),
            message: "dangling variable marker".into(),
        });
    }
    for name in expr.split('|') {
        if let Ok(env_value) = std::env::var(name) {
            return realize_str(&env_value, lookup, depth + 1);
        }
        if let Some(value) = lookup.get(name) {
            return realize_str(&value_to_string(value), lookup, depth + 1);
        }
    }
    Err(TemplateError::Unresolved {
        template: template.to_string(),
        var: expr.to_string(),
    })
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
