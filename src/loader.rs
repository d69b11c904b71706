//! Configuration file loading: property and JSON formats, cascading
//! "parent" resolution, and template realization over the merged result.
//!
//! The format is picked by file extension. Property files
//! (`.properties`/`.conf`) parse into string values; JSON files parse into
//! structured values. A file may name one or more parent files under a
//! configurable parent key; parents are resolved recursively, child entries
//! override parent entries, and the parent key itself is removed from the
//! resolved map.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ConfigError;
use crate::state::ConfigMap;
use crate::template;

/// Read a single config file, format picked by extension.
pub fn load_config(path: impl AsRef<Path>) -> Result<ConfigMap, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    match extension(path) {
        Some("properties") | Some("conf") => Ok(parse_properties(&text)),
        Some("json") => {
            let value: Value =
                serde_json::from_str(&text).map_err(|e| ConfigError::ParseFile {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            match value {
                Value::Object(entries) => Ok(entries.into_iter().collect()),
                _ => Err(ConfigError::ParseFile {
                    path: path.display().to_string(),
                    message: "top-level JSON value is not an object".into(),
                }),
            }
        }
        _ => Err(ConfigError::UnsupportedFormat {
            path: path.display().to_string(),
        }),
    }
}

/// Read a config file resolving its parent chain.
///
/// The parent key's value names one or more parent files, either a
/// comma-separated string or a JSON array of strings. Parents load first
/// (recursively), the child's own entries override them, and the parent key
/// is removed from the result. A parent chain that loops back on itself is
/// rejected.
pub fn load_cascading(path: impl AsRef<Path>, parent_key: &str) -> Result<ConfigMap, ConfigError> {
    let mut ancestors = Vec::new();
    load_cascading_inner(path.as_ref(), parent_key, &mut ancestors)
}

fn load_cascading_inner(
    path: &Path,
    parent_key: &str,
    ancestors: &mut Vec<PathBuf>,
) -> Result<ConfigMap, ConfigError> {
    // a file naming one of its own descendants as a parent would recurse
    // forever; shared parents of unrelated branches remain allowed
    let identity = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if ancestors.contains(&identity) {
        return Err(ConfigError::Parent {
            path: path.display().to_string(),
            message: "parent chain loops back to an already-loaded file".into(),
        });
    }

    let config = load_config(path)?;
    let Some(parent_value) = config.get(parent_key) else {
        return Ok(config);
    };
    let parents = parent_names(path, parent_value)?;

    ancestors.push(identity);
    let mut result = ConfigMap::new();
    let mut outcome = Ok(());
    for parent in &parents {
        // parent paths are taken relative to the child's directory
        let parent_path = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(parent),
            _ => Path::new(parent).to_path_buf(),
        };
        match load_cascading_inner(&parent_path, parent_key, ancestors) {
            Ok(parent_config) => result.extend(parent_config),
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }
    ancestors.pop();
    outcome?;

    result.extend(config);
    result.remove(parent_key);
    Ok(result)
}

/// Load and merge several files (each with cascading parent resolution) in
/// order, then realize `${var}` templates over the merged map.
pub fn resolve_config<I, P>(paths: I, parent_key: Option<&str>) -> Result<ConfigMap, ConfigError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut merged = ConfigMap::new();
    for path in paths {
        let config = match parent_key {
            Some(key) => load_cascading(path, key)?,
            None => load_config(path)?,
        };
        merged.extend(config);
    }
    Ok(template::realize(&merged)?)
}

/// Write a config map, format picked by extension. For property files,
/// `escape` backslash-quotes `$` so values survive a later realization
/// pass literally.
pub fn write_config(
    path: impl AsRef<Path>,
    config: &ConfigMap,
    escape: bool,
) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let text = match extension(path) {
        Some("properties") | Some("conf") => serialize_properties(config, escape),
        Some("json") => {
            let object: serde_json::Map<String, Value> =
                config.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            serde_json::to_string_pretty(&Value::Object(object)).map_err(|e| {
                ConfigError::ParseFile {
                    path: path.display().to_string(),
                    message: e.to_string(),
                }
            })?
        }
        _ => {
            return Err(ConfigError::UnsupportedFormat {
                path: path.display().to_string(),
            })
        }
    };
    fs::write(path, text).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

fn parent_names(path: &Path, value: &Value) -> Result<Vec<String>, ConfigError> {
    let names: Vec<String> = match value {
        Value::String(s) => s.split(',').map(|n| n.trim().to_string()).collect(),
        Value::Array(items) => {
            let mut names = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => names.push(s.trim().to_string()),
                    other => {
                        return Err(ConfigError::Parent {
                            path: path.display().to_string(),
                            message: format!("expected string filename, got {}", other),
                        })
                    }
                }
            }
            names
        }
        other => {
            return Err(ConfigError::Parent {
                path: path.display().to_string(),
                message: format!("expected one or more filenames, got {}", other),
            })
        }
    };
    if names.iter().any(|n| n.is_empty()) {
        return Err(ConfigError::Parent {
            path: path.display().to_string(),
            message: "empty parent config filename".into(),
        });
    }
    Ok(names)
}

/// Parse property-file text: `#`/`!` comments, `=`/`:` separators,
/// backslash line continuation, and `\n`/`\t`/`\\` escapes in values.
fn parse_properties(text: &str) -> ConfigMap {
    let mut config = ConfigMap::new();
    let mut pending = String::new();

    for raw_line in text.lines() {
        let line = raw_line.trim_start();
        if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!'))
        {
            continue;
        }

        if let Some(stripped) = continuation(line) {
            pending.push_str(stripped);
            continue;
        }
        pending.push_str(line);

        let logical = std::mem::take(&mut pending);
        if let Some((key, value)) = split_property(&logical) {
            config.insert(key, Value::String(value));
        }
    }
    // trailing continuation without a final line
    if !pending.is_empty() {
        if let Some((key, value)) = split_property(&pending) {
            config.insert(key, Value::String(value));
        }
    }
    config
}

/// An odd number of trailing backslashes continues the logical line.
fn continuation(line: &str) -> Option<&str> {
    let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
    if trailing % 2 == 1 {
        Some(&line[..line.len() - 1])
    } else {
        None
    }
}

fn split_property(line: &str) -> Option<(String, String)> {
    let sep = line.find(['=', ':'])?;
    let key = line[..sep].trim().to_string();
    if key.is_empty() {
        return None;
    }
    let value = unescape(line[sep + 1..].trim());
    Some((key, value))
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                // unknown escapes pass through untouched, '\$' stays for
                // the template layer to interpret
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

fn serialize_properties(config: &ConfigMap, escape: bool) -> String {
    let mut keys: Vec<&String> = config.keys().collect();
    keys.sort();

    let mut out = String::new();
    for key in keys {
        let value = match &config[key] {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let value = if escape {
            template::escape(&value)
        } else {
            value
        };
        out.push_str(key);
        out.push('=');
        out.push_str(&value.replace('\n', "\\n").replace('\t', "\\t"));
        out.push('\n');
    }
    out
}
