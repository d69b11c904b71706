//! Key definitions: named, typed, validated, defaulted lookups.
//!
//! The store subsystem is agnostic to what a definition validates or
//! parses; it only needs the raw key and the resolve step. Definitions work
//! identically against every [`Store`] variant.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;
use crate::state::ConfigMap;
use crate::store::Store;

type Parser<T> = Arc<dyn Fn(&str, &Value) -> Result<T, StoreError> + Send + Sync>;
type Validator<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A typed lookup definition: raw key, value parser, optional validator and
/// optional default.
///
/// # Example
///
/// ```ignore
/// let port = KeyDef::<i64>::int("server.port")
///     .with_default(8080)
///     .with_validator(|p| (1..=65535).contains(p), "a port number");
/// let value = lookup(&store, &port).await?;
/// ```
#[derive(Clone)]
pub struct KeyDef<T> {
    key: String,
    description: Option<String>,
    parser: Parser<T>,
    validator: Option<(Validator<T>, String)>,
    default: Option<T>,
}

impl<T> KeyDef<T>
where
    T: Clone + Send + Sync,
{
    /// Create a definition with a custom parser.
    pub fn new<F>(key: impl Into<String>, parser: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<T, StoreError> + Send + Sync + 'static,
    {
        KeyDef {
            key: key.into(),
            description: None,
            parser: Arc::new(parser),
            validator: None,
            default: None,
        }
    }

    /// Value to fall back to when the key is absent.
    pub fn with_default(mut self, default: T) -> Self {
        self.default = Some(default);
        self
    }

    /// Predicate the parsed value must satisfy, with a short expectation
    /// text used in the error message.
    pub fn with_validator<F>(mut self, validator: F, expectation: impl Into<String>) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.validator = Some((Arc::new(validator), expectation.into()));
        self
    }

    /// Human-readable description for diagnostics.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The raw lookup key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Resolve this definition against a snapshot: fetch the raw value (or
    /// fall back to the default), parse, validate.
    pub fn resolve(&self, data: &ConfigMap) -> Result<T, StoreError> {
        let value = match data.get(&self.key) {
            Some(raw) => (self.parser)(&self.key, raw)?,
            None => match &self.default {
                Some(default) => default.clone(),
                None => {
                    return Err(StoreError::MissingKey {
                        key: self.key.clone(),
                    })
                }
            },
        };
        if let Some((validator, expectation)) = &self.validator {
            if !validator(&value) {
                return Err(StoreError::validation(
                    &self.key,
                    format!("expected {}", expectation),
                ));
            }
        }
        Ok(value)
    }
}

impl KeyDef<String> {
    /// A string-valued key. Scalar raw values are stringified.
    pub fn string(key: impl Into<String>) -> Self {
        KeyDef::new(key, |key, raw| match raw {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(StoreError::parse(key, format!("expected string, got {}", other))),
        })
    }
}

impl KeyDef<i64> {
    /// An integer-valued key. String raw values are parsed, the way
    /// property-file values arrive.
    pub fn int(key: impl Into<String>) -> Self {
        KeyDef::new(key, |key, raw| match raw {
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| StoreError::parse(key, format!("not an integer: {}", n))),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| StoreError::parse(key, format!("not an integer: '{}'", s))),
            other => Err(StoreError::parse(key, format!("expected integer, got {}", other))),
        })
    }
}

impl KeyDef<f64> {
    /// A float-valued key. String raw values are parsed.
    pub fn float(key: impl Into<String>) -> Self {
        KeyDef::new(key, |key, raw| match raw {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| StoreError::parse(key, format!("not a float: {}", n))),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| StoreError::parse(key, format!("not a float: '{}'", s))),
            other => Err(StoreError::parse(key, format!("expected float, got {}", other))),
        })
    }
}

impl KeyDef<bool> {
    /// A boolean-valued key. Accepts `true`/`false` strings in any case.
    pub fn bool(key: impl Into<String>) -> Self {
        KeyDef::new(key, |key, raw| match raw {
            Value::Bool(b) => Ok(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(StoreError::parse(key, format!("not a boolean: '{}'", s))),
            },
            other => Err(StoreError::parse(key, format!("expected boolean, got {}", other))),
        })
    }
}

impl KeyDef<Duration> {
    /// A duration key whose raw value is a millisecond count.
    pub fn duration_ms(key: impl Into<String>) -> Self {
        KeyDef::new(key, |key, raw| {
            let ms = match raw {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            };
            ms.map(Duration::from_millis)
                .ok_or_else(|| StoreError::parse(key, format!("expected milliseconds, got {}", raw)))
        })
    }
}

impl<T> KeyDef<T>
where
    T: Clone + Send + Sync + DeserializeOwned,
{
    /// A key deserialized from its raw JSON value via serde.
    pub fn json(key: impl Into<String>) -> Self {
        KeyDef::new(key, |key, raw| {
            serde_json::from_value(raw.clone()).map_err(|e| StoreError::parse(key, e.to_string()))
        })
    }
}

/// Uncached lookup: take the store's snapshot and resolve the definition.
///
/// The memoized counterpart is [`CachingStore::lookup`](crate::CachingStore::lookup).
pub async fn lookup<T>(store: &dyn Store, def: &KeyDef<T>) -> Result<T, StoreError>
where
    T: Clone + Send + Sync,
{
    let snapshot = store.snapshot().await?;
    def.resolve(&snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StaticStore;
    use serde::Deserialize;

    fn sample() -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert("host".into(), "localhost".into());
        map.insert("port".into(), "8080".into());
        map.insert("threads".into(), 4.into());
        map.insert("debug".into(), "TRUE".into());
        map.insert("timeout".into(), 1500.into());
        map.insert(
            "limits".into(),
            serde_json::json!({ "min": 1, "max": 9 }),
        );
        map
    }

    #[test]
    fn test_string_and_int_coercion() {
        let map = sample();
        assert_eq!(KeyDef::<String>::string("host").resolve(&map).unwrap(), "localhost");
        assert_eq!(KeyDef::<i64>::int("port").resolve(&map).unwrap(), 8080);
        assert_eq!(KeyDef::<i64>::int("threads").resolve(&map).unwrap(), 4);
        assert!(KeyDef::<bool>::bool("debug").resolve(&map).unwrap());
        assert_eq!(
            KeyDef::<Duration>::duration_ms("timeout").resolve(&map).unwrap(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_missing_key_uses_default_or_fails() {
        let map = sample();
        let with_default = KeyDef::<i64>::int("absent").with_default(42);
        assert_eq!(with_default.resolve(&map).unwrap(), 42);

        match KeyDef::<i64>::int("absent").resolve(&map) {
            Err(StoreError::MissingKey { key }) => assert_eq!(key, "absent"),
            other => panic!("expected MissingKey, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_failure() {
        let map = sample();
        match KeyDef::<i64>::int("host").resolve(&map) {
            Err(StoreError::Parse { key, .. }) => assert_eq!(key, "host"),
            other => panic!("expected Parse, got {:?}", other),
        }
    }

    #[test]
    fn test_validator_rejects() {
        let map = sample();
        let def = KeyDef::<i64>::int("port").with_validator(|p| *p < 1024, "a privileged port");
        match def.resolve(&map) {
            Err(StoreError::Validation { key, message }) => {
                assert_eq!(key, "port");
                assert!(message.contains("privileged"));
            }
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn test_validator_applies_to_default() {
        let map = ConfigMap::new();
        let def = KeyDef::<i64>::int("absent")
            .with_default(0)
            .with_validator(|v| *v > 0, "a positive number");
        assert!(matches!(def.resolve(&map), Err(StoreError::Validation { .. })));
    }

    #[test]
    fn test_json_key() {
        #[derive(Clone, Debug, PartialEq, Deserialize)]
        struct Limits {
            min: u32,
            max: u32,
        }
        let map = sample();
        let def = KeyDef::<Limits>::json("limits");
        assert_eq!(def.resolve(&map).unwrap(), Limits { min: 1, max: 9 });
    }

    #[tokio::test]
    async fn test_lookup_through_store_trait() {
        let store = StaticStore::new(sample());
        let port = KeyDef::<i64>::int("port");
        assert_eq!(lookup(&store, &port).await.unwrap(), 8080);
    }
}
