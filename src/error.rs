/// Error type for store read and lookup operations.
///
/// Fetch failures are deliberately absent from this enum: they are reported
/// through the store's error handler side channel and recorded as
/// `last_error_at`, never surfaced to a reader synchronously.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// A read occurred before any fetch has ever succeeded and the staleness
    /// wait expired without fresh data arriving.
    #[error("store '{store}' is uninitialized: no fetch has succeeded yet")]
    Uninitialized { store: String },

    /// Data older than `stale_after` was observed and no fresher data arrived
    /// within `stale_timeout`.
    #[error("store '{store}' data is stale: no refresh within {waited_ms} ms")]
    StaleTimeout { store: String, waited_ms: u64 },

    /// The key was not found and the key definition carries no default.
    #[error("key '{key}' not found and no default is defined")]
    MissingKey { key: String },

    /// The raw value could not be parsed into the key definition's type.
    #[error("cannot parse value for key '{key}': {message}")]
    Parse { key: String, message: String },

    /// The parsed value was rejected by the key definition's validator.
    #[error("invalid value for key '{key}': {message}")]
    Validation { key: String, message: String },

    /// A memoized entry could not be downcast to the requested type. Two key
    /// definitions with the same raw key but different value types hit the
    /// same cache slot.
    #[error("cached value for key '{key}' has a different type")]
    CacheType { key: String },
}

impl StoreError {
    /// Create a parse error for the given key.
    pub fn parse(key: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Parse {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a validation error for the given key.
    pub fn validation(key: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Validation {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Error type for configuration file loading and template realization.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading or writing the file failed.
    #[error("cannot access config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file extension maps to no known format.
    #[error("unsupported config format for '{path}'")]
    UnsupportedFormat { path: String },

    /// The file content could not be parsed.
    #[error("error parsing config file '{path}': {message}")]
    ParseFile { path: String, message: String },

    /// The parent key of a cascading config is malformed.
    #[error("bad parent reference in '{path}': {message}")]
    Parent { path: String, message: String },

    /// Variable substitution failed.
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Error type for `${var}` template substitution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TemplateError {
    /// No environment variable or property value exists for the expression.
    #[error("template '{template}': no value found for variable '{var}'")]
    Unresolved { template: String, var: String },

    /// The template text itself is malformed.
    #[error("template '{template}': {message}")]
    Syntax { template: String, message: String },

    /// Substitution recursed past the depth limit, usually a variable cycle.
    #[error("template '{template}': recursion limit reached while expanding")]
    RecursionLimit { template: String },
}
