//! Error types for pgmob operations.

use crate::kind::ObjectKind;
use std::fmt;

/// The primary error type for all pgmob operations.
#[derive(Debug)]
pub enum Error {
    /// An operation was invoked in an invalid local state
    Usage(UsageError),
    /// A remote row expected to exist is gone
    NotFound(NotFoundError),
    /// The execution boundary reported a failure
    Execution(ExecutionError),
    /// A result row does not fit the mapper of the target kind
    Mapping(MappingError),
    /// Value conversion errors
    Type(TypeError),
    /// Configuration errors
    Config(ConfigError),
}

#[derive(Debug)]
pub struct UsageError {
    pub kind: UsageErrorKind,
    /// Display label of the object involved, if any
    pub object: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageErrorKind {
    /// Alteration requested on an object that does not exist remotely yet
    Ephemeral,
    /// Creation requested on an object that already exists remotely
    AlreadyCreated,
    /// The object was dropped through this handle
    Dropped,
    /// No alter statement is registered for the attribute
    NoTemplate,
    /// Collection key lookup failed
    MissingKey,
    /// Collection already holds the key
    DuplicateKey,
    /// A statement template could not be expanded
    Template,
    /// Bound parameters do not match the statement's placeholders
    Parameters,
}

#[derive(Debug)]
pub struct NotFoundError {
    pub kind: ObjectKind,
    /// Identity that was looked up, e.g. an oid or a slot name
    pub identity: String,
}

#[derive(Debug)]
pub struct ExecutionError {
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct MappingError {
    pub kind: ObjectKind,
    /// Attribute being decoded when the failure happened
    pub attribute: Option<String>,
    pub message: String,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl UsageError {
    pub fn new(kind: UsageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            object: None,
            message: message.into(),
        }
    }

    /// Attach the display label of the object involved.
    pub fn on(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            sql: None,
            sqlstate: None,
            message: message.into(),
            detail: None,
            hint: None,
            source: None,
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    /// Is this a permission failure (SQLSTATE class 42501)?
    pub fn is_insufficient_privilege(&self) -> bool {
        self.sqlstate.as_deref() == Some("42501")
    }

    /// Is this a duplicate object failure (42710 / 42P07 / 42P04)?
    pub fn is_duplicate_object(&self) -> bool {
        matches!(
            self.sqlstate.as_deref(),
            Some("42710" | "42P07" | "42P04" | "42P06")
        )
    }
}

impl MappingError {
    /// Row arity does not match the mapper's attribute list.
    pub fn arity(kind: ObjectKind, expected: usize, actual: usize) -> Self {
        Self {
            kind,
            attribute: None,
            message: format!("expected {expected} fields, row has {actual}"),
        }
    }

    pub fn attribute(
        kind: ObjectKind,
        attribute: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            attribute: Some(attribute.into()),
            message: message.into(),
        }
    }
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

impl Error {
    pub fn usage(kind: UsageErrorKind, message: impl Into<String>) -> Self {
        Error::Usage(UsageError::new(kind, message))
    }

    pub fn not_found(kind: ObjectKind, identity: impl fmt::Display) -> Self {
        Error::NotFound(NotFoundError {
            kind,
            identity: identity.to_string(),
        })
    }

    /// The usage error kind, if this is a usage error.
    pub fn usage_kind(&self) -> Option<UsageErrorKind> {
        match self {
            Error::Usage(e) => Some(e.kind),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Get SQLSTATE if available (e.g., "42501" for insufficient privilege)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Execution(e) => e.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Execution(e) => e.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Usage(e) => write!(f, "Usage error: {}", e),
            Error::NotFound(e) => write!(f, "Not found: {}", e),
            Error::Execution(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Execution error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Execution error: {}", e.message)
                }
            }
            Error::Mapping(e) => write!(f, "Mapping error: {}", e),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Execution(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.object {
            Some(object) => write!(f, "{}: {}", object, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} no longer exists", self.kind, self.identity)
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Some(attribute) => write!(f, "{}.{}: {}", self.kind, attribute, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<UsageError> for Error {
    fn from(err: UsageError) -> Self {
        Error::Usage(err)
    }
}

impl From<NotFoundError> for Error {
    fn from(err: NotFoundError) -> Self {
        Error::NotFound(err)
    }
}

impl From<ExecutionError> for Error {
    fn from(err: ExecutionError) -> Self {
        Error::Execution(err)
    }
}

impl From<MappingError> for Error {
    fn from(err: MappingError) -> Self {
        Error::Mapping(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(ConfigError {
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

/// Result type alias for pgmob operations.
pub type Result<T> = std::result::Result<T, Error>;
