use std::fmt;
use thiserror::Error as ThisError;

///
/// GridError
///
/// Structured runtime error with a stable internal classification.
/// Validation errors surface before any statement is built; execution
/// errors carry the failing statement's context on the job outcome.
///

#[derive(Clone, Debug, ThisError)]
#[error("{message}")]
pub struct GridError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl GridError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
        }
    }

    /// Construct a validation error for a specific origin.
    pub(crate) fn validation(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Validation, origin, message)
    }

    /// Construct an execution error for a specific origin.
    pub(crate) fn execution(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Execution, origin, message)
    }

    /// Construct a resource error for a specific origin.
    pub(crate) fn resource(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Resource, origin, message)
    }

    /// Construct a sync-origin busy rejection.
    pub(crate) fn busy(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Busy, ErrorOrigin::Sync, message)
    }

    /// Construct an invariant violation for a specific origin.
    pub(crate) fn invariant(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, origin, message)
    }

    /// Construct an unsupported-operation error for a specific origin.
    pub(crate) fn unsupported(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, origin, message)
    }

    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self.class, ErrorClass::Busy)
    }

    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self.class, ErrorClass::Validation)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

impl From<ContainerError> for GridError {
    fn from(err: ContainerError) -> Self {
        Self::execution(ErrorOrigin::Container, err.to_string())
    }
}

///
/// ContainerError
///
/// Boundary error produced by injected collaborators (execution contexts,
/// transaction managers, data containers). Never used for engine-internal
/// failures; always wrapped into [`GridError`] at the engine boundary.
///

#[derive(Clone, Debug, ThisError)]
pub enum ContainerError {
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("connection lost: {0}")]
    Disconnected(String),

    #[error("unsupported by container: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Validation,
    Execution,
    Resource,
    Busy,
    Unsupported,
    InvariantViolation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validation => "validation",
            Self::Execution => "execution",
            Self::Resource => "resource",
            Self::Busy => "busy",
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Model,
    Ledger,
    Store,
    Synthesizer,
    Sync,
    Pager,
    Container,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Model => "model",
            Self::Ledger => "ledger",
            Self::Store => "store",
            Self::Synthesizer => "synthesizer",
            Self::Sync => "sync",
            Self::Pager => "pager",
            Self::Container => "container",
        };
        write!(f, "{label}")
    }
}
