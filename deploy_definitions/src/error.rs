use std::fmt::{self, Display};

use failure::{Backtrace, Context, Fail};

/// Every fallible operation in the engine resolves to one of these
/// kinds. Matching on `DeployError::kind` is how callers
/// distinguish "expected, recoverable" failures (`ConcurrentOperation`,
/// `ChartTimeout`) from "something is actually broken" (`Configuration`).
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum DeployErrorKind {
    /// Invalid options, unknown strategy, invalid timeouts. Surfaced
    /// immediately, no side effects have happened yet.
    #[fail(display = "configuration error: {}", _0)]
    Configuration(String),

    /// An external tool or the cluster itself is unreachable, or a
    /// required credential is missing and cannot be auto-generated.
    #[fail(display = "missing prerequisite: {}", _0)]
    MissingPrerequisite(String),

    /// The operation lock registry denied the lock for `(namespace, release)`.
    #[fail(display = "concurrent operation in progress for {}/{}", _0, _1)]
    ConcurrentOperation(String, String),

    /// A chart exceeded its per-chart deadline. Carries the configured
    /// timeout so the message is distinguishable from a generic failure.
    #[fail(display = "chart deployment timed out after {:?}", _0)]
    ChartTimeout(std::time::Duration),

    /// Classifier output: the error text matched an ownership-conflict
    /// pattern.
    #[fail(display = "ownership conflict: {}", _0)]
    OwnershipConflict(String),

    /// Classifier output: the error text matched a resource-conflict
    /// pattern.
    #[fail(display = "resource conflict: {}", _0)]
    ResourceConflict(String),

    /// Classifier output: matched a retriable-transient pattern.
    #[fail(display = "retriable transient error: {}", _0)]
    RetriableTransient(String),

    /// Classifier output: none of the known patterns matched.
    #[fail(display = "non-retriable error: {}", _0)]
    NonRetriable(String),

    /// Composite: a chart failure that aborted its layer.
    #[fail(display = "layer {} failed: {}", _0, _1)]
    LayerFailed(String, String),

    /// Composite: wraps the original deploy error and the rollback outcome.
    #[fail(display = "rollback failed (deploy cause: {}; rollback cause: {})", _0, _1)]
    RollbackFailed(String, String),
}

/// The engine's error type: a `DeployErrorKind` plus the usual `failure`
/// backtrace/context plumbing, shared across the whole crate instead of
/// being re-derived per subsystem.
#[derive(Debug)]
pub struct DeployError {
    inner: Context<DeployErrorKind>,
}

impl DeployError {
    pub fn kind(&self) -> &DeployErrorKind {
        self.inner.get_context()
    }
}

impl Fail for DeployError {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Display for DeployError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl From<DeployErrorKind> for DeployError {
    fn from(kind: DeployErrorKind) -> DeployError {
        DeployError { inner: Context::new(kind) }
    }
}

impl From<Context<DeployErrorKind>> for DeployError {
    fn from(inner: Context<DeployErrorKind>) -> DeployError {
        DeployError { inner }
    }
}

pub type Result<T> = std::result::Result<T, failure::Error>;
