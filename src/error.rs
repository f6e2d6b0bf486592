//! Error types for the cluster deletion controller
//!
//! A handful of variants are "kinds" the orchestrator branches on
//! (not-found, no-kind-match, already-exists, conflict). Everything else is
//! propagated to the reconciler, which requeues.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },

    /// The resource kind is not served by the target API server.
    #[error("no matches for kind {0:?}")]
    NoKindMatch(String),

    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: String, name: String },

    /// Write rejected because the object changed since it was read.
    #[error("conflict updating {kind} {name:?}: {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("GCP API error (HTTP {status}): {message}")]
    GcpError { status: u16, message: String },

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// Several independent operations failed in the same pass.
    #[error("{}", join_errors(.0))]
    Aggregate(Vec<Error>),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

fn join_errors(errors: &[Error]) -> String {
    match errors {
        [single] => single.to_string(),
        _ => format!(
            "[{}]",
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

impl Error {
    /// Collapse a list of errors; `None` when the list is empty.
    pub fn aggregate(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Aggregate(errors)),
        }
    }

    /// Wrap the error with a description of what was being attempted.
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any `Context` layers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Error::NotFound { .. } => true,
            Error::GcpError { status, .. } => *status == 404,
            _ => false,
        }
    }

    pub fn is_no_kind_match(&self) -> bool {
        matches!(self.root(), Error::NoKindMatch(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self.root(), Error::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), Error::Conflict { .. })
    }

    /// Whether a quick requeue is likely to help
    pub fn is_retriable(&self) -> bool {
        match self.root() {
            Error::Conflict { .. } | Error::Timeout(_) | Error::HttpError(_) => true,
            Error::KubeError(kube::Error::Api(e)) => e.code == 429 || e.code >= 500,
            Error::KubeError(_) => true,
            Error::GcpError { status, .. } => *status == 429 || *status >= 500,
            Error::Aggregate(errors) => errors.iter().any(Error::is_retriable),
            _ => false,
        }
    }
}

/// Attach context to the error side of a `Result`.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}
