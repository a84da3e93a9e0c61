use crate::reconciler::ReconcileState;
use crate::resource::Operation;
use cluster_model::Cluster;
use snafu::Snafu;
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// The result type returned by [`Resource`](crate::Resource) operations and the [`Reconciler`](crate::Reconciler).
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by [`Resource`](crate::Resource) operations and the
/// [`Reconciler`](crate::Reconciler). Each variant names the resource it concerns so that callers
/// can tell which resource failed and branch on the kind of failure.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to apply {}: {}", resource, source))]
    ApplyFailed {
        resource: String,
        source: ClientError,
    },

    #[snafu(display(
        "Unable to compare snapshots of {}: actual is a '{}' and expected is a '{}'",
        resource,
        actual,
        expected
    ))]
    ComparisonFailed {
        resource: String,
        actual: String,
        expected: String,
    },

    #[snafu(display("Unable to delete {}: {}", resource, source))]
    DeleteFailed {
        resource: String,
        source: DeleteReason,
    },

    #[snafu(display("Resources form a dependency cycle: {}", resources.join(", ")))]
    DependencyCycle { resources: Vec<String> },

    #[snafu(display("Unable to {} while the reconciler is '{}'", operation, state))]
    InvalidState {
        operation: String,
        state: ReconcileState,
    },

    #[snafu(display("Invalid resource {}: {}", resource, reason))]
    InvalidResource { resource: String, reason: String },

    #[snafu(display(
        "Found {} objects tagged '{}' for {}, expected exactly one",
        found,
        tag,
        resource
    ))]
    LookupAmbiguous {
        resource: String,
        tag: String,
        found: usize,
    },

    #[snafu(display("Unable to look up {}: {}", resource, source))]
    LookupFailed {
        resource: String,
        source: ClientError,
    },

    #[snafu(display("Unable to render {}: {}", resource, reason))]
    Render { resource: String, reason: String },

    #[snafu(display("Unable to encode the '{}' snapshot of {}: {}", kind, resource, source))]
    SnapshotEncoding {
        resource: String,
        kind: String,
        source: serde_json::Error,
    },

    #[snafu(display("State store is unable to {}: {}", action, source))]
    Store {
        action: String,
        source: cluster_model::Error,
    },

    #[snafu(display("Unable to tag {}: {}", resource, source))]
    TagFailed {
        resource: String,
        source: ClientError,
    },

    #[snafu(display("{} of {} did not finish within {:?}", operation, resource, timeout))]
    Timeout {
        resource: String,
        operation: Operation,
        timeout: Duration,
    },

    #[snafu(display("{} depends on '{}' which is not declared", resource, dependency))]
    UnknownDependency {
        resource: String,
        dependency: String,
    },

    #[snafu(display("Invalid cluster: {}", source))]
    Validation { source: cluster_model::Error },
}

/// Why a delete could not be carried out.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DeleteReason {
    #[snafu(display("found {} matching objects, expected exactly one", found))]
    NotUnique { found: usize },

    #[snafu(display("{}", source))]
    Request { source: ClientError },
}

/// Returned when a reconciliation pass stops early. `rendered` holds the specification with the
/// changes of every resource that was applied before the failure so that it can be persisted.
#[derive(Debug)]
pub struct PartialApply {
    pub rendered: Cluster,
    pub error: Error,
}

impl Display for PartialApply {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Reconciliation of cluster '{}' stopped: {}",
            self.rendered.name, self.error
        )
    }
}

impl StdError for PartialApply {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.error)
    }
}

/// Returned when one or more resources could not be deleted. Every resource is attempted, so
/// `errors` holds one entry per failed resource and `rendered` reflects the deletions that
/// succeeded.
#[derive(Debug)]
pub struct PartialDestroy {
    pub rendered: Cluster,
    pub errors: Vec<Error>,
}

impl Display for PartialDestroy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unable to destroy {} resource(s) of cluster '{}'",
            self.errors.len(),
            self.rendered.name
        )?;
        for error in &self.errors {
            write!(f, "\n  - {}", error)?;
        }
        Ok(())
    }
}

impl StdError for PartialDestroy {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.errors.first().map(|e| e as &(dyn StdError + 'static))
    }
}

/// The error type returned by provider clients. Resources wrap it in the [`Error`] variant that
/// describes the operation that was underway.
#[derive(Debug)]
pub enum ClientError {
    /// The request could not be sent or no response was received.
    RequestFailed(Option<Box<dyn StdError + Send + Sync + 'static>>),

    /// The provider answered with a status code that indicates failure.
    Status { code: u16, body: String },

    /// The response was missing something that was expected to be present.
    MissingData(Option<ErrorMessage>),

    /// An error occurred serializing or deserializing.
    Serialization(Option<Box<dyn StdError + Send + Sync + 'static>>),
}

impl ClientError {
    pub fn request<E>(e: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self::RequestFailed(Some(e.into()))
    }

    pub fn missing<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        let message: String = message.into();
        Self::MissingData(Some(ErrorMessage::from(message)))
    }

    /// Whether trying the same request again might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::RequestFailed(_) => true,
            ClientError::Status { code, .. } => *code == 429 || *code >= 500,
            ClientError::MissingData(_) | ClientError::Serialization(_) => false,
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            ClientError::RequestFailed(_) => "Request failed",
            ClientError::Status { .. } => "Unexpected status",
            ClientError::MissingData(_) => "Missing data",
            ClientError::Serialization(_) => "Serialization error",
        }
    }

    fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            ClientError::RequestFailed(e) => e.as_ref().map(|some| some.as_ref()),
            ClientError::Status { .. } => None,
            ClientError::MissingData(s) => s
                .as_ref()
                .map(|some| some as &(dyn StdError + Send + Sync + 'static)),
            ClientError::Serialization(e) => e.as_ref().map(|some| some.as_ref()),
        }
    }
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let ClientError::Status { code, body } = self {
            return write!(f, "{} {}: {}", self.variant_name(), code, body);
        }
        match self.inner() {
            None => Display::fmt(self.variant_name(), f),
            Some(inner) => write!(f, "{}: {}", self.variant_name(), inner),
        }
    }
}

impl StdError for ClientError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner().map(|some| some as &(dyn StdError + 'static))
    }
}

/// This struct can serve as an `Error` type when you want to provide an error message, but have no
/// underlying error type. This can be useful for stub implementations of provider clients.
///
/// # Example
///
/// ```
/// # use resource_reconciler::error::ErrorMessage;
/// let _error: ErrorMessage = "Something bad happened".into();
/// ```
///
#[derive(Debug)]
pub struct ErrorMessage {
    message: String,
}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.message, f)
    }
}

impl<S: Into<String>> From<S> for ErrorMessage {
    fn from(s: S) -> Self {
        Self { message: s.into() }
    }
}

impl StdError for ErrorMessage {}
