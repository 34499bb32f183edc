use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The provider-neutral signature of a failed provider call. Provider bindings map their own
/// error codes onto these so that the lifecycle logic can decide what is fatal, what is a
/// warning, and what is worth retrying.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallErrorKind {
    /// The resource already exists, e.g. a role with the same name.
    AlreadyExists,
    /// The resource does not exist (anymore).
    NotFound,
    /// The resource is still referenced by another resource.
    DependencyViolation,
    /// A freshly created instance profile is not yet visible to the compute service.
    ProfilePropagating,
    /// A quota was hit. Binding a role to a profile that already has one reports this.
    LimitExceeded,
    /// The credentials are missing, expired or lack permission.
    Unauthorized,
    /// The service throttled the call or could not be reached. The same call may succeed later.
    Transient,
    Other,
}

serde_plain::derive_display_from_serialize!(CallErrorKind);

/// The error returned by every [`CloudApi`](crate::CloudApi) call.
#[derive(Clone, Debug)]
pub struct CallError {
    kind: CallErrorKind,
    code: Option<String>,
    message: String,
}

pub type CallResult<T> = std::result::Result<T, CallError>;

impl CallError {
    pub fn new<S>(kind: CallErrorKind, message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// Attach the provider's raw error code.
    pub fn with_code<S>(mut self, code: S) -> Self
    where
        S: Into<String>,
    {
        self.code = Some(code.into());
        self
    }

    pub fn kind(&self) -> CallErrorKind {
        self.kind
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind == CallErrorKind::AlreadyExists
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == CallErrorKind::NotFound
    }

    pub fn is_transient(&self) -> bool {
        self.kind == CallErrorKind::Transient
    }
}

impl Display for CallError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for CallError {}
