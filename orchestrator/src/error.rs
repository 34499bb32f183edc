use std::fmt::{Display, Formatter};

/// Every fatal error states whether cloud resources may have been left behind, so that the
/// operator knows whether a teardown is needed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Leftovers {
    /// Nothing was created before the failure.
    None,

    /// Resources were created before the failure. Running teardown for the cluster removes them.
    Remaining,

    /// It is not known whether resources were created.
    Unknown,
}

impl Leftovers {
    pub fn message(&self) -> &'static str {
        match self {
            Leftovers::None => "no cloud resources were left behind",
            Leftovers::Remaining => {
                "resources were left behind; remove them with 'xstrapolate teardown <name> --force'"
            }
            Leftovers::Unknown => {
                "resources may remain; make sure with 'xstrapolate teardown <name> --force'"
            }
        }
    }
}

impl Display for Leftovers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self.message(), f)
    }
}

/// The error type returned by the lifecycle operations.
#[derive(Debug)]
pub struct Error {
    /// Whether or not the error has left resources behind.
    leftovers: Leftovers,

    /// What was being attempted. Displayed before `inner`.
    context: Option<String>,

    /// What the operator can do about it.
    remediation: Option<String>,

    /// The error that caused this error.
    inner: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new_with_source_and_context<S, E>(leftovers: Leftovers, context: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self {
            leftovers,
            context: Some(context.into()),
            remediation: None,
            inner: Some(source.into()),
        }
    }

    pub fn new_with_context<S>(leftovers: Leftovers, context: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            leftovers,
            context: Some(context.into()),
            remediation: None,
            inner: None,
        }
    }

    /// Attach a hint telling the operator how to fix the problem.
    pub fn with_remediation<S>(mut self, remediation: S) -> Self
    where
        S: Into<String>,
    {
        self.remediation = Some(remediation.into());
        self
    }

    pub fn leftovers(&self) -> Leftovers {
        self.leftovers
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn remediation(&self) -> Option<&str> {
        self.remediation.as_deref()
    }

    pub fn inner(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.inner.as_ref().map(|some| some.as_ref())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.context() {
            Some(context) => write!(f, "{}", context)?,
            None => write!(f, "operation failed")?,
        }
        if let Some(inner) = self.inner() {
            write!(f, ": {}", inner)?;
        }
        if let Some(remediation) = self.remediation() {
            write!(f, "\nhint: {}", remediation)?;
        }
        write!(f, "\n{}", self.leftovers)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Converts errors and options into [`Error`] with a familiar `context` function.
pub trait IntoError<T> {
    fn context<S>(self, leftovers: Leftovers, message: S) -> Result<T>
    where
        S: Into<String>;
}

impl<T, E> IntoError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<S>(self, leftovers: Leftovers, message: S) -> Result<T>
    where
        S: Into<String>,
    {
        self.map_err(|e| Error::new_with_source_and_context(leftovers, message, e))
    }
}

impl<T> IntoError<T> for Option<T> {
    fn context<S>(self, leftovers: Leftovers, message: S) -> Result<T>
    where
        S: Into<String>,
    {
        self.ok_or_else(|| Error::new_with_context(leftovers, message))
    }
}

#[test]
fn display_includes_hint_and_leftovers() {
    let error = Error::new_with_context(Leftovers::Remaining, "unable to launch instance")
        .with_remediation("check the instance profile");
    let message = error.to_string();
    assert!(message.starts_with("unable to launch instance"));
    assert!(message.contains("hint: check the instance profile"));
    assert!(message.contains("teardown"));
}
