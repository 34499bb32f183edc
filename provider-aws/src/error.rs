use aws_sdk_ec2::types::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::retry::ProvideErrorKind;
use orchestrator::{CallError, CallErrorKind};

const ALREADY_EXISTS: &[&str] = &[
    "EntityAlreadyExists",
    "ResourceInUseException",
    "InvalidGroup.Duplicate",
    "InvalidPermission.Duplicate",
    "RouteAlreadyExists",
    "Resource.AlreadyAssociated",
];

const UNAUTHORIZED: &[&str] = &[
    "AuthFailure",
    "UnauthorizedOperation",
    "AccessDenied",
    "AccessDeniedException",
    "InvalidClientTokenId",
    "ExpiredToken",
    "SignatureDoesNotMatch",
    "UnrecognizedClientException",
];

const TRANSIENT: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestLimitExceeded",
    "RequestThrottled",
    "TooManyRequestsException",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "InternalError",
    "InternalFailure",
    "ServerException",
];

/// Map an AWS error code (and message, for the few codes that are overloaded) onto the kinds the
/// orchestrator acts on.
pub(crate) fn classify(code: &str, message: &str) -> CallErrorKind {
    if ALREADY_EXISTS.contains(&code) {
        CallErrorKind::AlreadyExists
    } else if code == "NoSuchEntity"
        || code == "ResourceNotFoundException"
        || code == "Gateway.NotAttached"
        || code.ends_with("NotFound")
    {
        CallErrorKind::NotFound
    } else if code == "DependencyViolation" || code == "DeleteConflict" {
        CallErrorKind::DependencyViolation
    } else if code == "InvalidParameterValue" && is_profile_propagation(message) {
        CallErrorKind::ProfilePropagating
    } else if TRANSIENT.contains(&code) {
        CallErrorKind::Transient
    } else if code.ends_with("LimitExceeded") {
        CallErrorKind::LimitExceeded
    } else if UNAUTHORIZED.contains(&code) {
        CallErrorKind::Unauthorized
    } else {
        CallErrorKind::Other
    }
}

/// EC2 rejects an instance profile it cannot see yet as an invalid parameter.
fn is_profile_propagation(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("invalid iam instance profile") || message.contains("iaminstanceprofile")
}

/// Convert an SDK error. Service errors are classified by their code. Timeouts and dispatch
/// failures are `Transient`, anything else becomes `Other` with the full error chain as the
/// message.
pub(crate) fn call_error<E>(err: SdkError<E>) -> CallError
where
    E: ProvideErrorKind + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(context) => {
            let service_error = context.err();
            let code = service_error.code().unwrap_or("Unknown").to_string();
            let message = service_error.to_string();
            CallError::new(classify(&code, &message), message).with_code(code)
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => CallError::new(
            CallErrorKind::Transient,
            DisplayErrorContext(&err).to_string(),
        ),
        _ => CallError::new(
            CallErrorKind::Other,
            DisplayErrorContext(&err).to_string(),
        ),
    }
}

/// A response that lacks a field the call depends on.
pub(crate) fn missing(what: &str, operation: &str) -> CallError {
    CallError::new(
        CallErrorKind::Other,
        format!("{} response is missing {}", operation, what),
    )
}

/// For reads that return `None` rather than an error when the resource is gone.
pub(crate) fn absent_if_not_found<T>(
    result: Result<Option<T>, CallError>,
) -> Result<Option<T>, CallError> {
    match result {
        Err(e) if e.is_not_found() => Ok(None),
        other => other,
    }
}
