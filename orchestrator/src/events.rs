/*!

The orchestrator never prints. Progress is reported as [`Event`]s to an [`EventSink`]; the
command line binary uses [`LogSink`], tests record the events and assert on them.

!*/

use crate::lifecycle::{CreationState, ReportEntry};
use crate::tags::ResourceKind;
use log::{debug, info, warn};
use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// The creation state machine moved to `state`.
    Transition { cluster: String, state: CreationState },
    Created { kind: ResourceKind, id: String },
    /// An existing resource was reused instead of created.
    Adopted { kind: ResourceKind, id: String },
    /// A warning-class failure. The flow continued.
    Warning { step: String, message: String },
    /// A retryable failure; another attempt follows.
    Retrying {
        step: String,
        attempt: u32,
        attempts: u32,
        message: String,
    },
    /// Waiting for the provider to converge.
    Waiting { what: String },
    /// One entry of the teardown report, as it is recorded.
    Teardown(ReportEntry),
    /// Informational text meant for the operator, e.g. how to connect to the cluster.
    Notice(String),
}

impl Event {
    pub fn warning<S1, S2>(step: S1, message: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Event::Warning {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Event::Warning { .. })
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Transition { cluster, state } => write!(f, "cluster '{}' is {}", cluster, state),
            Event::Created { kind, id } => write!(f, "created {} '{}'", kind, id),
            Event::Adopted { kind, id } => write!(f, "reusing existing {} '{}'", kind, id),
            Event::Warning { step, message } => write!(f, "{}: {}", step, message),
            Event::Retrying {
                step,
                attempt,
                attempts,
                message,
            } => write!(
                f,
                "{} failed (attempt {}/{}), retrying: {}",
                step, attempt, attempts, message
            ),
            Event::Waiting { what } => write!(f, "waiting for {}", what),
            Event::Teardown(entry) => Display::fmt(entry, f),
            Event::Notice(text) => Display::fmt(text, f),
        }
    }
}

/// Receives the orchestrator's audit trail.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Writes events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        match &event {
            Event::Warning { .. } | Event::Retrying { .. } => warn!("{}", event),
            Event::Teardown(entry) if entry.outcome.is_failed() => warn!("{}", event),
            Event::Waiting { .. } => debug!("{}", event),
            _ => info!("{}", event),
        }
    }
}
