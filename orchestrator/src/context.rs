use crate::events::{Event, EventSink};
use crate::timings::Timings;

/// Everything a provisioner needs for one invocation: the provider session, where to report
/// progress, the timing budget, and the cluster being worked on. Cheap to copy.
pub struct Context<'a, P: ?Sized> {
    pub api: &'a P,
    pub events: &'a dyn EventSink,
    pub timings: &'a Timings,
    pub cluster: &'a str,
}

impl<'a, P: ?Sized> Clone for Context<'a, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, P: ?Sized> Copy for Context<'a, P> {}

impl<'a, P: ?Sized> Context<'a, P> {
    pub fn emit(&self, event: Event) {
        self.events.emit(event)
    }

    /// The `Name` tag value for a resource of this cluster, e.g. `demo-igw`.
    pub fn resource_name(&self, role: &str) -> String {
        format!("{}-{}", self.cluster, role)
    }
}
