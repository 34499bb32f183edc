/*!

`orchestrator` creates and tears down the cloud resources behind an xstrapolate cluster.

Creation runs network, identity and compute provisioning in dependency order and waits for the
provider to converge where it has to. Teardown finds everything by its ownership tags and
deletes it in reverse order, best-effort, reporting every resource it touched.

The crate is provider-agnostic: a provider binding implements [`CloudApi`], and
[`Orchestrator`] implements [`ClusterManager`] on top of it.

!*/

pub mod api;
pub mod bootstrap;
pub mod catalog;
pub mod cluster;
pub mod compute;
mod context;
pub mod error;
pub mod events;
pub mod identity;
pub mod lifecycle;
mod manager;
pub mod network;
pub mod tags;
mod timings;
pub mod waiter;

pub use api::{CallError, CallErrorKind, CallResult, CloudApi, ProviderKind};
pub use cluster::{ClusterDescriptor, ClusterKind, ClusterStatus, CreateRequest};
pub use context::Context;
pub use error::{Error, Leftovers, Result};
pub use events::{Event, EventSink, LogSink};
pub use lifecycle::{CreationState, Orchestrator, Outcome, TeardownReport, TeardownStep};
pub use manager::ClusterManager;
pub use timings::Timings;
