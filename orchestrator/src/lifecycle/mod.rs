/*!

The lifecycle orchestrator drives the provisioners through the creation state machine and runs
the reverse teardown sweep. It owns the provider session for the whole invocation.

!*/

mod create;
mod report;
mod teardown;

pub use self::report::{Outcome, ReportEntry, TeardownReport, TeardownStep};
use crate::api::{CloudApi, InstanceState, ManagedClusterStatus};
use crate::catalog::{managed_kubeconfig_path, Catalog};
use crate::cluster::{validate_name, ClusterDescriptor, ClusterKind, ClusterStatus};
use crate::context::Context;
use crate::error::{Error, IntoError, Leftovers, Result};
use crate::events::{Event, EventSink};
use crate::timings::Timings;
use log::debug;
use serde::{Deserialize, Serialize};

/// The states a create passes through. Managed clusters end in `Active`, single-node clusters in
/// `Provisioning` because their bootstrap finishes after the orchestrator returns.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreationState {
    Start,
    NetworkReady,
    IdentityReady,
    ComputeLaunched,
    WaitActive,
    Active,
    Provisioning,
}

serde_plain::derive_display_from_serialize!(CreationState);

pub struct Orchestrator<P> {
    api: P,
    events: Box<dyn EventSink>,
    timings: Timings,
}

impl<P> Orchestrator<P>
where
    P: CloudApi,
{
    /// Validate the session's credentials and build the orchestrator. Nothing else is called on
    /// the provider before the credentials are known to work.
    pub async fn connect(api: P, events: Box<dyn EventSink>, timings: Timings) -> Result<Self> {
        let account = api.validate_credentials().await.map_err(|e| {
            Error::new_with_source_and_context(
                Leftovers::None,
                format!("Unable to validate {} credentials", api.provider()),
                e,
            )
            .with_remediation(api.provider().credentials_hint())
        })?;
        events.emit(Event::Notice(format!(
            "Using {} account '{}' in region '{}'",
            api.provider(),
            account,
            api.region()
        )));
        Ok(Self {
            api,
            events,
            timings,
        })
    }

    pub fn api(&self) -> &P {
        &self.api
    }

    fn context<'a>(&'a self, cluster: &'a str) -> Context<'a, P> {
        Context {
            api: &self.api,
            events: self.events.as_ref(),
            timings: &self.timings,
            cluster,
        }
    }

    fn catalog(&self) -> Catalog {
        Catalog::new(self.api.provider(), self.api.region())
    }

    fn transition(&self, cluster: &str, state: CreationState) {
        self.events.emit(Event::Transition {
            cluster: cluster.to_string(),
            state,
        })
    }

    /// Rebuild the descriptor of a cluster from what is tagged in the provider. The managed
    /// control plane is looked up first, then single-node instances.
    pub async fn describe(&self, cluster: &str) -> Result<Option<ClusterDescriptor>> {
        validate_name(cluster)?;
        let provider = self.api.provider();
        let region = self.api.region();

        let managed = self
            .api
            .describe_managed_cluster(cluster)
            .await
            .context(Leftovers::None, format!("Unable to describe cluster '{}'", cluster))?;
        if let Some(record) = managed.filter(|record| record.tags.ownership(cluster).is_owned()) {
            let status = match record.status {
                ManagedClusterStatus::Active => ClusterStatus::Active,
                ManagedClusterStatus::Failed => ClusterStatus::Failed,
                _ => ClusterStatus::Provisioning,
            };
            let kubeconfig = managed_kubeconfig_path(cluster);
            return Ok(Some(ClusterDescriptor {
                name: cluster.to_string(),
                kind: ClusterKind::Managed,
                provider,
                endpoint: record.endpoint.unwrap_or_default(),
                instructions: Catalog::managed_instructions(provider, region, cluster, &kubeconfig),
                credential_path: kubeconfig,
                status,
            }));
        }

        let instances = self
            .api
            .find_cluster_instances(cluster)
            .await
            .context(
                Leftovers::None,
                format!("Unable to find instances of cluster '{}'", cluster),
            )?;
        debug!("Cluster '{}' has {} tagged instance(s)", cluster, instances.len());
        let node = instances
            .into_iter()
            .find(|instance| instance.tags.ownership(cluster).is_owned());
        Ok(node.map(|instance| {
            let status = match instance.state {
                InstanceState::Running => ClusterStatus::Active,
                InstanceState::Pending => ClusterStatus::Provisioning,
                _ => ClusterStatus::Failed,
            };
            ClusterDescriptor {
                name: cluster.to_string(),
                kind: ClusterKind::SingleNode,
                provider,
                instructions: Catalog::node_instructions(provider, region, &instance.id),
                endpoint: instance.id,
                credential_path: self.catalog().node_kubeconfig_path.to_string(),
                status,
            }
        }))
    }
}
