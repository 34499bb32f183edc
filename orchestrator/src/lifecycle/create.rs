use super::{CreationState, Orchestrator};
use crate::api::{CloudApi, LaunchSpec};
use crate::bootstrap::{self, BootstrapOptions};
use crate::catalog::{managed_kubeconfig_path, Catalog};
use crate::cluster::{validate_name, ClusterDescriptor, ClusterKind, ClusterStatus, CreateRequest};
use crate::compute::ComputeProvisioner;
use crate::error::{IntoError, Leftovers, Result};
use crate::events::Event;
use crate::identity::IdentityProvisioner;
use crate::network::{NetworkPlan, NetworkProvisioner, NetworkTopology};
use crate::tags::{ResourceKind, TagSet};
use log::info;

impl<P> Orchestrator<P>
where
    P: CloudApi,
{
    /// Network, then identity, then compute. The first fatal error stops the create; nothing is
    /// rolled back, the error says whether resources remain.
    pub async fn create(&self, request: &CreateRequest) -> Result<ClusterDescriptor> {
        validate_name(&request.name)?;
        let name = request.name.as_str();
        let ctx = self.context(name);
        let catalog = self.catalog();
        info!(
            "Creating {} cluster '{}' in {} region '{}'",
            request.kind,
            name,
            self.api.provider(),
            self.api.region()
        );
        self.transition(name, CreationState::Start);

        let plan = match request.kind {
            ClusterKind::Managed => NetworkPlan {
                cidr: request.network_cidr.clone(),
                min_zones: ClusterKind::Managed.min_zones(),
                max_zones: 2,
                endpoint_services: Vec::new(),
                node_security_group: false,
            },
            ClusterKind::SingleNode => NetworkPlan {
                cidr: request.network_cidr.clone(),
                min_zones: ClusterKind::SingleNode.min_zones(),
                max_zones: 2,
                endpoint_services: catalog.endpoint_services.clone(),
                node_security_group: true,
            },
        };
        let topology = NetworkProvisioner::new(ctx).provision(&plan).await?;
        self.transition(name, CreationState::NetworkReady);

        match request.kind {
            ClusterKind::Managed => self.create_managed(request, &catalog, &topology).await,
            ClusterKind::SingleNode => self.create_single_node(request, &catalog, &topology).await,
        }
    }

    async fn create_managed(
        &self,
        request: &CreateRequest,
        catalog: &Catalog,
        topology: &NetworkTopology,
    ) -> Result<ClusterDescriptor> {
        let name = request.name.as_str();
        let ctx = self.context(name);
        let binding = IdentityProvisioner::new(ctx)
            .provision_cluster_role(catalog.cluster_trust_service, &catalog.cluster_policies)
            .await?;
        self.transition(name, CreationState::IdentityReady);

        let compute = ComputeProvisioner::new(ctx);
        let subnet_ids: Vec<String> = topology
            .public_subnet_ids
            .iter()
            .chain(topology.private_subnet_ids.iter())
            .cloned()
            .collect();
        compute
            .create_managed_cluster(
                name,
                &request.kubernetes_version,
                &binding.role_arn,
                &subnet_ids,
            )
            .await?;
        self.transition(name, CreationState::ComputeLaunched);

        self.transition(name, CreationState::WaitActive);
        let record = compute.wait_until_active(name).await?;
        self.transition(name, CreationState::Active);

        let provider = self.api.provider();
        let kubeconfig = managed_kubeconfig_path(name);
        let instructions =
            Catalog::managed_instructions(provider, self.api.region(), name, &kubeconfig);
        for instruction in &instructions {
            ctx.emit(Event::Notice(format!("To connect: {}", instruction)));
        }
        Ok(ClusterDescriptor {
            name: name.to_string(),
            kind: ClusterKind::Managed,
            provider,
            endpoint: record
                .endpoint
                .context(Leftovers::Remaining, format!("Cluster '{}' has no endpoint", name))?,
            credential_path: kubeconfig,
            status: ClusterStatus::Active,
            instructions,
        })
    }

    async fn create_single_node(
        &self,
        request: &CreateRequest,
        catalog: &Catalog,
        topology: &NetworkTopology,
    ) -> Result<ClusterDescriptor> {
        let name = request.name.as_str();
        let ctx = self.context(name);
        let binding = IdentityProvisioner::new(ctx)
            .provision_node_identity(catalog.node_trust_service, &catalog.node_policies)
            .await?;
        self.transition(name, CreationState::IdentityReady);

        let compute = ComputeProvisioner::new(ctx);
        let image = compute
            .resolve_image(&catalog.node_image, catalog.minimal_image_marker)
            .await?;
        let mut options = BootstrapOptions::new(name, catalog.node_kubeconfig_path);
        options.extra_commands = request.bootstrap_commands.clone();

        let spec = LaunchSpec {
            image_id: image.id,
            instance_type: request.instance_type.clone(),
            subnet_id: topology
                .private_subnet_ids
                .first()
                .cloned()
                .context(Leftovers::Remaining, "The network has no private subnet")?,
            security_group_ids: topology.node_security_group_id.iter().cloned().collect(),
            instance_profile: binding
                .profile_name
                .clone()
                .context(Leftovers::Remaining, "The node identity has no instance profile")?,
            user_data: bootstrap::render(&options),
            tags: TagSet::managed(name, ResourceKind::Instance, "node"),
        };
        let instance_id = compute.launch_node(&spec).await?;
        self.transition(name, CreationState::ComputeLaunched);
        self.transition(name, CreationState::Provisioning);

        let provider = self.api.provider();
        let instructions = Catalog::node_instructions(provider, self.api.region(), &instance_id);
        ctx.emit(Event::Notice(format!(
            "Instance '{}' is bootstrapping; Kubernetes and Flux install in the background",
            instance_id
        )));
        for instruction in &instructions {
            ctx.emit(Event::Notice(format!("To connect: {}", instruction)));
        }
        Ok(ClusterDescriptor {
            name: name.to_string(),
            kind: ClusterKind::SingleNode,
            provider,
            endpoint: instance_id,
            credential_path: catalog.node_kubeconfig_path.to_string(),
            status: ClusterStatus::Provisioning,
            instructions,
        })
    }
}
