/*!

Builds the network a cluster lives in: one network per cluster, public and private subnet pairs
in one or more availability zones, an internet gateway with a public route table, and for
single-node clusters the private service endpoints and security groups the node needs.

A network tagged for the same cluster is adopted on re-entry, and so are its sub-resources,
which are matched by their `Name` tag.

!*/

use crate::api::{
    CloudApi, DnsAttribute, EndpointSpec, ResourceRecord, SecurityGroupSpec, SubnetSpec,
};
use crate::context::Context;
use crate::error::{Error, IntoError, Leftovers, Result};
use crate::events::Event;
use crate::tags::{find_by_name, ResourceKind, TagSet, TIER_KEY};
use log::debug;
use serde::Serialize;
use std::net::Ipv4Addr;

/// The kinds of sub-resources that can be adopted from an existing network.
const ADOPTABLE: [ResourceKind; 5] = [
    ResourceKind::Subnet,
    ResourceKind::InternetGateway,
    ResourceKind::RouteTable,
    ResourceKind::SecurityGroup,
    ResourceKind::Endpoint,
];

/// What the cluster needs from its network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkPlan {
    /// The network's range, a /16.
    pub cidr: String,
    /// Fewer available zones than this fails before anything is created.
    pub min_zones: usize,
    pub max_zones: usize,
    /// Interface endpoints to create in the private subnets. None means no endpoints.
    pub endpoint_services: Vec<String>,
    /// Create a security group for the compute node.
    pub node_security_group: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkTopology {
    pub network_id: String,
    pub cidr: String,
    pub public_subnet_ids: Vec<String>,
    pub private_subnet_ids: Vec<String>,
    pub gateway_id: String,
    pub route_table_id: String,
    pub security_group_ids: Vec<String>,
    pub endpoint_ids: Vec<String>,
    /// The group to attach to a single node, also listed in `security_group_ids`.
    pub node_security_group_id: Option<String>,
}

/// The public and private /24 ranges of the zone at `az_index` inside the /16 `parent`:
/// `x.y.(10i+1).0/24` and `x.y.(10i+2).0/24`.
pub fn subnet_cidrs(parent: &str, az_index: usize) -> Result<(String, String)> {
    let invalid = || {
        Error::new_with_context(
            Leftovers::None,
            format!("network range '{}' is not a valid /16", parent),
        )
        .with_remediation("use a range such as 10.0.0.0/16")
    };
    let (address, prefix) = parent.split_once('/').ok_or_else(invalid)?;
    let address: Ipv4Addr = address.parse().map_err(|_| invalid())?;
    if prefix != "16" {
        return Err(invalid());
    }
    let third = az_index * 10 + 1;
    if third + 1 > 255 {
        return Err(Error::new_with_context(
            Leftovers::None,
            format!("no subnet ranges left for zone index {}", az_index),
        ));
    }
    let [a, b, _, _] = address.octets();
    Ok((
        format!("{}.{}.{}.0/24", a, b, third),
        format!("{}.{}.{}.0/24", a, b, third + 1),
    ))
}

pub struct NetworkProvisioner<'a, P: ?Sized> {
    ctx: Context<'a, P>,
    /// Sub-resources of an adopted network.
    inventory: Vec<ResourceRecord>,
}

impl<'a, P> NetworkProvisioner<'a, P>
where
    P: CloudApi + ?Sized,
{
    pub fn new(ctx: Context<'a, P>) -> Self {
        Self {
            ctx,
            inventory: Vec::new(),
        }
    }

    /// Build the whole topology for `plan`.
    pub async fn provision(&mut self, plan: &NetworkPlan) -> Result<NetworkTopology> {
        let zones = self.usable_zones(plan).await?;

        let network_id = self.create_network(&plan.cidr).await?;
        let mut topology = NetworkTopology {
            network_id: network_id.clone(),
            cidr: plan.cidr.clone(),
            ..Default::default()
        };

        for (az_index, zone) in zones.iter().enumerate() {
            let (public, private) = self
                .create_subnet_pair(&network_id, &plan.cidr, zone, az_index)
                .await?;
            topology.public_subnet_ids.push(public);
            topology.private_subnet_ids.push(private);
        }

        let (gateway_id, route_table_id) = self
            .create_gateway_and_route(&network_id, &topology.public_subnet_ids)
            .await?;
        topology.gateway_id = gateway_id;
        topology.route_table_id = route_table_id;

        if !plan.endpoint_services.is_empty() {
            let (group_id, endpoint_ids) = self
                .create_private_service_endpoints(
                    &network_id,
                    &plan.cidr,
                    &topology.private_subnet_ids,
                    &plan.endpoint_services,
                )
                .await?;
            topology.security_group_ids.push(group_id);
            topology.endpoint_ids = endpoint_ids;
        }

        if plan.node_security_group {
            let group_id = self.create_node_security_group(&network_id).await?;
            topology.security_group_ids.push(group_id.clone());
            topology.node_security_group_id = Some(group_id);
        }

        debug!("Network topology for '{}': {:?}", self.ctx.cluster, topology);
        Ok(topology)
    }

    /// The zones to use, checked before anything is created.
    async fn usable_zones(&self, plan: &NetworkPlan) -> Result<Vec<String>> {
        let mut zones = self
            .ctx
            .api
            .availability_zones()
            .await
            .context(Leftovers::None, "Unable to list availability zones")?;
        if zones.len() < plan.min_zones {
            return Err(Error::new_with_context(
                Leftovers::None,
                format!(
                    "insufficient availability zones: region '{}' has {} available, {} required",
                    self.ctx.api.region(),
                    zones.len(),
                    plan.min_zones
                ),
            )
            .with_remediation("choose a region with more availability zones"));
        }
        zones.truncate(plan.max_zones);
        Ok(zones)
    }

    /// Create the cluster's network, or adopt the one an earlier run left behind. DNS support
    /// and DNS hostnames are switched on in both cases; either failing is fatal.
    pub async fn create_network(&mut self, cidr: &str) -> Result<String> {
        let ctx = self.ctx;
        let existing = ctx
            .api
            .find_cluster_networks(ctx.cluster)
            .await
            .context(Leftovers::None, "Unable to look for an existing network")?
            .into_iter()
            .find(|record| record.tags.ownership(ctx.cluster).is_owned());

        let network_id = match existing {
            Some(record) => {
                ctx.emit(Event::Adopted {
                    kind: ResourceKind::Network,
                    id: record.id.clone(),
                });
                self.load_inventory(&record.id).await?;
                record.id
            }
            None => {
                let id = ctx
                    .api
                    .create_network(
                        cidr,
                        &TagSet::managed(ctx.cluster, ResourceKind::Network, "vpc"),
                    )
                    .await
                    .context(Leftovers::None, format!("Unable to create network '{}'", cidr))?;
                ctx.emit(Event::Created {
                    kind: ResourceKind::Network,
                    id: id.clone(),
                });
                id
            }
        };

        for attribute in [DnsAttribute::Support, DnsAttribute::Hostnames] {
            ctx.api
                .enable_dns(&network_id, attribute)
                .await
                .context(
                    Leftovers::Remaining,
                    format!("Unable to enable DNS {} on network '{}'", attribute, network_id),
                )?;
        }
        Ok(network_id)
    }

    async fn load_inventory(&mut self, network_id: &str) -> Result<()> {
        for kind in ADOPTABLE {
            let mut records = self
                .ctx
                .api
                .list_network_resources(kind, network_id)
                .await
                .context(
                    Leftovers::Remaining,
                    format!("Unable to list {}s of network '{}'", kind, network_id),
                )?;
            self.inventory.append(&mut records);
        }
        Ok(())
    }

    /// The id of an owned sub-resource from an earlier run, reported as adopted.
    fn adopt(&self, kind: ResourceKind, role: &str) -> Option<String> {
        let name = self.ctx.resource_name(role);
        let id = find_by_name(
            self.inventory.iter().filter(|record| record.kind == kind),
            self.ctx.cluster,
            &name,
        )?
        .to_string();
        self.ctx.emit(Event::Adopted {
            kind,
            id: id.clone(),
        });
        Some(id)
    }

    /// Create the public and private subnet of one availability zone. Failing to make the
    /// public subnet assign public addresses is a warning.
    pub async fn create_subnet_pair(
        &mut self,
        network_id: &str,
        parent_cidr: &str,
        zone: &str,
        az_index: usize,
    ) -> Result<(String, String)> {
        let (public_cidr, private_cidr) = subnet_cidrs(parent_cidr, az_index)?;
        let public = self
            .ensure_subnet(network_id, zone, &public_cidr, "public", az_index)
            .await?;
        if let Err(e) = self.ctx.api.enable_public_addressing(&public).await {
            self.ctx.emit(Event::warning(
                format!("enable public addressing on subnet '{}'", public),
                e.to_string(),
            ));
        }
        let private = self
            .ensure_subnet(network_id, zone, &private_cidr, "private", az_index)
            .await?;
        Ok((public, private))
    }

    async fn ensure_subnet(
        &self,
        network_id: &str,
        zone: &str,
        cidr: &str,
        tier: &str,
        az_index: usize,
    ) -> Result<String> {
        let role = format!("{}-{}", tier, az_index);
        if let Some(id) = self.adopt(ResourceKind::Subnet, &role) {
            return Ok(id);
        }
        let spec = SubnetSpec {
            network_id: network_id.to_string(),
            cidr: cidr.to_string(),
            zone: zone.to_string(),
            tags: TagSet::managed(self.ctx.cluster, ResourceKind::Subnet, &role)
                .with(TIER_KEY, tier),
        };
        let id = self.ctx.api.create_subnet(&spec).await.context(
            Leftovers::Remaining,
            format!("Unable to create {} subnet '{}' in '{}'", tier, cidr, zone),
        )?;
        self.ctx.emit(Event::Created {
            kind: ResourceKind::Subnet,
            id: id.clone(),
        });
        Ok(id)
    }

    /// Create an internet gateway and a route table routing `0.0.0.0/0` through it, associated
    /// with every public subnet. Returns the gateway and route table ids.
    pub async fn create_gateway_and_route(
        &mut self,
        network_id: &str,
        public_subnet_ids: &[String],
    ) -> Result<(String, String)> {
        let ctx = self.ctx;
        let gateway_id = match self.adopt(ResourceKind::InternetGateway, "igw") {
            Some(id) => id,
            None => {
                let id = ctx
                    .api
                    .create_internet_gateway(&TagSet::managed(
                        ctx.cluster,
                        ResourceKind::InternetGateway,
                        "igw",
                    ))
                    .await
                    .context(Leftovers::Remaining, "Unable to create internet gateway")?;
                ctx.emit(Event::Created {
                    kind: ResourceKind::InternetGateway,
                    id: id.clone(),
                });
                id
            }
        };
        tolerate_existing(
            ctx.api
                .attach_internet_gateway(&gateway_id, network_id)
                .await,
        )
        .context(
            Leftovers::Remaining,
            format!(
                "Unable to attach internet gateway '{}' to network '{}'",
                gateway_id, network_id
            ),
        )?;

        let route_table_id = match self.adopt(ResourceKind::RouteTable, "public-rt") {
            Some(id) => id,
            None => {
                let id = ctx
                    .api
                    .create_route_table(
                        network_id,
                        &TagSet::managed(ctx.cluster, ResourceKind::RouteTable, "public-rt"),
                    )
                    .await
                    .context(Leftovers::Remaining, "Unable to create route table")?;
                ctx.emit(Event::Created {
                    kind: ResourceKind::RouteTable,
                    id: id.clone(),
                });
                id
            }
        };
        tolerate_existing(
            ctx.api
                .create_default_route(&route_table_id, &gateway_id)
                .await,
        )
        .context(
            Leftovers::Remaining,
            format!("Unable to add default route to '{}'", route_table_id),
        )?;

        for subnet_id in public_subnet_ids {
            if let Err(e) = tolerate_existing(
                ctx.api
                    .associate_route_table(&route_table_id, subnet_id)
                    .await,
            ) {
                ctx.emit(Event::warning(
                    format!(
                        "associate route table '{}' with subnet '{}'",
                        route_table_id, subnet_id
                    ),
                    e.to_string(),
                ));
            }
        }
        Ok((gateway_id, route_table_id))
    }

    /// Create a security group admitting HTTPS from the network's own range and one interface
    /// endpoint per service in the private subnets. A failed endpoint is a warning. Returns the
    /// group id and the ids of the endpoints that exist.
    pub async fn create_private_service_endpoints(
        &mut self,
        network_id: &str,
        network_cidr: &str,
        private_subnet_ids: &[String],
        services: &[String],
    ) -> Result<(String, Vec<String>)> {
        let ctx = self.ctx;
        let group_id = self
            .ensure_security_group(
                network_id,
                "endpoints",
                "HTTPS from inside the network to the session manager endpoints",
            )
            .await?;
        if let Err(e) = tolerate_existing(
            ctx.api
                .allow_https_ingress(&group_id, network_cidr)
                .await,
        ) {
            ctx.emit(Event::warning(
                format!("allow HTTPS into security group '{}'", group_id),
                e.to_string(),
            ));
        }

        let mut endpoint_ids = Vec::new();
        for service in services {
            let suffix = service.rsplit('.').next().unwrap_or(service);
            let role = format!("endpoint-{}", suffix);
            if let Some(id) = self.adopt(ResourceKind::Endpoint, &role) {
                endpoint_ids.push(id);
                continue;
            }
            let spec = EndpointSpec {
                network_id: network_id.to_string(),
                service_name: service.clone(),
                subnet_ids: private_subnet_ids.to_vec(),
                security_group_id: group_id.clone(),
                tags: TagSet::managed(ctx.cluster, ResourceKind::Endpoint, &role),
            };
            match ctx.api.create_interface_endpoint(&spec).await {
                Ok(id) => {
                    ctx.emit(Event::Created {
                        kind: ResourceKind::Endpoint,
                        id: id.clone(),
                    });
                    endpoint_ids.push(id);
                }
                Err(e) => ctx.emit(Event::warning(
                    format!("create endpoint for '{}'", service),
                    e.to_string(),
                )),
            }
        }
        Ok((group_id, endpoint_ids))
    }

    /// A group without ingress rules for the single node.
    async fn create_node_security_group(&mut self, network_id: &str) -> Result<String> {
        self.ensure_security_group(network_id, "node", "Cluster node, no inbound access")
            .await
    }

    async fn ensure_security_group(
        &self,
        network_id: &str,
        role: &str,
        description: &str,
    ) -> Result<String> {
        if let Some(id) = self.adopt(ResourceKind::SecurityGroup, role) {
            return Ok(id);
        }
        let spec = SecurityGroupSpec {
            network_id: network_id.to_string(),
            name: self.ctx.resource_name(role),
            description: description.to_string(),
            tags: TagSet::managed(self.ctx.cluster, ResourceKind::SecurityGroup, role),
        };
        let id = self.ctx.api.create_security_group(&spec).await.context(
            Leftovers::Remaining,
            format!("Unable to create security group '{}'", spec.name),
        )?;
        self.ctx.emit(Event::Created {
            kind: ResourceKind::SecurityGroup,
            id: id.clone(),
        });
        Ok(id)
    }
}

/// "Already exists" on an attachment or rule means an earlier run got there first.
fn tolerate_existing(result: crate::api::CallResult<()>) -> crate::api::CallResult<()> {
    match result {
        Err(e) if e.is_already_exists() => Ok(()),
        other => other,
    }
}
