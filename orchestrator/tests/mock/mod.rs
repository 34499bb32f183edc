/*!

An in-memory cloud that implements [`CloudApi`] so that the lifecycle can be exercised without a
provider account. It behaves like the real thing where the orchestrator depends on it: networks
come with an untagged main route table and default security group, resources that are still
referenced refuse deletion, terminated instances linger for a poll, and faults can be injected.

Every mutating call is appended to a call log so tests can assert on ordering.

!*/

#![allow(dead_code)]

use orchestrator::api::{
    CallError, CallErrorKind, CallResult, CloudApi, DnsAttribute, EndpointSpec, ImageFilter,
    InstanceRecord, InstanceState, LaunchSpec, MachineImage, ManagedClusterRecord,
    ManagedClusterSpec, ManagedClusterStatus, ProfileRecord, ProviderKind, ResourceRecord,
    RoleRecord, RoleSpec, SecurityGroupSpec, SubnetSpec,
};
use orchestrator::tags::{ResourceKind, TagSet, CLUSTER_KEY, MANAGED_BY_KEY, MANAGED_BY_VALUE};
use orchestrator::{Event, EventSink, Timings};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ACCOUNT: &str = "123456789012";

#[derive(Clone, Debug)]
pub struct Resource {
    pub kind: ResourceKind,
    pub network_id: Option<String>,
    pub tags: TagSet,
    /// Subnets and security groups an endpoint or instance refers to.
    pub references: Vec<String>,
    /// Created by the provider along with the network, deleted with it.
    pub implicit: bool,
}

#[derive(Clone, Debug)]
pub struct Role {
    pub arn: String,
    pub tags: TagSet,
    pub policies: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Profile {
    pub arn: String,
    pub roles: Vec<String>,
    pub tags: TagSet,
}

#[derive(Clone, Debug)]
pub struct Instance {
    pub network_id: Option<String>,
    pub subnet_id: String,
    pub state: InstanceState,
    pub tags: TagSet,
}

#[derive(Clone, Debug)]
pub struct Cluster {
    pub record: ManagedClusterRecord,
    pub polls: u32,
}

#[derive(Debug, Default)]
pub struct Faults {
    pub invalid_credentials: bool,
    /// "Invalid IAM instance profile" failures before a launch succeeds.
    pub launch_profile_failures: u32,
    /// Reads of a new instance profile that report it missing.
    pub invisible_profile_reads: u32,
    /// Dependency violations to report before the resource with this id can be deleted.
    pub dependency_violations: HashMap<String, u32>,
    /// Polls before a managed cluster becomes active.
    pub cluster_polls_until_active: u32,
    pub cluster_fails: bool,
    /// Cluster reads that are throttled before one goes through.
    pub throttled_cluster_reads: u32,
    /// Calls (by method name) that always fail with the given kind.
    pub failing_calls: HashMap<&'static str, CallErrorKind>,
}

#[derive(Debug, Default)]
pub struct State {
    next_id: u32,
    pub networks: BTreeMap<String, Resource>,
    pub resources: BTreeMap<String, Resource>,
    pub routes: BTreeSet<String>,
    pub roles: BTreeMap<String, Role>,
    pub profiles: BTreeMap<String, Profile>,
    pub instances: BTreeMap<String, Instance>,
    pub clusters: BTreeMap<String, Cluster>,
    pub calls: Vec<String>,
    pub launch_calls: u32,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

pub struct MockCloud {
    pub zones: Vec<String>,
    pub state: Mutex<State>,
    pub faults: Mutex<Faults>,
}

fn not_found(what: &str) -> CallError {
    CallError::new(CallErrorKind::NotFound, format!("{} does not exist", what))
}

fn in_use(what: &str) -> CallError {
    CallError::new(
        CallErrorKind::DependencyViolation,
        format!("{} has dependencies and cannot be deleted", what),
    )
    .with_code("DependencyViolation")
}

impl MockCloud {
    pub fn new(zones: &[&str]) -> Self {
        Self {
            zones: zones.iter().map(|zone| zone.to_string()).collect(),
            state: Mutex::new(State::default()),
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn with_faults<F: FnOnce(&mut Faults)>(self, f: F) -> Self {
        f(&mut self.faults.lock().unwrap());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// The position of the first call starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|call| call.starts_with(prefix))
    }

    /// The position of the last call starting with `prefix`.
    pub fn last_position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().rposition(|call| call.starts_with(prefix))
    }

    pub fn launch_calls(&self) -> u32 {
        self.state.lock().unwrap().launch_calls
    }

    /// Resources of every kind that still carry the cluster's ownership tags.
    pub fn owned_resources(&self, cluster: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let owned = |tags: &TagSet| tags.ownership(cluster).is_owned() && tags.is_managed();
        let mut ids = Vec::new();
        ids.extend(
            state
                .networks
                .iter()
                .chain(state.resources.iter())
                .filter(|(_, resource)| owned(&resource.tags))
                .map(|(id, _)| id.clone()),
        );
        ids.extend(
            state
                .roles
                .iter()
                .filter(|(_, role)| owned(&role.tags))
                .map(|(name, _)| name.clone()),
        );
        ids.extend(
            state
                .profiles
                .iter()
                .filter(|(_, profile)| owned(&profile.tags))
                .map(|(name, _)| name.clone()),
        );
        ids.extend(
            state
                .instances
                .iter()
                .filter(|(_, instance)| {
                    instance.state != InstanceState::Terminated && owned(&instance.tags)
                })
                .map(|(id, _)| id.clone()),
        );
        ids.extend(
            state
                .clusters
                .iter()
                .filter(|(_, cluster)| owned(&cluster.record.tags))
                .map(|(name, _)| name.clone()),
        );
        ids
    }

    /// Put a resource into a network as if someone else had created it.
    pub fn insert_resource(&self, kind: ResourceKind, network_id: &str, tags: TagSet) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.id(&kind.to_string());
        state.resources.insert(
            id.clone(),
            Resource {
                kind,
                network_id: Some(network_id.to_string()),
                tags,
                references: Vec::new(),
                implicit: false,
            },
        );
        id
    }

    pub fn insert_network(&self, tags: TagSet) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.id("vpc");
        state.networks.insert(
            id.clone(),
            Resource {
                kind: ResourceKind::Network,
                network_id: None,
                tags,
                references: Vec::new(),
                implicit: false,
            },
        );
        id
    }

    pub fn insert_instance(&self, network_id: &str, tags: TagSet) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.id("i");
        state.instances.insert(
            id.clone(),
            Instance {
                network_id: Some(network_id.to_string()),
                subnet_id: String::new(),
                state: InstanceState::Running,
                tags,
            },
        );
        id
    }

    fn fail(&self, call: &'static str) -> CallResult<()> {
        match self.faults.lock().unwrap().failing_calls.get(call) {
            Some(kind) => Err(CallError::new(*kind, format!("injected failure of {}", call))),
            None => Ok(()),
        }
    }

    fn log<S: Into<String>>(&self, call: S) {
        self.state.lock().unwrap().calls.push(call.into());
    }

    fn dependency_fault(&self, id: &str) -> CallResult<()> {
        let mut faults = self.faults.lock().unwrap();
        if let Some(remaining) = faults.dependency_violations.get_mut(id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(in_use(id));
            }
        }
        Ok(())
    }

    fn create(
        &self,
        kind: ResourceKind,
        prefix: &str,
        network_id: Option<&str>,
        tags: &TagSet,
    ) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.id(prefix);
        state.resources.insert(
            id.clone(),
            Resource {
                kind,
                network_id: network_id.map(str::to_string),
                tags: tags.clone(),
                references: Vec::new(),
                implicit: false,
            },
        );
        state.calls.push(format!("create {} {}", kind, id));
        id
    }
}

#[async_trait::async_trait]
impl CloudApi for MockCloud {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Aws
    }

    fn region(&self) -> &str {
        "us-west-2"
    }

    async fn validate_credentials(&self) -> CallResult<String> {
        self.log("validate credentials");
        if self.faults.lock().unwrap().invalid_credentials {
            return Err(CallError::new(
                CallErrorKind::Unauthorized,
                "The security token included in the request is invalid",
            )
            .with_code("InvalidClientTokenId"));
        }
        Ok(ACCOUNT.to_string())
    }

    async fn availability_zones(&self) -> CallResult<Vec<String>> {
        self.log("list zones");
        Ok(self.zones.clone())
    }

    async fn create_network(&self, _cidr: &str, tags: &TagSet) -> CallResult<String> {
        self.fail("create_network")?;
        let mut state = self.state.lock().unwrap();
        let id = state.id("vpc");
        state.networks.insert(
            id.clone(),
            Resource {
                kind: ResourceKind::Network,
                network_id: None,
                tags: tags.clone(),
                references: Vec::new(),
                implicit: false,
            },
        );
        for (kind, prefix, name) in [
            (ResourceKind::RouteTable, "rtb", "main"),
            (ResourceKind::SecurityGroup, "sg", "default"),
        ] {
            let implicit_id = state.id(prefix);
            state.resources.insert(
                implicit_id,
                Resource {
                    kind,
                    network_id: Some(id.clone()),
                    tags: TagSet::new().with("Name", name),
                    references: Vec::new(),
                    implicit: true,
                },
            );
        }
        state.calls.push(format!("create network {}", id));
        Ok(id)
    }

    async fn enable_dns(&self, network_id: &str, attribute: DnsAttribute) -> CallResult<()> {
        self.fail("enable_dns")?;
        if !self.state.lock().unwrap().networks.contains_key(network_id) {
            return Err(not_found(network_id));
        }
        self.log(format!("enable dns {} {}", attribute, network_id));
        Ok(())
    }

    async fn create_subnet(&self, spec: &SubnetSpec) -> CallResult<String> {
        self.fail("create_subnet")?;
        Ok(self.create(ResourceKind::Subnet, "subnet", Some(&spec.network_id), &spec.tags))
    }

    async fn enable_public_addressing(&self, subnet_id: &str) -> CallResult<()> {
        self.fail("enable_public_addressing")?;
        self.log(format!("enable public addressing {}", subnet_id));
        Ok(())
    }

    async fn create_internet_gateway(&self, tags: &TagSet) -> CallResult<String> {
        self.fail("create_internet_gateway")?;
        Ok(self.create(ResourceKind::InternetGateway, "igw", None, tags))
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, network_id: &str) -> CallResult<()> {
        let mut state = self.state.lock().unwrap();
        let gateway = state
            .resources
            .get_mut(gateway_id)
            .ok_or_else(|| not_found(gateway_id))?;
        if gateway.network_id.as_deref() == Some(network_id) {
            return Err(CallError::new(CallErrorKind::AlreadyExists, "already attached")
                .with_code("Resource.AlreadyAssociated"));
        }
        gateway.network_id = Some(network_id.to_string());
        state.calls.push(format!("attach internet-gateway {}", gateway_id));
        Ok(())
    }

    async fn detach_internet_gateway(&self, gateway_id: &str, network_id: &str) -> CallResult<()> {
        let mut state = self.state.lock().unwrap();
        let gateway = state
            .resources
            .get_mut(gateway_id)
            .ok_or_else(|| not_found(gateway_id))?;
        if gateway.network_id.as_deref() != Some(network_id) {
            return Err(not_found("attachment"));
        }
        gateway.network_id = None;
        state.calls.push(format!("detach internet-gateway {}", gateway_id));
        Ok(())
    }

    async fn create_route_table(&self, network_id: &str, tags: &TagSet) -> CallResult<String> {
        self.fail("create_route_table")?;
        Ok(self.create(ResourceKind::RouteTable, "rtb", Some(network_id), tags))
    }

    async fn create_default_route(
        &self,
        route_table_id: &str,
        _gateway_id: &str,
    ) -> CallResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.routes.insert(route_table_id.to_string()) {
            return Err(CallError::new(CallErrorKind::AlreadyExists, "route exists")
                .with_code("RouteAlreadyExists"));
        }
        state.calls.push(format!("create route {}", route_table_id));
        Ok(())
    }

    async fn associate_route_table(&self, route_table_id: &str, subnet_id: &str) -> CallResult<()> {
        self.fail("associate_route_table")?;
        self.log(format!("associate {} {}", route_table_id, subnet_id));
        Ok(())
    }

    async fn create_security_group(&self, spec: &SecurityGroupSpec) -> CallResult<String> {
        self.fail("create_security_group")?;
        Ok(self.create(ResourceKind::SecurityGroup, "sg", Some(&spec.network_id), &spec.tags))
    }

    async fn allow_https_ingress(&self, group_id: &str, cidr: &str) -> CallResult<()> {
        self.log(format!("allow https {} {}", group_id, cidr));
        Ok(())
    }

    async fn create_interface_endpoint(&self, spec: &EndpointSpec) -> CallResult<String> {
        self.fail("create_interface_endpoint")?;
        let id = self.create(ResourceKind::Endpoint, "vpce", Some(&spec.network_id), &spec.tags);
        let mut state = self.state.lock().unwrap();
        if let Some(endpoint) = state.resources.get_mut(&id) {
            endpoint.references = spec.subnet_ids.clone();
            endpoint.references.push(spec.security_group_id.clone());
        }
        Ok(id)
    }

    async fn describe_network(&self, network_id: &str) -> CallResult<Option<ResourceRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .networks
            .get(network_id)
            .map(|network| ResourceRecord {
                kind: ResourceKind::Network,
                id: network_id.to_string(),
                tags: network.tags.clone(),
            }))
    }

    async fn find_cluster_networks(&self, cluster: &str) -> CallResult<Vec<ResourceRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .networks
            .iter()
            .filter(|(_, network)| network.tags.cluster() == Some(cluster))
            .map(|(id, network)| ResourceRecord {
                kind: ResourceKind::Network,
                id: id.clone(),
                tags: network.tags.clone(),
            })
            .collect())
    }

    async fn list_network_resources(
        &self,
        kind: ResourceKind,
        network_id: &str,
    ) -> CallResult<Vec<ResourceRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .resources
            .iter()
            .filter(|(_, resource)| {
                resource.kind == kind && resource.network_id.as_deref() == Some(network_id)
            })
            .map(|(id, resource)| ResourceRecord {
                kind,
                id: id.clone(),
                tags: resource.tags.clone(),
            })
            .collect())
    }

    async fn delete_network_resource(&self, kind: ResourceKind, id: &str) -> CallResult<()> {
        self.dependency_fault(id)?;
        let mut state = self.state.lock().unwrap();
        let resource = state.resources.get(id).ok_or_else(|| not_found(id))?;
        if resource.kind != kind {
            return Err(not_found(id));
        }
        if resource.implicit {
            return Err(CallError::new(
                CallErrorKind::Other,
                format!("{} is the network's default {} and cannot be deleted", id, kind),
            ));
        }
        let referenced = state
            .resources
            .values()
            .any(|other| other.references.iter().any(|reference| reference == id))
            || state.instances.values().any(|instance| {
                instance.subnet_id == id && instance.state != InstanceState::Terminated
            });
        if referenced {
            return Err(in_use(id));
        }
        if kind == ResourceKind::InternetGateway && resource.network_id.is_some() {
            return Err(in_use(id));
        }
        state.resources.remove(id);
        state.calls.push(format!("delete {} {}", kind, id));
        Ok(())
    }

    async fn delete_network(&self, network_id: &str) -> CallResult<()> {
        self.dependency_fault(network_id)?;
        let mut state = self.state.lock().unwrap();
        if !state.networks.contains_key(network_id) {
            return Err(not_found(network_id));
        }
        let blocking = state.resources.values().any(|resource| {
            resource.network_id.as_deref() == Some(network_id) && !resource.implicit
        });
        if blocking {
            return Err(in_use(network_id));
        }
        state
            .resources
            .retain(|_, resource| resource.network_id.as_deref() != Some(network_id));
        state.networks.remove(network_id);
        state.calls.push(format!("delete network {}", network_id));
        Ok(())
    }

    async fn create_role(&self, spec: &RoleSpec) -> CallResult<RoleRecord> {
        self.fail("create_role")?;
        let mut state = self.state.lock().unwrap();
        if state.roles.contains_key(&spec.name) {
            return Err(CallError::new(CallErrorKind::AlreadyExists, "role exists")
                .with_code("EntityAlreadyExists"));
        }
        let arn = format!("arn:aws:iam::{}:role/{}", ACCOUNT, spec.name);
        state.roles.insert(
            spec.name.clone(),
            Role {
                arn: arn.clone(),
                tags: spec.tags.clone(),
                policies: Vec::new(),
            },
        );
        state.calls.push(format!("create role {}", spec.name));
        Ok(RoleRecord {
            name: spec.name.clone(),
            arn,
            tags: spec.tags.clone(),
        })
    }

    async fn get_role(&self, name: &str) -> CallResult<Option<RoleRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .roles
            .get(name)
            .map(|role| RoleRecord {
                name: name.to_string(),
                arn: role.arn.clone(),
                tags: role.tags.clone(),
            }))
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> CallResult<()> {
        self.fail("attach_role_policy")?;
        let mut state = self.state.lock().unwrap();
        let role = state.roles.get_mut(role_name).ok_or_else(|| not_found(role_name))?;
        if !role.policies.iter().any(|policy| policy == policy_arn) {
            role.policies.push(policy_arn.to_string());
        }
        Ok(())
    }

    async fn list_role_policies(&self, role_name: &str) -> CallResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        let role = state.roles.get(role_name).ok_or_else(|| not_found(role_name))?;
        Ok(role.policies.clone())
    }

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> CallResult<()> {
        let mut state = self.state.lock().unwrap();
        let role = state.roles.get_mut(role_name).ok_or_else(|| not_found(role_name))?;
        role.policies.retain(|policy| policy != policy_arn);
        Ok(())
    }

    async fn delete_role(&self, role_name: &str) -> CallResult<()> {
        let mut state = self.state.lock().unwrap();
        let role = state.roles.get(role_name).ok_or_else(|| not_found(role_name))?;
        let bound = state
            .profiles
            .values()
            .any(|profile| profile.roles.iter().any(|role| role == role_name));
        if !role.policies.is_empty() || bound {
            return Err(CallError::new(CallErrorKind::DependencyViolation, "role in use")
                .with_code("DeleteConflict"));
        }
        state.roles.remove(role_name);
        state.calls.push(format!("delete role {}", role_name));
        Ok(())
    }

    async fn create_instance_profile(
        &self,
        name: &str,
        tags: &TagSet,
    ) -> CallResult<ProfileRecord> {
        let mut state = self.state.lock().unwrap();
        if state.profiles.contains_key(name) {
            return Err(CallError::new(CallErrorKind::AlreadyExists, "profile exists")
                .with_code("EntityAlreadyExists"));
        }
        let arn = format!("arn:aws:iam::{}:instance-profile/{}", ACCOUNT, name);
        state.profiles.insert(
            name.to_string(),
            Profile {
                arn: arn.clone(),
                roles: Vec::new(),
                tags: tags.clone(),
            },
        );
        state.calls.push(format!("create instance-profile {}", name));
        Ok(ProfileRecord {
            name: name.to_string(),
            arn,
            roles: Vec::new(),
            tags: tags.clone(),
        })
    }

    async fn get_instance_profile(&self, name: &str) -> CallResult<Option<ProfileRecord>> {
        {
            let mut faults = self.faults.lock().unwrap();
            if faults.invisible_profile_reads > 0 {
                faults.invisible_profile_reads -= 1;
                return Err(not_found(name));
            }
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .profiles
            .get(name)
            .map(|profile| ProfileRecord {
                name: name.to_string(),
                arn: profile.arn.clone(),
                roles: profile.roles.clone(),
                tags: profile.tags.clone(),
            }))
    }

    async fn add_role_to_profile(&self, profile_name: &str, role_name: &str) -> CallResult<()> {
        let mut state = self.state.lock().unwrap();
        let profile = state
            .profiles
            .get_mut(profile_name)
            .ok_or_else(|| not_found(profile_name))?;
        if !profile.roles.is_empty() {
            return Err(CallError::new(
                CallErrorKind::LimitExceeded,
                "Cannot exceed quota for InstanceSessionsPerInstanceProfile: 1",
            )
            .with_code("LimitExceeded"));
        }
        profile.roles.push(role_name.to_string());
        state
            .calls
            .push(format!("bind {} {}", profile_name, role_name));
        Ok(())
    }

    async fn remove_role_from_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> CallResult<()> {
        let mut state = self.state.lock().unwrap();
        let profile = state
            .profiles
            .get_mut(profile_name)
            .ok_or_else(|| not_found(profile_name))?;
        profile.roles.retain(|role| role != role_name);
        Ok(())
    }

    async fn delete_instance_profile(&self, name: &str) -> CallResult<()> {
        let mut state = self.state.lock().unwrap();
        let profile = state.profiles.get(name).ok_or_else(|| not_found(name))?;
        if !profile.roles.is_empty() {
            return Err(CallError::new(CallErrorKind::DependencyViolation, "profile has roles")
                .with_code("DeleteConflict"));
        }
        state.profiles.remove(name);
        state.calls.push(format!("delete instance-profile {}", name));
        Ok(())
    }

    async fn find_images(&self, _filter: &ImageFilter) -> CallResult<Vec<MachineImage>> {
        Ok(vec![
            MachineImage {
                id: "ami-old".to_string(),
                name: "al2023-ami-2023.1.20230705.0-kernel-6.1-x86_64".to_string(),
                creation_date: "2023-07-05T00:00:00.000Z".to_string(),
            },
            MachineImage {
                id: "ami-new".to_string(),
                name: "al2023-ami-2023.2.20231002.0-kernel-6.1-x86_64".to_string(),
                creation_date: "2023-10-02T00:00:00.000Z".to_string(),
            },
            MachineImage {
                id: "ami-minimal".to_string(),
                name: "al2023-ami-minimal-2023.2.20231010.0-kernel-6.1-x86_64".to_string(),
                creation_date: "2023-10-10T00:00:00.000Z".to_string(),
            },
        ])
    }

    async fn launch_instance(&self, spec: &LaunchSpec) -> CallResult<String> {
        {
            let mut state = self.state.lock().unwrap();
            state.launch_calls += 1;
            let mut faults = self.faults.lock().unwrap();
            if faults.launch_profile_failures > 0 {
                faults.launch_profile_failures -= 1;
                return Err(CallError::new(
                    CallErrorKind::ProfilePropagating,
                    "Value (xstrapolate-demo-node-profile) for parameter iamInstanceProfile.name \
                     is invalid. Invalid IAM Instance Profile name",
                )
                .with_code("InvalidParameterValue"));
            }
        }
        self.fail("launch_instance")?;
        let mut state = self.state.lock().unwrap();
        if !state.profiles.contains_key(&spec.instance_profile) {
            return Err(not_found(&spec.instance_profile));
        }
        let network_id = state
            .resources
            .get(&spec.subnet_id)
            .and_then(|subnet| subnet.network_id.clone());
        let id = state.id("i");
        state.instances.insert(
            id.clone(),
            Instance {
                network_id,
                subnet_id: spec.subnet_id.clone(),
                state: InstanceState::Running,
                tags: spec.tags.clone(),
            },
        );
        state.calls.push(format!("launch instance {}", id));
        Ok(id)
    }

    async fn find_cluster_instances(&self, cluster: &str) -> CallResult<Vec<InstanceRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .instances
            .iter()
            .filter(|(_, instance)| {
                instance.tags.cluster() == Some(cluster)
                    && instance.state != InstanceState::Terminated
            })
            .map(|(id, instance)| InstanceRecord {
                id: id.clone(),
                network_id: instance.network_id.clone(),
                state: instance.state,
                tags: instance.tags.clone(),
            })
            .collect())
    }

    async fn instance_state(&self, instance_id: &str) -> CallResult<Option<InstanceState>> {
        let mut state = self.state.lock().unwrap();
        let instance = match state.instances.get_mut(instance_id) {
            Some(instance) => instance,
            None => return Ok(None),
        };
        let current = instance.state;
        if current == InstanceState::ShuttingDown {
            instance.state = InstanceState::Terminated;
        }
        Ok(Some(current))
    }

    async fn terminate_instance(&self, instance_id: &str) -> CallResult<()> {
        let mut state = self.state.lock().unwrap();
        let instance = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| not_found(instance_id))?;
        instance.state = InstanceState::ShuttingDown;
        state.calls.push(format!("terminate instance {}", instance_id));
        Ok(())
    }

    async fn create_managed_cluster(
        &self,
        spec: &ManagedClusterSpec,
    ) -> CallResult<ManagedClusterRecord> {
        self.fail("create_managed_cluster")?;
        let mut state = self.state.lock().unwrap();
        if state.clusters.contains_key(&spec.name) {
            return Err(CallError::new(CallErrorKind::AlreadyExists, "cluster exists")
                .with_code("ResourceInUseException"));
        }
        let record = ManagedClusterRecord {
            name: spec.name.clone(),
            arn: Some(format!(
                "arn:aws:eks:us-west-2:{}:cluster/{}",
                ACCOUNT, spec.name
            )),
            endpoint: None,
            version: Some(spec.version.clone()),
            status: ManagedClusterStatus::Creating,
            tags: spec.tags.clone(),
        };
        state.clusters.insert(
            spec.name.clone(),
            Cluster {
                record: record.clone(),
                polls: 0,
            },
        );
        state.calls.push(format!("create managed-cluster {}", spec.name));
        Ok(record)
    }

    async fn describe_managed_cluster(
        &self,
        name: &str,
    ) -> CallResult<Option<ManagedClusterRecord>> {
        let mut faults = self.faults.lock().unwrap();
        if faults.throttled_cluster_reads > 0 {
            faults.throttled_cluster_reads -= 1;
            return Err(CallError::new(CallErrorKind::Transient, "Rate exceeded")
                .with_code("ThrottlingException"));
        }
        let mut state = self.state.lock().unwrap();
        let cluster = match state.clusters.get_mut(name) {
            Some(cluster) => cluster,
            None => return Ok(None),
        };
        cluster.polls += 1;
        if cluster.record.status == ManagedClusterStatus::Creating {
            if faults.cluster_fails {
                cluster.record.status = ManagedClusterStatus::Failed;
            } else if cluster.polls > faults.cluster_polls_until_active {
                cluster.record.status = ManagedClusterStatus::Active;
                cluster.record.endpoint = Some(format!("https://{}.eks.example.com", name));
            }
        }
        Ok(Some(cluster.record.clone()))
    }

    async fn delete_managed_cluster(&self, name: &str) -> CallResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.clusters.remove(name).is_none() {
            return Err(not_found(name));
        }
        state.calls.push(format!("delete managed-cluster {}", name));
        Ok(())
    }
}

/// Collects events so tests can look at them after the orchestrator has consumed the sink.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<Event> {
        self.events().into_iter().filter(Event::is_warning).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

/// Timings small enough for tests, with the production retry budgets.
pub fn fast_timings() -> Timings {
    let tick = Duration::from_millis(1);
    let limit = Duration::from_millis(500);
    Timings {
        profile_poll: tick,
        profile_timeout: limit,
        launch_attempts: 6,
        launch_backoff: tick,
        cluster_poll: tick,
        cluster_active_timeout: limit,
        cluster_deletion_timeout: limit,
        instance_poll: tick,
        instance_termination_timeout: limit,
        endpoint_poll: tick,
        endpoint_deletion_timeout: limit,
        interface_settle: tick,
        dependency_attempts: 3,
        dependency_backoff: tick,
    }
}

/// Tags as a foreign tool would set them: a cluster tag but no ownership tag.
pub fn foreign_tags(cluster: &str) -> TagSet {
    TagSet::new()
        .with(CLUSTER_KEY, cluster)
        .with("Name", "hand-made")
}

pub fn owned_tags(cluster: &str, kind: ResourceKind) -> TagSet {
    TagSet::new()
        .with(MANAGED_BY_KEY, MANAGED_BY_VALUE)
        .with(CLUSTER_KEY, cluster)
        .with("resource-kind", kind.to_string())
}
