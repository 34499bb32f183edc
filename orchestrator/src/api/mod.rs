/*!

The provider client façade. A [`CloudApi`] is the session with one cloud provider: it is built
once at process entry, after which the provisioners borrow it for every call they make. The
lifecycle logic only ever talks to this trait, which keeps it independent of any provider SDK
and lets tests drive it with an in-memory implementation.

!*/

mod error;

pub use self::error::{CallError, CallErrorKind, CallResult};
use crate::tags::{ResourceKind, TagSet};
use serde::{Deserialize, Serialize};

/// The cloud providers a session can be opened against.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Aws,
}

serde_plain::derive_display_from_serialize!(ProviderKind);
serde_plain::derive_fromstr_from_deserialize!(ProviderKind);

impl ProviderKind {
    /// What the operator should do when credential validation fails.
    pub fn credentials_hint(&self) -> &'static str {
        match self {
            ProviderKind::Aws => {
                "run 'aws configure', or set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY, \
                or use an IAM role when running on EC2"
            }
        }
    }
}

/// The two DNS attributes of a network that must be switched on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DnsAttribute {
    Support,
    Hostnames,
}

serde_plain::derive_display_from_serialize!(DnsAttribute);

/// A resource found through discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub id: String,
    pub tags: TagSet,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

serde_plain::derive_display_from_serialize!(InstanceState);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceRecord {
    pub id: String,
    pub network_id: Option<String>,
    pub state: InstanceState,
    pub tags: TagSet,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleRecord {
    pub name: String,
    pub arn: String,
    pub tags: TagSet,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileRecord {
    pub name: String,
    pub arn: String,
    /// Names of the roles bound to the profile.
    pub roles: Vec<String>,
    pub tags: TagSet,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManagedClusterStatus {
    Pending,
    Creating,
    Active,
    Updating,
    Deleting,
    Failed,
}

serde_plain::derive_display_from_serialize!(ManagedClusterStatus);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagedClusterRecord {
    pub name: String,
    pub arn: Option<String>,
    pub endpoint: Option<String>,
    pub version: Option<String>,
    pub status: ManagedClusterStatus,
    pub tags: TagSet,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachineImage {
    pub id: String,
    pub name: String,
    /// ISO 8601, so that lexical order is chronological order.
    pub creation_date: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageFilter {
    pub owner: String,
    pub name_pattern: String,
    pub architecture: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubnetSpec {
    pub network_id: String,
    pub cidr: String,
    pub zone: String,
    pub tags: TagSet,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurityGroupSpec {
    pub network_id: String,
    pub name: String,
    pub description: String,
    pub tags: TagSet,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointSpec {
    pub network_id: String,
    pub service_name: String,
    pub subnet_ids: Vec<String>,
    pub security_group_id: String,
    pub tags: TagSet,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleSpec {
    pub name: String,
    /// The trust policy document as JSON.
    pub trust_policy: String,
    pub tags: TagSet,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSpec {
    pub image_id: String,
    pub instance_type: String,
    pub subnet_id: String,
    pub security_group_ids: Vec<String>,
    pub instance_profile: String,
    /// The bootstrap script in plain text. Bindings encode it as their API requires.
    pub user_data: String,
    pub tags: TagSet,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagedClusterSpec {
    pub name: String,
    pub version: String,
    pub role_arn: String,
    pub subnet_ids: Vec<String>,
    pub tags: TagSet,
}

/// The capabilities the orchestrator needs from a cloud provider.
///
/// Implementations perform exactly one provider request per method (paginating where needed)
/// and do not retry on their own beyond what their SDK does; bounded retries and waits are the
/// orchestrator's business. Discovery methods return resources regardless of their tags; the
/// caller decides ownership.
#[async_trait::async_trait]
pub trait CloudApi: Send + Sync {
    fn provider(&self) -> ProviderKind;

    fn region(&self) -> &str;

    /// Verify that the ambient credentials work. Returns the account (or subscription) id.
    async fn validate_credentials(&self) -> CallResult<String>;

    // Network

    async fn availability_zones(&self) -> CallResult<Vec<String>>;

    async fn create_network(&self, cidr: &str, tags: &TagSet) -> CallResult<String>;

    async fn enable_dns(&self, network_id: &str, attribute: DnsAttribute) -> CallResult<()>;

    async fn create_subnet(&self, spec: &SubnetSpec) -> CallResult<String>;

    /// Make instances launched in the subnet receive a public address.
    async fn enable_public_addressing(&self, subnet_id: &str) -> CallResult<()>;

    async fn create_internet_gateway(&self, tags: &TagSet) -> CallResult<String>;

    async fn attach_internet_gateway(&self, gateway_id: &str, network_id: &str)
        -> CallResult<()>;

    async fn detach_internet_gateway(&self, gateway_id: &str, network_id: &str)
        -> CallResult<()>;

    async fn create_route_table(&self, network_id: &str, tags: &TagSet) -> CallResult<String>;

    /// Add a `0.0.0.0/0` route through `gateway_id`.
    async fn create_default_route(&self, route_table_id: &str, gateway_id: &str)
        -> CallResult<()>;

    async fn associate_route_table(&self, route_table_id: &str, subnet_id: &str)
        -> CallResult<()>;

    async fn create_security_group(&self, spec: &SecurityGroupSpec) -> CallResult<String>;

    /// Allow inbound TCP 443 from `cidr`.
    async fn allow_https_ingress(&self, group_id: &str, cidr: &str) -> CallResult<()>;

    async fn create_interface_endpoint(&self, spec: &EndpointSpec) -> CallResult<String>;

    // Discovery and deletion

    async fn describe_network(&self, network_id: &str) -> CallResult<Option<ResourceRecord>>;

    /// Networks tagged with the cluster name.
    async fn find_cluster_networks(&self, cluster: &str) -> CallResult<Vec<ResourceRecord>>;

    /// Resources of `kind` that live in (or are attached to) the network. Resources that are
    /// already deleted are not returned.
    async fn list_network_resources(
        &self,
        kind: ResourceKind,
        network_id: &str,
    ) -> CallResult<Vec<ResourceRecord>>;

    /// Delete one network-scoped resource. Route tables are disassociated first.
    async fn delete_network_resource(&self, kind: ResourceKind, id: &str) -> CallResult<()>;

    async fn delete_network(&self, network_id: &str) -> CallResult<()>;

    // Identity

    async fn create_role(&self, spec: &RoleSpec) -> CallResult<RoleRecord>;

    async fn get_role(&self, name: &str) -> CallResult<Option<RoleRecord>>;

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> CallResult<()>;

    async fn list_role_policies(&self, role_name: &str) -> CallResult<Vec<String>>;

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> CallResult<()>;

    async fn delete_role(&self, role_name: &str) -> CallResult<()>;

    async fn create_instance_profile(&self, name: &str, tags: &TagSet)
        -> CallResult<ProfileRecord>;

    async fn get_instance_profile(&self, name: &str) -> CallResult<Option<ProfileRecord>>;

    async fn add_role_to_profile(&self, profile_name: &str, role_name: &str) -> CallResult<()>;

    async fn remove_role_from_profile(&self, profile_name: &str, role_name: &str)
        -> CallResult<()>;

    async fn delete_instance_profile(&self, name: &str) -> CallResult<()>;

    // Compute

    async fn find_images(&self, filter: &ImageFilter) -> CallResult<Vec<MachineImage>>;

    async fn launch_instance(&self, spec: &LaunchSpec) -> CallResult<String>;

    /// Instances tagged with the cluster name that are not terminated.
    async fn find_cluster_instances(&self, cluster: &str) -> CallResult<Vec<InstanceRecord>>;

    /// `None` once the provider has forgotten the instance.
    async fn instance_state(&self, instance_id: &str) -> CallResult<Option<InstanceState>>;

    async fn terminate_instance(&self, instance_id: &str) -> CallResult<()>;

    async fn create_managed_cluster(
        &self,
        spec: &ManagedClusterSpec,
    ) -> CallResult<ManagedClusterRecord>;

    async fn describe_managed_cluster(&self, name: &str)
        -> CallResult<Option<ManagedClusterRecord>>;

    async fn delete_managed_cluster(&self, name: &str) -> CallResult<()>;
}
