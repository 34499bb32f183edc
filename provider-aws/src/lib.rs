/*!

The AWS binding of [`CloudApi`]: VPC networking and instances through EC2, roles and instance
profiles through IAM, managed control planes through EKS, and credential validation through STS.
Each method performs the corresponding AWS request and classifies failures by their error code.

!*/

mod compute;
mod error;
mod identity;
mod network;
mod tags;

use crate::error::{call_error, missing};
use aws_types::SdkConfig;
use log::info;
use orchestrator::api::{
    CallResult, CloudApi, DnsAttribute, EndpointSpec, ImageFilter, InstanceRecord, InstanceState,
    LaunchSpec, MachineImage, ManagedClusterRecord, ManagedClusterSpec, ProfileRecord,
    ProviderKind, ResourceRecord, RoleRecord, RoleSpec, SecurityGroupSpec, SubnetSpec,
};
use orchestrator::tags::{ResourceKind, TagSet};

/// A session with one AWS account in one region.
pub struct AwsApi {
    region: String,
    ec2: aws_sdk_ec2::Client,
    eks: aws_sdk_eks::Client,
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
}

impl AwsApi {
    pub fn new(config: &SdkConfig, region: &str) -> Self {
        Self {
            region: region.to_string(),
            ec2: aws_sdk_ec2::Client::new(config),
            eks: aws_sdk_eks::Client::new(config),
            iam: aws_sdk_iam::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
        }
    }

    /// Load the ambient credentials, assuming `assume_role` on top of them if given.
    pub async fn connect(region: &str, assume_role: Option<&str>) -> Self {
        let config = cloud_utils::aws::aws_config(region, assume_role).await;
        Self::new(&config, region)
    }
}

#[async_trait::async_trait]
impl CloudApi for AwsApi {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Aws
    }

    fn region(&self) -> &str {
        &self.region
    }

    async fn validate_credentials(&self) -> CallResult<String> {
        let output = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(call_error)?;
        if let Some(arn) = output.arn() {
            info!("Authenticated as '{}'", arn);
        }
        output
            .account()
            .map(str::to_string)
            .ok_or_else(|| missing("the account", "GetCallerIdentity"))
    }

    async fn availability_zones(&self) -> CallResult<Vec<String>> {
        network::availability_zones(&self.ec2).await
    }

    async fn create_network(&self, cidr: &str, tags: &TagSet) -> CallResult<String> {
        network::create_vpc(&self.ec2, cidr, tags).await
    }

    async fn enable_dns(&self, network_id: &str, attribute: DnsAttribute) -> CallResult<()> {
        network::enable_dns(&self.ec2, network_id, attribute).await
    }

    async fn create_subnet(&self, spec: &SubnetSpec) -> CallResult<String> {
        network::create_subnet(&self.ec2, spec).await
    }

    async fn enable_public_addressing(&self, subnet_id: &str) -> CallResult<()> {
        network::enable_public_addressing(&self.ec2, subnet_id).await
    }

    async fn create_internet_gateway(&self, tags: &TagSet) -> CallResult<String> {
        network::create_internet_gateway(&self.ec2, tags).await
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, network_id: &str) -> CallResult<()> {
        network::attach_internet_gateway(&self.ec2, gateway_id, network_id).await
    }

    async fn detach_internet_gateway(&self, gateway_id: &str, network_id: &str) -> CallResult<()> {
        network::detach_internet_gateway(&self.ec2, gateway_id, network_id).await
    }

    async fn create_route_table(&self, network_id: &str, tags: &TagSet) -> CallResult<String> {
        network::create_route_table(&self.ec2, network_id, tags).await
    }

    async fn create_default_route(&self, route_table_id: &str, gateway_id: &str) -> CallResult<()> {
        network::create_default_route(&self.ec2, route_table_id, gateway_id).await
    }

    async fn associate_route_table(&self, route_table_id: &str, subnet_id: &str) -> CallResult<()> {
        network::associate_route_table(&self.ec2, route_table_id, subnet_id).await
    }

    async fn create_security_group(&self, spec: &SecurityGroupSpec) -> CallResult<String> {
        network::create_security_group(&self.ec2, spec).await
    }

    async fn allow_https_ingress(&self, group_id: &str, cidr: &str) -> CallResult<()> {
        network::allow_https_ingress(&self.ec2, group_id, cidr).await
    }

    async fn create_interface_endpoint(&self, spec: &EndpointSpec) -> CallResult<String> {
        network::create_interface_endpoint(&self.ec2, spec).await
    }

    async fn describe_network(&self, network_id: &str) -> CallResult<Option<ResourceRecord>> {
        error::absent_if_not_found(network::describe_vpc(&self.ec2, network_id).await)
    }

    async fn find_cluster_networks(&self, cluster: &str) -> CallResult<Vec<ResourceRecord>> {
        network::find_cluster_vpcs(&self.ec2, cluster).await
    }

    async fn list_network_resources(
        &self,
        kind: ResourceKind,
        network_id: &str,
    ) -> CallResult<Vec<ResourceRecord>> {
        network::list_vpc_resources(&self.ec2, kind, network_id).await
    }

    async fn delete_network_resource(&self, kind: ResourceKind, id: &str) -> CallResult<()> {
        network::delete_vpc_resource(&self.ec2, kind, id).await
    }

    async fn delete_network(&self, network_id: &str) -> CallResult<()> {
        network::delete_vpc(&self.ec2, network_id).await
    }

    async fn create_role(&self, spec: &RoleSpec) -> CallResult<RoleRecord> {
        identity::create_role(&self.iam, spec).await
    }

    async fn get_role(&self, name: &str) -> CallResult<Option<RoleRecord>> {
        identity::get_role(&self.iam, name).await
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> CallResult<()> {
        identity::attach_role_policy(&self.iam, role_name, policy_arn).await
    }

    async fn list_role_policies(&self, role_name: &str) -> CallResult<Vec<String>> {
        identity::list_role_policies(&self.iam, role_name).await
    }

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> CallResult<()> {
        identity::detach_role_policy(&self.iam, role_name, policy_arn).await
    }

    async fn delete_role(&self, role_name: &str) -> CallResult<()> {
        identity::delete_role(&self.iam, role_name).await
    }

    async fn create_instance_profile(
        &self,
        name: &str,
        tags: &TagSet,
    ) -> CallResult<ProfileRecord> {
        identity::create_instance_profile(&self.iam, name, tags).await
    }

    async fn get_instance_profile(&self, name: &str) -> CallResult<Option<ProfileRecord>> {
        identity::get_instance_profile(&self.iam, name).await
    }

    async fn add_role_to_profile(&self, profile_name: &str, role_name: &str) -> CallResult<()> {
        identity::add_role_to_profile(&self.iam, profile_name, role_name).await
    }

    async fn remove_role_from_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> CallResult<()> {
        identity::remove_role_from_profile(&self.iam, profile_name, role_name).await
    }

    async fn delete_instance_profile(&self, name: &str) -> CallResult<()> {
        identity::delete_instance_profile(&self.iam, name).await
    }

    async fn find_images(&self, filter: &ImageFilter) -> CallResult<Vec<MachineImage>> {
        compute::find_images(&self.ec2, filter).await
    }

    async fn launch_instance(&self, spec: &LaunchSpec) -> CallResult<String> {
        compute::launch_instance(&self.ec2, spec).await
    }

    async fn find_cluster_instances(&self, cluster: &str) -> CallResult<Vec<InstanceRecord>> {
        compute::find_cluster_instances(&self.ec2, cluster).await
    }

    async fn instance_state(&self, instance_id: &str) -> CallResult<Option<InstanceState>> {
        compute::instance_state_of(&self.ec2, instance_id).await
    }

    async fn terminate_instance(&self, instance_id: &str) -> CallResult<()> {
        compute::terminate_instance(&self.ec2, instance_id).await
    }

    async fn create_managed_cluster(
        &self,
        spec: &ManagedClusterSpec,
    ) -> CallResult<ManagedClusterRecord> {
        compute::create_managed_cluster(&self.eks, spec).await
    }

    async fn describe_managed_cluster(
        &self,
        name: &str,
    ) -> CallResult<Option<ManagedClusterRecord>> {
        compute::describe_managed_cluster(&self.eks, name).await
    }

    async fn delete_managed_cluster(&self, name: &str) -> CallResult<()> {
        compute::delete_managed_cluster(&self.eks, name).await
    }
}
