use crate::error::{call_error, missing};
use crate::tags::{from_ec2, tag_specification};
use aws_sdk_ec2::model::{
    AttributeBooleanValue, Filter, IpPermission, IpRange, ResourceType, VpcEndpointType,
};
use aws_sdk_ec2::Client;
use log::debug;
use orchestrator::api::{
    CallError, CallErrorKind, CallResult, DnsAttribute, EndpointSpec, ResourceRecord,
    SecurityGroupSpec, SubnetSpec,
};
use orchestrator::tags::{ResourceKind, TagSet, CLUSTER_KEY};

fn vpc_filter(network_id: &str) -> Filter {
    Filter::builder().name("vpc-id").values(network_id).build()
}

fn enabled() -> AttributeBooleanValue {
    AttributeBooleanValue::builder().value(true).build()
}

pub(crate) async fn availability_zones(ec2: &Client) -> CallResult<Vec<String>> {
    let output = ec2
        .describe_availability_zones()
        .filters(Filter::builder().name("state").values("available").build())
        .send()
        .await
        .map_err(call_error)?;
    Ok(output
        .availability_zones()
        .unwrap_or_default()
        .iter()
        .filter_map(|zone| zone.zone_name().map(str::to_string))
        .collect())
}

pub(crate) async fn create_vpc(ec2: &Client, cidr: &str, tags: &TagSet) -> CallResult<String> {
    let output = ec2
        .create_vpc()
        .cidr_block(cidr)
        .tag_specifications(tag_specification(ResourceType::Vpc, tags))
        .send()
        .await
        .map_err(call_error)?;
    output
        .vpc()
        .and_then(|vpc| vpc.vpc_id())
        .map(str::to_string)
        .ok_or_else(|| missing("the vpc id", "CreateVpc"))
}

pub(crate) async fn enable_dns(
    ec2: &Client,
    vpc_id: &str,
    attribute: DnsAttribute,
) -> CallResult<()> {
    // The API takes one attribute per request.
    let request = ec2.modify_vpc_attribute().vpc_id(vpc_id);
    let request = match attribute {
        DnsAttribute::Support => request.enable_dns_support(enabled()),
        DnsAttribute::Hostnames => request.enable_dns_hostnames(enabled()),
    };
    request.send().await.map_err(call_error)?;
    Ok(())
}

pub(crate) async fn create_subnet(ec2: &Client, spec: &SubnetSpec) -> CallResult<String> {
    let output = ec2
        .create_subnet()
        .vpc_id(&spec.network_id)
        .cidr_block(&spec.cidr)
        .availability_zone(&spec.zone)
        .tag_specifications(tag_specification(ResourceType::Subnet, &spec.tags))
        .send()
        .await
        .map_err(call_error)?;
    output
        .subnet()
        .and_then(|subnet| subnet.subnet_id())
        .map(str::to_string)
        .ok_or_else(|| missing("the subnet id", "CreateSubnet"))
}

pub(crate) async fn enable_public_addressing(ec2: &Client, subnet_id: &str) -> CallResult<()> {
    ec2.modify_subnet_attribute()
        .subnet_id(subnet_id)
        .map_public_ip_on_launch(enabled())
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}

pub(crate) async fn create_internet_gateway(ec2: &Client, tags: &TagSet) -> CallResult<String> {
    let output = ec2
        .create_internet_gateway()
        .tag_specifications(tag_specification(ResourceType::InternetGateway, tags))
        .send()
        .await
        .map_err(call_error)?;
    output
        .internet_gateway()
        .and_then(|gateway| gateway.internet_gateway_id())
        .map(str::to_string)
        .ok_or_else(|| missing("the internet gateway id", "CreateInternetGateway"))
}

pub(crate) async fn attach_internet_gateway(
    ec2: &Client,
    gateway_id: &str,
    vpc_id: &str,
) -> CallResult<()> {
    ec2.attach_internet_gateway()
        .internet_gateway_id(gateway_id)
        .vpc_id(vpc_id)
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}

pub(crate) async fn detach_internet_gateway(
    ec2: &Client,
    gateway_id: &str,
    vpc_id: &str,
) -> CallResult<()> {
    ec2.detach_internet_gateway()
        .internet_gateway_id(gateway_id)
        .vpc_id(vpc_id)
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}

pub(crate) async fn create_route_table(
    ec2: &Client,
    vpc_id: &str,
    tags: &TagSet,
) -> CallResult<String> {
    let output = ec2
        .create_route_table()
        .vpc_id(vpc_id)
        .tag_specifications(tag_specification(ResourceType::RouteTable, tags))
        .send()
        .await
        .map_err(call_error)?;
    output
        .route_table()
        .and_then(|table| table.route_table_id())
        .map(str::to_string)
        .ok_or_else(|| missing("the route table id", "CreateRouteTable"))
}

pub(crate) async fn create_default_route(
    ec2: &Client,
    route_table_id: &str,
    gateway_id: &str,
) -> CallResult<()> {
    ec2.create_route()
        .route_table_id(route_table_id)
        .destination_cidr_block("0.0.0.0/0")
        .gateway_id(gateway_id)
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}

pub(crate) async fn associate_route_table(
    ec2: &Client,
    route_table_id: &str,
    subnet_id: &str,
) -> CallResult<()> {
    ec2.associate_route_table()
        .route_table_id(route_table_id)
        .subnet_id(subnet_id)
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}

pub(crate) async fn create_security_group(
    ec2: &Client,
    spec: &SecurityGroupSpec,
) -> CallResult<String> {
    let output = ec2
        .create_security_group()
        .group_name(&spec.name)
        .description(&spec.description)
        .vpc_id(&spec.network_id)
        .tag_specifications(tag_specification(ResourceType::SecurityGroup, &spec.tags))
        .send()
        .await
        .map_err(call_error)?;
    output
        .group_id()
        .map(str::to_string)
        .ok_or_else(|| missing("the group id", "CreateSecurityGroup"))
}

pub(crate) async fn allow_https_ingress(
    ec2: &Client,
    group_id: &str,
    cidr: &str,
) -> CallResult<()> {
    ec2.authorize_security_group_ingress()
        .group_id(group_id)
        .ip_permissions(
            IpPermission::builder()
                .ip_protocol("tcp")
                .from_port(443)
                .to_port(443)
                .ip_ranges(IpRange::builder().cidr_ip(cidr).build())
                .build(),
        )
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}

pub(crate) async fn create_interface_endpoint(
    ec2: &Client,
    spec: &EndpointSpec,
) -> CallResult<String> {
    let output = ec2
        .create_vpc_endpoint()
        .vpc_id(&spec.network_id)
        .service_name(&spec.service_name)
        .vpc_endpoint_type(VpcEndpointType::Interface)
        .set_subnet_ids(Some(spec.subnet_ids.clone()))
        .security_group_ids(&spec.security_group_id)
        .private_dns_enabled(true)
        .tag_specifications(tag_specification(ResourceType::VpcEndpoint, &spec.tags))
        .send()
        .await
        .map_err(call_error)?;
    output
        .vpc_endpoint()
        .and_then(|endpoint| endpoint.vpc_endpoint_id())
        .map(str::to_string)
        .ok_or_else(|| missing("the endpoint id", "CreateVpcEndpoint"))
}

pub(crate) async fn describe_vpc(ec2: &Client, vpc_id: &str) -> CallResult<Option<ResourceRecord>> {
    let output = ec2
        .describe_vpcs()
        .vpc_ids(vpc_id)
        .send()
        .await
        .map_err(call_error)?;
    Ok(output
        .vpcs()
        .unwrap_or_default()
        .iter()
        .find_map(|vpc| {
            Some(ResourceRecord {
                kind: ResourceKind::Network,
                id: vpc.vpc_id()?.to_string(),
                tags: from_ec2(vpc.tags()),
            })
        }))
}

pub(crate) async fn find_cluster_vpcs(
    ec2: &Client,
    cluster: &str,
) -> CallResult<Vec<ResourceRecord>> {
    let output = ec2
        .describe_vpcs()
        .filters(
            Filter::builder()
                .name(format!("tag:{}", CLUSTER_KEY))
                .values(cluster)
                .build(),
        )
        .send()
        .await
        .map_err(call_error)?;
    Ok(output
        .vpcs()
        .unwrap_or_default()
        .iter()
        .filter_map(|vpc| {
            Some(ResourceRecord {
                kind: ResourceKind::Network,
                id: vpc.vpc_id()?.to_string(),
                tags: from_ec2(vpc.tags()),
            })
        })
        .collect())
}

fn record(
    kind: ResourceKind,
    id: Option<&str>,
    tags: Option<&[aws_sdk_ec2::model::Tag]>,
) -> Option<ResourceRecord> {
    Some(ResourceRecord {
        kind,
        id: id?.to_string(),
        tags: from_ec2(tags),
    })
}

pub(crate) async fn list_vpc_resources(
    ec2: &Client,
    kind: ResourceKind,
    vpc_id: &str,
) -> CallResult<Vec<ResourceRecord>> {
    let records = match kind {
        ResourceKind::Subnet => ec2
            .describe_subnets()
            .filters(vpc_filter(vpc_id))
            .send()
            .await
            .map_err(call_error)?
            .subnets()
            .unwrap_or_default()
            .iter()
            .filter_map(|subnet| record(kind, subnet.subnet_id(), subnet.tags()))
            .collect(),
        ResourceKind::InternetGateway => ec2
            .describe_internet_gateways()
            .filters(
                Filter::builder()
                    .name("attachment.vpc-id")
                    .values(vpc_id)
                    .build(),
            )
            .send()
            .await
            .map_err(call_error)?
            .internet_gateways()
            .unwrap_or_default()
            .iter()
            .filter_map(|gateway| record(kind, gateway.internet_gateway_id(), gateway.tags()))
            .collect(),
        ResourceKind::NatGateway => ec2
            .describe_nat_gateways()
            .filter(vpc_filter(vpc_id))
            .filter(
                Filter::builder()
                    .name("state")
                    .values("pending")
                    .values("available")
                    .values("failed")
                    .build(),
            )
            .send()
            .await
            .map_err(call_error)?
            .nat_gateways()
            .unwrap_or_default()
            .iter()
            .filter_map(|gateway| record(kind, gateway.nat_gateway_id(), gateway.tags()))
            .collect(),
        ResourceKind::RouteTable => ec2
            .describe_route_tables()
            .filters(vpc_filter(vpc_id))
            .send()
            .await
            .map_err(call_error)?
            .route_tables()
            .unwrap_or_default()
            .iter()
            .filter_map(|table| record(kind, table.route_table_id(), table.tags()))
            .collect(),
        ResourceKind::SecurityGroup => ec2
            .describe_security_groups()
            .filters(vpc_filter(vpc_id))
            .send()
            .await
            .map_err(call_error)?
            .security_groups()
            .unwrap_or_default()
            .iter()
            .filter_map(|group| record(kind, group.group_id(), group.tags()))
            .collect(),
        // Endpoints that are still deleting are listed so that callers can wait for them.
        ResourceKind::Endpoint => ec2
            .describe_vpc_endpoints()
            .filters(vpc_filter(vpc_id))
            .send()
            .await
            .map_err(call_error)?
            .vpc_endpoints()
            .unwrap_or_default()
            .iter()
            .filter(|endpoint| {
                !endpoint
                    .state()
                    .map(|state| state.as_str().eq_ignore_ascii_case("deleted"))
                    .unwrap_or(false)
            })
            .filter_map(|endpoint| record(kind, endpoint.vpc_endpoint_id(), endpoint.tags()))
            .collect(),
        other => return Err(not_network_scoped(other)),
    };
    Ok(records)
}

fn not_network_scoped(kind: ResourceKind) -> CallError {
    CallError::new(
        CallErrorKind::Other,
        format!("'{}' is not a resource inside a vpc", kind),
    )
}

pub(crate) async fn delete_vpc_resource(
    ec2: &Client,
    kind: ResourceKind,
    id: &str,
) -> CallResult<()> {
    match kind {
        ResourceKind::Subnet => {
            ec2.delete_subnet()
                .subnet_id(id)
                .send()
                .await
                .map_err(call_error)?;
        }
        ResourceKind::InternetGateway => {
            ec2.delete_internet_gateway()
                .internet_gateway_id(id)
                .send()
                .await
                .map_err(call_error)?;
        }
        ResourceKind::NatGateway => {
            ec2.delete_nat_gateway()
                .nat_gateway_id(id)
                .send()
                .await
                .map_err(call_error)?;
        }
        ResourceKind::RouteTable => delete_route_table(ec2, id).await?,
        ResourceKind::SecurityGroup => {
            ec2.delete_security_group()
                .group_id(id)
                .send()
                .await
                .map_err(call_error)?;
        }
        ResourceKind::Endpoint => delete_endpoint(ec2, id).await?,
        other => return Err(not_network_scoped(other)),
    }
    Ok(())
}

/// Subnet associations keep a route table alive, so they go first. The main association is
/// the VPC's and cannot be removed.
async fn delete_route_table(ec2: &Client, route_table_id: &str) -> CallResult<()> {
    let output = ec2
        .describe_route_tables()
        .route_table_ids(route_table_id)
        .send()
        .await
        .map_err(call_error)?;
    let associations = output
        .route_tables()
        .unwrap_or_default()
        .iter()
        .flat_map(|table| table.associations().unwrap_or_default())
        .filter(|association| !association.main().unwrap_or(false))
        .filter_map(|association| association.route_table_association_id());
    for association_id in associations {
        debug!(
            "Disassociating '{}' from route table '{}'",
            association_id, route_table_id
        );
        ec2.disassociate_route_table()
            .association_id(association_id)
            .send()
            .await
            .map_err(call_error)?;
    }
    ec2.delete_route_table()
        .route_table_id(route_table_id)
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}

/// `DeleteVpcEndpoints` succeeds as a whole and lists per-endpoint failures in its response.
async fn delete_endpoint(ec2: &Client, endpoint_id: &str) -> CallResult<()> {
    let output = ec2
        .delete_vpc_endpoints()
        .vpc_endpoint_ids(endpoint_id)
        .send()
        .await
        .map_err(call_error)?;
    match output
        .unsuccessful()
        .unwrap_or_default()
        .iter()
        .find_map(|item| item.error())
    {
        Some(error) => {
            let code = error.code().unwrap_or("Unknown");
            let message = error.message().unwrap_or_default();
            Err(
                CallError::new(crate::error::classify(code, message), message.to_string())
                    .with_code(code),
            )
        }
        None => Ok(()),
    }
}

pub(crate) async fn delete_vpc(ec2: &Client, vpc_id: &str) -> CallResult<()> {
    ec2.delete_vpc()
        .vpc_id(vpc_id)
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}
