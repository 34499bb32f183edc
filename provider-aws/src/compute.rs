use crate::error::{absent_if_not_found, call_error, missing};
use crate::tags::{from_ec2, from_map, tag_specification};
use aws_sdk_ec2::model::{
    Filter, IamInstanceProfileSpecification, Instance, InstanceStateName, InstanceType,
    ResourceType,
};
use aws_sdk_eks::model::{Cluster, ClusterStatus, VpcConfigRequest};
use log::debug;
use orchestrator::api::{
    CallResult, ImageFilter, InstanceRecord, InstanceState, LaunchSpec, MachineImage,
    ManagedClusterRecord, ManagedClusterSpec, ManagedClusterStatus,
};
use orchestrator::tags::CLUSTER_KEY;

/// States of instances that still exist as far as teardown is concerned.
const LIVE_STATES: [&str; 5] = ["pending", "running", "shutting-down", "stopping", "stopped"];

pub(crate) async fn find_images(
    ec2: &aws_sdk_ec2::Client,
    filter: &ImageFilter,
) -> CallResult<Vec<MachineImage>> {
    let output = ec2
        .describe_images()
        .owners(&filter.owner)
        .filters(
            Filter::builder()
                .name("name")
                .values(&filter.name_pattern)
                .build(),
        )
        .filters(
            Filter::builder()
                .name("architecture")
                .values(&filter.architecture)
                .build(),
        )
        .filters(Filter::builder().name("state").values("available").build())
        .send()
        .await
        .map_err(call_error)?;
    Ok(output
        .images()
        .unwrap_or_default()
        .iter()
        .filter_map(|image| {
            Some(MachineImage {
                id: image.image_id()?.to_string(),
                name: image.name().unwrap_or_default().to_string(),
                creation_date: image.creation_date().unwrap_or_default().to_string(),
            })
        })
        .collect())
}

pub(crate) async fn launch_instance(
    ec2: &aws_sdk_ec2::Client,
    spec: &LaunchSpec,
) -> CallResult<String> {
    let output = ec2
        .run_instances()
        .min_count(1)
        .max_count(1)
        .image_id(&spec.image_id)
        .instance_type(InstanceType::from(spec.instance_type.as_str()))
        .subnet_id(&spec.subnet_id)
        .set_security_group_ids(Some(spec.security_group_ids.clone()))
        .iam_instance_profile(
            IamInstanceProfileSpecification::builder()
                .name(&spec.instance_profile)
                .build(),
        )
        .user_data(base64::encode(&spec.user_data))
        .tag_specifications(tag_specification(ResourceType::Instance, &spec.tags))
        .send()
        .await
        .map_err(call_error)?;
    output
        .instances()
        .unwrap_or_default()
        .iter()
        .find_map(|instance| instance.instance_id())
        .map(str::to_string)
        .ok_or_else(|| missing("the instance id", "RunInstances"))
}

fn instance_state(name: &InstanceStateName) -> InstanceState {
    match name {
        InstanceStateName::Pending => InstanceState::Pending,
        InstanceStateName::Running => InstanceState::Running,
        InstanceStateName::ShuttingDown => InstanceState::ShuttingDown,
        InstanceStateName::Stopping => InstanceState::Stopping,
        InstanceStateName::Stopped => InstanceState::Stopped,
        _ => InstanceState::Terminated,
    }
}

fn instance_record(instance: &Instance) -> Option<InstanceRecord> {
    Some(InstanceRecord {
        id: instance.instance_id()?.to_string(),
        network_id: instance.vpc_id().map(str::to_string),
        state: instance_state(instance.state()?.name()?),
        tags: from_ec2(instance.tags()),
    })
}

pub(crate) async fn find_cluster_instances(
    ec2: &aws_sdk_ec2::Client,
    cluster: &str,
) -> CallResult<Vec<InstanceRecord>> {
    let output = ec2
        .describe_instances()
        .filters(
            Filter::builder()
                .name(format!("tag:{}", CLUSTER_KEY))
                .values(cluster)
                .build(),
        )
        .filters(
            Filter::builder()
                .name("instance-state-name")
                .set_values(Some(LIVE_STATES.iter().map(|s| s.to_string()).collect()))
                .build(),
        )
        .send()
        .await
        .map_err(call_error)?;
    let instances: Vec<InstanceRecord> = output
        .reservations()
        .unwrap_or_default()
        .iter()
        .flat_map(|reservation| reservation.instances().unwrap_or_default())
        .filter_map(instance_record)
        .collect();
    debug!("Found {} instance(s) tagged for '{}'", instances.len(), cluster);
    Ok(instances)
}

pub(crate) async fn instance_state_of(
    ec2: &aws_sdk_ec2::Client,
    instance_id: &str,
) -> CallResult<Option<InstanceState>> {
    let result = match ec2.describe_instances().instance_ids(instance_id).send().await {
        Ok(output) => Ok(output
            .reservations()
            .unwrap_or_default()
            .iter()
            .flat_map(|reservation| reservation.instances().unwrap_or_default())
            .find_map(|instance| instance.state()?.name().map(instance_state))),
        Err(e) => Err(call_error(e)),
    };
    absent_if_not_found(result)
}

pub(crate) async fn terminate_instance(
    ec2: &aws_sdk_ec2::Client,
    instance_id: &str,
) -> CallResult<()> {
    ec2.terminate_instances()
        .instance_ids(instance_id)
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}

fn cluster_status(status: Option<&ClusterStatus>) -> ManagedClusterStatus {
    match status {
        Some(ClusterStatus::Active) => ManagedClusterStatus::Active,
        Some(ClusterStatus::Creating) => ManagedClusterStatus::Creating,
        Some(ClusterStatus::Deleting) => ManagedClusterStatus::Deleting,
        Some(ClusterStatus::Failed) => ManagedClusterStatus::Failed,
        Some(ClusterStatus::Updating) => ManagedClusterStatus::Updating,
        _ => ManagedClusterStatus::Pending,
    }
}

fn cluster_record(cluster: &Cluster, operation: &str) -> CallResult<ManagedClusterRecord> {
    Ok(ManagedClusterRecord {
        name: cluster
            .name()
            .ok_or_else(|| missing("the cluster name", operation))?
            .to_string(),
        arn: cluster.arn().map(str::to_string),
        endpoint: cluster.endpoint().map(str::to_string),
        version: cluster.version().map(str::to_string),
        status: cluster_status(cluster.status()),
        tags: from_map(cluster.tags()),
    })
}

pub(crate) async fn create_managed_cluster(
    eks: &aws_sdk_eks::Client,
    spec: &ManagedClusterSpec,
) -> CallResult<ManagedClusterRecord> {
    let mut request = eks
        .create_cluster()
        .name(&spec.name)
        .version(&spec.version)
        .role_arn(&spec.role_arn)
        .resources_vpc_config(
            VpcConfigRequest::builder()
                .set_subnet_ids(Some(spec.subnet_ids.clone()))
                .build(),
        );
    for (key, value) in spec.tags.iter() {
        request = request.tags(key, value);
    }
    let output = request.send().await.map_err(call_error)?;
    cluster_record(
        output
            .cluster()
            .ok_or_else(|| missing("the cluster", "CreateCluster"))?,
        "CreateCluster",
    )
}

pub(crate) async fn describe_managed_cluster(
    eks: &aws_sdk_eks::Client,
    name: &str,
) -> CallResult<Option<ManagedClusterRecord>> {
    let result = match eks.describe_cluster().name(name).send().await {
        Ok(output) => output
            .cluster()
            .map(|cluster| cluster_record(cluster, "DescribeCluster"))
            .transpose(),
        Err(e) => Err(call_error(e)),
    };
    absent_if_not_found(result)
}

pub(crate) async fn delete_managed_cluster(
    eks: &aws_sdk_eks::Client,
    name: &str,
) -> CallResult<()> {
    eks.delete_cluster()
        .name(name)
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_states_count_as_gone() {
        assert_eq!(
            instance_state(&InstanceStateName::ShuttingDown),
            InstanceState::ShuttingDown
        );
        assert_eq!(
            instance_state(&InstanceStateName::Terminated),
            InstanceState::Terminated
        );
    }

    #[test]
    fn cluster_status_defaults_to_pending() {
        assert_eq!(
            cluster_status(Some(&ClusterStatus::Active)),
            ManagedClusterStatus::Active
        );
        assert_eq!(cluster_status(None), ManagedClusterStatus::Pending);
    }
}
