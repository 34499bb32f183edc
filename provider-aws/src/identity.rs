use crate::error::{absent_if_not_found, call_error, missing};
use crate::tags::{from_iam, to_iam};
use aws_sdk_iam::model::{InstanceProfile, Role};
use aws_sdk_iam::Client;
use orchestrator::api::{CallResult, ProfileRecord, RoleRecord, RoleSpec};
use orchestrator::tags::TagSet;

fn role_record(role: &Role) -> CallResult<RoleRecord> {
    Ok(RoleRecord {
        name: role
            .role_name()
            .ok_or_else(|| missing("the role name", "GetRole"))?
            .to_string(),
        arn: role
            .arn()
            .ok_or_else(|| missing("the role arn", "GetRole"))?
            .to_string(),
        tags: from_iam(role.tags()),
    })
}

fn profile_record(profile: &InstanceProfile) -> CallResult<ProfileRecord> {
    Ok(ProfileRecord {
        name: profile
            .instance_profile_name()
            .ok_or_else(|| missing("the profile name", "GetInstanceProfile"))?
            .to_string(),
        arn: profile
            .arn()
            .ok_or_else(|| missing("the profile arn", "GetInstanceProfile"))?
            .to_string(),
        roles: profile
            .roles()
            .unwrap_or_default()
            .iter()
            .filter_map(|role| role.role_name().map(str::to_string))
            .collect(),
        tags: from_iam(profile.tags()),
    })
}

pub(crate) async fn create_role(iam: &Client, spec: &RoleSpec) -> CallResult<RoleRecord> {
    let output = iam
        .create_role()
        .role_name(&spec.name)
        .assume_role_policy_document(&spec.trust_policy)
        .set_tags(Some(to_iam(&spec.tags)))
        .send()
        .await
        .map_err(call_error)?;
    role_record(output.role().ok_or_else(|| missing("the role", "CreateRole"))?)
}

pub(crate) async fn get_role(iam: &Client, name: &str) -> CallResult<Option<RoleRecord>> {
    let result = match iam.get_role().role_name(name).send().await {
        Ok(output) => output.role().map(role_record).transpose(),
        Err(e) => Err(call_error(e)),
    };
    absent_if_not_found(result)
}

pub(crate) async fn attach_role_policy(
    iam: &Client,
    role_name: &str,
    policy_arn: &str,
) -> CallResult<()> {
    iam.attach_role_policy()
        .role_name(role_name)
        .policy_arn(policy_arn)
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}

/// A role holds at most a handful of managed policies, well below the first page.
pub(crate) async fn list_role_policies(iam: &Client, role_name: &str) -> CallResult<Vec<String>> {
    let output = iam
        .list_attached_role_policies()
        .role_name(role_name)
        .max_items(100)
        .send()
        .await
        .map_err(call_error)?;
    Ok(output
        .attached_policies()
        .unwrap_or_default()
        .iter()
        .filter_map(|policy| policy.policy_arn().map(str::to_string))
        .collect())
}

pub(crate) async fn detach_role_policy(
    iam: &Client,
    role_name: &str,
    policy_arn: &str,
) -> CallResult<()> {
    iam.detach_role_policy()
        .role_name(role_name)
        .policy_arn(policy_arn)
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}

pub(crate) async fn delete_role(iam: &Client, role_name: &str) -> CallResult<()> {
    iam.delete_role()
        .role_name(role_name)
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}

pub(crate) async fn create_instance_profile(
    iam: &Client,
    name: &str,
    tags: &TagSet,
) -> CallResult<ProfileRecord> {
    let output = iam
        .create_instance_profile()
        .instance_profile_name(name)
        .set_tags(Some(to_iam(tags)))
        .send()
        .await
        .map_err(call_error)?;
    profile_record(
        output
            .instance_profile()
            .ok_or_else(|| missing("the instance profile", "CreateInstanceProfile"))?,
    )
}

pub(crate) async fn get_instance_profile(
    iam: &Client,
    name: &str,
) -> CallResult<Option<ProfileRecord>> {
    let result = match iam
        .get_instance_profile()
        .instance_profile_name(name)
        .send()
        .await
    {
        Ok(output) => output.instance_profile().map(profile_record).transpose(),
        Err(e) => Err(call_error(e)),
    };
    absent_if_not_found(result)
}

pub(crate) async fn add_role_to_profile(
    iam: &Client,
    profile_name: &str,
    role_name: &str,
) -> CallResult<()> {
    iam.add_role_to_instance_profile()
        .instance_profile_name(profile_name)
        .role_name(role_name)
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}

pub(crate) async fn remove_role_from_profile(
    iam: &Client,
    profile_name: &str,
    role_name: &str,
) -> CallResult<()> {
    iam.remove_role_from_instance_profile()
        .instance_profile_name(profile_name)
        .role_name(role_name)
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}

pub(crate) async fn delete_instance_profile(iam: &Client, name: &str) -> CallResult<()> {
    iam.delete_instance_profile()
        .instance_profile_name(name)
        .send()
        .await
        .map_err(call_error)?;
    Ok(())
}
