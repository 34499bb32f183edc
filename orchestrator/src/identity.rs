/*!

Roles and instance profiles. Everything here is idempotent: an existing role or profile with
the expected name is adopted, an existing binding counts as success, and policy attachment is
best-effort.

!*/

use crate::api::{CallErrorKind, CloudApi, RoleSpec};
use crate::context::Context;
use crate::error::{Error, IntoError, Leftovers, Result};
use crate::events::Event;
use crate::tags::{ResourceKind, TagSet};
use crate::waiter::{wait_until, Poll, WaitOutcome};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

/// A role the orchestrator created or adopted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleHandle {
    pub name: String,
    pub arn: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityBinding {
    pub role_name: String,
    pub role_arn: String,
    /// Set for single-node clusters.
    pub profile_name: Option<String>,
    pub attached_policy_ids: Vec<String>,
}

/// Role names are scoped to the cluster so that one cluster's teardown leaves the others alone.
pub fn cluster_role_name(cluster: &str) -> String {
    format!("xstrapolate-{}-cluster-role", cluster)
}

pub fn node_role_name(cluster: &str) -> String {
    format!("xstrapolate-{}-node-role", cluster)
}

pub fn node_profile_name(cluster: &str) -> String {
    format!("xstrapolate-{}-node-profile", cluster)
}

/// A trust policy letting `service` assume the role.
pub fn trust_policy(service: &str) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "Service": service },
                "Action": "sts:AssumeRole"
            }
        ]
    })
    .to_string()
}

pub struct IdentityProvisioner<'a, P: ?Sized> {
    ctx: Context<'a, P>,
}

impl<'a, P> IdentityProvisioner<'a, P>
where
    P: CloudApi + ?Sized,
{
    pub fn new(ctx: Context<'a, P>) -> Self {
        Self { ctx }
    }

    /// Create the role, or adopt it if it already exists. `label` makes up the `Name` tag,
    /// e.g. `demo-node-role`.
    pub async fn ensure_role(
        &self,
        name: &str,
        label: &str,
        trust_policy: &str,
    ) -> Result<RoleHandle> {
        let ctx = self.ctx;
        let spec = RoleSpec {
            name: name.to_string(),
            trust_policy: trust_policy.to_string(),
            tags: TagSet::managed(ctx.cluster, ResourceKind::Role, label),
        };
        let record = match ctx.api.create_role(&spec).await {
            Ok(record) => {
                ctx.emit(Event::Created {
                    kind: ResourceKind::Role,
                    id: record.name.clone(),
                });
                record
            }
            Err(e) if e.is_already_exists() => {
                let record = ctx
                    .api
                    .get_role(name)
                    .await
                    .context(Leftovers::Unknown, format!("Unable to read role '{}'", name))?
                    .context(
                        Leftovers::Unknown,
                        format!("Role '{}' exists but cannot be found", name),
                    )?;
                if !record.tags.ownership(ctx.cluster).is_owned() {
                    ctx.emit(Event::warning(
                        format!("adopt role '{}'", name),
                        "the role is not tagged as managed by xstrapolate and will not be \
                        removed by teardown",
                    ));
                }
                ctx.emit(Event::Adopted {
                    kind: ResourceKind::Role,
                    id: record.name.clone(),
                });
                record
            }
            Err(e) => {
                return Err(Error::new_with_source_and_context(
                    Leftovers::Unknown,
                    format!("Unable to create role '{}'", name),
                    e,
                )
                .with_remediation("make sure the credentials allow iam:CreateRole"))
            }
        };
        Ok(RoleHandle {
            name: record.name,
            arn: record.arn,
        })
    }

    /// Attach each policy, reporting failures as warnings. Returns the policies that are
    /// attached.
    pub async fn attach_policies(&self, role: &RoleHandle, policy_ids: &[String]) -> Vec<String> {
        let mut attached = Vec::new();
        for policy in policy_ids {
            match self.ctx.api.attach_role_policy(&role.name, policy).await {
                Ok(()) => attached.push(policy.clone()),
                Err(e) => self.ctx.emit(Event::warning(
                    format!("attach policy '{}' to role '{}'", policy, role.name),
                    e.to_string(),
                )),
            }
        }
        attached
    }

    /// Create the instance profile, or adopt it if it already exists.
    pub async fn ensure_instance_profile(&self, name: &str) -> Result<String> {
        let ctx = self.ctx;
        let tags = TagSet::managed(ctx.cluster, ResourceKind::InstanceProfile, "node-profile");
        match ctx.api.create_instance_profile(name, &tags).await {
            Ok(record) => {
                ctx.emit(Event::Created {
                    kind: ResourceKind::InstanceProfile,
                    id: record.name.clone(),
                });
                Ok(record.name)
            }
            Err(e) if e.is_already_exists() => {
                ctx.emit(Event::Adopted {
                    kind: ResourceKind::InstanceProfile,
                    id: name.to_string(),
                });
                Ok(name.to_string())
            }
            Err(e) => Err(Error::new_with_source_and_context(
                Leftovers::Remaining,
                format!("Unable to create instance profile '{}'", name),
                e,
            )),
        }
    }

    /// Bind the role to the profile. A profile holds one role, so "limit exceeded" is accepted
    /// only when that role is this one.
    pub async fn bind_role_to_profile(&self, profile: &str, role: &RoleHandle) -> Result<()> {
        let ctx = self.ctx;
        match ctx.api.add_role_to_profile(profile, &role.name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_exists() || e.kind() == CallErrorKind::LimitExceeded => {
                let bound = ctx
                    .api
                    .get_instance_profile(profile)
                    .await
                    .context(
                        Leftovers::Remaining,
                        format!("Unable to read instance profile '{}'", profile),
                    )?
                    .map(|record| record.roles)
                    .unwrap_or_default();
                if bound.iter().any(|name| name == &role.name) {
                    ctx.emit(Event::Notice(format!(
                        "role '{}' is already bound to instance profile '{}'",
                        role.name, profile
                    )));
                    Ok(())
                } else {
                    Err(Error::new_with_context(
                        Leftovers::Remaining,
                        format!(
                            "Instance profile '{}' holds role(s) [{}] instead of '{}'",
                            profile,
                            bound.join(", "),
                            role.name
                        ),
                    )
                    .with_remediation(format!(
                        "remove the other role from '{}' or tear the cluster down",
                        profile
                    )))
                }
            }
            Err(e) => Err(Error::new_with_source_and_context(
                Leftovers::Remaining,
                format!(
                    "Unable to add role '{}' to instance profile '{}'",
                    role.name, profile
                ),
                e,
            )),
        }
    }

    /// Wait until the profile can be read with at least one role bound. Timing out is fatal.
    pub async fn wait_until_usable(&self, profile: &str, limit: Duration) -> Result<()> {
        let api = self.ctx.api;
        self.ctx.emit(Event::Waiting {
            what: format!("instance profile '{}' to become usable", profile),
        });
        let outcome = wait_until(
            "instance profile",
            self.ctx.timings.profile_poll,
            limit,
            move || async move {
                match api.get_instance_profile(profile).await {
                    Ok(Some(record)) if !record.roles.is_empty() => Poll::Ready(()),
                    Ok(_) => Poll::NotReady,
                    Err(e) if e.is_not_found() => Poll::NotReady,
                    Err(e) => Poll::PermanentError(e),
                }
            },
        )
        .await;
        match outcome {
            WaitOutcome::Ready(()) => Ok(()),
            WaitOutcome::TimedOut => Err(Error::new_with_context(
                Leftovers::Remaining,
                format!(
                    "Instance profile '{}' did not become usable within {}s",
                    profile,
                    limit.as_secs()
                ),
            )
            .with_remediation("identity changes can take a while to propagate; retry the create")),
            WaitOutcome::Error(e) => Err(Error::new_with_source_and_context(
                Leftovers::Remaining,
                format!("Unable to read instance profile '{}'", profile),
                e,
            )),
        }
    }

    /// The role a managed control plane assumes.
    pub async fn provision_cluster_role(
        &self,
        trust_service: &str,
        policies: &[String],
    ) -> Result<IdentityBinding> {
        let role = self
            .ensure_role(
                &cluster_role_name(self.ctx.cluster),
                "cluster-role",
                &trust_policy(trust_service),
            )
            .await?;
        let attached_policy_ids = self.attach_policies(&role, policies).await;
        Ok(IdentityBinding {
            role_name: role.name,
            role_arn: role.arn,
            profile_name: None,
            attached_policy_ids,
        })
    }

    /// The role and instance profile of a single node, usable by the time this returns.
    pub async fn provision_node_identity(
        &self,
        trust_service: &str,
        policies: &[String],
    ) -> Result<IdentityBinding> {
        let cluster = self.ctx.cluster;
        let role = self
            .ensure_role(
                &node_role_name(cluster),
                "node-role",
                &trust_policy(trust_service),
            )
            .await?;
        let attached_policy_ids = self.attach_policies(&role, policies).await;
        let profile = self
            .ensure_instance_profile(&node_profile_name(cluster))
            .await?;
        self.bind_role_to_profile(&profile, &role).await?;
        self.wait_until_usable(&profile, self.ctx.timings.profile_timeout)
            .await?;
        Ok(IdentityBinding {
            role_name: role.name,
            role_arn: role.arn,
            profile_name: Some(profile),
            attached_policy_ids,
        })
    }
}

#[test]
fn trust_policy_names_service() {
    let policy: serde_json::Value =
        serde_json::from_str(&trust_policy("ec2.amazonaws.com")).unwrap();
    assert_eq!(
        policy["Statement"][0]["Principal"]["Service"],
        "ec2.amazonaws.com"
    );
    assert_eq!(policy["Statement"][0]["Action"], "sts:AssumeRole");
}

#[test]
fn names_fit_iam_limits() {
    let cluster = "a".repeat(32);
    assert!(node_profile_name(&cluster).len() <= 64);
    assert!(cluster_role_name(&cluster).len() <= 64);
}
