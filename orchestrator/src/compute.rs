use crate::api::{
    CallErrorKind, CloudApi, ImageFilter, LaunchSpec, MachineImage, ManagedClusterRecord,
    ManagedClusterSpec, ManagedClusterStatus,
};
use crate::context::Context;
use crate::error::{Error, IntoError, Leftovers, Result};
use crate::events::Event;
use crate::tags::{ResourceKind, TagSet};
use crate::waiter::{wait_until, Poll, WaitOutcome};
use log::{debug, info};
use tokio::time::sleep;

/// The newest image that is not the minimal variant, or failing that the newest minimal one.
pub fn select_image<'a>(
    images: &'a [MachineImage],
    minimal_marker: &str,
) -> Option<&'a MachineImage> {
    let newest = move |minimal: bool| {
        images
            .iter()
            .filter(|image| image.name.contains(minimal_marker) == minimal)
            .max_by(|a, b| a.creation_date.cmp(&b.creation_date))
    };
    newest(false).or_else(|| newest(true))
}

pub struct ComputeProvisioner<'a, P: ?Sized> {
    ctx: Context<'a, P>,
}

impl<'a, P> ComputeProvisioner<'a, P>
where
    P: CloudApi + ?Sized,
{
    pub fn new(ctx: Context<'a, P>) -> Self {
        Self { ctx }
    }

    /// Ask the provider for a managed control plane. A cluster of the same name that carries
    /// our ownership tag is adopted; any other existing cluster is an error.
    pub async fn create_managed_cluster(
        &self,
        name: &str,
        version: &str,
        role_arn: &str,
        subnet_ids: &[String],
    ) -> Result<ManagedClusterRecord> {
        let ctx = self.ctx;
        let spec = ManagedClusterSpec {
            name: name.to_string(),
            version: version.to_string(),
            role_arn: role_arn.to_string(),
            subnet_ids: subnet_ids.to_vec(),
            tags: TagSet::managed(ctx.cluster, ResourceKind::ManagedCluster, "control-plane"),
        };
        match ctx.api.create_managed_cluster(&spec).await {
            Ok(record) => {
                ctx.emit(Event::Created {
                    kind: ResourceKind::ManagedCluster,
                    id: record.name.clone(),
                });
                Ok(record)
            }
            Err(e) if e.is_already_exists() => {
                let record = ctx
                    .api
                    .describe_managed_cluster(name)
                    .await
                    .context(
                        Leftovers::Remaining,
                        format!("Unable to describe existing cluster '{}'", name),
                    )?
                    .context(
                        Leftovers::Remaining,
                        format!("Cluster '{}' exists but cannot be found", name),
                    )?;
                if !record.tags.ownership(ctx.cluster).is_owned() {
                    return Err(Error::new_with_context(
                        Leftovers::Remaining,
                        format!(
                            "A cluster named '{}' exists and is not managed by xstrapolate",
                            name
                        ),
                    )
                    .with_remediation("choose another cluster name"));
                }
                ctx.emit(Event::Adopted {
                    kind: ResourceKind::ManagedCluster,
                    id: record.name.clone(),
                });
                Ok(record)
            }
            Err(e) => Err(Error::new_with_source_and_context(
                Leftovers::Remaining,
                format!("Unable to create managed cluster '{}'", name),
                e,
            )
            .with_remediation("check that the Kubernetes version is supported in the region")),
        }
    }

    /// Wait for the control plane to report active. A failed cluster or a call error that is not
    /// transient stops the wait at once.
    pub async fn wait_until_active(&self, name: &str) -> Result<ManagedClusterRecord> {
        let api = self.ctx.api;
        let timings = self.ctx.timings;
        self.ctx.emit(Event::Waiting {
            what: format!("managed cluster '{}' to become active", name),
        });
        let outcome = wait_until(
            "managed cluster",
            timings.cluster_poll,
            timings.cluster_active_timeout,
            move || async move {
                match api.describe_managed_cluster(name).await {
                    Ok(Some(record)) => match record.status {
                        ManagedClusterStatus::Active => Poll::Ready(record),
                        ManagedClusterStatus::Failed => Poll::PermanentError(format!(
                            "cluster '{}' reports status FAILED",
                            name
                        )),
                        status => {
                            debug!("Cluster '{}' is {}", name, status);
                            Poll::NotReady
                        }
                    },
                    Ok(None) => Poll::NotReady,
                    Err(e) if e.is_transient() => {
                        debug!("Describing cluster '{}' failed, polling again: {}", name, e);
                        Poll::NotReady
                    }
                    Err(e) => Poll::PermanentError(e.to_string()),
                }
            },
        )
        .await;
        match outcome {
            WaitOutcome::Ready(record) => Ok(record),
            WaitOutcome::TimedOut => Err(Error::new_with_context(
                Leftovers::Remaining,
                format!(
                    "Managed cluster '{}' did not become active within {} minutes",
                    name,
                    timings.cluster_active_timeout.as_secs() / 60
                ),
            )
            .with_remediation(format!(
                "the cluster may still converge; check it with 'xstrapolate get {}'",
                name
            ))),
            WaitOutcome::Error(message) => Err(Error::new_with_context(
                Leftovers::Remaining,
                message,
            )
            .with_remediation("inspect the cluster in the provider console, then tear it down")),
        }
    }

    pub async fn resolve_image(
        &self,
        filter: &ImageFilter,
        minimal_marker: &str,
    ) -> Result<MachineImage> {
        let images = self
            .ctx
            .api
            .find_images(filter)
            .await
            .context(Leftovers::Remaining, "Unable to list machine images")?;
        let image = select_image(&images, minimal_marker)
            .context(
                Leftovers::Remaining,
                format!("No machine image matches '{}'", filter.name_pattern),
            )?
            .clone();
        info!("Using image '{}' ({})", image.id, image.name);
        Ok(image)
    }

    /// Launch one instance. Only the "instance profile not usable yet" signature is retried;
    /// every other failure is fatal. Returns the instance id.
    pub async fn launch_node(&self, spec: &LaunchSpec) -> Result<String> {
        let ctx = self.ctx;
        let attempts = ctx.timings.launch_attempts.max(1);
        let mut attempt = 1;
        loop {
            match ctx.api.launch_instance(spec).await {
                Ok(id) => {
                    ctx.emit(Event::Created {
                        kind: ResourceKind::Instance,
                        id: id.clone(),
                    });
                    return Ok(id);
                }
                Err(e) if e.kind() == CallErrorKind::ProfilePropagating && attempt < attempts => {
                    ctx.emit(Event::Retrying {
                        step: "launch instance".to_string(),
                        attempt,
                        attempts,
                        message: e.to_string(),
                    });
                    attempt += 1;
                    sleep(ctx.timings.launch_backoff).await;
                }
                Err(e) => {
                    let remediation = if e.kind() == CallErrorKind::ProfilePropagating {
                        "the instance profile did not propagate in time; retry the create"
                    } else {
                        "check instance type availability and service quotas in the region"
                    };
                    return Err(Error::new_with_source_and_context(
                        Leftovers::Remaining,
                        format!("Unable to launch instance after {} attempt(s)", attempt),
                        e,
                    )
                    .with_remediation(remediation));
                }
            }
        }
    }
}
