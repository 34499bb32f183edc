use super::report::{Outcome, ReportEntry, TeardownReport, TeardownStep};
use super::Orchestrator;
use crate::api::{CallErrorKind, CallResult, CloudApi, InstanceState, ResourceRecord};
use crate::cluster::validate_name;
use crate::context::Context;
use crate::error::Result;
use crate::events::Event;
use crate::identity::{cluster_role_name, node_profile_name, node_role_name};
use crate::tags::ResourceKind;
use crate::waiter::{wait_until, Poll, WaitOutcome};
use log::{debug, info};
use tokio::time::sleep;

impl<P> Orchestrator<P>
where
    P: CloudApi,
{
    /// Remove everything tagged for `cluster`, newest dependency first: compute, then each
    /// network from its endpoints inwards, then identity. Resources without the ownership tag
    /// are reported and left alone. A failure is recorded and the sweep goes on; the only error
    /// returned is an invalid cluster name.
    pub async fn teardown(&self, cluster: &str) -> Result<TeardownReport> {
        validate_name(cluster)?;
        info!("Tearing down cluster '{}'", cluster);
        let mut sweep = Sweep {
            ctx: self.context(cluster),
            report: TeardownReport::new(cluster),
        };
        let mut networks = sweep.instances().await;
        sweep.managed_cluster().await;
        for network in sweep.tagged_networks().await {
            if !networks.contains(&network) {
                networks.push(network);
            }
        }
        for network in &networks {
            sweep.network(network).await;
        }
        sweep.identity().await;
        info!(
            "Teardown of '{}' finished with {} failure(s)",
            cluster,
            sweep.report.failures().count()
        );
        Ok(sweep.report)
    }
}

struct Sweep<'a, P: ?Sized> {
    ctx: Context<'a, P>,
    report: TeardownReport,
}

impl<'a, P> Sweep<'a, P>
where
    P: CloudApi + ?Sized,
{
    fn record(
        &mut self,
        step: TeardownStep,
        kind: Option<ResourceKind>,
        id: Option<&str>,
        outcome: Outcome,
    ) {
        let entry = ReportEntry {
            step,
            kind,
            resource_id: id.map(str::to_string),
            outcome,
        };
        self.ctx.emit(Event::Teardown(entry.clone()));
        self.report.entries.push(entry);
    }

    fn record_result(
        &mut self,
        step: TeardownStep,
        kind: ResourceKind,
        id: &str,
        result: CallResult<()>,
    ) {
        let outcome = match result {
            Ok(()) => Outcome::Deleted,
            Err(e) if e.is_not_found() => Outcome::Skipped("already deleted".to_string()),
            Err(e) => Outcome::Failed(e.to_string()),
        };
        self.record(step, Some(kind), Some(id), outcome);
    }

    /// Terminate the cluster's instances and wait until they are gone. Returns the networks
    /// they lived in.
    async fn instances(&mut self) -> Vec<String> {
        let ctx = self.ctx;
        let instances = match ctx.api.find_cluster_instances(ctx.cluster).await {
            Ok(instances) => instances,
            Err(e) => {
                self.record(
                    TeardownStep::InstancesDiscovered,
                    Some(ResourceKind::Instance),
                    None,
                    Outcome::Failed(e.to_string()),
                );
                return Vec::new();
            }
        };

        let mut networks = Vec::new();
        let mut owned = Vec::new();
        for instance in instances {
            let ownership = instance.tags.ownership(ctx.cluster);
            if !ownership.is_owned() {
                self.record(
                    TeardownStep::InstancesDiscovered,
                    Some(ResourceKind::Instance),
                    Some(&instance.id),
                    Outcome::Skipped(ownership.skip_reason()),
                );
                continue;
            }
            self.record(
                TeardownStep::InstancesDiscovered,
                Some(ResourceKind::Instance),
                Some(&instance.id),
                Outcome::Found,
            );
            if let Some(network) = &instance.network_id {
                if !networks.contains(network) {
                    networks.push(network.clone());
                }
            }
            owned.push(instance);
        }

        let mut terminating = Vec::new();
        for instance in &owned {
            if instance.state == InstanceState::ShuttingDown {
                self.record(
                    TeardownStep::InstancesTerminated,
                    Some(ResourceKind::Instance),
                    Some(&instance.id),
                    Outcome::Skipped("already shutting down".to_string()),
                );
                terminating.push(instance.id.as_str());
                continue;
            }
            let result = ctx.api.terminate_instance(&instance.id).await;
            let failed = matches!(&result, Err(e) if !e.is_not_found());
            self.record_result(
                TeardownStep::InstancesTerminated,
                ResourceKind::Instance,
                &instance.id,
                result,
            );
            if !failed {
                terminating.push(instance.id.as_str());
            }
        }

        for id in terminating {
            let outcome = self.confirm_terminated(id).await;
            self.record(
                TeardownStep::InstancesTerminationConfirmed,
                Some(ResourceKind::Instance),
                Some(id),
                outcome,
            );
        }
        networks
    }

    async fn confirm_terminated(&self, id: &str) -> Outcome {
        let api = self.ctx.api;
        let timings = self.ctx.timings;
        self.ctx.emit(Event::Waiting {
            what: format!("instance '{}' to terminate", id),
        });
        let outcome = wait_until(
            "instance termination",
            timings.instance_poll,
            timings.instance_termination_timeout,
            move || async move {
                match api.instance_state(id).await {
                    Ok(None) | Ok(Some(InstanceState::Terminated)) => Poll::Ready(()),
                    Ok(Some(_)) => Poll::NotReady,
                    Err(e) if e.is_not_found() => Poll::Ready(()),
                    Err(e) => Poll::PermanentError(e),
                }
            },
        )
        .await;
        match outcome {
            WaitOutcome::Ready(()) => Outcome::Verified,
            WaitOutcome::TimedOut => Outcome::Failed(format!(
                "not terminated after {}s",
                timings.instance_termination_timeout.as_secs()
            )),
            WaitOutcome::Error(e) => Outcome::Failed(e.to_string()),
        }
    }

    /// Delete the managed control plane if there is one and wait for it to disappear.
    async fn managed_cluster(&mut self) {
        let ctx = self.ctx;
        let record = match ctx.api.describe_managed_cluster(ctx.cluster).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) if e.is_not_found() => return,
            Err(e) => {
                self.record(
                    TeardownStep::ManagedClusterDeleted,
                    Some(ResourceKind::ManagedCluster),
                    Some(ctx.cluster),
                    Outcome::Failed(e.to_string()),
                );
                return;
            }
        };
        let ownership = record.tags.ownership(ctx.cluster);
        if !ownership.is_owned() {
            self.record(
                TeardownStep::ManagedClusterDeleted,
                Some(ResourceKind::ManagedCluster),
                Some(&record.name),
                Outcome::Skipped(ownership.skip_reason()),
            );
            return;
        }
        if let Err(e) = ctx.api.delete_managed_cluster(&record.name).await {
            if !e.is_not_found() {
                self.record(
                    TeardownStep::ManagedClusterDeleted,
                    Some(ResourceKind::ManagedCluster),
                    Some(&record.name),
                    Outcome::Failed(e.to_string()),
                );
                return;
            }
        }

        let api = ctx.api;
        let name = record.name.as_str();
        ctx.emit(Event::Waiting {
            what: format!("managed cluster '{}' to be deleted", name),
        });
        let outcome = wait_until(
            "managed cluster deletion",
            ctx.timings.cluster_poll,
            ctx.timings.cluster_deletion_timeout,
            move || async move {
                match api.describe_managed_cluster(name).await {
                    Ok(None) => Poll::Ready(()),
                    Ok(Some(_)) => Poll::NotReady,
                    Err(e) if e.is_not_found() => Poll::Ready(()),
                    Err(e) => Poll::PermanentError(e),
                }
            },
        )
        .await;
        let outcome = match outcome {
            WaitOutcome::Ready(()) => Outcome::Deleted,
            WaitOutcome::TimedOut => Outcome::Failed(format!(
                "still deleting after {}s",
                ctx.timings.cluster_deletion_timeout.as_secs()
            )),
            WaitOutcome::Error(e) => Outcome::Failed(e.to_string()),
        };
        self.record(
            TeardownStep::ManagedClusterDeleted,
            Some(ResourceKind::ManagedCluster),
            Some(name),
            outcome,
        );
    }

    /// Networks carrying the cluster's tag, which covers managed clusters that have no instances.
    async fn tagged_networks(&mut self) -> Vec<String> {
        match self.ctx.api.find_cluster_networks(self.ctx.cluster).await {
            Ok(records) => records.into_iter().map(|record| record.id).collect(),
            Err(e) => {
                self.record(
                    TeardownStep::NetworkVerified,
                    Some(ResourceKind::Network),
                    None,
                    Outcome::Failed(e.to_string()),
                );
                Vec::new()
            }
        }
    }

    /// The owned resources of `kind` in the network. Everything else that is found is reported
    /// as skipped under `step`.
    async fn owned(
        &mut self,
        kind: ResourceKind,
        network_id: &str,
        step: TeardownStep,
    ) -> Vec<ResourceRecord> {
        let records = match self.ctx.api.list_network_resources(kind, network_id).await {
            Ok(records) => records,
            Err(e) => {
                self.record(step, Some(kind), None, Outcome::Failed(e.to_string()));
                return Vec::new();
            }
        };
        let mut owned = Vec::new();
        for record in records {
            let ownership = record.tags.ownership(self.ctx.cluster);
            if ownership.is_owned() {
                owned.push(record);
            } else {
                self.record(
                    step,
                    Some(kind),
                    Some(&record.id),
                    Outcome::Skipped(ownership.skip_reason()),
                );
            }
        }
        owned
    }

    /// Delete the network's resources in dependency order, then the network.
    async fn network(&mut self, network_id: &str) {
        let ctx = self.ctx;
        let record = match ctx.api.describe_network(network_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.record(
                    TeardownStep::NetworkVerified,
                    Some(ResourceKind::Network),
                    Some(network_id),
                    Outcome::Skipped("already deleted".to_string()),
                );
                return;
            }
            Err(e) => {
                self.record(
                    TeardownStep::NetworkVerified,
                    Some(ResourceKind::Network),
                    Some(network_id),
                    Outcome::Failed(e.to_string()),
                );
                return;
            }
        };
        let ownership = record.tags.ownership(ctx.cluster);
        if !ownership.is_owned() {
            self.record(
                TeardownStep::NetworkVerified,
                Some(ResourceKind::Network),
                Some(network_id),
                Outcome::Skipped(ownership.skip_reason()),
            );
            return;
        }
        self.record(
            TeardownStep::NetworkVerified,
            Some(ResourceKind::Network),
            Some(network_id),
            Outcome::Verified,
        );

        self.endpoints(network_id).await;

        for gateway in self
            .owned(ResourceKind::NatGateway, network_id, TeardownStep::NatGatewaysDeleted)
            .await
        {
            let result = ctx
                .api
                .delete_network_resource(ResourceKind::NatGateway, &gateway.id)
                .await;
            self.record_result(
                TeardownStep::NatGatewaysDeleted,
                ResourceKind::NatGateway,
                &gateway.id,
                result,
            );
        }

        for gateway in self
            .owned(
                ResourceKind::InternetGateway,
                network_id,
                TeardownStep::GatewaysDetachedAndDeleted,
            )
            .await
        {
            match ctx.api.detach_internet_gateway(&gateway.id, network_id).await {
                Err(e) if !e.is_not_found() => {
                    self.record(
                        TeardownStep::GatewaysDetachedAndDeleted,
                        Some(ResourceKind::InternetGateway),
                        Some(&gateway.id),
                        Outcome::Failed(format!("unable to detach: {}", e)),
                    );
                    continue;
                }
                _ => {}
            }
            let result = ctx
                .api
                .delete_network_resource(ResourceKind::InternetGateway, &gateway.id)
                .await;
            self.record_result(
                TeardownStep::GatewaysDetachedAndDeleted,
                ResourceKind::InternetGateway,
                &gateway.id,
                result,
            );
        }

        for table in self
            .owned(ResourceKind::RouteTable, network_id, TeardownStep::RouteTablesDeleted)
            .await
        {
            let result = ctx
                .api
                .delete_network_resource(ResourceKind::RouteTable, &table.id)
                .await;
            self.record_result(
                TeardownStep::RouteTablesDeleted,
                ResourceKind::RouteTable,
                &table.id,
                result,
            );
        }

        for group in self
            .owned(ResourceKind::SecurityGroup, network_id, TeardownStep::SecurityGroupsDeleted)
            .await
        {
            let outcome = self.delete_in_use(ResourceKind::SecurityGroup, &group.id).await;
            self.record(
                TeardownStep::SecurityGroupsDeleted,
                Some(ResourceKind::SecurityGroup),
                Some(&group.id),
                outcome,
            );
        }

        for subnet in self
            .owned(ResourceKind::Subnet, network_id, TeardownStep::SubnetsDeleted)
            .await
        {
            let outcome = self.delete_in_use(ResourceKind::Subnet, &subnet.id).await;
            self.record(
                TeardownStep::SubnetsDeleted,
                Some(ResourceKind::Subnet),
                Some(&subnet.id),
                outcome,
            );
        }

        let outcome = self.delete_in_use(ResourceKind::Network, network_id).await;
        self.record(
            TeardownStep::NetworkDeleted,
            Some(ResourceKind::Network),
            Some(network_id),
            outcome,
        );
    }

    /// Delete the network's endpoints and wait until they are gone, so that their network
    /// interfaces no longer hold on to subnets and security groups.
    async fn endpoints(&mut self, network_id: &str) {
        let ctx = self.ctx;
        let mut deleted = Vec::new();
        for endpoint in self
            .owned(ResourceKind::Endpoint, network_id, TeardownStep::EndpointsDeleted)
            .await
        {
            let result = ctx
                .api
                .delete_network_resource(ResourceKind::Endpoint, &endpoint.id)
                .await;
            if result.is_ok() {
                deleted.push(endpoint.id.clone());
            }
            self.record_result(
                TeardownStep::EndpointsDeleted,
                ResourceKind::Endpoint,
                &endpoint.id,
                result,
            );
        }
        if deleted.is_empty() {
            return;
        }

        let api = ctx.api;
        let pending = &deleted;
        ctx.emit(Event::Waiting {
            what: format!("{} endpoint(s) to be deleted", deleted.len()),
        });
        let outcome = wait_until(
            "endpoint deletion",
            ctx.timings.endpoint_poll,
            ctx.timings.endpoint_deletion_timeout,
            move || async move {
                match api
                    .list_network_resources(ResourceKind::Endpoint, network_id)
                    .await
                {
                    Ok(remaining) => {
                        let left = remaining
                            .iter()
                            .filter(|record| pending.contains(&record.id))
                            .count();
                        if left == 0 {
                            Poll::Ready(())
                        } else {
                            debug!("{} endpoint(s) still deleting", left);
                            Poll::NotReady
                        }
                    }
                    Err(e) => Poll::PermanentError(e),
                }
            },
        )
        .await;
        let outcome = match outcome {
            WaitOutcome::Ready(()) => Outcome::Verified,
            WaitOutcome::TimedOut => Outcome::Failed(format!(
                "endpoints still present after {}s",
                ctx.timings.endpoint_deletion_timeout.as_secs()
            )),
            WaitOutcome::Error(e) => Outcome::Failed(e.to_string()),
        };
        let confirmed = outcome == Outcome::Verified;
        self.record(
            TeardownStep::EndpointsConfirmedDeleted,
            Some(ResourceKind::Endpoint),
            None,
            outcome,
        );
        if confirmed {
            sleep(ctx.timings.interface_settle).await;
        }
    }

    /// Delete a resource that may still be referenced for a little while, retrying on
    /// dependency violations.
    async fn delete_in_use(&self, kind: ResourceKind, id: &str) -> Outcome {
        let ctx = self.ctx;
        let attempts = ctx.timings.dependency_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match kind {
                ResourceKind::Network => ctx.api.delete_network(id).await,
                _ => ctx.api.delete_network_resource(kind, id).await,
            };
            match result {
                Ok(()) => return Outcome::Deleted,
                Err(e) if e.is_not_found() => {
                    return Outcome::Skipped("already deleted".to_string())
                }
                Err(e) if e.kind() == CallErrorKind::DependencyViolation && attempt < attempts => {
                    ctx.emit(Event::Retrying {
                        step: format!("delete {} '{}'", kind, id),
                        attempt,
                        attempts,
                        message: e.to_string(),
                    });
                    attempt += 1;
                    sleep(ctx.timings.dependency_backoff).await;
                }
                Err(e) => return Outcome::Failed(e.to_string()),
            }
        }
    }

    /// Unbind and delete the instance profile, then detach the policies of and delete each role.
    async fn identity(&mut self) {
        let ctx = self.ctx;
        let profile_name = node_profile_name(ctx.cluster);
        match ctx.api.get_instance_profile(&profile_name).await {
            Ok(Some(profile)) => {
                let ownership = profile.tags.ownership(ctx.cluster);
                if ownership.is_owned() {
                    for role in &profile.roles {
                        if let Err(e) =
                            ctx.api.remove_role_from_profile(&profile.name, role).await
                        {
                            ctx.emit(Event::warning(
                                format!("remove role '{}' from '{}'", role, profile.name),
                                e.to_string(),
                            ));
                        }
                    }
                    let result = ctx.api.delete_instance_profile(&profile.name).await;
                    self.record_result(
                        TeardownStep::IdentityResourcesDeleted,
                        ResourceKind::InstanceProfile,
                        &profile.name,
                        result,
                    );
                } else {
                    self.record(
                        TeardownStep::IdentityResourcesDeleted,
                        Some(ResourceKind::InstanceProfile),
                        Some(&profile.name),
                        Outcome::Skipped(ownership.skip_reason()),
                    );
                }
            }
            Ok(None) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => self.record(
                TeardownStep::IdentityResourcesDeleted,
                Some(ResourceKind::InstanceProfile),
                Some(&profile_name),
                Outcome::Failed(e.to_string()),
            ),
        }

        for role_name in [node_role_name(ctx.cluster), cluster_role_name(ctx.cluster)] {
            let role = match ctx.api.get_role(&role_name).await {
                Ok(Some(role)) => role,
                Ok(None) => continue,
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    self.record(
                        TeardownStep::IdentityResourcesDeleted,
                        Some(ResourceKind::Role),
                        Some(&role_name),
                        Outcome::Failed(e.to_string()),
                    );
                    continue;
                }
            };
            let ownership = role.tags.ownership(ctx.cluster);
            if !ownership.is_owned() {
                self.record(
                    TeardownStep::IdentityResourcesDeleted,
                    Some(ResourceKind::Role),
                    Some(&role.name),
                    Outcome::Skipped(ownership.skip_reason()),
                );
                continue;
            }
            match ctx.api.list_role_policies(&role.name).await {
                Ok(policies) => {
                    for policy in policies {
                        if let Err(e) = ctx.api.detach_role_policy(&role.name, &policy).await {
                            ctx.emit(Event::warning(
                                format!("detach policy '{}' from role '{}'", policy, role.name),
                                e.to_string(),
                            ));
                        }
                    }
                }
                Err(e) => ctx.emit(Event::warning(
                    format!("list policies of role '{}'", role.name),
                    e.to_string(),
                )),
            }
            let result = ctx.api.delete_role(&role.name).await;
            self.record_result(
                TeardownStep::IdentityResourcesDeleted,
                ResourceKind::Role,
                &role.name,
                result,
            );
        }
    }
}
