use crate::config::Config;
use crate::install;
use crate::provider::{ProviderArgs, Session};
use anyhow::{Context, Result};
use clap::Parser;
use cloud_utils::json_display;
use orchestrator::{ClusterDescriptor, ClusterKind, CreateRequest};

/// Create a cluster. Running it again after a failure reuses what was already built.
#[derive(Debug, Parser)]
pub(crate) struct Create {
    /// Name of the cluster.
    name: String,

    /// The kind of cluster [single-node|managed|eks].
    #[clap(long = "type", default_value = "single-node")]
    kind: ClusterKind,

    /// Kubernetes version of a managed control plane.
    #[clap(long = "kubernetes-version")]
    kubernetes_version: Option<String>,

    /// Instance type of a single-node cluster.
    #[clap(long = "instance-type")]
    instance_type: Option<String>,

    /// Address range of the cluster's network.
    #[clap(long = "network-cidr")]
    network_cidr: Option<String>,

    /// Do not install the GitOps toolkit into a managed cluster.
    #[clap(long = "skip-install")]
    skip_install: bool,

    /// Output the cluster in JSON format.
    #[clap(long = "json")]
    json: bool,

    #[clap(flatten)]
    pub(crate) provider: ProviderArgs,
}

impl Create {
    fn request(&self, config: &Config) -> CreateRequest {
        let mut request = CreateRequest::new(&self.name, self.kind);
        if let Some(version) = self
            .kubernetes_version
            .as_ref()
            .or(config.kubernetes_version.as_ref())
        {
            request.kubernetes_version = version.clone();
        }
        if let Some(instance_type) = self.instance_type.as_ref().or(config.instance_type.as_ref()) {
            request.instance_type = instance_type.clone();
        }
        if let Some(cidr) = self.network_cidr.as_ref().or(config.network_cidr.as_ref()) {
            request.network_cidr = cidr.clone();
        }
        request.bootstrap_commands = config.bootstrap_commands.clone();
        request
    }

    pub(crate) async fn run(self, session: Session, config: &Config) -> Result<()> {
        let request = self.request(config);
        let cluster = session.manager.create_cluster(&request).await?;

        if cluster.kind == ClusterKind::Managed && !self.skip_install {
            install::install_gitops(&cluster, &session.region).with_context(|| {
                format!(
                    "Cluster '{}' was created but the GitOps toolkit could not be installed",
                    cluster.name
                )
            })?;
        }

        if self.json {
            println!("{}", json_display(&cluster));
        } else {
            print_summary(&cluster);
        }
        Ok(())
    }
}

fn print_summary(cluster: &ClusterDescriptor) {
    println!(
        "Cluster '{}' ({} on {}) is {}",
        cluster.name, cluster.kind, cluster.provider, cluster.status
    );
    match cluster.kind {
        ClusterKind::Managed => println!("Endpoint: {}", cluster.endpoint),
        ClusterKind::SingleNode => println!("Instance: {}", cluster.endpoint),
    }
    println!("Kubeconfig: {}", cluster.credential_path);
    for instruction in &cluster.instructions {
        println!("  {}", instruction);
    }
}
