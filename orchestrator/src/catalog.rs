/*!

Provider-specific names the provisioners need: service principals, managed policies, the node
image filter, the private-channel endpoint services, and how an operator reaches a cluster.

!*/

use crate::api::{ImageFilter, ProviderKind};

pub struct Catalog {
    /// The service allowed to assume the managed control plane's role.
    pub cluster_trust_service: &'static str,
    pub cluster_policies: Vec<String>,
    /// The service allowed to assume the single node's role.
    pub node_trust_service: &'static str,
    pub node_policies: Vec<String>,
    pub node_image: ImageFilter,
    /// Image names containing this are the stripped-down variant of the base image.
    pub minimal_image_marker: &'static str,
    /// Interface endpoints a node in a private subnet needs for session access.
    pub endpoint_services: Vec<String>,
    /// Where the single node writes its kubeconfig.
    pub node_kubeconfig_path: &'static str,
}

impl Catalog {
    pub fn new(provider: ProviderKind, region: &str) -> Self {
        match provider {
            ProviderKind::Aws => Self {
                cluster_trust_service: "eks.amazonaws.com",
                cluster_policies: vec![
                    "arn:aws:iam::aws:policy/AmazonEKSClusterPolicy".to_string()
                ],
                node_trust_service: "ec2.amazonaws.com",
                node_policies: vec![
                    "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore".to_string()
                ],
                node_image: ImageFilter {
                    owner: "amazon".to_string(),
                    name_pattern: "al2023-ami-*-x86_64".to_string(),
                    architecture: "x86_64".to_string(),
                },
                minimal_image_marker: "minimal",
                endpoint_services: ["ssm", "ssmmessages", "ec2messages"]
                    .iter()
                    .map(|service| format!("com.amazonaws.{}.{}", region, service))
                    .collect(),
                node_kubeconfig_path: "/etc/rancher/k3s/k3s.yaml",
            },
        }
    }

    /// Steps for reaching a managed control plane.
    pub fn managed_instructions(
        provider: ProviderKind,
        region: &str,
        cluster: &str,
        kubeconfig: &str,
    ) -> Vec<String> {
        match provider {
            ProviderKind::Aws => vec![
                format!(
                    "aws eks update-kubeconfig --region {} --name {} --kubeconfig {}",
                    region, cluster, kubeconfig
                ),
                format!("kubectl --kubeconfig {} get nodes", kubeconfig),
            ],
        }
    }

    /// Steps for reaching a single node.
    pub fn node_instructions(
        provider: ProviderKind,
        region: &str,
        instance_id: &str,
    ) -> Vec<String> {
        match provider {
            ProviderKind::Aws => vec![
                format!(
                    "aws ssm start-session --region {} --target {}",
                    region, instance_id
                ),
                "sudo kubectl get nodes".to_string(),
            ],
        }
    }
}

/// The local path the managed cluster's kubeconfig is written to.
pub fn managed_kubeconfig_path(cluster: &str) -> String {
    format!("~/.kube/config-{}", cluster)
}
