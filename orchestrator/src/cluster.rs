use crate::api::ProviderKind;
use crate::error::{Error, Leftovers, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const DEFAULT_KUBERNETES_VERSION: &str = "1.28";
pub const DEFAULT_INSTANCE_TYPE: &str = "t3.medium";
pub const DEFAULT_NETWORK_CIDR: &str = "10.0.0.0/16";

/// Cluster names end up in IAM names, which are limited to 64 characters.
const MAX_NAME_LEN: usize = 32;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterKind {
    /// A provider-managed Kubernetes control plane.
    #[serde(alias = "eks")]
    Managed,
    /// One instance running a lightweight Kubernetes distribution, reached through the
    /// provider's session manager.
    #[serde(alias = "single")]
    SingleNode,
}

serde_plain::derive_display_from_serialize!(ClusterKind);
serde_plain::derive_fromstr_from_deserialize!(ClusterKind);

impl ClusterKind {
    /// Availability zones the network must span.
    pub fn min_zones(&self) -> usize {
        match self {
            ClusterKind::Managed => 2,
            ClusterKind::SingleNode => 1,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterStatus {
    Provisioning,
    Active,
    Failed,
}

serde_plain::derive_display_from_serialize!(ClusterStatus);

/// What was built. Returned to the caller, never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDescriptor {
    pub name: String,
    pub kind: ClusterKind,
    pub provider: ProviderKind,
    /// The control plane endpoint, or the instance id of a single-node cluster.
    pub endpoint: String,
    /// Where the cluster's kubeconfig is (or will be) found.
    pub credential_path: String,
    pub status: ClusterStatus,
    /// Informational steps for reaching the cluster.
    #[serde(default)]
    pub instructions: Vec<String>,
}

impl Display for ClusterDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string_pretty(self)
            .unwrap_or_else(|e| format!("Serialization failed: {}", e));
        Display::fmt(&s, f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub kind: ClusterKind,
    pub kubernetes_version: String,
    pub network_cidr: String,
    pub instance_type: String,
    /// Appended to a single node's bootstrap script.
    pub bootstrap_commands: Vec<String>,
}

impl CreateRequest {
    pub fn new<S: Into<String>>(name: S, kind: ClusterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            kubernetes_version: DEFAULT_KUBERNETES_VERSION.to_string(),
            network_cidr: DEFAULT_NETWORK_CIDR.to_string(),
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
            bootstrap_commands: Vec::new(),
        }
    }
}

/// Cluster names are lowercase ASCII letters, digits and '-', start with a letter and are at most
/// 32 characters long.
pub fn validate_name(name: &str) -> Result<()> {
    let starts_with_letter = name
        .chars()
        .next()
        .map(|c| c.is_ascii_lowercase())
        .unwrap_or(false);
    let allowed = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if starts_with_letter && allowed && name.len() <= MAX_NAME_LEN {
        Ok(())
    } else {
        Err(Error::new_with_context(
            Leftovers::None,
            format!("invalid cluster name '{}'", name),
        )
        .with_remediation(
            "use 1 to 32 lowercase letters, digits or '-', starting with a letter",
        ))
    }
}
