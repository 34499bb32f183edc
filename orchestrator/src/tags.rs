/*!

Ownership tagging. Every resource the orchestrator creates carries `managed-by=xstrapolate`, a
`resource-kind` tag, the name of the cluster it belongs to and a `Name`. Teardown discovers
resources through these tags and refuses to delete anything without the ownership tag.

!*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MANAGED_BY_KEY: &str = "managed-by";
pub const MANAGED_BY_VALUE: &str = "xstrapolate";
pub const RESOURCE_KIND_KEY: &str = "resource-kind";
pub const CLUSTER_KEY: &str = "xstrapolate-cluster";
pub const NAME_KEY: &str = "Name";
pub const TIER_KEY: &str = "tier";

/// The classes of cloud resources the orchestrator creates and deletes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Network,
    Subnet,
    InternetGateway,
    NatGateway,
    RouteTable,
    SecurityGroup,
    Endpoint,
    Instance,
    ManagedCluster,
    Role,
    InstanceProfile,
}

serde_plain::derive_display_from_serialize!(ResourceKind);
serde_plain::derive_fromstr_from_deserialize!(ResourceKind);

/// Whether a discovered resource may be deleted by a teardown of `cluster`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ownership {
    /// Carries the ownership tag and belongs to the cluster.
    Owned,
    /// Has no `managed-by=xstrapolate` tag.
    Unmanaged,
    /// Carries the ownership tag but belongs to another cluster.
    OtherCluster(String),
}

impl Ownership {
    pub fn is_owned(&self) -> bool {
        matches!(self, Ownership::Owned)
    }

    /// A short explanation for the teardown report.
    pub fn skip_reason(&self) -> String {
        match self {
            Ownership::Owned => "owned".to_string(),
            Ownership::Unmanaged => format!("missing tag {}={}", MANAGED_BY_KEY, MANAGED_BY_VALUE),
            Ownership::OtherCluster(other) => format!("belongs to cluster '{}'", other),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tags for a resource of `kind` created for `cluster`, named `<cluster>-<role>`.
    pub fn managed(cluster: &str, kind: ResourceKind, role: &str) -> Self {
        Self::new()
            .with(MANAGED_BY_KEY, MANAGED_BY_VALUE)
            .with(RESOURCE_KIND_KEY, kind.to_string())
            .with(CLUSTER_KEY, cluster)
            .with(NAME_KEY, format!("{}-{}", cluster, role))
    }

    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.get(NAME_KEY)
    }

    pub fn cluster(&self) -> Option<&str> {
        self.get(CLUSTER_KEY)
    }

    pub fn is_managed(&self) -> bool {
        self.get(MANAGED_BY_KEY) == Some(MANAGED_BY_VALUE)
    }

    /// A resource without a cluster tag but with the ownership tag is treated as owned.
    pub fn ownership(&self, cluster: &str) -> Ownership {
        if !self.is_managed() {
            return Ownership::Unmanaged;
        }
        match self.cluster() {
            Some(other) if other != cluster => Ownership::OtherCluster(other.to_string()),
            _ => Ownership::Owned,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for TagSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Find the id of the owned record whose `Name` tag is `name`. Used to adopt resources left by
/// an earlier, interrupted run.
pub fn find_by_name<'a, I>(records: I, cluster: &str, name: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a crate::api::ResourceRecord>,
{
    records
        .into_iter()
        .find(|record| {
            record.tags.ownership(cluster).is_owned() && record.tags.name() == Some(name)
        })
        .map(|record| record.id.as_str())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn managed_tags() {
        let tags = TagSet::managed("demo", ResourceKind::RouteTable, "public-rt");
        assert!(tags.is_managed());
        assert_eq!(tags.get(RESOURCE_KIND_KEY), Some("route-table"));
        assert_eq!(tags.name(), Some("demo-public-rt"));
        assert_eq!(tags.ownership("demo"), Ownership::Owned);
    }

    #[test]
    fn ownership_requires_managed_tag() {
        let tags: TagSet = vec![(NAME_KEY, "demo-vpc"), (CLUSTER_KEY, "demo")]
            .into_iter()
            .collect();
        assert_eq!(tags.ownership("demo"), Ownership::Unmanaged);

        let tags = TagSet::new().with(MANAGED_BY_KEY, "someone-else");
        assert!(!tags.ownership("demo").is_owned());
    }

    #[test]
    fn ownership_checks_cluster() {
        let tags = TagSet::managed("other", ResourceKind::Network, "vpc");
        assert_eq!(
            tags.ownership("demo"),
            Ownership::OtherCluster("other".to_string())
        );
        let legacy = TagSet::new().with(MANAGED_BY_KEY, MANAGED_BY_VALUE);
        assert!(legacy.ownership("demo").is_owned());
    }
}
