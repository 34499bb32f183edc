use crate::tags::ResourceKind;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The steps of the teardown sweep, in the order they run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeardownStep {
    InstancesDiscovered,
    InstancesTerminated,
    InstancesTerminationConfirmed,
    ManagedClusterDeleted,
    NetworkVerified,
    EndpointsDeleted,
    EndpointsConfirmedDeleted,
    NatGatewaysDeleted,
    GatewaysDetachedAndDeleted,
    RouteTablesDeleted,
    SecurityGroupsDeleted,
    SubnetsDeleted,
    NetworkDeleted,
    IdentityResourcesDeleted,
}

serde_plain::derive_display_from_serialize!(TeardownStep);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "outcome", content = "reason")]
pub enum Outcome {
    /// The resource was deleted by this step.
    Deleted,
    /// An owned resource was discovered and will be deleted by a later step.
    Found,
    /// Ownership was checked, or a deletion was confirmed.
    Verified,
    /// Deliberately left alone, e.g. not owned or already gone.
    Skipped(String),
    Failed(String),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Deleted => write!(f, "deleted"),
            Outcome::Found => write!(f, "found"),
            Outcome::Verified => write!(f, "verified"),
            Outcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            Outcome::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub step: TeardownStep,
    pub kind: Option<ResourceKind>,
    pub resource_id: Option<String>,
    pub outcome: Outcome,
}

impl Display for ReportEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.step)?;
        match (&self.kind, &self.resource_id) {
            (Some(kind), Some(id)) => write!(f, " {} '{}'", kind, id)?,
            (None, Some(id)) => write!(f, " '{}'", id)?,
            _ => {}
        }
        write!(f, ": {}", self.outcome)
    }
}

/// Everything the teardown did, one entry per resource or step. Never fails to be produced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownReport {
    pub cluster: String,
    pub entries: Vec<ReportEntry>,
}

impl TeardownReport {
    pub fn new<S: Into<String>>(cluster: S) -> Self {
        Self {
            cluster: cluster.into(),
            entries: Vec::new(),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|entry| entry.outcome.is_failed())
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    /// How many resources were deleted. Discovery and confirmation entries do not count.
    pub fn deleted_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.resource_id.is_some() && entry.outcome == Outcome::Deleted)
            .count()
    }

    /// Ids that were deleted in `step`.
    pub fn deleted(&self, step: TeardownStep) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.step == step && entry.outcome == Outcome::Deleted)
            .filter_map(|entry| entry.resource_id.as_deref())
            .collect()
    }
}

#[test]
fn report_tracks_failures() {
    let mut report = TeardownReport::new("demo");
    report.entries.push(ReportEntry {
        step: TeardownStep::SubnetsDeleted,
        kind: Some(ResourceKind::Subnet),
        resource_id: Some("subnet-1".to_string()),
        outcome: Outcome::Deleted,
    });
    assert!(report.is_clean());
    report.entries.push(ReportEntry {
        step: TeardownStep::NetworkDeleted,
        kind: Some(ResourceKind::Network),
        resource_id: Some("vpc-1".to_string()),
        outcome: Outcome::Failed("DependencyViolation".to_string()),
    });
    assert!(!report.is_clean());
    assert_eq!(report.deleted(TeardownStep::SubnetsDeleted), vec!["subnet-1"]);
    assert_eq!(
        report.entries[1].to_string(),
        "network-deleted network 'vpc-1': failed (DependencyViolation)"
    );
}

#[test]
fn only_deletions_read_as_deleted() {
    let mut report = TeardownReport::new("demo");
    for (step, id, outcome) in [
        (TeardownStep::InstancesDiscovered, "i-1", Outcome::Found),
        (TeardownStep::InstancesTerminated, "i-1", Outcome::Deleted),
        (TeardownStep::InstancesTerminationConfirmed, "i-1", Outcome::Verified),
    ] {
        report.entries.push(ReportEntry {
            step,
            kind: Some(ResourceKind::Instance),
            resource_id: Some(id.to_string()),
            outcome,
        });
    }
    assert_eq!(report.deleted_count(), 1);
    assert_eq!(report.entries[1].to_string(), "instances-terminated instance 'i-1': deleted");
    assert_eq!(
        report.entries[2].to_string(),
        "instances-termination-confirmed instance 'i-1': verified"
    );
}
