use orchestrator::lifecycle::ReportEntry;
use orchestrator::{ClusterDescriptor, Outcome, TeardownReport};
use tabled::{Alignment, Full, MaxWidth, MinWidth, Modify, Style, Table, Tabled};

/// Render the teardown report, one row per resource or step, fitted to `width` columns.
pub(crate) fn report_table(report: &TeardownReport, width: usize) -> String {
    let rows: Vec<ReportRow> = report.entries.iter().map(ReportRow::from).collect();
    fit(Table::new(rows), width)
}

pub(crate) fn cluster_table(cluster: &ClusterDescriptor, width: usize) -> String {
    fit(Table::new([ClusterRow::from(cluster)]), width)
}

fn fit(table: Table, width: usize) -> String {
    table
        .with(Style::blank())
        .with(Modify::new(Full).with(Alignment::left()))
        .with(MaxWidth::truncating(width))
        .with(MinWidth::new(width))
        .to_string()
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "STEP")]
    step: String,
    #[tabled(rename = "KIND")]
    #[tabled(display_with = "display_option")]
    kind: Option<String>,
    #[tabled(rename = "ID")]
    #[tabled(display_with = "display_option")]
    id: Option<String>,
    #[tabled(rename = "OUTCOME")]
    outcome: String,
    #[tabled(rename = "REASON")]
    #[tabled(display_with = "display_option")]
    reason: Option<String>,
}

impl From<&ReportEntry> for ReportRow {
    fn from(entry: &ReportEntry) -> Self {
        let (outcome, reason) = match &entry.outcome {
            Outcome::Deleted => ("deleted", None),
            Outcome::Found => ("found", None),
            Outcome::Verified => ("verified", None),
            Outcome::Skipped(reason) => ("skipped", Some(reason.clone())),
            Outcome::Failed(reason) => ("FAILED", Some(reason.clone())),
        };
        Self {
            step: entry.step.to_string(),
            kind: entry.kind.map(|kind| kind.to_string()),
            id: entry.resource_id.clone(),
            outcome: outcome.to_string(),
            reason,
        }
    }
}

#[derive(Tabled)]
struct ClusterRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "TYPE")]
    kind: String,
    #[tabled(rename = "PROVIDER")]
    provider: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "ENDPOINT")]
    endpoint: String,
}

impl From<&ClusterDescriptor> for ClusterRow {
    fn from(cluster: &ClusterDescriptor) -> Self {
        Self {
            name: cluster.name.clone(),
            kind: cluster.kind.to_string(),
            provider: cluster.provider.to_string(),
            status: cluster.status.to_string(),
            endpoint: cluster.endpoint.clone(),
        }
    }
}

fn display_option(o: &Option<String>) -> String {
    o.clone().unwrap_or_default()
}
