use crate::provider::{ProviderArgs, Session};
use crate::table::report_table;
use anyhow::{anyhow, Result};
use clap::Parser;
use cloud_utils::json_display;
use log::info;
use terminal_size::{Height, Width};

/// Delete every resource tagged for a cluster. Resources without the ownership tags are never
/// touched.
#[derive(Debug, Parser)]
pub(crate) struct Teardown {
    /// Name of the cluster.
    name: String,

    /// Confirm the deletion.
    #[clap(long = "force")]
    force: bool,

    /// Output the report in JSON format.
    #[clap(long = "json")]
    json: bool,

    #[clap(flatten)]
    pub(crate) provider: ProviderArgs,
}

impl Teardown {
    /// Refuse to go on without `--force`. Checked before any cloud call.
    pub(crate) fn confirm(&self) -> Result<()> {
        if self.force {
            Ok(())
        } else {
            Err(anyhow!(
                "teardown of '{}' cancelled - use --force to confirm",
                self.name
            ))
        }
    }

    pub(crate) async fn run(self, session: Session) -> Result<()> {
        let report = session.manager.delete_cluster(&self.name).await?;

        if self.json {
            println!("{}", json_display(&report));
        } else if report.entries.is_empty() {
            println!("Nothing found for cluster '{}'", self.name);
        } else {
            let (terminal_size::Width(width), _) =
                terminal_size::terminal_size().unwrap_or((Width(120), Height(0)));
            println!("{}", report_table(&report, width as usize));
        }

        let deleted = report.deleted_count();
        let failures = report.failures().count();
        info!(
            "Teardown of '{}' deleted {} resource(s) with {} failure(s)",
            self.name, deleted, failures
        );
        if failures > 0 {
            return Err(anyhow!(
                "teardown of '{}' finished with {} failure(s); fix them and run it again",
                self.name,
                failures
            ));
        }
        Ok(())
    }
}

#[test]
fn force_is_required() {
    let teardown = Teardown::try_parse_from(["teardown", "demo"]).unwrap();
    let err = teardown.confirm().unwrap_err();
    assert!(err.to_string().contains("use --force to confirm"));
    let teardown = Teardown::try_parse_from(["teardown", "demo", "--force"]).unwrap();
    assert!(teardown.confirm().is_ok());
}
