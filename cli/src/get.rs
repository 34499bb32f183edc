use crate::provider::{ProviderArgs, Session};
use crate::table::cluster_table;
use anyhow::{anyhow, Result};
use clap::Parser;
use cloud_utils::json_display;
use terminal_size::{Height, Width};

/// Look up a cluster by name.
#[derive(Debug, Parser)]
pub(crate) struct Get {
    /// Name of the cluster.
    name: String,

    /// Output the cluster in JSON format.
    #[clap(long = "json")]
    json: bool,

    #[clap(flatten)]
    pub(crate) provider: ProviderArgs,
}

impl Get {
    pub(crate) async fn run(self, session: Session) -> Result<()> {
        let cluster = session
            .manager
            .get_cluster(&self.name)
            .await?
            .ok_or_else(|| {
                anyhow!(
                    "cluster '{}' was not found in {} region '{}'",
                    self.name,
                    session.provider,
                    session.region
                )
            })?;
        if self.json {
            println!("{}", json_display(&cluster));
        } else {
            let (terminal_size::Width(width), _) =
                terminal_size::terminal_size().unwrap_or((Width(120), Height(0)));
            println!("{}", cluster_table(&cluster, width as usize));
        }
        Ok(())
    }
}
