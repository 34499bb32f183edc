use crate::config::Config;
use anyhow::Result;
use clap::Parser;
use cloud_utils::aws::resolve_region;
use cloud_utils::constants::REGION_ENV;
use log::info;
use orchestrator::{ClusterManager, LogSink, Orchestrator, ProviderKind, Timings};
use provider_aws::AwsApi;
use std::env;

/// Which cloud account to work in.
#[derive(Debug, Parser)]
pub(crate) struct ProviderArgs {
    /// The cloud provider.
    #[clap(long = "provider", default_value = "aws")]
    pub(crate) provider: ProviderKind,

    /// The region to work in. Falls back to `AWS_REGION`, then the config file, then us-west-2.
    #[clap(long = "region")]
    pub(crate) region: Option<String>,
}

/// A validated provider session, ready to manage clusters.
pub(crate) struct Session {
    pub(crate) provider: ProviderKind,
    pub(crate) region: String,
    pub(crate) manager: Box<dyn ClusterManager>,
}

impl ProviderArgs {
    /// Open a session with the chosen provider and validate its credentials. Nothing else
    /// touches the cloud before this succeeds.
    pub(crate) async fn connect(&self, config: &Config) -> Result<Session> {
        let environment = env::var(REGION_ENV).ok();
        let (region, source) = resolve_region(
            self.region.as_deref(),
            environment.as_deref(),
            config.region.as_deref(),
        );
        info!("Using region '{}' from the {}", region, source);
        let manager: Box<dyn ClusterManager> = match self.provider {
            ProviderKind::Aws => {
                let api = AwsApi::connect(&region, config.assume_role.as_deref()).await;
                Box::new(Orchestrator::connect(api, Box::new(LogSink), Timings::default()).await?)
            }
        };
        Ok(Session {
            provider: self.provider,
            region,
            manager,
        })
    }
}
