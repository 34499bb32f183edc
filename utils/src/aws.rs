use crate::constants::{
    ASSUME_ROLE_SESSION_NAME, DEFAULT_ASSUME_ROLE_SESSION_DURATION, DEFAULT_REGION,
};
use aws_config::default_provider::credentials::default_provider;
use aws_config::sts::AssumeRoleProvider;
use aws_config::retry::RetryConfig;
use aws_sdk_sts::Region;
use aws_smithy_types::retry::RetryMode;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_types::SdkConfig;
use log::info;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Where the region of a session came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegionSource {
    Flag,
    Environment,
    ConfigFile,
    Default,
}

impl Display for RegionSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RegionSource::Flag => "command line",
            RegionSource::Environment => "environment",
            RegionSource::ConfigFile => "config file",
            RegionSource::Default => "default",
        };
        Display::fmt(s, f)
    }
}

/// Pick the region: the command line flag wins over the environment, which wins over the
/// config file. Empty values are ignored.
pub fn resolve_region(
    flag: Option<&str>,
    environment: Option<&str>,
    config_file: Option<&str>,
) -> (String, RegionSource) {
    let candidates = [
        (flag, RegionSource::Flag),
        (environment, RegionSource::Environment),
        (config_file, RegionSource::ConfigFile),
    ];
    candidates
        .into_iter()
        .find_map(|(value, source)| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(|value| (value.to_string(), source))
        })
        .unwrap_or_else(|| (DEFAULT_REGION.to_string(), RegionSource::Default))
}

/// Set up the config for aws calls in `region`, with `sts::assume_role` on top of the default
/// credential chain if a role arn is provided.
pub async fn aws_config(region: &str, assume_role: Option<&str>) -> SdkConfig {
    info!("Using region '{}' for the aws config.", region);
    let config_loader = aws_config::from_env().retry_config(
        RetryConfig::standard()
            .with_retry_mode(RetryMode::Adaptive)
            .with_max_attempts(15),
    );
    let base_provider = SharedCredentialsProvider::new(default_provider().await);
    let config_loader = match assume_role {
        Some(role_arn) => {
            info!("Assuming role '{}'.", role_arn);
            config_loader.credentials_provider(SharedCredentialsProvider::new(
                AssumeRoleProvider::builder(role_arn)
                    .region(Region::new(region.to_string()))
                    .session_name(ASSUME_ROLE_SESSION_NAME)
                    .session_length(Duration::from_secs(DEFAULT_ASSUME_ROLE_SESSION_DURATION))
                    .build(base_provider),
            ))
        }
        None => config_loader.credentials_provider(base_provider),
    };
    config_loader
        .region(Region::new(region.to_string()))
        .load()
        .await
}
