use log::LevelFilter;

pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_LEVEL_FILTER: LevelFilter = LevelFilter::Info;
pub const ASSUME_ROLE_SESSION_NAME: &str = "xstrapolate";
pub const DEFAULT_ASSUME_ROLE_SESSION_DURATION: u64 = 3600;
pub const REGION_ENV: &str = "AWS_REGION";
