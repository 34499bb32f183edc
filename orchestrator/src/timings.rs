use std::time::Duration;

/// Poll intervals, time limits and retry budgets used by the lifecycle operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timings {
    /// How often and how long to wait for a new instance profile to be readable with its role.
    pub profile_poll: Duration,
    pub profile_timeout: Duration,

    /// Launch attempts while the instance profile is still propagating, and the pause between.
    pub launch_attempts: u32,
    pub launch_backoff: Duration,

    pub cluster_poll: Duration,
    pub cluster_active_timeout: Duration,
    pub cluster_deletion_timeout: Duration,

    pub instance_poll: Duration,
    pub instance_termination_timeout: Duration,

    pub endpoint_poll: Duration,
    pub endpoint_deletion_timeout: Duration,
    /// Pause after endpoints are gone so that their network interfaces are released.
    pub interface_settle: Duration,

    /// Deletion attempts for security groups and subnets that are still referenced.
    pub dependency_attempts: u32,
    pub dependency_backoff: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            profile_poll: Duration::from_secs(10),
            profile_timeout: Duration::from_secs(120),
            launch_attempts: 6,
            launch_backoff: Duration::from_secs(5),
            cluster_poll: Duration::from_secs(30),
            cluster_active_timeout: Duration::from_secs(20 * 60),
            cluster_deletion_timeout: Duration::from_secs(15 * 60),
            instance_poll: Duration::from_secs(10),
            instance_termination_timeout: Duration::from_secs(5 * 60),
            endpoint_poll: Duration::from_secs(10),
            endpoint_deletion_timeout: Duration::from_secs(5 * 60),
            interface_settle: Duration::from_secs(30),
            dependency_attempts: 3,
            dependency_backoff: Duration::from_secs(10),
        }
    }
}
