use crate::api::CloudApi;
use crate::cluster::{ClusterDescriptor, CreateRequest};
use crate::error::Result;
use crate::lifecycle::{Orchestrator, TeardownReport};

/// What a cloud provider offers to the command line: create, delete and look up clusters. One
/// implementation exists per provider session and is chosen once at startup.
#[async_trait::async_trait]
pub trait ClusterManager: Send + Sync {
    async fn create_cluster(&self, request: &CreateRequest) -> Result<ClusterDescriptor>;

    async fn delete_cluster(&self, name: &str) -> Result<TeardownReport>;

    async fn get_cluster(&self, name: &str) -> Result<Option<ClusterDescriptor>>;
}

#[async_trait::async_trait]
impl<P> ClusterManager for Orchestrator<P>
where
    P: CloudApi,
{
    async fn create_cluster(&self, request: &CreateRequest) -> Result<ClusterDescriptor> {
        self.create(request).await
    }

    async fn delete_cluster(&self, name: &str) -> Result<TeardownReport> {
        self.teardown(name).await
    }

    async fn get_cluster(&self, name: &str) -> Result<Option<ClusterDescriptor>> {
        self.describe(name).await
    }
}
