//! Cluster client trait

use async_trait::async_trait;

use kj_exec::ExecHandle;

use crate::error::KubeError;
use crate::resource::ResourceRef;

/// Abstraction over the cluster control plane.
///
/// The session orchestrator is written against this trait; production code
/// uses [`crate::Kubectl`], tests substitute a mock that records calls.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Apply a manifest, returning the combined CLI output.
    async fn apply(&self, manifest: &str) -> Result<String, KubeError>;

    /// Create a resource from a manifest, returning its qualified name.
    async fn create(&self, manifest: &str) -> Result<ResourceRef, KubeError>;

    /// Delete a resource, optionally waiting for finalization.
    async fn delete(
        &self,
        namespace: &str,
        resource: &ResourceRef,
        wait: bool,
    ) -> Result<(), KubeError>;

    /// Block until the resource reports Ready, up to `timeout` (e.g. `"90s"`).
    async fn wait_ready(
        &self,
        namespace: &str,
        resource: &ResourceRef,
        timeout: &str,
    ) -> Result<(), KubeError>;

    /// Copy a local file into a container of the resource.
    async fn copy_to(
        &self,
        namespace: &str,
        resource: &ResourceRef,
        container: Option<&str>,
        local: &str,
        remote: &str,
    ) -> Result<(), KubeError>;

    /// Run a shell command inside the resource.
    async fn exec(
        &self,
        namespace: &str,
        resource: &ResourceRef,
        command: &str,
    ) -> Result<(), KubeError>;

    /// Read the resource's assigned pod IP.
    async fn pod_ip(&self, namespace: &str, resource: &ResourceRef) -> Result<String, KubeError>;

    /// Start a background port-forward from a local port to the resource's
    /// remote port. Only launch failures surface here; steady-state failures
    /// show up when the caller reads the handle's output or kills it.
    async fn port_forward(
        &self,
        namespace: &str,
        resource: &ResourceRef,
        local_port: u16,
        remote_port: u16,
    ) -> Result<ExecHandle, KubeError>;
}
