//! kj-kube: typed facade over the `kubectl` binary
//!
//! Every resource verb kjump needs is one round trip through `kj-exec`
//! with a fixed command template. The [`ClusterClient`] trait is the seam
//! the session orchestrator is written against, so tests can substitute a
//! mock cluster.

pub mod client;
pub mod error;
pub mod kubectl;
pub mod resource;

pub use client::ClusterClient;
pub use error::KubeError;
pub use kubectl::Kubectl;
pub use resource::ResourceRef;
