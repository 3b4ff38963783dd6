//! Cluster client error types

use kj_exec::ExecError;
use thiserror::Error;

/// Errors from the kubectl facade. Each variant preserves the inner
/// execution error (and with it the captured CLI output) so the operator
/// sees the underlying diagnostics.
#[derive(Error, Debug)]
pub enum KubeError {
    /// A kubectl verb exited non-zero or could not be launched
    #[error("kubectl {verb} {resource} failed: {source}")]
    Command {
        verb: &'static str,
        resource: String,
        #[source]
        source: ExecError,
    },

    /// Manifest could not be staged to disk before invoking kubectl
    #[error("failed to write manifest to {path}: {source}")]
    Manifest {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// kubectl output did not have the expected shape
    #[error("unexpected kubectl output for {verb}: {detail}")]
    Parse { verb: &'static str, detail: String },

    /// Resource JSON could not be deserialized
    #[error("failed to parse resource JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl KubeError {
    pub(crate) fn command(verb: &'static str, resource: impl Into<String>, source: ExecError) -> Self {
        KubeError::Command {
            verb,
            resource: resource.into(),
            source,
        }
    }

    /// Captured CLI output attached to the underlying execution error, if any.
    pub fn output(&self) -> &str {
        match self {
            KubeError::Command { source, .. } => source.output(),
            _ => "",
        }
    }
}
