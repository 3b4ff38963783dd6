//! `kubectl` implementation of the cluster client
//!
//! Commands are assembled as structured argument vectors; nothing here is
//! interpolated into a shell string. Manifests are staged to a fixed file
//! in the session directory because `kubectl apply`/`create` take a file
//! path, not inline text.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use kj_exec::{Cmd, ExecError, ExecHandle};

use crate::client::ClusterClient;
use crate::error::KubeError;
use crate::resource::ResourceRef;

const MANIFEST_FILE: &str = "res.yaml";

/// Thin typed facade over the `kubectl` binary.
#[derive(Debug, Clone)]
pub struct Kubectl {
    manifest_path: PathBuf,
    debug: bool,
    cancel: CancellationToken,
}

impl Kubectl {
    /// `session_dir` is where the rendered manifest is staged.
    pub fn new(session_dir: &Path) -> Self {
        Self {
            manifest_path: session_dir.join(MANIFEST_FILE),
            debug: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Mirror kubectl invocations and output to the debug sink.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Bind every kubectl invocation to a cancellation token so an operator
    /// interrupt promptly terminates in-flight calls.
    #[must_use]
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn cmd<I, S>(&self, argv: I) -> Result<Cmd, ExecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Cmd::from_argv(argv)?
            .debug(self.debug)
            .cancel(self.cancel.clone()))
    }

    fn stage_manifest(&self, manifest: &str) -> Result<String, KubeError> {
        std::fs::write(&self.manifest_path, manifest).map_err(|source| KubeError::Manifest {
            path: self.manifest_path.display().to_string(),
            source,
        })?;
        Ok(self.manifest_path.display().to_string())
    }

    async fn run(
        &self,
        verb: &'static str,
        resource: &str,
        argv: Vec<String>,
    ) -> Result<String, KubeError> {
        self.cmd(argv)
            .map_err(|e| KubeError::command(verb, resource, e))?
            .run()
            .await
            .map_err(|e| KubeError::command(verb, resource, e))
    }
}

#[async_trait]
impl ClusterClient for Kubectl {
    async fn apply(&self, manifest: &str) -> Result<String, KubeError> {
        let path = self.stage_manifest(manifest)?;
        self.run(
            "apply",
            &path,
            vec!["kubectl".into(), "apply".into(), "-f".into(), path.clone()],
        )
        .await
    }

    async fn create(&self, manifest: &str) -> Result<ResourceRef, KubeError> {
        let path = self.stage_manifest(manifest)?;
        let out = self
            .run(
                "create",
                &path,
                vec!["kubectl".into(), "create".into(), "-f".into(), path.clone()],
            )
            .await?;
        ResourceRef::from_create_output(&out)
    }

    async fn delete(
        &self,
        namespace: &str,
        resource: &ResourceRef,
        wait: bool,
    ) -> Result<(), KubeError> {
        // teardown verb: deliberately not bound to the session token, an
        // interrupt must not kill its own cleanup
        Cmd::from_argv(delete_argv(namespace, resource, wait))
            .map_err(|e| KubeError::command("delete", resource.qualified(), e))?
            .debug(self.debug)
            .run()
            .await
            .map(drop)
            .map_err(|e| KubeError::command("delete", resource.qualified(), e))
    }

    async fn wait_ready(
        &self,
        namespace: &str,
        resource: &ResourceRef,
        timeout: &str,
    ) -> Result<(), KubeError> {
        self.run(
            "wait",
            resource.qualified(),
            vec![
                "kubectl".into(),
                "wait".into(),
                "--for=condition=Ready".into(),
                resource.qualified().into(),
                format!("--timeout={timeout}"),
                "-n".into(),
                namespace.into(),
            ],
        )
        .await
        .map(drop)
    }

    async fn copy_to(
        &self,
        namespace: &str,
        resource: &ResourceRef,
        container: Option<&str>,
        local: &str,
        remote: &str,
    ) -> Result<(), KubeError> {
        let mut argv = vec![
            "kubectl".into(),
            "-n".into(),
            namespace.into(),
            "cp".into(),
            local.into(),
            format!("{}:{}", resource.name(), remote),
        ];
        if let Some(container) = container {
            argv.push("-c".into());
            argv.push(container.into());
        }
        self.run("cp", resource.qualified(), argv).await.map(drop)
    }

    async fn exec(
        &self,
        namespace: &str,
        resource: &ResourceRef,
        command: &str,
    ) -> Result<(), KubeError> {
        self.run(
            "exec",
            resource.qualified(),
            exec_argv(namespace, resource, command),
        )
        .await
        .map(drop)
    }

    async fn pod_ip(&self, namespace: &str, resource: &ResourceRef) -> Result<String, KubeError> {
        let out = self
            .run("get", resource.qualified(), get_argv(namespace, resource))
            .await?;
        parse_pod_ip(&out)
    }

    async fn port_forward(
        &self,
        namespace: &str,
        resource: &ResourceRef,
        local_port: u16,
        remote_port: u16,
    ) -> Result<ExecHandle, KubeError> {
        self.cmd(vec![
            "kubectl".to_string(),
            "-n".into(),
            namespace.into(),
            "port-forward".into(),
            resource.qualified().into(),
            format!("{local_port}:{remote_port}"),
        ])
        .and_then(|cmd| cmd.spawn())
        .map_err(|e| KubeError::command("port-forward", resource.qualified(), e))
    }
}

fn delete_argv(namespace: &str, resource: &ResourceRef, wait: bool) -> Vec<String> {
    vec![
        "kubectl".into(),
        "-n".into(),
        namespace.into(),
        "delete".into(),
        resource.qualified().into(),
        format!("--wait={wait}"),
    ]
}

fn exec_argv(namespace: &str, resource: &ResourceRef, command: &str) -> Vec<String> {
    vec![
        "kubectl".into(),
        "-n".into(),
        namespace.into(),
        "exec".into(),
        resource.qualified().into(),
        "--".into(),
        "sh".into(),
        "-c".into(),
        command.into(),
    ]
}

fn get_argv(namespace: &str, resource: &ResourceRef) -> Vec<String> {
    vec![
        "kubectl".into(),
        "-n".into(),
        namespace.into(),
        "get".into(),
        resource.qualified().into(),
        "-o".into(),
        "json".into(),
    ]
}

#[derive(Debug, Deserialize)]
struct PodDocument {
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(rename = "podIP")]
    pod_ip: Option<String>,
}

/// Pull the assigned pod IP out of a `kubectl get -o json` document.
fn parse_pod_ip(json: &str) -> Result<String, KubeError> {
    let doc: PodDocument = serde_json::from_str(json)?;
    doc.status.pod_ip.ok_or(KubeError::Parse {
        verb: "get",
        detail: "no podIP assigned yet".into(),
    })
}
