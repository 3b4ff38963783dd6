//! SSH binary seam
//!
//! The orchestrator talks to `ssh`/`ssh-keygen` through this trait so tests
//! can substitute a recorder that never touches real binaries.

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use kj_exec::{Cmd, ExecError};

/// Abstraction over the local SSH tooling.
#[async_trait]
pub trait SshClient: Send + Sync {
    /// Generate an RSA keypair at `private` / `private.pub`, no passphrase.
    async fn generate_keypair(&self, private: &Path) -> Result<(), ExecError>;

    /// Run the final interactive session with the operator's terminal
    /// attached. `argv` starts with the `ssh` program itself.
    async fn proxied_session(&self, argv: Vec<String>) -> Result<(), ExecError>;
}

/// Production implementation shelling out to `ssh-keygen` and `ssh`.
#[derive(Debug, Clone)]
pub struct OpenSsh {
    debug: bool,
    cancel: CancellationToken,
}

impl OpenSsh {
    pub fn new(debug: bool, cancel: CancellationToken) -> Self {
        Self { debug, cancel }
    }
}

#[async_trait]
impl SshClient for OpenSsh {
    async fn generate_keypair(&self, private: &Path) -> Result<(), ExecError> {
        Cmd::from_argv([
            "ssh-keygen".to_string(),
            "-t".into(),
            "rsa".into(),
            "-N".into(),
            String::new(),
            "-f".into(),
            private.display().to_string(),
        ])?
        .debug(self.debug)
        .cancel(self.cancel.clone())
        .run()
        .await
        .map(drop)
    }

    async fn proxied_session(&self, argv: Vec<String>) -> Result<(), ExecError> {
        Cmd::from_argv(argv)?
            .debug(self.debug)
            .cancel(self.cancel.clone())
            .run_interactive()
            .await
    }
}
