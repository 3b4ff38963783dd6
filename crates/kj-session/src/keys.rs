//! Ephemeral keypair lifecycle
//!
//! One keypair per session, referenced by path only and removed best-effort
//! on teardown. Generation is skipped when both halves already exist from a
//! prior run in the same directory.

use std::path::{Path, PathBuf};

use kj_exec::ExecError;

use crate::ssh::SshClient;

const PRIVATE_KEY_FILE: &str = "id_rsa";
const PUBLIC_KEY_FILE: &str = "id_rsa.pub";

/// Paths of the session keypair on local disk.
#[derive(Debug, Clone)]
pub struct Keypair {
    pub private: PathBuf,
    pub public: PathBuf,
}

impl Keypair {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            private: dir.join(PRIVATE_KEY_FILE),
            public: dir.join(PUBLIC_KEY_FILE),
        }
    }

    /// Whether both halves are present on disk.
    pub fn exists(&self) -> bool {
        self.private.exists() && self.public.exists()
    }

    /// Make sure the keypair exists, generating it if needed.
    ///
    /// Returns `true` when a new pair was generated, `false` when an
    /// existing pair was reused unmodified. A lone orphaned half is removed
    /// before regeneration so `ssh-keygen` never prompts about overwriting.
    pub async fn ensure(&self, ssh: &dyn SshClient) -> Result<bool, ExecError> {
        if self.exists() {
            return Ok(false);
        }
        remove_quiet(&self.private);
        remove_quiet(&self.public);
        ssh.generate_keypair(&self.private).await?;
        Ok(true)
    }

    /// Best-effort removal of both halves. Failures are logged, never
    /// escalated; a missing file is not a failure.
    pub fn remove(&self) {
        for path in [&self.private, &self.public] {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!("removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("failed to remove {}: {e}", path.display()),
            }
        }
    }
}

fn remove_quiet(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("failed to remove stale {}: {e}", path.display());
        }
    }
}
