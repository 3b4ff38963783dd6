//! kj-session: the jump session orchestrator
//!
//! Drives the end-to-end workflow: provision the jump pod, wait for
//! readiness, start and probe the local port relay, provision the ephemeral
//! keypair, render the SSH client configuration, open the proxied
//! interactive session, and tear everything down exactly once no matter how
//! the session ended.

pub mod keys;
pub mod manifest;
pub mod relay;
pub mod session;
pub mod settings;
pub mod ssh;
pub mod sshconfig;

pub use keys::Keypair;
pub use session::{Session, SessionOptions, Stage};
pub use settings::Settings;
pub use ssh::{OpenSsh, SshClient};
