//! kjump CLI
//!
//! Provisions a disposable jump pod in the current cluster, forwards its SSH
//! port to the local machine, injects a fresh session key, and opens a
//! proxied interactive SSH session to the requested target host. Everything
//! the session created is torn down on exit, including on interrupt.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kj_kube::Kubectl;
use kj_session::{OpenSsh, Session, SessionOptions, Settings};

#[derive(Parser)]
#[command(name = "kjump")]
#[command(author, version)]
#[command(about = "SSH into unreachable hosts through a disposable in-cluster jump pod")]
struct Cli {
    /// Identity file for the target host
    #[arg(short, long)]
    identity: Option<PathBuf>,

    /// Username on the target host
    #[arg(short = 'l', long, default_value = "root")]
    login_user: String,

    /// SSH port on the target host
    #[arg(short = 'p', long, default_value_t = 22)]
    port: u16,

    /// Mirror subprocess command lines and output
    #[arg(short, long)]
    debug: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,

    /// Namespace for the jump pod (overrides the settings file)
    #[arg(short, long)]
    namespace: Option<String>,

    /// Local port the relay binds (overrides the settings file)
    #[arg(long)]
    local_port: Option<u16>,

    /// Path to a settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target host to reach through the jump pod
    host: String,

    /// Remaining arguments are passed to ssh verbatim
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    ssh_args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.debug) {
        (true, _) => "error",
        (false, true) => "debug",
        (false, false) => "info",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(namespace) = cli.namespace {
        settings.namespace = namespace;
    }
    if let Some(local_port) = cli.local_port {
        settings.local_port = local_port;
    }

    let mut opts = SessionOptions::new(cli.host);
    opts.ssh_args = cli.ssh_args;
    opts.login_user = cli.login_user;
    opts.target_port = cli.port;
    opts.identity = cli.identity;
    opts.debug = cli.debug;
    opts.settings = settings;

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    let client = Kubectl::new(&opts.session_dir)
        .debug(cli.debug)
        .cancel(cancel.clone());
    let ssh = Arc::new(OpenSsh::new(cli.debug, cancel.clone()));

    Session::new(Arc::new(client), ssh, opts, cancel).run().await
}

/// First interrupt trips the shared token so the session unwinds into its
/// own teardown; a second one force-quits.
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("interrupt received, cleaning up (interrupt again to force quit)");
        cancel.cancel();
        wait_for_signal().await;
        tracing::warn!("second interrupt, exiting immediately");
        std::process::exit(130);
    });
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
