//! Command builder and process supervision
//!
//! `Cmd` wraps `tokio::process::Command` with the conventions every kjump
//! subprocess call shares: combined stdout/stderr capture, optional
//! mirroring of output to the tracing debug sink, environment injection
//! over the inherited environment, shell wrapping, and cooperative
//! cancellation through a `CancellationToken`.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ExecError;
use crate::tokenize::tokenize;

/// Builder for a single external process invocation.
#[derive(Debug, Clone)]
pub struct Cmd {
    argv: Vec<String>,
    env: HashMap<String, String>,
    use_shell: bool,
    debug: bool,
    cancel: Option<CancellationToken>,
}

impl Cmd {
    /// Build from a command template string (quote-aware, see [`tokenize`]).
    pub fn new(template: &str) -> Result<Self, ExecError> {
        let argv = tokenize(template)?;
        if argv.is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        Ok(Self {
            argv,
            env: HashMap::new(),
            use_shell: false,
            debug: false,
            cancel: None,
        })
    }

    /// Build from an already-structured argument vector.
    pub fn from_argv<I, S>(argv: I) -> Result<Self, ExecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        if argv.is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        Ok(Self {
            argv,
            env: HashMap::new(),
            use_shell: false,
            debug: false,
            cancel: None,
        })
    }

    /// Append a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an extra environment variable, merged over the inherited environment.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Merge a map of extra environment variables.
    #[must_use]
    pub fn envs(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    /// Wrap the command in `sh -c`.
    #[must_use]
    pub fn shell(mut self) -> Self {
        self.use_shell = true;
        self
    }

    /// Mirror the command line and each output line to the debug sink.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Bind the process lifetime to a cancellation token; when the token
    /// fires the child is killed and the call returns `ExecError::Cancelled`
    /// carrying whatever output was captured up to that point.
    #[must_use]
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn program(&self) -> String {
        self.argv[0].clone()
    }

    fn command(&self) -> Command {
        let mut cmd = if self.use_shell {
            let mut c = Command::new("sh");
            c.arg("-c").arg(shell_join(&self.argv));
            c
        } else {
            let mut c = Command::new(&self.argv[0]);
            c.args(&self.argv[1..]);
            c
        };
        cmd.envs(&self.env);
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run to completion, capturing stdout and stderr into one combined
    /// buffer. Non-zero exit is an error carrying the combined output.
    pub async fn run(self) -> Result<String, ExecError> {
        let program = self.program();
        tracing::debug!("executing {:?}", self.argv);

        let mut cmd = self.command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

        let buffer = Arc::new(Mutex::new(String::new()));
        let out = drain(child.stdout.take(), Arc::clone(&buffer), self.debug);
        let err = drain(child.stderr.take(), Arc::clone(&buffer), self.debug);

        let status = match &self.cancel {
            Some(token) => {
                tokio::select! {
                    status = child.wait() => status?,
                    _ = token.cancelled() => {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        let _ = tokio::join!(out, err);
                        let output = take_buffer(&buffer);
                        return Err(ExecError::Cancelled { program, output });
                    }
                }
            }
            None => child.wait().await?,
        };

        let _ = tokio::join!(out, err);
        let output = take_buffer(&buffer);
        if status.success() {
            Ok(output)
        } else {
            Err(ExecError::Failed {
                program,
                status: status.to_string(),
                output,
            })
        }
    }

    /// Start the process and hand back a live [`ExecHandle`] for supervisors
    /// of long-running children. Output keeps draining to the capture buffer
    /// (and debug sink) in the background.
    pub fn spawn(self) -> Result<ExecHandle, ExecError> {
        let program = self.program();
        tracing::debug!("spawning {:?}", self.argv);

        let mut cmd = self.command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

        let buffer = Arc::new(Mutex::new(String::new()));
        drain(child.stdout.take(), Arc::clone(&buffer), self.debug);
        drain(child.stderr.take(), Arc::clone(&buffer), self.debug);

        Ok(ExecHandle {
            program,
            child,
            buffer,
        })
    }

    /// Run with the operator's stdin/stdout/stderr attached directly.
    /// Nothing is captured; used for the final interactive session.
    pub async fn run_interactive(self) -> Result<(), ExecError> {
        let program = self.program();
        tracing::debug!("executing (interactive) {:?}", self.argv);

        let mut cmd = self.command();
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

        let status = match &self.cancel {
            Some(token) => {
                tokio::select! {
                    status = child.wait() => status?,
                    _ = token.cancelled() => {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        return Err(ExecError::Cancelled {
                            program,
                            output: String::new(),
                        });
                    }
                }
            }
            None => child.wait().await?,
        };

        if status.success() {
            Ok(())
        } else {
            Err(ExecError::Failed {
                program,
                status: status.to_string(),
                output: String::new(),
            })
        }
    }
}

/// A started, possibly still-running child process.
pub struct ExecHandle {
    program: String,
    child: Child,
    buffer: Arc<Mutex<String>>,
}

impl ExecHandle {
    /// Kill the child. Safe to call on a process that already exited
    /// (treated as a no-op) and safe to call more than once.
    pub async fn kill(&mut self) {
        if let Ok(Some(status)) = self.child.try_wait() {
            tracing::debug!("{} already exited with {}", self.program, status);
            return;
        }
        if self.child.start_kill().is_ok() {
            let _ = self.child.wait().await;
        }
        tracing::debug!("killed {}", self.program);
    }

    /// Whether the child is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Snapshot of the combined output captured so far.
    pub fn output(&self) -> String {
        self.buffer.lock().expect("output buffer poisoned").clone()
    }

    /// Program name this handle supervises.
    pub fn program(&self) -> &str {
        &self.program
    }
}

fn drain(
    pipe: Option<impl AsyncRead + Unpin + Send + 'static>,
    buffer: Arc<Mutex<String>>,
    debug: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(pipe) = pipe else { return };
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if debug {
                tracing::debug!("{line}");
            }
            let mut buf = buffer.lock().expect("output buffer poisoned");
            buf.push_str(&line);
            buf.push('\n');
        }
    })
}

fn take_buffer(buffer: &Arc<Mutex<String>>) -> String {
    buffer.lock().expect("output buffer poisoned").clone()
}

/// Re-join argv for `sh -c`. Tokens with embedded whitespace (produced by
/// quoted spans) are single-quoted so the shell keeps them as one word;
/// everything else passes through untouched so shell operators still work.
fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|token| {
            if token.is_empty() || token.chars().any(char::is_whitespace) {
                format!("'{}'", token.replace('\'', r"'\''"))
            } else {
                token.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
