//! Execution error types

use thiserror::Error;

/// Errors that can occur while building or running a command
#[derive(Error, Debug)]
pub enum ExecError {
    /// Command template contained an opening quote with no closing quote
    #[error("unbalanced double quote in command: {input}")]
    UnbalancedQuote { input: String },

    /// Command template tokenized to nothing
    #[error("empty command")]
    EmptyCommand,

    /// The child process could not be started at all
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The child ran but exited non-zero; captured output is preserved
    #[error("{program} exited with {status}: {output}")]
    Failed {
        program: String,
        status: String,
        output: String,
    },

    /// The bound cancellation token fired; output captured so far is preserved
    #[error("{program} cancelled: {output}")]
    Cancelled { program: String, output: String },

    /// I/O error while talking to the child
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    /// Captured combined output attached to this error, if any.
    pub fn output(&self) -> &str {
        match self {
            ExecError::Failed { output, .. } | ExecError::Cancelled { output, .. } => output,
            _ => "",
        }
    }
}
