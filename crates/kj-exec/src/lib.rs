//! kj-exec: subprocess execution engine for kjump
//!
//! Everything kjump does happens through an external binary (`kubectl`,
//! `ssh`, `ssh-keygen`). This crate provides the one abstraction all of
//! those calls go through: quote-aware command tokenization, combined
//! output capture, cancellation, environment injection, and handles for
//! long-running children.

pub mod command;
pub mod error;
pub mod tokenize;

pub use command::{Cmd, ExecHandle};
pub use error::ExecError;
pub use tokenize::tokenize;
