use std::io;

/// Errors surfaced by the diversion rule manager.
///
/// Validation variants are returned before any kernel mutation; commit
/// variants carry the underlying kernel or CLI diagnostic; [`Error::Cleanup`]
/// aggregates every failed deletion instead of stopping at the first.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown firewall backend: {0}")]
    UnknownBackend(String),

    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("invalid port specifier: {0}")]
    InvalidPort(String),

    #[error("rule has no ports")]
    EmptyPorts,

    #[error("firewall not set up, call setup first")]
    NotSetup,

    #[error("netlink commit rejected: {0}")]
    Commit(#[source] io::Error),

    #[error("command `{command}` exited with {status}: {output}")]
    Command { command: String, status: std::process::ExitStatus, output: String },

    #[error("cleanup errors: {}", .0.join("; "))]
    Cleanup(Vec<String>),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
