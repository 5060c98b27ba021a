//! The backend capability contract and platform selection.

#[cfg(target_os = "linux")]
pub mod handle;
pub mod ipfw;
#[cfg(target_os = "linux")]
pub mod nftables;
pub mod noop;

use serde::Serialize;

use crate::error::Result;
use crate::types::config::Config;
use crate::types::rule::Rule;

/// Read surface for an external status reporter: which backend is active,
/// how many rules this instance currently has installed, and the container
/// identifiers where the backend has any.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub backend: &'static str,
    pub rules: usize,
    pub table: Option<String>,
    pub chain: Option<String>,
}

/// The uniform lifecycle contract every backend implements.
///
/// Expected call order: `setup` once, `add_rule` any number of times,
/// `remove_all`, then `close`. Cleanup scope is exactly "everything this
/// instance added"; rules are never shared between instances. Operations
/// serialize against one per-instance lock, so they never interleave. Bound
/// any call with [`tokio::time::timeout`] for a deadline; a timed-out call
/// records no bookkeeping, but a rule that already committed stays installed.
#[async_trait::async_trait]
pub trait Firewall: Send + Sync {
    /// Idempotently prepares the durable container the backend needs:
    /// table and chain, or kernel modules.
    async fn setup(&self) -> Result<()>;

    /// Validates the rule, encodes it into backend-native form, commits it,
    /// and records the bookkeeping needed to reverse it. On success, matching
    /// packets are delivered to the rule's queue until `remove_all` runs.
    async fn add_rule(&self, rule: &Rule) -> Result<()>;

    /// Reverses every rule this instance installed, attempting all of them
    /// even when some deletions fail and aggregating the failures. "Already
    /// gone" is success. Bookkeeping is cleared unconditionally, so a second
    /// call is a no-op.
    async fn remove_all(&self) -> Result<()>;

    /// Snapshot for status reporting.
    async fn status(&self) -> Status;

    /// Releases any held connection handle. Does not remove rules; call
    /// `remove_all` first.
    async fn close(&self) -> Result<()>;
}

/// Constructs the driver for the requested backend on this platform.
///
/// Linux serves the table/chain backend, FreeBSD the numbered-list backend;
/// asking for a backend the platform has no driver for is an error. On every
/// other platform diversion is handled out of band and the no-op driver is
/// returned regardless of the requested name.
pub fn new_firewall(config: Config) -> Result<Box<dyn Firewall>> {
    #[cfg(target_os = "linux")]
    {
        use crate::error::Error;
        use crate::types::config::Backend;

        match config.backend {
            Backend::Nftables => Ok(Box::new(nftables::NftablesFirewall::new(config)?)),
            other => Err(Error::UnknownBackend(other.to_string())),
        }
    }

    #[cfg(target_os = "freebsd")]
    {
        use crate::error::Error;
        use crate::types::config::Backend;

        match config.backend {
            Backend::Ipfw => Ok(Box::new(ipfw::IpfwFirewall::new(config))),
            other => Err(Error::UnknownBackend(other.to_string())),
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
    {
        let _ = config;
        Ok(Box::new(noop::NoopFirewall))
    }
}
