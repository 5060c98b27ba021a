//! Cross-platform packet-diversion rule manager.
//!
//! Given a description of which traffic to intercept (protocol, destination
//! ports, interface), `divertq` installs kernel-level firewall rules that
//! redirect matching packets into a numbered userspace processing queue, and
//! guarantees that everything it installed can be torn down deterministically,
//! even after partial failure.
//!
//! One capability contract ([`Firewall`]: setup, add_rule, remove_all, close)
//! is implemented by three backend families:
//!
//! - [`handle::nftables`]: a transactional table/chain driver speaking the
//!   nfnetlink wire protocol directly (Linux),
//! - [`handle::ipfw`]: a sequential numbered-rule-list driver shelling out to
//!   the `ipfw` executable (FreeBSD),
//! - [`handle::noop`]: no-op stubs for platforms where diversion happens below
//!   the firewall layer (macOS, Windows).
//!
//! Operations are async; bound them with [`tokio::time::timeout`] to get a
//! cancellable deadline. A rule that already committed is never rolled back by
//! cancellation, but a cancelled call records no bookkeeping.

pub mod core;
pub mod error;
pub mod handle;
pub mod types;

pub use error::{Error, Result};
pub use handle::{new_firewall, Firewall, Status};
pub use types::config::{Backend, Config};
pub use types::rule::{PortSpec, Protocol, Rule, RuleBuilder};
