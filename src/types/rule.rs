use std::fmt;
use std::str::FromStr;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Transport protocol a diversion rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }

    /// The IP protocol number carried in the L4 header.
    pub fn number(&self) -> u8 {
        match self {
            Self::Tcp => libc::IPPROTO_TCP as u8,
            Self::Udp => libc::IPPROTO_UDP as u8,
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            _ => Err(Error::UnknownProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed port specifier: a single destination port or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSpec {
    Single(u16),
    Range(u16, u16),
}

impl FromStr for PortSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidPort(s.to_string());

        match s.split_once('-') {
            Some((start, end)) => {
                let start: u16 = start.parse().map_err(|_| invalid())?;
                let end: u16 = end.parse().map_err(|_| invalid())?;
                if end < start {
                    return Err(invalid());
                }
                Ok(Self::Range(start, end))
            }
            None => Ok(Self::Single(s.parse().map_err(|_| invalid())?)),
        }
    }
}

/// One diversion intent: redirect matching outbound traffic into the
/// processing queue identified by `queue_num`.
///
/// A rule is immutable once handed to a driver; the driver may reject it but
/// never mutates it.
#[derive(Builder, Debug, Clone, Default, Serialize, Deserialize)]
#[builder(setter(into), default)]
pub struct Rule {
    pub protocol: Protocol,

    /// Port specifiers: single ports (`"443"`) or inclusive ranges
    /// (`"50000-50100"`). Must be non-empty.
    pub ports: Vec<String>,

    /// Destination diversion queue number; the queue consumer is external.
    pub queue_num: u16,

    /// Network interface name, empty for all interfaces.
    pub interface: String,

    /// Free-text annotation, not interpreted here.
    pub comment: String,
}

impl Rule {
    /// Checks the rule before any kernel mutation: a known protocol is
    /// guaranteed by the type, ports must be non-empty and each specifier
    /// must parse.
    pub fn validate(&self) -> Result<()> {
        self.port_specs().map(|_| ())
    }

    pub fn port_specs(&self) -> Result<Vec<PortSpec>> {
        if self.ports.is_empty() {
            return Err(Error::EmptyPorts);
        }
        self.ports.iter().map(|p| p.parse()).collect()
    }
}
