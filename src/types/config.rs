use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which backend driver to construct. Platforms without the requested driver
/// reject the selection up front; platforms where diversion happens outside
/// the firewall layer ignore it and use the no-op driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Nftables,
    Ipfw,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nftables => "nftables",
            Self::Ipfw => "ipfw",
        }
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nftables" => Ok(Self::Nftables),
            "ipfw" => Ok(Self::Ipfw),
            _ => Err(Error::UnknownBackend(s.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend selection and naming. `table_name` and `chain_name` identify the
/// durable container created by the table/chain backend and are meaningless
/// to the others; `interface` is a global interface hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    pub table_name: String,
    pub chain_name: String,
    pub interface: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            table_name: "divertq".to_string(),
            chain_name: "output".to_string(),
            interface: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("nftables".parse::<Backend>().unwrap(), Backend::Nftables);
        assert_eq!("ipfw".parse::<Backend>().unwrap(), Backend::Ipfw);
        assert!(matches!("pf".parse::<Backend>(), Err(Error::UnknownBackend(_))));
    }

    #[test]
    fn test_default_names() {
        let cfg = Config::default();
        assert_eq!(cfg.table_name, "divertq");
        assert_eq!(cfg.chain_name, "output");
        assert!(cfg.interface.is_empty());
    }
}
