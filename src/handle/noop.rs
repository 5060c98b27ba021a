//! No-op driver for platforms where diversion happens below the firewall
//! layer (a capture driver on Windows, the system extension path on macOS).
//! Exists so callers hold one contract regardless of platform.

use crate::error::Result;
use crate::handle::{Firewall, Status};
use crate::types::rule::Rule;

#[derive(Debug, Default)]
pub struct NoopFirewall;

#[async_trait::async_trait]
impl Firewall for NoopFirewall {
    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    async fn add_rule(&self, _rule: &Rule) -> Result<()> {
        Ok(())
    }

    async fn remove_all(&self) -> Result<()> {
        Ok(())
    }

    async fn status(&self) -> Status {
        Status { backend: "noop", rules: 0, table: None, chain: None }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::rule::RuleBuilder;

    #[tokio::test]
    async fn test_every_operation_succeeds() {
        let fw = NoopFirewall;
        let rule = RuleBuilder::default().queue_num(1u16).build().unwrap();

        fw.setup().await.unwrap();
        fw.add_rule(&rule).await.unwrap();
        fw.remove_all().await.unwrap();
        fw.close().await.unwrap();

        assert_eq!(fw.status().await.rules, 0);
        assert_eq!(fw.status().await.backend, "noop");
    }
}
