//! Sequential numbered-rule-list driver shelling out to `ipfw`.
//!
//! Each accepted rule gets a strictly increasing, caller-invisible rule
//! number used for later deletion. Command construction is pure and
//! unit-testable on every platform; execution requires the FreeBSD `ipfw`
//! executable and the `ipfw`/`ipdivert` kernel modules.

use tokio::process::Command;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::handle::{Firewall, Status};
use crate::types::config::Config;
use crate::types::rule::Rule;

/// First rule number handed out by a fresh driver instance.
const FIRST_RULE_NUM: u32 = 100;

const IPFW: &str = "ipfw";
const KLDLOAD: &str = "kldload";

struct State {
    rule_nums: Vec<u32>,
    next_rule: u32,
}

pub struct IpfwFirewall {
    config: Config,
    state: Mutex<State>,
}

impl IpfwFirewall {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: Mutex::new(State { rule_nums: Vec::new(), next_rule: FIRST_RULE_NUM }),
        }
    }

    /// `ipfw add <num> divert <queue> <proto> from any to any <ports> out not
    /// diverted not sockarg [xmit <iface>]`
    ///
    /// Unlike the table/chain driver this preserves every port specifier,
    /// comma-joined in `ipfw`'s list syntax.
    fn add_args(rule: &Rule, num: u32) -> Vec<String> {
        let mut args = vec![
            "add".to_string(),
            num.to_string(),
            "divert".to_string(),
            rule.queue_num.to_string(),
            rule.protocol.to_string(),
            "from".to_string(),
            "any".to_string(),
            "to".to_string(),
            "any".to_string(),
            rule.ports.join(","),
            "out".to_string(),
            "not".to_string(),
            "diverted".to_string(),
            "not".to_string(),
            "sockarg".to_string(),
        ];

        if !rule.interface.is_empty() {
            args.push("xmit".to_string());
            args.push(rule.interface.clone());
        }

        args
    }

    fn delete_args(num: u32) -> Vec<String> {
        vec!["delete".to_string(), num.to_string()]
    }
}

/// Runs `ipfw` with the given arguments, treating a non-zero exit as an error
/// carrying the combined output for diagnostics.
async fn run_ipfw(args: &[String]) -> Result<()> {
    tracing::debug!(?args, "running ipfw");

    let output = Command::new(IPFW).args(args).output().await?;
    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        return Err(Error::Command {
            command: format!("{} {}", IPFW, args.join(" ")),
            status: output.status,
            output: combined.trim().to_string(),
        });
    }

    Ok(())
}

#[async_trait::async_trait]
impl Firewall for IpfwFirewall {
    /// Best-effort load of the `ipfw` and `ipdivert` kernel modules; failure
    /// (typically "already loaded") is intentionally not surfaced.
    async fn setup(&self) -> Result<()> {
        let _st = self.state.lock().await;

        for module in ["ipfw", "ipdivert"] {
            match Command::new(KLDLOAD).arg(module).output().await {
                Ok(output) if !output.status.success() => {
                    tracing::debug!(module, status = ?output.status, "kldload skipped");
                }
                Err(e) => tracing::debug!(module, error = %e, "kldload unavailable"),
                Ok(_) => {}
            }
        }

        Ok(())
    }

    async fn add_rule(&self, rule: &Rule) -> Result<()> {
        rule.validate()?;

        let mut st = self.state.lock().await;

        let num = st.next_rule;
        run_ipfw(&Self::add_args(rule, num)).await?;

        // The counter only advances on success.
        st.rule_nums.push(num);
        st.next_rule = num + 1;

        Ok(())
    }

    async fn remove_all(&self) -> Result<()> {
        let mut st = self.state.lock().await;

        // Bookkeeping is taken up front so a second call is a no-op even if
        // some deletions fail now.
        let nums = std::mem::take(&mut st.rule_nums);
        let mut errs = Vec::new();

        for num in nums {
            if let Err(e) = run_ipfw(&Self::delete_args(num)).await {
                errs.push(format!("failed to delete rule {num}: {e}"));
            }
        }

        if !errs.is_empty() {
            return Err(Error::Cleanup(errs));
        }

        Ok(())
    }

    async fn status(&self) -> Status {
        let st = self.state.lock().await;

        Status { backend: "ipfw", rules: st.rule_nums.len(), table: None, chain: None }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
