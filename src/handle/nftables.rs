//! Transactional table/chain driver speaking the nftables netlink protocol.
//!
//! `setup` creates one address-family-agnostic (`inet`) table with an
//! output-hook filter chain in a single transaction; every `add_rule` commits
//! one rule atomically; `remove_all` deletes the whole table, which cascades
//! to the chain and every rule in one step.

use tokio::sync::Mutex;

use crate::core::message::{genmsg, Batch, Message, NFNL_SUBSYS_NFTABLES};
use crate::error::{Error, Result};
use crate::handle::handle::SocketHandle;
use crate::handle::{Firewall, Status};
use crate::types::config::Config;
use crate::types::expr::encode_match;
use crate::types::message::{Attribute, NfAttr};
use crate::types::rule::Rule;

// enum nf_tables_msg_types
const NFT_MSG_NEWTABLE: u16 = 0;
const NFT_MSG_DELTABLE: u16 = 2;
const NFT_MSG_NEWCHAIN: u16 = 3;
const NFT_MSG_NEWRULE: u16 = 6;

// enum nft_table_attributes
const NFTA_TABLE_NAME: u16 = 1;

// enum nft_chain_attributes
const NFTA_CHAIN_TABLE: u16 = 1;
const NFTA_CHAIN_NAME: u16 = 3;
const NFTA_CHAIN_HOOK: u16 = 4;
const NFTA_CHAIN_TYPE: u16 = 7;

// enum nft_hook_attributes
const NFTA_HOOK_HOOKNUM: u16 = 1;
const NFTA_HOOK_PRIORITY: u16 = 2;

// enum nft_rule_attributes
const NFTA_RULE_TABLE: u16 = 1;
const NFTA_RULE_CHAIN: u16 = 2;
const NFTA_RULE_EXPRESSIONS: u16 = 4;

const NFPROTO_INET: u8 = 1;
const NF_INET_LOCAL_OUT: u32 = 3;
const CHAIN_PRIORITY_FILTER: i32 = 0;

const fn nft_msg_type(msg: u16) -> u16 {
    ((NFNL_SUBSYS_NFTABLES as u16) << 8) | msg
}

struct State {
    socket: Option<SocketHandle>,
    ready: bool,
    rules: Vec<Rule>,
}

pub struct NftablesFirewall {
    config: Config,
    state: Mutex<State>,
}

impl NftablesFirewall {
    pub fn new(config: Config) -> Result<Self> {
        let socket = SocketHandle::new(libc::NETLINK_NETFILTER)?;

        Ok(Self {
            config,
            state: Mutex::new(State { socket: Some(socket), ready: false, rules: Vec::new() }),
        })
    }

    fn table_msg(&self, msg: u16, flags: i32) -> Message {
        let mut m = Message::new(nft_msg_type(msg), flags);
        m.add(&genmsg(NFPROTO_INET, 0));
        m.add(&NfAttr::string(NFTA_TABLE_NAME, &self.config.table_name).serialize());
        m
    }

    fn chain_msg(&self) -> Message {
        let hook = NfAttr::nested(
            NFTA_CHAIN_HOOK,
            &[
                NfAttr::be32(NFTA_HOOK_HOOKNUM, NF_INET_LOCAL_OUT),
                NfAttr::be32(NFTA_HOOK_PRIORITY, CHAIN_PRIORITY_FILTER as u32),
            ],
        );

        let mut m = Message::new(
            nft_msg_type(NFT_MSG_NEWCHAIN),
            libc::NLM_F_CREATE | libc::NLM_F_ACK,
        );
        m.add(&genmsg(NFPROTO_INET, 0));
        m.add(&NfAttr::string(NFTA_CHAIN_TABLE, &self.config.table_name).serialize());
        m.add(&NfAttr::string(NFTA_CHAIN_NAME, &self.config.chain_name).serialize());
        m.add(&hook.serialize());
        m.add(&NfAttr::string(NFTA_CHAIN_TYPE, "filter").serialize());
        m
    }

    fn rule_msg(&self, rule: &Rule) -> Result<Message> {
        let exprs = encode_match(rule)?;
        let elems: Vec<NfAttr> = exprs.iter().map(|e| e.as_list_elem()).collect();

        let mut m = Message::new(
            nft_msg_type(NFT_MSG_NEWRULE),
            libc::NLM_F_CREATE | libc::NLM_F_APPEND | libc::NLM_F_ACK,
        );
        m.add(&genmsg(NFPROTO_INET, 0));
        m.add(&NfAttr::string(NFTA_RULE_TABLE, &self.config.table_name).serialize());
        m.add(&NfAttr::string(NFTA_RULE_CHAIN, &self.config.chain_name).serialize());
        m.add(&NfAttr::nested(NFTA_RULE_EXPRESSIONS, &elems).serialize());
        Ok(m)
    }
}

#[async_trait::async_trait]
impl Firewall for NftablesFirewall {
    async fn setup(&self) -> Result<()> {
        let mut st = self.state.lock().await;

        let mut batch = Batch::new();
        batch.push(self.table_msg(NFT_MSG_NEWTABLE, libc::NLM_F_CREATE | libc::NLM_F_ACK));
        batch.push(self.chain_msg());

        let socket = st.socket.as_mut().ok_or(Error::NotSetup)?;
        socket.commit(&batch, false)?;
        st.ready = true;

        tracing::debug!(
            table = %self.config.table_name,
            chain = %self.config.chain_name,
            "created diversion table and chain"
        );

        Ok(())
    }

    async fn add_rule(&self, rule: &Rule) -> Result<()> {
        let mut st = self.state.lock().await;

        if !st.ready {
            return Err(Error::NotSetup);
        }

        // Validation and encoding happen before any kernel traffic.
        let msg = self.rule_msg(rule)?;

        let mut batch = Batch::new();
        batch.push(msg);

        let socket = st.socket.as_mut().ok_or(Error::NotSetup)?;
        socket.commit(&batch, false)?;
        st.rules.push(rule.clone());

        tracing::debug!(
            protocol = %rule.protocol,
            ports = ?rule.ports,
            queue = rule.queue_num,
            "installed diversion rule"
        );

        Ok(())
    }

    async fn remove_all(&self) -> Result<()> {
        let mut st = self.state.lock().await;

        if !st.ready {
            return Ok(());
        }

        let mut batch = Batch::new();
        batch.push(self.table_msg(NFT_MSG_DELTABLE, libc::NLM_F_ACK));

        // Deleting the table cascades to the chain and every rule. ENOENT
        // means cleanup already happened.
        let res = match st.socket.as_mut() {
            Some(socket) => socket.commit(&batch, true),
            None => Ok(()),
        };

        // Bookkeeping is cleared even on failure so repeated calls are
        // idempotent no-ops.
        st.rules.clear();
        st.ready = false;

        res
    }

    async fn status(&self) -> Status {
        let st = self.state.lock().await;

        Status {
            backend: "nftables",
            rules: st.rules.len(),
            table: Some(self.config.table_name.clone()),
            chain: Some(self.config.chain_name.clone()),
        }
    }

    async fn close(&self) -> Result<()> {
        let mut st = self.state.lock().await;
        st.socket = None;
        Ok(())
    }
}
