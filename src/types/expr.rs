//! nftables match-expression encoder.
//!
//! Translates a [`Rule`] into the ordered expression list the table/chain
//! driver commits: optional interface match, L4 protocol match, destination
//! port match (network byte order), a counter, and the queue verdict with the
//! bypass flag. Expression attribute values are big-endian per the nftables
//! netlink conventions.

use crate::error::Result;
use crate::types::message::NfAttr;
use crate::types::rule::{PortSpec, Rule};

// enum nft_registers
const NFT_REG_1: u32 = 1;

// enum nft_meta_keys
const NFT_META_OIFNAME: u32 = 7;
const NFT_META_L4PROTO: u32 = 16;

// enum nft_meta_attributes
const NFTA_META_DREG: u16 = 1;
const NFTA_META_KEY: u16 = 2;

// enum nft_cmp_ops / nft_cmp_attributes
const NFT_CMP_EQ: u32 = 0;
const NFTA_CMP_SREG: u16 = 1;
const NFTA_CMP_OP: u16 = 2;
const NFTA_CMP_DATA: u16 = 3;

// enum nft_payload_bases / nft_payload_attributes
const NFT_PAYLOAD_TRANSPORT_HEADER: u32 = 2;
const NFTA_PAYLOAD_DREG: u16 = 1;
const NFTA_PAYLOAD_BASE: u16 = 2;
const NFTA_PAYLOAD_OFFSET: u16 = 3;
const NFTA_PAYLOAD_LEN: u16 = 4;

// enum nft_range_ops / nft_range_attributes
const NFT_RANGE_EQ: u32 = 0;
const NFTA_RANGE_SREG: u16 = 1;
const NFTA_RANGE_OP: u16 = 2;
const NFTA_RANGE_FROM_DATA: u16 = 3;
const NFTA_RANGE_TO_DATA: u16 = 4;

// enum nft_counter_attributes
const NFTA_COUNTER_BYTES: u16 = 1;
const NFTA_COUNTER_PACKETS: u16 = 2;

// enum nft_queue_attributes
const NFTA_QUEUE_NUM: u16 = 1;
const NFTA_QUEUE_TOTAL: u16 = 2;
const NFTA_QUEUE_FLAGS: u16 = 3;

/// Accept packets unmodified when no consumer reads the queue (fail-open).
pub const NFT_QUEUE_FLAG_BYPASS: u16 = 0x01;

// enum nft_expr_attributes, NFTA_LIST_ELEM
const NFTA_EXPR_NAME: u16 = 1;
const NFTA_EXPR_DATA: u16 = 2;
const NFTA_LIST_ELEM: u16 = 1;

const NFTA_DATA_VALUE: u16 = 1;

/// Destination port offset and width within the TCP/UDP header.
const DPORT_OFFSET: u32 = 2;
const DPORT_LEN: u32 = 2;

const IFNAMSIZ: usize = 16;

/// Pads or truncates an interface name to the kernel's fixed name buffer.
pub fn ifname(name: &str) -> [u8; IFNAMSIZ] {
    let mut buf = [0u8; IFNAMSIZ];
    let bytes = name.as_bytes();
    let n = bytes.len().min(IFNAMSIZ);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

/// One nftables expression: a kernel expression type name plus its attributes.
#[derive(Debug, Clone)]
pub struct Expr {
    name: &'static str,
    data: Vec<NfAttr>,
}

impl Expr {
    fn new(name: &'static str, data: Vec<NfAttr>) -> Self {
        Self { name, data }
    }

    /// Load a meta key into register 1.
    fn meta(key: u32) -> Self {
        Self::new(
            "meta",
            vec![NfAttr::be32(NFTA_META_KEY, key), NfAttr::be32(NFTA_META_DREG, NFT_REG_1)],
        )
    }

    /// Compare register 1 against an immediate value.
    fn cmp_eq(data: &[u8]) -> Self {
        Self::new(
            "cmp",
            vec![
                NfAttr::be32(NFTA_CMP_SREG, NFT_REG_1),
                NfAttr::be32(NFTA_CMP_OP, NFT_CMP_EQ),
                NfAttr::nested(NFTA_CMP_DATA, &[NfAttr::new(NFTA_DATA_VALUE, data)]),
            ],
        )
    }

    /// Load bytes from the transport header into register 1.
    fn payload_transport(offset: u32, len: u32) -> Self {
        Self::new(
            "payload",
            vec![
                NfAttr::be32(NFTA_PAYLOAD_DREG, NFT_REG_1),
                NfAttr::be32(NFTA_PAYLOAD_BASE, NFT_PAYLOAD_TRANSPORT_HEADER),
                NfAttr::be32(NFTA_PAYLOAD_OFFSET, offset),
                NfAttr::be32(NFTA_PAYLOAD_LEN, len),
            ],
        )
    }

    /// Inclusive range comparison of register 1.
    fn range_eq(from: &[u8], to: &[u8]) -> Self {
        Self::new(
            "range",
            vec![
                NfAttr::be32(NFTA_RANGE_SREG, NFT_REG_1),
                NfAttr::be32(NFTA_RANGE_OP, NFT_RANGE_EQ),
                NfAttr::nested(NFTA_RANGE_FROM_DATA, &[NfAttr::new(NFTA_DATA_VALUE, from)]),
                NfAttr::nested(NFTA_RANGE_TO_DATA, &[NfAttr::new(NFTA_DATA_VALUE, to)]),
            ],
        )
    }

    fn counter() -> Self {
        Self::new(
            "counter",
            vec![NfAttr::be64(NFTA_COUNTER_BYTES, 0), NfAttr::be64(NFTA_COUNTER_PACKETS, 0)],
        )
    }

    fn queue(num: u16, flags: u16) -> Self {
        Self::new(
            "queue",
            vec![
                NfAttr::be16(NFTA_QUEUE_NUM, num),
                NfAttr::be16(NFTA_QUEUE_TOTAL, 1),
                NfAttr::be16(NFTA_QUEUE_FLAGS, flags),
            ],
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn data(&self) -> &[NfAttr] {
        &self.data
    }

    /// Serializes into one `NFTA_LIST_ELEM` of a rule's expression list.
    pub fn as_list_elem(&self) -> NfAttr {
        NfAttr::nested(
            NFTA_LIST_ELEM,
            &[NfAttr::string(NFTA_EXPR_NAME, self.name), NfAttr::nested(NFTA_EXPR_DATA, &self.data)],
        )
    }
}

/// Encodes the match and verdict expressions for one rule, in the fixed order
/// the table/chain driver commits them.
///
/// When more than one port specifier is given, only the first is matched; the
/// numbered-list backend preserves the full list. Known policy limitation,
/// kept as documented behavior.
pub fn encode_match(rule: &Rule) -> Result<Vec<Expr>> {
    let specs = rule.port_specs()?;
    let mut exprs = Vec::new();

    if !rule.interface.is_empty() {
        exprs.push(Expr::meta(NFT_META_OIFNAME));
        exprs.push(Expr::cmp_eq(&ifname(&rule.interface)));
    }

    exprs.push(Expr::meta(NFT_META_L4PROTO));
    exprs.push(Expr::cmp_eq(&[rule.protocol.number()]));

    exprs.push(Expr::payload_transport(DPORT_OFFSET, DPORT_LEN));
    match specs[0] {
        PortSpec::Single(port) => exprs.push(Expr::cmp_eq(&port.to_be_bytes())),
        PortSpec::Range(start, end) => {
            exprs.push(Expr::range_eq(&start.to_be_bytes(), &end.to_be_bytes()))
        }
    }

    exprs.push(Expr::counter());
    exprs.push(Expr::queue(rule.queue_num, NFT_QUEUE_FLAG_BYPASS));

    Ok(exprs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::message::{Attribute, NLA_F_NESTED};
    use crate::types::rule::{Protocol, RuleBuilder};

    fn attr(expr: &Expr, kind: u16) -> &NfAttr {
        expr.data()
            .iter()
            .find(|a| a.kind() & !NLA_F_NESTED == kind)
            .expect("attribute missing")
    }

    fn rule(protocol: Protocol, ports: &[&str], queue: u16, iface: &str) -> crate::types::rule::Rule {
        RuleBuilder::default()
            .protocol(protocol)
            .ports(ports.iter().map(|p| p.to_string()).collect::<Vec<_>>())
            .queue_num(queue)
            .interface(iface)
            .build()
            .unwrap()
    }

    #[test]
    fn test_single_port_match() {
        let exprs = encode_match(&rule(Protocol::Tcp, &["443"], 200, "")).unwrap();
        let names: Vec<_> = exprs.iter().map(|e| e.name()).collect();
        assert_eq!(names, ["meta", "cmp", "payload", "cmp", "counter", "queue"]);

        // l4proto == tcp
        assert_eq!(attr(&exprs[0], NFTA_META_KEY).payload(), &NFT_META_L4PROTO.to_be_bytes());
        let proto = NfAttr::new(NFTA_DATA_VALUE, &[6]).serialize();
        assert_eq!(attr(&exprs[1], NFTA_CMP_DATA).payload(), proto.as_slice());

        // destination port at transport offset 2, length 2
        assert_eq!(attr(&exprs[2], NFTA_PAYLOAD_BASE).payload(), &[0, 0, 0, 2]);
        assert_eq!(attr(&exprs[2], NFTA_PAYLOAD_OFFSET).payload(), &[0, 0, 0, 2]);
        assert_eq!(attr(&exprs[2], NFTA_PAYLOAD_LEN).payload(), &[0, 0, 0, 2]);

        // compared in network byte order
        let port = NfAttr::new(NFTA_DATA_VALUE, &[0x01, 0xbb]).serialize();
        assert_eq!(attr(&exprs[3], NFTA_CMP_DATA).payload(), port.as_slice());

        // fail-open queue dispatch
        assert_eq!(attr(&exprs[5], NFTA_QUEUE_NUM).payload(), &200u16.to_be_bytes());
        assert_eq!(
            attr(&exprs[5], NFTA_QUEUE_FLAGS).payload(),
            &NFT_QUEUE_FLAG_BYPASS.to_be_bytes()
        );
    }

    #[test]
    fn test_port_range_match() {
        let exprs = encode_match(&rule(Protocol::Udp, &["50000-50100"], 5, "eth0")).unwrap();
        let names: Vec<_> = exprs.iter().map(|e| e.name()).collect();
        assert_eq!(names, ["meta", "cmp", "meta", "cmp", "payload", "range", "counter", "queue"]);

        // interface match comes first, padded to the fixed name buffer
        assert_eq!(attr(&exprs[0], NFTA_META_KEY).payload(), &NFT_META_OIFNAME.to_be_bytes());
        let iface = NfAttr::new(NFTA_DATA_VALUE, &ifname("eth0")).serialize();
        assert_eq!(attr(&exprs[1], NFTA_CMP_DATA).payload(), iface.as_slice());

        // udp protocol number
        let proto = NfAttr::new(NFTA_DATA_VALUE, &[17]).serialize();
        assert_eq!(attr(&exprs[3], NFTA_CMP_DATA).payload(), proto.as_slice());

        // inclusive big-endian bounds
        let from = NfAttr::new(NFTA_DATA_VALUE, &50000u16.to_be_bytes()).serialize();
        let to = NfAttr::new(NFTA_DATA_VALUE, &50100u16.to_be_bytes()).serialize();
        assert_eq!(attr(&exprs[5], NFTA_RANGE_FROM_DATA).payload(), from.as_slice());
        assert_eq!(attr(&exprs[5], NFTA_RANGE_TO_DATA).payload(), to.as_slice());
    }

    #[test]
    fn test_multiple_ports_match_first_only() {
        let exprs = encode_match(&rule(Protocol::Tcp, &["80", "443"], 1, "")).unwrap();
        let port = NfAttr::new(NFTA_DATA_VALUE, &80u16.to_be_bytes()).serialize();
        assert_eq!(attr(&exprs[3], NFTA_CMP_DATA).payload(), port.as_slice());
    }

    #[test]
    fn test_malformed_ports_rejected() {
        for bad in ["443-80", "http", "99999"] {
            assert!(matches!(
                encode_match(&rule(Protocol::Tcp, &[bad], 1, "")),
                Err(Error::InvalidPort(_))
            ));
        }
        assert!(matches!(
            encode_match(&rule(Protocol::Tcp, &[], 1, "")),
            Err(Error::EmptyPorts)
        ));
    }

    #[test]
    fn test_ifname_pads_and_truncates() {
        assert_eq!(&ifname("eth0")[..5], b"eth0\0");
        assert_eq!(ifname("a-very-long-interface-name").len(), 16);
    }

    #[test]
    fn test_list_elem_shape() {
        let elem = Expr::counter().as_list_elem();
        assert_eq!(elem.kind(), NFTA_LIST_ELEM | NLA_F_NESTED);

        let name = NfAttr::string(NFTA_EXPR_NAME, "counter").serialize();
        assert_eq!(&elem.payload()[..name.len()], name.as_slice());
    }
}
