//! Netlink attribute (TLV) encoding.
//!
//! The netfilter subsystem carries every value as a type/length/value
//! attribute: a native-endian 4-byte header (length, type) followed by the
//! payload padded to 4 bytes. Integer payloads are big-endian throughout the
//! nftables subsystem; nested attributes set `NLA_F_NESTED` on the type.

pub const NLA_F_NESTED: u16 = 0x8000;

const NLA_HDR_LEN: usize = 4;
const NLA_ALIGNTO: usize = 4;

const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

pub trait Attribute {
    fn len(&self) -> usize;
    fn serialize(&self) -> Vec<u8>;
}

#[derive(Debug, Clone)]
pub struct NfAttr {
    kind: u16,
    payload: Vec<u8>,
}

impl NfAttr {
    pub fn new(kind: u16, data: &[u8]) -> Self {
        Self { kind, payload: data.to_vec() }
    }

    /// A nul-terminated string attribute.
    pub fn string(kind: u16, s: &str) -> Self {
        let mut payload = s.as_bytes().to_vec();
        payload.push(0);
        Self { kind, payload }
    }

    pub fn be16(kind: u16, value: u16) -> Self {
        Self::new(kind, &value.to_be_bytes())
    }

    pub fn be32(kind: u16, value: u32) -> Self {
        Self::new(kind, &value.to_be_bytes())
    }

    pub fn be64(kind: u16, value: u64) -> Self {
        Self::new(kind, &value.to_be_bytes())
    }

    pub fn nested(kind: u16, attrs: &[NfAttr]) -> Self {
        let mut payload = Vec::new();
        for attr in attrs {
            payload.extend_from_slice(&attr.serialize());
        }
        Self { kind: kind | NLA_F_NESTED, payload }
    }

    pub fn kind(&self) -> u16 {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl Attribute for NfAttr {
    fn len(&self) -> usize {
        nla_align(NLA_HDR_LEN + self.payload.len())
    }

    fn serialize(&self) -> Vec<u8> {
        let len = NLA_HDR_LEN + self.payload.len();
        let mut buf = Vec::with_capacity(nla_align(len));

        buf.extend_from_slice(&(len as u16).to_ne_bytes());
        buf.extend_from_slice(&self.kind.to_ne_bytes());
        buf.extend_from_slice(&self.payload);
        buf.resize(nla_align(len), 0);

        buf
    }
}
