//! Netlink message and nfnetlink batch assembly.
//!
//! Every mutation the table/chain driver performs travels inside one
//! [`Batch`]: a `NFNL_MSG_BATCH_BEGIN` envelope, the payload messages, and a
//! `NFNL_MSG_BATCH_END` envelope. The kernel applies the whole batch as a
//! single transaction, so a failed commit leaves no partial state.

const NLMSG_HDR_LEN: usize = 16;
const NLMSG_ALIGNTO: usize = 4;

const NLM_F_REQUEST: i32 = 0x1;
pub const NLM_F_ACK: i32 = 0x4;

pub const NFNL_MSG_BATCH_BEGIN: u16 = 0x10;
pub const NFNL_MSG_BATCH_END: u16 = 0x11;
pub const NFNL_SUBSYS_NFTABLES: u8 = 10;
const NFNETLINK_V0: u8 = 0;

pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// The `nfgenmsg` header carried by every nfnetlink message: protocol family,
/// nfnetlink version and a big-endian resource id.
pub fn genmsg(family: u8, res_id: u16) -> [u8; 4] {
    let res = res_id.to_be_bytes();
    [family, NFNETLINK_V0, res[0], res[1]]
}

/// One netlink message: a 16-byte `nlmsghdr` followed by an aligned payload.
///
/// `NLM_F_REQUEST` is always set; pass the remaining flags explicitly.
pub struct Message {
    kind: u16,
    flags: u16,
    payload: Vec<u8>,
}

impl Message {
    pub fn new(kind: u16, flags: i32) -> Self {
        Self { kind, flags: (flags | NLM_F_REQUEST) as u16, payload: Vec::new() }
    }

    /// Appends a payload part, padding the previous part to the 4-byte
    /// netlink alignment boundary first.
    pub fn add(&mut self, data: &[u8]) {
        self.payload.resize(nlmsg_align(self.payload.len()), 0);
        self.payload.extend_from_slice(data);
    }

    pub fn wants_ack(&self) -> bool {
        self.flags & NLM_F_ACK as u16 != 0
    }

    pub fn serialize(&self, seq: u32) -> Vec<u8> {
        let len = NLMSG_HDR_LEN + self.payload.len();
        let mut buf = Vec::with_capacity(nlmsg_align(len));

        buf.extend_from_slice(&(len as u32).to_ne_bytes());
        buf.extend_from_slice(&self.kind.to_ne_bytes());
        buf.extend_from_slice(&self.flags.to_ne_bytes());
        buf.extend_from_slice(&seq.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(&self.payload);
        buf.resize(nlmsg_align(len), 0);

        buf
    }
}

/// An ordered set of messages committed as one kernel transaction.
pub struct Batch {
    messages: Vec<Message>,
}

impl Batch {
    pub fn new() -> Self {
        Self { messages: Vec::new() }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    fn envelope(kind: u16) -> Message {
        let mut msg = Message::new(kind, 0);
        msg.add(&genmsg(0, NFNL_SUBSYS_NFTABLES as u16));
        msg
    }

    /// Serializes begin envelope, payload messages and end envelope into one
    /// datagram, assigning consecutive sequence numbers starting at `seq`.
    /// Returns the buffer and the number of acks the kernel will send back.
    pub fn serialize(&self, seq: &mut u32) -> (Vec<u8>, usize) {
        let mut buf = Vec::new();
        let mut acks = 0;

        let mut emit = |msg: &Message, seq: &mut u32| {
            buf.extend_from_slice(&msg.serialize(*seq));
            *seq = seq.wrapping_add(1);
            if msg.wants_ack() {
                acks += 1;
            }
        };

        emit(&Self::envelope(NFNL_MSG_BATCH_BEGIN), seq);
        for msg in &self.messages {
            emit(msg, seq);
        }
        emit(&Self::envelope(NFNL_MSG_BATCH_END), seq);

        (buf, acks)
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_header_layout() {
        let mut msg = Message::new(0x0a06, NLM_F_ACK);
        msg.add(&[1, 2, 3]);
        let buf = msg.serialize(7);

        // 16-byte header + 3 payload bytes, padded to 20.
        assert_eq!(buf.len(), 20);
        assert_eq!(u32::from_ne_bytes(buf[0..4].try_into().unwrap()), 19);
        assert_eq!(u16::from_ne_bytes(buf[4..6].try_into().unwrap()), 0x0a06);
        // NLM_F_REQUEST is implied.
        assert_eq!(u16::from_ne_bytes(buf[6..8].try_into().unwrap()), 0x5);
        assert_eq!(u32::from_ne_bytes(buf[8..12].try_into().unwrap()), 7);
        assert_eq!(&buf[16..19], &[1, 2, 3]);
        assert_eq!(buf[19], 0);
    }

    #[test]
    fn test_payload_parts_are_aligned() {
        let mut msg = Message::new(1, 0);
        msg.add(&[0xff; 5]);
        msg.add(&[0xee; 2]);
        let buf = msg.serialize(0);

        // 5 bytes padded to 8, then 2 more.
        assert_eq!(u32::from_ne_bytes(buf[0..4].try_into().unwrap()), 16 + 10);
        assert_eq!(&buf[16..21], &[0xff; 5]);
        assert_eq!(&buf[21..24], &[0, 0, 0]);
        assert_eq!(&buf[24..26], &[0xee; 2]);
    }

    #[test]
    fn test_batch_framing() {
        let mut batch = Batch::new();
        let mut msg = Message::new(0x0a00, NLM_F_ACK);
        msg.add(&genmsg(1, 0));
        batch.push(msg);

        let mut seq = 10;
        let (buf, acks) = batch.serialize(&mut seq);

        assert_eq!(acks, 1);
        assert_eq!(seq, 13);

        // Begin envelope: type 0x10, nfgenmsg with big-endian subsystem id.
        assert_eq!(u16::from_ne_bytes(buf[4..6].try_into().unwrap()), NFNL_MSG_BATCH_BEGIN);
        assert_eq!(buf[16], 0);
        assert_eq!(&buf[18..20], &10u16.to_be_bytes());

        // Payload message follows with the next sequence number.
        assert_eq!(u16::from_ne_bytes(buf[24..26].try_into().unwrap()), 0x0a00);
        assert_eq!(u32::from_ne_bytes(buf[28..32].try_into().unwrap()), 11);

        // End envelope closes the transaction.
        let end = buf.len() - 20;
        assert_eq!(u16::from_ne_bytes(buf[end + 4..end + 6].try_into().unwrap()), NFNL_MSG_BATCH_END);
    }
}
