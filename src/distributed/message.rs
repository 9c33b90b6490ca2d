//! Messages exchanged between ranks and their wire framing
//!
//! Frame layout, all integers little-endian:
//!
//! ```text
//! +-------------+-----+---------------------+
//! | len: u32    | tag | payload (len-1 B)   |
//! +-------------+-----+---------------------+
//! ```
//!
//! Payloads are sequences of `u64`. `LINES` carries its element count first.

use crate::error::TransportError;
use crate::types::Line;
use bytes::{Buf, BufMut, BytesMut};

const TAG_HELLO: u8 = 0x01;
const TAG_SIZE: u8 = 0x02;
const TAG_LINES: u8 = 0x03;
const TAG_DONE: u8 = 0x04;
const TAG_BARRIER: u8 = 0x05;
const TAG_RELEASE: u8 = 0x06;

const LENGTH_PREFIX: usize = 4;

/// Largest accepted frame body
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// First frame of a worker connection, announcing its rank
    Hello {
        /// Rank of the connecting worker
        rank: u64,
    },
    /// Number of bursts in the next cluster
    ClusterSize(u64),
    /// Source lines of the bursts in that cluster
    ClusterLines(Vec<Line>),
    /// The sender has no more clusters
    Done,
    /// The sender reached the barrier
    Barrier,
    /// Every rank reached the barrier
    Release,
}

impl Message {
    /// Short name for logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "hello",
            Message::ClusterSize(_) => "size",
            Message::ClusterLines(_) => "lines",
            Message::Done => "done",
            Message::Barrier => "barrier",
            Message::Release => "release",
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Message::Hello { .. } => TAG_HELLO,
            Message::ClusterSize(_) => TAG_SIZE,
            Message::ClusterLines(_) => TAG_LINES,
            Message::Done => TAG_DONE,
            Message::Barrier => TAG_BARRIER,
            Message::Release => TAG_RELEASE,
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            Message::Hello { .. } | Message::ClusterSize(_) => 8,
            Message::ClusterLines(lines) => 8 + 8 * lines.len(),
            Message::Done | Message::Barrier | Message::Release => 0,
        }
    }

    /// Append the framed message to `dst`
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), TransportError> {
        let body_len = 1 + self.payload_len();
        if body_len > MAX_FRAME_LEN {
            return Err(TransportError::Codec(format!(
                "frame of {} bytes exceeds the {} byte limit",
                body_len, MAX_FRAME_LEN
            )));
        }

        dst.reserve(LENGTH_PREFIX + body_len);
        dst.put_u32_le(body_len as u32);
        dst.put_u8(self.tag());
        match self {
            Message::Hello { rank } => dst.put_u64_le(*rank),
            Message::ClusterSize(n) => dst.put_u64_le(*n),
            Message::ClusterLines(lines) => {
                dst.put_u64_le(lines.len() as u64);
                for &line in lines {
                    dst.put_u64_le(line);
                }
            }
            Message::Done | Message::Barrier | Message::Release => {}
        }
        Ok(())
    }

    /// Take one complete frame off the front of `src`
    ///
    /// Returns `Ok(None)` and leaves `src` untouched while the frame is
    /// incomplete.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Message>, TransportError> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let body_len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if body_len == 0 {
            return Err(TransportError::Codec("empty frame".to_string()));
        }
        if body_len > MAX_FRAME_LEN {
            return Err(TransportError::Codec(format!(
                "frame of {} bytes exceeds the {} byte limit",
                body_len, MAX_FRAME_LEN
            )));
        }
        if src.len() < LENGTH_PREFIX + body_len {
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let mut body = src.split_to(body_len);
        let tag = body.get_u8();

        let message = match tag {
            TAG_HELLO => Message::Hello {
                rank: read_u64(&mut body, "hello")?,
            },
            TAG_SIZE => Message::ClusterSize(read_u64(&mut body, "size")?),
            TAG_LINES => {
                let count = read_u64(&mut body, "lines")? as usize;
                if count.checked_mul(8) != Some(body.remaining()) {
                    return Err(TransportError::Codec(format!(
                        "lines frame announces {} lines but carries {} bytes",
                        count,
                        body.remaining()
                    )));
                }
                let mut lines = Vec::with_capacity(count);
                for _ in 0..count {
                    lines.push(body.get_u64_le());
                }
                Message::ClusterLines(lines)
            }
            TAG_DONE => Message::Done,
            TAG_BARRIER => Message::Barrier,
            TAG_RELEASE => Message::Release,
            other => {
                return Err(TransportError::Codec(format!("unknown message tag 0x{:02x}", other)));
            }
        };

        if body.has_remaining() {
            return Err(TransportError::Codec(format!(
                "{} frame has {} trailing bytes",
                message.kind(),
                body.remaining()
            )));
        }

        Ok(Some(message))
    }
}

fn read_u64(body: &mut BytesMut, kind: &str) -> Result<u64, TransportError> {
    if body.remaining() < 8 {
        return Err(TransportError::Codec(format!("truncated {} frame", kind)));
    }
    Ok(body.get_u64_le())
}
