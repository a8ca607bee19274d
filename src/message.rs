//! Messages exchanged between the CLI and the daemon, and their framing.
//!
//! # Wire format
//!
//! Every message travels as a single length-prefixed frame:
//!
//! ```text
//! [2 bytes type, BE][8 bytes payload length, BE][payload bytes][0x00]
//! ```
//!
//! The trailing NUL is an integrity sentinel and is not part of the payload.
//! A frame is therefore always `10 + length + 1` bytes long.  Frames are
//! not self-delimiting: readers must consume exactly the header, then
//! exactly `length + 1` further bytes.

use log::debug;
use std::fmt;
use std::io::{self, Read, Write};

/// Size of the fixed header (type + length).
pub const HEADER_LEN: usize = 10;

/// Smallest possible frame: a header, an empty payload and the sentinel.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + 1;

/// Largest payload [`read_message`] accepts from a stream.
pub const MAX_PAYLOAD_LEN: u64 = 1024 * 1024;

const SENTINEL: u8 = 0;

/// The kind of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Error,
    Respond,
    Ping,
    Update,
    Close,
    Reload,
    Kill,
    /// A code this build does not know about.  Kept so the daemon can
    /// report it instead of failing the whole frame.
    Unknown(u16),
}

impl MessageType {
    /// The on-wire type code.
    pub fn code(self) -> u16 {
        match self {
            MessageType::Error => 0,
            MessageType::Respond => 1,
            MessageType::Ping => 2,
            MessageType::Update => 3,
            MessageType::Close => 4,
            MessageType::Reload => 5,
            MessageType::Kill => 6,
            MessageType::Unknown(code) => code,
        }
    }

    /// Map an on-wire type code back to a [`MessageType`].
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => MessageType::Error,
            1 => MessageType::Respond,
            2 => MessageType::Ping,
            3 => MessageType::Update,
            4 => MessageType::Close,
            5 => MessageType::Reload,
            6 => MessageType::Kill,
            other => MessageType::Unknown(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Error => write!(f, "error"),
            MessageType::Respond => write!(f, "respond"),
            MessageType::Ping => write!(f, "ping"),
            MessageType::Update => write!(f, "update"),
            MessageType::Close => write!(f, "close"),
            MessageType::Reload => write!(f, "reload"),
            MessageType::Kill => write!(f, "kill"),
            MessageType::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

/// One request or response.
///
/// `value` carries the option name of an update, the config path of a
/// reload, or the human-readable text of a response.  It must never contain
/// a NUL character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub value: String,
}

impl Message {
    pub fn new(kind: MessageType, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// A `RESPOND` message carrying `value`.
    pub fn respond(value: impl Into<String>) -> Self {
        Self::new(MessageType::Respond, value)
    }

    pub fn ping() -> Self {
        Self::new(MessageType::Ping, "")
    }

    pub fn kill() -> Self {
        Self::new(MessageType::Kill, "")
    }

    pub fn close() -> Self {
        Self::new(MessageType::Close, "")
    }

    pub fn update(option: impl Into<String>) -> Self {
        Self::new(MessageType::Update, option)
    }

    /// A `RELOAD` message.  An empty path asks the daemon to re-read the
    /// file it is currently using.
    pub fn reload(path: impl Into<String>) -> Self {
        Self::new(MessageType::Reload, path)
    }

    /// Encode into a complete frame.
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.value.as_bytes();
        let mut frame = Vec::with_capacity(MIN_FRAME_LEN + payload.len());
        frame.extend_from_slice(&self.kind.code().to_be_bytes());
        frame.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        frame.extend_from_slice(payload);
        frame.push(SENTINEL);
        frame
    }

    /// Decode a complete frame.
    ///
    /// The frame is validated as a whole; on any error nothing from it
    /// should be used.
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(FrameError::TooShort(frame.len()));
        }
        if frame.last() != Some(&SENTINEL) {
            return Err(FrameError::MissingSentinel);
        }

        let (type_bytes, rest) = frame.split_at(2);
        let (len_bytes, body) = rest.split_at(8);
        let declared = u64::from_be_bytes(to_array(len_bytes));
        let actual = frame.len() as u64;
        if declared.checked_add(MIN_FRAME_LEN as u64) != Some(actual) {
            return Err(FrameError::LengthMismatch { declared, actual });
        }

        let payload = &body[..body.len() - 1];
        if payload.contains(&SENTINEL) {
            return Err(FrameError::EmbeddedNul);
        }
        let value = std::str::from_utf8(payload).map_err(|_| FrameError::InvalidUtf8)?;

        Ok(Self {
            kind: MessageType::from_code(u16::from_be_bytes(to_array(type_bytes))),
            value: value.to_owned(),
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.kind, self.value)
    }
}

fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Errors produced while framing or unframing a [`Message`].
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame too short ({0} bytes)")]
    TooShort(usize),
    #[error("frame does not end with the NUL sentinel")]
    MissingSentinel,
    #[error("declared payload length {declared} does not match frame of {actual} bytes")]
    LengthMismatch { declared: u64, actual: u64 },
    #[error("payload contains an embedded NUL")]
    EmbeddedNul,
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("declared payload length {0} exceeds the limit")]
    PayloadTooLarge(u64),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

//  Stream helpers

/// Read exactly one frame from `reader` and decode it.
///
/// The header and the payload-plus-sentinel are each read with
/// [`Read::read_exact`], so short reads from a stream socket are handled.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message, FrameError> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header)?;

    let declared = u64::from_be_bytes(to_array(&header[2..]));
    if declared > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge(declared));
    }
    // Bounded by MAX_PAYLOAD_LEN above.
    let mut frame = Vec::with_capacity(MIN_FRAME_LEN + declared as usize);
    frame.extend_from_slice(&header);
    frame.resize(MIN_FRAME_LEN + declared as usize, 0);
    reader.read_exact(&mut frame[HEADER_LEN..])?;

    let message = Message::decode(&frame)?;
    debug!("read {}", message);
    Ok(message)
}

/// Encode `message` and write the whole frame to `writer`.
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<(), FrameError> {
    if message.value.contains('\0') {
        return Err(FrameError::EmbeddedNul);
    }
    writer.write_all(&message.encode())?;
    writer.flush()?;
    debug!("wrote {}", message);
    Ok(())
}

//  Tests
