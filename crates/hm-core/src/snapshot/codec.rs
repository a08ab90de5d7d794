//! Binary wire format for process snapshots.
//!
//! The agent writes exactly one frame to stdout:
//!
//! ```text
//! frame   := MAGIC(8) VERSION(u16) PAYLOAD_LEN(u64) PAYLOAD DIGEST(32)
//! PAYLOAD := host:str count:u32 record*count
//! record  := pid:u32 owner:str ntokens:u32 token*ntokens
//! str     := len:u32 utf8-bytes
//! DIGEST  := SHA-256(PAYLOAD)
//! ```
//!
//! Integers are big-endian. The decoder skips anything before the first
//! MAGIC (login banners, motd, shell profile output) and ignores bytes after
//! the digest. Corruption inside the frame is caught by the digest.

use super::types::{ProcessRecord, ProcessSnapshot};
use hm_common::ProcessId;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

const MAGIC_LEN: usize = 8;

/// Frame marker.
pub const MAGIC: &[u8; MAGIC_LEN] = b"HPCSNAP\0";

/// Current wire format version.
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = MAGIC_LEN + 2 + 8;
const DIGEST_LEN: usize = 32;

/// Smallest possible encoded record: pid, empty owner, zero tokens.
const MIN_RECORD_LEN: usize = 4 + 4 + 4;

/// Smallest possible encoded token: empty string.
const MIN_TOKEN_LEN: usize = 4;

/// Errors from encoding or decoding a snapshot frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("snapshot frame marker not found in {len} bytes of input")]
    MissingMagic { len: usize },

    #[error("unsupported snapshot format version {0} (expected {FORMAT_VERSION})")]
    UnsupportedVersion(u16),

    #[error("snapshot truncated in {context}: need {needed} bytes, {available} available")]
    Truncated {
        context: &'static str,
        needed: u64,
        available: u64,
    },

    #[error("snapshot digest mismatch")]
    DigestMismatch,

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("{0} unexpected bytes after the last record")]
    TrailingPayload(usize),

    #[error("{field} too large to encode ({len} bytes)")]
    TooLarge { field: &'static str, len: usize },
}

impl From<CodecError> for hm_common::Error {
    fn from(err: CodecError) -> Self {
        hm_common::Error::Encoding(err.to_string())
    }
}

/// Encode a snapshot into a single frame.
pub fn encode(snapshot: &ProcessSnapshot) -> Result<Vec<u8>, CodecError> {
    let mut payload = Vec::with_capacity(64 + snapshot.processes.len() * 64);

    put_str(&mut payload, &snapshot.host, "host")?;
    put_len(&mut payload, snapshot.processes.len(), "record count")?;

    for record in &snapshot.processes {
        payload.extend_from_slice(&record.pid.0.to_be_bytes());
        put_str(&mut payload, &record.owner, "owner")?;
        put_len(&mut payload, record.command_line.len(), "token count")?;
        for token in &record.command_line {
            put_str(&mut payload, token, "command token")?;
        }
    }

    let digest = Sha256::digest(&payload);

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + DIGEST_LEN);
    frame.extend_from_slice(MAGIC);
    frame.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    frame.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&digest);
    Ok(frame)
}

/// Decode the first snapshot frame found in `bytes`.
pub fn decode(bytes: &[u8]) -> Result<ProcessSnapshot, CodecError> {
    let start = find_magic(bytes).ok_or(CodecError::MissingMagic { len: bytes.len() })?;
    if start > 0 {
        warn!(skipped_bytes = start, "ignoring output before snapshot frame");
    }
    let frame = &bytes[start..];

    if frame.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            context: "header",
            needed: HEADER_LEN as u64,
            available: frame.len() as u64,
        });
    }

    let mut header = Reader::new(&frame[MAGIC_LEN..HEADER_LEN]);
    let version = header.u16("header")?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let payload_len = header.u64("header")?;

    let body = &frame[HEADER_LEN..];
    let needed = payload_len.checked_add(DIGEST_LEN as u64);
    let needed = match needed {
        Some(n) if n <= body.len() as u64 => n as usize,
        _ => {
            return Err(CodecError::Truncated {
                context: "payload",
                needed: needed.unwrap_or(u64::MAX),
                available: body.len() as u64,
            })
        }
    };

    let payload = &body[..needed - DIGEST_LEN];
    let digest = &body[needed - DIGEST_LEN..needed];
    if Sha256::digest(payload).as_slice() != digest {
        return Err(CodecError::DigestMismatch);
    }

    let trailing = body.len() - needed;
    if trailing > 0 {
        warn!(trailing_bytes = trailing, "ignoring output after snapshot frame");
    }

    decode_payload(payload)
}

fn decode_payload(payload: &[u8]) -> Result<ProcessSnapshot, CodecError> {
    let mut r = Reader::new(payload);

    let host = r.string("host")?;
    let count = r.u32("record count")? as usize;
    let mut processes = Vec::with_capacity(count.min(r.remaining() / MIN_RECORD_LEN));

    for _ in 0..count {
        let pid = r.u32("record")?;
        let owner = r.string("owner")?;
        let ntokens = r.u32("token count")? as usize;
        let mut command_line = Vec::with_capacity(ntokens.min(r.remaining() / MIN_TOKEN_LEN));
        for _ in 0..ntokens {
            command_line.push(r.string("command token")?);
        }
        processes.push(ProcessRecord {
            pid: ProcessId(pid),
            owner,
            command_line,
        });
    }

    if r.remaining() > 0 {
        return Err(CodecError::TrailingPayload(r.remaining()));
    }

    Ok(ProcessSnapshot { host, processes })
}

fn find_magic(bytes: &[u8]) -> Option<usize> {
    bytes.windows(MAGIC_LEN).position(|w| w == MAGIC)
}

fn put_len(buf: &mut Vec<u8>, len: usize, field: &'static str) -> Result<(), CodecError> {
    let len32 = u32::try_from(len).map_err(|_| CodecError::TooLarge { field, len })?;
    buf.extend_from_slice(&len32.to_be_bytes());
    Ok(())
}

fn put_str(buf: &mut Vec<u8>, s: &str, field: &'static str) -> Result<(), CodecError> {
    put_len(buf, s.len(), field)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Bounds-checked big-endian cursor.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::Truncated {
                context,
                needed: n as u64,
                available: self.remaining() as u64,
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self, context: &'static str) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, context)?);
        Ok(out)
    }

    fn u16(&mut self, context: &'static str) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.array(context)?))
    }

    fn u32(&mut self, context: &'static str) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array(context)?))
    }

    fn u64(&mut self, context: &'static str) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.array(context)?))
    }

    fn string(&mut self, context: &'static str) -> Result<String, CodecError> {
        let len = self.u32(context)? as usize;
        let bytes = self.take(len, context)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8(context))
    }
}
