//! Command codec (§4.4): turns a command payload into a typed argument
//! vector using the schema, and turns a handler's response arguments back
//! into wire bytes.

use crate::protocol::schema::{ArgType, EncoderEntry, ParserEntry, ParserFlags, MAX_ARGS};
use crate::protocol::vlq::{self, Cursor};
use crate::shutdown::ShutdownState;

/// One decoded argument. `Buf` borrows directly into the frame buffer the
/// dispatcher is currently holding (§9 — "deliberate zero-copy contract");
/// it is only valid until the dispatcher pops that frame.
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    Int(u32),
    Buf(&'a [u8]),
}

impl<'a> Arg<'a> {
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Arg::Int(v) => Some(*v),
            Arg::Buf(_) => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        self.as_u32().map(|v| v as i32)
    }

    pub fn as_buf(&self) -> Option<&'a [u8]> {
        match self {
            Arg::Buf(b) => Some(b),
            Arg::Int(_) => None,
        }
    }
}

/// Outcome of [`parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Arguments were parsed; the cursor points just past the last one.
    Parsed { end: usize },
    /// Device is in shutdown and this command isn't shutdown-safe; an
    /// `is_shutdown` response was queued instead of parsing (§4.4.1).
    Skipped,
}

/// Parses one command's arguments out of `payload[start..]`, per `entry`'s
/// parameter list, pushing into `args`. `end` bounds how far into
/// `payload` this command's arguments may extend (the next command's id
/// byte, or the frame's payload end).
///
/// On a shutdown-guarded command while the device is shut down, queues an
/// `is_shutdown` reply via `on_shutdown_reply` and returns
/// `ParseOutcome::Skipped` without touching `args`. On any bounds or
/// schema violation, triggers `shutdown.shutdown(...)`, which does not
/// return (§7).
pub fn parse<'a>(
    payload: &'a [u8],
    start: usize,
    end: usize,
    entry: &ParserEntry,
    args: &mut heapless::Vec<Arg<'a>, MAX_ARGS>,
    shutdown: &impl ShutdownState,
    mut on_shutdown_reply: impl FnMut(u16),
) -> ParseOutcome {
    if shutdown.is_shutdown() && !entry.flags.contains(ParserFlags::IN_SHUTDOWN) {
        on_shutdown_reply(shutdown.shutdown_reason());
        return ParseOutcome::Skipped;
    }

    let mut cursor = Cursor::new(payload, start);
    for &ty in entry.params() {
        match ty {
            ArgType::Uint32 | ArgType::Int32 | ArgType::Uint16 | ArgType::Int16 | ArgType::Byte => {
                let v = vlq::decode(&mut cursor);
                if cursor.pos() > end {
                    shutdown.shutdown("Command parser error");
                }
                let _ = args.push(Arg::Int(v));
            }
            ArgType::Buffer | ArgType::ProgmemBuffer => {
                let len_pos = cursor.pos();
                if len_pos >= end {
                    shutdown.shutdown("Command parser error");
                }
                let len = payload[len_pos] as usize;
                let data_start = len_pos + 1;
                let data_end = data_start + len;
                if data_end > end || data_end > payload.len() {
                    shutdown.shutdown("Command parser error");
                }
                let _ = args.push(Arg::Buf(&payload[data_start..data_end]));
                cursor = Cursor::new(payload, data_end);
            }
            ArgType::String => {
                // String is encode-only (§3); encountering it while
                // parsing an incoming command means the schema and the
                // wire bytes disagree.
                shutdown.shutdown("Command parser error");
            }
        }
    }
    if cursor.pos() > end {
        shutdown.shutdown("Command parser error");
    }
    ParseOutcome::Parsed { end: cursor.pos() }
}

/// Builds a response payload from `args` into `buf` per `entry`'s
/// parameter list (§4.4.2), starting at `start` and returning the
/// absolute end position. `start` lets the frame layer reserve a byte
/// for `msg_id` ahead of the encoded parameters; `entry.max_size` bounds
/// the whole payload (`msg_id` plus parameters), not just the part this
/// call writes. Triggers `shutdown.shutdown("Message encode error")` if
/// the encoded payload would exceed `entry.max_size`.
pub fn encode(
    buf: &mut [u8],
    start: usize,
    entry: &EncoderEntry,
    args: &[EncodeArg],
    shutdown: &impl ShutdownState,
) -> usize {
    let mut pos = start;
    for (&ty, arg) in entry.params().iter().zip(args.iter()) {
        match (ty, arg) {
            (ArgType::Uint32 | ArgType::Int32, EncodeArg::Int(v)) => {
                let mut tmp = [0u8; 5];
                let n = vlq::encode(&mut tmp, *v);
                pos = write_checked(buf, pos, &tmp[..n], entry.max_size, shutdown);
            }
            (ArgType::Uint16 | ArgType::Int16 | ArgType::Byte, EncodeArg::Int(v)) => {
                let masked = v & 0xFFFF;
                let mut tmp = [0u8; 5];
                let n = vlq::encode(&mut tmp, masked);
                pos = write_checked(buf, pos, &tmp[..n], entry.max_size, shutdown);
            }
            (ArgType::String, EncodeArg::Bytes(s)) => {
                if pos >= entry.max_size {
                    shutdown.shutdown("Message encode error");
                }
                let len_pos = pos;
                pos += 1;
                let remaining = entry.max_size.saturating_sub(pos);
                let cut = s.iter().position(|&b| b == 0).unwrap_or(s.len());
                let n = cut.min(remaining);
                pos = write_checked(buf, pos, &s[..n], entry.max_size, shutdown);
                buf[len_pos] = n as u8;
            }
            (ArgType::Buffer | ArgType::ProgmemBuffer, EncodeArg::Bytes(s)) => {
                if pos >= entry.max_size {
                    shutdown.shutdown("Message encode error");
                }
                let len_pos = pos;
                pos += 1;
                let remaining = entry.max_size.saturating_sub(pos);
                let n = s.len().min(remaining);
                pos = write_checked(buf, pos, &s[..n], entry.max_size, shutdown);
                buf[len_pos] = n as u8;
            }
            _ => shutdown.shutdown("Message encode error"),
        }
    }
    pos
}

/// Argument supplied to [`encode`]: either a scalar or raw bytes for
/// `string`/`buffer`/`progmem_buffer` parameters.
#[derive(Debug, Clone, Copy)]
pub enum EncodeArg<'a> {
    Int(u32),
    Bytes(&'a [u8]),
}

fn write_checked(
    buf: &mut [u8],
    pos: usize,
    data: &[u8],
    max_size: usize,
    shutdown: &impl ShutdownState,
) -> usize {
    if pos + data.len() > max_size || pos + data.len() > buf.len() {
        shutdown.shutdown("Message encode error");
    }
    buf[pos..pos + data.len()].copy_from_slice(data);
    pos + data.len()
}
