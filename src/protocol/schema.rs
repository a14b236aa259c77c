//! Schema entities (§3 "Schema entities"): the compile-time, read-only
//! tables the dispatcher and codec consume. Building these tables is
//! explicitly out of scope for this crate (§1) — they would normally be
//! generated from handler annotations by a separate build-time tool, the
//! way the teacher firmware's board/driver modules are themselves
//! hand-written against a fixed, known hardware description. `commands`
//! ships one small hand-written table as a worked example and as fixtures
//! for the dispatcher's tests.

use crate::protocol::codec::Arg;

/// Upper bound on arguments after `buffer` parameters expand to
/// `(len, ptr)` pairs (§3 — "num_args ≥ num_params"). Large enough for
/// every entry in the demo schema; a generated schema for a larger
/// command set would need a larger bound, which is exactly the kind of
/// compile-time constant the (external) schema generator is responsible
/// for sizing correctly.
pub const MAX_ARGS: usize = 8;

/// Maximum number of parameters a single command or response may declare.
pub const MAX_PARAMS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ArgType {
    Uint32,
    Int32,
    Uint16,
    Int16,
    Byte,
    String,
    Buffer,
    ProgmemBuffer,
}

bitflags::bitflags! {
    /// Per-handler flags (§3). `IN_SHUTDOWN` marks a command as safe to
    /// parse and dispatch even while the device is in shutdown state
    /// (§4.4.1 precondition check).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParserFlags: u8 {
        const IN_SHUTDOWN = 0x01;
    }
}

/// Argument-type list storage shared by parser and encoder entries.
pub type ParamTypes = [ArgType; MAX_PARAMS];

/// A handler callback: takes the parsed argument vector for one command.
pub type Handler = fn(&[Arg]);

/// `parser[msg_id]` (§3) — describes how to decode one incoming command
/// and which handler to invoke with the result.
#[derive(Clone, Copy)]
pub struct ParserEntry {
    pub num_params: usize,
    pub param_types: ParamTypes,
    pub num_args: usize,
    pub handler: Handler,
    pub flags: ParserFlags,
}

impl ParserEntry {
    pub const fn new(
        param_types: &'static [ArgType],
        num_args: usize,
        handler: Handler,
        flags: ParserFlags,
    ) -> Self {
        let mut types = [ArgType::Byte; MAX_PARAMS];
        let mut i = 0;
        while i < param_types.len() {
            types[i] = param_types[i];
            i += 1;
        }
        Self {
            num_params: param_types.len(),
            param_types: types,
            num_args,
            handler,
            flags,
        }
    }

    pub fn params(&self) -> &[ArgType] {
        &self.param_types[..self.num_params]
    }
}

/// `encoder[encoder_id]` (§3) — describes how to build one outgoing
/// response/telemetry message.
#[derive(Clone, Copy)]
pub struct EncoderEntry {
    pub msg_id: u8,
    pub num_params: usize,
    pub param_types: ParamTypes,
    pub max_size: usize,
}

impl EncoderEntry {
    pub const fn new(msg_id: u8, param_types: &'static [ArgType], max_size: usize) -> Self {
        let mut types = [ArgType::Byte; MAX_PARAMS];
        let mut i = 0;
        while i < param_types.len() {
            types[i] = param_types[i];
            i += 1;
        }
        Self {
            msg_id,
            num_params: param_types.len(),
            param_types: types,
            max_size,
        }
    }

    pub fn params(&self) -> &[ArgType] {
        &self.param_types[..self.num_params]
    }
}

/// The full read-only schema the dispatcher is built against: a dense
/// `command_index` keyed by message id (§6 "Schema contract"), plus the
/// encoder table used by the response-building side of the codec.
pub struct Schema {
    pub command_index: &'static [Option<ParserEntry>],
    pub encoders: &'static [EncoderEntry],
}

impl Schema {
    pub const fn new(
        command_index: &'static [Option<ParserEntry>],
        encoders: &'static [EncoderEntry],
    ) -> Self {
        Self {
            command_index,
            encoders,
        }
    }

    pub fn parser(&self, msg_id: u8) -> Option<&ParserEntry> {
        self.command_index
            .get(msg_id as usize)
            .and_then(|slot| slot.as_ref())
    }

    pub fn encoder(&self, encoder_id: usize) -> Option<&EncoderEntry> {
        self.encoders.get(encoder_id)
    }
}
