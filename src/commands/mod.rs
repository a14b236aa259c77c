//! Demonstration command schema: ping and a single-argument echo command.
//!
//! Building a schema from handler annotations is out of scope for this
//! crate (it is the (external) build-time generator's job); this module
//! is what that generator's output looks like, grounded in
//! `rcls-gpsfreak`'s `command.rs` group layout (ping, generic ack,
//! generic nak). It exists to give `main.rs` something real to dispatch
//! and to give the dispatcher's tests a schema that isn't hand-rolled
//! per test.

use crate::protocol::codec::Arg;
use crate::protocol::schema::{ArgType, EncoderEntry, ParserEntry, ParserFlags, Schema};

/// `ping` — no arguments, replies with a generic ACK (the frame layer's
/// own empty-payload frame already serves that purpose, so the handler
/// itself has nothing to do beyond logging).
pub const PING: u8 = 0x00;

/// `echo_u32` — one `uint32` argument, logged by the handler. Matches
/// the command id used in the reference end-to-end scenario.
pub const ECHO_U32: u8 = 0x07;

fn ping_handler(_args: &[Arg]) {
    defmt::trace!("commands: ping");
}

fn echo_u32_handler(args: &[Arg]) {
    if let Some(v) = args.first().and_then(Arg::as_u32) {
        defmt::trace!("commands: echo_u32 {=u32}", v);
    }
}

const SCHEMA_SIZE: usize = 8;

static PARSERS: [Option<ParserEntry>; SCHEMA_SIZE] = {
    let mut table: [Option<ParserEntry>; SCHEMA_SIZE] = [None; SCHEMA_SIZE];
    table[PING as usize] = Some(ParserEntry::new(&[], 0, ping_handler, ParserFlags::empty()));
    table[ECHO_U32 as usize] = Some(ParserEntry::new(
        &[ArgType::Uint32],
        1,
        echo_u32_handler,
        ParserFlags::empty(),
    ));
    table
};

/// No dedicated response encoders yet beyond the frame layer's own
/// ACK/NAK and the dispatcher's built-in `is_shutdown` reply; both
/// handlers above are fire-and-log.
static ENCODERS: [EncoderEntry; 0] = [];

pub static SCHEMA: Schema = Schema::new(&PARSERS, &ENCODERS);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_resolves_both_demo_commands() {
        assert!(SCHEMA.parser(PING).is_some());
        assert!(SCHEMA.parser(ECHO_U32).is_some());
        assert!(SCHEMA.parser(0x05).is_none());
    }
}
