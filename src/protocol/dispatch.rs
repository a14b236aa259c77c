//! Dispatcher (§4.5): the single `poll()` entrypoint that ties the frame
//! layer, the command codec, the schema, and the shutdown subsystem
//! together. Processes at most one frame per call.

use crate::protocol::codec::{self, Arg};
use crate::protocol::frame::FrameLayer;
use crate::protocol::schema::{Schema, MAX_ARGS};
use crate::shutdown::ShutdownState;
use crate::transport::Transport;

/// Reserved reply used for the `is_shutdown` case in §7's error table: a
/// single `Uint16` parameter carrying the shutdown reason code. Not part
/// of the user schema's encoder table, since it must always be available
/// even for a schema that defines no encoders at all.
pub static IS_SHUTDOWN_REPLY: crate::protocol::schema::EncoderEntry =
    crate::protocol::schema::EncoderEntry::new(0, &[crate::protocol::schema::ArgType::Uint16], 4);

/// Owns the frame layer and drives one schema against one transport.
/// `S: ShutdownState` and `T: Transport` are generic so the firmware
/// binary can use the real `Shutdown`/`RingTransport` while tests use
/// lighter stand-ins.
pub struct CommandCore {
    frame_layer: FrameLayer,
    schema: &'static Schema,
}

impl CommandCore {
    pub const fn new(schema: &'static Schema) -> Self {
        Self {
            frame_layer: FrameLayer::new(),
            schema,
        }
    }

    pub fn next_sequence(&self) -> u8 {
        self.frame_layer.next_sequence()
    }

    /// §4.5: processes at most one frame.
    pub fn poll(&mut self, transport: &mut impl Transport, shutdown: &impl ShutdownState) {
        let Some(frame) = self.frame_layer.try_read_frame(transport) else {
            return;
        };

        let payload = frame.payload();
        let end = payload.len();
        let mut pos = 0usize;

        while pos < end {
            let cmd_id = payload[pos];
            pos += 1;

            let Some(entry) = self.schema.parser(cmd_id) else {
                defmt::error!("dispatch: unknown command id {=u8}", cmd_id);
                shutdown.shutdown("Invalid command");
            };

            let mut args: heapless::Vec<Arg, MAX_ARGS> = heapless::Vec::new();
            let mut reply_reason: Option<u16> = None;
            let outcome = codec::parse(payload, pos, end, entry, &mut args, shutdown, |reason| {
                reply_reason = Some(reason);
            });

            match outcome {
                codec::ParseOutcome::Parsed { end: new_pos } => {
                    defmt::trace!("dispatch: invoking handler for command id {=u8}", cmd_id);
                    (entry.handler)(&args);
                    pos = new_pos;
                }
                codec::ParseOutcome::Skipped => {
                    if let Some(reason) = reply_reason {
                        self.frame_layer.encode_and_send(
                            transport,
                            &IS_SHUTDOWN_REPLY,
                            &[codec::EncodeArg::Int(reason as u32)],
                            shutdown,
                        );
                    }
                    break;
                }
            }
        }

        self.frame_layer.pop_frame(transport, &frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::crc16::crc16;
    use crate::protocol::schema::{ArgType, ParserEntry, ParserFlags};
    use crate::shutdown::Shutdown;
    use crate::transport::RingTransport;
    use core::sync::atomic::{AtomicU32, Ordering};

    static LAST_ARG: AtomicU32 = AtomicU32::new(0);

    fn record_handler(args: &[Arg]) {
        if let Some(v) = args.first().and_then(Arg::as_u32) {
            LAST_ARG.store(v, Ordering::SeqCst);
        }
    }

    static PARSERS: [Option<ParserEntry>; 8] = [
        None,
        None,
        None,
        None,
        None,
        None,
        None,
        Some(ParserEntry::new(
            &[ArgType::Uint32],
            1,
            record_handler,
            ParserFlags::empty(),
        )),
    ];
    static ENCODERS: [crate::protocol::schema::EncoderEntry; 0] = [];
    static SCHEMA: Schema = Schema::new(&PARSERS, &ENCODERS);

    fn build_frame(seq: u8, payload: &[u8]) -> heapless::Vec<u8, 64> {
        let mut out = heapless::Vec::<u8, 64>::new();
        let msglen = (payload.len() + 5) as u8;
        out.push(msglen).unwrap();
        out.push(seq).unwrap();
        for &b in payload {
            out.push(b).unwrap();
        }
        let crc = crc16(&out);
        out.push((crc >> 8) as u8).unwrap();
        out.push(crc as u8).unwrap();
        out.push(0x7E).unwrap();
        out
    }

    #[test]
    fn scenario_4_stream_with_command_dispatches_and_acks() {
        LAST_ARG.store(0, Ordering::SeqCst);
        let frame = build_frame(0x10, &[0x07, 0x2A]);
        let mut transport: RingTransport<32> = RingTransport::new();
        transport.feed_input(&frame);
        let mut core = CommandCore::new(&SCHEMA);
        let shutdown = Shutdown::new();

        core.poll(&mut transport, &shutdown);

        assert_eq!(LAST_ARG.load(Ordering::SeqCst), 42);
        assert_eq!(core.next_sequence(), 0x11);
        assert!(transport.input_peek().is_empty(), "frame consumed");

        let mut ack = [0u8; 8];
        let n = transport.drain_output(&mut ack);
        assert_eq!(n, 5);
        assert_eq!(ack[1], 0x11);
    }

    #[test]
    #[should_panic(expected = "Invalid command")]
    fn unknown_command_id_is_fatal() {
        let frame = build_frame(0x10, &[0x05]); // slot 5 is None
        let mut transport: RingTransport<32> = RingTransport::new();
        transport.feed_input(&frame);
        let mut core = CommandCore::new(&SCHEMA);
        let shutdown = crate::shutdown::PanicOnShutdown::new();

        core.poll(&mut transport, &shutdown);
    }

    #[test]
    fn no_frame_available_is_a_no_op() {
        let mut transport: RingTransport<32> = RingTransport::new();
        let mut core = CommandCore::new(&SCHEMA);
        let shutdown = Shutdown::new();
        core.poll(&mut transport, &shutdown);
        assert_eq!(core.next_sequence(), 0x10);
    }
}
