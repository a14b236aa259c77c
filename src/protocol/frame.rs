//! Frame layer (§4.3): finds, validates, and strips frames from the input
//! byte stream; builds outgoing frames; owns the sequence-number state
//! machine and ACK/NAK generation.

use crate::protocol::codec::{self, EncodeArg};
use crate::protocol::crc16::crc16;
use crate::protocol::schema::EncoderEntry;
use crate::shutdown::ShutdownState;
use crate::transport::Transport;

pub const SYNC_BYTE: u8 = 0x7E;
pub const DEST_TAG: u8 = 0x10;
pub const MIN_FRAME: usize = 5;
pub const MAX_FRAME: usize = 64;

/// `sync_state` (§3): the two latches governing resynchronization.
#[derive(Debug, Clone, Copy, Default, defmt::Format)]
pub struct SyncState {
    need_sync: bool,
    need_valid: bool,
}

impl SyncState {
    pub const fn new() -> Self {
        Self {
            need_sync: false,
            need_valid: false,
        }
    }
}

/// A frame accepted by [`FrameLayer::try_read_frame`], copied out of the
/// transport's own buffer so the frame layer never has to fight the
/// borrow checker over a live `&mut dyn Transport`. Frames are at most
/// [`MAX_FRAME`] bytes, so the copy is cheap and bounded.
pub struct ReceivedFrame {
    buf: [u8; MAX_FRAME],
    len: usize,
}

impl ReceivedFrame {
    pub fn seq(&self) -> u8 {
        self.buf[1]
    }

    pub fn frame_len(&self) -> usize {
        self.len
    }

    /// The command bytes between the SEQ byte and the CRC trailer.
    pub fn payload(&self) -> &[u8] {
        &self.buf[2..self.len - 3]
    }
}

fn bump_sequence(seq: u8) -> u8 {
    DEST_TAG | (seq.wrapping_add(1) & 0x0F)
}

enum Snapshot {
    NeedMoreBytes,
    Invalid { first_byte: u8 },
    Valid { buf: [u8; MAX_FRAME], len: usize, seq: u8 },
}

/// Owns `next_sequence` and `sync_state` (§3 "Mutable core state") and
/// implements the reception/transmission state machine of §4.3.
pub struct FrameLayer {
    next_sequence: u8,
    sync_state: SyncState,
}

impl FrameLayer {
    pub const fn new() -> Self {
        Self {
            next_sequence: DEST_TAG,
            sync_state: SyncState::new(),
        }
    }

    pub fn next_sequence(&self) -> u8 {
        self.next_sequence
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    /// §4.3.1. Returns `Some(frame)` exactly when a new, in-order frame
    /// was accepted; the caller is responsible for popping
    /// `frame.frame_len()` bytes from the transport once it has finished
    /// with the frame (§4.5 step 4).
    pub fn try_read_frame(&mut self, transport: &mut impl Transport) -> Option<ReceivedFrame> {
        if self.sync_state.need_sync {
            self.resync(transport);
            return None;
        }

        let snapshot = {
            let input = transport.input_peek();
            if input.len() < MIN_FRAME {
                Snapshot::NeedMoreBytes
            } else {
                let msglen = input[0] as usize;
                if !(MIN_FRAME..=MAX_FRAME).contains(&msglen) {
                    Snapshot::Invalid { first_byte: input[0] }
                } else if input[1] & 0xF0 != DEST_TAG {
                    Snapshot::Invalid { first_byte: input[0] }
                } else if input.len() < msglen {
                    Snapshot::NeedMoreBytes
                } else if input[msglen - 1] != SYNC_BYTE {
                    Snapshot::Invalid { first_byte: input[0] }
                } else {
                    let computed = crc16(&input[..msglen - 3]);
                    let wire = u16::from_be_bytes([input[msglen - 3], input[msglen - 2]]);
                    if computed != wire {
                        Snapshot::Invalid { first_byte: input[0] }
                    } else {
                        let mut buf = [0u8; MAX_FRAME];
                        buf[..msglen].copy_from_slice(&input[..msglen]);
                        Snapshot::Valid {
                            buf,
                            len: msglen,
                            seq: input[1],
                        }
                    }
                }
            }
        };

        match snapshot {
            Snapshot::NeedMoreBytes => None,
            Snapshot::Invalid { first_byte } => {
                self.enter_fail(transport, first_byte);
                None
            }
            Snapshot::Valid { buf, len, seq } => {
                self.sync_state.need_valid = false;
                if seq == self.next_sequence {
                    self.next_sequence = bump_sequence(seq);
                    self.send_empty_frame(transport);
                    Some(ReceivedFrame { buf, len })
                } else {
                    defmt::warn!(
                        "frame: out-of-sequence seq={=u8:#04x} expected={=u8:#04x}, discarding",
                        seq,
                        self.next_sequence
                    );
                    transport.input_pop(len);
                    self.send_empty_frame(transport);
                    None
                }
            }
        }
    }

    /// Pops the bytes of a frame previously returned by
    /// `try_read_frame`, once the caller has finished dispatching it.
    pub fn pop_frame(&mut self, transport: &mut impl Transport, frame: &ReceivedFrame) {
        transport.input_pop(frame.frame_len());
    }

    fn enter_fail(&mut self, transport: &mut impl Transport, first_byte: u8) {
        if first_byte == SYNC_BYTE {
            // A lone leading sync byte (often the trailer of the previous
            // frame) — swallow it quietly, no NAK storm (§4.3.1 fail path).
            transport.input_pop(1);
            return;
        }
        self.sync_state.need_sync = true;
        self.resync(transport);
    }

    fn resync(&mut self, transport: &mut impl Transport) {
        let found = {
            let input = transport.input_peek();
            input.iter().position(|&b| b == SYNC_BYTE)
        };
        match found {
            Some(idx) => {
                transport.input_pop(idx + 1);
                self.sync_state.need_sync = false;
            }
            None => {
                let remaining = transport.input_peek().len();
                transport.input_pop(remaining);
            }
        }
        if !self.sync_state.need_valid {
            self.sync_state.need_valid = true;
            defmt::warn!("frame: resync, emitting single NAK");
            self.send_empty_frame(transport);
        }
    }

    /// Empty-payload ACK/NAK frame (§4.3.2): the distinction is carried
    /// entirely by the `SEQ` byte value, which is always `next_sequence`
    /// at the moment of the call.
    fn send_empty_frame(&mut self, transport: &mut impl Transport) {
        let Some(buf) = transport.output_reserve(MIN_FRAME) else {
            return;
        };
        buf[0] = MIN_FRAME as u8;
        buf[1] = self.next_sequence;
        let crc = crc16(&buf[0..2]);
        buf[2] = (crc >> 8) as u8;
        buf[3] = crc as u8;
        buf[4] = SYNC_BYTE;
        transport.output_commit(MIN_FRAME);
    }

    /// §4.3.2: builds and sends one command frame. `entry.max_size`
    /// bounds the encoded parameter bytes (the `msg_id` byte and the 5
    /// bytes of framing overhead are accounted for separately);
    /// back-pressure on the transport is handled by silently dropping
    /// the send (the host will retransmit on ACK timeout). Returns
    /// whether the frame was sent.
    pub fn encode_and_send(
        &mut self,
        transport: &mut impl Transport,
        entry: &EncoderEntry,
        args: &[EncodeArg],
        shutdown: &impl ShutdownState,
    ) -> bool {
        // header(2) + msg_id(1) + params(max_size) + crc(2) + sync(1)
        let reserve_len = entry.max_size + 6;
        let Some(buf) = transport.output_reserve(reserve_len) else {
            defmt::warn!("frame: output full, dropping encoder_id {=u8}", entry.msg_id);
            return false;
        };
        buf[2] = entry.msg_id;
        let params_len = codec::encode(&mut buf[3..], 0, entry, args, shutdown);
        let payload_end = 3 + params_len;
        let msglen = payload_end + 3;
        buf[0] = msglen as u8;
        buf[1] = self.next_sequence;
        let crc = crc16(&buf[0..payload_end]);
        buf[payload_end] = (crc >> 8) as u8;
        buf[payload_end + 1] = crc as u8;
        buf[payload_end + 2] = SYNC_BYTE;
        transport.output_commit(msglen);
        true
    }
}

impl Default for FrameLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::schema::ArgType;
    use crate::shutdown::Shutdown;
    use crate::transport::RingTransport;

    fn build_frame(seq: u8, payload: &[u8]) -> heapless::Vec<u8, MAX_FRAME> {
        let mut out = heapless::Vec::<u8, MAX_FRAME>::new();
        let msglen = (payload.len() + 5) as u8;
        out.push(msglen).unwrap();
        out.push(seq).unwrap();
        for &b in payload {
            out.push(b).unwrap();
        }
        let crc = crc16(&out);
        out.push((crc >> 8) as u8).unwrap();
        out.push(crc as u8).unwrap();
        out.push(SYNC_BYTE).unwrap();
        out
    }

    #[test]
    fn round_trip_various_payloads_and_sequences() {
        for seq_n in 0u8..16 {
            for len in [0usize, 1, 10, 30, 59] {
                let payload: heapless::Vec<u8, 59> = (0..len).map(|i| i as u8).collect();
                let frame = build_frame(DEST_TAG | seq_n, &payload);
                let mut transport: RingTransport<128> = RingTransport::new();
                transport.feed_input(&frame);
                let mut layer = FrameLayer::new();
                layer.next_sequence = DEST_TAG | seq_n;
                let received = layer.try_read_frame(&mut transport).expect("frame accepted");
                assert_eq!(received.seq(), DEST_TAG | seq_n);
                assert_eq!(received.payload(), &payload[..]);
            }
        }
    }

    #[test]
    fn empty_payload_frame_is_five_bytes_and_round_trips() {
        let frame = build_frame(DEST_TAG, &[]);
        assert_eq!(frame.len(), 5);
        let mut transport: RingTransport<32> = RingTransport::new();
        transport.feed_input(&frame);
        let mut layer = FrameLayer::new();
        let received = layer.try_read_frame(&mut transport).unwrap();
        assert_eq!(received.payload().len(), 0);
    }

    #[test]
    fn frame_of_64_bytes_accepted_65_rejected() {
        let payload = [0u8; 59]; // 59 + 5 overhead = 64
        let frame = build_frame(DEST_TAG, &payload);
        assert_eq!(frame.len(), 64);
        let mut transport: RingTransport<128> = RingTransport::new();
        transport.feed_input(&frame);
        let mut layer = FrameLayer::new();
        assert!(layer.try_read_frame(&mut transport).is_some());

        // A 65-byte frame has a LEN byte of 65, which fails the bounds
        // check outright (never reaches the CRC/sync check).
        let mut oversized: heapless::Vec<u8, 65> = heapless::Vec::new();
        oversized.push(65).unwrap();
        oversized.push(DEST_TAG).unwrap();
        for _ in 0..62 {
            oversized.push(0).unwrap();
        }
        let mut transport: RingTransport<128> = RingTransport::new();
        transport.feed_input(&oversized);
        let mut layer = FrameLayer::new();
        assert!(layer.try_read_frame(&mut transport).is_none());
        assert!(layer.sync_state().need_sync);
    }

    #[test]
    fn scenario_1_happy_path_ack() {
        let frame = build_frame(DEST_TAG, &[]);
        let mut transport: RingTransport<32> = RingTransport::new();
        transport.feed_input(&frame);
        let mut layer = FrameLayer::new();
        assert_eq!(layer.next_sequence(), DEST_TAG);
        let received = layer.try_read_frame(&mut transport).unwrap();
        layer.pop_frame(&mut transport, &received);
        assert_eq!(layer.next_sequence(), DEST_TAG | 0x01);

        let mut ack = [0u8; 8];
        let n = transport.drain_output(&mut ack);
        assert_eq!(n, 5);
        assert_eq!(ack[1], DEST_TAG | 0x01);
    }

    #[test]
    fn scenario_2_bad_crc_emits_single_nak() {
        let mut frame = build_frame(DEST_TAG, &[]);
        frame[2] ^= 0xFF; // corrupt CRC high byte
        let mut transport: RingTransport<32> = RingTransport::new();
        transport.feed_input(&frame);
        let mut layer = FrameLayer::new();
        assert!(layer.try_read_frame(&mut transport).is_none());
        assert!(layer.sync_state().need_valid);

        let mut nak = [0u8; 8];
        let n = transport.drain_output(&mut nak);
        assert_eq!(n, 5);
        assert_eq!(nak[1], DEST_TAG); // unchanged expected sequence

        // A second poll while still resyncing must not emit a second NAK.
        let before = n;
        let _ = layer.try_read_frame(&mut transport);
        let n2 = transport.drain_output(&mut nak);
        assert_eq!(n2, 0, "latched NEED_VALID must suppress a second NAK ({before} bytes already sent)");
    }

    #[test]
    fn scenario_3_out_of_sequence_discards_and_naks() {
        let frame = build_frame(DEST_TAG, &[]); // seq 0, but device expects seq 1
        let mut transport: RingTransport<32> = RingTransport::new();
        transport.feed_input(&frame);
        let mut layer = FrameLayer::new();
        layer.next_sequence = DEST_TAG | 0x01;
        assert!(layer.try_read_frame(&mut transport).is_none());
        assert_eq!(layer.next_sequence(), DEST_TAG | 0x01, "unchanged on discard");
        assert!(transport.input_peek().is_empty(), "frame must be popped");

        let mut nak = [0u8; 8];
        let n = transport.drain_output(&mut nak);
        assert_eq!(n, 5);
        assert_eq!(nak[1], DEST_TAG | 0x01);
    }

    #[test]
    fn scenario_5_resync_then_next_frame_parses_cleanly() {
        let mut transport: RingTransport<32> = RingTransport::new();
        // 0xFF is an invalid LEN; the 0x7E right after it is the
        // resync target, landing exactly at the start of a good frame.
        transport.feed_input(&[0xFF, 0x7E]);
        let good = build_frame(DEST_TAG, &[]);
        transport.feed_input(&good);

        let mut layer = FrameLayer::new();
        assert!(layer.try_read_frame(&mut transport).is_none());
        assert!(!layer.sync_state().need_sync, "resync found the sync byte within this call");
        assert!(layer.sync_state().need_valid);

        // Drains exactly one NAK, emitted once on entering resync.
        let mut out = [0u8; 8];
        assert_eq!(transport.drain_output(&mut out), 5);

        // Second poll: realigned, the good frame parses and ACKs.
        let received = layer.try_read_frame(&mut transport).expect("frame after resync");
        assert_eq!(received.payload().len(), 0);
        assert_eq!(transport.drain_output(&mut out), 5);
    }

    #[test]
    fn at_most_one_nak_per_contiguous_invalid_run() {
        let mut transport: RingTransport<64> = RingTransport::new();
        // 8 bytes of garbage with no sync byte anywhere.
        transport.feed_input(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        let mut layer = FrameLayer::new();
        for _ in 0..5 {
            let _ = layer.try_read_frame(&mut transport);
        }
        assert!(layer.sync_state().need_sync, "sync byte never found");
        let mut out = [0u8; 32];
        let n = transport.drain_output(&mut out);
        assert_eq!(n, 5, "exactly one NAK frame regardless of poll count");
    }

    #[test]
    fn encode_and_send_builds_valid_frame() {
        let entry = EncoderEntry::new(9, &[ArgType::Uint32], 8);
        let shutdown = Shutdown::new();
        let mut transport: RingTransport<32> = RingTransport::new();
        let mut layer = FrameLayer::new();
        assert!(layer.encode_and_send(
            &mut transport,
            &entry,
            &[EncodeArg::Int(42)],
            &shutdown
        ));
        let mut out = [0u8; 16];
        let n = transport.drain_output(&mut out);
        // header(2) + msg_id(1) + vlq(1) + crc(2) + sync(1) = 7
        assert_eq!(n, 7);
        assert_eq!(out[0], 7);
        assert_eq!(out[1], DEST_TAG);
        assert_eq!(out[2], 9); // msg_id
        assert_eq!(out[3], 0x2A); // vlq(42)
        assert_eq!(out[6], SYNC_BYTE);
        let crc = crc16(&out[..4]);
        assert_eq!(u16::from_be_bytes([out[4], out[5]]), crc);
    }

    #[test]
    fn encode_and_send_drops_silently_when_transport_full() {
        let entry = EncoderEntry::new(9, &[ArgType::Uint32], 8);
        let shutdown = Shutdown::new();
        let mut transport: RingTransport<4> = RingTransport::new(); // too small
        let mut layer = FrameLayer::new();
        assert!(!layer.encode_and_send(
            &mut transport,
            &entry,
            &[EncodeArg::Int(42)],
            &shutdown
        ));
    }
}
