//! Protocol core: frame sync and sequencing, VLQ and CRC primitives, the
//! schema-driven command codec, and the dispatcher tying them together.

pub mod codec;
pub mod crc16;
pub mod dispatch;
pub mod frame;
pub mod schema;
pub mod vlq;
