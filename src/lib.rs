#![cfg_attr(not(test), no_std)]

//! Framed command protocol core: frame sync, CRC-16, sequence-numbered
//! ACK/NAK delivery, and a schema-driven command codec.
//!
//! This crate is the part of the firmware that is portable across MCU
//! targets and host tests. The board bring-up, USB/UART transport wiring,
//! and task scheduling live in the firmware binary (`src/main.rs` and
//! friends) and depend on this crate rather than the other way around.

pub mod commands;
pub mod protocol;
pub mod shutdown;
pub mod transport;

pub use protocol::dispatch::CommandCore;
pub use shutdown::Shutdown;
pub use transport::{RingTransport, Transport};
