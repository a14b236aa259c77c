//! Shutdown subsystem contract (§6).
//!
//! The core never decides *whether* to keep running past a schema
//! violation — it always calls [`ShutdownState::shutdown`], which does not
//! return. What that call does (halt, reset, log and loop) is up to the
//! implementation; [`Shutdown`] is the one used by the firmware binary.

/// Numeric reason ids reported by `shutdown_reason()`. The wire contract
/// only carries a `u16`; the human-readable string passed to `shutdown()`
/// is for the log line, not for the host.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ShutdownReason {
    None = 0,
    InvalidCommand = 1,
    CommandParserError = 2,
    MessageEncodeError = 3,
    HostRequested = 4,
    Other = 0xFFFF,
}

impl ShutdownReason {
    fn from_message(msg: &str) -> Self {
        match msg {
            "Invalid command" => ShutdownReason::InvalidCommand,
            "Command parser error" => ShutdownReason::CommandParserError,
            "Message encode error" => ShutdownReason::MessageEncodeError,
            "Host requested" => ShutdownReason::HostRequested,
            _ => ShutdownReason::Other,
        }
    }
}

/// Narrow interface the protocol core consumes (§6 "Shutdown contract").
///
/// Kept as a trait so host tests can swap in a non-halting implementation;
/// the firmware binary uses the process-wide [`Shutdown`] below.
pub trait ShutdownState {
    fn is_shutdown(&self) -> bool;
    fn shutdown_reason(&self) -> u16;
    fn shutdown(&self, reason: &str) -> !;
}

/// Process-wide shutdown flag plus reason code (§3 "Mutable core state").
pub struct Shutdown {
    active: core::sync::atomic::AtomicBool,
    reason: core::sync::atomic::AtomicU16,
}

impl Shutdown {
    pub const fn new() -> Self {
        Self {
            active: core::sync::atomic::AtomicBool::new(false),
            reason: core::sync::atomic::AtomicU16::new(ShutdownReason::None as u16),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Shutdown {
    /// Test-only: force the shutdown flag without going through
    /// `shutdown()` (which never returns).
    pub fn active_for_test(&self) {
        self.active
            .store(true, core::sync::atomic::Ordering::Release);
    }
}

impl ShutdownState for Shutdown {
    fn is_shutdown(&self) -> bool {
        self.active.load(core::sync::atomic::Ordering::Acquire)
    }

    fn shutdown_reason(&self) -> u16 {
        self.reason.load(core::sync::atomic::Ordering::Acquire)
    }

    fn shutdown(&self, reason: &str) -> ! {
        let code = ShutdownReason::from_message(reason);
        defmt::error!("firmware shutdown: {} ({=u16})", reason, code as u16);
        self.reason
            .store(code as u16, core::sync::atomic::Ordering::Release);
        self.active
            .store(true, core::sync::atomic::Ordering::Release);
        loop {
            core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
        }
    }
}

/// Test-only [`ShutdownState`] that panics instead of halting, so a fatal
/// path can be asserted with `#[should_panic]` instead of hanging the test
/// runner forever.
#[cfg(test)]
pub struct PanicOnShutdown {
    pub shutdown_active: core::cell::Cell<bool>,
    pub reason: core::cell::Cell<u16>,
}

#[cfg(test)]
impl PanicOnShutdown {
    pub fn new() -> Self {
        Self {
            shutdown_active: core::cell::Cell::new(false),
            reason: core::cell::Cell::new(0),
        }
    }

    pub fn set_active(&self, reason: u16) {
        self.shutdown_active.set(true);
        self.reason.set(reason);
    }
}

#[cfg(test)]
impl ShutdownState for PanicOnShutdown {
    fn is_shutdown(&self) -> bool {
        self.shutdown_active.get()
    }

    fn shutdown_reason(&self) -> u16 {
        self.reason.get()
    }

    fn shutdown(&self, reason: &str) -> ! {
        panic!("shutdown triggered: {reason}");
    }
}
