//! HAP pairing state machines
//!
//! Two exchanges share this module: pair-setup (M1..M6, run once per
//! accessory, needs the setup code) and pair-verify (M1..M4, run for every
//! connection, needs the stored long-term keys). Both are sans-IO: each
//! `process_mN` consumes one received TLV body and returns the next body
//! to send, so callers own the transport and the timeout policy.

pub mod setup;
pub mod store;
pub mod verify;

#[cfg(test)]
mod tests;

pub use setup::{PairSetup, PairSetupResult};
pub use verify::PairVerify;

use crate::error::HapError;
use crate::tlv::Tlv8Reader;

/// Position of a handshake in its exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    /// Nothing sent yet
    Init,
    /// M1 sent, waiting for M2
    SentStart,
    /// M3 sent, waiting for M4
    SentProof,
    /// M5/M3 sent, waiting for the final message
    SentExchange,
    /// Handshake complete
    Complete,
    /// Handshake aborted; the machine cannot be reused
    Failed,
}

/// Symmetric keys for one established session
///
/// Derived by pair-verify M4. Fresh per connection; the nonce counters that
/// accompany them live in [`crate::session::SecureSession`] and start at
/// zero in both directions.
#[derive(Clone)]
pub struct SessionKeys {
    /// Controller-to-accessory key
    pub write_key: [u8; 32],
    /// Accessory-to-controller key
    pub read_key: [u8; 32],
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

/// Check a received message for an accessory error code and the expected
/// state tag. Shared by both exchanges.
fn expect_state(tlv: &Tlv8Reader, expected: u8) -> Result<(), HapError> {
    if let Some(code) = tlv.get_error() {
        return Err(HapError::AccessoryError { code });
    }

    let state = tlv.get_state()?;
    if state != expected {
        return Err(HapError::InvalidState {
            expected: format!("M{expected}"),
            actual: format!("M{state}"),
        });
    }
    Ok(())
}
