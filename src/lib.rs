#![cfg_attr(not(test), no_std)]
//! Cashless peripheral for the MDB (MultiDrop Bus) used by vending machines.
//!
//! The crate answers a vending machine controller as cashless device #1,
//! authorises vends for RFID member cards and keeps an append-only,
//! checksummed transaction log that survives power loss.
//!
//! Hardware is reached through `embedded-io-async` (UART, ledger file) and
//! `embedded-hal` (reset line, LED, DIP switches); the RFID reader, RTC and
//! member list are traits implemented by the firmware.

// This mod MUST go first, so that the others see its macros.
mod fmt;

pub mod answer;
pub mod cashless_device;
pub mod checksum;
pub mod clock;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod ledger;
pub mod member;
pub mod periphery;
pub mod service_mode;
pub mod time_service_mode;
pub mod transport;

pub use cashless_device::{CardReader, CashlessDevice, Guards, State};
pub use config::Config;
pub use error::{Error, LedgerError, MDBError};
pub use ledger::{Ledger, Transaction, TransactionStatus};
pub use member::{Member, MemberDirectory, MemberTable};
pub use transport::Mdb;

/// Single byte handshakes exchanged after a data block
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MDBStatus {
    ACK = 0x00,
    NAK = 0xFF,
    RET = 0xAA,
}

impl TryFrom<u8> for MDBStatus {
    type Error = MDBError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x00 => Ok(MDBStatus::ACK),
            0xFF => Ok(MDBStatus::NAK),
            0xAA => Ok(MDBStatus::RET),
            _ => Err(MDBError::UnexpectedHandshake),
        }
    }
}
