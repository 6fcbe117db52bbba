//! Error taxonomy for the bus, the ledger and device setup.

use thiserror::Error;

/// Link and protocol level errors raised by the transport and the frame codec.
///
/// None of these are fatal: the offending frame is dropped and the VMC's own
/// timeout/retry recovers the exchange.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MDBError {
    #[error("no reply within the response window")]
    Timeout,
    #[error("frame checksum mismatch")]
    WrongChecksum,
    #[error("mode bit set unexpectedly inside a frame")]
    MalformedMessage,
    #[error("unknown command or sub-command")]
    UnknownCommand,
    #[error("frame longer than the receive buffer")]
    BufferOverrun,
    #[error("reply was not ACK, NAK or RET")]
    UnexpectedHandshake,
    #[error("uart error")]
    UartError,
}

/// Transaction ledger errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedgerError {
    /// A transaction is still in flight and has not timed out yet
    #[error("a transaction is already in flight")]
    Busy,
    /// The requested status change is not allowed from the current status
    #[error("transaction status {found:#04x} does not allow this operation")]
    OutOfOrder { found: u8 },
    /// The log holds no transaction
    #[error("ledger is empty")]
    Empty,
    /// A header or record failed its checksum
    #[error("ledger checksum mismatch")]
    Corrupt,
    /// The backing store failed or was truncated
    #[error("ledger storage error: {0:?}")]
    Storage(embedded_io::ErrorKind),
}

/// Umbrella error returned by the device level API.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    #[error(transparent)]
    Bus(#[from] MDBError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("member file is malformed")]
    MemberFile,
}
