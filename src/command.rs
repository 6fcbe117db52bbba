//! Cashless device command set (MDB level 1, plus the expansion ID handshake).
//!
//! MDB frames carry no length field, so the receiver has to know how many bytes
//! follow each command and sub-command. The two tables below are the single
//! source for that.

use heapless::Vec;

use crate::MDBError;

pub const RESET: u8 = 0x10;
pub const SETUP_PREFIX: u8 = 0x11;
pub const POLL_CMD: u8 = 0x12;
pub const VEND_PREFIX: u8 = 0x13;
pub const READER_PREFIX: u8 = 0x14;
pub const EXPANSION_PREFIX: u8 = 0x17;

pub const SETUP_CONFIG_DATA: u8 = 0x00;
pub const SETUP_MAX_MIN_PRICES: u8 = 0x01;

pub const VEND_REQUEST: u8 = 0x00;
pub const VEND_CANCEL: u8 = 0x01;
pub const VEND_SUCCESS: u8 = 0x02;
pub const VEND_FAILURE: u8 = 0x03;
pub const VEND_SESSION_COMPLETE: u8 = 0x04;
pub const VEND_CASH_SALE: u8 = 0x05;

pub const READER_DISABLE: u8 = 0x00;
pub const READER_ENABLE: u8 = 0x01;
pub const READER_CANCEL: u8 = 0x02;

pub const EXPANSION_REQUEST_ID: u8 = 0x00;

/// Largest data block following a sub-command (EXPANSION / REQUEST ID)
pub const MAX_DATA: usize = 29;
/// Address+command, sub-command, data and checksum
pub const MAX_FRAME: usize = MAX_DATA + 3;

/// First stage: sub-command bytes following each command
const COMMAND_LENGTHS: [(u8, usize); 6] = [
    (RESET, 0),
    (SETUP_PREFIX, 1),
    (POLL_CMD, 0),
    (VEND_PREFIX, 1),
    (READER_PREFIX, 1),
    (EXPANSION_PREFIX, 1),
];

/// Second stage: data bytes following each (command, sub-command) pair
const DATA_LENGTHS: [(u8, Option<u8>, usize); 14] = [
    (RESET, None, 0),
    (SETUP_PREFIX, Some(SETUP_CONFIG_DATA), 4),
    (SETUP_PREFIX, Some(SETUP_MAX_MIN_PRICES), 4),
    (POLL_CMD, None, 0),
    (VEND_PREFIX, Some(VEND_REQUEST), 4),
    (VEND_PREFIX, Some(VEND_CANCEL), 0),
    (VEND_PREFIX, Some(VEND_SUCCESS), 2),
    (VEND_PREFIX, Some(VEND_FAILURE), 0),
    (VEND_PREFIX, Some(VEND_SESSION_COMPLETE), 0),
    (VEND_PREFIX, Some(VEND_CASH_SALE), 4),
    (READER_PREFIX, Some(READER_DISABLE), 0),
    (READER_PREFIX, Some(READER_ENABLE), 0),
    (READER_PREFIX, Some(READER_CANCEL), 0),
    (EXPANSION_PREFIX, Some(EXPANSION_REQUEST_ID), 29),
];

/// Number of sub-command bytes (0 or 1) that follow `command`
pub fn subcommand_len(command: u8) -> Result<usize, MDBError> {
    COMMAND_LENGTHS
        .iter()
        .find(|(cmd, _)| *cmd == command)
        .map(|(_, len)| *len)
        .ok_or(MDBError::UnknownCommand)
}

/// Number of data bytes that follow the (command, sub-command) pair
pub fn data_len(command: u8, subcommand: Option<u8>) -> Result<usize, MDBError> {
    DATA_LENGTHS
        .iter()
        .find(|(cmd, sub, _)| *cmd == command && *sub == subcommand)
        .map(|(_, _, len)| *len)
        .ok_or(MDBError::UnknownCommand)
}

/// Every (command, sub-command) pair this device understands
pub fn supported() -> impl Iterator<Item = (u8, Option<u8>)> {
    DATA_LENGTHS.iter().map(|(cmd, sub, _)| (*cmd, *sub))
}

/// One command frame as received from the VMC. `command` is normalised to the
/// cashless #1 codes above whatever address the device answers on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub subcommand: Option<u8>,
    pub data: Vec<u8, MAX_DATA>,
}

impl Frame {
    /// Wire image: address+command, sub-command, data, checksum
    pub fn encode(&self, address: u8) -> Vec<u8, MAX_FRAME> {
        let mut out: Vec<u8, MAX_FRAME> = Vec::new();
        let _ = out.push(address | (self.command & 0x07));
        if let Some(sub) = self.subcommand {
            let _ = out.push(sub);
        }
        let _ = out.extend_from_slice(&self.data);
        let chk = out.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        let _ = out.push(chk);
        out
    }
}

/// VMC setup data sent with SETUP / CONFIG DATA
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VmcSetup {
    pub level: u8,
    pub columns_on_display: u8,
    pub rows_on_display: u8,
    pub display_info: u8,
    pub max_price: u16,
    pub min_price: u16,
}

impl VmcSetup {
    /// Characters the VMC display can show, capped at 32
    pub fn display_capacity(&self) -> usize {
        let size = usize::from(self.rows_on_display) * usize::from(self.columns_on_display);
        size.min(32)
    }
}

/// VMC identification carried by EXPANSION / REQUEST ID
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VmcIdentity {
    pub manufacturer_code: [u8; 3],
    pub serial_number: [u8; 12],
    pub model_number: [u8; 12],
    pub software_version: u16,
}

/// A decoded command
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Request {
    Reset,
    SetupConfig {
        level: u8,
        columns: u8,
        rows: u8,
        display_info: u8,
    },
    SetupPrices {
        max_price: u16,
        min_price: u16,
    },
    Poll,
    VendRequest {
        price: u16,
        item: u16,
    },
    VendCancel,
    VendSuccess {
        item: u16,
    },
    VendFailure,
    VendComplete,
    VendCashSale {
        price: u16,
        item: u16,
    },
    ReaderDisable,
    ReaderEnable,
    ReaderCancel,
    ExpansionId(VmcIdentity),
}

fn be16(bytes: &[u8], at: usize) -> Result<u16, MDBError> {
    match bytes.get(at..at + 2) {
        Some(&[hi, lo]) => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err(MDBError::MalformedMessage),
    }
}

fn byte(bytes: &[u8], at: usize) -> Result<u8, MDBError> {
    bytes.get(at).copied().ok_or(MDBError::MalformedMessage)
}

impl TryFrom<&Frame> for Request {
    type Error = MDBError;

    fn try_from(frame: &Frame) -> Result<Self, Self::Error> {
        let d = frame.data.as_slice();
        match (frame.command, frame.subcommand) {
            (RESET, None) => Ok(Request::Reset),
            (SETUP_PREFIX, Some(SETUP_CONFIG_DATA)) => Ok(Request::SetupConfig {
                level: byte(d, 0)?,
                columns: byte(d, 1)?,
                rows: byte(d, 2)?,
                display_info: byte(d, 3)?,
            }),
            (SETUP_PREFIX, Some(SETUP_MAX_MIN_PRICES)) => Ok(Request::SetupPrices {
                max_price: be16(d, 0)?,
                min_price: be16(d, 2)?,
            }),
            (POLL_CMD, None) => Ok(Request::Poll),
            (VEND_PREFIX, Some(VEND_REQUEST)) => Ok(Request::VendRequest {
                price: be16(d, 0)?,
                item: be16(d, 2)?,
            }),
            (VEND_PREFIX, Some(VEND_CANCEL)) => Ok(Request::VendCancel),
            (VEND_PREFIX, Some(VEND_SUCCESS)) => Ok(Request::VendSuccess { item: be16(d, 0)? }),
            (VEND_PREFIX, Some(VEND_FAILURE)) => Ok(Request::VendFailure),
            (VEND_PREFIX, Some(VEND_SESSION_COMPLETE)) => Ok(Request::VendComplete),
            (VEND_PREFIX, Some(VEND_CASH_SALE)) => Ok(Request::VendCashSale {
                price: be16(d, 0)?,
                item: be16(d, 2)?,
            }),
            (READER_PREFIX, Some(READER_DISABLE)) => Ok(Request::ReaderDisable),
            (READER_PREFIX, Some(READER_ENABLE)) => Ok(Request::ReaderEnable),
            (READER_PREFIX, Some(READER_CANCEL)) => Ok(Request::ReaderCancel),
            (EXPANSION_PREFIX, Some(EXPANSION_REQUEST_ID)) => {
                if d.len() < MAX_DATA {
                    return Err(MDBError::MalformedMessage);
                }
                let mut id = VmcIdentity {
                    manufacturer_code: [0; 3],
                    serial_number: [0; 12],
                    model_number: [0; 12],
                    software_version: be16(d, 27)?,
                };
                id.manufacturer_code.copy_from_slice(&d[0..3]);
                id.serial_number.copy_from_slice(&d[3..15]);
                id.model_number.copy_from_slice(&d[15..27]);
                Ok(Request::ExpansionId(id))
            }
            _ => Err(MDBError::UnknownCommand),
        }
    }
}

impl Request {
    /// Encode back into a frame, the inverse of `TryFrom<&Frame>`
    pub fn to_frame(&self) -> Frame {
        let mut data: Vec<u8, MAX_DATA> = Vec::new();
        let (command, subcommand) = match *self {
            Request::Reset => (RESET, None),
            Request::SetupConfig {
                level,
                columns,
                rows,
                display_info,
            } => {
                let _ = data.extend_from_slice(&[level, columns, rows, display_info]);
                (SETUP_PREFIX, Some(SETUP_CONFIG_DATA))
            }
            Request::SetupPrices {
                max_price,
                min_price,
            } => {
                let _ = data.extend_from_slice(&max_price.to_be_bytes());
                let _ = data.extend_from_slice(&min_price.to_be_bytes());
                (SETUP_PREFIX, Some(SETUP_MAX_MIN_PRICES))
            }
            Request::Poll => (POLL_CMD, None),
            Request::VendRequest { price, item } => {
                let _ = data.extend_from_slice(&price.to_be_bytes());
                let _ = data.extend_from_slice(&item.to_be_bytes());
                (VEND_PREFIX, Some(VEND_REQUEST))
            }
            Request::VendCancel => (VEND_PREFIX, Some(VEND_CANCEL)),
            Request::VendSuccess { item } => {
                let _ = data.extend_from_slice(&item.to_be_bytes());
                (VEND_PREFIX, Some(VEND_SUCCESS))
            }
            Request::VendFailure => (VEND_PREFIX, Some(VEND_FAILURE)),
            Request::VendComplete => (VEND_PREFIX, Some(VEND_SESSION_COMPLETE)),
            Request::VendCashSale { price, item } => {
                let _ = data.extend_from_slice(&price.to_be_bytes());
                let _ = data.extend_from_slice(&item.to_be_bytes());
                (VEND_PREFIX, Some(VEND_CASH_SALE))
            }
            Request::ReaderDisable => (READER_PREFIX, Some(READER_DISABLE)),
            Request::ReaderEnable => (READER_PREFIX, Some(READER_ENABLE)),
            Request::ReaderCancel => (READER_PREFIX, Some(READER_CANCEL)),
            Request::ExpansionId(id) => {
                let _ = data.extend_from_slice(&id.manufacturer_code);
                let _ = data.extend_from_slice(&id.serial_number);
                let _ = data.extend_from_slice(&id.model_number);
                let _ = data.extend_from_slice(&id.software_version.to_be_bytes());
                (EXPANSION_PREFIX, Some(EXPANSION_REQUEST_ID))
            }
        };
        Frame {
            command,
            subcommand,
            data,
        }
    }
}
