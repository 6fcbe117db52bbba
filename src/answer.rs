//! Replies the reader sends back to the VMC. The first byte of every answer is
//! its poll reply code.

use core::fmt::Write as _;

use heapless::{String, Vec};

use crate::command::VmcSetup;
use crate::config::{Identity, ReaderConfig};
use crate::error::MDBError;

pub const POLL_REPLY_JUST_RESET: u8 = 0x00;
pub const POLL_REPLY_READER_CONFIG_DATA: u8 = 0x01;
pub const POLL_REPLY_DISPLAY_REQUEST: u8 = 0x02;
pub const POLL_REPLY_BEGIN_SESSION: u8 = 0x03;
pub const POLL_REPLY_SESSION_CANCEL_REQUEST: u8 = 0x04;
pub const POLL_REPLY_VEND_APPROVED: u8 = 0x05;
pub const POLL_REPLY_VEND_DENIED: u8 = 0x06;
pub const POLL_REPLY_END_SESSION: u8 = 0x07;
pub const POLL_REPLY_CANCELLED: u8 = 0x08;
pub const POLL_REPLY_PERIPHERAL_ID: u8 = 0x09;
pub const POLL_REPLY_MALFUNCTION: u8 = 0x0A;
pub const POLL_REPLY_OUT_OF_SEQUENCE: u8 = 0x0B;

/// Longest answer: display request with a full 32 character message
pub const MAX_ANSWER: usize = 2 + 32;

/// Display text buffer, longer than any VMC display so overlong messages can be detected
pub type DisplayText = String<64>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MalfunctionCode {
    PaymentMedia = 0x00,
    InvalidPaymentMedia = 0x10,
    Tamper = 0x20,
    ManufacturerDefined = 0x30,
    Communications = 0x40,
    RequiresService = 0x50,
    ManufacturerDefinedPersistent = 0x70,
    ReaderFailure = 0x80,
    CommunicationsFatal = 0x90,
    Jammed = 0xA0,
    PersistentFatal = 0xB0,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Answer {
    JustReset,
    ReaderConfigInfo,
    DisplayRequest { time_tenths: u8, message: DisplayText },
    BeginSession,
    SessionCancelRequest,
    /// Price in cents
    VendApproved(u16),
    VendDenied,
    EndSession,
    Cancelled,
    PeripheralId,
    Malfunction { code: MalfunctionCode, sub_code: u8 },
    OutOfSequence,
}

impl Answer {
    pub fn display(time_tenths: u8, message: &str) -> Self {
        let mut text = DisplayText::new();
        for c in message.chars() {
            if text.push(c).is_err() {
                break;
            }
        }
        Answer::DisplayRequest {
            time_tenths,
            message: text,
        }
    }

    /// Serialise into the bytes handed to `send_frame`
    pub fn encode(
        &self,
        vmc: &VmcSetup,
        reader: &ReaderConfig,
        identity: &Identity,
    ) -> Result<Vec<u8, MAX_ANSWER>, MDBError> {
        let mut out: Vec<u8, MAX_ANSWER> = Vec::new();
        match self {
            Answer::JustReset => put(&mut out, &[POLL_REPLY_JUST_RESET])?,
            Answer::ReaderConfigInfo => {
                let currency = reader.country_code.to_be_bytes();
                put(
                    &mut out,
                    &[
                        POLL_REPLY_READER_CONFIG_DATA,
                        reader.feature_level,
                        currency[0],
                        currency[1],
                        reader.scale_factor,
                        reader.decimal_places,
                        reader.max_response_time,
                        reader.option_flags,
                    ],
                )?;
            }
            Answer::DisplayRequest {
                time_tenths,
                message,
            } => {
                let capacity = vmc.display_capacity();
                let bytes = message.as_bytes();
                if bytes.len() > capacity {
                    warn!(
                        "display message of {} bytes exceeds VMC display of {}",
                        bytes.len(),
                        capacity
                    );
                }
                put(&mut out, &[POLL_REPLY_DISPLAY_REQUEST, *time_tenths])?;
                put(&mut out, &bytes[..bytes.len().min(capacity)])?;
            }
            Answer::BeginSession => {
                //Funds available not applicable
                put(&mut out, &[POLL_REPLY_BEGIN_SESSION, 0xFF, 0xFF])?;
            }
            Answer::SessionCancelRequest => put(&mut out, &[POLL_REPLY_SESSION_CANCEL_REQUEST])?,
            Answer::VendApproved(price) => {
                let price = price.to_be_bytes();
                put(&mut out, &[POLL_REPLY_VEND_APPROVED, price[0], price[1]])?;
            }
            Answer::VendDenied => put(&mut out, &[POLL_REPLY_VEND_DENIED])?,
            Answer::EndSession => put(&mut out, &[POLL_REPLY_END_SESSION])?,
            Answer::Cancelled => put(&mut out, &[POLL_REPLY_CANCELLED])?,
            Answer::PeripheralId => {
                let mut digits: String<24> = String::new();
                write!(
                    digits,
                    "{:012}{:012}",
                    identity.serial_number % 1_000_000_000_000,
                    identity.model_number % 1_000_000_000_000
                )
                .map_err(|_| MDBError::BufferOverrun)?;
                put(&mut out, &[POLL_REPLY_PERIPHERAL_ID])?;
                put(&mut out, &identity.manufacturer_code)?;
                put(&mut out, digits.as_bytes())?;
                put(&mut out, &identity.software_version)?;
            }
            Answer::Malfunction { code, sub_code } => {
                put(&mut out, &[POLL_REPLY_MALFUNCTION, *code as u8 | *sub_code])?;
            }
            Answer::OutOfSequence => put(&mut out, &[POLL_REPLY_OUT_OF_SEQUENCE])?,
        }
        Ok(out)
    }
}

fn put(out: &mut Vec<u8, MAX_ANSWER>, bytes: &[u8]) -> Result<(), MDBError> {
    out.extend_from_slice(bytes).map_err(|_| {
        error!("answer of more than {} bytes", MAX_ANSWER);
        MDBError::BufferOverrun
    })
}
