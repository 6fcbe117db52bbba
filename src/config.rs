use embassy_time::Duration;
use fixedstr::str16;

/// Peripheral address of a cashless device #1 on the bus
pub const CASHLESS_ADDRESS: u8 = 0x10;

/// EUR as ISO 4217 numeric, BCD packed, prefixed with 1
pub const CURRENCY_EUR: u16 = 0x1978;

/// How the terminal reports itself to the VMC in the Reader Config Info answer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReaderConfig {
    pub feature_level: u8,
    pub country_code: u16,
    pub scale_factor: u8,
    pub decimal_places: u8,
    /// Seconds
    pub max_response_time: u8,
    pub option_flags: u8,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            feature_level: 0x01,
            country_code: CURRENCY_EUR,
            scale_factor: 1,
            decimal_places: 2,
            max_response_time: 5,
            //No restoring funds, no multivend, no display, no cash sale
            option_flags: 0x00,
        }
    }
}

/// Identity answered to EXPANSION / REQUEST ID
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub manufacturer_code: [u8; 3],
    pub serial_number: u64,
    pub model_number: u64,
    pub software_version: [u8; 2],
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            manufacturer_code: *b"FGH",
            serial_number: 9_051_993,
            model_number: 11_235_812,
            software_version: [0x01, 0x00],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Bus address; only the five high bits are compared
    pub address: u8,
    /// Reset line must stay asserted this long before the transport reinitialises
    pub reset_hold: Duration,
    /// Window for the VMC's ACK/NAK/RET after we send a frame
    pub ack_window: Duration,
    /// Poll interval while waiting for a byte
    pub read_poll: Duration,
    /// A warning is logged each time a byte wait exceeds this
    pub read_warn_after: Duration,
    /// In-flight transactions older than this (seconds) are timed out on the next request
    pub transaction_timeout: u32,
    /// Display time for maintenance messages, tenths of a second
    pub display_time: u8,
    pub reader: ReaderConfig,
    pub identity: Identity,
    /// Written into a fresh ledger header
    pub ledger_version: u32,
    /// Shown in the log banner
    pub name: str16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: CASHLESS_ADDRESS,
            reset_hold: Duration::from_millis(100),
            ack_window: Duration::from_millis(5),
            read_poll: Duration::from_micros(100),
            read_warn_after: Duration::from_millis(2),
            transaction_timeout: 20,
            display_time: 10,
            reader: ReaderConfig::default(),
            identity: Identity::default(),
            ledger_version: 1,
            name: str16::from("cashless-term"),
        }
    }
}
