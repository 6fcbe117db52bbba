//! Append-only transaction log.
//!
//! The log is a 16 byte header followed by fixed size records, each carrying
//! its own checksum:
//!
//! ```text
//! header: version u32 | modified u32 | count u32 | checksum u32
//! record: id u32 | timestamp u32 | member u32 | status u8 | item u8 | cost u32 | discount u16 | checksum u32
//! ```
//!
//! All fields are little-endian. A record is always written before the header
//! that counts it, so a power cut leaves either the old or the new log.

use embedded_io::{Error as _, ReadExactError, SeekFrom};
use embedded_io_async::{Read, Seek, Write};

use crate::checksum::checksum;
use crate::LedgerError;

const HEADER_BODY: usize = 12;
const HEADER_SIZE: usize = HEADER_BODY + 4;
const RECORD_BODY: usize = 20;
const RECORD_SIZE: usize = RECORD_BODY + 4;

/// Status bitmask of a transaction
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransactionStatus(pub u8);

impl TransactionStatus {
    pub const CREATED: Self = Self(0x00);
    pub const APPROVED: Self = Self(0x01);
    pub const COMPLETED: Self = Self(0x02);
    pub const CANCELED: Self = Self(0x10);
    pub const TIMEOUT: Self = Self(0x20);
    pub const CORRUPTED: Self = Self(0x80);

    /// Created or approved, but neither finished nor aborted
    pub fn in_flight(self) -> bool {
        self <= Self::APPROVED
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transaction {
    pub id: u32,
    /// Unix seconds of the last status change that carries a time
    pub timestamp: u32,
    pub member: u32,
    pub status: TransactionStatus,
    pub item: u8,
    /// Cents, after discount
    pub cost: u32,
    /// Cents
    pub discount: u16,
}

impl Transaction {
    fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[0..4].copy_from_slice(&self.id.to_le_bytes());
        out[4..8].copy_from_slice(&self.timestamp.to_le_bytes());
        out[8..12].copy_from_slice(&self.member.to_le_bytes());
        out[12] = self.status.0;
        out[13] = self.item;
        out[14..18].copy_from_slice(&self.cost.to_le_bytes());
        out[18..20].copy_from_slice(&self.discount.to_le_bytes());
        let chk = checksum(&out[..RECORD_BODY]);
        out[RECORD_BODY..].copy_from_slice(&chk.to_le_bytes());
        out
    }

    /// Decode a record, also reporting whether its checksum holds
    fn from_bytes(raw: &[u8; RECORD_SIZE]) -> (Self, bool) {
        let tx = Transaction {
            id: le32(raw, 0),
            timestamp: le32(raw, 4),
            member: le32(raw, 8),
            status: TransactionStatus(raw[12]),
            item: raw[13],
            cost: le32(raw, 14),
            discount: u16::from_le_bytes([raw[18], raw[19]]),
        };
        let valid = checksum(&raw[..RECORD_BODY]) == le32(raw, RECORD_BODY);
        (tx, valid)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LedgerHeader {
    pub version: u32,
    pub modified: u32,
    pub entry_count: u32,
}

impl LedgerHeader {
    fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..8].copy_from_slice(&self.modified.to_le_bytes());
        out[8..12].copy_from_slice(&self.entry_count.to_le_bytes());
        let chk = checksum(&out[..HEADER_BODY]);
        out[HEADER_BODY..].copy_from_slice(&chk.to_le_bytes());
        out
    }

    fn from_bytes(raw: &[u8; HEADER_SIZE]) -> Option<Self> {
        if checksum(&raw[..HEADER_BODY]) != le32(raw, HEADER_BODY) {
            return None;
        }
        Some(Self {
            version: le32(raw, 0),
            modified: le32(raw, 4),
            entry_count: le32(raw, 8),
        })
    }
}

fn le32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn record_offset(index: u32) -> u64 {
    HEADER_SIZE as u64 + RECORD_SIZE as u64 * u64::from(index)
}

fn storage_error<E: embedded_io::Error>(e: E) -> LedgerError {
    let kind = e.kind();
    error!("ledger storage error {:?}", kind);
    LedgerError::Storage(kind)
}

fn read_error<E: embedded_io::Error>(e: ReadExactError<E>) -> LedgerError {
    match e {
        ReadExactError::UnexpectedEof => {
            error!("ledger file truncated");
            LedgerError::Storage(embedded_io::ErrorKind::InvalidData)
        }
        ReadExactError::Other(e) => storage_error(e),
    }
}

pub struct Ledger<S> {
    storage: S,
    header: LedgerHeader,
}

impl<S: Read + Write + Seek> Ledger<S> {
    /// Open the log kept in `storage`, starting a fresh one if it is empty
    pub async fn open(mut storage: S, version: u32) -> Result<Self, LedgerError> {
        let len = storage.seek(SeekFrom::End(0)).await.map_err(storage_error)?;

        if len == 0 {
            info!("empty ledger, writing header version {}", version);
            let mut ledger = Self {
                storage,
                header: LedgerHeader {
                    version,
                    modified: 0,
                    entry_count: 0,
                },
            };
            ledger.write_header().await?;
            return Ok(ledger);
        }

        let mut raw = [0u8; HEADER_SIZE];
        storage.seek(SeekFrom::Start(0)).await.map_err(storage_error)?;
        storage.read_exact(&mut raw).await.map_err(read_error)?;
        let header = LedgerHeader::from_bytes(&raw).ok_or_else(|| {
            error!("ledger header checksum mismatch");
            LedgerError::Corrupt
        })?;
        info!(
            "ledger version {} with {} transactions",
            header.version, header.entry_count
        );
        Ok(Self { storage, header })
    }

    pub fn header(&self) -> &LedgerHeader {
        &self.header
    }

    pub fn entry_count(&self) -> u32 {
        self.header.entry_count
    }

    pub fn release(self) -> S {
        self.storage
    }

    /// The most recent transaction, read back from storage
    pub async fn current(&mut self) -> Result<Option<Transaction>, LedgerError> {
        match self.last_record().await? {
            None => Ok(None),
            Some((tx, true)) => Ok(Some(tx)),
            Some((tx, false)) => {
                error!("transaction {} fails its checksum", tx.id);
                Err(LedgerError::Corrupt)
            }
        }
    }

    /// Append a new transaction in CREATED state.
    ///
    /// An in-flight predecessor younger than `timeout` seconds makes this fail
    /// with `Busy`; an older one, or one stamped after `now`, is timed out first.
    pub async fn create(
        &mut self,
        member: u32,
        item: u8,
        cost: u32,
        discount: u16,
        now: u32,
        timeout: u32,
    ) -> Result<Transaction, LedgerError> {
        let id = match self.last_record().await? {
            None => 0,
            Some((last, true)) => {
                if last.status.in_flight() {
                    //A predecessor stamped in the future means the clock went back
                    if matches!(now.checked_sub(last.timestamp), Some(age) if age <= timeout) {
                        warn!("transaction {} still in flight", last.id);
                        return Err(LedgerError::Busy);
                    }
                    self.timeout(now).await?;
                }
                last.id.wrapping_add(1)
            }
            Some((mut last, false)) => {
                warn!("marking transaction {} as corrupted", last.id);
                last.status = last.status.with(TransactionStatus::CORRUPTED);
                let index = self.header.entry_count - 1;
                self.write_record(index, &last).await?;
                last.id.wrapping_add(1)
            }
        };

        let tx = Transaction {
            id,
            timestamp: now,
            member,
            status: TransactionStatus::CREATED,
            item,
            cost,
            discount,
        };
        self.write_record(self.header.entry_count, &tx).await?;
        self.header.entry_count += 1;
        self.header.modified = now;
        self.write_header().await?;
        debug!("created transaction {}", tx.id);
        Ok(tx)
    }

    pub async fn approve(&mut self) -> Result<Transaction, LedgerError> {
        self.advance(|status| status == TransactionStatus::CREATED, TransactionStatus::APPROVED, None)
            .await
    }

    pub async fn complete(&mut self) -> Result<Transaction, LedgerError> {
        self.advance(|status| status == TransactionStatus::APPROVED, TransactionStatus::COMPLETED, None)
            .await
    }

    pub async fn cancel(&mut self, now: u32) -> Result<Transaction, LedgerError> {
        self.advance(TransactionStatus::in_flight, TransactionStatus::CANCELED, Some(now))
            .await
    }

    pub async fn timeout(&mut self, now: u32) -> Result<Transaction, LedgerError> {
        self.advance(TransactionStatus::in_flight, TransactionStatus::TIMEOUT, Some(now))
            .await
    }

    /// Set `bit` on the current transaction if `allowed` accepts its status
    async fn advance(
        &mut self,
        allowed: impl Fn(TransactionStatus) -> bool,
        bit: TransactionStatus,
        now: Option<u32>,
    ) -> Result<Transaction, LedgerError> {
        let mut tx = self.current().await?.ok_or(LedgerError::Empty)?;
        if !allowed(tx.status) {
            warn!(
                "transaction {} in status {:#04x}, cannot set {:#04x}",
                tx.id, tx.status.0, bit.0
            );
            return Err(LedgerError::OutOfOrder { found: tx.status.0 });
        }
        tx.status = tx.status.with(bit);
        if let Some(now) = now {
            tx.timestamp = now;
        }
        let index = self.header.entry_count - 1;
        self.write_record(index, &tx).await?;
        debug!("transaction {} now {:#04x}", tx.id, tx.status.0);
        Ok(tx)
    }

    async fn last_record(&mut self) -> Result<Option<(Transaction, bool)>, LedgerError> {
        let Some(index) = self.header.entry_count.checked_sub(1) else {
            return Ok(None);
        };
        let mut raw = [0u8; RECORD_SIZE];
        self.storage
            .seek(SeekFrom::Start(record_offset(index)))
            .await
            .map_err(storage_error)?;
        self.storage.read_exact(&mut raw).await.map_err(read_error)?;
        Ok(Some(Transaction::from_bytes(&raw)))
    }

    async fn write_record(&mut self, index: u32, tx: &Transaction) -> Result<(), LedgerError> {
        self.storage
            .seek(SeekFrom::Start(record_offset(index)))
            .await
            .map_err(storage_error)?;
        self.storage
            .write_all(&tx.to_bytes())
            .await
            .map_err(storage_error)?;
        self.storage.flush().await.map_err(storage_error)
    }

    async fn write_header(&mut self) -> Result<(), LedgerError> {
        self.storage
            .seek(SeekFrom::Start(0))
            .await
            .map_err(storage_error)?;
        self.storage
            .write_all(&self.header.to_bytes())
            .await
            .map_err(storage_error)?;
        self.storage.flush().await.map_err(storage_error)
    }
}
