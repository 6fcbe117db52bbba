//! In-memory stand-ins for the UART, the ledger file, the pins and the card reader.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_time::Instant;
use embedded_hal::digital::{ErrorType as PinErrorType, InputPin, OutputPin};
use embedded_io::{ErrorType, ReadReady, SeekFrom};
use embedded_io_async::{Read, Seek, Write};
use fixedstr::str16;

use mdb_cashless::clock::Clock;
use mdb_cashless::command::Request;
use mdb_cashless::config::Config;
use mdb_cashless::periphery::Pins;
use mdb_cashless::service_mode::CardJobs;
use mdb_cashless::{CardReader, CashlessDevice, Mdb, Member, MemberTable};

// 16.08.2019 15:17:41 UTC
pub const T0: u32 = 1_565_968_661;

/// Both directions of the bus, as 9 bit characters
#[derive(Default)]
pub struct Wire {
    /// VMC -> device
    pub rx: VecDeque<(u8, bool)>,
    /// device -> VMC
    pub tx: Vec<(u8, bool)>,
    /// Receiver reports nothing pending before this instant
    pub ready_at: Option<Instant>,
}

#[derive(Clone, Default)]
pub struct MockUart(pub Rc<RefCell<Wire>>);

impl ErrorType for MockUart {
    type Error = Infallible;
}

impl ReadReady for MockUart {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        let wire = self.0.borrow();
        if let Some(at) = wire.ready_at {
            if Instant::now() < at {
                return Ok(false);
            }
        }
        Ok(!wire.rx.is_empty())
    }
}

impl Read for MockUart {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut wire = self.0.borrow_mut();
        let mut n = 0;
        while n + 2 <= buf.len() {
            match wire.rx.pop_front() {
                Some((byte, mode)) => {
                    buf[n] = mode as u8;
                    buf[n + 1] = byte;
                    n += 2;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for MockUart {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut wire = self.0.borrow_mut();
        for word in buf.chunks_exact(2) {
            wire.tx.push((word[1], word[0] & 0x01 != 0));
        }
        Ok(buf.len() - buf.len() % 2)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl MockUart {
    /// Queue a command frame the way a VMC sends it
    pub fn push_request(&self, request: &Request, address: u8) {
        let wire_bytes = request.to_frame().encode(address);
        self.push_raw(&wire_bytes);
    }

    /// Queue raw bytes, the first one with the mode bit set
    pub fn push_raw(&self, bytes: &[u8]) {
        let mut wire = self.0.borrow_mut();
        for (i, b) in bytes.iter().enumerate() {
            wire.rx.push_back((*b, i == 0));
        }
    }

    pub fn push_handshake(&self, byte: u8) {
        self.0.borrow_mut().rx.push_back((byte, false));
    }

    pub fn take_sent(&self) -> Vec<(u8, bool)> {
        std::mem::take(&mut self.0.borrow_mut().tx)
    }

    pub fn pending_rx(&self) -> usize {
        self.0.borrow().rx.len()
    }
}

/// What the device puts on the wire for an answer block
pub fn answer_block(data: &[u8]) -> Vec<(u8, bool)> {
    let mut out: Vec<(u8, bool)> = data.iter().map(|b| (*b, false)).collect();
    let chk = data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    out.push((chk, true));
    out
}

pub fn ack() -> Vec<(u8, bool)> {
    vec![(0x00, true)]
}

pub fn nack() -> Vec<(u8, bool)> {
    vec![(0xFF, true)]
}

/// A file in RAM
#[derive(Clone, Default)]
pub struct MemStorage {
    pub data: Rc<RefCell<Vec<u8>>>,
    pos: usize,
}

impl MemStorage {
    pub fn new(data: Rc<RefCell<Vec<u8>>>) -> Self {
        Self { data, pos: 0 }
    }
}

impl ErrorType for MemStorage {
    type Error = Infallible;
}

impl Read for MemStorage {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let data = self.data.borrow();
        let available = data.len().saturating_sub(self.pos);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for MemStorage {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut data = self.data.borrow_mut();
        if data.len() < self.pos + buf.len() {
            data.resize(self.pos + buf.len(), 0);
        }
        data[self.pos..self.pos + buf.len()].copy_from_slice(buf);
        self.pos += buf.len();
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Seek for MemStorage {
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
        let len = self.data.borrow().len() as i64;
        let target = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(n) => len + n,
            SeekFrom::Current(n) => self.pos as i64 + n,
        };
        self.pos = target.max(0) as usize;
        Ok(self.pos as u64)
    }
}

/// An input or output pin backed by a shared flag
#[derive(Clone, Default)]
pub struct MockPin(pub Rc<Cell<bool>>);

impl PinErrorType for MockPin {
    type Error = Infallible;
}

impl InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.get())
    }
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set(true);
        Ok(())
    }
}

#[derive(Clone)]
pub struct FakeClock(pub Rc<Cell<u32>>);

impl Clock for FakeClock {
    fn now(&mut self) -> u32 {
        self.0.get()
    }

    fn adjust(&mut self, unix_time: u32) {
        self.0.set(unix_time);
    }
}

#[derive(Clone, Default)]
pub struct FakeReader(pub Rc<Cell<Option<u32>>>);

impl CardReader for FakeReader {
    async fn member_present(&mut self) -> Option<u32> {
        self.0.get()
    }
}

pub type Board = Pins<MockPin, MockPin, MockPin, MockPin, MockPin>;
pub type Device<'a> =
    CashlessDevice<'a, MemStorage, FakeClock, FakeReader, MemberTable<8>, Board, NoopRawMutex>;
pub type Bus = Mdb<MockUart, MockPin>;

pub fn member(id: u32, name: &str, given: &str, properties: u16, discount: u16) -> Member {
    Member {
        id,
        name: str16::from(name),
        given_name: str16::from(given),
        properties,
        discount,
        card_id: 0xC000 + id,
    }
}

/// Max Muster gets 10% and may not take item 3; Erika Beispiel pays full price
pub fn members() -> MemberTable<8> {
    let mut table = MemberTable::new();
    table.push(member(42, "Muster", "Max", 0x0004, 10)).unwrap();
    table.push(member(7, "Beispiel", "Erika", 0x0000, 0)).unwrap();
    table
}

/// Everything a test needs to poke at from the outside
pub struct Rig {
    pub uart: MockUart,
    pub reset: MockPin,
    pub storage: Rc<RefCell<Vec<u8>>>,
    pub now: Rc<Cell<u32>>,
    pub card: Rc<Cell<Option<u32>>>,
    pub led: MockPin,
    pub dip_service: MockPin,
    pub dip_time: MockPin,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            uart: MockUart::default(),
            reset: MockPin::default(),
            storage: Rc::default(),
            now: Rc::new(Cell::new(T0)),
            card: Rc::default(),
            led: MockPin::default(),
            dip_service: MockPin::default(),
            dip_time: MockPin::default(),
        }
    }

    pub fn bus(&self) -> Bus {
        Mdb::new(self.uart.clone(), self.reset.clone(), Config::default())
    }

    pub async fn device<'a>(&self, jobs: &'a CardJobs<NoopRawMutex>, directory: MemberTable<8>) -> Device<'a> {
        let board = Pins {
            led: self.led.clone(),
            dip1: self.dip_service.clone(),
            dip2: self.dip_time.clone(),
            dip3: MockPin::default(),
            dip4: MockPin::default(),
        };
        CashlessDevice::new(
            Config::default(),
            MemStorage::new(self.storage.clone()),
            FakeClock(self.now.clone()),
            FakeReader(self.card.clone()),
            directory,
            board,
            jobs,
        )
        .await
        .unwrap()
    }

    /// Send a request, queue the VMC's ACK for a possible answer block, run one cycle
    pub async fn exchange(&self, device: &mut Device<'_>, bus: &mut Bus, request: Request) -> Vec<(u8, bool)> {
        self.uart.push_request(&request, 0x10);
        self.uart.push_handshake(0x00);
        let handled = device.run_once(bus).await.unwrap();
        assert_eq!(handled, Some(request));
        //Drop the ACK if the device only answered with a handshake
        if self.uart.pending_rx() == 1 {
            self.uart.0.borrow_mut().rx.clear();
        }
        self.uart.take_sent()
    }

    pub fn led_on(&self) -> bool {
        self.led.0.get()
    }
}
