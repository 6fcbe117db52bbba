//! 9 bit serial access to the bus.
//!
//! The UART hands over every 9 bit character as a pair of bytes, the first
//! one holding the ninth (mode) bit and the second one the data.

use embassy_time::{Instant, Timer};
use embedded_hal::digital::InputPin;
use embedded_io::ReadReady;
use embedded_io_async::{Read, Write};

use crate::config::Config;
use crate::MDBError;

pub struct Mdb<T, R> {
    uart: T,
    reset_line: R,
    pub(crate) config: Config,
    reset_asserted_since: Option<Instant>,
    bus_resets: u32,
}

impl<T: Read + Write + ReadReady, R: InputPin> Mdb<T, R> {
    pub fn new(uart: T, reset_line: R, config: Config) -> Self {
        debug!("mdb init, address {:#04x}", config.address);
        Self {
            uart,
            reset_line,
            config,
            reset_asserted_since: None,
            bus_resets: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of times the reset line forced a reinitialisation
    pub fn bus_resets(&self) -> u32 {
        self.bus_resets
    }

    pub fn release(self) -> (T, R) {
        (self.uart, self.reset_line)
    }

    pub async fn write(&mut self, byte: u8, mode: bool) -> Result<(), MDBError> {
        trace!("write {:#04x} mode {}", byte, mode);
        self.uart
            .write_all(&[mode as u8, byte])
            .await
            .map_err(|_| MDBError::UartError)
    }

    /// True if at least one character is waiting in the receiver
    pub fn available(&mut self) -> Result<bool, MDBError> {
        self.uart.read_ready().map_err(|_| MDBError::UartError)
    }

    /// Wait for the next character. The bus master always completes its frames,
    /// so this keeps waiting and only complains every `read_warn_after`.
    pub async fn read(&mut self) -> Result<(u8, bool), MDBError> {
        let mut waiting_since = Instant::now();
        while !self.available()? {
            Timer::after(self.config.read_poll).await;
            if waiting_since.elapsed() >= self.config.read_warn_after {
                warn!("read waited {} us for a byte", waiting_since.elapsed().as_micros());
                waiting_since = Instant::now();
            }
        }

        let mut word = [0x00u8; 2];
        self.uart
            .read_exact(&mut word)
            .await
            .map_err(|_| MDBError::UartError)?;
        trace!("read {:#04x} mode {}", word[1], word[0]);
        Ok((word[1], word[0] & 0x01 != 0))
    }

    /// Called while the line is idle. Reinitialises the transport when the
    /// reset line has been held for `reset_hold`. Returns true on a reset.
    pub async fn watch_reset_line(&mut self) -> bool {
        let asserted = match self.reset_line.is_high() {
            Ok(level) => level,
            Err(_) => {
                error!("reset line unreadable");
                false
            }
        };

        if !asserted {
            self.reset_asserted_since = None;
            return false;
        }

        match self.reset_asserted_since {
            None => {
                debug!("reset line asserted");
                self.reset_asserted_since = Some(Instant::now());
                false
            }
            Some(since) if since.elapsed() >= self.config.reset_hold => {
                self.reinit().await;
                true
            }
            Some(_) => false,
        }
    }

    async fn reinit(&mut self) {
        info!("bus reset held, reinitialising transport");
        let mut word = [0x00u8; 2];
        let mut dropped = 0u32;
        while let Ok(true) = self.uart.read_ready() {
            if self.uart.read_exact(&mut word).await.is_err() {
                error!("uart read failed while draining");
                break;
            }
            dropped += 1;
        }
        if dropped > 0 {
            debug!("dropped {} pending characters", dropped);
        }
        self.reset_asserted_since = None;
        self.bus_resets = self.bus_resets.wrapping_add(1);
    }
}
