//! Frame level send and receive on top of the 9 bit transport.

use embassy_time::{Instant, Timer};
use embedded_hal::digital::InputPin;
use embedded_io::ReadReady;
use embedded_io_async::{Read, Write};
use heapless::Vec;

use crate::command::{self, Frame};
use crate::config::CASHLESS_ADDRESS;
use crate::transport::Mdb;
use crate::{MDBError, MDBStatus};

impl<T: Read + Write + ReadReady, R: InputPin> Mdb<T, R> {
    pub async fn send_status_message(&mut self, status: MDBStatus) -> Result<(), MDBError> {
        debug!("send {:?}", status);
        self.write(status as u8, true).await
    }

    pub async fn send_ack(&mut self) -> Result<(), MDBError> {
        self.send_status_message(MDBStatus::ACK).await
    }

    pub async fn send_nack(&mut self) -> Result<(), MDBError> {
        self.send_status_message(MDBStatus::NAK).await
    }

    /// Send a response block and wait for the VMC to acknowledge it.
    /// NAK, RET or silence within the ACK window resend the block; the bus
    /// watchdog is the only way out of a persistently failing link.
    pub async fn send_frame(&mut self, msg: &[u8]) -> Result<(), MDBError> {
        debug!("send frame {:?}", msg);
        loop {
            let mut checksum: u8 = 0x00;
            for byte in msg {
                self.write(*byte, false).await?;
                checksum = checksum.wrapping_add(*byte);
            }
            self.write(checksum, true).await?;

            match self.await_handshake().await? {
                Some(MDBStatus::ACK) => return Ok(()),
                Some(status) => debug!("VMC replied {:?}, resending", status),
                None => debug!("no handshake within window, resending"),
            }
        }
    }

    async fn await_handshake(&mut self) -> Result<Option<MDBStatus>, MDBError> {
        let deadline = Instant::now() + self.config.ack_window;
        while Instant::now() < deadline {
            if self.available()? {
                let (response, _mode) = self.read().await?;
                return match MDBStatus::try_from(response) {
                    Ok(status) => Ok(Some(status)),
                    Err(_) => {
                        error!("expected ACK, NAK or RET but got {:#04x}", response);
                        Err(MDBError::UnexpectedHandshake)
                    }
                };
            }
            Timer::after(self.config.read_poll).await;
        }
        Ok(None)
    }

    /// Read one command frame addressed to this device.
    ///
    /// Returns `Ok(None)` when the line is idle or the pending byte is not the
    /// start of a frame for us. Any `Err` means the frame was discarded.
    pub async fn receive_frame(&mut self) -> Result<Option<Frame>, MDBError> {
        if !self.available()? {
            self.watch_reset_line().await;
            return Ok(None);
        }

        let (first, mode) = self.read().await?;
        if !mode || (first & 0xF8) != (self.config.address & 0xF8) {
            trace!("ignoring {:#04x}, not a command for us", first);
            return Ok(None);
        }
        let command = CASHLESS_ADDRESS | (first & 0x07);
        let mut chk = first;

        let subcommand = match command::subcommand_len(command) {
            Ok(0) => None,
            Ok(_) => {
                let sub = self.read_body_byte().await?;
                chk = chk.wrapping_add(sub);
                Some(sub)
            }
            Err(e) => {
                error!("unknown command {:#04x}", first);
                return Err(e);
            }
        };

        let len = match command::data_len(command, subcommand) {
            Ok(len) => len,
            Err(e) => {
                error!("unknown sub-command {:?} for command {:#04x}", subcommand, first);
                return Err(e);
            }
        };

        let mut data: Vec<u8, { command::MAX_DATA }> = Vec::new();
        for _ in 0..len {
            let byte = self.read_body_byte().await?;
            chk = chk.wrapping_add(byte);
            data.push(byte).map_err(|_| MDBError::BufferOverrun)?;
        }

        //Real VMCs send the checksum with the mode bit clear, so it is not checked here
        let (chk_read, _mode) = self.read().await?;
        if chk_read != chk {
            error!(
                "checksum invalid - got {:#04x}, expected {:#04x}",
                chk_read, chk
            );
            return Err(MDBError::WrongChecksum);
        }

        let frame = Frame {
            command,
            subcommand,
            data,
        };
        debug!(
            "received cmd {:#04x} sub {:?} data {:?}",
            frame.command,
            frame.subcommand,
            frame.data.as_slice()
        );
        Ok(Some(frame))
    }

    async fn read_body_byte(&mut self) -> Result<u8, MDBError> {
        let (byte, mode) = self.read().await?;
        if mode {
            error!("invalid block from VMC, mode bit set unexpectedly");
            return Err(MDBError::MalformedMessage);
        }
        Ok(byte)
    }
}
