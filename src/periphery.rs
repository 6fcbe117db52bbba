//! Status LED and DIP switches.

use embedded_hal::digital::{InputPin, OutputPin};

/// DIP 1: maintenance mode
pub const DIP_SERVICE: u8 = 0x01;
/// DIP 2: with DIP 1, clock adjustment instead of member browsing
pub const DIP_TIME: u8 = 0x02;

pub trait Periphery {
    fn set_status_led(&mut self, on: bool);
    /// True if any switch in `mask` is on
    fn check_dip(&mut self, mask: u8) -> bool;
}

/// Board wiring: one status LED and four DIP switches
pub struct Pins<LED, D1, D2, D3, D4> {
    pub led: LED,
    pub dip1: D1,
    pub dip2: D2,
    pub dip3: D3,
    pub dip4: D4,
}

impl<LED, D1, D2, D3, D4> Periphery for Pins<LED, D1, D2, D3, D4>
where
    LED: OutputPin,
    D1: InputPin,
    D2: InputPin,
    D3: InputPin,
    D4: InputPin,
{
    fn set_status_led(&mut self, on: bool) {
        let result = if on {
            self.led.set_high()
        } else {
            self.led.set_low()
        };
        if result.is_err() {
            error!("status LED not writable");
        }
    }

    fn check_dip(&mut self, mask: u8) -> bool {
        let mut state = 0u8;
        state |= self.dip1.is_high().unwrap_or(false) as u8;
        state |= (self.dip2.is_high().unwrap_or(false) as u8) << 1;
        state |= (self.dip3.is_high().unwrap_or(false) as u8) << 2;
        state |= (self.dip4.is_high().unwrap_or(false) as u8) << 3;
        state & mask != 0
    }
}
