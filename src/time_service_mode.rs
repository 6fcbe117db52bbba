//! Maintenance mode for setting the real time clock from the VMC buttons.

use core::fmt::Write as _;

use crate::answer::{Answer, DisplayText};
use crate::clock::{self, Clock};

pub const BUTTON_INC: u16 = 1;
pub const BUTTON_DEC: u16 = 2;
pub const BUTTON_LEFT: u16 = 3;
pub const BUTTON_RIGHT: u16 = 4;
pub const BUTTON_GET: u16 = 5;
pub const BUTTON_SET: u16 = 6;

/// The field of the pending date/time the buttons act on
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimePart {
    Day,
    Month,
    Year,
    Hour,
    Minute,
    Second,
}

impl TimePart {
    fn previous(self) -> Self {
        match self {
            TimePart::Day => TimePart::Second,
            TimePart::Month => TimePart::Day,
            TimePart::Year => TimePart::Month,
            TimePart::Hour => TimePart::Year,
            TimePart::Minute => TimePart::Hour,
            TimePart::Second => TimePart::Minute,
        }
    }

    fn next(self) -> Self {
        match self {
            TimePart::Day => TimePart::Month,
            TimePart::Month => TimePart::Year,
            TimePart::Year => TimePart::Hour,
            TimePart::Hour => TimePart::Minute,
            TimePart::Minute => TimePart::Second,
            TimePart::Second => TimePart::Day,
        }
    }

    fn label(self) -> &'static str {
        match self {
            TimePart::Day => "TAG",
            TimePart::Month => "MONAT",
            TimePart::Year => "JAHR",
            TimePart::Hour => "STUND",
            TimePart::Minute => "MIN",
            TimePart::Second => "SEK",
        }
    }
}

pub struct TimeServiceMode {
    /// Unix seconds being edited, only written to the clock on BUTTON_SET
    pending: u32,
    part: TimePart,
    display_time: u8,
}

impl TimeServiceMode {
    pub fn new(now: u32, display_time: u8) -> Self {
        Self {
            pending: now,
            part: TimePart::Hour,
            display_time,
        }
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn part(&self) -> TimePart {
        self.part
    }

    pub fn button_pressed<C: Clock>(&mut self, button: u16, clock: &mut C) {
        debug!("time service button {} on {:?}", button, self.part);
        match button {
            BUTTON_INC => self.step(1),
            BUTTON_DEC => self.step(-1),
            BUTTON_LEFT => self.part = self.part.previous(),
            BUTTON_RIGHT => self.part = self.part.next(),
            BUTTON_GET => self.pending = clock.now(),
            BUTTON_SET => {
                info!("setting clock to {}", self.pending);
                clock.adjust(self.pending);
            }
            _ => {}
        }
    }

    fn step(&mut self, delta: i32) {
        let seconds = match self.part {
            TimePart::Day => 86_400,
            TimePart::Hour => 3_600,
            TimePart::Minute => 60,
            TimePart::Second => 1,
            TimePart::Month | TimePart::Year => {
                let current = clock::to_datetime(self.pending);
                let shifted = if self.part == TimePart::Year {
                    clock::shift_calendar(&current, delta, 0)
                } else {
                    clock::shift_calendar(&current, 0, delta)
                };
                self.pending = clock::to_unix(&shifted);
                return;
            }
        };
        let moved = i64::from(self.pending) + i64::from(delta) * seconds;
        self.pending = moved.clamp(0, i64::from(u32::MAX)) as u32;
    }

    /// Display shown on the VMC while setting the clock
    pub fn run(&self) -> Answer {
        let mut message = DisplayText::new();
        let _ = clock::format_datetime(&mut message, &clock::to_datetime(self.pending));
        let _ = write!(message, " {:<5}   ", self.part.label());
        Answer::DisplayRequest {
            time_tenths: self.display_time,
            message,
        }
    }
}
