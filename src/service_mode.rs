//! Maintenance mode for programming member cards.
//!
//! While DIP 1 is on the selection buttons of the vending machine browse the
//! member list and start card jobs. The RFID task owns the card reader; jobs
//! and their outcomes travel over the channels in [`CardJobs`].

use core::fmt::Write as _;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;

use crate::answer::{Answer, DisplayText};
use crate::member::MemberDirectory;

pub const BUTTON_FAST_UP: u16 = 1;
pub const BUTTON_UP: u16 = 2;
pub const BUTTON_DOWN: u16 = 3;
pub const BUTTON_FAST_DOWN: u16 = 4;
pub const BUTTON_PROGRAM: u16 = 5;
pub const BUTTON_RESTORE: u16 = 6;

const FAST_STEP: usize = 5;

/// Work for the RFID task
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardJob {
    /// Write member and card id onto the next card presented
    Program { member_id: u32, card_id: u32 },
    /// Erase the next card presented back to factory state
    Restore,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardJobOutcome {
    Done,
    Failed,
}

/// Channels between the service mode and the RFID task
pub struct CardJobs<M: RawMutex> {
    pub requests: Channel<M, CardJob, 1>,
    pub outcomes: Channel<M, CardJobOutcome, 1>,
}

impl<M: RawMutex> CardJobs<M> {
    pub const fn new() -> Self {
        Self {
            requests: Channel::new(),
            outcomes: Channel::new(),
        }
    }
}

impl<M: RawMutex> Default for CardJobs<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PendingJob {
    Program,
    Restore,
}

pub struct ServiceMode<'a, M: RawMutex> {
    jobs: &'a CardJobs<M>,
    member_index: usize,
    pending: Option<PendingJob>,
    display_time: u8,
}

impl<'a, M: RawMutex> ServiceMode<'a, M> {
    pub fn new(jobs: &'a CardJobs<M>, display_time: u8) -> Self {
        Self {
            jobs,
            member_index: 0,
            pending: None,
            display_time,
        }
    }

    pub fn member_index(&self) -> usize {
        self.member_index
    }

    pub fn pending(&self) -> Option<PendingJob> {
        self.pending
    }

    pub fn button_pressed<D: MemberDirectory>(&mut self, button: u16, directory: &D) {
        debug!("service button {}", button);
        match button {
            BUTTON_FAST_UP => self.member_index = self.member_index.saturating_sub(FAST_STEP),
            BUTTON_UP => self.member_index = self.member_index.saturating_sub(1),
            BUTTON_DOWN => self.member_index = self.member_index.saturating_add(1),
            BUTTON_FAST_DOWN => self.member_index = self.member_index.saturating_add(FAST_STEP),
            BUTTON_PROGRAM => match directory.by_index(self.member_index) {
                Some(member) => self.start(
                    CardJob::Program {
                        member_id: member.id,
                        card_id: member.card_id,
                    },
                    PendingJob::Program,
                ),
                None => warn!("no member at index {}, nothing to program", self.member_index),
            },
            BUTTON_RESTORE => self.start(CardJob::Restore, PendingJob::Restore),
            _ => {}
        }
    }

    fn start(&mut self, job: CardJob, pending: PendingJob) {
        if self.pending.is_some() {
            warn!("card job already running, ignoring {:?}", job);
            return;
        }
        match self.jobs.requests.try_send(job) {
            Ok(()) => {
                info!("card job {:?} started", job);
                self.pending = Some(pending);
            }
            Err(_) => error!("card job queue full, dropping {:?}", job),
        }
    }

    /// Collect a finished card job, if any
    fn poll_outcome(&mut self) {
        if let Ok(outcome) = self.jobs.outcomes.try_receive() {
            match outcome {
                CardJobOutcome::Done => info!("card job {:?} done", self.pending),
                CardJobOutcome::Failed => warn!("card job {:?} failed", self.pending),
            }
            self.pending = None;
        }
    }

    /// Display shown on the VMC while in maintenance
    pub fn run<D: MemberDirectory>(&mut self, directory: &D) -> Answer {
        self.poll_outcome();

        let member = directory.by_index(self.member_index);
        match (self.pending, member) {
            (Some(PendingJob::Program), _) => {
                Answer::display(self.display_time, "PROGRAM:  BITTE KARTE AUFLEGEN ")
            }
            (Some(PendingJob::Restore), _) => {
                Answer::display(self.display_time, "LOESCHEN: BITTE KARTE AUFLEGEN ")
            }
            (None, None) => Answer::display(self.display_time, "SERVICE: MITGLIED WAEHLEN      "),
            (None, Some(member)) => {
                let mut message = DisplayText::new();
                let _ = write!(
                    message,
                    "{:08}: {:>8}, {:>8}   ",
                    member.id,
                    member.name.as_str(),
                    member.given_name.as_str()
                );
                Answer::DisplayRequest {
                    time_tenths: self.display_time,
                    message,
                }
            }
        }
    }
}
