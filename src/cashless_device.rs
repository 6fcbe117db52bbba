//! The cashless device proper: command handlers and the session state machine.
//!
//! [`CashlessDevice::run_once`] receives at most one frame, answers it and then
//! moves the state machine. The member card and the DIP switches are read once
//! per frame so the answer and the transition agree.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Timer;
use embedded_hal::digital::InputPin;
use embedded_io::ReadReady;
use embedded_io_async::{Read, Seek, Write};

use crate::answer::Answer;
use crate::clock::Clock;
use crate::command::{Request, VmcIdentity, VmcSetup};
use crate::config::Config;
use crate::ledger::Ledger;
use crate::member::MemberDirectory;
use crate::periphery::{Periphery, DIP_SERVICE, DIP_TIME};
use crate::service_mode::{CardJobs, ServiceMode};
use crate::time_service_mode::TimeServiceMode;
use crate::transport::Mdb;
use crate::Error;

/// Session state as seen by the VMC
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Inactive,
    Disabled,
    Enabled,
    SessionIdle,
    Vend,
}

/// Conditions sampled once per received frame
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Guards {
    /// Member id of the card in the reader field
    pub member: Option<u32>,
    /// DIP 1
    pub service: bool,
    /// DIP 2
    pub time: bool,
}

impl Guards {
    /// Neither a card nor maintenance mode keeps a session open
    fn released(&self) -> bool {
        self.member.is_none() && !self.service
    }

    fn session_wanted(&self) -> bool {
        self.member.is_some() || self.service
    }
}

impl State {
    /// Transition after `request` has been handled
    pub fn next(self, request: &Request, guards: &Guards) -> State {
        use State::*;
        match (self, request) {
            (Inactive, Request::SetupConfig { .. }) => Disabled,
            (Inactive, _) => Inactive,
            (_, Request::Reset) => Inactive,

            (Disabled, Request::ReaderEnable) => Enabled,

            (Enabled, Request::ReaderDisable) => Disabled,
            (Enabled, Request::Poll) if guards.session_wanted() => SessionIdle,

            (SessionIdle, Request::VendComplete) => Enabled,
            (SessionIdle, _) if guards.released() => Enabled,
            (SessionIdle, Request::VendRequest { .. }) => Vend,

            (Vend, Request::VendCancel | Request::VendSuccess { .. } | Request::VendFailure) => {
                SessionIdle
            }
            (Vend, Request::VendComplete) => Enabled,
            (Vend, _) if guards.released() => Enabled,

            (state, _) => state,
        }
    }

    /// Status LED is lit once the VMC has enabled the reader
    pub fn led(self) -> bool {
        !matches!(self, State::Inactive | State::Disabled)
    }
}

/// Source of the member id on the card currently presented
#[allow(async_fn_in_trait)]
pub trait CardReader {
    async fn member_present(&mut self) -> Option<u32>;
}

enum Reply {
    Ack,
    Nack,
    Answer(Answer),
}

pub struct CashlessDevice<'a, S, C, R, D, P, M: RawMutex> {
    config: Config,
    state: State,
    vmc: VmcSetup,
    vmc_identity: Option<VmcIdentity>,
    ledger: Ledger<S>,
    clock: C,
    reader: R,
    directory: D,
    periphery: P,
    service: ServiceMode<'a, M>,
    time_service: TimeServiceMode,
}

impl<'a, S, C, R, D, P, M> CashlessDevice<'a, S, C, R, D, P, M>
where
    S: Read + Write + Seek,
    C: Clock,
    R: CardReader,
    D: MemberDirectory,
    P: Periphery,
    M: RawMutex,
{
    /// Open the ledger in `storage` and start out inactive with the LED off
    pub async fn new(
        config: Config,
        storage: S,
        mut clock: C,
        reader: R,
        directory: D,
        mut periphery: P,
        jobs: &'a CardJobs<M>,
    ) -> Result<Self, Error> {
        info!("{} starting, {} members", config.name.as_str(), directory.len());
        let ledger = Ledger::open(storage, config.ledger_version).await?;
        periphery.set_status_led(false);
        let now = clock.now();

        Ok(Self {
            service: ServiceMode::new(jobs, config.display_time),
            time_service: TimeServiceMode::new(now, config.display_time),
            config,
            state: State::Inactive,
            vmc: VmcSetup::default(),
            vmc_identity: None,
            ledger,
            clock,
            reader,
            directory,
            periphery,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn vmc_setup(&self) -> &VmcSetup {
        &self.vmc
    }

    pub fn vmc_identity(&self) -> Option<&VmcIdentity> {
        self.vmc_identity.as_ref()
    }

    pub fn ledger(&mut self) -> &mut Ledger<S> {
        &mut self.ledger
    }

    pub fn service_mode(&self) -> &ServiceMode<'a, M> {
        &self.service
    }

    pub fn time_service_mode(&self) -> &TimeServiceMode {
        &self.time_service
    }

    /// Serve the bus forever
    pub async fn run<T, RST>(&mut self, bus: &mut Mdb<T, RST>) -> !
    where
        T: Read + Write + ReadReady,
        RST: InputPin,
    {
        loop {
            match self.run_once(bus).await {
                Ok(Some(_)) => {}
                Ok(None) => Timer::after(bus.config().read_poll).await,
                Err(e) => warn!("dropped exchange: {:?}", e),
            }
        }
    }

    /// Receive, answer and apply one command. `Ok(None)` if no frame was pending.
    ///
    /// A frame that fails to decode leaves the state untouched. Once a frame is
    /// accepted the transition happens even if the answer could not be delivered.
    pub async fn run_once<T, RST>(&mut self, bus: &mut Mdb<T, RST>) -> Result<Option<Request>, Error>
    where
        T: Read + Write + ReadReady,
        RST: InputPin,
    {
        let Some(frame) = bus.receive_frame().await? else {
            return Ok(None);
        };
        let request = Request::try_from(&frame)?;
        let guards = self.sample_guards().await;
        trace!("{:?} in {:?} with {:?}", request, self.state, guards);

        let reply = self.handle(&request, &guards).await;
        let sent = self.send(bus, reply).await;
        if sent.is_ok() {
            self.after_reply(&request).await;
        }

        let next = self.state.next(&request, &guards);
        if next != self.state {
            debug!("state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
        self.periphery.set_status_led(self.state.led());

        sent.map(|_| Some(request))
    }

    async fn sample_guards(&mut self) -> Guards {
        Guards {
            member: self.reader.member_present().await,
            service: self.periphery.check_dip(DIP_SERVICE),
            time: self.periphery.check_dip(DIP_TIME),
        }
    }

    /// Work done before the reply is sent, returning the reply
    async fn handle(&mut self, request: &Request, guards: &Guards) -> Reply {
        match *request {
            Request::Reset => Reply::Ack,
            Request::SetupConfig {
                level,
                columns,
                rows,
                display_info,
            } => {
                self.vmc.level = level;
                self.vmc.columns_on_display = columns;
                self.vmc.rows_on_display = rows;
                self.vmc.display_info = display_info;
                info!("VMC level {}, display {}x{}", level, columns, rows);
                Reply::Answer(Answer::ReaderConfigInfo)
            }
            Request::SetupPrices {
                max_price,
                min_price,
            } => {
                self.vmc.max_price = max_price;
                self.vmc.min_price = min_price;
                debug!("VMC prices {} - {}", min_price, max_price);
                Reply::Ack
            }
            Request::Poll => self.poll(guards),
            Request::VendRequest { price, item } => self.vend_request(price, item, guards).await,
            Request::VendCancel => Reply::Answer(Answer::VendDenied),
            Request::VendSuccess { .. } => Reply::Ack,
            Request::VendFailure => {
                let now = self.clock.now();
                if let Err(e) = self.ledger.cancel(now).await {
                    warn!("vend failure without cancellable transaction: {:?}", e);
                }
                Reply::Ack
            }
            Request::VendComplete => Reply::Answer(Answer::EndSession),
            Request::VendCashSale { price, item } => {
                error!("cash sale of item {} for {} not supported", item, price);
                Reply::Nack
            }
            Request::ReaderDisable | Request::ReaderEnable => Reply::Ack,
            Request::ReaderCancel => Reply::Answer(Answer::Cancelled),
            Request::ExpansionId(id) => {
                info!(
                    "VMC {} serial {} model {} software {:#06x}",
                    core::str::from_utf8(&id.manufacturer_code).unwrap_or("?"),
                    core::str::from_utf8(&id.serial_number).unwrap_or("?"),
                    core::str::from_utf8(&id.model_number).unwrap_or("?"),
                    id.software_version
                );
                self.vmc_identity = Some(id);
                Reply::Answer(Answer::PeripheralId)
            }
        }
    }

    /// Ledger updates that must only follow a delivered reply
    async fn after_reply(&mut self, request: &Request) {
        match request {
            Request::VendCancel => {
                let now = self.clock.now();
                if let Err(e) = self.ledger.cancel(now).await {
                    debug!("vend cancel, nothing to cancel: {:?}", e);
                }
            }
            Request::VendSuccess { .. } => {
                if let Err(e) = self.ledger.complete().await {
                    error!("vend success but transaction not completable: {:?}", e);
                }
            }
            _ => {}
        }
    }

    fn poll(&mut self, guards: &Guards) -> Reply {
        if self.state == State::Enabled && guards.session_wanted() {
            info!("begin session for {:?}", guards.member);
            Reply::Answer(Answer::BeginSession)
        } else if self.state == State::SessionIdle && guards.released() {
            info!("card removed, cancelling session");
            Reply::Answer(Answer::SessionCancelRequest)
        } else if guards.service {
            if guards.time {
                Reply::Answer(self.time_service.run())
            } else {
                Reply::Answer(self.service.run(&self.directory))
            }
        } else {
            Reply::Ack
        }
    }

    async fn vend_request(&mut self, price: u16, item: u16, guards: &Guards) -> Reply {
        if guards.service {
            if guards.time {
                self.time_service.button_pressed(item, &mut self.clock);
            } else {
                self.service.button_pressed(item, &self.directory);
            }
            return Reply::Answer(Answer::VendDenied);
        }

        let Some(member) = guards.member.and_then(|id| self.directory.by_id(id)) else {
            info!("vend of item {} denied, no known member", item);
            return Reply::Answer(Answer::VendDenied);
        };
        if !member.is_available(item) {
            info!("item {} blocked for member {}", item, member.id);
            return Reply::Answer(Answer::VendDenied);
        }

        let discount = member.discount_on(price);
        let cost = price - discount;
        let member_id = member.id;
        let now = self.clock.now();
        match self
            .ledger
            .create(
                member_id,
                item as u8,
                u32::from(cost),
                discount,
                now,
                self.config.transaction_timeout,
            )
            .await
        {
            Ok(tx) => {
                info!(
                    "transaction {}: member {} item {} cost {} discount {}",
                    tx.id, member_id, item, cost, discount
                );
                Reply::Answer(Answer::VendApproved(cost))
            }
            Err(e) => {
                warn!("vend denied: {:?}", e);
                Reply::Answer(Answer::VendDenied)
            }
        }
    }

    async fn send<T, RST>(&mut self, bus: &mut Mdb<T, RST>, reply: Reply) -> Result<(), Error>
    where
        T: Read + Write + ReadReady,
        RST: InputPin,
    {
        match reply {
            Reply::Ack => bus.send_ack().await?,
            Reply::Nack => bus.send_nack().await?,
            Reply::Answer(answer) => {
                let approved = matches!(answer, Answer::VendApproved(_));
                let bytes = answer.encode(&self.vmc, &self.config.reader, &self.config.identity)?;
                bus.send_frame(&bytes).await?;
                if approved {
                    if let Err(e) = self.ledger.approve().await {
                        error!("approved vend but transaction not approvable: {:?}", e);
                    }
                }
            }
        }
        Ok(())
    }
}
