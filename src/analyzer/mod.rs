//! The analyzer engine: one radio session per transceiver, driven by the caller's loop.
//!
//! Each session runs its own main state machine. The caller forwards radio
//! events through [`PerformanceAnalyzer::rx_frame`],
//! [`PerformanceAnalyzer::tx_frame_done`] and
//! [`PerformanceAnalyzer::ed_scan_done`] and calls
//! [`PerformanceAnalyzer::task`] once per loop iteration.

mod host;
pub(crate) mod peer_search;
pub(crate) mod per_mode;
mod pib;
pub(crate) mod range;
pub(crate) mod scheduler;
pub(crate) mod state;
pub mod types;

use crate::device::radio::types::{CsmaMode, RxFrame, TxStatus};
use crate::device::radio::Radio;
use crate::device::rng::Rng;
use crate::device::timer::Timer;
use crate::device::{self, Device};
use crate::frame::app::AppMessage;
use crate::frame::{Address, Header};
use crate::serial::messages::{HostResponse, MessageId};
use crate::serial::SerialChannel;
use crate::Error;
use peer_search::PeerSearchSession;
use per_mode::initiator::PerInitiator;
use per_mode::receptor::PerReceptor;
use range::RangeSession;
use scheduler::{Continuation, Scheduler};
use state::{on_state, MainStateHandler};
use types::*;

/// Why a frame could not be handed to the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum TxError {
    /// Another frame is in flight.
    Busy,
    /// The frame did not fit or the driver refused it.
    Rejected,
}

/// Everything owned by one transceiver.
pub struct RadioSession {
    pub(crate) node: NodeInfo,
    pub(crate) serial: SerialChannel,
    pub(crate) scheduler: Scheduler,
    pub(crate) peer_search: PeerSearchSession,
    pub(crate) initiator: PerInitiator,
    pub(crate) receptor: PerReceptor,
    pub(crate) range: RangeSession,
}

impl RadioSession {
    fn new() -> Self {
        Self {
            node: NodeInfo::new(),
            serial: SerialChannel::new(),
            scheduler: Scheduler::new(),
            peer_search: PeerSearchSession::new(),
            initiator: PerInitiator::new(),
            receptor: PerReceptor::new(),
            range: RangeSession::new(),
        }
    }
}

/// RF performance analyzer for a dual front-end IEEE 802.15.4 radio.
pub struct PerformanceAnalyzer<D>
where
    D: Device,
{
    pub(crate) device: D,
    pub(crate) config: AnalyzerConfig,
    pub(crate) sessions: [RadioSession; 2],
}

impl<D> PerformanceAnalyzer<D>
where
    D: Device,
{
    /// Creation. Call [`PerformanceAnalyzer::init`] before the first [`PerformanceAnalyzer::task`].
    pub fn new(device: D, config: AnalyzerConfig) -> Self {
        Self { device, config, sessions: [RadioSession::new(), RadioSession::new()] }
    }

    /// Bring both sessions up and leave them waiting for an event.
    pub fn init(&mut self) -> Result<(), Error<D>> {
        for trx in TransceiverId::ALL {
            self.set_main_state(trx, MainState::Init, StateArg::None)?;
        }
        for trx in TransceiverId::ALL {
            self.set_main_state(trx, MainState::WaitForEvent, StateArg::None)?;
        }
        Ok(())
    }

    /// One iteration of the cooperative loop: expired timers, state tasks, then the host links.
    pub fn task(&mut self) -> Result<(), Error<D>> {
        for trx in TransceiverId::ALL {
            self.run_expired(trx)?;
            let state = self.session(trx).node.main_state;
            on_state!(state, |h| h.task(self, trx))?;
        }
        for trx in TransceiverId::ALL {
            self.serial_task(trx)?;
        }
        Ok(())
    }

    /// A frame addressed to this node arrived on `trx`.
    pub fn rx_frame(&mut self, trx: TransceiverId, frame: &RxFrame<'_>) {
        let state = self.session(trx).node.main_state;
        if let Err(e) = on_state!(state, |h| h.rx(self, trx, frame)) {
            warn!("{}: rx handling failed: {}", trx, e);
        }
    }

    /// The frame handed to the radio on `trx` completed.
    pub fn tx_frame_done(&mut self, trx: TransceiverId, status: TxStatus) {
        let node = &mut self.session_mut(trx).node;
        if !node.transmitting {
            trace!("{}: stale tx done dropped", trx);
            return;
        }
        node.transmitting = false;
        let state = node.main_state;
        if let Err(e) = on_state!(state, |h| h.tx_done(self, trx, status)) {
            warn!("{}: tx done handling failed: {}", trx, e);
        }
    }

    /// An energy detect measurement started on `trx` completed.
    pub fn ed_scan_done(&mut self, trx: TransceiverId, level: i8) {
        let state = self.session(trx).node.main_state;
        if let Err(e) = on_state!(state, |h| h.ed_scan_done(self, trx, level)) {
            warn!("{}: ed scan handling failed: {}", trx, e);
        }
    }

    /// Current operating mode of `trx`.
    pub fn main_state(&self, trx: TransceiverId) -> MainState {
        self.session(trx).node.main_state
    }

    /// Session state of `trx`.
    pub fn node(&self, trx: TransceiverId) -> &NodeInfo {
        &self.session(trx).node
    }

    /// PER test configuration currently in effect on `trx`.
    pub fn current_params(&self, trx: TransceiverId) -> &TrxConfigParams {
        &self.session(trx).initiator.current_params
    }

    /// Get the device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Get the device for mutation.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Get the configuration.
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub(crate) fn session(&self, trx: TransceiverId) -> &RadioSession {
        &self.sessions[trx.index()]
    }

    pub(crate) fn session_mut(&mut self, trx: TransceiverId) -> &mut RadioSession {
        &mut self.sessions[trx.index()]
    }

    /// Leave the current main state and enter `state`.
    pub(crate) fn set_main_state(
        &mut self,
        trx: TransceiverId,
        state: MainState,
        arg: StateArg,
    ) -> Result<(), Error<D>> {
        let prior = self.session(trx).node.main_state;
        debug!("{}: {} -> {}", trx, prior, state);
        if state != MainState::Init {
            on_state!(prior, |h| h.exit(self, trx))?;
        }
        let node = &mut self.session_mut(trx).node;
        node.transmitting = false;
        node.main_state = state;
        on_state!(state, |h| h.init(self, trx, arg))?;
        // init may already have moved on
        if self.session(trx).node.main_state != state {
            return Ok(());
        }
        if on_state!(state, |h| <_ as MainStateHandler<D>>::has_sub_states(&h)) {
            on_state!(state, |h| h.set_sub_state(self, trx, 0, arg))?;
        }
        Ok(())
    }

    /// Forget the peer and start over from `WAIT_FOR_EVENT`.
    pub(crate) fn app_reset(&mut self, trx: TransceiverId) -> Result<(), Error<D>> {
        info!("{}: reset", trx);
        self.config_node_ib(trx)?;
        self.reset_radio(trx);
        let session = self.session_mut(trx);
        session.scheduler.clear();
        session.peer_search = PeerSearchSession::new();
        session.initiator = PerInitiator::new();
        session.receptor = PerReceptor::new();
        session.range = RangeSession::new();
        self.set_main_state(trx, MainState::Init, StateArg::None)?;
        self.set_main_state(trx, MainState::WaitForEvent, StateArg::None)
    }

    pub(crate) fn config_node_ib(&mut self, trx: TransceiverId) -> Result<(), Error<D>> {
        let seq = self.random_u8()?;
        let node = &mut self.session_mut(trx).node;
        node.transmitting = false;
        node.msg_seq_num = seq;
        node.peer_short_addr = 0;
        node.peer_found = false;
        node.configure_mode = false;
        Ok(())
    }

    pub(crate) fn now(&mut self) -> Result<u32, Error<D>> {
        Ok(self.device.timer().now_us().map_err(device::Error::Timer)?)
    }

    pub(crate) fn random_u8(&mut self) -> Result<u8, Error<D>> {
        Ok(self.device.rng().next_u8().map_err(device::Error::Rng)?)
    }

    pub(crate) fn random_short_address(&mut self) -> Result<u16, Error<D>> {
        Ok(self.device.rng().next_short_address().map_err(device::Error::Rng)?)
    }

    /// Arm `slot` of the session's scheduler, replacing what was pending there.
    pub(crate) fn start_timer(
        &mut self,
        trx: TransceiverId,
        slot: scheduler::Slot,
        duration_us: u32,
        continuation: Continuation,
    ) -> Result<(), Error<D>> {
        let now = self.now()?;
        self.session_mut(trx).scheduler.start(slot, now, duration_us, continuation);
        Ok(())
    }

    pub(crate) fn stop_timer(&mut self, trx: TransceiverId, slot: scheduler::Slot) {
        self.session_mut(trx).scheduler.stop(slot);
    }

    fn run_expired(&mut self, trx: TransceiverId) -> Result<(), Error<D>> {
        let now = self.now()?;
        while let Some(continuation) = self.session_mut(trx).scheduler.take_expired(now) {
            trace!("{}: {} expired", trx, continuation);
            match continuation {
                Continuation::PeerRequestInterval => {}
                Continuation::PeerConfirmTimeout => self.peer_confirm_timeout(trx)?,
                Continuation::ReplyTimeout => self.reply_timeout(trx)?,
                Continuation::RangeBeacon => self.range_beacon_due(trx)?,
                Continuation::LegacyRangeBeacon => self.legacy_range_beacon_due(trx)?,
                Continuation::StopPulse => self.stop_pulse_cw(trx)?,
                Continuation::AppReset => self.app_reset(trx)?,
            }
        }
        Ok(())
    }

    /// Build a frame with the session's MAC sequence number and send it with CSMA and retries.
    pub(crate) fn app_transmit_frame(
        &mut self,
        trx: TransceiverId,
        dst: Address,
        extended_src: bool,
        seq: u8,
        msg: &AppMessage,
        ack_request: bool,
    ) -> Result<(), TxError> {
        if self.session(trx).node.transmitting {
            return Err(TxError::Busy);
        }
        let dsn = self.session(trx).node.msg_seq_num;
        self.session_mut(trx).node.msg_seq_num = dsn.wrapping_add(1);
        self.prepare_frame(trx, dst, extended_src, dsn, seq, msg, ack_request)?;
        self.transmit_prepared(trx, CsmaMode::Unslotted, true)
    }

    /// Assemble header and payload into the session's `tx_frame`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn prepare_frame(
        &mut self,
        trx: TransceiverId,
        dst: Address,
        extended_src: bool,
        dsn: u8,
        seq: u8,
        msg: &AppMessage,
        ack_request: bool,
    ) -> Result<(), TxError> {
        let src = if extended_src {
            Address::Extended(self.pib_ieee_addr(trx))
        } else {
            Address::Short(self.pib_short_addr(trx))
        };
        let header = Header { ack_request, seq: dsn, pan_id: self.config.pan_id, dst, src };
        let buf = &mut self.session_mut(trx).node.tx_frame;
        buf.clear();
        header
            .encode(buf)
            .and_then(|_| msg.encode(seq, buf))
            .map_err(|e| {
                warn!("{}: frame does not fit: {}", trx, e);
                TxError::Rejected
            })
    }

    /// Hand the frame in `tx_frame` to the radio.
    pub(crate) fn transmit_prepared(
        &mut self,
        trx: TransceiverId,
        csma: CsmaMode,
        retry: bool,
    ) -> Result<(), TxError> {
        let session = &mut self.sessions[trx.index()];
        if session.node.transmitting {
            return Err(TxError::Busy);
        }
        session.node.transmitting = true;
        if let Err(e) = self.device.radio().transmit(trx, session.node.tx_frame.as_ref(), csma, retry)
        {
            warn!("{}: transmit refused: {}", trx, e);
            session.node.transmitting = false;
            return Err(TxError::Rejected);
        }
        Ok(())
    }

    /// Queue a message for the host. A full ring drops it.
    pub(crate) fn respond(&mut self, trx: TransceiverId, response: HostResponse<'_>) {
        if let Err(e) = self.session_mut(trx).serial.queue(&response) {
            trace!("{}: host message {} dropped: {}", trx, response.id(), e);
        }
    }

    /// Queue a confirm that carries a status byte only.
    pub(crate) fn confirm(&mut self, trx: TransceiverId, id: MessageId, status: Status) {
        self.respond(trx, HostResponse::Status { id, status });
    }
}

/// Split a received frame into header, application sequence number and message.
pub(crate) fn parse_app_frame(frame: &RxFrame<'_>) -> Option<(Header, u8, AppMessage)> {
    let (header, payload) = match Header::decode(frame.mpdu) {
        Ok(parts) => parts,
        Err(e) => {
            trace!("frame dropped: {}", e);
            return None;
        }
    };
    match AppMessage::decode(payload) {
        Ok((seq, msg)) => Some((header, seq, msg)),
        Err(e) => {
            trace!("payload dropped: {}", e);
            None
        }
    }
}
